//! Macros generating typed service interfaces.
//!
//! [`service!`](crate::service) is the bridge between a user's trait and
//! the untyped wire contract: from one trait definition it derives the
//! method tags, the typed client stub, and the dispatch adapter the
//! server loop drives. [`messages!`](crate::messages) removes the derive
//! boilerplate from message struct definitions.

/// Define a service interface and generate its typed client, dispatch
/// adapter, and method tags.
///
/// ```rust
/// rockpool::service! {
///     /// A tiny key/value store.
///     pub trait Store {
///         async fn put(&self, key: String, value: u64);
///         async fn get(&self, key: String) -> Option<u64>;
///     }
///     pub client StoreClient;
///     pub server StoreServer;
///     pub methods StoreMethods;
/// }
/// ```
///
/// This generates:
///
/// - `trait Store` with `#[rockpool::async_trait(?Send)]` applied;
///   implementations need the same attribute.
/// - `StoreMethods`, a unit struct carrying one
///   [`MethodTag`](crate::MethodTag) constant per method
///   (`StoreMethods::get`). Tags embed the trait name, method name, and
///   argument signature, so no two methods share a tag.
/// - `StoreServer<S, C>`, which wraps an `S: Store` and implements
///   [`ServiceDispatch`](crate::ServiceDispatch): decode the argument
///   tuple, invoke the method, encode the return value (empty bytes for
///   unit returns).
/// - `StoreClient<C>`, a typed wrapper over
///   [`RemoteClient`](crate::RemoteClient) with one async method per
///   trait method returning `Result<T, CallError>`.
///
/// Methods must take `&self` plus owned, serde-serializable arguments,
/// and return either nothing or one serde-deserializable value.
#[macro_export]
macro_rules! service {
    (
        $(#[$trait_meta:meta])*
        $vis:vis trait $trait_name:ident {
            $(
                $(#[$method_meta:meta])*
                async fn $method:ident ( &self $(, $arg:ident : $aty:ty )* ) $(-> $ret:ty)? ;
            )+
        }
        $(#[$client_meta:meta])*
        $client_vis:vis client $client:ident;
        $(#[$server_meta:meta])*
        $server_vis:vis server $server:ident;
        $(#[$methods_meta:meta])*
        $methods_vis:vis methods $methods:ident;
    ) => {
        $(#[$trait_meta])*
        #[$crate::async_trait(?Send)]
        $vis trait $trait_name {
            $(
                $(#[$method_meta])*
                async fn $method(&self $(, $arg: $aty)*) $(-> $ret)?;
            )+
        }

        $(#[$methods_meta])*
        $methods_vis struct $methods;

        impl $methods {
            $(
                #[doc = concat!(
                    "Method tag for `",
                    stringify!($trait_name), "::", stringify!($method),
                    "`."
                )]
                #[allow(non_upper_case_globals)]
                pub const $method: $crate::MethodTag = $crate::MethodTag::from_static(
                    concat!(
                        stringify!($trait_name), "::", stringify!($method),
                        "(", $(stringify!($aty), ",",)* ")"
                    )
                );
            )+
        }

        $(#[$server_meta])*
        $server_vis struct $server<S, C = $crate::JsonCodec> {
            service: S,
            codec: C,
        }

        impl<S: $trait_name> $server<S, $crate::JsonCodec> {
            /// Wrap a service implementation with the default codec.
            pub fn new(service: S) -> Self {
                Self {
                    service,
                    codec: $crate::JsonCodec,
                }
            }
        }

        impl<S: $trait_name, C: $crate::MessageCodec> $server<S, C> {
            /// Wrap a service implementation with a custom codec.
            pub fn with_codec(service: S, codec: C) -> Self {
                Self { service, codec }
            }
        }

        #[$crate::async_trait(?Send)]
        impl<S, C> $crate::ServiceDispatch for $server<S, C>
        where
            S: $trait_name + 'static,
            C: $crate::MessageCodec,
        {
            async fn dispatch(
                &self,
                method: &$crate::MethodTag,
                args: &[u8],
            ) -> ::std::result::Result<$crate::Bytes, $crate::DispatchError> {
                $(
                    if *method == $methods::$method {
                        let ($($arg,)*): ($($aty,)*) = self.codec.decode(args)?;
                        return $crate::__service_encode!(
                            self.codec,
                            self.service.$method($($arg),*).await,
                            $(-> $ret)?
                        );
                    }
                )+
                ::std::result::Result::Err(
                    $crate::DispatchError::UnrecognizedMethod(method.clone()),
                )
            }
        }

        $(#[$client_meta])*
        $client_vis struct $client<C: $crate::MessageCodec = $crate::JsonCodec> {
            inner: $crate::RemoteClient<C>,
        }

        impl $client<$crate::JsonCodec> {
            /// Connect to an actor with the default codec and no call
            /// deadline.
            pub fn connect(server: &$crate::ServerEndpoint) -> Self {
                Self {
                    inner: $crate::RemoteClient::connect(server),
                }
            }
        }

        impl<C: $crate::MessageCodec> $client<C> {
            /// Connect with a custom payload codec.
            pub fn with_codec(server: &$crate::ServerEndpoint, codec: C) -> Self {
                Self {
                    inner: $crate::RemoteClient::with_codec(server, codec),
                }
            }

            /// Bound every call through this stub by `timeout`.
            #[must_use]
            pub fn with_timeout(mut self, timeout: ::std::time::Duration) -> Self {
                self.inner = self.inner.with_timeout(timeout);
                self
            }

            /// The untyped stub underneath.
            pub fn remote(&self) -> &$crate::RemoteClient<C> {
                &self.inner
            }

            $(
                #[doc = concat!(
                    "Invoke `",
                    stringify!($trait_name), "::", stringify!($method),
                    "` on the remote actor."
                )]
                pub async fn $method(
                    &self $(, $arg: $aty)*
                ) -> ::std::result::Result<
                    $crate::__service_ret!($($ret)?),
                    $crate::CallError,
                > {
                    let args = self
                        .inner
                        .codec()
                        .encode(&($($arg,)*))
                        .map_err(|e| $crate::CallError::Remote(e.to_string()))?;
                    let data = self.inner.call($methods::$method, args).await?;
                    $crate::__service_decode!(self.inner.codec(), data, $(-> $ret)?)
                }
            )+
        }
    };
}

/// Define message structs with the derives the wire needs.
///
/// Each struct gets `Debug`, `Clone`, `PartialEq`, `Serialize`, and
/// `Deserialize`:
///
/// ```rust
/// rockpool::messages! {
///     /// One entry in a replicated log.
///     pub struct LogEntry {
///         pub term: u64,
///         pub payload: String,
///     }
/// }
/// ```
#[macro_export]
macro_rules! messages {
    (
        $(
            $(#[$meta:meta])*
            $vis:vis struct $name:ident {
                $(
                    $(#[$field_meta:meta])*
                    $field_vis:vis $field:ident : $ty:ty
                ),* $(,)?
            }
        )*
    ) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
            $vis struct $name {
                $(
                    $(#[$field_meta])*
                    $field_vis $field : $ty,
                )*
            }
        )*
    };
}

/// Internal: encode a dispatch result, mapping unit returns to empty
/// bytes.
#[doc(hidden)]
#[macro_export]
macro_rules! __service_encode {
    ($codec:expr, $call:expr, -> $ret:ty) => {{
        let value: $ret = $call;
        $codec.encode(&value).map_err($crate::DispatchError::from)
    }};
    ($codec:expr, $call:expr,) => {{
        let _: () = $call;
        ::std::result::Result::Ok($crate::Bytes::new())
    }};
}

/// Internal: decode a call result, mapping unit returns from ignored
/// bytes.
#[doc(hidden)]
#[macro_export]
macro_rules! __service_decode {
    ($codec:expr, $data:ident, -> $ret:ty) => {
        $codec
            .decode::<$ret>(&$data)
            .map_err(|e| $crate::CallError::Remote(e.to_string()))
    };
    ($codec:expr, $data:ident,) => {{
        let _ = $data;
        ::std::result::Result::Ok(())
    }};
}

/// Internal: the client-visible return type of a service method.
#[doc(hidden)]
#[macro_export]
macro_rules! __service_ret {
    () => { () };
    ($ret:ty) => { $ret };
}
