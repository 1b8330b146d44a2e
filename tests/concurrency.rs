//! Concurrency tests: handler fan-out, call deadlines, re-entrant calls
//! across actors.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::mpsc;
use std::time::{Duration, Instant};

use rockpool::{CallError, Condition, ServerEndpoint, block_on};

rockpool::service! {
    /// Service whose handlers park on a shared condition until released.
    pub trait Gate {
        async fn enter(&self) -> u64;
        async fn arrivals(&self) -> u64;
    }
    /// Typed caller handle for [`Gate`] actors.
    pub client GateClient;
    /// Dispatch adapter driving a [`Gate`] implementation.
    pub server GateServer;
    /// Method tags for [`Gate`].
    pub methods GateMethods;
}

struct GateImpl {
    gate: Condition,
    arrivals: Cell<u64>,
}

#[rockpool::async_trait(?Send)]
impl Gate for GateImpl {
    async fn enter(&self) -> u64 {
        self.arrivals.set(self.arrivals.get() + 1);
        self.gate.wait().await;
        self.arrivals.get()
    }

    async fn arrivals(&self) -> u64 {
        self.arrivals.get()
    }
}

fn spawn_gate(gate: Condition) -> rockpool::ActorHandle {
    rockpool::spawn_actor("gate", move || {
        GateServer::new(GateImpl {
            gate,
            arrivals: Cell::new(0),
        })
    })
    .expect("spawn actor")
}

#[test]
fn handlers_run_concurrently() {
    const CALLS: u64 = 8;

    let gate = Condition::new();
    let actor = spawn_gate(gate.clone());
    let endpoint = actor.endpoint().clone();

    let completed = block_on(async move {
        let completed = Rc::new(Cell::new(0u64));
        for _ in 0..CALLS {
            let client = GateClient::connect(&endpoint);
            let completed = Rc::clone(&completed);
            rockpool::spawn(async move {
                let seen = client.enter().await.expect("enter succeeds");
                // Every handler was already inside when the gate opened.
                assert_eq!(seen, CALLS);
                completed.set(completed.get() + 1);
            });
        }

        // All eight handlers must be parked inside the actor at once;
        // intake would deadlock here if dispatch were serialized.
        let monitor = GateClient::connect(&endpoint);
        loop {
            let arrived = monitor.arrivals().await.expect("arrivals");
            if arrived == CALLS {
                break;
            }
            rockpool::sleep(Duration::from_millis(5)).await;
        }
        gate.notify_all();
        completed
    });

    assert_eq!(completed.get(), CALLS);
}

#[test]
fn deadline_bounds_a_stuck_call() {
    let gate = Condition::new();
    let actor = spawn_gate(gate.clone());
    let client =
        GateClient::connect(actor.endpoint()).with_timeout(Duration::from_millis(100));

    let started = Instant::now();
    assert_eq!(block_on(client.enter()), Err(CallError::Timeout));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(95));
    assert!(elapsed < Duration::from_millis(600), "deadline overshot: {elapsed:?}");

    // Release the parked handler so the actor can drain and join.
    gate.notify_all();
    actor.shutdown();
    actor.join().expect("actor exits");
}

rockpool::service! {
    /// Front service that fans out to a relay actor.
    pub trait Front {
        async fn compound(&self, x: u64) -> u64;
        async fn base(&self) -> u64;
    }
    /// Typed caller handle for [`Front`] actors.
    pub client FrontClient;
    /// Dispatch adapter driving a [`Front`] implementation.
    pub server FrontServer;
    /// Method tags for [`Front`].
    pub methods FrontMethods;
}

rockpool::service! {
    /// Relay service that calls back into the front actor.
    pub trait Relay {
        async fn relay(&self, x: u64) -> u64;
    }
    /// Typed caller handle for [`Relay`] actors.
    pub client RelayClient;
    /// Dispatch adapter driving a [`Relay`] implementation.
    pub server RelayServer;
    /// Method tags for [`Relay`].
    pub methods RelayMethods;
}

struct FrontImpl {
    relay: ServerEndpoint,
}

#[rockpool::async_trait(?Send)]
impl Front for FrontImpl {
    async fn compound(&self, x: u64) -> u64 {
        let relay = RelayClient::connect(&self.relay);
        let relayed = relay.relay(x).await.expect("relay call");
        relayed + x
    }

    async fn base(&self) -> u64 {
        7
    }
}

struct RelayImpl {
    front: ServerEndpoint,
}

#[rockpool::async_trait(?Send)]
impl Relay for RelayImpl {
    async fn relay(&self, x: u64) -> u64 {
        let front = FrontClient::connect(&self.front);
        front.base().await.expect("base call") * x
    }
}

#[test]
fn reentrant_calls_across_actors_do_not_deadlock() {
    let (endpoint_tx, endpoint_rx) = mpsc::channel();
    let front = rockpool::spawn_actor("front", move || {
        let relay = endpoint_rx.recv().expect("relay endpoint");
        FrontServer::new(FrontImpl { relay })
    })
    .expect("spawn front");

    let relay = rockpool::spawn_actor("relay", {
        let front_endpoint = front.endpoint().clone();
        move || {
            RelayServer::new(RelayImpl {
                front: front_endpoint,
            })
        }
    })
    .expect("spawn relay");
    endpoint_tx
        .send(relay.endpoint().clone())
        .expect("wire endpoints");

    let client = FrontClient::connect(front.endpoint());
    // relay(6) = base() * 6 = 42, compound adds x back on top.
    assert_eq!(block_on(client.compound(6)), Ok(48));

    // Plain calls still work alongside the nested path.
    assert_eq!(block_on(client.base()), Ok(7));
}

#[test]
fn many_interleaved_calls_on_one_actor() {
    let gate = Condition::new();
    let actor = spawn_gate(gate.clone());
    let endpoint = actor.endpoint().clone();

    // Mix parked and immediate calls; completion order is unconstrained,
    // totals are not.
    let observed = block_on(async move {
        for _ in 0..4 {
            let client = GateClient::connect(&endpoint);
            rockpool::spawn(async move {
                client.enter().await.expect("enter succeeds");
            });
        }
        let monitor = GateClient::connect(&endpoint);
        loop {
            if monitor.arrivals().await.expect("arrivals") == 4 {
                break;
            }
            rockpool::sleep(Duration::from_millis(5)).await;
        }
        gate.notify_all();
        monitor.arrivals().await.expect("arrivals")
    });
    assert_eq!(observed, 4);
}
