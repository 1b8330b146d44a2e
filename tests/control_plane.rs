//! Control-plane tests: sleep windows, dropped traffic, method filters.

use std::cell::Cell;
use std::thread;
use std::time::{Duration, Instant};

use rockpool::{ActorHandle, CallError, block_on};
use tracing_subscriber::EnvFilter;

rockpool::service! {
    /// Counter service used to observe dispatch during control windows.
    pub trait Counter {
        async fn bump(&self) -> u64;
        async fn total(&self) -> u64;
    }
    /// Typed caller handle for [`Counter`] actors.
    pub client CounterClient;
    /// Dispatch adapter driving a [`Counter`] implementation.
    pub server CounterServer;
    /// Method tags for [`Counter`].
    pub methods CounterMethods;
}

struct CounterImpl {
    total: Cell<u64>,
}

#[rockpool::async_trait(?Send)]
impl Counter for CounterImpl {
    async fn bump(&self) -> u64 {
        self.total.set(self.total.get() + 1);
        self.total.get()
    }

    async fn total(&self) -> u64 {
        self.total.get()
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn spawn_counter() -> ActorHandle {
    rockpool::spawn_actor("counter", || {
        CounterServer::new(CounterImpl {
            total: Cell::new(0),
        })
    })
    .expect("spawn actor")
}

/// Give the actor's control tasks a moment to process a command before
/// the next request races it on a separate channel.
fn settle() {
    thread::sleep(Duration::from_millis(20));
}

#[test]
fn sleep_without_drop_defers_requests() {
    init_tracing();
    let actor = spawn_counter();
    let client = CounterClient::connect(actor.endpoint());

    let started = Instant::now();
    actor
        .sleep(Duration::from_millis(250), false)
        .expect("sleep command");
    settle();

    assert_eq!(block_on(client.bump()), Ok(1));
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_millis(230),
        "deferred call completed too early: {elapsed:?}"
    );
}

#[test]
fn sleep_with_drop_discards_requests() {
    init_tracing();
    let actor = spawn_counter();
    let client =
        CounterClient::connect(actor.endpoint()).with_timeout(Duration::from_millis(50));

    actor
        .sleep(Duration::from_millis(300), true)
        .expect("sleep command");
    settle();

    let started = Instant::now();
    assert_eq!(block_on(client.bump()), Err(CallError::Timeout));
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(45));
    assert!(elapsed < Duration::from_millis(290), "timed out late: {elapsed:?}");

    // Wait out the window; the dropped request must not have executed.
    thread::sleep(Duration::from_millis(350));
    let client = CounterClient::connect(actor.endpoint());
    assert_eq!(block_on(client.total()), Ok(0));
    assert_eq!(block_on(client.bump()), Ok(1));
}

#[test]
fn deferred_call_times_out_then_a_patient_one_succeeds() {
    init_tracing();
    let actor = spawn_counter();

    let started = Instant::now();
    actor
        .sleep(Duration::from_millis(200), false)
        .expect("sleep command");
    settle();

    let impatient =
        CounterClient::connect(actor.endpoint()).with_timeout(Duration::from_millis(50));
    assert_eq!(block_on(impatient.bump()), Err(CallError::Timeout));

    let patient =
        CounterClient::connect(actor.endpoint()).with_timeout(Duration::from_millis(500));
    assert!(block_on(patient.bump()).is_ok());
    assert!(started.elapsed() >= Duration::from_millis(180));

    // The deferred first request still executed after the window even
    // though its caller had given up; only its response was discarded.
    thread::sleep(Duration::from_millis(50));
    assert_eq!(block_on(patient.total()), Ok(2));
}

#[test]
fn filter_rejects_only_the_matched_method() {
    init_tracing();
    let actor = spawn_counter();
    let client = CounterClient::connect(actor.endpoint());

    actor.filter(CounterMethods::bump).expect("filter command");
    settle();

    match block_on(client.bump()) {
        Err(CallError::Remote(description)) => {
            assert_eq!(description, "Filtered method 'Counter::bump'");
        }
        other => panic!("expected the filter failure, got {other:?}"),
    }
    // Other methods pass through untouched.
    assert_eq!(block_on(client.total()), Ok(0));

    actor.clear_filter().expect("clear command");
    settle();
    assert_eq!(block_on(client.bump()), Ok(1));
}

#[test]
fn replacing_a_filter_moves_the_rejection() {
    init_tracing();
    let actor = spawn_counter();
    let client = CounterClient::connect(actor.endpoint());

    actor.filter(CounterMethods::bump).expect("filter command");
    settle();
    assert!(block_on(client.bump()).is_err());

    actor.filter(CounterMethods::total).expect("filter command");
    settle();
    assert_eq!(block_on(client.bump()), Ok(1));
    assert!(block_on(client.total()).is_err());
}
