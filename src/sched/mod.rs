//! Cooperative task scheduling on the current OS thread.
//!
//! Each actor — and each calling thread while it waits on a remote call —
//! hosts its own single-threaded scheduler. Tasks are ordinary futures;
//! they interleave only at `.await` points, never migrate across threads,
//! and share the thread with the root future that [`block_on`] drives.
//!
//! The scheduler is installed in a thread-local slot for the duration of
//! [`block_on`], so code deep inside the harness (channels, stubs) can ask
//! whether the current thread is cooperative via [`is_installed`] and
//! spawn siblings via [`spawn`] without threading a handle around.
//!
//! Wakeups may come from other threads: a channel send or a condition
//! notify on thread B must be able to unpark a task on thread A. The ready
//! queue therefore lives behind a mutex and pairs with a condition
//! variable the run loop parks on when no task is runnable and no timer is
//! due.
//!
//! # Lifecycle
//!
//! [`block_on`] runs until the root future **and** every transitively
//! spawned task have completed. There is no detach and no first-class
//! cancellation: a task ends when its future returns, and shutdown is
//! effected by closing the channels a task is blocked on.

use std::cell::{Cell, RefCell};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Wake, Waker};
use std::time::Instant;

mod condition;
mod timer;
pub(crate) mod unwind;

pub use condition::{Condition, Notified, WaitOutcome};
pub use timer::{Elapsed, Sleep, Timeout, sleep, timeout};

type TaskId = u64;

/// Reserved id for the root future driven by [`block_on`].
const ROOT_TASK: TaskId = 0;

type LocalFuture = Pin<Box<dyn Future<Output = ()>>>;

/// Ready ids, deduplicated. Shared with wakers on other threads.
struct ReadySet {
    queue: VecDeque<TaskId>,
    queued: HashSet<TaskId>,
}

struct SharedState {
    ready: Mutex<ReadySet>,
    unparker: Condvar,
}

impl SharedState {
    fn lock_ready(&self) -> MutexGuard<'_, ReadySet> {
        self.ready.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push_ready(&self, id: TaskId) {
        let mut ready = self.lock_ready();
        if ready.queued.insert(id) {
            ready.queue.push_back(id);
        }
        drop(ready);
        self.unparker.notify_one();
    }

    fn take_ready(&self) -> VecDeque<TaskId> {
        let mut ready = self.lock_ready();
        ready.queued.clear();
        std::mem::take(&mut ready.queue)
    }

    /// Park the run loop until a wakeup arrives or `deadline` passes.
    ///
    /// Re-checks the ready queue under the lock, so a wake that lands just
    /// before the park is never lost.
    fn park(&self, deadline: Option<Instant>) {
        let ready = self.lock_ready();
        if !ready.queue.is_empty() {
            return;
        }
        match deadline {
            Some(at) => {
                let now = Instant::now();
                if at <= now {
                    return;
                }
                let _ = self
                    .unparker
                    .wait_timeout(ready, at - now)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            None => {
                let _unused = self
                    .unparker
                    .wait(ready)
                    .unwrap_or_else(PoisonError::into_inner);
            }
        }
    }
}

struct TaskWaker {
    id: TaskId,
    shared: Arc<SharedState>,
}

impl Wake for TaskWaker {
    fn wake(self: Arc<Self>) {
        self.shared.push_ready(self.id);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.shared.push_ready(self.id);
    }
}

/// One pending timer. Ordered by `(deadline, seq)` so ties resolve in
/// registration order.
struct TimerEntry {
    deadline: Instant,
    seq: u64,
    waker: Waker,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.deadline, self.seq).cmp(&(other.deadline, other.seq))
    }
}

/// Thread-confined scheduler state: the task table and the timer heap.
struct LocalState {
    tasks: RefCell<HashMap<TaskId, LocalFuture>>,
    next_task: Cell<TaskId>,
    timers: RefCell<BinaryHeap<Reverse<TimerEntry>>>,
    next_timer: Cell<u64>,
}

/// Cloneable handle to the scheduler installed on the current thread.
#[derive(Clone)]
pub(crate) struct Handle {
    shared: Arc<SharedState>,
    local: Rc<LocalState>,
}

thread_local! {
    static CURRENT: RefCell<Option<Handle>> = RefCell::new(None);
}

impl Handle {
    /// The scheduler installed on this thread, if any.
    pub(crate) fn current() -> Option<Handle> {
        CURRENT.with(|slot| slot.borrow().clone())
    }

    fn spawn_task(&self, future: LocalFuture) {
        let id = self.local.next_task.get();
        self.local.next_task.set(id + 1);
        self.local.tasks.borrow_mut().insert(id, future);
        self.shared.push_ready(id);
    }

    /// Arm a timer that wakes `waker` once `deadline` has passed.
    pub(crate) fn register_timer(&self, deadline: Instant, waker: Waker) {
        let seq = self.local.next_timer.get();
        self.local.next_timer.set(seq + 1);
        self.local.timers.borrow_mut().push(Reverse(TimerEntry {
            deadline,
            seq,
            waker,
        }));
    }
}

/// Clears the thread-local slot when `block_on` unwinds, normally or by
/// panic, restoring stack discipline for the install.
struct InstallGuard;

impl Drop for InstallGuard {
    fn drop(&mut self) {
        CURRENT.with(|slot| *slot.borrow_mut() = None);
    }
}

/// Whether a scheduler is currently installed on this thread.
pub fn is_installed() -> bool {
    Handle::current().is_some()
}

/// Schedule `future` as a new task on this thread's scheduler.
///
/// The task is a sibling of the current one: it shares the thread, runs
/// cooperatively, and [`block_on`] will not return until it completes.
///
/// # Panics
///
/// Panics if no scheduler is installed on the current thread; enter one
/// with [`block_on`] first.
pub fn spawn<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    match Handle::current() {
        Some(handle) => handle.spawn_task(Box::pin(future)),
        None => panic!("spawn requires a scheduler on this thread; enter one with block_on"),
    }
}

/// Install a scheduler on the current thread and drive `root` to
/// completion, along with every task it transitively spawns.
///
/// Returns the root future's output. The scheduler is uninstalled when
/// this returns, so nesting is not possible.
///
/// # Panics
///
/// Panics if a scheduler is already installed on this thread, and
/// propagates any panic raised by a task.
pub fn block_on<F: Future>(root: F) -> F::Output {
    assert!(
        Handle::current().is_none(),
        "a scheduler is already running on this thread"
    );

    let shared = Arc::new(SharedState {
        ready: Mutex::new(ReadySet {
            queue: VecDeque::new(),
            queued: HashSet::new(),
        }),
        unparker: Condvar::new(),
    });
    let local = Rc::new(LocalState {
        tasks: RefCell::new(HashMap::new()),
        next_task: Cell::new(ROOT_TASK + 1),
        timers: RefCell::new(BinaryHeap::new()),
        next_timer: Cell::new(0),
    });
    CURRENT.with(|slot| {
        *slot.borrow_mut() = Some(Handle {
            shared: Arc::clone(&shared),
            local: Rc::clone(&local),
        });
    });
    let _guard = InstallGuard;

    let mut root = std::pin::pin!(root);
    let root_waker = Waker::from(Arc::new(TaskWaker {
        id: ROOT_TASK,
        shared: Arc::clone(&shared),
    }));
    let mut output = None;
    shared.push_ready(ROOT_TASK);

    loop {
        let batch = shared.take_ready();

        for id in batch {
            if id == ROOT_TASK {
                // The root runs in queue order like any sibling, so a
                // yield really does hand the thread over.
                if output.is_none() {
                    let mut cx = Context::from_waker(&root_waker);
                    if let Poll::Ready(value) = root.as_mut().poll(&mut cx) {
                        output = Some(value);
                    }
                }
                continue;
            }
            // The task is taken out of the table while it runs so a spawn
            // from inside the poll cannot alias the borrow.
            let task = local.tasks.borrow_mut().remove(&id);
            let Some(mut task) = task else {
                continue;
            };
            let waker = Waker::from(Arc::new(TaskWaker {
                id,
                shared: Arc::clone(&shared),
            }));
            let mut cx = Context::from_waker(&waker);
            if task.as_mut().poll(&mut cx).is_pending() {
                local.tasks.borrow_mut().insert(id, task);
            }
        }

        let next_deadline = fire_due_timers(&local);

        if output.is_some() && local.tasks.borrow().is_empty() {
            break;
        }
        shared.park(next_deadline);
    }

    // output was set before the loop could exit.
    match output {
        Some(value) => value,
        None => unreachable!("scheduler loop exited without a root result"),
    }
}

/// Wake every timer whose deadline has passed; returns the next pending
/// deadline, if any.
fn fire_due_timers(local: &LocalState) -> Option<Instant> {
    let mut timers = local.timers.borrow_mut();
    let now = Instant::now();
    loop {
        match timers.peek() {
            Some(Reverse(entry)) if entry.deadline <= now => {}
            Some(Reverse(entry)) => return Some(entry.deadline),
            None => return None,
        }
        if let Some(Reverse(entry)) = timers.pop() {
            entry.waker.wake();
        }
    }
}

/// Voluntarily hand the thread to the next ready task.
pub fn yield_now() -> YieldNow {
    YieldNow { yielded: false }
}

/// Future returned by [`yield_now`].
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = Pin::into_inner(self);
        if this.yielded {
            Poll::Ready(())
        } else {
            this.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}
