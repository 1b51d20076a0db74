//! Cooperative single-threaded event loop.
//!
//! Idle tasks, timeouts and channel sources are dispatched on the thread that
//! owns the loop. Dispatch is reentrant: a callback may call
//! [`MainLoop::iteration`] to wait for something while other ready sources
//! keep running, but a source is never dispatched recursively from itself.

#![allow(missing_docs)]

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Upper bound on a blocking wait while channel sources are attached.
const CHANNEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Time source for timeouts.
pub trait Clock: 'static {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;

    /// Block until the deadline.
    fn sleep_until(&self, deadline: Duration);
}

/// Wall clock.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    start: Instant,
}

impl StdClock {
    #[must_use]
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// Deterministic clock for tests. Sleeping jumps straight to the deadline.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<Duration>>,
    sleep_calls: Rc<Cell<u64>>,
}

impl ManualClock {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta: Duration) {
        self.now.set(self.now.get() + delta);
    }

    #[must_use]
    pub fn sleep_calls(&self) -> u64 {
        self.sleep_calls.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn sleep_until(&self, deadline: Duration) {
        self.sleep_calls.set(self.sleep_calls.get() + 1);
        if deadline > self.now.get() {
            self.now.set(deadline);
        }
    }
}

/// Identifier of a timeout or channel source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

/// Thread-safe handle that interrupts a blocking wait of the loop.
#[derive(Debug, Clone, Default)]
pub struct LoopWaker {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl LoopWaker {
    pub fn wake(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    fn wait(&self, timeout: Duration) {
        let (lock, cvar) = &*self.inner;
        let mut woken = lock.lock().unwrap_or_else(PoisonError::into_inner);
        if !*woken {
            woken = cvar
                .wait_timeout(woken, timeout)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|err| err.into_inner().0);
        }
        *woken = false;
    }
}

type Task = Box<dyn FnOnce()>;
type Poll = Box<dyn FnMut() -> PollStatus>;

enum PollStatus {
    Idle,
    Dispatched,
    Closed,
}

struct Timeout {
    id: SourceId,
    deadline: Duration,
    callback: Task,
}

struct ChannelSource {
    id: SourceId,
    /// Taken out while dispatching.
    poll: Option<Poll>,
}

struct Inner {
    clock: Box<dyn Clock>,
    idle: RefCell<VecDeque<Task>>,
    timeouts: RefCell<Vec<Timeout>>,
    channels: RefCell<Vec<ChannelSource>>,
    next_id: Cell<u64>,
    quit: Cell<bool>,
    waker: LoopWaker,
}

/// Shared handle to the loop.
#[derive(Clone)]
pub struct MainLoop {
    inner: Rc<Inner>,
}

impl Default for MainLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MainLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MainLoop")
            .field("idle", &self.inner.idle.borrow().len())
            .field("timeouts", &self.inner.timeouts.borrow().len())
            .field("channels", &self.inner.channels.borrow().len())
            .finish_non_exhaustive()
    }
}

impl MainLoop {
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(StdClock::new())
    }

    #[must_use]
    pub fn with_clock(clock: impl Clock) -> Self {
        Self {
            inner: Rc::new(Inner {
                clock: Box::new(clock),
                idle: RefCell::new(VecDeque::new()),
                timeouts: RefCell::new(Vec::new()),
                channels: RefCell::new(Vec::new()),
                next_id: Cell::new(0),
                quit: Cell::new(false),
                waker: LoopWaker::default(),
            }),
        }
    }

    #[must_use]
    pub fn now(&self) -> Duration {
        self.inner.clock.now()
    }

    #[must_use]
    pub fn waker(&self) -> LoopWaker {
        self.inner.waker.clone()
    }

    /// Queue a task to run on the next iteration, in FIFO order.
    pub fn invoke(&self, task: impl FnOnce() + 'static) {
        self.inner.idle.borrow_mut().push_back(Box::new(task));
    }

    /// Run `callback` once after `delay`.
    pub fn timeout_add(&self, delay: Duration, callback: impl FnOnce() + 'static) -> SourceId {
        let id = self.next_source_id();
        let deadline = self.now() + delay;
        self.inner.timeouts.borrow_mut().push(Timeout {
            id,
            deadline,
            callback: Box::new(callback),
        });
        id
    }

    /// Remove a pending timeout or channel source.
    pub fn source_remove(&self, id: SourceId) -> bool {
        let mut timeouts = self.inner.timeouts.borrow_mut();
        if let Some(index) = timeouts.iter().position(|timeout| timeout.id == id) {
            timeouts.remove(index);
            return true;
        }
        drop(timeouts);
        let mut channels = self.inner.channels.borrow_mut();
        let before = channels.len();
        channels.retain(|source| source.id != id);
        channels.len() != before
    }

    /// Dispatch every message arriving on `receiver` to `handler` on this
    /// loop. The source goes away once all senders are dropped.
    pub fn attach_receiver<T: 'static>(
        &self,
        receiver: Receiver<T>,
        mut handler: impl FnMut(T) + 'static,
    ) -> SourceId {
        let id = self.next_source_id();
        let poll = move || {
            let mut status = PollStatus::Idle;
            loop {
                match receiver.try_recv() {
                    Ok(message) => {
                        handler(message);
                        status = PollStatus::Dispatched;
                    }
                    Err(TryRecvError::Empty) => return status,
                    Err(TryRecvError::Disconnected) => return PollStatus::Closed,
                }
            }
        };
        self.inner.channels.borrow_mut().push(ChannelSource {
            id,
            poll: Some(Box::new(poll)),
        });
        id
    }

    /// Run one loop iteration. Returns whether anything was dispatched.
    ///
    /// With `may_block` the call waits for the next timeout or channel
    /// message when nothing is ready. It returns `false` without waiting
    /// when no source could ever become ready.
    pub fn iteration(&self, may_block: bool) -> bool {
        if self.dispatch_ready() {
            return true;
        }
        if !may_block || !self.wait_for_work() {
            return false;
        }
        self.dispatch_ready()
    }

    /// Dispatch until nothing is ready.
    pub fn run_until_idle(&self) {
        while self.iteration(false) {}
    }

    /// Run until [`MainLoop::quit`] is called or no source is left.
    pub fn run(&self) {
        while !self.inner.quit.get() {
            if !self.iteration(true) && !self.has_sources() {
                break;
            }
        }
        self.inner.quit.set(false);
    }

    pub fn quit(&self) {
        self.inner.quit.set(true);
        self.inner.waker.wake();
    }

    fn has_sources(&self) -> bool {
        !self.inner.idle.borrow().is_empty()
            || !self.inner.timeouts.borrow().is_empty()
            || !self.inner.channels.borrow().is_empty()
    }

    fn next_source_id(&self) -> SourceId {
        let id = self.inner.next_id.get() + 1;
        self.inner.next_id.set(id);
        SourceId(id)
    }

    fn dispatch_ready(&self) -> bool {
        let mut dispatched = self.dispatch_channels();
        dispatched |= self.dispatch_timeouts();
        dispatched |= self.dispatch_idle();
        dispatched
    }

    fn dispatch_channels(&self) -> bool {
        let ids: Vec<SourceId> = self
            .inner
            .channels
            .borrow()
            .iter()
            .map(|source| source.id)
            .collect();
        let mut dispatched = false;
        for id in ids {
            let poll = self
                .inner
                .channels
                .borrow_mut()
                .iter_mut()
                .find(|source| source.id == id)
                .and_then(|source| source.poll.take());
            let Some(mut poll) = poll else {
                continue;
            };
            let status = poll();
            let mut channels = self.inner.channels.borrow_mut();
            match status {
                PollStatus::Closed => channels.retain(|source| source.id != id),
                PollStatus::Idle | PollStatus::Dispatched => {
                    if let Some(source) = channels.iter_mut().find(|source| source.id == id) {
                        source.poll = Some(poll);
                    }
                }
            }
            dispatched |= !matches!(status, PollStatus::Idle);
        }
        dispatched
    }

    fn dispatch_timeouts(&self) -> bool {
        let now = self.now();
        let mut due = {
            let mut timeouts = self.inner.timeouts.borrow_mut();
            let mut due = Vec::new();
            let mut index = 0;
            while index < timeouts.len() {
                if timeouts[index].deadline <= now {
                    due.push(timeouts.remove(index));
                } else {
                    index += 1;
                }
            }
            due
        };
        due.sort_by_key(|timeout| (timeout.deadline, timeout.id.0));
        let dispatched = !due.is_empty();
        for timeout in due {
            (timeout.callback)();
        }
        dispatched
    }

    fn dispatch_idle(&self) -> bool {
        let pending = self.inner.idle.borrow().len();
        let mut dispatched = false;
        for _ in 0..pending {
            let task = self.inner.idle.borrow_mut().pop_front();
            let Some(task) = task else {
                break;
            };
            task();
            dispatched = true;
        }
        dispatched
    }

    fn wait_for_work(&self) -> bool {
        let next_deadline = self
            .inner
            .timeouts
            .borrow()
            .iter()
            .map(|timeout| timeout.deadline)
            .min();
        let has_channels = !self.inner.channels.borrow().is_empty();
        if has_channels {
            let wait = next_deadline.map_or(CHANNEL_POLL_INTERVAL, |deadline| {
                deadline
                    .saturating_sub(self.now())
                    .min(CHANNEL_POLL_INTERVAL)
            });
            self.inner.waker.wait(wait);
            true
        } else if let Some(deadline) = next_deadline {
            self.inner.clock.sleep_until(deadline);
            true
        } else {
            !self.inner.idle.borrow().is_empty()
        }
    }
}
