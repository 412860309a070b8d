//! ---
//! gantry_section: "03-runtime-contract"
//! gantry_subsection: "module"
//! gantry_type: "source"
//! gantry_scope: "code"
//! gantry_description: "Blocking observation of asynchronous outcomes under a deadline."
//! gantry_version: "v0.1.0"
//! gantry_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::contract::RuntimeError;

/// Outcome of observing a [`Completion`] under a deadline.
#[derive(Debug)]
pub enum WaitOutcome<T> {
    /// The operation reported an outcome before the deadline.
    Completed(Result<T, RuntimeError>),
    /// The deadline elapsed; the operation outcome is indeterminate.
    TimedOut,
    /// The waiting thread was interrupted before the deadline.
    Interrupted,
}

enum State<T> {
    Pending,
    Done(Result<T, RuntimeError>),
    Taken,
}

struct Cell<T> {
    state: Mutex<State<T>>,
    signal: Condvar,
}

trait Wake: Send + Sync {
    fn wake(&self);
}

impl<T: Send> Wake for Cell<T> {
    fn wake(&self) {
        self.signal.notify_all();
    }
}

/// The observable side of an asynchronous operation.
///
/// The runtime completes the paired [`CompletionHandle`] from its own
/// execution facilities; the launcher thread blocks on this value with a
/// wall-clock deadline. There is no cancellation: a completion arriving after
/// the deadline was reported is never observed.
pub struct Completion<T> {
    cell: Arc<Cell<T>>,
}

/// The completing side of an asynchronous operation.
pub struct CompletionHandle<T> {
    cell: Arc<Cell<T>>,
}

impl<T: Send + 'static> Completion<T> {
    /// Create a pending completion and its handle.
    pub fn new() -> (CompletionHandle<T>, Completion<T>) {
        let cell = Arc::new(Cell {
            state: Mutex::new(State::Pending),
            signal: Condvar::new(),
        });
        (
            CompletionHandle { cell: cell.clone() },
            Completion { cell },
        )
    }

    /// An already-succeeded completion.
    pub fn succeeded(value: T) -> Completion<T> {
        let (handle, completion) = Completion::new();
        handle.succeed(value);
        completion
    }

    /// An already-failed completion.
    pub fn failed(error: RuntimeError) -> Completion<T> {
        let (handle, completion) = Completion::new();
        handle.fail(error);
        completion
    }

    /// Block until the operation completes, the deadline elapses, or the
    /// interrupter fires, whichever comes first. A completed outcome is
    /// preferred when it races an interrupt. The remaining budget is
    /// recomputed from the wall clock on every wakeup, so spurious wakeups
    /// never extend the wait.
    pub fn await_within(self, deadline: Duration, interrupter: &Interrupter) -> WaitOutcome<T> {
        let end = Instant::now() + deadline;
        let _watch = interrupter.watch(self.cell.clone());
        let mut state = self.cell.state.lock();
        loop {
            if matches!(*state, State::Done(_)) {
                if let State::Done(result) = std::mem::replace(&mut *state, State::Taken) {
                    return WaitOutcome::Completed(result);
                }
            }
            if interrupter.is_triggered() {
                return WaitOutcome::Interrupted;
            }
            if Instant::now() >= end {
                return WaitOutcome::TimedOut;
            }
            let _ = self.cell.signal.wait_until(&mut state, end);
        }
    }

    /// Like [`Completion::await_within`], but interruptions only wake the
    /// wait: the loop continues with the remaining wall-clock budget until
    /// the operation completes or the deadline elapses. `None` means the
    /// deadline elapsed with an indeterminate outcome.
    pub fn await_ignoring_interrupts(
        self,
        deadline: Duration,
        interrupter: &Interrupter,
    ) -> Option<Result<T, RuntimeError>> {
        let end = Instant::now() + deadline;
        let _watch = interrupter.watch(self.cell.clone());
        let mut state = self.cell.state.lock();
        loop {
            if matches!(*state, State::Done(_)) {
                if let State::Done(result) = std::mem::replace(&mut *state, State::Taken) {
                    return Some(result);
                }
            }
            if Instant::now() >= end {
                return None;
            }
            let _ = self.cell.signal.wait_until(&mut state, end);
        }
    }
}

impl<T: Send> CompletionHandle<T> {
    /// Record the operation outcome and wake the observer. A completion that
    /// arrives after the observer gave up is dropped silently.
    pub fn complete(self, result: Result<T, RuntimeError>) {
        let mut state = self.cell.state.lock();
        if matches!(*state, State::Pending) {
            *state = State::Done(result);
            self.cell.signal.notify_all();
        }
    }

    /// Record a successful outcome.
    pub fn succeed(self, value: T) {
        self.complete(Ok(value));
    }

    /// Record a failed outcome.
    pub fn fail(self, error: RuntimeError) {
        self.complete(Err(error));
    }
}

/// Wakes threads blocked on a [`Completion`], marking the wait as
/// interrupted. The trigger is sticky: once fired, subsequent
/// interrupt-sensitive waits report [`WaitOutcome::Interrupted`] immediately.
#[derive(Clone)]
pub struct Interrupter {
    inner: Arc<InterrupterInner>,
}

struct InterrupterInner {
    triggered: AtomicBool,
    next_token: AtomicU64,
    watchers: Mutex<Vec<(u64, Weak<dyn Wake>)>>,
}

impl Interrupter {
    /// Create an interrupter with no registered waiters.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(InterrupterInner {
                triggered: AtomicBool::new(false),
                next_token: AtomicU64::new(0),
                watchers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Interrupt every currently blocked waiter and mark the interrupt
    /// status. The status stays observable afterwards.
    pub fn trigger(&self) {
        self.inner.triggered.store(true, Ordering::SeqCst);
        let watchers = self.inner.watchers.lock();
        for (_, watcher) in watchers.iter() {
            if let Some(waker) = watcher.upgrade() {
                waker.wake();
            }
        }
    }

    /// Whether the interrupt has fired.
    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    fn watch(&self, cell: Arc<dyn Wake>) -> WatchGuard<'_> {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner
            .watchers
            .lock()
            .push((token, Arc::downgrade(&cell)));
        WatchGuard {
            interrupter: self,
            token,
        }
    }
}

impl Default for Interrupter {
    fn default() -> Self {
        Self::new()
    }
}

struct WatchGuard<'a> {
    interrupter: &'a Interrupter,
    token: u64,
}

impl Drop for WatchGuard<'_> {
    fn drop(&mut self) {
        self.interrupter
            .inner
            .watchers
            .lock()
            .retain(|(token, _)| *token != self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn completed_outcome_is_observed() {
        let completion = Completion::succeeded(7u32);
        match completion.await_within(Duration::from_millis(100), &Interrupter::new()) {
            WaitOutcome::Completed(Ok(value)) => assert_eq!(value, 7),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn failure_outcome_is_observed() {
        let completion: Completion<u32> = Completion::failed(RuntimeError::Startup {
            reason: "boom".to_owned(),
        });
        match completion.await_within(Duration::from_millis(100), &Interrupter::new()) {
            WaitOutcome::Completed(Err(RuntimeError::Startup { reason })) => {
                assert_eq!(reason, "boom");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn deadline_elapses_for_pending_operation() {
        let (_handle, completion) = Completion::<u32>::new();
        let started = Instant::now();
        let outcome = completion.await_within(Duration::from_millis(120), &Interrupter::new());
        assert!(matches!(outcome, WaitOutcome::TimedOut));
        assert!(started.elapsed() >= Duration::from_millis(120));
    }

    #[test]
    fn completion_from_another_thread_wakes_the_waiter() {
        let (handle, completion) = Completion::<u32>::new();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            handle.succeed(11);
        });
        let started = Instant::now();
        match completion.await_within(Duration::from_secs(5), &Interrupter::new()) {
            WaitOutcome::Completed(Ok(value)) => assert_eq!(value, 11),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn interrupt_aborts_the_sensitive_wait() {
        let (_handle, completion) = Completion::<u32>::new();
        let interrupter = Interrupter::new();
        let remote = interrupter.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.trigger();
        });
        let started = Instant::now();
        let outcome = completion.await_within(Duration::from_secs(5), &interrupter);
        assert!(matches!(outcome, WaitOutcome::Interrupted));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(interrupter.is_triggered());
    }

    #[test]
    fn repeated_interrupts_do_not_reset_the_deadline() {
        let (_handle, completion) = Completion::<u32>::new();
        let interrupter = Interrupter::new();
        let remote = interrupter.clone();
        let pounder = thread::spawn(move || {
            for _ in 0..20 {
                thread::sleep(Duration::from_millis(20));
                remote.trigger();
            }
        });
        let started = Instant::now();
        let outcome =
            completion.await_ignoring_interrupts(Duration::from_millis(200), &interrupter);
        let elapsed = started.elapsed();
        assert!(outcome.is_none());
        assert!(elapsed >= Duration::from_millis(200));
        assert!(
            elapsed < Duration::from_millis(600),
            "interruptions must not extend the budget: waited {:?}",
            elapsed
        );
        pounder.join().expect("pounder thread");
    }

    #[test]
    fn ignoring_wait_still_observes_completion() {
        let (handle, completion) = Completion::<u32>::new();
        let interrupter = Interrupter::new();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            handle.succeed(3);
        });
        let result = completion.await_ignoring_interrupts(Duration::from_secs(5), &interrupter);
        assert!(matches!(result, Some(Ok(3))));
    }

    #[test]
    fn late_completion_is_never_observed() {
        let (handle, completion) = Completion::<u32>::new();
        let outcome = completion.await_within(Duration::from_millis(20), &Interrupter::new());
        assert!(matches!(outcome, WaitOutcome::TimedOut));
        // The operation may still finish afterwards; the result is dropped.
        handle.succeed(9);
    }
}
