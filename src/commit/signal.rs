//! Wait primitives attached to a queue entry
//!
//! - `ReadyLatch`: single-fire release for the ready-to-commit transition
//! - `CommitNotifier`: set-once broadcast for the committed transition,
//!   or for the entry leaving the queue uncommitted
//!
//! A timed-out wait is a local cancellation; it never changes the state.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Released at most once. Waiting on a released latch returns at once.
#[derive(Debug, Default)]
pub struct ReadyLatch {
    released: Mutex<bool>,
    cond: Condvar,
}

impl ReadyLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Release the latch. Returns `true` only for the first release.
    pub fn release(&self) -> bool {
        let mut released = self.released.lock();
        if *released {
            return false;
        }
        *released = true;
        self.cond.notify_all();
        true
    }

    pub fn is_released(&self) -> bool {
        *self.released.lock()
    }

    pub fn wait(&self) {
        let mut released = self.released.lock();
        while !*released {
            self.cond.wait(&mut released);
        }
    }

    /// Returns `false` if `timeout` elapsed first.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut released = self.released.lock();
        while !*released {
            if self.cond.wait_until(&mut released, deadline).timed_out() {
                return *released;
            }
        }
        true
    }
}

#[derive(Debug, Default)]
struct NotifierState {
    committed: bool,
    aborted: bool,
    waiters: usize,
}

impl NotifierState {
    fn released(&self) -> bool {
        self.committed || self.aborted
    }
}

/// Broadcast to every thread waiting for the entry to be committed.
#[derive(Debug, Default)]
pub struct CommitNotifier {
    state: Mutex<NotifierState>,
    cond: Condvar,
}

impl CommitNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark committed and wake all waiters. Returns `true` the first time.
    pub fn notify_all_committed(&self) -> bool {
        let mut state = self.state.lock();
        if state.released() {
            return false;
        }
        state.committed = true;
        self.cond.notify_all();
        true
    }

    /// Wake all waiters without committing. Returns `true` the first time.
    pub fn notify_all_aborted(&self) -> bool {
        let mut state = self.state.lock();
        if state.released() {
            return false;
        }
        state.aborted = true;
        self.cond.notify_all();
        true
    }

    pub fn is_committed(&self) -> bool {
        self.state.lock().committed
    }

    pub fn is_aborted(&self) -> bool {
        self.state.lock().aborted
    }

    /// Threads currently blocked in `wait`/`wait_timeout`.
    pub fn waiters(&self) -> usize {
        self.state.lock().waiters
    }

    pub fn wait(&self) {
        let mut state = self.state.lock();
        state.waiters += 1;
        while !state.released() {
            self.cond.wait(&mut state);
        }
        state.waiters -= 1;
    }

    /// Returns `false` if `timeout` elapsed first. A `true` return may
    /// also mean aborted; check `is_committed`.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        state.waiters += 1;
        while !state.released() {
            if self.cond.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.waiters -= 1;
        state.released()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_latch_fires_once() {
        let latch = ReadyLatch::new();
        assert!(latch.release());
        assert!(!latch.release());
        assert!(latch.is_released());
        latch.wait();
    }

    #[test]
    fn test_latch_timeout_is_local_cancellation() {
        let latch = ReadyLatch::new();
        assert!(!latch.wait_timeout(Duration::from_millis(10)));
        assert!(!latch.is_released());
        assert!(latch.release());
    }

    #[test]
    fn test_latch_wakes_waiter() {
        let latch = Arc::new(ReadyLatch::new());
        let waiter = {
            let latch = Arc::clone(&latch);
            thread::spawn(move || latch.wait_timeout(Duration::from_secs(5)))
        };
        thread::sleep(Duration::from_millis(20));
        latch.release();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn test_notifier_wakes_all_waiters() {
        let notifier = Arc::new(CommitNotifier::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let n = Arc::clone(&notifier);
                thread::spawn(move || n.wait_timeout(Duration::from_secs(5)))
            })
            .collect();

        while notifier.waiters() < 4 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(notifier.notify_all_committed());
        assert!(!notifier.notify_all_committed());

        for handle in handles {
            assert!(handle.join().unwrap());
        }
        assert_eq!(notifier.waiters(), 0);
    }

    #[test]
    fn test_notifier_abort_wakes_without_commit() {
        let notifier = Arc::new(CommitNotifier::new());
        let waiter = {
            let n = Arc::clone(&notifier);
            thread::spawn(move || n.wait_timeout(Duration::from_secs(5)))
        };
        while notifier.waiters() < 1 {
            thread::sleep(Duration::from_millis(1));
        }
        assert!(notifier.notify_all_aborted());

        assert!(waiter.join().unwrap());
        assert!(notifier.is_aborted());
        assert!(!notifier.is_committed());
        // Terminal: a later commit is refused
        assert!(!notifier.notify_all_committed());
        notifier.wait();
    }
}
