//! Blocking-thread entry point to the select engine.
//!
//! A blocking select drives the same [`Select`](crate::select::Select)
//! future as an async caller would, but parks the OS thread on a condvar
//! between polls instead of suspending a task. The condvar is shared with an
//! [`Interrupter`], so another thread can abort the wait: the interrupted
//! select unregisters all of its waiters and returns `None`.

use crate::select::{select, SelectSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Condvar, Mutex};
use std::task::{Context, Poll, Wake, Waker};

struct SignalState {
    // a waker fired since the last poll
    notified: bool,
    // interrupt() was called; sticky
    interrupted: bool,
}

// condvar-based stand-in for an executor: wakes flip `notified` and signal
// the parked thread to poll again
struct SyncSignal {
    state: Mutex<SignalState>,
    cond: Condvar,
}

impl SyncSignal {
    fn new() -> Self {
        SyncSignal {
            state: Mutex::new(SignalState {
                notified: false,
                interrupted: false,
            }),
            cond: Condvar::new(),
        }
    }

    fn notify(&self) {
        let mut state = self.state.lock().unwrap();
        state.notified = true;
        self.cond.notify_all();
    }

    // park until notified or interrupted. completion takes precedence: an
    // interrupt that raced a notification still reports the notification.
    // returns whether to poll again.
    fn park(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        loop {
            if state.notified {
                state.notified = false;
                return true;
            }
            if state.interrupted {
                return false;
            }
            state = self.cond.wait(state).unwrap();
        }
    }
}

impl Wake for SyncSignal {
    fn wake(self: Arc<Self>) {
        self.notify();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.notify();
    }
}

/// Cancellation token for blocking selects.
///
/// Pass a clone to whichever thread should be able to abort the wait; the
/// waiting side hands the interrupter to
/// [`select_blocking`] (or one of the `*_blocking_interruptible` channel
/// methods). Interruption is sticky: once fired, every wait using this
/// interrupter returns immediately. An interrupter should be associated with
/// at most one blocking wait at a time.
pub struct Interrupter {
    signal: Arc<SyncSignal>,
}

impl Interrupter {
    pub fn new() -> Self {
        Interrupter {
            signal: Arc::new(SyncSignal::new()),
        }
    }

    /// Abort the associated blocking wait, if any. Returns whether this call
    /// was the one that fired the interrupter.
    pub fn interrupt(&self) -> bool {
        let mut state = self.signal.state.lock().unwrap();
        let first = !state.interrupted;
        state.interrupted = true;
        self.signal.cond.notify_all();
        drop(state);
        if first {
            trace!("blocking wait interrupted");
        }
        first
    }
}

impl Default for Interrupter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Interrupter {
    fn clone(&self) -> Self {
        Interrupter {
            signal: Arc::clone(&self.signal),
        }
    }
}

/// Wait on every op in `set`, blocking the calling thread, until one op
/// completes or `interrupter` fires.
///
/// Returns `None` only on interruption, with every waiter unregistered. If a
/// completion and the interrupt race, the completion wins.
pub fn select_blocking<S: SelectSet>(interrupter: &Interrupter, set: S) -> Option<S::Selected> {
    let signal = Arc::clone(&interrupter.signal);
    let waker = Waker::from(Arc::clone(&signal));
    let mut cx = Context::from_waker(&waker);

    let mut fut = select(set);
    // safety: the future stays on this frame and is never moved again
    let mut fut = unsafe { Pin::new_unchecked(&mut fut) };
    loop {
        match fut.as_mut().poll(&mut cx) {
            Poll::Ready(selected) => return Some(selected),
            Poll::Pending => {
                if !signal.park() {
                    // interrupted. poll once more so a completion that raced
                    // the interrupt still wins; dropping the future then
                    // unregisters everything.
                    return match fut.as_mut().poll(&mut cx) {
                        Poll::Ready(selected) => Some(selected),
                        Poll::Pending => None,
                    };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, ChannelHandle};
    use crate::ops;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn interrupt_aborts_a_blocked_read_and_leaves_no_waiter() {
        let ch = Channel::<i32>::new();
        let interrupter = Interrupter::new();

        let waiter = {
            let ch = ch.clone();
            let interrupter = interrupter.clone();
            thread::spawn(move || ch.read_blocking_interruptible(&interrupter))
        };

        // give the reader time to park, then fire
        thread::sleep(Duration::from_millis(50));
        assert!(interrupter.interrupt());
        assert!(!interrupter.interrupt());

        assert_eq!(waiter.join().unwrap(), None);
        assert!(ch.shared().readers_idle());
    }

    #[test]
    fn blocking_rendezvous_pairs_two_threads() {
        let ch = Channel::<i32>::new();

        let writer = {
            let ch = ch.clone();
            thread::spawn(move || ch.write_blocking(1))
        };
        let reader = {
            let ch = ch.clone();
            thread::spawn(move || ch.read_blocking())
        };

        writer.join().unwrap();
        assert_eq!(reader.join().unwrap(), 1);
        assert!(ch.shared().readers_idle());
        assert!(ch.shared().writers_idle());
    }

    #[test]
    fn interrupted_wait_stays_interrupted() {
        let ch = Channel::<i32>::new();
        let interrupter = Interrupter::new();
        interrupter.interrupt();
        assert_eq!(ch.read_blocking_interruptible(&interrupter), None);
        assert_eq!(ch.read_blocking_interruptible(&interrupter), None);
    }

    #[test]
    fn completion_beats_a_late_interrupt() {
        let ch = Channel::<i32, 1>::new();
        assert!(ch.try_write(5));
        let interrupter = Interrupter::new();
        interrupter.interrupt();
        // the value is ready on the fast path, so the interrupt never gets
        // a chance to matter
        assert_eq!(ch.read_blocking_interruptible(&interrupter), Some(5));
    }
}
