//! The select engine: wait on several channel operations, complete exactly
//! one.
//!
//! A select takes a set of ops (a single op, or a tuple of up to eight)
//! and resolves to the payload of the one op that won. For tuple sets the
//! result is a `Selected{N}` enum with one variant per position, so the
//! winning payload is recovered by pattern matching; [`Selected2::index`]
//! and friends give the winning position directly.
//!
//! Probe order is a fresh uniform random permutation per invocation, so no
//! arm of a select can starve another when several are ready at once.
//! Waiters parked on any single channel are still served in FIFO order.
//!
//! ```
//! use confluence::{ops, select, Channel, Selected2};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let numbers = Channel::<i32, 1>::new();
//! let words = Channel::<String, 1>::new();
//! assert!(numbers.try_write(7));
//!
//! match select((ops::read(&numbers), ops::read(&words))).await {
//!     Selected2::Op0(n) => assert_eq!(n, 7),
//!     Selected2::Op1(_word) => unreachable!("words never written"),
//! }
//! # }
//! ```

use crate::detail::state::Outcome;
use crate::detail::waiter::WaitCtx;
use crate::ops::SelectOp;
use rand::seq::SliceRandom;
use smallvec::SmallVec;
use std::future::Future;
use std::marker::PhantomPinned;
use std::pin::Pin;
use std::task::{Context, Poll};

/// A set of ops a single select invocation drives: one op, or a tuple of up
/// to eight.
pub trait SelectSet {
    /// What the select resolves to. The op's own output for single-op sets,
    /// a `Selected{N}` enum for tuples.
    type Selected;

    #[doc(hidden)]
    const LEN: usize;

    #[doc(hidden)]
    fn probe_at(&mut self, index: usize, ctx: &WaitCtx) -> Outcome;

    // safety: the set must not move between this call and `unregister_all`
    #[doc(hidden)]
    unsafe fn probe_or_enlist_at(&mut self, index: usize, ctx: *const WaitCtx) -> Outcome;

    #[doc(hidden)]
    fn unregister_all(&mut self);

    #[doc(hidden)]
    fn finish_at(&mut self, index: usize) -> Self::Selected;
}

impl<O: SelectOp> SelectSet for O {
    type Selected = O::Output;

    const LEN: usize = 1;

    fn probe_at(&mut self, index: usize, ctx: &WaitCtx) -> Outcome {
        debug_assert_eq!(index, 0);
        self.probe(ctx, 0)
    }

    unsafe fn probe_or_enlist_at(&mut self, index: usize, ctx: *const WaitCtx) -> Outcome {
        debug_assert_eq!(index, 0);
        self.probe_or_enlist(ctx, 0)
    }

    fn unregister_all(&mut self) {
        self.unregister();
    }

    fn finish_at(&mut self, index: usize) -> O::Output {
        debug_assert_eq!(index, 0);
        self.finish()
    }
}

impl<O0: SelectOp> SelectSet for (O0,) {
    type Selected = O0::Output;

    const LEN: usize = 1;

    fn probe_at(&mut self, index: usize, ctx: &WaitCtx) -> Outcome {
        debug_assert_eq!(index, 0);
        self.0.probe(ctx, 0)
    }

    unsafe fn probe_or_enlist_at(&mut self, index: usize, ctx: *const WaitCtx) -> Outcome {
        debug_assert_eq!(index, 0);
        self.0.probe_or_enlist(ctx, 0)
    }

    fn unregister_all(&mut self) {
        self.0.unregister();
    }

    fn finish_at(&mut self, index: usize) -> O0::Output {
        debug_assert_eq!(index, 0);
        self.0.finish()
    }
}

macro_rules! select_tuple {
    ($sel:ident, $len:literal: $(($idx:tt, $var:ident, $O:ident)),+) => {
        /// Outcome of a select over a tuple of ops: one variant per
        /// position, carrying the winning op's payload.
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $sel<$($O),+> {
            $($var($O),)+
        }

        impl<$($O),+> $sel<$($O),+> {
            /// Position of the op that won.
            pub fn index(&self) -> usize {
                match self {
                    $(Self::$var(_) => $idx,)+
                }
            }
        }

        impl<$($O: SelectOp),+> SelectSet for ($($O,)+) {
            type Selected = $sel<$($O::Output),+>;

            const LEN: usize = $len;

            fn probe_at(&mut self, index: usize, ctx: &WaitCtx) -> Outcome {
                match index {
                    $($idx => self.$idx.probe(ctx, index),)+
                    _ => unreachable!("op index out of range"),
                }
            }

            unsafe fn probe_or_enlist_at(&mut self, index: usize, ctx: *const WaitCtx) -> Outcome {
                match index {
                    $($idx => self.$idx.probe_or_enlist(ctx, index),)+
                    _ => unreachable!("op index out of range"),
                }
            }

            fn unregister_all(&mut self) {
                $(self.$idx.unregister();)+
            }

            fn finish_at(&mut self, index: usize) -> Self::Selected {
                match index {
                    $($idx => $sel::$var(self.$idx.finish()),)+
                    _ => unreachable!("op index out of range"),
                }
            }
        }
    };
}

select_tuple!(Selected2, 2: (0, Op0, A), (1, Op1, B));
select_tuple!(Selected3, 3: (0, Op0, A), (1, Op1, B), (2, Op2, C));
select_tuple!(Selected4, 4: (0, Op0, A), (1, Op1, B), (2, Op2, C), (3, Op3, D));
select_tuple!(Selected5, 5: (0, Op0, A), (1, Op1, B), (2, Op2, C), (3, Op3, D), (4, Op4, E));
select_tuple!(Selected6, 6: (0, Op0, A), (1, Op1, B), (2, Op2, C), (3, Op3, D), (4, Op4, E), (5, Op5, F));
select_tuple!(Selected7, 7: (0, Op0, A), (1, Op1, B), (2, Op2, C), (3, Op3, D), (4, Op4, E), (5, Op5, F), (6, Op6, G));
select_tuple!(Selected8, 8: (0, Op0, A), (1, Op1, B), (2, Op2, C), (3, Op3, D), (4, Op4, E), (5, Op5, F), (6, Op6, G), (7, Op7, H));

fn permutation(len: usize) -> SmallVec<[u8; 8]> {
    debug_assert!(len <= u8::MAX as usize);
    let mut order: SmallVec<[u8; 8]> = (0..len as u8).collect();
    order.shuffle(&mut rand::thread_rng());
    order
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Start,
    Parked,
    Done,
}

/// Future returned by [`select`]. Resolves once exactly one of the ops has
/// completed; every other op is guaranteed to have had no effect.
///
/// Dropping this future cancels the wait and detaches all of its parked
/// waiters. One caveat is inherent to cancellation: if a peer completed a
/// direct hand-off in the instant before the drop, that message is dropped
/// with the future.
pub struct Select<S: SelectSet> {
    set: S,
    ctx: WaitCtx,
    phase: Phase,
    _pin: PhantomPinned,
}

/// Wait on every op in `set` until one of them completes.
///
/// See the [module docs](self) for the result shape and fairness notes.
pub fn select<S: SelectSet>(set: S) -> Select<S> {
    Select {
        set,
        ctx: WaitCtx::new(),
        phase: Phase::Start,
        _pin: PhantomPinned,
    }
}

/// Complete the first ready op of `set`, never waiting.
///
/// Returns `None` when no op is ready. Including [`ops::nothing`](crate::ops::nothing)
/// in the set makes the result always `Some`.
pub fn select_ready<S: SelectSet>(mut set: S) -> Option<S::Selected> {
    let ctx = WaitCtx::new();
    let order = permutation(S::LEN);
    for &i in order.iter() {
        let i = i as usize;
        match set.probe_at(i, &ctx) {
            Outcome::Done => return Some(set.finish_at(i)),
            Outcome::Parked => {}
            Outcome::Lost => unreachable!("nothing can claim an unpublished select"),
        }
    }
    None
}

impl<S: SelectSet> Future for Select<S> {
    type Output = S::Selected;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<S::Selected> {
        // safety: `this` is never moved out of; waiter nodes inside `set`
        // stay in place until unregistered
        let this = unsafe { self.get_unchecked_mut() };
        match this.phase {
            Phase::Done => panic!("select polled after completion"),
            Phase::Start => {
                // the waker must be in place before any node is published
                let early = this.ctx.poll_winner(cx.waker());
                debug_assert!(early.is_none());

                let order = permutation(S::LEN);

                // fast path: probe every op in permuted order, enlisting
                // nothing
                for &i in order.iter() {
                    let i = i as usize;
                    match this.set.probe_at(i, &this.ctx) {
                        Outcome::Done => {
                            this.phase = Phase::Done;
                            return Poll::Ready(this.set.finish_at(i));
                        }
                        Outcome::Parked => {}
                        Outcome::Lost => {
                            unreachable!("nothing can claim an unpublished select")
                        }
                    }
                }

                // enlist pass, same permutation: re-probe each op and park
                // a waiter where it still cannot complete. the phase flips
                // first so that Drop unregisters whatever this pass manages
                // to enlist.
                this.phase = Phase::Parked;
                for &i in order.iter() {
                    let i = i as usize;
                    match unsafe { this.set.probe_or_enlist_at(i, &this.ctx) } {
                        Outcome::Done => {
                            this.set.unregister_all();
                            this.phase = Phase::Done;
                            return Poll::Ready(this.set.finish_at(i));
                        }
                        Outcome::Parked => {}
                        Outcome::Lost => {
                            // a peer claimed one of the already-enlisted ops
                            // between probes; the wake is in flight and the
                            // remaining ops must not be published
                            break;
                        }
                    }
                }

                Poll::Pending
            }
            Phase::Parked => match this.ctx.poll_winner(cx.waker()) {
                Some(winner) => {
                    this.set.unregister_all();
                    this.phase = Phase::Done;
                    Poll::Ready(this.set.finish_at(winner))
                }
                None => Poll::Pending,
            },
        }
    }
}

impl<S: SelectSet> Drop for Select<S> {
    fn drop(&mut self) {
        if self.phase == Phase::Parked {
            self.set.unregister_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Channel, ChannelHandle, UnboundedChannel};
    use crate::ops;
    use crate::timer;
    use std::time::Duration;

    #[test]
    fn select_ready_completes_a_ready_arm() {
        let a = Channel::<i32, 1>::new();
        let b = Channel::<i32, 1>::new();
        assert!(b.try_write(9));

        match select_ready((ops::read(&a), ops::read(&b))) {
            Some(Selected2::Op1(v)) => assert_eq!(v, 9),
            other => panic!("expected arm 1, got {:?}", other.map(|s| s.index())),
        }
    }

    #[test]
    fn select_ready_reports_nothing_ready() {
        let a = Channel::<i32, 1>::new();
        let b = Channel::<i32, 1>::new();
        assert!(select_ready((ops::read(&a), ops::read(&b))).is_none());
    }

    #[test]
    fn nothing_arm_makes_a_set_always_ready() {
        let a = Channel::<i32, 1>::new();
        let result = select_ready((ops::read(&a), ops::nothing()));
        assert_eq!(result.expect("nothing arm is always ready").index(), 1);
    }

    #[test]
    fn ready_arms_are_probed_uniformly() {
        let mut wins = [0u32; 2];
        for _ in 0..200 {
            let a = Channel::<i32, 1>::new();
            let b = Channel::<i32, 1>::new();
            assert!(a.try_write(1));
            assert!(b.try_write(2));
            let winner = select_ready((ops::read(&a), ops::read(&b)))
                .expect("both arms ready")
                .index();
            wins[winner] += 1;
        }
        // with a uniform permutation, 200 rounds all landing on one arm is
        // beyond astronomically unlikely
        assert!(wins[0] > 0, "arm 0 never won: {wins:?}");
        assert!(wins[1] > 0, "arm 1 never won: {wins:?}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn timeout_arm_wins_when_data_never_arrives() {
        let data = Channel::<i32, 1>::new();
        let timeout = timer::after(Duration::from_millis(30));
        let result = select((ops::read(&timeout), ops::read(&data))).await;
        assert_eq!(result.index(), 0);
    }

    // regression shape: repeated timeout selects against a shared channel
    // must unregister cleanly every round, leaving no stale readers behind
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn repeated_timeout_selects_leave_no_stale_readers() {
        let data = Channel::<i32, 1>::new();
        for _ in 0..2 {
            let done = UnboundedChannel::<()>::new();
            for _ in 0..3 {
                let data = data.clone();
                let done = done.clone();
                tokio::spawn(async move {
                    let timeout = timer::after(Duration::from_millis(30));
                    select((ops::read(&timeout), ops::read(&data))).await;
                    done.write(());
                });
            }
            for _ in 0..3 {
                done.read().await;
            }
        }
        assert!(data.shared().readers_idle());
        assert_eq!(data.shared().buffered(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn write_arm_wins_when_a_reader_parks() {
        let ch = Channel::<i32>::new();
        let never = Channel::<i32>::new();

        let reader = {
            let ch = ch.clone();
            tokio::spawn(async move { ch.read().await })
        };

        // keep probing until the reader has parked and the write arm can
        // hand off directly
        loop {
            match select_ready((ops::read(&never), ops::write(1, &ch))) {
                Some(sel) => {
                    assert_eq!(sel.index(), 1);
                    break;
                }
                None => tokio::task::yield_now().await,
            }
        }

        assert_eq!(reader.await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn dropping_a_parked_select_unregisters_it() {
        let ch = Channel::<i32, 1>::new();
        {
            let fut = select(ops::read(&ch));
            tokio::pin!(fut);
            // poll once so the waiter parks, then drop the future
            futures_poll_once(fut.as_mut()).await;
            assert!(!ch.shared().readers_idle());
        }
        assert!(ch.shared().readers_idle());
        // the channel still works
        assert!(ch.try_write(3));
        assert_eq!(ch.try_read(), Some(3));
    }

    async fn futures_poll_once<F: Future + Unpin>(fut: F) {
        use std::future::poll_fn;
        let mut fut = fut;
        poll_fn(|cx| {
            let _ = Pin::new(&mut fut).poll(cx);
            Poll::Ready(())
        })
        .await;
    }
}
