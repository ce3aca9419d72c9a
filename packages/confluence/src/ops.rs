//! Operation descriptors for [`select`](crate::select).
//!
//! An op describes one thing a select invocation is willing to do: receive
//! from a channel ([`read`]), send a given value into a channel ([`write`]),
//! or complete immediately with nothing ([`nothing`]; include it to make a
//! select non-blocking). Ops own their result slot and their waiter node, so
//! a whole select lives on its caller's frame with no per-op allocation.

use crate::channel::{ChannelHandle, Readable, Writable};
use crate::detail::slot::SendSlot;
use crate::detail::state::Outcome;
use crate::detail::waiter::{WaitCtx, WaiterNode};

/// An operation a select can drive. Implemented by [`ReadOp`], [`WriteOp`]
/// and [`NothingOp`].
///
/// The hidden methods are the contract between ops and the select engine;
/// they are not meant to be called (or implemented) outside this crate.
pub trait SelectOp {
    /// Payload produced when this op wins the select.
    type Output;

    // attempt the non-parking path; claims the context on success
    #[doc(hidden)]
    fn probe(&mut self, ctx: &WaitCtx, token: usize) -> Outcome;

    // attempt the non-parking path; on Parked the op's waiter node has been
    // enlisted on the channel.
    //
    // safety: the op must not move between this call and `unregister`.
    #[doc(hidden)]
    unsafe fn probe_or_enlist(&mut self, ctx: *const WaitCtx, token: usize) -> Outcome;

    // detach the waiter node if it is enlisted; idempotent
    #[doc(hidden)]
    fn unregister(&mut self);

    // move the winning payload out
    #[doc(hidden)]
    fn finish(&mut self) -> Self::Output;
}

/// A pending receive on `channel`. Produces the received value when it wins.
pub struct ReadOp<'a, C: Readable> {
    channel: &'a C,
    slot: SendSlot<C::Item>,
    node: WaiterNode<C::Item>,
    enlisted: bool,
}

/// Describe a receive from `channel` for use in a select.
pub fn read<C: Readable>(channel: &C) -> ReadOp<'_, C> {
    ReadOp {
        channel,
        slot: SendSlot::empty(),
        node: WaiterNode::unarmed(),
        enlisted: false,
    }
}

impl<'a, C: Readable> SelectOp for ReadOp<'a, C> {
    type Output = C::Item;

    fn probe(&mut self, ctx: &WaitCtx, token: usize) -> Outcome {
        unsafe { self.channel.shared().recv(&mut self.slot, ctx, token, None) }
    }

    unsafe fn probe_or_enlist(&mut self, ctx: *const WaitCtx, token: usize) -> Outcome {
        let slot = &mut self.slot as *mut SendSlot<C::Item>;
        let node = &mut self.node as *mut WaiterNode<C::Item>;
        let outcome = self.channel.shared().recv(slot, ctx, token, Some(node));
        if matches!(outcome, Outcome::Parked) {
            self.enlisted = true;
        }
        outcome
    }

    fn unregister(&mut self) {
        if self.enlisted {
            unsafe {
                self.channel.shared().cancel_recv(&mut self.node);
            }
            self.enlisted = false;
        }
    }

    fn finish(&mut self) -> C::Item {
        self.slot.take().expect("winning read op holds a value")
    }
}

// the raw pointers in the node are only dereferenced by channel-side code
// under the channel mutex, and only while the node is enlisted
unsafe impl<'a, C: Readable + Sync> Send for ReadOp<'a, C> {}

/// A pending send of a value into `channel`. Produces `()` when it wins; a
/// select that is dropped or loses instead drops the value with it.
pub struct WriteOp<'a, C: Writable> {
    channel: &'a C,
    slot: SendSlot<C::Item>,
    node: WaiterNode<C::Item>,
    enlisted: bool,
}

/// Describe sending `value` into `channel` for use in a select.
pub fn write<C: Writable>(value: C::Item, channel: &C) -> WriteOp<'_, C> {
    WriteOp {
        channel,
        slot: SendSlot::loaded(value),
        node: WaiterNode::unarmed(),
        enlisted: false,
    }
}

impl<'a, C: Writable> SelectOp for WriteOp<'a, C> {
    type Output = ();

    fn probe(&mut self, ctx: &WaitCtx, token: usize) -> Outcome {
        unsafe { self.channel.shared().send(&mut self.slot, ctx, token, None) }
    }

    unsafe fn probe_or_enlist(&mut self, ctx: *const WaitCtx, token: usize) -> Outcome {
        let slot = &mut self.slot as *mut SendSlot<C::Item>;
        let node = &mut self.node as *mut WaiterNode<C::Item>;
        let outcome = self.channel.shared().send(slot, ctx, token, Some(node));
        if matches!(outcome, Outcome::Parked) {
            self.enlisted = true;
        }
        outcome
    }

    fn unregister(&mut self) {
        if self.enlisted {
            unsafe {
                self.channel.shared().cancel_send(&mut self.node);
            }
            self.enlisted = false;
        }
    }

    fn finish(&mut self) {
        debug_assert!(!self.slot.is_loaded(), "winning write op delivered its value");
    }
}

unsafe impl<'a, C: Writable + Sync> Send for WriteOp<'a, C> {}

/// An op that is always ready and produces nothing. Including it makes a
/// select complete immediately when no other op is ready.
pub struct NothingOp;

/// Describe the always-ready no-op for use in a select.
pub fn nothing() -> NothingOp {
    NothingOp
}

impl SelectOp for NothingOp {
    type Output = ();

    fn probe(&mut self, ctx: &WaitCtx, token: usize) -> Outcome {
        if ctx.try_claim(token) {
            Outcome::Done
        } else {
            Outcome::Lost
        }
    }

    unsafe fn probe_or_enlist(&mut self, ctx: *const WaitCtx, token: usize) -> Outcome {
        self.probe(&*ctx, token)
    }

    fn unregister(&mut self) {}

    fn finish(&mut self) {}
}
