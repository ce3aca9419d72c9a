//! Channel handles.
//!
//! A channel is created through one of the bidirectional handle types
//! ([`Channel`], [`UnboundedChannel`], [`RingChannel`]), whose constructors
//! allocate the shared state. Capability-restricted views ([`ReadChannel`],
//! [`WriteChannel`], and friends) are obtained by conversion and can only
//! ever narrow: there is no way back from a view to the bidirectional
//! handle, and no conversion changes the channel's discipline.
//!
//! All handles are cheap reference-counted clones of the same underlying
//! channel; equality is identity of that channel. A channel lives until its
//! last handle drops. There is no "closed" state and no close error: a read
//! on a channel whose writers are all gone simply keeps waiting.

use crate::blocking::Interrupter;
use crate::detail::buffer::{Bounded, Buffer, ForgetOldest, Unbounded};
use crate::detail::state::SharedState;
use std::fmt;
use std::sync::Arc;

/// Implemented by every channel handle. Exposes the element type and the
/// shared state the select machinery operates on.
pub trait ChannelHandle {
    /// Element type conveyed by the channel.
    type Item: Send;

    #[doc(hidden)]
    type Buf: Buffer<Self::Item>;

    #[doc(hidden)]
    fn shared(&self) -> &Arc<SharedState<Self::Item, Self::Buf>>;
}

/// Marker for handles capable of receiving. Required by [`ops::read`](crate::ops::read).
pub trait Readable: ChannelHandle {}

/// Marker for handles capable of sending. Required by [`ops::write`](crate::ops::write).
pub trait Writable: ChannelHandle {}

macro_rules! declare_handle {
    (
        $(#[$doc:meta])*
        $name:ident, decl[$($d:tt)*], gen[$($g:tt)*], args[$($a:tt)*], buf[$buf:ty]
    ) => {
        $(#[$doc])*
        pub struct $name<$($d)*> {
            shared: Arc<SharedState<T, $buf>>,
        }

        impl<$($g)*> Clone for $name<$($a)*> {
            fn clone(&self) -> Self {
                Self { shared: Arc::clone(&self.shared) }
            }
        }

        impl<$($g)*> PartialEq for $name<$($a)*> {
            fn eq(&self, other: &Self) -> bool {
                Arc::ptr_eq(&self.shared, &other.shared)
            }
        }

        impl<$($g)*> Eq for $name<$($a)*> {}

        impl<$($g)*> fmt::Debug for $name<$($a)*> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_tuple(stringify!($name))
                    .field(&Arc::as_ptr(&self.shared))
                    .finish()
            }
        }

        impl<$($g)*> ChannelHandle for $name<$($a)*> {
            type Item = T;
            type Buf = $buf;

            fn shared(&self) -> &Arc<SharedState<T, $buf>> {
                &self.shared
            }
        }
    };
}

declare_handle! {
    /// Bidirectional mpmc channel with a bounded buffer of `CAP` messages
    /// and backpressure: once the buffer is full, writes wait for a reader.
    ///
    /// `CAP = 0` (the default) makes this a rendezvous channel: there is no
    /// buffer at all and every transfer is a direct hand-off between a
    /// writer and a reader.
    Channel, decl[T: Send, const CAP: usize = 0], gen[T: Send, const CAP: usize], args[T, CAP], buf[Bounded<T, CAP>]
}

declare_handle! {
    /// Read-capability view of a [`Channel`].
    ReadChannel, decl[T: Send, const CAP: usize = 0], gen[T: Send, const CAP: usize], args[T, CAP], buf[Bounded<T, CAP>]
}

declare_handle! {
    /// Write-capability view of a [`Channel`].
    WriteChannel, decl[T: Send, const CAP: usize = 0], gen[T: Send, const CAP: usize], args[T, CAP], buf[Bounded<T, CAP>]
}

declare_handle! {
    /// Bidirectional mpmc channel with no capacity limit. Writes always
    /// complete synchronously and never block or drop.
    UnboundedChannel, decl[T: Send], gen[T: Send], args[T], buf[Unbounded<T>]
}

declare_handle! {
    /// Read-capability view of an [`UnboundedChannel`].
    UnboundedReadChannel, decl[T: Send], gen[T: Send], args[T], buf[Unbounded<T>]
}

declare_handle! {
    /// Write-capability view of an [`UnboundedChannel`].
    UnboundedWriteChannel, decl[T: Send], gen[T: Send], args[T], buf[Unbounded<T>]
}

declare_handle! {
    /// Bidirectional mpmc channel that keeps the newest `CAP` messages:
    /// writing onto a full buffer silently discards the oldest message
    /// instead of waiting. Writes always complete synchronously.
    ///
    /// `CAP` must be at least 1; `RingChannel::<T, 0>::new()` fails to
    /// compile.
    RingChannel, decl[T: Send, const CAP: usize], gen[T: Send, const CAP: usize], args[T, CAP], buf[ForgetOldest<T, CAP>]
}

declare_handle! {
    /// Read-capability view of a [`RingChannel`].
    RingReadChannel, decl[T: Send, const CAP: usize], gen[T: Send, const CAP: usize], args[T, CAP], buf[ForgetOldest<T, CAP>]
}

declare_handle! {
    /// Write-capability view of a [`RingChannel`].
    RingWriteChannel, decl[T: Send, const CAP: usize], gen[T: Send, const CAP: usize], args[T, CAP], buf[ForgetOldest<T, CAP>]
}

impl<T: Send, const CAP: usize> Readable for Channel<T, CAP> {}
impl<T: Send, const CAP: usize> Writable for Channel<T, CAP> {}
impl<T: Send, const CAP: usize> Readable for ReadChannel<T, CAP> {}
impl<T: Send, const CAP: usize> Writable for WriteChannel<T, CAP> {}
impl<T: Send> Readable for UnboundedChannel<T> {}
impl<T: Send> Writable for UnboundedChannel<T> {}
impl<T: Send> Readable for UnboundedReadChannel<T> {}
impl<T: Send> Writable for UnboundedWriteChannel<T> {}
impl<T: Send, const CAP: usize> Readable for RingChannel<T, CAP> {}
impl<T: Send, const CAP: usize> Writable for RingChannel<T, CAP> {}
impl<T: Send, const CAP: usize> Readable for RingReadChannel<T, CAP> {}
impl<T: Send, const CAP: usize> Writable for RingWriteChannel<T, CAP> {}

impl<T: Send, const CAP: usize> Channel<T, CAP> {
    /// Create a channel. The shared state lives until the last handle (of
    /// any capability) is dropped.
    #[track_caller]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SharedState::new()),
        }
    }

    /// Read-capability view of this channel.
    pub fn reader(&self) -> ReadChannel<T, CAP> {
        ReadChannel {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Write-capability view of this channel.
    pub fn writer(&self) -> WriteChannel<T, CAP> {
        WriteChannel {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send> UnboundedChannel<T> {
    /// Create an unbounded channel.
    #[track_caller]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(SharedState::new()),
        }
    }

    /// Read-capability view of this channel.
    pub fn reader(&self) -> UnboundedReadChannel<T> {
        UnboundedReadChannel {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Write-capability view of this channel.
    pub fn writer(&self) -> UnboundedWriteChannel<T> {
        UnboundedWriteChannel {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send, const CAP: usize> RingChannel<T, CAP> {
    /// Create a forget-oldest channel retaining the newest `CAP` messages.
    #[track_caller]
    pub fn new() -> Self {
        const {
            assert!(CAP > 0, "a forget-oldest channel needs a capacity of at least 1");
        }
        Self {
            shared: Arc::new(SharedState::new()),
        }
    }

    /// Read-capability view of this channel.
    pub fn reader(&self) -> RingReadChannel<T, CAP> {
        RingReadChannel {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Write-capability view of this channel.
    pub fn writer(&self) -> RingWriteChannel<T, CAP> {
        RingWriteChannel {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send, const CAP: usize> Default for Channel<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Default for UnboundedChannel<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send, const CAP: usize> Default for RingChannel<T, CAP> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send, const CAP: usize> From<Channel<T, CAP>> for ReadChannel<T, CAP> {
    fn from(ch: Channel<T, CAP>) -> Self {
        Self { shared: ch.shared }
    }
}

impl<T: Send, const CAP: usize> From<Channel<T, CAP>> for WriteChannel<T, CAP> {
    fn from(ch: Channel<T, CAP>) -> Self {
        Self { shared: ch.shared }
    }
}

impl<T: Send> From<UnboundedChannel<T>> for UnboundedReadChannel<T> {
    fn from(ch: UnboundedChannel<T>) -> Self {
        Self { shared: ch.shared }
    }
}

impl<T: Send> From<UnboundedChannel<T>> for UnboundedWriteChannel<T> {
    fn from(ch: UnboundedChannel<T>) -> Self {
        Self { shared: ch.shared }
    }
}

impl<T: Send, const CAP: usize> From<RingChannel<T, CAP>> for RingReadChannel<T, CAP> {
    fn from(ch: RingChannel<T, CAP>) -> Self {
        Self { shared: ch.shared }
    }
}

impl<T: Send, const CAP: usize> From<RingChannel<T, CAP>> for RingWriteChannel<T, CAP> {
    fn from(ch: RingChannel<T, CAP>) -> Self {
        Self { shared: ch.shared }
    }
}

macro_rules! read_ops {
    ($t:ident => impl[$($g:tt)*] $ty:ty) => {
        impl<$($g)*> $ty {
            /// Receive a message, awaiting until one is available.
            pub async fn read(&self) -> $t {
                crate::select::select(crate::ops::read(self)).await
            }

            /// Receive a message immediately if one is available, without
            /// ever waiting.
            pub fn try_read(&self) -> Option<$t> {
                crate::select::select_ready(crate::ops::read(self))
            }

            /// Receive a message, blocking the calling thread until one is
            /// available.
            pub fn read_blocking(&self) -> $t {
                crate::blocking::select_blocking(&Interrupter::new(), crate::ops::read(self))
                    .expect("a wait on a private interrupter cannot be interrupted")
            }

            /// Receive a message, blocking the calling thread until one is
            /// available or `interrupter` fires, in which case `None` is
            /// returned and the wait leaves no trace on the channel.
            pub fn read_blocking_interruptible(&self, interrupter: &Interrupter) -> Option<$t> {
                crate::blocking::select_blocking(interrupter, crate::ops::read(self))
            }
        }
    };
}

macro_rules! write_ops {
    ($t:ident => impl[$($g:tt)*] $ty:ty) => {
        impl<$($g)*> $ty {
            /// Send a message, awaiting until the channel accepts it.
            pub async fn write(&self, value: $t) {
                crate::select::select(crate::ops::write(value, self)).await
            }

            /// Send a message if the channel can accept it right now,
            /// without ever waiting. Returns whether the message was sent.
            pub fn try_write(&self, value: $t) -> bool {
                crate::select::select_ready(crate::ops::write(value, self)).is_some()
            }

            /// Send a message, blocking the calling thread until the channel
            /// accepts it.
            pub fn write_blocking(&self, value: $t) {
                crate::blocking::select_blocking(&Interrupter::new(), crate::ops::write(value, self))
                    .expect("a wait on a private interrupter cannot be interrupted");
            }

            /// Send a message, blocking the calling thread until the channel
            /// accepts it or `interrupter` fires. Returns whether the
            /// message was sent; an interrupted send drops the message.
            pub fn write_blocking_interruptible(&self, interrupter: &Interrupter, value: $t) -> bool {
                crate::blocking::select_blocking(interrupter, crate::ops::write(value, self)).is_some()
            }
        }
    };
}

macro_rules! write_ops_wait_free {
    ($t:ident => impl[$($g:tt)*] $ty:ty) => {
        impl<$($g)*> $ty {
            /// Send a message. Writes on this channel always complete
            /// synchronously: a parked reader gets the message directly,
            /// otherwise it goes to the buffer.
            pub fn write(&self, value: $t) {
                crate::select::select_ready(crate::ops::write(value, self))
                    .expect("wait-free writes always complete");
            }
        }
    };
}

read_ops!(T => impl[T: Send, const CAP: usize] Channel<T, CAP>);
read_ops!(T => impl[T: Send, const CAP: usize] ReadChannel<T, CAP>);
read_ops!(T => impl[T: Send] UnboundedChannel<T>);
read_ops!(T => impl[T: Send] UnboundedReadChannel<T>);
read_ops!(T => impl[T: Send, const CAP: usize] RingChannel<T, CAP>);
read_ops!(T => impl[T: Send, const CAP: usize] RingReadChannel<T, CAP>);

write_ops!(T => impl[T: Send, const CAP: usize] Channel<T, CAP>);
write_ops!(T => impl[T: Send, const CAP: usize] WriteChannel<T, CAP>);

write_ops_wait_free!(T => impl[T: Send] UnboundedChannel<T>);
write_ops_wait_free!(T => impl[T: Send] UnboundedWriteChannel<T>);
write_ops_wait_free!(T => impl[T: Send, const CAP: usize] RingChannel<T, CAP>);
write_ops_wait_free!(T => impl[T: Send, const CAP: usize] RingWriteChannel<T, CAP>);
