#![allow(unsafe_op_in_unsafe_fn)]

//! # Confluence: mpmc channels with a unified select
//!
//! Typed multi-producer/multi-consumer channels whose send and receive
//! operations compose through one [`select`] operator: a single invocation
//! waits on any mix of reads and writes across heterogeneous channels and
//! completes exactly one of them, atomically and with uniformly random
//! tie-breaking. The same channel instances serve async tasks and blocking
//! OS threads at once: an async task can [`read`](Channel::read) what a
//! thread [`write_blocking`](Channel::write_blocking)s, and the hand-off is
//! direct.
//!
//! Three disciplines are available, all carried in the type:
//!
//! - [`Channel<T, CAP>`](Channel): bounded buffer with backpressure;
//!   `CAP = 0` (the default) is a rendezvous channel.
//! - [`UnboundedChannel<T>`](UnboundedChannel): writes always succeed
//!   synchronously.
//! - [`RingChannel<T, CAP>`](RingChannel): writes always succeed; a full
//!   buffer silently forgets its oldest message.
//!
//! Channels are never "closed": a channel lives exactly as long as its last
//! handle, and a read on a channel nobody writes to simply keeps waiting.
//! Bound such waits by selecting against a timer arm ([`timer::after`]) or,
//! on the blocking side, by firing an [`Interrupter`].
//!
//! ```
//! use confluence::Channel;
//!
//! #[tokio::main(flavor = "multi_thread")]
//! async fn main() {
//!     let ch = Channel::<String>::new();
//!
//!     let ping = {
//!         let ch = ch.clone();
//!         tokio::spawn(async move {
//!             ch.write("ping".to_owned()).await;
//!             assert_eq!(ch.read().await, "pong");
//!         })
//!     };
//!     let pong = {
//!         let ch = ch.clone();
//!         tokio::spawn(async move {
//!             assert_eq!(ch.read().await, "ping");
//!             ch.write("pong".to_owned()).await;
//!         })
//!     };
//!
//!     ping.await.unwrap();
//!     pong.await.unwrap();
//! }
//! ```

#[allow(unused_imports)]
#[macro_use]
extern crate tracing;

#[doc(hidden)]
pub mod detail;

mod blocking;
mod channel;
pub mod ops;
mod select;
pub mod timer;
#[cfg(feature = "alloc-tracer")]
pub mod tracer;

pub use crate::blocking::{select_blocking, Interrupter};
pub use crate::channel::{
    Channel, ChannelHandle, ReadChannel, Readable, RingChannel, RingReadChannel, RingWriteChannel,
    UnboundedChannel, UnboundedReadChannel, UnboundedWriteChannel, Writable, WriteChannel,
};
pub use crate::ops::{NothingOp, ReadOp, SelectOp, WriteOp};
pub use crate::select::{
    select, select_ready, Select, SelectSet, Selected2, Selected3, Selected4, Selected5, Selected6,
    Selected7, Selected8,
};
