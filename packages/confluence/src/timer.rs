//! Channel-shaped timers.
//!
//! There is no timeout parameter anywhere in this crate; a timeout is just
//! one more select arm. [`after`] builds that arm: a channel that receives a
//! single `()` once the duration elapses.

use crate::channel::{Channel, ReadChannel};
use std::time::Duration;

/// A channel that receives one `()` after `dur` has elapsed.
///
/// Composes with [`select`](crate::select()) to bound any wait:
///
/// ```no_run
/// use confluence::{ops, select, timer, Channel, Selected2};
/// use std::time::Duration;
///
/// # async fn demo(data: Channel<i32, 1>) {
/// match select((ops::read(&data), ops::read(&timer::after(Duration::from_millis(30))))).await {
///     Selected2::Op0(value) => println!("got {value}"),
///     Selected2::Op1(()) => println!("timed out"),
/// }
/// # }
/// ```
///
/// Must be called from within a tokio runtime; the timer itself is a spawned
/// tokio task.
pub fn after(dur: Duration) -> ReadChannel<(), 1> {
    let ch = Channel::<(), 1>::new();
    let writer = ch.writer();
    tokio::spawn(async move {
        tokio::time::sleep(dur).await;
        // capacity 1 and a single writer: this cannot fail
        let _ = writer.try_write(());
    });
    ch.reader()
}
