// buffered storage between the waiter queues.
//
// the three buffer types carry the channel's discipline in their type: a
// bounded block-discipline ring (capacity 0 is the rendezvous configuration),
// an unbounded queue, and a forget-oldest ring that evicts its head instead
// of exerting backpressure. the discipline decides at compile time whether a
// writer queue exists at all: `Writers` is the real waiter list only where a
// write can actually park.

use super::waiter::{NoWriters, WaiterList, WriterQueue};
use std::collections::VecDeque;

pub trait Buffer<T>: Send {
    /// Writer queue type of channels using this buffer; [`NoWriters`] where a
    /// write can never park.
    type Writers: WriterQueue<T>;

    /// Whether a write on this buffer always completes without parking.
    const WRITE_NEVER_WAITS: bool;

    fn new() -> Self
    where
        Self: Sized;

    /// Whether a push would be accepted right now. Forget-oldest and
    /// unbounded buffers always have room; a capacity-0 ring never does.
    fn has_room(&self) -> bool;

    /// Push a value. Requires `has_room()`. A full forget-oldest buffer
    /// silently evicts its head first.
    fn push(&mut self, value: T);

    fn pop(&mut self) -> Option<T>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Block-discipline ring of capacity `CAP`. With `CAP = 0` the buffer is a
/// vacuous placeholder and every transfer is a direct rendezvous.
pub struct Bounded<T, const CAP: usize> {
    items: VecDeque<T>,
}

impl<T: Send, const CAP: usize> Buffer<T> for Bounded<T, CAP> {
    type Writers = WaiterList<T>;

    const WRITE_NEVER_WAITS: bool = false;

    fn new() -> Self {
        Bounded {
            items: VecDeque::with_capacity(CAP),
        }
    }

    fn has_room(&self) -> bool {
        self.items.len() < CAP
    }

    fn push(&mut self, value: T) {
        debug_assert!(self.items.len() < CAP);
        self.items.push_back(value);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Block-discipline queue with no capacity limit; writes never park.
pub struct Unbounded<T> {
    items: VecDeque<T>,
}

impl<T: Send> Buffer<T> for Unbounded<T> {
    type Writers = NoWriters;

    const WRITE_NEVER_WAITS: bool = true;

    fn new() -> Self {
        Unbounded {
            items: VecDeque::new(),
        }
    }

    fn has_room(&self) -> bool {
        true
    }

    fn push(&mut self, value: T) {
        self.items.push_back(value);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}

/// Forget-oldest ring of capacity `CAP >= 1`: a push onto a full ring evicts
/// the head. Writes never park, so readers only ever find the newest `CAP`
/// values.
pub struct ForgetOldest<T, const CAP: usize> {
    items: VecDeque<T>,
}

impl<T: Send, const CAP: usize> Buffer<T> for ForgetOldest<T, CAP> {
    type Writers = NoWriters;

    const WRITE_NEVER_WAITS: bool = true;

    fn new() -> Self {
        ForgetOldest {
            items: VecDeque::with_capacity(CAP),
        }
    }

    fn has_room(&self) -> bool {
        true
    }

    fn push(&mut self, value: T) {
        if self.items.len() == CAP {
            self.items.pop_front();
        }
        self.items.push_back(value);
    }

    fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    fn len(&self) -> usize {
        self.items.len()
    }
}
