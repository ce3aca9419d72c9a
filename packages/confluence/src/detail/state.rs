// channel shared state: one mutex around buffer plus waiter queues.
//
// every handle to a channel wraps the same `Arc<SharedState>`. all mutation
// happens with the single mutex held; any waker collected while holding it is
// invoked only after it is released, so no lock is ever held across a wake.
//
// the send/recv operations here are the non-suspending halves of channel
// operations: they either complete immediately (possibly by direct hand-off
// to a parked peer), report that the caller's select already lost its own
// race, or, when the caller supplies a waiter node, park that node on the
// appropriate queue.

use super::buffer::Buffer;
use super::slot::SendSlot;
use super::waiter::{Claim, WaitCtx, WaiterList, WaiterNode, WriterQueue};
use std::sync::Mutex;
#[cfg(feature = "alloc-tracer")]
use std::panic::Location;

/// What became of a probe against a channel.
pub enum Outcome {
    /// The operation completed and the caller's context was claimed for it.
    Done,
    /// The operation cannot complete right now. If a node was supplied, it
    /// is now parked on the channel.
    Parked,
    /// The caller's context was already claimed by a concurrent operation on
    /// a sibling op; nothing was consumed.
    Lost,
}

pub struct SharedState<T, B: Buffer<T>> {
    lockable: Mutex<Lockable<T, B>>,
    #[cfg(feature = "alloc-tracer")]
    origin: &'static Location<'static>,
}

struct Lockable<T, B: Buffer<T>> {
    buffer: B,
    readers: WaiterList<T>,
    writers: B::Writers,
}

impl<T: Send, B: Buffer<T>> SharedState<T, B> {
    #[track_caller]
    pub fn new() -> Self {
        #[cfg(feature = "alloc-tracer")]
        let origin = Location::caller();
        #[cfg(feature = "alloc-tracer")]
        crate::tracer::created(origin);
        SharedState {
            lockable: Mutex::new(Lockable {
                buffer: B::new(),
                readers: WaiterList::new(),
                writers: <B::Writers as WriterQueue<T>>::new(),
            }),
            #[cfg(feature = "alloc-tracer")]
            origin,
        }
    }

    /// Send the value held in `slot`. Steps, under the mutex: hand off to the
    /// first claimable parked reader; else place into the buffer if it has
    /// room (forget-oldest evicts silently); else park `node` on the writer
    /// queue, or report `Parked` without side effects when probing only.
    ///
    /// UB unless `slot` is loaded and, with the other raw pointers, stays
    /// valid until the node is unlinked or the call returns without parking.
    pub unsafe fn send(
        &self,
        slot: *mut SendSlot<T>,
        ctx: *const WaitCtx,
        token: usize,
        park: Option<*mut WaiterNode<T>>,
    ) -> Outcome {
        let waker;
        {
            let mut lock = self.lockable.lock().unwrap();
            let lk = &mut *lock;
            match lk.readers.claim_first(&*ctx, token) {
                Claim::Claimed { node: reader, waker: w } => {
                    SendSlot::transfer(&mut *slot, &mut *(*reader).slot());
                    waker = w;
                }
                Claim::Lost => return Outcome::Lost,
                Claim::Empty => {
                    if lk.buffer.has_room() {
                        if !(*ctx).try_claim(token) {
                            return Outcome::Lost;
                        }
                        lk.buffer.push((*slot).read());
                        return Outcome::Done;
                    }
                    if let Some(node) = park {
                        lk.writers.enqueue(node, ctx, slot, token);
                        trace!("send parked on full channel");
                    }
                    return Outcome::Parked;
                }
            }
        }
        if let Some(w) = waker {
            w.wake();
        }
        Outcome::Done
    }

    /// Receive into `slot`. Steps, under the mutex: take over from the first
    /// claimable parked writer (draining the buffer front first when one
    /// exists, so FIFO order survives writers parked behind a full buffer);
    /// else pop the buffer; else park `node` on the reader queue, or report
    /// `Parked` without side effects when probing only.
    ///
    /// UB unless `slot` is empty and, with the other raw pointers, stays
    /// valid until the node is unlinked or the call returns without parking.
    pub unsafe fn recv(
        &self,
        slot: *mut SendSlot<T>,
        ctx: *const WaitCtx,
        token: usize,
        park: Option<*mut WaiterNode<T>>,
    ) -> Outcome {
        let waker;
        {
            let mut lock = self.lockable.lock().unwrap();
            let lk = &mut *lock;
            match lk.writers.claim_first(&*ctx, token) {
                Claim::Claimed { node: writer, waker: w } => {
                    let writer_slot = &mut *(*writer).slot();
                    if let Some(front) = lk.buffer.pop() {
                        // the writer was parked because the buffer was full;
                        // take the front and backfill from the writer
                        (*slot).write(front);
                        lk.buffer.push(writer_slot.read());
                    } else {
                        SendSlot::transfer(writer_slot, &mut *slot);
                    }
                    waker = w;
                }
                Claim::Lost => return Outcome::Lost,
                Claim::Empty => {
                    if !lk.buffer.is_empty() {
                        if !(*ctx).try_claim(token) {
                            return Outcome::Lost;
                        }
                        let value = lk.buffer.pop().expect("buffer checked non-empty");
                        (*slot).write(value);
                        return Outcome::Done;
                    }
                    if let Some(node) = park {
                        lk.readers.enqueue(node, ctx, slot, token);
                        trace!("recv parked on empty channel");
                    }
                    return Outcome::Parked;
                }
            }
        }
        if let Some(w) = waker {
            w.wake();
        }
        Outcome::Done
    }

    /// Remove a parked reader node. No-op if the node already won and was
    /// detached by its claimant.
    pub unsafe fn cancel_recv(&self, node: *mut WaiterNode<T>) {
        let mut lock = self.lockable.lock().unwrap();
        lock.readers.dequeue(node);
    }

    /// Remove a parked writer node. No-op if the node already won and was
    /// detached by its claimant.
    pub unsafe fn cancel_send(&self, node: *mut WaiterNode<T>) {
        let mut lock = self.lockable.lock().unwrap();
        lock.writers.dequeue(node);
    }

    pub fn buffered(&self) -> usize {
        self.lockable.lock().unwrap().buffer.len()
    }

    pub fn readers_idle(&self) -> bool {
        self.lockable.lock().unwrap().readers.is_empty()
    }

    pub fn writers_idle(&self) -> bool {
        self.lockable.lock().unwrap().writers.is_empty()
    }
}

#[cfg(feature = "alloc-tracer")]
impl<T, B: Buffer<T>> Drop for SharedState<T, B> {
    fn drop(&mut self) {
        crate::tracer::dropped(self.origin);
    }
}
