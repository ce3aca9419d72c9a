// waiter queues and the per-select wait context.
//
// every select invocation owns one `WaitCtx`. each of its operations that has
// to park contributes one `WaiterNode` to the reader or writer queue of the
// channel it targets. nodes live inside the pinned select future itself; the
// channel only ever stores raw links into them, and the select detaches every
// node (under the channel mutex) before its storage can go away. that is what
// makes the raw pointers below sound: a node, its slot, and its context are
// only ever dereferenced while the owning channel's mutex is held, and the
// owner cannot free them without first taking that same mutex.
//
// `WaitState.avail` is the claim flag. flipping it from true to false confers
// the exclusive right (and obligation) to decide the select's winner. the one
// place two selects are committed together is `claim_first`, which takes both
// context locks in address order.

use super::slot::SendSlot;
use std::marker::PhantomPinned;
use std::ptr;
use std::sync::{Mutex, MutexGuard};
use std::task::Waker;

/// Per-select-invocation rendezvous point: claim flag, winner token, and the
/// waker that resumes the parked caller.
pub struct WaitCtx {
    lock: Mutex<WaitState>,
}

struct WaitState {
    // true until somebody claims the right to complete this select
    avail: bool,
    // index of the op that won; assigned at most once, by the claimant
    winner: Option<usize>,
    // wake target for the parked select. for async callers this is the
    // executor's waker; for blocking callers it signals a condvar.
    waker: Option<Waker>,
}

impl WaitCtx {
    pub fn new() -> Self {
        WaitCtx {
            lock: Mutex::new(WaitState {
                avail: true,
                winner: None,
                waker: None,
            }),
        }
    }

    /// Claim this context for the op at `token`. Returns whether the claim
    /// succeeded; on success the winner is recorded.
    pub fn try_claim(&self, token: usize) -> bool {
        let mut state = self.lock.lock().unwrap();
        if !state.avail {
            return false;
        }
        state.avail = false;
        state.winner = Some(token);
        true
    }

    /// Return the winner if one has been decided, otherwise store `waker` to
    /// be invoked by the eventual claimant. One lock acquisition, so a claim
    /// cannot slip between the check and the waker store.
    pub fn poll_winner(&self, waker: &Waker) -> Option<usize> {
        let mut state = self.lock.lock().unwrap();
        if let Some(winner) = state.winner {
            return Some(winner);
        }
        state.waker = Some(waker.clone());
        None
    }
}

/// One parked operation of one select invocation. Lives inside the pinned
/// select future; the channel holds raw links only.
pub struct WaiterNode<T> {
    ctx: *const WaitCtx,
    slot: *mut SendSlot<T>,
    token: usize,
    linked: bool,
    prev: *mut WaiterNode<T>,
    next: *mut WaiterNode<T>,
    _pin: PhantomPinned,
}

impl<T> WaiterNode<T> {
    pub fn unarmed() -> Self {
        WaiterNode {
            ctx: ptr::null(),
            slot: ptr::null_mut(),
            token: 0,
            linked: false,
            prev: ptr::null_mut(),
            next: ptr::null_mut(),
            _pin: PhantomPinned,
        }
    }

    pub fn slot(&self) -> *mut SendSlot<T> {
        self.slot
    }
}

/// Result of [`WaiterList::claim_first`].
pub enum Claim<T> {
    /// A waiter was claimed together with the caller's own context. The
    /// node's slot may be used until the channel mutex is released; the waker
    /// must be invoked after.
    Claimed {
        node: *mut WaiterNode<T>,
        waker: Option<Waker>,
    },
    /// The caller's own context was already claimed by a concurrent
    /// operation; the hand-off must be abandoned.
    Lost,
    /// No claimable waiter in the queue.
    Empty,
}

/// Intrusive doubly-linked FIFO of waiter nodes registered on one side of one
/// channel. All methods require the owning channel's mutex to be held.
pub struct WaiterList<T> {
    first: *mut WaiterNode<T>,
    last: *mut WaiterNode<T>,
}

// sound because nodes are only dereferenced under the owning channel's mutex
unsafe impl<T: Send> Send for WaiterList<T> {}

impl<T> WaiterList<T> {
    pub fn new() -> Self {
        WaiterList {
            first: ptr::null_mut(),
            last: ptr::null_mut(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first.is_null()
    }

    /// Arm `node` with its context, slot, and token, and link it at the tail.
    ///
    /// UB if the node is already linked, or if any of the pointers do not
    /// stay valid until the node is unlinked.
    pub unsafe fn enqueue(
        &mut self,
        node: *mut WaiterNode<T>,
        ctx: *const WaitCtx,
        slot: *mut SendSlot<T>,
        token: usize,
    ) {
        debug_assert!(!(*node).linked, "UB");
        (*node).ctx = ctx;
        (*node).slot = slot;
        (*node).token = token;
        (*node).linked = true;
        (*node).prev = self.last;
        (*node).next = ptr::null_mut();
        if self.last.is_null() {
            self.first = node;
        } else {
            (*self.last).next = node;
        }
        self.last = node;
    }

    /// Unlink `node` from any position. Idempotent: a node that already won
    /// (and was popped by its claimant) is left alone.
    ///
    /// UB if the node is linked into a different list.
    pub unsafe fn dequeue(&mut self, node: *mut WaiterNode<T>) {
        if !(*node).linked {
            return;
        }
        self.unlink(node);
    }

    /// Walk from the head looking for a waiter whose select is still up for
    /// grabs, and claim it *together with* the caller's own context. This is
    /// the only place two selects commit atomically; the two context locks
    /// are taken in address order.
    ///
    /// Waiters already claimed by concurrent operations are popped and
    /// skipped. Waiters belonging to the calling select itself (sibling ops
    /// on the same channel) are skipped but left queued: a select never
    /// rendezvouses with itself.
    pub unsafe fn claim_first(&mut self, self_ctx: &WaitCtx, self_token: usize) -> Claim<T> {
        let mut cursor = self.first;
        while !cursor.is_null() {
            let node = cursor;
            cursor = (*node).next;

            let node_ctx = (*node).ctx;
            if ptr::eq(node_ctx, self_ctx) {
                continue;
            }

            let (mut cand, mut own) = lock_pair(&(*node_ctx).lock, &self_ctx.lock);
            if !cand.avail {
                // claimed by a concurrent operation; drop it from the queue
                drop(cand);
                drop(own);
                self.unlink(node);
                continue;
            }
            if !own.avail {
                return Claim::Lost;
            }
            cand.avail = false;
            cand.winner = Some((*node).token);
            let waker = cand.waker.take();
            own.avail = false;
            own.winner = Some(self_token);
            drop(cand);
            drop(own);
            self.unlink(node);
            return Claim::Claimed { node, waker };
        }
        Claim::Empty
    }

    unsafe fn unlink(&mut self, node: *mut WaiterNode<T>) {
        debug_assert!((*node).linked);
        let prev = (*node).prev;
        let next = (*node).next;
        if prev.is_null() {
            debug_assert!(ptr::eq(self.first, node));
            self.first = next;
        } else {
            (*prev).next = next;
        }
        if next.is_null() {
            debug_assert!(ptr::eq(self.last, node));
            self.last = prev;
        } else {
            (*next).prev = prev;
        }
        (*node).prev = ptr::null_mut();
        (*node).next = ptr::null_mut();
        (*node).linked = false;
    }

    #[cfg(test)]
    pub unsafe fn len(&self) -> usize {
        let mut n = 0;
        let mut cursor = self.first;
        while !cursor.is_null() {
            n += 1;
            cursor = (*cursor).next;
        }
        n
    }
}

// take both context locks without lock-order inversion: always in address
// order, but return the guards in (first-argument, second-argument) order.
fn lock_pair<'a>(
    a: &'a Mutex<WaitState>,
    b: &'a Mutex<WaitState>,
) -> (MutexGuard<'a, WaitState>, MutexGuard<'a, WaitState>) {
    let pa = a as *const Mutex<WaitState> as usize;
    let pb = b as *const Mutex<WaitState> as usize;
    debug_assert_ne!(pa, pb);
    if pa < pb {
        let ga = a.lock().unwrap();
        let gb = b.lock().unwrap();
        (ga, gb)
    } else {
        let gb = b.lock().unwrap();
        let ga = a.lock().unwrap();
        (ga, gb)
    }
}

/// Queue of parked writers. Channels whose writes can never park (unbounded,
/// forget-oldest) use [`NoWriters`] so the queue is absent from their layout.
pub trait WriterQueue<T>: Send {
    fn new() -> Self
    where
        Self: Sized;

    fn is_empty(&self) -> bool;

    /// See [`WaiterList::claim_first`].
    unsafe fn claim_first(&mut self, self_ctx: &WaitCtx, self_token: usize) -> Claim<T>;

    /// See [`WaiterList::enqueue`]. Unreachable for queues of channels whose
    /// writes never park.
    unsafe fn enqueue(
        &mut self,
        node: *mut WaiterNode<T>,
        ctx: *const WaitCtx,
        slot: *mut SendSlot<T>,
        token: usize,
    );

    /// See [`WaiterList::dequeue`].
    unsafe fn dequeue(&mut self, node: *mut WaiterNode<T>);
}

impl<T: Send> WriterQueue<T> for WaiterList<T> {
    fn new() -> Self {
        WaiterList::new()
    }

    fn is_empty(&self) -> bool {
        WaiterList::is_empty(self)
    }

    unsafe fn claim_first(&mut self, self_ctx: &WaitCtx, self_token: usize) -> Claim<T> {
        WaiterList::claim_first(self, self_ctx, self_token)
    }

    unsafe fn enqueue(
        &mut self,
        node: *mut WaiterNode<T>,
        ctx: *const WaitCtx,
        slot: *mut SendSlot<T>,
        token: usize,
    ) {
        WaiterList::enqueue(self, node, ctx, slot, token)
    }

    unsafe fn dequeue(&mut self, node: *mut WaiterNode<T>) {
        WaiterList::dequeue(self, node)
    }
}

/// Writer queue of a channel whose writes never park.
pub struct NoWriters;

impl<T> WriterQueue<T> for NoWriters {
    fn new() -> Self {
        NoWriters
    }

    fn is_empty(&self) -> bool {
        true
    }

    unsafe fn claim_first(&mut self, _self_ctx: &WaitCtx, _self_token: usize) -> Claim<T> {
        Claim::Empty
    }

    unsafe fn enqueue(
        &mut self,
        _node: *mut WaiterNode<T>,
        _ctx: *const WaitCtx,
        _slot: *mut SendSlot<T>,
        _token: usize,
    ) {
        unreachable!("writes never park on this channel");
    }

    unsafe fn dequeue(&mut self, _node: *mut WaiterNode<T>) {}
}
