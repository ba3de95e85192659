//! Session slot pool (§4.1)
//!
//! A fixed `Vec<Mutex<Slot>>` sized to `max_conn`, plus a LIFO of free
//! indices behind its own mutex. `acquire`/`release` only ever touch the
//! free-index stack under lock; a slot's own fields are guarded by that
//! slot's individual mutex, which the owning connection task holds for the
//! whole lifetime of the connection — the safe-Rust equivalent of the
//! source's "no lock needed, single owner" assumption (§4.1).

use crate::codec::decoder::FrameDecoder;
use std::sync::{Mutex, MutexGuard};

/// A peer's position in its connection lifecycle (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Established,
    Authenticated,
    Disconnected,
}

/// One pre-allocated session record (§3).
pub struct Slot {
    pub in_use: bool,
    pub state: PeerState,
    pub src_ip: [u8; 4],
    pub src_port: u16,
    pub username: String,
    pub idx: u16,
    pub err_count: u8,
    pub send_count: u32,
    pub recv_count: u32,
    pub decoder: FrameDecoder,
}

impl Slot {
    fn empty(idx: u16) -> Self {
        Self {
            in_use: false,
            state: PeerState::Disconnected,
            src_ip: [0; 4],
            src_port: 0,
            username: String::new(),
            idx,
            err_count: 0,
            send_count: 0,
            recv_count: 0,
            decoder: FrameDecoder::new(),
        }
    }

    /// Resets a slot back to its post-release state; called from `release()`
    /// and, defensively, right after `acquire()` hands a fresh index out.
    fn reset(&mut self) {
        self.in_use = false;
        self.state = PeerState::Disconnected;
        self.src_ip = [0; 4];
        self.src_port = 0;
        self.username.clear();
        self.err_count = 0;
        self.send_count = 0;
        self.recv_count = 0;
        self.decoder = FrameDecoder::new();
    }

    /// Increments the error budget; returns true once it has reached the
    /// force-disconnect threshold (§4.3).
    pub fn bump_err_count(&mut self) -> bool {
        self.err_count = self.err_count.saturating_add(1);
        self.err_count >= 10
    }
}

/// Bounded pool of session slots with O(1) acquire/release (§4.1).
pub struct SlotPool {
    slots: Vec<Mutex<Slot>>,
    free: Mutex<Vec<u16>>,
}

impl SlotPool {
    /// Builds a pool with exactly `max_conn` slots, all initially free.
    pub fn new(max_conn: u16) -> Self {
        let slots = (0..max_conn).map(|i| Mutex::new(Slot::empty(i))).collect();
        let free = (0..max_conn).rev().collect(); // pop() takes from the end; order is arbitrary
        Self {
            slots,
            free: Mutex::new(free),
        }
    }

    pub fn max_conn(&self) -> u16 {
        self.slots.len() as u16
    }

    /// Pops a free index and marks it `in_use` + `New`. `None` when the pool is full.
    pub fn acquire(&self) -> Option<u16> {
        let idx = {
            let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
            free.pop()
        }?;
        let mut slot = self.slots[idx as usize].lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(!slot.in_use, "acquired a slot that was already in use");
        slot.reset();
        slot.in_use = true;
        slot.state = PeerState::New;
        Some(idx)
    }

    /// Returns `idx` to the free stack. Resets the slot's fields first so a
    /// double-release can be detected (debug assertion) rather than silently
    /// corrupting the free stack.
    pub fn release(&self, idx: u16) {
        {
            let mut slot = self.slots[idx as usize].lock().unwrap_or_else(|e| e.into_inner());
            debug_assert!(slot.in_use, "double release of slot {idx}");
            slot.reset();
        }
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        debug_assert!(!free.contains(&idx), "slot {idx} released twice");
        free.push(idx);
    }

    /// Locks and returns the slot at `idx`. Panics if `idx` is out of range;
    /// undefined in the sense of §4.1 if `idx` was never acquired.
    pub fn lock(&self, idx: u16) -> MutexGuard<'_, Slot> {
        self.slots[idx as usize].lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Number of slots currently in use, for invariant checks and metrics.
    pub fn in_use_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|s| s.lock().unwrap_or_else(|e| e.into_inner()).in_use)
            .count()
    }

    /// Number of indices currently sitting on the free stack.
    pub fn free_count(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_and_release_preserve_capacity_invariant() {
        let pool = SlotPool::new(4);
        assert_eq!(pool.in_use_count() + pool.free_count(), 4);

        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.in_use_count() + pool.free_count(), 4);
        assert_eq!(pool.in_use_count(), 2);

        pool.release(a);
        assert_eq!(pool.in_use_count() + pool.free_count(), 4);

        pool.release(b);
        assert_eq!(pool.in_use_count(), 0);
        assert_eq!(pool.free_count(), 4);
    }

    #[test]
    fn pool_rejects_accept_once_full() {
        let pool = SlotPool::new(2);
        assert!(pool.acquire().is_some());
        assert!(pool.acquire().is_some());
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn acquire_starts_in_new_state_with_empty_username() {
        let pool = SlotPool::new(1);
        let idx = pool.acquire().unwrap();
        let slot = pool.lock(idx);
        assert_eq!(slot.state, PeerState::New);
        assert!(slot.username.is_empty());
        assert_eq!(slot.err_count, 0);
    }

    #[test]
    fn release_then_acquire_reuses_the_same_index_cleanly() {
        let pool = SlotPool::new(1);
        let idx = pool.acquire().unwrap();
        {
            let mut slot = pool.lock(idx);
            slot.username = "alice".to_string();
            slot.state = PeerState::Authenticated;
        }
        pool.release(idx);

        let idx2 = pool.acquire().unwrap();
        assert_eq!(idx, idx2);
        let slot = pool.lock(idx2);
        assert_eq!(slot.state, PeerState::New);
        assert!(slot.username.is_empty());
    }

    #[test]
    fn error_budget_trips_at_ten() {
        let pool = SlotPool::new(1);
        let idx = pool.acquire().unwrap();
        let mut slot = pool.lock(idx);
        for _ in 0..9 {
            assert!(!slot.bump_err_count());
        }
        assert!(slot.bump_err_count());
    }
}
