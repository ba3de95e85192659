//! UDP session table (§4.6)
//!
//! Secondary to TCP mode. Maps `(src_ip, src_port)` to a slot index. The
//! source indexes a two-level bucket array by two bytes of the address with
//! singly-linked chains per bucket; a `HashMap` already provides that
//! bucketing internally, so this collapses the two levels into one table
//! without changing the operation semantics §4.6 specifies: `find`/`insert`/
//! `remove` all take the single table-wide mutex, and chains are expected to
//! be length 1 on the happy path (§9 flags a concurrent map as preferable at
//! scale; this keeps the single-mutex design the source specifies).

use std::collections::HashMap;
use std::sync::Mutex;

/// `(src_ip, src_port)` session key.
pub type SessionKey = ([u8; 4], u16);

struct Table {
    map: HashMap<SessionKey, u16>,
}

pub struct UdpSessionTable {
    inner: Mutex<Table>,
}

impl UdpSessionTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Table { map: HashMap::new() }),
        }
    }

    pub fn find(&self, addr: [u8; 4], port: u16) -> Option<u16> {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .get(&(addr, port))
            .copied()
    }

    /// Inserts a session. The caller must have already acquired `idx` from
    /// the slot pool and populated its `src_ip`/`src_port` before calling
    /// this, so a concurrent `find` never observes an index with no slot
    /// state behind it (§4.6's acquire-then-insert atomicity requirement).
    pub fn insert(&self, addr: [u8; 4], port: u16, idx: u16) {
        self.inner
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .map
            .insert((addr, port), idx);
    }

    pub fn remove(&self, addr: [u8; 4], port: u16) {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).map.remove(&(addr, port));
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for UdpSessionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find_round_trips() {
        let table = UdpSessionTable::new();
        table.insert([10, 0, 0, 1], 5000, 3);
        assert_eq!(table.find([10, 0, 0, 1], 5000), Some(3));
        assert_eq!(table.find([10, 0, 0, 2], 5000), None);
    }

    #[test]
    fn remove_drops_the_entry() {
        let table = UdpSessionTable::new();
        table.insert([10, 0, 0, 1], 5000, 3);
        table.remove([10, 0, 0, 1], 5000);
        assert_eq!(table.find([10, 0, 0, 1], 5000), None);
        assert!(table.is_empty());
    }

    #[test]
    fn reinserting_same_key_overwrites() {
        let table = UdpSessionTable::new();
        table.insert([10, 0, 0, 1], 5000, 3);
        table.insert([10, 0, 0, 1], 5000, 7);
        assert_eq!(table.find([10, 0, 0, 1], 5000), Some(7));
        assert_eq!(table.len(), 1);
    }
}
