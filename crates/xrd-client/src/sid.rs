//! Per-channel stream-id allocation.

use std::collections::HashSet;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::status::{ErrorKind, XRootDStatus, XrdResult};

#[derive(Debug, Default)]
struct SidState {
    free: VecDeque<u16>,
    ceiling: u16,
    timed_out: HashSet<u16>,
}

/// Allocator of the 2-byte stream identifiers that multiplex in-flight
/// requests on one channel.
///
/// A released identifier goes back to the free pool; an identifier whose
/// request expired is quarantined instead, so a straggling reply cannot be
/// attributed to a newly issued request. The quarantine is lifted when the
/// late reply finally arrives.
#[derive(Debug)]
pub struct SidManager {
    state: Mutex<SidState>,
}

impl Default for SidManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SidManager {
    /// A manager with no identifiers outstanding. Zero is never handed
    /// out; it marks an unstamped message.
    pub fn new() -> Self {
        SidManager {
            state: Mutex::new(SidState {
                free: VecDeque::new(),
                ceiling: 1,
                timed_out: HashSet::new(),
            }),
        }
    }

    /// Allocate a free identifier.
    pub fn allocate(&self) -> XrdResult<u16> {
        let mut state = self.state.lock().unwrap();
        if let Some(sid) = state.free.pop_front() {
            return Ok(sid);
        }
        if state.ceiling == u16::MAX {
            return Err(XRootDStatus::error(ErrorKind::Internal)
                .with_message("no more free stream ids"));
        }
        let sid = state.ceiling;
        state.ceiling += 1;
        Ok(sid)
    }

    /// Return an identifier to the free pool. A quarantined identifier is
    /// dropped from quarantine and recycled; this is the late-reply path.
    pub fn release(&self, sid: u16) {
        let mut state = self.state.lock().unwrap();
        state.timed_out.remove(&sid);
        state.free.push_back(sid);
    }

    /// Quarantine the identifier of an expired request.
    pub fn time_out(&self, sid: u16) {
        let mut state = self.state.lock().unwrap();
        state.timed_out.insert(sid);
    }

    /// Whether an identifier sits in quarantine.
    pub fn is_timed_out(&self, sid: u16) -> bool {
        self.state.lock().unwrap().timed_out.contains(&sid)
    }

    /// Number of identifiers in quarantine.
    pub fn timed_out_count(&self) -> usize {
        self.state.lock().unwrap().timed_out.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn allocations_are_distinct() {
        let mgr = SidManager::new();
        let a = mgr.allocate().unwrap();
        let b = mgr.allocate().unwrap();
        let c = mgr.allocate().unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);
        assert_ne!(a, 0);
    }

    #[test]
    fn released_sids_are_recycled() {
        let mgr = SidManager::new();
        let a = mgr.allocate().unwrap();
        mgr.release(a);
        assert_eq!(mgr.allocate().unwrap(), a);
    }

    #[test]
    fn quarantined_sid_is_not_reallocated_until_released() {
        let mgr = SidManager::new();
        let a = mgr.allocate().unwrap();
        mgr.time_out(a);
        assert!(mgr.is_timed_out(a));
        for _ in 0..64 {
            assert_ne!(mgr.allocate().unwrap(), a);
        }
        mgr.release(a);
        assert!(!mgr.is_timed_out(a));
    }

    #[test]
    fn concurrent_allocations_stay_unique() {
        let mgr = Arc::new(SidManager::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let mgr = mgr.clone();
            handles.push(std::thread::spawn(move || {
                (0..256).map(|_| mgr.allocate().unwrap()).collect::<Vec<_>>()
            }));
        }
        let mut all: Vec<u16> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        let count = all.len();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), count);
    }
}
