//! Fixed-capacity session pool with rolling id allocation.
//!
//! Slots carry a generation counter; a [`SessionHandle`] is an
//! (index, generation) pair, so a handle to a freed slot simply stops
//! resolving instead of dangling. The id allocator keeps a cursor and scans
//! forward (skipping 0 on wrap) until it finds a value no live session
//! occupies, so consecutive allocations differ by exactly 1 whenever the
//! pool is not sitting on the candidate.

use weave_core::config::SESSION_POOL_SIZE;
use weave_core::{Error, FabricIndex, NodeId, Result, SessionId};

use crate::session::{SecureSession, SessionType};

/// Generation-tagged reference to a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionHandle {
    index: usize,
    generation: u32,
}

struct Slot {
    generation: u32,
    session: Option<SecureSession>,
}

/// The session pool.
pub struct SessionTable {
    slots: Vec<Slot>,
    next_session_id: u16,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::with_capacity(SESSION_POOL_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || Slot {
            generation: 0,
            session: None,
        });
        Self {
            slots,
            next_session_id: 1,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.session.is_some()).count()
    }

    /// Roll the cursor forward to a session id no live session occupies.
    fn next_session_id(&mut self) -> SessionId {
        let mut candidate = self.next_session_id;
        let id = loop {
            // 0 is reserved for unsecured traffic.
            if let Some(id) = SessionId::new(candidate) {
                if self.find_by_local_id_raw(candidate).is_none() {
                    break id;
                }
            }
            candidate = candidate.wrapping_add(1);
        };
        self.next_session_id = match candidate.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        id
    }

    /// Allocate a pending session with a fresh local id.
    pub fn allocate(&mut self, session_type: SessionType) -> Result<SessionHandle> {
        let index = self
            .slots
            .iter()
            .position(|slot| slot.session.is_none())
            .ok_or(Error::NoSpace("session"))?;
        let id = self.next_session_id();
        let slot = &mut self.slots[index];
        slot.session = Some(SecureSession::new(id, session_type));
        Ok(SessionHandle {
            index,
            generation: slot.generation,
        })
    }

    /// Insert a pending session under a caller-chosen local id (test-key
    /// injection). Fails if a live session already holds that id.
    pub fn allocate_with_id(
        &mut self,
        local_session_id: SessionId,
        session_type: SessionType,
    ) -> Result<SessionHandle> {
        if self.find_by_local_id_raw(local_session_id.get()).is_some() {
            return Err(Error::IncorrectState("session id already in use"));
        }
        let index = self
            .slots
            .iter()
            .position(|slot| slot.session.is_none())
            .ok_or(Error::NoSpace("session"))?;
        let slot = &mut self.slots[index];
        slot.session = Some(SecureSession::new(local_session_id, session_type));
        Ok(SessionHandle {
            index,
            generation: slot.generation,
        })
    }

    pub fn get(&self, handle: SessionHandle) -> Option<&SecureSession> {
        let slot = self.slots.get(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.session.as_ref()
    }

    pub fn get_mut(&mut self, handle: SessionHandle) -> Option<&mut SecureSession> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.session.as_mut()
    }

    fn find_by_local_id_raw(&self, id: u16) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| match &slot.session {
                Some(session) => session.local_session_id().get() == id,
                None => false,
            })
    }

    /// Locate the active session holding `local_session_id`.
    pub fn find_by_local_id(&self, local_session_id: u16) -> Option<SessionHandle> {
        self.slots.iter().enumerate().find_map(|(index, slot)| {
            let session = slot.session.as_ref()?;
            (session.local_session_id().get() == local_session_id && session.is_active()).then(
                || SessionHandle {
                    index,
                    generation: slot.generation,
                },
            )
        })
    }

    /// All active sessions bound to `(fabric, peer_node)`.
    pub fn find_by_peer(&self, fabric: FabricIndex, peer_node: NodeId) -> Vec<SessionHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                let session = slot.session.as_ref()?;
                (session.is_active()
                    && session.fabric_index() == fabric
                    && session.peer_node_id() == peer_node)
                    .then(|| SessionHandle {
                        index,
                        generation: slot.generation,
                    })
            })
            .collect()
    }

    /// Handles of every live session.
    pub fn handles(&self) -> Vec<SessionHandle> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.session.as_ref().map(|_| SessionHandle {
                    index,
                    generation: slot.generation,
                })
            })
            .collect()
    }

    /// Return the slot to the pool. The generation bump invalidates every
    /// outstanding handle to the old occupant.
    pub fn release(&mut self, handle: SessionHandle) -> Option<SecureSession> {
        let slot = self.slots.get_mut(handle.index)?;
        if slot.generation != handle.generation {
            return None;
        }
        let session = slot.session.take();
        if session.is_some() {
            slot.generation = slot.generation.wrapping_add(1);
        }
        session
    }
}

impl Default for SessionTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_step_by_one_and_skip_zero() {
        let mut table = SessionTable::new();
        let mut previous = 0u16;
        for _ in 0..8 {
            let handle = table.allocate(SessionType::Pase).unwrap();
            let id = table.get(handle).unwrap().local_session_id().get();
            assert_ne!(id, 0);
            if previous != 0 {
                assert_eq!(id.wrapping_sub(previous), 1);
            }
            previous = id;
            table.release(handle);
        }
    }

    #[test]
    fn wraparound_skips_zero() {
        let mut table = SessionTable::new();
        table.next_session_id = 65535;
        let h1 = table.allocate(SessionType::Pase).unwrap();
        assert_eq!(table.get(h1).unwrap().local_session_id().get(), 65535);
        let h2 = table.allocate(SessionType::Pase).unwrap();
        assert_eq!(table.get(h2).unwrap().local_session_id().get(), 1);
    }

    #[test]
    fn allocator_skips_live_ids() {
        let mut table = SessionTable::new();
        let held = table.allocate(SessionType::Pase).unwrap();
        let held_id = table.get(held).unwrap().local_session_id().get();
        assert_eq!(held_id, 1);

        // Point the cursor straight at the live id.
        table.next_session_id = held_id;
        let next = table.allocate(SessionType::Pase).unwrap();
        assert_eq!(table.get(next).unwrap().local_session_id().get(), 2);
    }

    #[test]
    fn pool_exhaustion_is_reported() {
        let mut table = SessionTable::with_capacity(2);
        table.allocate(SessionType::Pase).unwrap();
        table.allocate(SessionType::Pase).unwrap();
        assert!(matches!(
            table.allocate(SessionType::Pase),
            Err(Error::NoSpace("session"))
        ));
    }

    #[test]
    fn released_handles_stop_resolving() {
        let mut table = SessionTable::new();
        let handle = table.allocate(SessionType::Case).unwrap();
        assert!(table.get(handle).is_some());
        assert!(table.release(handle).is_some());
        assert!(table.get(handle).is_none());
        assert!(table.release(handle).is_none());

        // The slot is reused under a new generation; the old handle stays dead.
        let reused = table.allocate(SessionType::Case).unwrap();
        assert!(table.get(handle).is_none());
        assert!(table.get(reused).is_some());
    }

    #[test]
    fn allocate_with_id_enforces_uniqueness() {
        let mut table = SessionTable::new();
        let id = SessionId::new(7).unwrap();
        table.allocate_with_id(id, SessionType::Pase).unwrap();
        assert!(table.allocate_with_id(id, SessionType::Pase).is_err());
    }
}
