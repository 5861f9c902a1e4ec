//! Secure session records.
//!
//! A session is allocated in the pending state (id assigned, no keys) and
//! activated once establishment hands over peer identity and key material.
//! Holders are tracked as weak references in registration order; dead
//! entries are pruned whenever the list is walked.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use weave_core::{FabricIndex, NodeId, PeerAddress, SessionId, TimestampMs};

use crate::counter::{OutboundCounter, PeerMessageCounter};
use crate::crypto_context::{CryptoContext, SessionRole};
use crate::holder::HolderState;

/// How the session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    /// Passcode-authenticated (commissioning); unfabricked.
    Pase,
    /// Certificate-authenticated (operational).
    Case,
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Active,
    /// Peer unresponsive; kept around for holders but out of dispatch.
    Defunct,
    Expired,
}

/// One secure session record.
pub struct SecureSession {
    local_session_id: SessionId,
    peer_session_id: u16,
    local_node_id: NodeId,
    peer_node_id: NodeId,
    fabric_index: FabricIndex,
    peer_address: Option<PeerAddress>,
    session_type: SessionType,
    state: SessionState,
    crypto: Option<CryptoContext>,
    local_counter: OutboundCounter,
    peer_counter: PeerMessageCounter,
    last_activity: TimestampMs,
    holders: Vec<Weak<RefCell<HolderState>>>,
}

impl SecureSession {
    /// Freshly allocated session: id assigned, nothing else known yet.
    pub(crate) fn new(local_session_id: SessionId, session_type: SessionType) -> Self {
        Self {
            local_session_id,
            peer_session_id: 0,
            local_node_id: NodeId::UNDEFINED,
            peer_node_id: NodeId::UNDEFINED,
            fabric_index: FabricIndex::UNFABRICKED,
            peer_address: None,
            session_type,
            state: SessionState::Active,
            crypto: None,
            local_counter: OutboundCounter::new(),
            peer_counter: PeerMessageCounter::new(),
            last_activity: TimestampMs::default(),
            holders: Vec::new(),
        }
    }

    /// Install peer identity and key material after establishment.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn activate(
        &mut self,
        peer_session_id: u16,
        local_node_id: NodeId,
        peer_node_id: NodeId,
        fabric_index: FabricIndex,
        peer_address: PeerAddress,
        crypto: CryptoContext,
        now: TimestampMs,
    ) {
        self.peer_session_id = peer_session_id;
        self.local_node_id = local_node_id;
        self.peer_node_id = peer_node_id;
        self.fabric_index = fabric_index;
        self.peer_address = Some(peer_address);
        self.crypto = Some(crypto);
        self.last_activity = now;
    }

    pub fn local_session_id(&self) -> SessionId {
        self.local_session_id
    }

    pub fn peer_session_id(&self) -> u16 {
        self.peer_session_id
    }

    pub fn local_node_id(&self) -> NodeId {
        self.local_node_id
    }

    pub fn peer_node_id(&self) -> NodeId {
        self.peer_node_id
    }

    pub fn fabric_index(&self) -> FabricIndex {
        self.fabric_index
    }

    pub fn peer_address(&self) -> Option<PeerAddress> {
        self.peer_address
    }

    pub fn session_type(&self) -> SessionType {
        self.session_type
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    pub fn role(&self) -> Option<SessionRole> {
        self.crypto.as_ref().map(CryptoContext::role)
    }

    pub fn crypto(&self) -> Option<&CryptoContext> {
        self.crypto.as_ref()
    }

    pub fn last_activity(&self) -> TimestampMs {
        self.last_activity
    }

    pub fn touch(&mut self, now: TimestampMs) {
        self.last_activity = now;
    }

    /// Peer-counter window; exposed for the dispatch path and test hooks.
    pub fn peer_counter(&self) -> &PeerMessageCounter {
        &self.peer_counter
    }

    pub fn peer_counter_mut(&mut self) -> &mut PeerMessageCounter {
        &mut self.peer_counter
    }

    pub(crate) fn local_counter_mut(&mut self) -> &mut OutboundCounter {
        &mut self.local_counter
    }

    pub(crate) fn mark_defunct(&mut self) {
        self.state = SessionState::Defunct;
    }

    pub(crate) fn mark_expired(&mut self) {
        self.state = SessionState::Expired;
    }

    pub(crate) fn register_holder(&mut self, holder: Weak<RefCell<HolderState>>) {
        self.holders.push(holder);
    }

    pub(crate) fn unregister_holder(&mut self, holder: &Rc<RefCell<HolderState>>) {
        self.holders.retain(|candidate| {
            candidate
                .upgrade()
                .is_some_and(|live| !Rc::ptr_eq(&live, holder))
        });
    }

    /// Live holders in registration order; prunes dead references.
    pub(crate) fn snapshot_holders(&mut self) -> Vec<Rc<RefCell<HolderState>>> {
        self.holders.retain(|h| h.upgrade().is_some());
        self.holders.iter().filter_map(Weak::upgrade).collect()
    }

    pub(crate) fn holder_count(&mut self) -> usize {
        self.holders.retain(|h| h.upgrade().is_some());
        self.holders.len()
    }
}

impl core::fmt::Debug for SecureSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SecureSession")
            .field("local_session_id", &self.local_session_id)
            .field("peer_session_id", &self.peer_session_id)
            .field("peer_node_id", &self.peer_node_id)
            .field("fabric_index", &self.fabric_index)
            .field("type", &self.session_type)
            .field("state", &self.state)
            .field("last_activity", &self.last_activity)
            .finish()
    }
}
