//! Session manager: the message pipeline and session lifecycle.
//!
//! All entry points run on the single-threaded event loop. Outbound,
//! `prepare_message` consumes the session's next counter, frames the
//! payload header and body, seals them with the session key, and
//! `send_prepared_message` hands the result to the transport. Inbound,
//! `on_message_received` locates the session by local id, opens the
//! envelope, checks the peer's replay window, and delivers to the
//! registered message delegate. Low-level failures on the inbound path are
//! dropped without a reply; nothing leaks to unauthenticated senders.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{debug, error, info, warn};

use weave_core::config::MAX_APP_MESSAGE_LEN;
use weave_core::{Clock, Error, FabricIndex, NodeId, PeerAddress, Result, SessionId, TimestampMs};
use weave_crypto::build_nonce;
use weave_fabric::FabricTable;
use weave_transport::{InboundHandler, Transport};

use crate::crypto_context::{CryptoContext, SessionRole};
use crate::holder::{NewSessionHandlingPolicy, SessionHolder};
use crate::packet_header::{Destination, PacketHeader};
use crate::payload_header::PayloadHeader;
use crate::session::{SecureSession, SessionType};
use crate::table::{SessionHandle, SessionTable};

/// Duplicate marker handed to the message delegate. Dispatch drops
/// replayed counters before delivery, so every delivered message carries
/// `No`; the flag stays in the delegate signature for dispatch paths that
/// deliver duplicates (reliability-layer re-acknowledgement).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMessage {
    No,
    Yes,
}

/// Application-facing sink for dispatched messages.
pub trait SessionMessageDelegate {
    fn on_message_received(
        &mut self,
        packet_header: &PacketHeader,
        payload_header: &PayloadHeader,
        session: SessionHandle,
        is_duplicate: DuplicateMessage,
        payload: &[u8],
    );
}

/// An encrypted, framed message ready for the transport.
///
/// The packet header prefix stays readable (it is authenticated, not
/// encrypted), so tests can clone a prepared message and rewrite header
/// fields to build adversarial inputs.
#[derive(Debug, Clone)]
pub struct PreparedMessage {
    bytes: Vec<u8>,
}

impl PreparedMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Decode the cleartext packet header prefix.
    pub fn packet_header(&self) -> Result<PacketHeader> {
        PacketHeader::decode(&self.bytes)
            .map(|(header, _)| header)
            .ok_or(Error::Internal("prepared message header unparseable"))
    }

    /// Replace the packet header prefix. The envelope is left untouched, so
    /// a rewritten message will fail authentication at the receiver; this
    /// exists to construct adversarial packets in tests.
    pub fn replace_packet_header(&mut self, header: &PacketHeader) -> Result<()> {
        let (_, old_len) = PacketHeader::decode(&self.bytes)
            .ok_or(Error::Internal("prepared message header unparseable"))?;
        let mut bytes = header.encode();
        bytes.extend_from_slice(&self.bytes[old_len..]);
        self.bytes = bytes;
        Ok(())
    }
}

struct Runtime {
    clock: Rc<dyn Clock>,
    transport: Rc<RefCell<dyn Transport>>,
    fabrics: Rc<RefCell<FabricTable>>,
}

/// Orchestrates secure sessions and the message pipeline.
pub struct SessionManager {
    table: SessionTable,
    runtime: Option<Runtime>,
    delegate: Option<Rc<RefCell<dyn SessionMessageDelegate>>>,
    idle_timeout_ms: u64,
}

impl SessionManager {
    pub fn new() -> Self {
        Self {
            table: SessionTable::new(),
            runtime: None,
            delegate: None,
            idle_timeout_ms: weave_core::config::SessionConfig::default().idle_timeout_ms,
        }
    }

    /// Bind collaborators. Fails if already initialized.
    pub fn init(
        &mut self,
        clock: Rc<dyn Clock>,
        transport: Rc<RefCell<dyn Transport>>,
        fabrics: Rc<RefCell<FabricTable>>,
    ) -> Result<()> {
        if self.runtime.is_some() {
            return Err(Error::IncorrectState("session manager already initialized"));
        }
        self.runtime = Some(Runtime {
            clock,
            transport,
            fabrics,
        });
        info!("session manager initialized");
        Ok(())
    }

    pub fn set_message_delegate(&mut self, delegate: Rc<RefCell<dyn SessionMessageDelegate>>) {
        self.delegate = Some(delegate);
    }

    pub fn set_idle_timeout_ms(&mut self, idle_timeout_ms: u64) {
        self.idle_timeout_ms = idle_timeout_ms;
    }

    fn runtime(&self) -> Result<&Runtime> {
        self.runtime
            .as_ref()
            .ok_or(Error::IncorrectState("session manager not initialized"))
    }

    fn now(&self) -> TimestampMs {
        self.runtime
            .as_ref()
            .map(|r| r.clock.now())
            .unwrap_or_default()
    }

    /// Allocate a pending session from the pool.
    pub fn allocate_session(&mut self, session_type: SessionType) -> Result<SessionHandle> {
        self.table.allocate(session_type)
    }

    pub fn session(&self, handle: SessionHandle) -> Option<&SecureSession> {
        self.table.get(handle)
    }

    pub fn session_mut(&mut self, handle: SessionHandle) -> Option<&mut SecureSession> {
        self.table.get_mut(handle)
    }

    pub fn live_session_count(&self) -> usize {
        self.table.live_count()
    }

    /// Bind `holder` to `handle`, unbinding it from any previous session.
    pub fn hold(&mut self, holder: &SessionHolder, handle: SessionHandle) -> Result<()> {
        if self.table.get(handle).is_none() {
            return Err(Error::NotFound("session"));
        }
        if let Some(previous) = holder.session() {
            if let Some(session) = self.table.get_mut(previous) {
                session.unregister_holder(holder.state());
            }
        }
        holder.state().borrow_mut().session = Some(handle);
        if let Some(session) = self.table.get_mut(handle) {
            session.register_holder(Rc::downgrade(holder.state()));
        }
        Ok(())
    }

    /// Unbind `holder` without touching the session's lifetime.
    pub fn release_holder(&mut self, holder: &SessionHolder) {
        if let Some(handle) = holder.session() {
            if let Some(session) = self.table.get_mut(handle) {
                session.unregister_holder(holder.state());
            }
        }
        holder.state().borrow_mut().session = None;
    }

    /// Test-only: install a PASE session with the deterministic test key.
    #[allow(clippy::too_many_arguments)]
    pub fn inject_pase_session_with_test_key(
        &mut self,
        holder: &SessionHolder,
        local_session_id: u16,
        peer_node_id: NodeId,
        peer_session_id: u16,
        fabric_index: FabricIndex,
        peer_address: PeerAddress,
        role: SessionRole,
    ) -> Result<SessionHandle> {
        self.inject_session_with_test_key(
            holder,
            SessionType::Pase,
            local_session_id,
            peer_session_id,
            NodeId::UNDEFINED,
            peer_node_id,
            fabric_index,
            peer_address,
            role,
        )
    }

    /// Test-only: install a CASE session with the deterministic test key.
    #[allow(clippy::too_many_arguments)]
    pub fn inject_case_session_with_test_key(
        &mut self,
        holder: &SessionHolder,
        local_session_id: u16,
        peer_session_id: u16,
        local_node_id: NodeId,
        peer_node_id: NodeId,
        fabric_index: FabricIndex,
        peer_address: PeerAddress,
        role: SessionRole,
    ) -> Result<SessionHandle> {
        self.inject_session_with_test_key(
            holder,
            SessionType::Case,
            local_session_id,
            peer_session_id,
            local_node_id,
            peer_node_id,
            fabric_index,
            peer_address,
            role,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn inject_session_with_test_key(
        &mut self,
        holder: &SessionHolder,
        session_type: SessionType,
        local_session_id: u16,
        peer_session_id: u16,
        local_node_id: NodeId,
        peer_node_id: NodeId,
        fabric_index: FabricIndex,
        peer_address: PeerAddress,
        role: SessionRole,
    ) -> Result<SessionHandle> {
        let local_id = SessionId::new(local_session_id)
            .ok_or(Error::IncorrectState("session id 0 is reserved"))?;
        let handle = self.table.allocate_with_id(local_id, session_type)?;
        let now = self.now();
        if let Some(session) = self.table.get_mut(handle) {
            session.activate(
                peer_session_id,
                local_node_id,
                peer_node_id,
                fabric_index,
                peer_address,
                CryptoContext::with_test_key(role),
                now,
            );
        }
        self.hold(holder, handle)?;
        debug!(local_session_id, peer_session_id, "test session injected");
        Ok(handle)
    }

    /// Encrypt and frame `payload` for `session`. Consumes the session's
    /// next outbound counter; the payload-length check runs first so an
    /// oversized message leaves the session untouched.
    pub fn prepare_message(
        &mut self,
        handle: SessionHandle,
        payload_header: &PayloadHeader,
        payload: &[u8],
    ) -> Result<PreparedMessage> {
        self.runtime()?;
        if payload.len() > MAX_APP_MESSAGE_LEN {
            return Err(Error::MessageTooLong);
        }
        let now = self.now();
        let local_node = self.outbound_source_node(handle);
        let session = self
            .table
            .get_mut(handle)
            .ok_or(Error::NotFound("session"))?;
        let counter = session
            .local_counter_mut()
            .advance()
            .ok_or(Error::IncorrectState("outbound message counter exhausted"))?;

        let mut header = PacketHeader::new(session.peer_session_id(), counter);
        if session.session_type() == SessionType::Case {
            header.source_node_id = Some(local_node);
            header.destination = Destination::Node(session.peer_node_id());
        }

        let crypto = session
            .crypto()
            .ok_or(Error::IncorrectState("session has no key material"))?;

        let mut plaintext = payload_header.encode();
        plaintext.extend_from_slice(payload);

        let header_bytes = header.encode();
        let nonce = build_nonce(
            header.security_flags,
            counter,
            header.source_node_id.unwrap_or(NodeId::UNDEFINED).get(),
        );
        let sealed = crypto.encrypt(&nonce, &header_bytes, &plaintext)?;

        session.touch(now);

        let mut bytes = header_bytes;
        bytes.extend_from_slice(&sealed);
        Ok(PreparedMessage { bytes })
    }

    /// Source node id for an outbound CASE message: prefer the fabric
    /// table's record for the session's fabric, fall back to what session
    /// establishment stored.
    fn outbound_source_node(&self, handle: SessionHandle) -> NodeId {
        let Some(session) = self.table.get(handle) else {
            return NodeId::UNDEFINED;
        };
        let from_fabric = self.runtime.as_ref().and_then(|r| {
            r.fabrics
                .borrow()
                .find(session.fabric_index())
                .map(|f| f.node_id)
        });
        from_fabric.unwrap_or_else(|| session.local_node_id())
    }

    /// Hand a prepared message to the transport. Session state is not
    /// mutated; the counter was consumed at prepare time, so the same
    /// prepared message can be re-sent to exercise the receiver's replay
    /// protection.
    pub fn send_prepared_message(
        &mut self,
        handle: SessionHandle,
        message: &PreparedMessage,
    ) -> Result<()> {
        let runtime = self.runtime()?;
        let session = self.table.get(handle).ok_or(Error::NotFound("session"))?;
        let peer = session
            .peer_address()
            .ok_or(Error::IncorrectState("session has no peer address"))?;
        runtime
            .transport
            .borrow_mut()
            .send(peer, message.bytes.clone())
    }

    /// Inbound dispatch. Every failure short of delivery is a silent drop:
    /// no error response goes back to an unauthenticated sender.
    pub fn on_message_received(&mut self, source: PeerAddress, message: Vec<u8>) {
        let Some((header, header_len)) = PacketHeader::decode(&message) else {
            debug!(%source, "dropping message with malformed packet header");
            return;
        };
        if !header.is_secure() {
            debug!(%source, "dropping unsecured message");
            return;
        }
        let Some(handle) = self.table.find_by_local_id(header.session_id) else {
            debug!(%source, session_id = header.session_id, "dropping message for unknown session");
            return;
        };
        let now = self.now();
        let Some(session) = self.table.get_mut(handle) else {
            return;
        };
        let Some(crypto) = session.crypto() else {
            debug!(session_id = header.session_id, "dropping message for keyless session");
            return;
        };

        let nonce = build_nonce(
            header.security_flags,
            header.message_counter,
            header.source_node_id.unwrap_or(NodeId::UNDEFINED).get(),
        );
        let (aad, envelope) = message.split_at(header_len);
        let plaintext = match crypto.decrypt(&nonce, aad, envelope) {
            Ok(plaintext) => plaintext,
            Err(_) => {
                debug!(session_id = header.session_id, "dropping message that failed to decrypt");
                return;
            }
        };

        let Some((payload_header, payload_len)) = PayloadHeader::decode(&plaintext) else {
            debug!(session_id = header.session_id, "dropping message with malformed payload header");
            return;
        };
        let payload = &plaintext[payload_len..];

        // Replayed counters are dropped outright, duplicates included.
        if let Err(rejection) = session.peer_counter().verify(header.message_counter) {
            debug!(
                session_id = header.session_id,
                counter = header.message_counter,
                ?rejection,
                "dropping replayed message"
            );
            return;
        }
        session.peer_counter_mut().commit(header.message_counter);

        session.touch(now);

        let Some(delegate) = self.delegate.clone() else {
            warn!("message arrived with no delegate registered");
            return;
        };
        delegate.borrow_mut().on_message_received(
            &header,
            &payload_header,
            handle,
            DuplicateMessage::No,
            payload,
        );
    }

    /// Rebind holders of older sessions to the same peer onto
    /// `new_session`, honoring each holder's policy. Holders are visited in
    /// registration order and their delegates are not invoked. An old
    /// session left without a single holder is a contract violation: the
    /// shift still completes, but the call reports `IncorrectState`.
    pub fn shift_to_session(&mut self, new_session: SessionHandle) -> Result<()> {
        let (fabric, peer_node) = {
            let session = self
                .table
                .get(new_session)
                .ok_or(Error::NotFound("session"))?;
            (session.fabric_index(), session.peer_node_id())
        };

        let mut outcome = Ok(());
        for old in self.table.find_by_peer(fabric, peer_node) {
            if old == new_session {
                continue;
            }
            let holders = match self.table.get_mut(old) {
                Some(session) => session.snapshot_holders(),
                None => continue,
            };
            for holder in holders {
                // Clone the delegate out so the policy query runs without
                // the holder borrowed.
                let delegate = holder.borrow().delegate.clone();
                let policy = delegate
                    .map(|d| d.new_session_handling_policy())
                    .unwrap_or(NewSessionHandlingPolicy::ShiftToNewSession);
                if policy == NewSessionHandlingPolicy::StayAtOldSession {
                    continue;
                }
                if let Some(session) = self.table.get_mut(old) {
                    session.unregister_holder(&holder);
                }
                holder.borrow_mut().session = Some(new_session);
                if let Some(session) = self.table.get_mut(new_session) {
                    session.register_holder(Rc::downgrade(&holder));
                }
            }
            if let Some(session) = self.table.get_mut(old) {
                if session.holder_count() == 0 {
                    error!(
                        old_session = ?session.local_session_id(),
                        "session shift abandoned its old session"
                    );
                    outcome = Err(Error::IncorrectState(
                        "session shift left the old session without holders",
                    ));
                }
            }
        }
        outcome
    }

    /// Expire one session: notify and unbind its holders, free the slot.
    pub fn expire_session(&mut self, handle: SessionHandle) {
        let holders = match self.table.get_mut(handle) {
            Some(session) => {
                session.mark_expired();
                session.snapshot_holders()
            }
            None => return,
        };
        for holder in holders {
            let delegate = holder.borrow().delegate.clone();
            holder.borrow_mut().session = None;
            if let Some(delegate) = delegate {
                delegate.on_session_released();
            }
        }
        if let Some(session) = self.table.release(handle) {
            debug!(session = ?session.local_session_id(), "session expired");
        }
    }

    /// Mark a session unresponsive without freeing it; dispatch stops
    /// finding it but holders stay bound.
    pub fn mark_session_defunct(&mut self, handle: SessionHandle) -> Result<()> {
        let session = self
            .table
            .get_mut(handle)
            .ok_or(Error::NotFound("session"))?;
        session.mark_defunct();
        Ok(())
    }

    /// Reliability-layer signal: the peer has gone quiet. Handlers must not
    /// tear the session down from inside the notification; they get no
    /// manager access, so they cannot.
    pub fn notify_session_hang(&mut self, handle: SessionHandle) {
        let holders = match self.table.get_mut(handle) {
            Some(session) => session.snapshot_holders(),
            None => return,
        };
        for holder in holders {
            let delegate = holder.borrow().delegate.clone();
            if let Some(delegate) = delegate {
                delegate.on_session_hang();
            }
        }
    }

    /// Reliability-layer signal: the first send on an exchange never got
    /// through.
    pub fn notify_first_message_delivery_failed(&mut self, handle: SessionHandle) {
        let holders = match self.table.get_mut(handle) {
            Some(session) => session.snapshot_holders(),
            None => return,
        };
        for holder in holders {
            let delegate = holder.borrow().delegate.clone();
            if let Some(delegate) = delegate {
                delegate.on_first_message_delivery_failed();
            }
        }
    }

    /// Periodic sweep: expire sessions idle past the configured timeout.
    pub fn expire_inactive(&mut self) {
        let Some(runtime) = self.runtime.as_ref() else {
            return;
        };
        let now = runtime.clock.now();
        let timeout = self.idle_timeout_ms;
        let stale: Vec<SessionHandle> = self
            .table
            .handles()
            .into_iter()
            .filter(|handle| match self.table.get(*handle) {
                Some(session) => now.millis_since(session.last_activity()) > timeout,
                None => false,
            })
            .collect();
        for handle in stale {
            info!("expiring idle session");
            self.expire_session(handle);
        }
    }

    /// Expire every live session and drop collaborators.
    pub fn shutdown(&mut self) {
        for handle in self.table.handles() {
            self.expire_session(handle);
        }
        self.runtime = None;
        self.delegate = None;
        info!("session manager shut down");
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl InboundHandler for SessionManager {
    fn handle_message(&mut self, source: PeerAddress, message: Vec<u8>) {
        self.on_message_received(source, message);
    }
}
