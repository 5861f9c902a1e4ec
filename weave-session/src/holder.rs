//! Session holders.
//!
//! A holder is a named observer of a session, not an owner: the session
//! table owns the record, the holder carries a handle that survives session
//! shift and goes empty when the session is released. Sessions track their
//! holders through weak references, so a dropped holder simply disappears
//! from the list.

use std::cell::RefCell;
use std::rc::Rc;

use crate::table::SessionHandle;

/// What a holder wants done when a fresh secure channel to its peer
/// appears.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewSessionHandlingPolicy {
    ShiftToNewSession,
    StayAtOldSession,
}

/// Policy and lifecycle notifications for a holder.
///
/// `new_session_handling_policy` is consulted during a shift and must not
/// reach back into the session pool; the manager is mutably borrowed for
/// the whole operation, so an implementation has no path to it anyway.
/// `on_session_hang` and `on_first_message_delivery_failed` fire from the
/// reliability layer and must not destroy the session synchronously.
pub trait SessionDelegate {
    fn new_session_handling_policy(&self) -> NewSessionHandlingPolicy {
        NewSessionHandlingPolicy::ShiftToNewSession
    }

    /// The held session is going away; the holder is already unbound.
    fn on_session_released(&self);

    fn on_first_message_delivery_failed(&self) {}

    fn on_session_hang(&self) {}
}

pub(crate) struct HolderState {
    pub(crate) session: Option<SessionHandle>,
    pub(crate) delegate: Option<Rc<dyn SessionDelegate>>,
}

/// Shift-tolerant reference to a session in the table.
pub struct SessionHolder {
    state: Rc<RefCell<HolderState>>,
}

impl SessionHolder {
    /// Plain holder: follows the default shift-to-new-session policy and
    /// receives no notifications.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(HolderState {
                session: None,
                delegate: None,
            })),
        }
    }

    /// Holder with an attached delegate controlling shift policy and
    /// receiving lifecycle events.
    pub fn with_delegate(delegate: Rc<dyn SessionDelegate>) -> Self {
        Self {
            state: Rc::new(RefCell::new(HolderState {
                session: None,
                delegate: Some(delegate),
            })),
        }
    }

    /// Handle of the currently held session, if any.
    pub fn session(&self) -> Option<SessionHandle> {
        self.state.borrow().session
    }

    pub fn is_bound(&self) -> bool {
        self.session().is_some()
    }

    pub fn contains(&self, handle: SessionHandle) -> bool {
        self.session() == Some(handle)
    }

    pub(crate) fn state(&self) -> &Rc<RefCell<HolderState>> {
        &self.state
    }
}

impl Default for SessionHolder {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for SessionHolder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SessionHolder")
            .field("session", &self.session())
            .finish()
    }
}
