#![forbid(unsafe_code)]

//! Weave secure session layer.
//!
//! Multiplexes authenticated, encrypted, replay-protected message exchanges
//! between the local node and its peers over unreliable datagram
//! transports. The [`SessionManager`] orchestrates the message pipeline:
//! prepare (frame + encrypt) on the way out, dispatch (decrypt +
//! deduplicate + deliver) on the way in. Sessions live in a fixed-capacity
//! pool with rolling 16-bit id allocation; application code observes them
//! through shift-tolerant holders rather than owning them.

pub mod counter;
pub mod crypto_context;
pub mod holder;
pub mod manager;
pub mod packet_header;
pub mod payload_header;
pub mod session;
pub mod table;

pub use counter::{OutboundCounter, PeerMessageCounter};
pub use crypto_context::{CryptoContext, SessionRole};
pub use holder::{NewSessionHandlingPolicy, SessionDelegate, SessionHolder};
pub use manager::{DuplicateMessage, PreparedMessage, SessionManager, SessionMessageDelegate};
pub use packet_header::{Destination, PacketHeader};
pub use payload_header::PayloadHeader;
pub use session::{SecureSession, SessionState, SessionType};
pub use table::{SessionHandle, SessionTable};

pub use weave_core::{Error, Result};
