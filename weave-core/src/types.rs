#![cfg_attr(test, allow(clippy::unwrap_used))]

use serde::{Deserialize, Serialize};
use std::{
    fmt,
    net::SocketAddr,
    num::NonZeroU16,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

/// 64-bit node identifier.
///
/// `0` is the undefined node id used for unfabricked (PASE) traffic; the
/// operational range excludes a reserved band at the top of the space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    pub const UNDEFINED: NodeId = NodeId(0);

    /// Upper bound (inclusive) of the operational node id range.
    pub const MAX_OPERATIONAL: u64 = 0xFFFF_FFEF_FFFF_FFFF;

    /// Whether this id may be assigned to a commissioned node.
    pub fn is_operational(self) -> bool {
        self.0 >= 1 && self.0 <= Self::MAX_OPERATIONAL
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Secure session identifier. Non-zero by construction; the raw value `0`
/// on the wire means "unsecured session" and is never allocated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub NonZeroU16);

impl SessionId {
    pub fn new(value: u16) -> Option<Self> {
        NonZeroU16::new(value).map(Self)
    }

    pub fn get(self) -> u16 {
        self.0.get()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 64-bit fabric identifier shared by all nodes on a fabric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FabricId(pub u64);

impl FabricId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for FabricId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016X}", self.0)
    }
}

/// Local index of a fabric in the fabric table. `0` marks an unfabricked
/// (PASE) session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FabricIndex(pub u8);

impl FabricIndex {
    pub const UNFABRICKED: FabricIndex = FabricIndex(0);

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for FabricIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 16-bit multicast group identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupId(pub u16);

impl GroupId {
    pub fn get(self) -> u16 {
        self.0
    }
}

/// Address of a remote peer as seen by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerAddress {
    /// UDP endpoint.
    Udp(SocketAddr),
    /// In-process loopback used by the deterministic test transport.
    Loopback,
}

impl PeerAddress {
    pub fn udp(addr: SocketAddr) -> Self {
        Self::Udp(addr)
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerAddress::Udp(a) => write!(f, "udp:{a}"),
            PeerAddress::Loopback => write!(f, "loopback"),
        }
    }
}

/// Millisecond-precision timestamp for activity tracking and sweeps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct TimestampMs(pub u64);

impl TimestampMs {
    /// Create a timestamp from the current system time.
    pub fn now() -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(now.as_millis() as u64)
    }

    /// Milliseconds elapsed since `earlier`, saturating at zero.
    pub fn millis_since(self, earlier: TimestampMs) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl fmt::Display for TimestampMs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TimestampMs {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl FromStr for TimestampMs {
    type Err = std::num::ParseIntError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}
