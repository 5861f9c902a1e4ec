//! Packet header wire codec.
//!
//! Little-endian layout:
//!
//! | field            | size      |
//! |------------------|-----------|
//! | message flags    | 1 B       |
//! | session id       | 2 B       |
//! | security flags   | 1 B       |
//! | message counter  | 4 B       |
//! | source node id   | 0 or 8 B  |
//! | destination      | 0, 2 or 8 B |
//!
//! Message flags carry the version in the high nibble, bit 2 marks a
//! present source node id, and bits 0..1 select the destination format
//! (none, 64-bit node id, 16-bit group id). The header is authenticated as
//! AAD but never encrypted.

use nom::number::complete::{le_u16, le_u32, le_u64, u8 as nom_u8};
use nom::IResult;

use weave_core::{GroupId, NodeId};

/// Source-node-id-present bit in the message flags.
pub const MSG_FLAG_SOURCE_PRESENT: u8 = 0b0000_0100;
/// Destination-format field in the message flags.
pub const MSG_FLAG_DEST_MASK: u8 = 0b0000_0011;
const DEST_NONE: u8 = 0;
const DEST_NODE: u8 = 1;
const DEST_GROUP: u8 = 2;

/// Privacy bit in the security flags.
pub const SEC_FLAG_PRIVACY: u8 = 0b1000_0000;
/// Control-message bit in the security flags.
pub const SEC_FLAG_CONTROL: u8 = 0b0100_0000;
/// Session-type field in the security flags (0 unicast, 1 group).
pub const SEC_FLAG_SESSION_TYPE_MASK: u8 = 0b0000_0011;

/// Message destination, per the flags' destination format field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
    #[default]
    None,
    Node(NodeId),
    Group(GroupId),
}

/// Decoded (or to-be-encoded) packet header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketHeader {
    pub message_version: u8,
    pub session_id: u16,
    pub security_flags: u8,
    pub message_counter: u32,
    pub source_node_id: Option<NodeId>,
    pub destination: Destination,
}

impl PacketHeader {
    pub fn new(session_id: u16, message_counter: u32) -> Self {
        Self {
            message_version: 0,
            session_id,
            security_flags: 0,
            message_counter,
            source_node_id: None,
            destination: Destination::None,
        }
    }

    /// `session id == 0` means the message is unsecured.
    pub fn is_secure(&self) -> bool {
        self.session_id != 0
    }

    pub fn encoded_len(&self) -> usize {
        let mut len = 1 + 2 + 1 + 4;
        if self.source_node_id.is_some() {
            len += 8;
        }
        len += match self.destination {
            Destination::None => 0,
            Destination::Node(_) => 8,
            Destination::Group(_) => 2,
        };
        len
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut flags = (self.message_version & 0x0F) << 4;
        if self.source_node_id.is_some() {
            flags |= MSG_FLAG_SOURCE_PRESENT;
        }
        flags |= match self.destination {
            Destination::None => DEST_NONE,
            Destination::Node(_) => DEST_NODE,
            Destination::Group(_) => DEST_GROUP,
        };

        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(flags);
        out.extend_from_slice(&self.session_id.to_le_bytes());
        out.push(self.security_flags);
        out.extend_from_slice(&self.message_counter.to_le_bytes());
        if let Some(source) = self.source_node_id {
            out.extend_from_slice(&source.get().to_le_bytes());
        }
        match self.destination {
            Destination::None => {}
            Destination::Node(node) => out.extend_from_slice(&node.get().to_le_bytes()),
            Destination::Group(group) => out.extend_from_slice(&group.get().to_le_bytes()),
        }
        out
    }

    /// Decode a header from the front of `input`; returns the header and the
    /// number of bytes it occupied. `None` when the buffer is malformed.
    pub fn decode(input: &[u8]) -> Option<(Self, usize)> {
        match parse_packet_header(input) {
            Ok((rest, header)) => Some((header, input.len() - rest.len())),
            Err(_) => None,
        }
    }
}

fn parse_packet_header(input: &[u8]) -> IResult<&[u8], PacketHeader> {
    let (input, flags) = nom_u8(input)?;
    let (input, session_id) = le_u16(input)?;
    let (input, security_flags) = nom_u8(input)?;
    let (input, message_counter) = le_u32(input)?;

    let (input, source_node_id) = if flags & MSG_FLAG_SOURCE_PRESENT != 0 {
        let (input, raw) = le_u64(input)?;
        (input, Some(NodeId(raw)))
    } else {
        (input, None)
    };

    let (input, destination) = match flags & MSG_FLAG_DEST_MASK {
        DEST_NODE => {
            let (input, raw) = le_u64(input)?;
            (input, Destination::Node(NodeId(raw)))
        }
        DEST_GROUP => {
            let (input, raw) = le_u16(input)?;
            (input, Destination::Group(GroupId(raw)))
        }
        DEST_NONE => (input, Destination::None),
        // Reserved destination format.
        _ => {
            return Err(nom::Err::Error(nom::error::Error::new(
                input,
                nom::error::ErrorKind::Tag,
            )))
        }
    };

    Ok((
        input,
        PacketHeader {
            message_version: flags >> 4,
            session_id,
            security_flags,
            message_counter,
            source_node_id,
            destination,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_header_roundtrip() {
        let header = PacketHeader::new(1, 0x0102_0304);
        let encoded = header.encode();
        assert_eq!(encoded.len(), 8);
        let (decoded, consumed) = PacketHeader::decode(&encoded).unwrap();
        assert_eq!(consumed, 8);
        assert_eq!(decoded, header);
    }

    #[test]
    fn full_header_roundtrip() {
        let header = PacketHeader {
            message_version: 0,
            session_id: 0xBEEF,
            security_flags: SEC_FLAG_PRIVACY,
            message_counter: 77,
            source_node_id: Some(NodeId(0x1122_3344_5566_7788)),
            destination: Destination::Node(NodeId(0x99AA_BBCC_DDEE_FF00)),
        };
        let encoded = header.encode();
        assert_eq!(encoded.len(), 24);
        let (decoded, consumed) = PacketHeader::decode(&encoded).unwrap();
        assert_eq!(consumed, 24);
        assert_eq!(decoded, header);
    }

    #[test]
    fn group_destination_roundtrip() {
        let header = PacketHeader {
            destination: Destination::Group(GroupId(0x0102)),
            ..PacketHeader::new(9, 1)
        };
        let encoded = header.encode();
        assert_eq!(encoded.len(), 10);
        let (decoded, _) = PacketHeader::decode(&encoded).unwrap();
        assert_eq!(decoded.destination, Destination::Group(GroupId(0x0102)));
    }

    #[test]
    fn layout_is_little_endian() {
        let header = PacketHeader::new(0x0201, 0x0605_0403);
        let encoded = header.encode();
        assert_eq!(encoded[0], 0); // flags
        assert_eq!(&encoded[1..3], &[0x01, 0x02]);
        assert_eq!(encoded[3], 0); // security flags
        assert_eq!(&encoded[4..8], &[0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn truncated_header_is_rejected() {
        let header = PacketHeader {
            source_node_id: Some(NodeId(1)),
            ..PacketHeader::new(1, 1)
        };
        let encoded = header.encode();
        assert!(PacketHeader::decode(&encoded[..encoded.len() - 1]).is_none());
        assert!(PacketHeader::decode(&[]).is_none());
    }

    #[test]
    fn reserved_destination_format_is_rejected() {
        let mut encoded = PacketHeader::new(1, 1).encode();
        encoded[0] |= 0b11; // reserved DSIZ value
        assert!(PacketHeader::decode(&encoded).is_none());
    }
}
