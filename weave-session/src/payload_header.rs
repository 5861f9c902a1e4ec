//! Payload header codec.
//!
//! Travels inside the encrypted envelope, in front of the application
//! payload: exchange flags (1 B), message type (1 B), exchange id (2 B LE),
//! protocol id (2 B LE), and an optional 4-byte acked counter when the ack
//! flag is set.

use nom::number::complete::{le_u16, le_u32, u8 as nom_u8};
use nom::IResult;

/// Initiator bit: set on messages sent by the exchange initiator.
pub const EXCHANGE_FLAG_INITIATOR: u8 = 0b0000_0001;
/// Ack bit: an acknowledged counter follows the protocol id.
pub const EXCHANGE_FLAG_ACK: u8 = 0b0000_0010;
/// Reliability bit: the sender wants this message acknowledged.
pub const EXCHANGE_FLAG_RELIABILITY: u8 = 0b0000_0100;

/// Decoded (or to-be-encoded) payload header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadHeader {
    pub initiator: bool,
    /// Counter of the peer message this one acknowledges.
    pub ack_counter: Option<u32>,
    /// Whether the sender requests an acknowledgement.
    pub requires_ack: bool,
    pub message_type: u8,
    pub exchange_id: u16,
    pub protocol_id: u16,
}

impl PayloadHeader {
    pub fn new(exchange_id: u16, protocol_id: u16, message_type: u8) -> Self {
        Self {
            initiator: false,
            ack_counter: None,
            requires_ack: false,
            message_type,
            exchange_id,
            protocol_id,
        }
    }

    pub fn set_initiator(&mut self, initiator: bool) -> &mut Self {
        self.initiator = initiator;
        self
    }

    pub fn encoded_len(&self) -> usize {
        1 + 1 + 2 + 2 + if self.ack_counter.is_some() { 4 } else { 0 }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut flags = 0u8;
        if self.initiator {
            flags |= EXCHANGE_FLAG_INITIATOR;
        }
        if self.ack_counter.is_some() {
            flags |= EXCHANGE_FLAG_ACK;
        }
        if self.requires_ack {
            flags |= EXCHANGE_FLAG_RELIABILITY;
        }

        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(flags);
        out.push(self.message_type);
        out.extend_from_slice(&self.exchange_id.to_le_bytes());
        out.extend_from_slice(&self.protocol_id.to_le_bytes());
        if let Some(ack) = self.ack_counter {
            out.extend_from_slice(&ack.to_le_bytes());
        }
        out
    }

    /// Decode from the front of a decrypted envelope; returns the header and
    /// its size. `None` when truncated.
    pub fn decode(input: &[u8]) -> Option<(Self, usize)> {
        match parse_payload_header(input) {
            Ok((rest, header)) => Some((header, input.len() - rest.len())),
            Err(_) => None,
        }
    }
}

fn parse_payload_header(input: &[u8]) -> IResult<&[u8], PayloadHeader> {
    let (input, flags) = nom_u8(input)?;
    let (input, message_type) = nom_u8(input)?;
    let (input, exchange_id) = le_u16(input)?;
    let (input, protocol_id) = le_u16(input)?;
    let (input, ack_counter) = if flags & EXCHANGE_FLAG_ACK != 0 {
        let (input, ack) = le_u32(input)?;
        (input, Some(ack))
    } else {
        (input, None)
    };
    Ok((
        input,
        PayloadHeader {
            initiator: flags & EXCHANGE_FLAG_INITIATOR != 0,
            ack_counter,
            requires_ack: flags & EXCHANGE_FLAG_RELIABILITY != 0,
            message_type,
            exchange_id,
            protocol_id,
        },
    ))
}
