//! Minimal TLV reader for credential payloads.
//!
//! Covers the subset the issuer needs: anonymous and context-tagged
//! elements, structures, octet strings, unsigned integers, end-of-container.
//! The reader is a recursive-descent cursor returning (tag, value) pairs;
//! a mismatched element type fails with `WrongTlvType`, a mismatched tag or
//! truncated input with `UnexpectedTlvElement`.

use weave_core::{Error, Result};

const TAG_CONTROL_MASK: u8 = 0xE0;
const TAG_CONTROL_ANONYMOUS: u8 = 0x00;
const TAG_CONTROL_CONTEXT: u8 = 0x20;

const TYPE_MASK: u8 = 0x1F;
const TYPE_UINT_1: u8 = 0x04;
const TYPE_UINT_8: u8 = 0x07;
const TYPE_OCTET_STRING_1: u8 = 0x10;
const TYPE_OCTET_STRING_4: u8 = 0x12;
const TYPE_STRUCTURE: u8 = 0x15;
const TYPE_END_OF_CONTAINER: u8 = 0x18;

/// Element tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvTag {
    Anonymous,
    Context(u8),
}

/// Decoded element value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlvValue<'a> {
    Structure,
    EndOfContainer,
    OctetString(&'a [u8]),
    UnsignedInt(u64),
}

/// One decoded element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvElement<'a> {
    pub tag: TlvTag,
    pub value: TlvValue<'a>,
}

/// Cursor over a TLV-encoded buffer.
#[derive(Debug, Clone)]
pub struct TlvReader<'a> {
    input: &'a [u8],
}

impl<'a> TlvReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        Self { input }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.input.len() < n {
            return Err(Error::UnexpectedTlvElement);
        }
        let (head, rest) = self.input.split_at(n);
        self.input = rest;
        Ok(head)
    }

    fn take_len(&mut self, width: usize) -> Result<usize> {
        let bytes = self.take(width)?;
        let mut len = 0usize;
        for (i, b) in bytes.iter().enumerate() {
            len |= (*b as usize) << (8 * i);
        }
        Ok(len)
    }

    /// Decode the next element.
    pub fn next(&mut self) -> Result<TlvElement<'a>> {
        let control = self.take(1)?[0];
        let tag = match control & TAG_CONTROL_MASK {
            TAG_CONTROL_ANONYMOUS => TlvTag::Anonymous,
            TAG_CONTROL_CONTEXT => TlvTag::Context(self.take(1)?[0]),
            _ => return Err(Error::UnexpectedTlvElement),
        };
        let value = match control & TYPE_MASK {
            TYPE_STRUCTURE => TlvValue::Structure,
            TYPE_END_OF_CONTAINER => TlvValue::EndOfContainer,
            t @ TYPE_OCTET_STRING_1..=TYPE_OCTET_STRING_4 => {
                let width = 1 << (t - TYPE_OCTET_STRING_1);
                let len = self.take_len(width)?;
                TlvValue::OctetString(self.take(len)?)
            }
            t @ TYPE_UINT_1..=TYPE_UINT_8 => {
                let width = 1 << (t - TYPE_UINT_1);
                let bytes = self.take(width)?;
                let mut v = 0u64;
                for (i, b) in bytes.iter().enumerate() {
                    v |= (*b as u64) << (8 * i);
                }
                TlvValue::UnsignedInt(v)
            }
            _ => return Err(Error::WrongTlvType),
        };
        Ok(TlvElement { tag, value })
    }

    /// Require the next element to open a structure carrying `tag`.
    pub fn expect_structure(&mut self, tag: TlvTag) -> Result<()> {
        let element = self.next()?;
        if element.value != TlvValue::Structure {
            return Err(Error::WrongTlvType);
        }
        if element.tag != tag {
            return Err(Error::UnexpectedTlvElement);
        }
        Ok(())
    }

    /// Require the next element to be an octet string carrying `tag`.
    pub fn expect_octet_string(&mut self, tag: TlvTag) -> Result<&'a [u8]> {
        let element = self.next()?;
        let TlvValue::OctetString(bytes) = element.value else {
            return Err(Error::WrongTlvType);
        };
        if element.tag != tag {
            return Err(Error::UnexpectedTlvElement);
        }
        Ok(bytes)
    }

    /// Require the next element to close the current container.
    pub fn expect_end_of_container(&mut self) -> Result<()> {
        match self.next()?.value {
            TlvValue::EndOfContainer => Ok(()),
            _ => Err(Error::WrongTlvType),
        }
    }
}

/// Encode `payload` as a context-tagged octet string inside an anonymous
/// structure, the envelope the issuer expects around a DER CSR.
pub fn octet_string_envelope(context_tag: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 8);
    out.push(TAG_CONTROL_ANONYMOUS | TYPE_STRUCTURE);
    if payload.len() < 256 {
        out.push(TAG_CONTROL_CONTEXT | TYPE_OCTET_STRING_1);
        out.push(context_tag);
        out.push(payload.len() as u8);
    } else {
        out.push(TAG_CONTROL_CONTEXT | (TYPE_OCTET_STRING_1 + 1));
        out.push(context_tag);
        out.extend_from_slice(&(payload.len() as u16).to_le_bytes());
    }
    out.extend_from_slice(payload);
    out.push(TAG_CONTROL_ANONYMOUS | TYPE_END_OF_CONTAINER);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_roundtrip_short() {
        let encoded = octet_string_envelope(1, b"csr-bytes");
        let mut reader = TlvReader::new(&encoded);
        reader.expect_structure(TlvTag::Anonymous).unwrap();
        assert_eq!(
            reader.expect_octet_string(TlvTag::Context(1)).unwrap(),
            b"csr-bytes"
        );
        reader.expect_end_of_container().unwrap();
    }

    #[test]
    fn envelope_roundtrip_long() {
        let payload = vec![0xAB; 700];
        let encoded = octet_string_envelope(1, &payload);
        let mut reader = TlvReader::new(&encoded);
        reader.expect_structure(TlvTag::Anonymous).unwrap();
        assert_eq!(
            reader.expect_octet_string(TlvTag::Context(1)).unwrap(),
            &payload[..]
        );
    }

    #[test]
    fn wrong_type_is_reported() {
        // Anonymous uint where a structure is required.
        let encoded = [0x04u8, 0x2A];
        let mut reader = TlvReader::new(&encoded);
        assert!(matches!(
            reader.expect_structure(TlvTag::Anonymous),
            Err(Error::WrongTlvType)
        ));
    }

    #[test]
    fn wrong_tag_is_reported() {
        let encoded = octet_string_envelope(2, b"x");
        let mut reader = TlvReader::new(&encoded);
        reader.expect_structure(TlvTag::Anonymous).unwrap();
        assert!(matches!(
            reader.expect_octet_string(TlvTag::Context(1)),
            Err(Error::UnexpectedTlvElement)
        ));
    }

    #[test]
    fn truncated_input_is_reported() {
        let mut encoded = octet_string_envelope(1, b"csr-bytes");
        encoded.truncate(6);
        let mut reader = TlvReader::new(&encoded);
        reader.expect_structure(TlvTag::Anonymous).unwrap();
        assert!(matches!(
            reader.expect_octet_string(TlvTag::Context(1)),
            Err(Error::UnexpectedTlvElement)
        ));
    }

    #[test]
    fn unsigned_int_widths() {
        // Context tag 3, 2-byte uint 0x0201.
        let encoded = [TAG_CONTROL_CONTEXT | (TYPE_UINT_1 + 1), 0x03, 0x01, 0x02];
        let mut reader = TlvReader::new(&encoded);
        let element = reader.next().unwrap();
        assert_eq!(element.tag, TlvTag::Context(3));
        assert_eq!(element.value, TlvValue::UnsignedInt(0x0201));
    }
}
