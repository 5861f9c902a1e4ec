//! AES-CCM-128 message protection.
//!
//! Secure messages are sealed with a 13-byte nonce derived from the
//! security flags, the 32-bit message counter, and the 64-bit source node
//! id (little-endian), with the encoded packet header as associated data.
//! Both endpoints rebuild the nonce from the header they exchange, so a
//! tampered header fails authentication rather than decrypting garbage.

use aes::Aes128;
use ccm::aead::generic_array::GenericArray;
use ccm::aead::{Aead, KeyInit, Payload};
use ccm::consts::{U13, U16};
use ccm::Ccm;

use crate::keys::SymmetricKey;
use crate::{Error, Result};

type Aes128Ccm = Ccm<Aes128, U16, U13>;

/// CCM nonce length in bytes.
pub const CCM_NONCE_LEN: usize = 13;

/// CCM authentication tag length in bytes.
pub const CCM_TAG_LEN: usize = 16;

/// Build the message-protection nonce for one packet.
pub fn build_nonce(security_flags: u8, message_counter: u32, source_node_id: u64) -> [u8; CCM_NONCE_LEN] {
    let mut nonce = [0u8; CCM_NONCE_LEN];
    nonce[0] = security_flags;
    nonce[1..5].copy_from_slice(&message_counter.to_le_bytes());
    nonce[5..13].copy_from_slice(&source_node_id.to_le_bytes());
    nonce
}

/// AES-CCM-128 cipher bound to one key.
pub struct CcmCipher {
    cipher: Aes128Ccm,
}

impl CcmCipher {
    pub fn new(key: &SymmetricKey) -> Self {
        Self {
            cipher: Aes128Ccm::new(GenericArray::from_slice(&key.0)),
        }
    }

    /// Encrypt and authenticate `plaintext`; the tag is appended.
    pub fn seal(&self, nonce: &[u8; CCM_NONCE_LEN], aad: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        self.cipher
            .encrypt(
                GenericArray::from_slice(nonce),
                Payload {
                    msg: plaintext,
                    aad,
                },
            )
            .map_err(|_| Error::crypto("ccm seal failed"))
    }

    /// Verify and decrypt `ciphertext` (tag included).
    pub fn open(&self, nonce: &[u8; CCM_NONCE_LEN], aad: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        if ciphertext.len() < CCM_TAG_LEN {
            return Err(Error::crypto("ciphertext shorter than tag"));
        }
        self.cipher
            .decrypt(
                GenericArray::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad,
                },
            )
            .map_err(|_| Error::crypto("ccm open failed"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cipher() -> CcmCipher {
        CcmCipher::new(&SymmetricKey(*b"0123456789abcdef"))
    }

    #[test]
    fn seal_open_roundtrip() {
        let c = cipher();
        let nonce = build_nonce(0, 7, 0x1122_3344_5566_7788);
        let ct = c.seal(&nonce, b"header", b"payload").unwrap();
        assert_eq!(ct.len(), b"payload".len() + CCM_TAG_LEN);
        assert_eq!(c.open(&nonce, b"header", &ct).unwrap(), b"payload");
    }

    #[test]
    fn open_fails_with_wrong_aad() {
        let c = cipher();
        let nonce = build_nonce(0, 1, 2);
        let ct = c.seal(&nonce, b"A", b"m").unwrap();
        assert!(c.open(&nonce, b"B", &ct).is_err());
    }

    #[test]
    fn open_fails_with_wrong_counter_in_nonce() {
        let c = cipher();
        let ct = c.seal(&build_nonce(0, 1, 2), b"hdr", b"m").unwrap();
        assert!(c.open(&build_nonce(0, 2, 2), b"hdr", &ct).is_err());
    }

    #[test]
    fn open_rejects_truncated_ciphertext() {
        let c = cipher();
        assert!(c.open(&build_nonce(0, 1, 2), b"", &[0u8; 7]).is_err());
    }

    #[test]
    fn nonce_layout_is_little_endian() {
        let nonce = build_nonce(0xC0, 0x0102_0304, 0x0A0B_0C0D_0E0F_1011);
        assert_eq!(nonce[0], 0xC0);
        assert_eq!(&nonce[1..5], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(
            &nonce[5..13],
            &[0x11, 0x10, 0x0F, 0x0E, 0x0D, 0x0C, 0x0B, 0x0A]
        );
    }

    proptest! {
        #[test]
        fn roundtrip_random_input(aad in proptest::collection::vec(any::<u8>(), 0..64),
                                  msg in proptest::collection::vec(any::<u8>(), 0..512)) {
            let c = cipher();
            let nonce = build_nonce(0, 9, 9);
            let ct = c.seal(&nonce, &aad, &msg);
            prop_assert!(ct.is_ok());
            let pt = c.open(&nonce, &aad, &ct.unwrap());
            prop_assert!(pt.is_ok());
            prop_assert_eq!(pt.unwrap(), msg);
        }
    }
}
