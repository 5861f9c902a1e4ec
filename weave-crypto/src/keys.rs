//! Key material types.
//!
//! Symmetric session keys zeroize on drop. P-256 keypairs serialize to a
//! fixed `public(65) || secret(32)` blob so the credential issuer can
//! persist them and later reload exactly what it wrote.

use p256::ecdsa::{SigningKey, VerifyingKey};
use tracing::debug;
use zeroize::Zeroize;

use crate::drbg;
use crate::{Error, Result};

/// AES-CCM-128 key length in bytes.
pub const AES_CCM128_KEY_LENGTH: usize = 16;

/// Serialized keypair length: uncompressed SEC1 point plus scalar.
pub const P256_SERIALIZED_KEYPAIR_LENGTH: usize = 65 + 32;

/// Symmetric session key (zeroized on drop).
#[derive(Clone)]
pub struct SymmetricKey(pub [u8; AES_CCM128_KEY_LENGTH]);

impl SymmetricKey {
    /// Deterministic key installed by the test-only session constructors.
    pub fn test_key() -> Self {
        Self(*b"WeaveTestSessKey")
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl core::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// ECDSA P-256 keypair used for certificate signing and CSR verification.
#[derive(Clone)]
pub struct P256Keypair {
    signing: SigningKey,
}

impl P256Keypair {
    /// Generate a fresh keypair from the DRBG.
    pub fn generate() -> Result<Self> {
        // A 256-bit draw lands outside the scalar field with probability
        // around 2^-128; retry rather than bias by reduction.
        for _ in 0..4 {
            let mut candidate = [0u8; 32];
            drbg::fill_random(&mut candidate)?;
            let parsed = SigningKey::from_slice(&candidate);
            candidate.zeroize();
            if let Ok(signing) = parsed {
                debug!("generated fresh P-256 keypair");
                return Ok(Self { signing });
            }
        }
        Err(Error::Internal("keypair generation rejected by field"))
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        *self.signing.verifying_key()
    }

    /// Uncompressed SEC1 public key point (65 bytes).
    pub fn public_key_sec1(&self) -> Vec<u8> {
        self.verifying_key()
            .to_encoded_point(false)
            .as_bytes()
            .to_vec()
    }

    /// Serialize as `public(65) || secret(32)`.
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(P256_SERIALIZED_KEYPAIR_LENGTH);
        out.extend_from_slice(&self.public_key_sec1());
        out.extend_from_slice(&self.signing.to_bytes());
        out
    }

    /// Reload a keypair previously produced by [`P256Keypair::serialize`].
    /// The embedded public key must match the secret scalar.
    pub fn deserialize(blob: &[u8]) -> Result<Self> {
        if blob.len() != P256_SERIALIZED_KEYPAIR_LENGTH {
            return Err(Error::crypto("serialized keypair has wrong length"));
        }
        let signing = SigningKey::from_slice(&blob[65..])
            .map_err(|e| Error::crypto(format!("keypair secret invalid: {e}")))?;
        let restored = Self { signing };
        if restored.public_key_sec1() != blob[..65] {
            return Err(Error::crypto("serialized keypair is inconsistent"));
        }
        Ok(restored)
    }
}

impl core::fmt::Debug for P256Keypair {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("P256Keypair")
            .field("public", &hex_upper(&self.public_key_sec1()[..8]))
            .finish()
    }
}

fn hex_upper(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_serialization_roundtrip() {
        let pair = P256Keypair::generate().unwrap();
        let blob = pair.serialize();
        assert_eq!(blob.len(), P256_SERIALIZED_KEYPAIR_LENGTH);
        let restored = P256Keypair::deserialize(&blob).unwrap();
        assert_eq!(restored.public_key_sec1(), pair.public_key_sec1());
    }

    #[test]
    fn deserialize_rejects_tampered_public_key() {
        let pair = P256Keypair::generate().unwrap();
        let mut blob = pair.serialize();
        blob[10] ^= 0xFF;
        assert!(P256Keypair::deserialize(&blob).is_err());
    }

    #[test]
    fn deserialize_rejects_short_blob() {
        assert!(P256Keypair::deserialize(&[0u8; 42]).is_err());
    }

    #[test]
    fn sign_verify_roundtrip() {
        use p256::ecdsa::{signature::Signer, signature::Verifier, DerSignature};
        let pair = P256Keypair::generate().unwrap();
        let msg = b"attested message";
        let sig: DerSignature = pair.signing_key().sign(msg);
        assert!(pair.verifying_key().verify(msg, &sig).is_ok());
        assert!(pair.verifying_key().verify(b"other", &sig).is_err());
    }
}
