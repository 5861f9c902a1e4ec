//! Per-session crypto context: the two directional AES-CCM keys plus the
//! role this node played during establishment. The role decides which key
//! encrypts outbound traffic and which opens inbound traffic.

use weave_core::Result;
use weave_crypto::{CcmCipher, SymmetricKey, CCM_NONCE_LEN};

/// Which side of session establishment this node was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionRole {
    Initiator,
    Responder,
}

/// Symmetric key material for one secure session.
pub struct CryptoContext {
    role: SessionRole,
    initiator_to_responder: CcmCipher,
    responder_to_initiator: CcmCipher,
}

impl CryptoContext {
    pub fn new(
        role: SessionRole,
        initiator_to_responder: &SymmetricKey,
        responder_to_initiator: &SymmetricKey,
    ) -> Self {
        Self {
            role,
            initiator_to_responder: CcmCipher::new(initiator_to_responder),
            responder_to_initiator: CcmCipher::new(responder_to_initiator),
        }
    }

    /// Test-only context: the deterministic test key in both directions.
    pub fn with_test_key(role: SessionRole) -> Self {
        let key = SymmetricKey::test_key();
        Self::new(role, &key, &key)
    }

    pub fn role(&self) -> SessionRole {
        self.role
    }

    fn tx(&self) -> &CcmCipher {
        match self.role {
            SessionRole::Initiator => &self.initiator_to_responder,
            SessionRole::Responder => &self.responder_to_initiator,
        }
    }

    fn rx(&self) -> &CcmCipher {
        match self.role {
            SessionRole::Initiator => &self.responder_to_initiator,
            SessionRole::Responder => &self.initiator_to_responder,
        }
    }

    /// Seal an outbound envelope.
    pub fn encrypt(
        &self,
        nonce: &[u8; CCM_NONCE_LEN],
        aad: &[u8],
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        self.tx().seal(nonce, aad, plaintext)
    }

    /// Open an inbound envelope.
    pub fn decrypt(
        &self,
        nonce: &[u8; CCM_NONCE_LEN],
        aad: &[u8],
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        self.rx().open(nonce, aad, ciphertext)
    }
}

impl core::fmt::Debug for CryptoContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CryptoContext")
            .field("role", &self.role)
            .finish()
    }
}
