//! Weave cryptography primitives (unsafe-forbid, pure Rust).
//! - AEAD: AES-CCM-128 wrapper with zeroizing keys and the 13-byte
//!   message-protection nonce layout
//! - Keys: P-256 keypair with a stable serialized form for persistence
//! - DRBG: thin facade over the platform entropy source
//!
//! The session and credential layers consume these through narrow
//! contracts and never touch the underlying cipher crates directly.
#![forbid(unsafe_code)]

pub mod ccm;
pub mod drbg;
pub mod keys;

pub use ccm::{build_nonce, CcmCipher, CCM_NONCE_LEN, CCM_TAG_LEN};
pub use keys::{P256Keypair, SymmetricKey, AES_CCM128_KEY_LENGTH};

pub use weave_core::{Error, Result};
