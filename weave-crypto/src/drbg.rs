//! DRBG facade over the platform entropy source.

use getrandom::getrandom;

use crate::{Error, Result};

/// Fill `buf` with cryptographically secure random bytes.
pub fn fill_random(buf: &mut [u8]) -> Result<()> {
    getrandom(buf).map_err(|e| Error::crypto(format!("drbg failure: {e}")))
}

/// Draw a uniformly random 64-bit value.
pub fn random_u64() -> Result<u64> {
    let mut bytes = [0u8; 8];
    fill_random(&mut bytes)?;
    Ok(u64::from_le_bytes(bytes))
}
