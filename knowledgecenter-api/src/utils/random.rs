//! Opaque secrets and identifiers drawn from the OS RNG.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};

const REFRESH_SECRET_BYTES: usize = 32;
const TOKEN_ID_BYTES: usize = 16;

fn random_bytes<const N: usize>() -> Result<[u8; N], anyhow::Error> {
    let mut buf = [0u8; N];
    OsRng
        .try_fill_bytes(&mut buf)
        .map_err(|e| anyhow::anyhow!("OS random number generator failed: {}", e))?;
    Ok(buf)
}

/// 256-bit refresh secret, URL-safe base64 without padding.
pub fn generate_refresh_secret() -> Result<String, anyhow::Error> {
    Ok(URL_SAFE_NO_PAD.encode(random_bytes::<REFRESH_SECRET_BYTES>()?))
}

/// 128-bit access-token identifier, lowercase hex.
pub fn generate_token_id() -> Result<String, anyhow::Error> {
    Ok(hex::encode(random_bytes::<TOKEN_ID_BYTES>()?))
}

/// Storage-side digest of a refresh secret (SHA-256, lowercase hex).
pub fn hash_token(secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    hex::encode(hasher.finalize())
}
