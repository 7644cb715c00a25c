//! Api-key token generation.

use rand::RngCore;

/// Generate a fresh api-key token: 20 random bytes, hex encoded.
///
/// The result is always 40 characters and matches `^\w{40}$`.
pub fn generate_api_key() -> String {
    let mut bytes = [0u8; 20];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
