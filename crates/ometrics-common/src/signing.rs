//! HMAC-SHA256 payload signatures shared by the agent and the server.
//!
//! The signature is computed over the body bytes exactly as they travel on
//! the wire (after gzip, when compression is enabled) and carried hex-encoded
//! in the [`SIGNATURE_HEADER`] header.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the hex-encoded signature.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Signs `body` with `key` and returns the hex-encoded digest.
///
/// # Examples
///
/// ```
/// use ometrics_common::signing::{sign, verify};
///
/// let sig = sign("secret", b"[]");
/// assert_eq!(sig.len(), 64);
/// assert!(verify("secret", b"[]", &sig));
/// assert!(!verify("other", b"[]", &sig));
/// ```
pub fn sign(key: &str, body: &[u8]) -> String {
    hex::encode(mac(key, body).finalize().into_bytes())
}

/// Checks a hex-encoded signature in constant time. Malformed hex never
/// verifies.
pub fn verify(key: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    mac(key, body).verify_slice(&expected).is_ok()
}

fn mac(key: &str, body: &[u8]) -> HmacSha256 {
    let mut mac =
        HmacSha256::new_from_slice(key.as_bytes()).expect("HMAC can take key of any size");
    mac.update(body);
    mac
}
