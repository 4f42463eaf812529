//! HMAC request signing shared by the venue adapters.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 of the payload under the secret, hex-encoded.
///
/// Binance signs the full query string this way; Coinbase signs
/// `timestamp + method + path + body`.
pub(crate) fn hmac_sha256_hex(secret: &str, payload: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts keys of any length");
    mac.update(payload.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}
