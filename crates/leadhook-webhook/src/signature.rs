//! HMAC-SHA256 request signing.
//!
//! The signature header is `sha256=<lowercase hex>` computed over the raw
//! request body. Receivers recompute it with [`verify`].

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{Error, ErrorKind, Result};

type HmacSha256 = Hmac<Sha256>;

/// Prefix of every signature header value.
pub const SIGNATURE_PREFIX: &str = "sha256=";

fn mac(secret: &str) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| {
        Error::new(ErrorKind::InternalError).with_message("HMAC key was rejected")
    })
}

/// Signs `body` with `secret`, returning the `X-Webhook-Signature` value.
pub fn sign(secret: &str, body: &[u8]) -> Result<String> {
    let mut mac = mac(secret)?;
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    Ok(format!("{SIGNATURE_PREFIX}{}", hex::encode(digest)))
}

/// Verifies a signature header against `body` and `secret`.
///
/// Comparison is constant-time. Malformed headers return `false`.
pub fn verify(body: &[u8], header: &str, secret: &str) -> bool {
    let Some(encoded) = header.trim().strip_prefix(SIGNATURE_PREFIX) else {
        return false;
    };
    let Ok(expected) = hex::decode(encoded) else {
        return false;
    };

    let Ok(mut mac) = mac(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}
