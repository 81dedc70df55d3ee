//! HMAC content-signature helpers.
//!
//! Deliveries for subscriptions that carry a secret are signed with
//! `X-Hub-Signature: sha256=<hex digest>` over the raw body.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the content signature.
pub const SIGNATURE_HEADER: &str = "X-Hub-Signature";

/// Computes the signature header value for a body.
#[must_use]
pub fn sign(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Verifies a signature header value against a body.
///
/// Returns `false` for unknown methods, malformed hex, or digest mismatch.
#[must_use]
pub fn verify(secret: &str, body: &[u8], header_value: &str) -> bool {
    let Some(hex_digest) = header_value.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(digest) = hex::decode(hex_digest) else {
        return false;
    };

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("hmac accepts keys of any length");
    mac.update(body);
    mac.verify_slice(&digest).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_verify_roundtrip() {
        let sig = sign("shhh", b"hello");
        assert!(sig.starts_with("sha256="));
        assert!(verify("shhh", b"hello", &sig));
    }

    #[test]
    fn verify_rejects_wrong_secret() {
        let sig = sign("shhh", b"hello");
        assert!(!verify("other", b"hello", &sig));
    }

    #[test]
    fn verify_rejects_tampered_body() {
        let sig = sign("shhh", b"hello");
        assert!(!verify("shhh", b"hell0", &sig));
    }

    #[test]
    fn verify_rejects_malformed_header() {
        assert!(!verify("shhh", b"hello", "md5=abcd"));
        assert!(!verify("shhh", b"hello", "sha256=not-hex"));
        assert!(!verify("shhh", b"hello", ""));
    }
}
