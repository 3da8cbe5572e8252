//! Linear webhook signature validation: HMAC-SHA256 over the raw request
//! body, compared in constant time (`spec.md` §6).

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// `signature` is the hex-encoded value of the `Linear-Signature` header.
/// Returns `false` on any malformed input rather than erroring — an invalid
/// signature and a malformed one are both just "reject this request".
pub fn verify_signature(secret: &str, raw_body: &[u8], signature: &str) -> bool {
    let Ok(expected_bytes) = hex::decode(signature) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(raw_body);
    let computed = mac.finalize().into_bytes();

    computed.ct_eq(&expected_bytes[..]).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn accepts_a_valid_signature() {
        let secret = "webhook-secret";
        let body = b"{\"action\":\"create\"}";
        let signature = sign(secret, body);
        assert!(verify_signature(secret, body, &signature));
    }

    #[test]
    fn rejects_a_tampered_body() {
        let secret = "webhook-secret";
        let signature = sign(secret, b"{\"action\":\"create\"}");
        assert!(!verify_signature(secret, b"{\"action\":\"delete\"}", &signature));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert!(!verify_signature("secret", b"body", "not-hex!!"));
    }
}
