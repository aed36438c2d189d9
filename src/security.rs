use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Hex-encoded HMAC-SHA256 of `data` under `secret`
pub fn sign_hmac(data: &str, secret: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Check a hex-encoded HMAC-SHA256 `signature` of `data`
///
/// Comparison happens inside `verify_slice`, in constant time.
pub fn verify_hmac(data: &str, signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        tracing::debug!("Signature is not valid hex");
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(data.as_bytes());
    mac.verify_slice(&expected).is_ok()
}

/// Constant-time comparison of a presented secret against the expected one
///
/// Both sides are MACed under the expected secret, so length differences
/// do not leak through timing either.
pub fn secrets_match(presented: &str, expected: &str) -> bool {
    if expected.is_empty() {
        return false;
    }
    verify_hmac(presented, &sign_hmac(expected, expected), expected)
}
