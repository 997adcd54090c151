//! HMAC-SHA256 签名

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::errors::{ClickTrailError, Result};

type HmacSha256 = Hmac<Sha256>;

/// 计算 hex 编码的 HMAC-SHA256(secret, payload)
pub fn hmac_sha256_hex(secret: &[u8], payload: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret)
        .map_err(|err| ClickTrailError::template(format!("invalid hmac secret: {err}")))?;
    mac.update(payload);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        assert_eq!(
            hmac_sha256_hex(b"Jefe", b"what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_deterministic_and_sensitive() {
        let sign = |secret: &[u8], payload: &[u8]| hmac_sha256_hex(secret, payload).unwrap();
        let a = sign(b"secret", b"clickid=abc&status=sale");
        assert_eq!(a, sign(b"secret", b"clickid=abc&status=sale"));
        assert_eq!(a.len(), 64);
        assert_ne!(a, sign(b"secret2", b"clickid=abc&status=sale"));
        assert_ne!(a, sign(b"secret", b"clickid=abd&status=sale"));
    }
}
