use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::error::SecurityError;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 over exact body bytes, carried as lowercase hex.
#[derive(Clone)]
pub struct HmacSigner {
    mac: HmacSha256,
}

impl HmacSigner {
    pub fn new(key: &[u8]) -> Result<Self, SecurityError> {
        if key.is_empty() {
            return Err(SecurityError::InvalidKey("signing key must not be empty".into()));
        }
        let mac = HmacSha256::new_from_slice(key).map_err(|e| SecurityError::InvalidKey(e.to_string()))?;
        Ok(Self { mac })
    }

    pub fn sign(&self, body: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks `signature` (hex) against `body` in constant time.
    pub fn verify(&self, body: &[u8], signature: &str) -> Result<(), SecurityError> {
        let expected = hex::decode(signature.trim()).map_err(|_| SecurityError::MalformedSignature)?;
        let mut mac = self.mac.clone();
        mac.update(body);
        mac.verify_slice(&expected).map_err(|_| SecurityError::SignatureMismatch)
    }
}
