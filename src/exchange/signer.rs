//! # exchange::signer — KALSHI-ACCESS-SIGNATURE
//!
//! `base64( RSA-PSS-SHA256( timestamp_ms + METHOD + path ) )`
//!
//! - `path` ไม่รวม query string
//! - salt length = digest length (32)

use base64::Engine as _;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::pss::BlindedSigningKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use rsa::RsaPrivateKey;
use sha2::Sha256;

use super::ExchangeError;

pub const HEADER_KEY: &str = "KALSHI-ACCESS-KEY";
pub const HEADER_TIMESTAMP: &str = "KALSHI-ACCESS-TIMESTAMP";
pub const HEADER_SIGNATURE: &str = "KALSHI-ACCESS-SIGNATURE";

pub struct RequestSigner {
    key_id:      String,
    signing_key: BlindedSigningKey<Sha256>,
}

impl std::fmt::Debug for RequestSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestSigner").field("key_id", &self.key_id).finish_non_exhaustive()
    }
}

impl RequestSigner {
    /// รับได้ทั้ง PKCS#1 (`BEGIN RSA PRIVATE KEY`) และ PKCS#8 (`BEGIN PRIVATE KEY`)
    pub fn from_pem(key_id: &str, pem: &str) -> Result<Self, ExchangeError> {
        let key = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| ExchangeError::Signing(format!("cannot parse private key: {e}")))?;
        Ok(Self {
            key_id:      key_id.to_string(),
            signing_key: BlindedSigningKey::<Sha256>::new(key),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn sign(&self, timestamp_ms: i64, method: &str, path: &str) -> Result<String, ExchangeError> {
        let message = format!("{timestamp_ms}{}{path}", method.to_ascii_uppercase());
        let signature = self
            .signing_key
            .try_sign_with_rng(&mut rand::thread_rng(), message.as_bytes())
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(signature.to_bytes()))
    }

    /// Header ทั้ง 3 ตัวสำหรับ request นี้ (timestamp = ตอนนี้)
    pub fn headers(&self, method: &str, path: &str) -> Result<[(&'static str, String); 3], ExchangeError> {
        let ts = chrono::Utc::now().timestamp_millis();
        let signature = self.sign(ts, method, path)?;
        Ok([
            (HEADER_KEY, self.key_id.clone()),
            (HEADER_TIMESTAMP, ts.to_string()),
            (HEADER_SIGNATURE, signature),
        ])
    }
}
