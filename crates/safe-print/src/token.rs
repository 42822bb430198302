//! Delivery token
//!
//! The only credential guarding the rendered document and the close
//! endpoint. Generated once per run from the OS random source.

use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// Random bytes per token (128 bits)
pub const TOKEN_BYTES: usize = 16;

/// Hex length of a token
pub const TOKEN_LEN: usize = TOKEN_BYTES * 2;

#[derive(Clone, PartialEq, Eq)]
pub struct DeliveryToken(String);

impl DeliveryToken {
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(hex::encode_upper(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against a candidate from a request path
    pub fn matches(&self, candidate: &str) -> bool {
        bool::from(candidate.as_bytes().ct_eq(self.0.as_bytes()))
    }
}

impl std::fmt::Debug for DeliveryToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DeliveryToken(..)")
    }
}
