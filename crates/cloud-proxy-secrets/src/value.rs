//! Secret payloads

use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A secret payload as returned by a secret store, zeroed on drop
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub enum SecretValue {
    /// UTF-8 secret string
    Text(String),
    /// Opaque binary secret
    Binary(Vec<u8>),
}

impl SecretValue {
    /// Text payload, if this is a text secret
    pub fn as_text(&self) -> Option<&str> {
        match self {
            SecretValue::Text(s) => Some(s),
            SecretValue::Binary(_) => None,
        }
    }

    /// Raw bytes of the payload; text secrets yield their UTF-8 encoding
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            SecretValue::Text(s) => s.as_bytes(),
            SecretValue::Binary(b) => b,
        }
    }

    /// Payload length in bytes
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether this is a binary secret
    pub fn is_binary(&self) -> bool {
        matches!(self, SecretValue::Binary(_))
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue::Text(s)
    }
}

impl From<&str> for SecretValue {
    fn from(s: &str) -> Self {
        SecretValue::Text(s.to_string())
    }
}

impl From<Vec<u8>> for SecretValue {
    fn from(b: Vec<u8>) -> Self {
        SecretValue::Binary(b)
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_binary() { "Binary" } else { "Text" };
        write!(f, "SecretValue::{kind}([REDACTED {} bytes])", self.len())
    }
}
