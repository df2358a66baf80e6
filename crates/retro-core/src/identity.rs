use sha2::{Digest, Sha256};

use crate::ids::UserHash;

/// Resolves an opaque per-request token to a stable participant identity.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> UserHash;
}

/// Salted SHA-256 of the token, hex encoded.
#[derive(Debug, Clone)]
pub struct Sha256Identity {
    salt: String,
}

impl Sha256Identity {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }
}

impl IdentityResolver for Sha256Identity {
    fn resolve(&self, token: &str) -> UserHash {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(b":");
        hasher.update(token.as_bytes());
        UserHash::new(hex::encode(hasher.finalize()))
    }
}
