use std::fmt;

const MIN_BCRYPT_COST: u32 = 4;
const MAX_BCRYPT_COST: u32 = 31;

/// Opaque one-way password hash. Never serialized and redacted from `Debug`.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHash(String);

impl PasswordHash {
    pub fn new(hash: impl Into<String>) -> Self {
        Self(hash.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHash([redacted])")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// One-way hash/verify capability for password credentials.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, plaintext: &str) -> Result<PasswordHash, CredentialError>;
    fn verify(&self, plaintext: &str, hash: &PasswordHash) -> Result<bool, CredentialError>;
}

/// bcrypt-backed hasher.
#[derive(Debug, Clone)]
pub struct BcryptHasher {
    cost: u32,
}

impl BcryptHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST),
        }
    }
}

impl Default for BcryptHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

impl CredentialHasher for BcryptHasher {
    fn hash(&self, plaintext: &str) -> Result<PasswordHash, CredentialError> {
        bcrypt::hash(plaintext, self.cost)
            .map(PasswordHash)
            .map_err(|err| CredentialError::Hash(err.to_string()))
    }

    fn verify(&self, plaintext: &str, hash: &PasswordHash) -> Result<bool, CredentialError> {
        bcrypt::verify(plaintext, hash.as_str()).map_err(|err| CredentialError::Hash(err.to_string()))
    }
}
