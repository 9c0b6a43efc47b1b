// Password hashing and validation service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::auth::error::AuthError;
use crate::config::PasswordConfig;

/// Password service for hashing and verification
#[derive(Debug, Clone)]
pub struct PasswordService {
    min_length: usize,
    params: Params,
}

impl PasswordService {
    /// Build a hasher from the configured policy and Argon2 work factors
    pub fn new(config: &PasswordConfig) -> Result<Self, AuthError> {
        let params = Params::new(config.memory_kib, config.iterations, config.parallelism, None)
            .map_err(|e| AuthError::Hashing(e.to_string()))?;

        Ok(Self {
            min_length: config.min_length,
            params,
        })
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Validate password strength requirements
    ///
    /// Length is counted in characters, not bytes.
    pub fn check_strength(&self, password: &str) -> Result<(), AuthError> {
        if password.chars().count() < self.min_length {
            return Err(AuthError::WeakCredential {
                min_length: self.min_length,
            });
        }
        Ok(())
    }

    /// Hash a password using Argon2id with a fresh random salt
    ///
    /// Returns a PHC string embedding algorithm, parameters and salt.
    pub fn hash(&self, password: &str) -> Result<String, AuthError> {
        self.check_strength(password)?;

        let salt = SaltString::generate(&mut OsRng);
        self.argon2()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AuthError::Hashing(e.to_string()))
    }

    /// Verify a password against a stored digest
    ///
    /// Parameters are read from the digest itself, so hashes made under
    /// older work factors still verify.
    pub fn verify(&self, digest: &str, password: &str) -> Result<(), AuthError> {
        let parsed = PasswordHash::new(digest).map_err(|_| AuthError::CredentialMismatch)?;

        self.argon2()
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| AuthError::CredentialMismatch)
    }
}

#[cfg(test)]
pub(crate) fn test_password_service() -> PasswordService {
    PasswordService::new(&PasswordConfig {
        min_length: 8,
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    })
    .expect("test params are valid")
}
