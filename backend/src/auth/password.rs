//! Password hashing
//!
//! Hashes with bcrypt or argon2id depending on configuration. Verification
//! detects the algorithm from the stored hash, so switching the configured
//! algorithm does not lock out existing members.
//!
//! Both primitives are CPU-intensive; the async variants run them on the
//! blocking thread pool.

use crate::config::{HashAlgorithm, HashingConfig};
use anyhow::{anyhow, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

/// Password hashing service
#[derive(Debug, Clone)]
pub struct PasswordService {
    algorithm: HashAlgorithm,
    cost: u32,
}

impl PasswordService {
    pub fn new(config: &HashingConfig) -> Self {
        Self {
            algorithm: config.algorithm,
            cost: config.cost,
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            Params::DEFAULT_M_COST,
            self.cost.max(1),
            Params::DEFAULT_P_COST,
            None,
        )
        .map_err(|e| anyhow!("Invalid argon2 parameters: {}", e))?;
        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }

    /// Hash a password (blocking operation)
    pub fn hash(&self, password: &str) -> Result<String> {
        match self.algorithm {
            HashAlgorithm::Bcrypt => bcrypt::hash(password, self.cost)
                .map_err(|e| anyhow!("Failed to hash password: {}", e)),
            HashAlgorithm::Argon2 => {
                let salt = SaltString::generate(&mut OsRng);
                let hash = self
                    .argon2()?
                    .hash_password(password.as_bytes(), &salt)
                    .map_err(|e| anyhow!("Failed to hash password: {}", e))?;
                Ok(hash.to_string())
            }
        }
    }

    /// Verify a password against a stored hash (blocking operation)
    ///
    /// A malformed hash is an operational failure, not a mismatch.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        if hash.starts_with("$argon2") {
            let parsed = PasswordHash::new(hash)
                .map_err(|e| anyhow!("Invalid hash format: {}", e))?;
            Ok(Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok())
        } else {
            bcrypt::verify(password, hash).map_err(|e| anyhow!("Invalid hash format: {}", e))
        }
    }

    /// Hash a password on the blocking thread pool
    pub async fn hash_async(&self, password: String) -> Result<String> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.hash(&password))
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))?
    }

    /// Verify a password on the blocking thread pool
    pub async fn verify_async(&self, password: String, hash: String) -> Result<bool> {
        let service = self.clone();
        tokio::task::spawn_blocking(move || service.verify(&password, &hash))
            .await
            .map_err(|e| anyhow!("Task join error: {}", e))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn service(algorithm: HashAlgorithm) -> PasswordService {
        // Lowest costs the primitives accept, to keep tests fast
        let cost = match algorithm {
            HashAlgorithm::Bcrypt => 4,
            HashAlgorithm::Argon2 => 1,
        };
        PasswordService::new(&HashingConfig { algorithm, cost })
    }

    #[rstest]
    #[case(HashAlgorithm::Bcrypt)]
    #[case(HashAlgorithm::Argon2)]
    fn test_hash_and_verify(#[case] algorithm: HashAlgorithm) {
        let hasher = service(algorithm);
        let hash = hasher.hash("Secret123!").unwrap();

        assert!(hasher.verify("Secret123!", &hash).unwrap());
        assert!(!hasher.verify("Secret123?", &hash).unwrap());
    }

    #[test]
    fn test_different_hashes_for_same_password() {
        let hasher = service(HashAlgorithm::Bcrypt);
        let hash1 = hasher.hash("Secret123!").unwrap();
        let hash2 = hasher.hash("Secret123!").unwrap();

        assert_ne!(hash1, hash2);
    }

    #[test]
    fn test_verify_detects_algorithm_from_hash() {
        let argon_hash = service(HashAlgorithm::Argon2).hash("Secret123!").unwrap();
        let bcrypt_hash = service(HashAlgorithm::Bcrypt).hash("Secret123!").unwrap();

        let bcrypt_hasher = service(HashAlgorithm::Bcrypt);
        assert!(bcrypt_hasher.verify("Secret123!", &argon_hash).unwrap());
        assert!(bcrypt_hasher.verify("Secret123!", &bcrypt_hash).unwrap());
    }

    #[test]
    fn test_malformed_hash_is_an_error() {
        let hasher = service(HashAlgorithm::Bcrypt);
        assert!(hasher.verify("Secret123!", "not-a-hash").is_err());
    }

    #[tokio::test]
    async fn test_async_hash_and_verify() {
        let hasher = service(HashAlgorithm::Bcrypt);
        let hash = hasher.hash_async("Secret123!".to_string()).await.unwrap();

        assert!(hasher.verify_async("Secret123!".to_string(), hash.clone()).await.unwrap());
        assert!(!hasher.verify_async("wrong".to_string(), hash).await.unwrap());
    }
}
