use data_encoding::BASE64_NOPAD;
use ring::{
    pbkdf2,
    rand::{SecureRandom, SystemRandom},
};
use std::num::NonZeroU32;
use thiserror::Error;

const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

#[derive(Error, Debug)]
pub enum PasswordError {
    #[error("random salt generation failed")]
    Rng,
    #[error("malformed password hash")]
    Malformed,
}

/// Salted PBKDF2-HMAC-SHA256, stored as `pbkdf2-sha256$<iterations>$<salt>$<hash>`.
#[derive(Clone)]
pub struct PasswordHasher {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Self {
        Self {
            iterations: NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN),
            rng: SystemRandom::new(),
        }
    }

    pub fn hash(&self, password: &str) -> Result<String, PasswordError> {
        let mut salt = [0u8; SALT_LEN];
        self.rng.fill(&mut salt).map_err(|_| PasswordError::Rng)?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, self.iterations, &salt, password.as_bytes(), &mut hash);

        Ok(format!(
            "{}${}${}${}",
            SCHEME,
            self.iterations,
            BASE64_NOPAD.encode(&salt),
            BASE64_NOPAD.encode(&hash)
        ))
    }

    /// Verifies against the parameters stored in `encoded`, not the hasher's own.
    pub fn verify(&self, password: &str, encoded: &str) -> Result<bool, PasswordError> {
        let mut parts = encoded.split('$');
        let (Some(SCHEME), Some(iterations), Some(salt), Some(hash), None) =
            (parts.next(), parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(PasswordError::Malformed);
        };

        let iterations = iterations
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or(PasswordError::Malformed)?;
        let salt = BASE64_NOPAD.decode(salt.as_bytes()).map_err(|_| PasswordError::Malformed)?;
        let hash = BASE64_NOPAD.decode(hash.as_bytes()).map_err(|_| PasswordError::Malformed)?;

        Ok(pbkdf2::verify(pbkdf2::PBKDF2_HMAC_SHA256, iterations, &salt, password.as_bytes(), &hash).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_verifies_only_the_same_password() {
        let hasher = PasswordHasher::new(1_000);
        let encoded = hasher.hash("correct horse battery").unwrap();

        assert!(encoded.starts_with("pbkdf2-sha256$1000$"));
        assert!(hasher.verify("correct horse battery", &encoded).unwrap());
        assert!(!hasher.verify("correct horse", &encoded).unwrap());
    }

    #[test]
    fn salts_differ_between_hashes() {
        let hasher = PasswordHasher::new(1_000);
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn verify_uses_stored_iterations() {
        let encoded = PasswordHasher::new(500).hash("pw12345678").unwrap();
        assert!(PasswordHasher::new(2_000).verify("pw12345678", &encoded).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        let hasher = PasswordHasher::new(1_000);
        assert!(matches!(hasher.verify("x", "plaintext"), Err(PasswordError::Malformed)));
        assert!(matches!(hasher.verify("x", "pbkdf2-sha256$0$AA$AA"), Err(PasswordError::Malformed)));
        assert!(matches!(hasher.verify("x", "bcrypt$10$AA$AA"), Err(PasswordError::Malformed)));
    }
}
