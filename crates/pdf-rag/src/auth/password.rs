//! PBKDF2 password hashing
//!
//! Stored form: `pbkdf2-sha256$<iterations>$<salt b64>$<hash b64>`.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use ring::{digest, pbkdf2};
use std::num::NonZeroU32;

use crate::error::{Error, Result};

const ALGORITHM: pbkdf2::Algorithm = pbkdf2::PBKDF2_HMAC_SHA256;
const SCHEME: &str = "pbkdf2-sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = digest::SHA256_OUTPUT_LEN;

/// Default work factor
pub const DEFAULT_ITERATIONS: u32 = 100_000;

const DEFAULT_WORK: NonZeroU32 = match NonZeroU32::new(DEFAULT_ITERATIONS) {
    Some(n) => n,
    None => panic!("DEFAULT_ITERATIONS is zero"),
};

/// Hashes new passwords; verifies against whatever work factor a stored
/// hash records.
#[derive(Clone)]
pub struct PasswordHasher {
    iterations: NonZeroU32,
    rng: SystemRandom,
}

impl PasswordHasher {
    pub fn new(iterations: u32) -> Result<Self> {
        let iterations = NonZeroU32::new(iterations)
            .ok_or_else(|| Error::Config("password iterations must be positive".to_string()))?;
        Ok(Self {
            iterations,
            rng: SystemRandom::new(),
        })
    }

    pub fn hash(&self, password: &str) -> Result<String> {
        let mut salt = [0u8; SALT_LEN];
        self.rng
            .fill(&mut salt)
            .map_err(|_| Error::internal("system RNG unavailable"))?;

        let mut hash = [0u8; HASH_LEN];
        pbkdf2::derive(ALGORITHM, self.iterations, &salt, password.as_bytes(), &mut hash);

        Ok(format!(
            "{}${}${}${}",
            SCHEME,
            self.iterations,
            STANDARD_NO_PAD.encode(salt),
            STANDARD_NO_PAD.encode(hash)
        ))
    }

    /// Constant-time check of `password` against a stored hash. Malformed
    /// hashes never verify.
    pub fn verify(&self, password: &str, stored: &str) -> bool {
        let parts: Vec<&str> = stored.split('$').collect();
        let &[scheme, iterations, salt, hash] = parts.as_slice() else {
            return false;
        };
        if scheme != SCHEME {
            return false;
        }

        let Some(iterations) = iterations.parse().ok().and_then(NonZeroU32::new) else {
            return false;
        };
        let (Ok(salt), Ok(hash)) = (STANDARD_NO_PAD.decode(salt), STANDARD_NO_PAD.decode(hash))
        else {
            return false;
        };

        pbkdf2::verify(ALGORITHM, iterations, &salt, password.as_bytes(), &hash).is_ok()
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self {
            iterations: DEFAULT_WORK,
            rng: SystemRandom::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> PasswordHasher {
        PasswordHasher::new(1_000).unwrap()
    }

    #[test]
    fn test_hash_and_verify() {
        let hasher = fast();
        let stored = hasher.hash("namaste123").unwrap();

        assert!(stored.starts_with("pbkdf2-sha256$1000$"));
        assert!(hasher.verify("namaste123", &stored));
        assert!(!hasher.verify("namaste124", &stored));
    }

    #[test]
    fn test_salted() {
        let hasher = fast();
        assert_ne!(hasher.hash("same").unwrap(), hasher.hash("same").unwrap());
    }

    #[test]
    fn test_verify_uses_stored_iterations() {
        let stored = PasswordHasher::new(2_000).unwrap().hash("pw").unwrap();
        assert!(fast().verify("pw", &stored));
    }

    #[test]
    fn test_malformed_hashes_rejected() {
        let hasher = fast();
        assert!(!hasher.verify("pw", ""));
        assert!(!hasher.verify("pw", "bcrypt$10$abc$def"));
        assert!(!hasher.verify("pw", "pbkdf2-sha256$0$abc$def"));
        assert!(!hasher.verify("pw", "pbkdf2-sha256$1000$!!$def"));
    }

    #[test]
    fn test_zero_iterations_rejected() {
        assert!(PasswordHasher::new(0).is_err());
        assert_eq!(PasswordHasher::default().iterations.get(), DEFAULT_ITERATIONS);
    }
}
