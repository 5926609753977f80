use argon2::password_hash::SaltString;
use argon2::password_hash::rand_core::OsRng;
use argon2::{
    Algorithm, Argon2, ParamsBuilder, PasswordHash, PasswordHasher, PasswordVerifier, Version,
};

use crate::auth::{AuthError, AuthResult};

/// Argon2id hashing for account passwords. Plaintext never leaves this type.
#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
}

impl PasswordService {
    pub fn new() -> AuthResult<Self> {
        Self::with_cost(19 * 1024, 2, 1)
    }

    /// Build with explicit memory (KiB), iteration and lane costs.
    pub fn with_cost(m_cost: u32, t_cost: u32, p_cost: u32) -> AuthResult<Self> {
        let mut builder = ParamsBuilder::new();
        builder.m_cost(m_cost);
        builder.t_cost(t_cost);
        builder.p_cost(p_cost);
        let params = builder.build()?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
        })
    }

    pub fn hash(&self, password: &str) -> AuthResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Ok(self
            .argon2
            .hash_password(password.as_bytes(), &salt)?
            .to_string())
    }

    /// Fails with [`AuthError::WrongPassword`] on mismatch. Comparison of the
    /// derived hash is constant time inside `argon2`.
    pub fn verify(&self, password: &str, encoded: &str) -> AuthResult<()> {
        let parsed = PasswordHash::new(encoded)?;
        match self.argon2.verify_password(password.as_bytes(), &parsed) {
            Ok(()) => Ok(()),
            Err(argon2::password_hash::Error::Password) => Err(AuthError::WrongPassword),
            Err(err) => Err(AuthError::from(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> PasswordService {
        PasswordService::with_cost(1024, 1, 1).expect("password service")
    }

    #[test]
    fn hashes_and_verifies_passwords() {
        let service = cheap();
        let hash = service.hash("StrongPassword_1").expect("hash generation");

        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("StrongPassword_1"));
        assert!(service.verify("StrongPassword_1", &hash).is_ok());
        assert!(matches!(
            service.verify("wrong-password", &hash),
            Err(AuthError::WrongPassword)
        ));
    }

    #[test]
    fn salts_differ_between_hashes() {
        let service = cheap();
        let first = service.hash("same").expect("hash");
        let second = service.hash("same").expect("hash");
        assert_ne!(first, second);
    }

    #[test]
    fn malformed_hash_is_an_internal_error() {
        let service = cheap();
        assert!(matches!(
            service.verify("pw", "not-a-phc-string"),
            Err(AuthError::PasswordHash(_))
        ));
    }

    #[test]
    fn default_cost_builds() {
        assert!(PasswordService::new().is_ok());
    }
}
