use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, ParamsBuilder, Version,
};
use zeroize::Zeroize;

use crate::config::PasswordPolicy;
use crate::error::{AppError, Result};

/// The parallelism factor for Argon2.
const ARGON2_PARALLELISM: u32 = 1;

/// Salted Argon2id password hashing with configured work factors.
#[derive(Clone)]
pub struct PasswordHasher {
    params: Params,
}

impl PasswordHasher {
    /// Creates a new `PasswordHasher`.
    ///
    /// # Arguments
    ///
    /// * `policy` - The memory and iteration costs.
    pub fn new(policy: PasswordPolicy) -> Result<Self> {
        let params = ParamsBuilder::new()
            .m_cost(policy.memory_kib)
            .t_cost(policy.iterations)
            .p_cost(ARGON2_PARALLELISM)
            .build()
            .map_err(|e| AppError::Crypto(format!("Argon2 params: {}", e)))?;
        Ok(Self { params })
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hashes a password with a fresh random salt.
    ///
    /// # Returns
    ///
    /// The PHC-encoded hash.
    pub fn hash(&self, password: &str) -> Result<String> {
        let mut password_bytes = password.as_bytes().to_vec();
        let salt = SaltString::generate(&mut OsRng);

        let password_hash = self
            .argon2()
            .hash_password(&password_bytes, &salt)
            .map_err(|e| AppError::Crypto(format!("Argon2 hash error: {}", e)))?
            .to_string();

        password_bytes.zeroize();
        tracing::debug!("Password hashed successfully with Argon2");
        Ok(password_hash)
    }

    /// Verifies a password against a stored PHC hash.
    ///
    /// The parameters embedded in the hash are used, so hashes created under
    /// older work factors keep verifying.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let mut password_bytes = password.as_bytes().to_vec();
        let parsed_hash = PasswordHash::new(hash)
            .map_err(|e| AppError::Crypto(format!("Hash parse error: {}", e)))?;
        let result = self
            .argon2()
            .verify_password(&password_bytes, &parsed_hash)
            .is_ok();

        password_bytes.zeroize();
        Ok(result)
    }
}
