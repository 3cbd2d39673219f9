//! Password hashing, strength rules and one-time account tokens.

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, OnceLock,
};

use crate::config::AccountTokenConfig;

pub const MIN_PASSWORD_LENGTH: usize = 8;
pub const DEFAULT_TOKEN_BYTES: usize = 32;

/// Outcome of a strength check. Lists every violated rule, not just the first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrengthReport {
    pub valid: bool,
    pub violations: Vec<String>,
}

/// Clear-text one-time token handed to the user, with its expiry.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl IssuedToken {
    /// Digest to persist in place of the token.
    pub fn digest(&self) -> String {
        digest_token(&self.token)
    }
}

#[derive(Clone)]
pub struct PasswordService {
    argon2: Argon2<'static>,
    reset_ttl: Duration,
    verification_ttl: Duration,
    /// Hash checked when no account matches, so lookups cost one verify either way.
    decoy_hash: Arc<OnceLock<String>>,
    verifications: Arc<AtomicU64>,
}

impl PasswordService {
    /// Argon2id with the crate's default cost.
    pub fn new(tokens: &AccountTokenConfig) -> Self {
        Self {
            argon2: Argon2::default(),
            reset_ttl: Duration::minutes(tokens.reset_ttl_minutes),
            verification_ttl: Duration::hours(tokens.verification_ttl_hours),
            decoy_hash: Arc::new(OnceLock::new()),
            verifications: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Custom Argon2id cost. Only for tests and benchmarks.
    pub fn with_params(
        tokens: &AccountTokenConfig,
        memory_kib: u32,
        iterations: u32,
        parallelism: u32,
    ) -> Result<Self, anyhow::Error> {
        let params = Params::new(memory_kib, iterations, parallelism, None)
            .map_err(|e| anyhow::anyhow!("Invalid Argon2 parameters: {}", e))?;
        Ok(Self {
            argon2: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            ..Self::new(tokens)
        })
    }

    /// Hash a password with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String, anyhow::Error> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow::anyhow!("Failed to hash password: {}", e))?
            .to_string();
        Ok(hash)
    }

    /// Constant-time verification. A malformed hash never matches.
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        self.verifications.fetch_add(1, Ordering::Relaxed);
        match PasswordHash::new(hash) {
            Ok(parsed) => self
                .argon2
                .verify_password(password.as_bytes(), &parsed)
                .is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "Stored password hash is malformed");
                false
            }
        }
    }

    /// Spend one verification against a hash of a random secret. The outcome is discarded.
    pub fn verify_decoy(&self, password: &str) {
        let hash = self.decoy_hash.get_or_init(|| {
            self.hash(&self.generate_token(DEFAULT_TOKEN_BYTES)).unwrap_or_else(|e| {
                tracing::error!(error = %e, "Failed to build decoy password hash");
                String::new()
            })
        });
        self.verify(password, hash);
    }

    /// Verifications performed by this service and its clones.
    pub fn verification_count(&self) -> u64 {
        self.verifications.load(Ordering::Relaxed)
    }

    pub fn validate_strength(&self, password: &str) -> StrengthReport {
        let mut violations = Vec::new();

        if password.chars().count() < MIN_PASSWORD_LENGTH {
            violations.push(format!(
                "Password must be at least {} characters",
                MIN_PASSWORD_LENGTH
            ));
        }
        if !password.chars().any(|c| c.is_uppercase()) {
            violations.push("Password must contain at least one uppercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_lowercase()) {
            violations.push("Password must contain at least one lowercase letter".to_string());
        }
        if !password.chars().any(|c| c.is_ascii_digit()) {
            violations.push("Password must contain at least one number".to_string());
        }
        if !password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
        {
            violations.push("Password must contain at least one special character".to_string());
        }

        StrengthReport {
            valid: violations.is_empty(),
            violations,
        }
    }

    /// Hex-encoded random token from the OS CSPRNG.
    pub fn generate_token(&self, byte_len: usize) -> String {
        let mut bytes = vec![0u8; byte_len];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    pub fn issue_reset_token(&self) -> IssuedToken {
        IssuedToken {
            token: self.generate_token(DEFAULT_TOKEN_BYTES),
            expires_at: Utc::now() + self.reset_ttl,
        }
    }

    pub fn issue_verification_token(&self) -> IssuedToken {
        IssuedToken {
            token: self.generate_token(DEFAULT_TOKEN_BYTES),
            expires_at: Utc::now() + self.verification_ttl,
        }
    }
}

/// SHA-256 hex digest used to store tokens at rest.
pub fn digest_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}
