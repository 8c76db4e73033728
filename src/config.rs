use std::env;
use std::net::SocketAddr;
use std::time::Duration;
use anyhow::{Context, Result};
use zeroize::{Zeroize, Zeroizing};

use crate::crypto::cipher::{IV_SIZE, KEY_SIZE};

/// Argon2 memory cost in KiB.
const DEFAULT_ARGON2_MEMORY_KIB: u32 = 19 * 1024;
/// Argon2 iterations.
const DEFAULT_ARGON2_ITERATIONS: u32 = 3;

/// Work factors for password hashing.
#[derive(Clone, Copy, Debug)]
pub struct PasswordPolicy {
    /// Argon2 memory cost in KiB.
    pub memory_kib: u32,
    /// Argon2 iterations.
    pub iterations: u32,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_ARGON2_MEMORY_KIB,
            iterations: DEFAULT_ARGON2_ITERATIONS,
        }
    }
}

/// The application's configuration.
#[derive(Clone)]
pub struct Config {
    /// The database connection string (`postgres://…` or `memory://`).
    pub database_url: String,
    /// Optional Redis URL; when set, attempt counters are shared through Redis.
    pub redis_url: Option<String>,
    /// The address the HTTP server binds to.
    pub bind_addr: SocketAddr,
    /// The origin allowed by CORS.
    pub frontend_url: String,
    /// HMAC secret used to sign access tokens.
    pub jwt_secret: Zeroizing<Vec<u8>>,
    /// HMAC secret used to sign CSRF tokens.
    pub session_secret: Zeroizing<Vec<u8>>,
    /// AES-256 key for license ciphertexts.
    pub license_key: Zeroizing<[u8; KEY_SIZE]>,
    /// IV for license ciphertexts.
    pub license_iv: Zeroizing<[u8; IV_SIZE]>,
    /// Access token lifetime.
    pub token_ttl: Duration,
    /// Role assigned to self-registered users.
    pub default_role: String,
    /// `maxUsage` applied when an admin creates a license without one.
    pub license_default_max_usage: i32,
    /// Failed attempts before a source is blocked.
    pub attempt_threshold: u32,
    /// How long a blocked source stays blocked after its last failure.
    pub attempt_window: Duration,
    /// Interval of the background maintenance job.
    pub maintenance_interval: Duration,
    /// Password hashing work factors.
    pub password_policy: PasswordPolicy,
    /// Username of a superadmin created at startup if absent.
    pub bootstrap_admin: Option<(String, Zeroizing<String>)>,
    /// Whether cookies carry the `Secure` attribute.
    pub secure_cookies: bool,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// Missing required secrets are fatal.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let database_url = env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
        let jwt_secret = required_secret("JWT_SECRET")?;
        let session_secret = required_secret("SESSION_SECRET")?;
        let license_key = decode_hex_var::<KEY_SIZE>(
            "LICENSE_ENCRYPTION_KEY",
            "generate with: openssl rand -hex 32",
        )?;
        let license_iv = decode_hex_var::<IV_SIZE>(
            "LICENSE_ENCRYPTION_IV",
            "generate with: openssl rand -hex 16",
        )?;

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_USERNAME").ok(),
            env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => Some((username, Zeroizing::new(password))),
            (None, None) => None,
            _ => anyhow::bail!(
                "BOOTSTRAP_ADMIN_USERNAME and BOOTSTRAP_ADMIN_PASSWORD must be set together"
            ),
        };

        Ok(Self {
            database_url,
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            bind_addr: parse_var("BIND_ADDR", "127.0.0.1:5000")?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            jwt_secret,
            session_secret,
            license_key,
            license_iv,
            token_ttl: Duration::from_secs(parse_var::<u64>("TOKEN_TTL_MINUTES", "60")? * 60),
            default_role: env::var("DEFAULT_ROLE").unwrap_or_else(|_| "seller".to_string()),
            license_default_max_usage: parse_var("LICENSE_DEFAULT_MAX_USAGE", "5")?,
            attempt_threshold: parse_var("ATTEMPT_THRESHOLD", "5")?,
            attempt_window: Duration::from_secs(parse_var("ATTEMPT_WINDOW_SECS", "900")?),
            maintenance_interval: Duration::from_secs(parse_var(
                "MAINTENANCE_INTERVAL_SECS",
                "3600",
            )?),
            password_policy: PasswordPolicy {
                memory_kib: parse_var(
                    "ARGON2_MEMORY_KIB",
                    &DEFAULT_ARGON2_MEMORY_KIB.to_string(),
                )?,
                iterations: parse_var(
                    "ARGON2_ITERATIONS",
                    &DEFAULT_ARGON2_ITERATIONS.to_string(),
                )?,
            },
            bootstrap_admin,
            secure_cookies: env::var("APP_ENV").map(|v| v == "production").unwrap_or(false),
        })
    }
}

fn required_secret(name: &str) -> Result<Zeroizing<Vec<u8>>> {
    let mut value = env::var(name).with_context(|| format!("{} must be set", name))?;
    if value.len() < 16 {
        value.zeroize();
        anyhow::bail!("{} must be at least 16 characters", name);
    }
    let bytes = Zeroizing::new(value.as_bytes().to_vec());
    value.zeroize();
    Ok(bytes)
}

fn decode_hex_var<const N: usize>(name: &str, hint: &str) -> Result<Zeroizing<[u8; N]>> {
    let mut value_hex = env::var(name).with_context(|| format!("{} must be set ({})", name, hint))?;
    let mut bytes = hex::decode(value_hex.trim())
        .with_context(|| format!("{} must be valid hexadecimal", name))?;
    value_hex.zeroize();

    if bytes.len() != N {
        bytes.zeroize();
        anyhow::bail!("{} must be exactly {} bytes ({} hex characters)", name, N, N * 2);
    }

    let mut out = Zeroizing::new([0u8; N]);
    out.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(out)
}

fn parse_var<T>(name: &str, default: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .with_context(|| format!("Invalid {}", name))
}
