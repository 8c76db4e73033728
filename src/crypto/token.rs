use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::identity::Identity;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The user ID.
    pub sub: Uuid,
    /// The username at issue time.
    pub username: String,
    /// The effective role name at issue time.
    pub role: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
    /// Unique token ID.
    pub jti: Uuid,
}

/// Issues and verifies HS256 access tokens.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

/// A freshly issued token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The encoded JWT.
    pub token: String,
    /// The expiry timestamp, seconds since the epoch.
    pub expires_at: i64,
}

impl TokenService {
    /// Creates a new `TokenService`.
    ///
    /// # Arguments
    ///
    /// * `secret` - The HMAC signing secret.
    /// * `ttl` - The lifetime of issued tokens.
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Signs a token for the given user and role.
    ///
    /// `not_after` caps the expiry, so a token never outlives the grant its
    /// role came from.
    pub fn issue(
        &self,
        user_id: Uuid,
        username: &str,
        role: &str,
        not_after: Option<DateTime<Utc>>,
    ) -> Result<IssuedToken> {
        let now = Utc::now().timestamp();
        let mut exp = now + self.ttl.as_secs() as i64;
        if let Some(ceiling) = not_after {
            exp = exp.min(ceiling.timestamp());
        }
        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            role: role.to_string(),
            iat: now,
            exp,
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Crypto(format!("Token signing failed: {}", e)))?;

        Ok(IssuedToken { token, expires_at: exp })
    }

    /// Verifies signature and expiry and returns the identity the token carries.
    pub fn verify(&self, token: &str) -> Result<Identity> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let data = decode::<Claims>(token, &self.decoding, &validation)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))?;

        Ok(Identity {
            user_id: data.claims.sub,
            username: data.claims.username,
            role: data.claims.role,
            token_id: data.claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_token_verifies() {
        let tokens = TokenService::new(b"0123456789abcdef0123", Duration::from_secs(60));
        let user_id = Uuid::new_v4();
        let issued = tokens.issue(user_id, "alice", "seller", None).unwrap();

        let identity = tokens.verify(&issued.token).unwrap();
        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.role, "seller");
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let ours = TokenService::new(b"0123456789abcdef0123", Duration::from_secs(60));
        let theirs = TokenService::new(b"fedcba98765432100000", Duration::from_secs(60));
        let issued = theirs.issue(Uuid::new_v4(), "mallory", "superadmin", None).unwrap();

        assert!(matches!(ours.verify(&issued.token), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let tokens = TokenService::new(b"0123456789abcdef0123", Duration::from_secs(0));
        let issued = tokens.issue(Uuid::new_v4(), "bob", "admin", None).unwrap();
        std::thread::sleep(Duration::from_millis(1100));

        assert!(matches!(tokens.verify(&issued.token), Err(AppError::Unauthorized(_))));
    }

    #[test]
    fn expiry_is_capped_by_the_ceiling() {
        let tokens = TokenService::new(b"0123456789abcdef0123", Duration::from_secs(3600));
        let ceiling = Utc::now() + chrono::Duration::seconds(30);
        let issued = tokens
            .issue(Uuid::new_v4(), "carol", "admin", Some(ceiling))
            .unwrap();
        assert_eq!(issued.expires_at, ceiling.timestamp());

        let later = Utc::now() + chrono::Duration::hours(5);
        let issued = tokens.issue(Uuid::new_v4(), "carol", "admin", Some(later)).unwrap();
        assert!(issued.expires_at < later.timestamp());
    }

    #[test]
    fn garbage_is_rejected() {
        let tokens = TokenService::new(b"0123456789abcdef0123", Duration::from_secs(60));
        assert!(tokens.verify("a.b.c").is_err());
        assert!(tokens.verify("").is_err());
    }
}
