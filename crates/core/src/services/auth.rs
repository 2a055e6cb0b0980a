//! Bearer token verification.
//!
//! Tokens are HS256 JWTs issued by the identity service. A token is accepted
//! only if its signature and expiry check out and it was issued recently
//! enough.

use campusdesk_common::{AppError, AppResult, config::AuthConfig};
use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};

/// Clock skew tolerated on `iat` and `exp`.
const LEEWAY_SECS: i64 = 60;

/// JWT claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User ID.
    pub sub: String,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expiry, seconds since the epoch.
    pub exp: i64,
}

/// Verifies bearer tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
    max_age_secs: i64,
}

impl TokenVerifier {
    #[must_use]
    pub fn new(secret: &str, max_age_secs: u64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = LEEWAY_SECS as u64;
        validation.set_required_spec_claims(&["exp", "sub", "iat"]);

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            max_age_secs: i64::try_from(max_age_secs).unwrap_or(i64::MAX),
        }
    }

    #[must_use]
    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.jwt_secret, config.token_max_age_secs)
    }

    /// Verify `token` and return its claims.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> AppResult<Claims> {
        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AppError::Unauthorized
            })?
            .claims;

        let now = now.timestamp();
        if claims.iat > now + LEEWAY_SECS {
            tracing::debug!(sub = %claims.sub, "Token issued in the future");
            return Err(AppError::Unauthorized);
        }
        if now - claims.iat > self.max_age_secs {
            tracing::debug!(sub = %claims.sub, "Token too old");
            return Err(AppError::Unauthorized);
        }
        if claims.sub.is_empty() {
            return Err(AppError::Unauthorized);
        }

        Ok(claims)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::issue_token;
    use chrono::Duration;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_valid_token() {
        let now = Utc::now();
        let token = issue_token(SECRET, "user1", now - Duration::minutes(5), now + Duration::hours(1));

        let claims = TokenVerifier::new(SECRET, 3600).verify(&token, now).unwrap();
        assert_eq!(claims.sub, "user1");
    }

    #[test]
    fn test_wrong_secret() {
        let now = Utc::now();
        let token = issue_token("other", "user1", now, now + Duration::hours(1));

        assert!(matches!(
            TokenVerifier::new(SECRET, 3600).verify(&token, now),
            Err(AppError::Unauthorized)
        ));
    }

    #[test]
    fn test_expired_token() {
        let now = Utc::now();
        let token = issue_token(SECRET, "user1", now - Duration::hours(3), now - Duration::hours(2));

        assert!(TokenVerifier::new(SECRET, 86_400).verify(&token, now).is_err());
    }

    #[test]
    fn test_stale_token_rejected_before_expiry() {
        let now = Utc::now();
        let token = issue_token(SECRET, "user1", now - Duration::hours(2), now + Duration::days(7));

        assert!(TokenVerifier::new(SECRET, 3600).verify(&token, now).is_err());
        assert!(TokenVerifier::new(SECRET, 3 * 3600).verify(&token, now).is_ok());
    }

    #[test]
    fn test_garbage() {
        assert!(TokenVerifier::new(SECRET, 3600).verify("not-a-jwt", Utc::now()).is_err());
    }
}
