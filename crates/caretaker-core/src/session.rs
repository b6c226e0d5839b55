//! Session token store.
//!
//! Tokens are HS256 JWTs signed with a symmetric key known only to the
//! supervisor. Every token carries a random 128-bit identifier (`jti`) used
//! for revocation lookups. Verification pins the algorithm, validates the
//! expiry, and then consults the revocation store under a hard sub-second
//! deadline — a slow store must never block request handling, so a lookup
//! timeout or error is treated as "not revoked" and logged.
//!
//! Renewal is sliding: when a verified token's remaining lifetime falls
//! below the renewal window, a fresh token is issued for the same identity.
//! The old token stays valid until its own expiry unless revoked.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{RevocationError, SessionError};
use crate::revocation::RevocationStore;

/// Default session lifetime.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(30 * 60);

/// Default sliding-renewal window.
pub const DEFAULT_RENEW_WINDOW: Duration = Duration::from_secs(10 * 60);

/// Hard deadline for revocation lookups during verify.
const REVOCATION_LOOKUP_TIMEOUT: Duration = Duration::from_millis(300);

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User identifier (subject).
    pub sub: String,
    /// User email.
    pub email: String,
    /// Subscription plan.
    #[serde(default)]
    pub plan: String,
    /// Whether the user has completed onboarding.
    #[serde(default)]
    pub onboarding_completed: bool,
    /// Random token identifier used for revocation.
    pub jti: String,
    /// Issued-at (unix seconds).
    pub iat: i64,
    /// Expires-at (unix seconds).
    pub exp: i64,
}

impl SessionClaims {
    /// Remaining lifetime at `now`, zero if already expired.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        let secs = self.exp - now.timestamp();
        Duration::from_secs(u64::try_from(secs).unwrap_or(0))
    }
}

/// Identity a session is issued for.
#[derive(Debug, Clone)]
pub struct SessionIdentity {
    pub user_id: String,
    pub email: String,
    pub plan: String,
    pub onboarding_completed: bool,
}

impl From<&SessionClaims> for SessionIdentity {
    fn from(claims: &SessionClaims) -> Self {
        Self {
            user_id: claims.sub.clone(),
            email: claims.email.clone(),
            plan: claims.plan.clone(),
            onboarding_completed: claims.onboarding_completed,
        }
    }
}

/// A freshly signed token, returned once at issue time.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The signed token string (cookie value).
    pub token: String,
    /// The token identifier embedded in the claims.
    pub token_id: String,
    /// Expiry timestamp.
    pub expires_at: DateTime<Utc>,
}

/// Issues, verifies, renews, and revokes session tokens.
pub struct SessionStore {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    renew_window: Duration,
    revocations: Arc<dyn RevocationStore>,
}

impl SessionStore {
    #[must_use]
    pub fn new(
        secret: &str,
        ttl: Duration,
        renew_window: Duration,
        revocations: Arc<dyn RevocationStore>,
    ) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
            renew_window,
            revocations,
        }
    }

    /// Session lifetime configured for this store.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a fresh token for `identity`.
    ///
    /// Never blocks on external I/O.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encoding`] if signing fails.
    pub fn issue(&self, identity: &SessionIdentity) -> Result<IssuedToken, SessionError> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let token_id = uuid::Uuid::new_v4().to_string();

        let claims = SessionClaims {
            sub: identity.user_id.clone(),
            email: identity.email.clone(),
            plan: identity.plan.clone(),
            onboarding_completed: identity.onboarding_completed,
            jti: token_id.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| SessionError::Encoding {
                reason: e.to_string(),
            })?;

        Ok(IssuedToken {
            token,
            token_id,
            expires_at,
        })
    }

    /// Verify a token string and return its claims.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Expired`] if the expiry timestamp has passed.
    /// - [`SessionError::Revoked`] if the token identifier is revoked.
    /// - [`SessionError::Invalid`] for a bad signature, wrong algorithm, or
    ///   malformed token.
    pub async fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let claims = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => SessionError::Expired,
                _ => SessionError::Invalid {
                    reason: e.to_string(),
                },
            })?
            .claims;

        // Revocation lookup under a hard deadline. Availability wins over
        // strict consistency: a timeout or store error passes the token.
        let lookup = tokio::time::timeout(
            REVOCATION_LOOKUP_TIMEOUT,
            self.revocations.is_revoked(&claims.jti),
        )
        .await;

        match lookup {
            Ok(Ok(true)) => Err(SessionError::Revoked),
            Ok(Ok(false)) => Ok(claims),
            Ok(Err(e)) => {
                warn!(error = %e, "revocation lookup failed, treating token as not revoked");
                Ok(claims)
            }
            Err(_) => {
                warn!("revocation lookup timed out, treating token as not revoked");
                Ok(claims)
            }
        }
    }

    /// Issue a replacement token if `claims` are within the renewal window.
    ///
    /// Returns `None` when the current token still has more than the window
    /// remaining.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Encoding`] if signing the replacement fails.
    pub fn maybe_renew(&self, claims: &SessionClaims) -> Result<Option<IssuedToken>, SessionError> {
        if claims.remaining(Utc::now()) > self.renew_window {
            return Ok(None);
        }
        self.issue(&SessionIdentity::from(claims)).map(Some)
    }

    /// Revoke `claims` for the remainder of their lifetime.
    ///
    /// A token that has already expired is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RevocationError::Unavailable`] if the store write fails.
    pub async fn revoke(&self, claims: &SessionClaims) -> Result<(), RevocationError> {
        let remaining = claims.remaining(Utc::now());
        if remaining.is_zero() {
            return Ok(());
        }
        self.revocations.revoke(&claims.jti, remaining).await
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("ttl", &self.ttl)
            .field("renew_window", &self.renew_window)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::revocation::MemoryStore;

    const SECRET: &str = "test-signing-secret";

    fn make_store() -> SessionStore {
        SessionStore::new(
            SECRET,
            DEFAULT_SESSION_TTL,
            DEFAULT_RENEW_WINDOW,
            Arc::new(MemoryStore::new()),
        )
    }

    fn identity() -> SessionIdentity {
        SessionIdentity {
            user_id: "u-1".to_owned(),
            email: "a@b".to_owned(),
            plan: "free".to_owned(),
            onboarding_completed: false,
        }
    }

    /// Sign arbitrary claims with the test secret (for expiry/window cases).
    fn sign(claims: &SessionClaims) -> String {
        jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn claims_expiring_in(secs: i64) -> SessionClaims {
        let now = Utc::now().timestamp();
        SessionClaims {
            sub: "u-1".to_owned(),
            email: "a@b".to_owned(),
            plan: "free".to_owned(),
            onboarding_completed: false,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + secs,
        }
    }

    #[tokio::test]
    async fn issue_verify_round_trip() {
        let store = make_store();
        let issued = store.issue(&identity()).unwrap();
        let claims = store.verify(&issued.token).await.unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.email, "a@b");
        assert_eq!(claims.jti, issued.token_id);
    }

    #[tokio::test]
    async fn tampered_token_is_rejected() {
        let store = make_store();
        let issued = store.issue(&identity()).unwrap();
        let mut tampered = issued.token.clone();
        tampered.pop();
        tampered.push('x');
        assert!(matches!(
            store.verify(&tampered).await,
            Err(SessionError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn wrong_algorithm_is_rejected() {
        let store = make_store();
        let claims = claims_expiring_in(600);
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::HS384),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(matches!(
            store.verify(&token).await,
            Err(SessionError::Invalid { .. })
        ));
    }

    #[tokio::test]
    async fn expired_token_is_rejected() {
        let store = make_store();
        let token = sign(&claims_expiring_in(-120));
        assert!(matches!(store.verify(&token).await, Err(SessionError::Expired)));
    }

    #[tokio::test]
    async fn revoked_token_is_rejected_until_expiry() {
        let store = make_store();
        let issued = store.issue(&identity()).unwrap();
        let claims = store.verify(&issued.token).await.unwrap();

        store.revoke(&claims).await.unwrap();

        assert!(matches!(
            store.verify(&issued.token).await,
            Err(SessionError::Revoked)
        ));
    }

    #[tokio::test]
    async fn fresh_token_is_not_renewed() {
        let store = make_store();
        let issued = store.issue(&identity()).unwrap();
        let claims = store.verify(&issued.token).await.unwrap();
        assert!(store.maybe_renew(&claims).unwrap().is_none());
    }

    #[tokio::test]
    async fn near_expiry_token_is_renewed_with_same_identity() {
        let store = make_store();
        // 5 minutes left, inside the 10 minute window.
        let old = claims_expiring_in(300);
        let renewed = store.maybe_renew(&old).unwrap().unwrap();

        let new_claims = store.verify(&renewed.token).await.unwrap();
        assert_eq!(new_claims.sub, old.sub);
        assert_eq!(new_claims.email, old.email);
        assert!(new_claims.exp > old.exp);
        assert_ne!(new_claims.jti, old.jti, "renewal must mint a fresh token id");
    }

    #[tokio::test]
    async fn revoking_expired_token_is_a_no_op() {
        let store = make_store();
        let claims = claims_expiring_in(-10);
        store.revoke(&claims).await.unwrap();
    }
}
