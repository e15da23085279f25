//! Credential verification: bearer tokens and the optional static API key.
//!
//! Both checks are stateless. Token verification only touches the HMAC
//! secret and the clock; the API key check is a constant-time comparison.

use crate::config::AuthConfig;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use subtle::ConstantTimeEq;
use time::{Duration, OffsetDateTime};

/// The authenticated identity attached to a request after a gate pass.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Subject identifier (the user id).
    pub subject: String,
    /// Role identifier.
    pub role_id: i64,
}

impl Principal {
    pub fn new(subject: impl Into<String>, role_id: i64) -> Self {
        Self {
            subject: subject.into(),
            role_id,
        }
    }
}

/// Claims carried by a bearer token.
///
/// Tokens signed by the login service name the user `userId` (numeric) and
/// the role `roleId`; both spellings are accepted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims {
    #[serde(alias = "userId", deserialize_with = "subject_claim")]
    pub sub: String,
    #[serde(alias = "roleId")]
    pub role_id: i64,
    pub iat: i64,
    pub exp: i64,
}

fn subject_claim<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Subject {
        Text(String),
        Id(i64),
    }

    Ok(match Subject::deserialize(deserializer)? {
        Subject::Text(text) => text,
        Subject::Id(id) => id.to_string(),
    })
}

/// Typed credential failure.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("no token provided")]
    Missing,

    #[error("malformed token")]
    Malformed,

    #[error("token expired")]
    Expired,

    #[error("invalid token")]
    Invalid,

    #[error("no api key provided")]
    ApiKeyMissing,

    #[error("invalid api key")]
    ApiKeyInvalid,

    /// The verifier itself failed. The detail is for logs only.
    #[error("credential verifier fault: {0}")]
    Internal(String),
}

/// Token verification seam used by the admission gate.
pub trait VerifyToken: Send + Sync + 'static {
    /// Verify a raw bearer token and return the principal it names.
    fn verify(&self, token: &str) -> Result<Principal, TokenError>;
}

/// HS256 token issuer/verifier.
#[derive(Clone)]
pub struct JwtVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl fmt::Debug for JwtVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtVerifier")
            .field("algorithm", &"HS256")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl JwtVerifier {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;
        // `sub` may arrive as `userId`; its presence is enforced by `Claims`.
        validation.set_required_spec_claims(&["exp"]);

        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.jwt_secret.as_bytes(), config.token_ttl())
    }

    /// Issue a token for `principal` that expires after the configured TTL.
    pub fn issue(&self, principal: &Principal) -> Result<String, TokenError> {
        let now = OffsetDateTime::now_utc();
        self.issue_at(principal, now, now + self.ttl)
    }

    /// Issue a token with explicit issue and expiry instants.
    pub fn issue_at(
        &self,
        principal: &Principal,
        issued_at: OffsetDateTime,
        expires_at: OffsetDateTime,
    ) -> Result<String, TokenError> {
        let claims = Claims {
            sub: principal.subject.clone(),
            role_id: principal.role_id,
            iat: issued_at.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TokenError::Internal(format!("token encode failed: {e}")))
    }
}

impl VerifyToken for JwtVerifier {
    fn verify(&self, token: &str) -> Result<Principal, TokenError> {
        if token.trim().is_empty() {
            return Err(TokenError::Missing);
        }

        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired,
                ErrorKind::InvalidToken
                | ErrorKind::Base64(_)
                | ErrorKind::Json(_)
                | ErrorKind::Utf8(_)
                | ErrorKind::MissingRequiredClaim(_) => TokenError::Malformed,
                ErrorKind::InvalidKeyFormat | ErrorKind::Crypto(_) => {
                    TokenError::Internal(e.to_string())
                }
                _ => TokenError::Invalid,
            }
        })?;

        Ok(Principal {
            subject: data.claims.sub,
            role_id: data.claims.role_id,
        })
    }
}

/// Secondary static-key check.
///
/// `Disabled` means the feature is switched off: requests pass without an
/// `api-key` header. It is chosen only when checking is disabled in config
/// or no key is configured, never as a fallback for a failed comparison.
#[derive(Clone)]
pub enum ApiKeyPolicy {
    Disabled,
    Required { digest: [u8; 32] },
}

impl fmt::Debug for ApiKeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => write!(f, "ApiKeyPolicy::Disabled"),
            Self::Required { .. } => write!(f, "ApiKeyPolicy::Required(<redacted>)"),
        }
    }
}

impl ApiKeyPolicy {
    /// Build the policy from the configured key, if any.
    pub fn from_key(key: Option<&str>) -> Self {
        match key {
            Some(key) => Self::Required {
                digest: key_digest(key),
            },
            None => Self::Disabled,
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Required { .. })
    }

    /// Check a candidate key for an already-authenticated principal.
    ///
    /// The principal is part of the signature so keys can later be scoped
    /// by role; today every role shares the one configured key.
    pub fn verify(&self, candidate: Option<&str>, _principal: &Principal) -> Result<(), TokenError> {
        match self {
            Self::Disabled => Ok(()),
            Self::Required { digest } => {
                let candidate = candidate
                    .filter(|c| !c.is_empty())
                    .ok_or(TokenError::ApiKeyMissing)?;
                // Compare fixed-length digests so the comparison time does not
                // depend on where (or whether) the lengths differ.
                if bool::from(key_digest(candidate).ct_eq(digest)) {
                    Ok(())
                } else {
                    Err(TokenError::ApiKeyInvalid)
                }
            }
        }
    }
}

fn key_digest(key: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> JwtVerifier {
        JwtVerifier::new(b"unit-test-secret", Duration::hours(1))
    }

    #[test]
    fn issue_and_verify_roundtrip() {
        let v = verifier();
        let principal = Principal::new("42", 3);
        let token = v.issue(&principal).unwrap();
        assert_eq!(v.verify(&token).unwrap(), principal);
    }

    #[test]
    fn expired_token_reports_expired_not_invalid() {
        let v = verifier();
        let now = OffsetDateTime::now_utc();
        let token = v
            .issue_at(
                &Principal::new("7", 1),
                now - Duration::hours(2),
                now - Duration::hours(1),
            )
            .unwrap();
        assert_eq!(v.verify(&token), Err(TokenError::Expired));
    }

    fn sign(claims: &serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap()
    }

    #[test]
    fn login_service_claims_are_accepted() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let token = sign(&serde_json::json!({
            "userId": 17,
            "roleId": 2,
            "iat": now,
            "exp": now + 900,
        }));
        assert_eq!(verifier().verify(&token), Ok(Principal::new("17", 2)));
    }

    #[test]
    fn token_without_subject_is_malformed() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let token = sign(&serde_json::json!({"role_id": 2, "iat": now, "exp": now + 900}));
        assert_eq!(verifier().verify(&token), Err(TokenError::Malformed));
    }

    #[test]
    fn wrong_secret_is_invalid() {
        let token = verifier().issue(&Principal::new("1", 1)).unwrap();
        let other = JwtVerifier::new(b"another-secret", Duration::hours(1));
        assert_eq!(other.verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn expired_token_with_bad_signature_is_invalid() {
        let now = OffsetDateTime::now_utc();
        let token = verifier()
            .issue_at(
                &Principal::new("1", 1),
                now - Duration::hours(2),
                now - Duration::hours(1),
            )
            .unwrap();
        let other = JwtVerifier::new(b"another-secret", Duration::hours(1));
        assert_eq!(other.verify(&token), Err(TokenError::Invalid));
    }

    #[test]
    fn garbage_is_malformed() {
        let v = verifier();
        assert_eq!(v.verify("not-a-token"), Err(TokenError::Malformed));
        assert_eq!(v.verify("a.b.c"), Err(TokenError::Malformed));
    }

    #[test]
    fn empty_token_is_missing() {
        let v = verifier();
        assert_eq!(v.verify(""), Err(TokenError::Missing));
        assert_eq!(v.verify("   "), Err(TokenError::Missing));
    }

    #[test]
    fn api_key_disabled_is_noop() {
        let policy = ApiKeyPolicy::from_key(None);
        assert!(!policy.is_enabled());
        assert!(policy.verify(None, &Principal::new("1", 1)).is_ok());
    }

    #[test]
    fn api_key_required_checks_value() {
        let policy = ApiKeyPolicy::from_key(Some("k-123"));
        let principal = Principal::new("1", 1);
        assert!(policy.is_enabled());
        assert!(policy.verify(Some("k-123"), &principal).is_ok());
        assert_eq!(
            policy.verify(Some("k-124"), &principal),
            Err(TokenError::ApiKeyInvalid)
        );
        assert_eq!(
            policy.verify(Some("k-123-longer"), &principal),
            Err(TokenError::ApiKeyInvalid)
        );
        assert_eq!(
            policy.verify(None, &principal),
            Err(TokenError::ApiKeyMissing)
        );
        assert_eq!(
            policy.verify(Some(""), &principal),
            Err(TokenError::ApiKeyMissing)
        );
    }

    #[test]
    fn api_key_policy_debug_redacts() {
        let policy = ApiKeyPolicy::from_key(Some("visible?"));
        assert!(!format!("{policy:?}").contains("visible"));
    }
}
