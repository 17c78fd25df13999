//! # Token Validation and Claim Extraction
//!
//! Two separate capabilities operate on a bearer credential:
//! - [`TokenValidator`] decides whether the credential is intact and unexpired
//! - [`ClaimExtractor`] reads identity fields out of a credential that passed
//!
//! The pipeline always validates first, so extraction never runs on a rejected
//! credential. [`JwtTokenValidator`] implements both for HMAC-signed JWTs.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::fmt;

use crate::core::config::JwtConfig;
use crate::core::error::{GatewayError, GatewayResult};

/// The raw bearer token following the `Bearer ` prefix
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new<S: Into<String>>(raw: S) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential([REDACTED])")
    }
}

/// Identity fields carried by a validated credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub username: Option<String>,
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub expiry: DateTime<Utc>,
}

/// Why a credential was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionReason {
    Expired,
    NotYetValid,
    BadSignature,
    Malformed,
    /// Issuer, audience or algorithm differ from what the gateway accepts
    ClaimMismatch,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expired => "expired",
            Self::NotYetValid => "not_yet_valid",
            Self::BadSignature => "bad_signature",
            Self::Malformed => "malformed",
            Self::ClaimMismatch => "claim_mismatch",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of validating a credential
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidity {
    Valid,
    Rejected(RejectionReason),
}

impl TokenValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid)
    }
}

/// Verifies credential integrity and expiry
///
/// A rejected credential is an `Ok(TokenValidity::Rejected(_))`. `Err` is reserved
/// for faults inside the validator itself (key lookup failures and the like).
#[async_trait]
pub trait TokenValidator: Send + Sync {
    async fn validate(&self, credential: &Credential) -> GatewayResult<TokenValidity>;
}

/// Reads identity fields from a validated credential
///
/// Missing fields are `None`, never an error.
pub trait ClaimExtractor: Send + Sync {
    fn extract_claims(&self, credential: &Credential) -> GatewayResult<Claims>;

    fn extract_username(&self, credential: &Credential) -> GatewayResult<Option<String>> {
        Ok(self.extract_claims(credential)?.username)
    }

    fn extract_user_id(&self, credential: &Credential) -> GatewayResult<Option<String>> {
        Ok(self.extract_claims(credential)?.user_id)
    }

    fn extract_role(&self, credential: &Credential) -> GatewayResult<Option<String>> {
        Ok(self.extract_claims(credential)?.role)
    }
}

/// JWT payload as issued by the token service
#[derive(Debug, Deserialize)]
struct JwtPayload {
    sub: Option<serde_json::Value>,
    #[serde(rename = "userId")]
    user_id: Option<serde_json::Value>,
    role: Option<serde_json::Value>,
    exp: Option<serde_json::Value>,
}

/// Expiry as an instant, clamped to the representable range
///
/// The validator has already accepted `exp`, so a value chrono cannot represent
/// is treated as "far away" rather than as a failure.
fn expiry_instant(value: Option<&serde_json::Value>) -> DateTime<Utc> {
    let seconds = match value {
        Some(serde_json::Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|_| i64::MAX))
            .or_else(|| n.as_f64().map(|f| f as i64)),
        _ => None,
    };
    match seconds {
        Some(secs) => Utc.timestamp_opt(secs, 0).single().unwrap_or(if secs < 0 {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        }),
        None => DateTime::<Utc>::MAX_UTC,
    }
}

/// String claims may arrive as JSON numbers (`"userId": 42`).
fn claim_text(value: Option<serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// HMAC JWT validator and claim extractor
///
/// The decoding key is built once and never mutated, so one instance can be
/// shared by every request through an `Arc`.
#[derive(Clone)]
pub struct JwtTokenValidator {
    key: DecodingKey,
    validation: Validation,
    extraction: Validation,
}

impl JwtTokenValidator {
    pub fn new(config: &JwtConfig) -> GatewayResult<Self> {
        if config.secret.is_empty() {
            return Err(GatewayError::config("JWT secret cannot be empty"));
        }

        let algorithm: Algorithm = config.algorithm.into();

        let mut validation = Validation::new(algorithm);
        validation.leeway = config.leeway_seconds;
        validation.validate_nbf = true;
        match &config.issuer {
            Some(issuer) => validation.set_issuer(&[issuer]),
            None => validation.iss = None,
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }

        // Extraction trusts the earlier validation: the signature is still checked
        // but a credential that expires in between must not fail extraction.
        let mut extraction = validation.clone();
        extraction.validate_exp = false;
        extraction.validate_nbf = false;

        Ok(Self {
            key: DecodingKey::from_secret(config.secret.as_bytes()),
            validation,
            extraction,
        })
    }

    fn rejection_for(kind: &JwtErrorKind) -> Option<RejectionReason> {
        match kind {
            JwtErrorKind::ExpiredSignature => Some(RejectionReason::Expired),
            JwtErrorKind::ImmatureSignature => Some(RejectionReason::NotYetValid),
            JwtErrorKind::InvalidSignature => Some(RejectionReason::BadSignature),
            JwtErrorKind::InvalidToken
            | JwtErrorKind::Base64(_)
            | JwtErrorKind::Json(_)
            | JwtErrorKind::Utf8(_)
            | JwtErrorKind::MissingRequiredClaim(_) => Some(RejectionReason::Malformed),
            JwtErrorKind::InvalidIssuer
            | JwtErrorKind::InvalidAudience
            | JwtErrorKind::InvalidSubject
            | JwtErrorKind::InvalidAlgorithm
            | JwtErrorKind::InvalidAlgorithmName
            | JwtErrorKind::MissingAlgorithm => Some(RejectionReason::ClaimMismatch),
            _ => None,
        }
    }
}

#[async_trait]
impl TokenValidator for JwtTokenValidator {
    async fn validate(&self, credential: &Credential) -> GatewayResult<TokenValidity> {
        match decode::<serde_json::Value>(credential.as_str(), &self.key, &self.validation) {
            Ok(_) => Ok(TokenValidity::Valid),
            Err(err) => match Self::rejection_for(err.kind()) {
                Some(reason) => Ok(TokenValidity::Rejected(reason)),
                None => Err(err.into()),
            },
        }
    }
}

impl ClaimExtractor for JwtTokenValidator {
    fn extract_claims(&self, credential: &Credential) -> GatewayResult<Claims> {
        let data = decode::<JwtPayload>(credential.as_str(), &self.key, &self.extraction)?;
        let payload = data.claims;

        Ok(Claims {
            expiry: expiry_instant(payload.exp.as_ref()),
            username: claim_text(payload.sub),
            user_id: claim_text(payload.user_id),
            role: claim_text(payload.role),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::JwtAlgorithm;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use serde_json::json;

    const SECRET: &str = "unit-test-secret-with-enough-bytes";

    fn config() -> JwtConfig {
        JwtConfig {
            secret: SECRET.to_string(),
            algorithm: JwtAlgorithm::HS256,
            leeway_seconds: 0,
            issuer: None,
            audience: None,
        }
    }

    fn mint(secret: &str, claims: serde_json::Value) -> Credential {
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("Failed to create test JWT");
        Credential::new(token)
    }

    fn in_an_hour() -> i64 {
        Utc::now().timestamp() + 3600
    }

    #[tokio::test]
    async fn test_valid_token() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        let credential = mint(
            SECRET,
            json!({"sub": "alice", "userId": "42", "role": "ADMIN", "exp": in_an_hour()}),
        );
        assert_eq!(validator.validate(&credential).await.unwrap(), TokenValidity::Valid);
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        let credential = mint(
            SECRET,
            json!({"sub": "alice", "exp": Utc::now().timestamp() - 600}),
        );
        assert_eq!(
            validator.validate(&credential).await.unwrap(),
            TokenValidity::Rejected(RejectionReason::Expired)
        );
    }

    #[tokio::test]
    async fn test_wrong_secret_is_rejected() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        let credential = mint(
            "some-other-secret",
            json!({"sub": "alice", "exp": in_an_hour()}),
        );
        assert_eq!(
            validator.validate(&credential).await.unwrap(),
            TokenValidity::Rejected(RejectionReason::BadSignature)
        );
    }

    #[tokio::test]
    async fn test_garbage_is_malformed() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        for raw in ["", "not-a-jwt", "a.b.c", " Bearer x"] {
            assert_eq!(
                validator.validate(&Credential::new(raw)).await.unwrap(),
                TokenValidity::Rejected(RejectionReason::Malformed),
                "credential {:?}",
                raw
            );
        }
    }

    #[tokio::test]
    async fn test_missing_exp_is_malformed() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        let credential = mint(SECRET, json!({"sub": "alice"}));
        assert_eq!(
            validator.validate(&credential).await.unwrap(),
            TokenValidity::Rejected(RejectionReason::Malformed)
        );
    }

    #[tokio::test]
    async fn test_issuer_mismatch() {
        let mut cfg = config();
        cfg.issuer = Some("auth-service".to_string());
        let validator = JwtTokenValidator::new(&cfg).unwrap();
        let credential = mint(
            SECRET,
            json!({"sub": "alice", "iss": "someone-else", "exp": in_an_hour()}),
        );
        assert_eq!(
            validator.validate(&credential).await.unwrap(),
            TokenValidity::Rejected(RejectionReason::ClaimMismatch)
        );
    }

    #[test]
    fn test_extract_claims() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        let exp = in_an_hour();
        let credential = mint(
            SECRET,
            json!({"sub": "alice", "userId": 42, "role": "ADMIN", "exp": exp}),
        );

        let claims = validator.extract_claims(&credential).unwrap();
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.user_id.as_deref(), Some("42"));
        assert_eq!(claims.role.as_deref(), Some("ADMIN"));
        assert_eq!(claims.expiry.timestamp(), exp);

        assert_eq!(
            validator.extract_username(&credential).unwrap().as_deref(),
            Some("alice")
        );
    }

    #[test]
    fn test_missing_claims_are_none() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        let credential = mint(SECRET, json!({"sub": "bob", "exp": in_an_hour()}));

        assert_eq!(validator.extract_role(&credential).unwrap(), None);
        assert_eq!(validator.extract_user_id(&credential).unwrap(), None);
    }

    #[test]
    fn test_extraction_ignores_expiry() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        let credential = mint(
            SECRET,
            json!({"sub": "carol", "exp": Utc::now().timestamp() - 5}),
        );
        assert_eq!(
            validator.extract_username(&credential).unwrap().as_deref(),
            Some("carol")
        );
    }

    #[tokio::test]
    async fn test_numeric_subject_extracts_after_validation() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        let credential = mint(SECRET, json!({"sub": 1001, "role": "USER", "exp": in_an_hour()}));

        assert_eq!(validator.validate(&credential).await.unwrap(), TokenValidity::Valid);
        let claims = validator.extract_claims(&credential).unwrap();
        assert_eq!(claims.username.as_deref(), Some("1001"));
        assert_eq!(claims.role.as_deref(), Some("USER"));
    }

    #[tokio::test]
    async fn test_far_future_expiry_extracts_after_validation() {
        let validator = JwtTokenValidator::new(&config()).unwrap();
        let credential = mint(SECRET, json!({"sub": "dave", "exp": 9_999_999_999_999_i64}));

        assert_eq!(validator.validate(&credential).await.unwrap(), TokenValidity::Valid);
        let claims = validator.extract_claims(&credential).unwrap();
        assert_eq!(claims.username.as_deref(), Some("dave"));
        assert_eq!(claims.expiry, DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_expiry_clamping() {
        assert_eq!(expiry_instant(Some(&json!(60))).timestamp(), 60);
        assert_eq!(expiry_instant(Some(&json!(u64::MAX))), DateTime::<Utc>::MAX_UTC);
        assert_eq!(expiry_instant(Some(&json!(i64::MIN))), DateTime::<Utc>::MIN_UTC);
        assert_eq!(expiry_instant(None), DateTime::<Utc>::MAX_UTC);
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let mut cfg = config();
        cfg.secret.clear();
        assert!(JwtTokenValidator::new(&cfg).is_err());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let credential = Credential::new("eyJhbGciOi.secret.sig");
        assert!(!format!("{:?}", credential).contains("secret"));
    }
}
