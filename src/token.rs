/// Token service: issues and verifies signed, time-bound identity assertions.
///
/// Verification is stateless and side-effect-free so it can run on every
/// request; callers that need the live user record must do a separate
/// directory lookup.
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::users::User;

/// Token lifetime: 24 hours.
pub const TOKEN_TTL_SECS: u64 = 24 * 60 * 60;

/// Claims embedded in a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    /// Subject (user ID).
    pub subject_id: String,
    pub email: String,
    pub display_name: String,
    /// Issued at (unix seconds).
    pub issued_at: u64,
    /// Expiration (unix seconds).
    pub expires_at: u64,
}

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Invalid token signature")]
    BadSignature,

    #[error("Token has expired")]
    Expired,
}

/// Manages token creation and validation against a server-held secret.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl_secs: u64,
}

impl TokenService {
    pub fn new(secret: &[u8]) -> Self {
        Self::with_ttl(secret, TOKEN_TTL_SECS)
    }

    pub fn with_ttl(secret: &[u8], ttl_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl_secs,
        }
    }

    /// Issue a signed assertion for the given user, valid for the
    /// configured lifetime starting now.
    pub fn issue(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(user, now_secs())
    }

    /// Issue with an explicit issue time. Exposed for expiry tests.
    pub fn issue_at(
        &self,
        user: &User,
        issued_at: u64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let claims = Claims {
            subject_id: user.id.clone(),
            email: user.email.clone(),
            display_name: user.name.clone(),
            issued_at,
            expires_at: issued_at + self.ttl_secs,
        };
        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Verify a token and return its claims.
    ///
    /// Expiry is checked explicitly with zero leeway because the claims use
    /// the `expiresAt` field name rather than the registered `exp` claim.
    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::default();
        validation.validate_exp = false;
        validation.set_required_spec_claims::<&str>(&[]);

        let data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::InvalidSignature => TokenError::BadSignature,
                _ => TokenError::Malformed,
            })?;

        if data.claims.expires_at < now_secs() {
            return Err(TokenError::Expired);
        }
        Ok(data.claims)
    }
}

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            id: "user-1".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: String::new(),
            created_at: 0,
        }
    }

    fn test_service() -> TokenService {
        TokenService::new(b"test-secret-key-for-testing")
    }

    #[test]
    fn test_issue_and_verify_round_trip() {
        let tokens = test_service();
        let token = tokens.issue(&test_user()).unwrap();

        let claims = tokens.verify(&token).unwrap();
        assert_eq!(claims.subject_id, "user-1");
        assert_eq!(claims.email, "alice@example.com");
        assert_eq!(claims.display_name, "Alice");
        assert_eq!(claims.expires_at, claims.issued_at + TOKEN_TTL_SECS);
    }

    #[test]
    fn test_expired_token_rejected() {
        let tokens = test_service();
        // Issued far enough in the past that the 24h lifetime has elapsed.
        let token = tokens
            .issue_at(&test_user(), now_secs() - TOKEN_TTL_SECS - 10)
            .unwrap();

        assert!(matches!(tokens.verify(&token), Err(TokenError::Expired)));
    }

    #[test]
    fn test_garbage_is_malformed() {
        let tokens = test_service();
        assert!(matches!(
            tokens.verify("not-a-valid-token"),
            Err(TokenError::Malformed)
        ));
        assert!(matches!(tokens.verify(""), Err(TokenError::Malformed)));
    }

    #[test]
    fn test_wrong_secret_is_bad_signature() {
        let tokens = test_service();
        let other = TokenService::new(b"different-secret");

        let token = tokens.issue(&test_user()).unwrap();
        assert!(matches!(other.verify(&token), Err(TokenError::BadSignature)));
    }

    #[test]
    fn test_tampered_signature_is_bad_signature() {
        let tokens = test_service();
        let token = tokens.issue(&test_user()).unwrap();

        // Flip one character inside the signature segment, keeping it valid
        // base64url so the failure is cryptographic, not syntactic.
        let sig_start = token.rfind('.').unwrap() + 1;
        let mut bytes = token.into_bytes();
        let target = &mut bytes[sig_start];
        *target = if *target == b'A' { b'B' } else { b'A' };
        let tampered = String::from_utf8(bytes).unwrap();

        assert!(matches!(
            tokens.verify(&tampered),
            Err(TokenError::BadSignature)
        ));
    }

    #[test]
    fn test_payload_tampering_breaks_signature() {
        let tokens = test_service();
        let token = tokens.issue(&test_user()).unwrap();

        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        parts[1] = parts[1].replace('a', "b");
        let tampered = parts.join(".");

        assert!(tokens.verify(&tampered).is_err());
    }
}
