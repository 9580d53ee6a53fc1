//! JWT verification against a configured JWKS
//!
//! The key set is supplied as a JSON document (`JWKS_JSON`); keys are
//! indexed by `kid` at startup. Verification checks the RS256 signature,
//! the configured issuer, and expiry.

use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

/// Claims the authorizer consumes.
#[derive(Debug, Deserialize)]
pub struct Claims {
    /// Principal the policy is issued for
    pub sub: String,
    /// Space-separated OAuth scopes, if present
    #[serde(default)]
    pub scope: Option<String>,
}

/// Token verification errors. All of them result in a Deny.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("Invalid JWKS document: {0}")]
    InvalidJwks(#[from] serde_json::Error),

    #[error("Malformed token: {0}")]
    Malformed(#[from] jsonwebtoken::errors::Error),

    #[error("Token header has no kid")]
    MissingKid,

    #[error("No key for kid {0}")]
    UnknownKid(String),
}

/// Verifies bearer tokens against a fixed key set.
pub struct TokenVerifier {
    keys_by_kid: HashMap<String, DecodingKey>,
    issuer: String,
}

impl TokenVerifier {
    /// Build a verifier from a JWKS JSON document. Keys without a `kid` are
    /// skipped since lookup requires one.
    pub fn from_jwks_json(jwks_json: &str, issuer: String) -> Result<Self, VerifyError> {
        let jwk_set: JwkSet = serde_json::from_str(jwks_json)?;

        let mut keys_by_kid = HashMap::new();
        for jwk in &jwk_set.keys {
            if let Some(kid) = &jwk.common.key_id {
                if let Ok(key) = DecodingKey::from_jwk(jwk) {
                    keys_by_kid.insert(kid.clone(), key);
                }
            }
        }

        Ok(Self { keys_by_kid, issuer })
    }

    /// Number of usable keys (for startup logging).
    pub fn key_count(&self) -> usize {
        self.keys_by_kid.len()
    }

    /// Verify a token and return its claims.
    pub fn verify(&self, token: &str) -> Result<Claims, VerifyError> {
        let header = decode_header(token)?;
        let kid = header.kid.ok_or(VerifyError::MissingKid)?;
        let key = self
            .keys_by_kid
            .get(&kid)
            .ok_or_else(|| VerifyError::UnknownKid(kid.clone()))?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.set_issuer(&[&self.issuer]);

        let data = decode::<Claims>(token, key, &validation)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_jwks_json() -> &'static str {
        r#"{
            "keys": [
                {
                    "kty": "RSA",
                    "kid": "test-kid-1",
                    "use": "sig",
                    "alg": "RS256",
                    "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
                    "e": "AQAB"
                },
                {
                    "kty": "RSA",
                    "use": "sig",
                    "alg": "RS256",
                    "n": "0vx7agoebGcQSuuPiLJXZptN9nndrQmbXEps2aiAFbWhM78LhWx4cbbfAAtVT86zwu1RK7aPFFxuhDR1L6tSoc_BJECPebWKRXjBZCiFV4n3oknjhMstn64tZ_2W-5JsGY4Hc5n9yBXArwl93lqt7_RN5w6Cf0h4QyQ5v-65YGjQR0_FDW2QvzqY368QQMicAtaSqzs8KJZgnYb9c7d0zgdAZHzu6qMQvRL5hajrn1n91CbOpbISD08qNLyrdkt-bFTWhAI4vMQFh6WeZu0fM4lFd2NcRwr3XPksINHaQ-G_xBniIqbw0Ls1jF44-csFCur-kEgU8awapJzKnqDKgw",
                    "e": "AQAB"
                }
            ]
        }"#
    }

    #[test]
    fn test_keys_indexed_by_kid() {
        let verifier =
            TokenVerifier::from_jwks_json(sample_jwks_json(), "https://issuer.test".into())
                .unwrap();
        // The second key has no kid and is skipped.
        assert_eq!(verifier.key_count(), 1);
    }

    #[test]
    fn test_invalid_jwks_rejected() {
        assert!(TokenVerifier::from_jwks_json("{broken", "iss".into()).is_err());
    }

    #[test]
    fn test_garbage_token_rejected() {
        let verifier =
            TokenVerifier::from_jwks_json(sample_jwks_json(), "https://issuer.test".into())
                .unwrap();
        assert!(verifier.verify("not-a-jwt").is_err());
    }

    #[test]
    fn test_token_without_kid_rejected() {
        let verifier =
            TokenVerifier::from_jwks_json(sample_jwks_json(), "https://issuer.test".into())
                .unwrap();
        // Valid JWT structure (HS256, no kid) but not verifiable here.
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &serde_json::json!({ "sub": "user-1", "exp": 4102444800u64 }),
            &jsonwebtoken::EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(VerifyError::MissingKid)
        ));
    }

    #[test]
    fn test_unknown_kid_rejected() {
        let verifier =
            TokenVerifier::from_jwks_json(sample_jwks_json(), "https://issuer.test".into())
                .unwrap();
        let mut header = jsonwebtoken::Header::default();
        header.kid = Some("other-kid".to_string());
        let token = jsonwebtoken::encode(
            &header,
            &serde_json::json!({ "sub": "user-1", "exp": 4102444800u64 }),
            &jsonwebtoken::EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(matches!(
            verifier.verify(&token),
            Err(VerifyError::UnknownKid(_))
        ));
    }
}
