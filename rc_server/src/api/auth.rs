//! Player token verification.
//!
//! Tokens are issued by the game's auth service; this server only checks
//! them. The `sub` claim is the player id.

use jsonwebtoken::{DecodingKey, Validation, decode};
use race_cup::tournament::PlayerId;
use serde::{Deserialize, Serialize};

/// JWT claims for a player access token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Player id
    pub sub: PlayerId,
    /// Expiration timestamp
    pub exp: i64,
}

/// Verifies HS256 access tokens
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }

    /// Verify an access token and return the player it was issued to
    pub fn verify(&self, token: &str) -> Result<PlayerId, jsonwebtoken::errors::Error> {
        let data = decode::<Claims>(token, &self.key, &self.validation)?;
        Ok(data.claims.sub)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    const SECRET: &str = "test_secret_key_for_testing_only_0123";

    fn token(sub: PlayerId, exp: i64, secret: &str) -> String {
        encode(
            &Header::default(),
            &Claims { sub, exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_verify_valid_token() {
        let verifier = TokenVerifier::new(SECRET);
        let exp = chrono::Utc::now().timestamp() + 900;
        assert_eq!(verifier.verify(&token(42, exp, SECRET)).unwrap(), 42);
    }

    #[test]
    fn test_reject_wrong_secret_and_expired() {
        let verifier = TokenVerifier::new(SECRET);
        let exp = chrono::Utc::now().timestamp() + 900;
        assert!(verifier.verify(&token(42, exp, "another_secret_another_secret_00")).is_err());

        let expired = chrono::Utc::now().timestamp() - 3600;
        assert!(verifier.verify(&token(42, expired, SECRET)).is_err());
        assert!(verifier.verify("not-a-token").is_err());
    }
}
