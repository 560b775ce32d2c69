//! JWT token issuance and validation.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use sha2::{Digest, Sha256};

use super::Claims;

/// Manages JWT token creation and validation.
#[derive(Clone)]
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
}

impl JwtManager {
    /// Create a new `JwtManager` with the given secret.
    pub fn new(secret: &[u8], access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl_secs,
            refresh_ttl_secs,
        }
    }

    /// Issue an access token for the given user. Returns the token and its
    /// TTL in seconds.
    pub fn issue_access_token(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<(String, i64), jsonwebtoken::errors::Error> {
        let token = self.issue(user_id, username, "access", self.access_ttl_secs)?;
        Ok((token, self.access_ttl_secs))
    }

    /// Issue a refresh token for the given user. Returns the token and its
    /// absolute expiry timestamp.
    pub fn issue_refresh_token(
        &self,
        user_id: &str,
        username: &str,
    ) -> Result<(String, i64), jsonwebtoken::errors::Error> {
        let exp = lockwatch_core::db::unix_timestamp() + self.refresh_ttl_secs;
        let token = self.issue(user_id, username, "refresh", self.refresh_ttl_secs)?;
        Ok((token, exp))
    }

    fn issue(
        &self,
        user_id: &str,
        username: &str,
        token_type: &str,
        ttl_secs: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = lockwatch_core::db::unix_timestamp();

        let claims = Claims {
            jti: uuid::Uuid::new_v4().to_string(),
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now,
            exp: now + ttl_secs,
            token_type: token_type.to_string(),
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
    }

    /// Validate a token and return its claims.
    pub fn validate(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        let data =
            jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &Validation::default())?;
        Ok(data.claims)
    }

    /// Validate a bearer token and return the owner ID, or `None` for
    /// anything that is not a valid access token. Used where an invalid
    /// token degrades to "unauthenticated" rather than an error.
    pub fn owner_of(&self, token: &str) -> Option<String> {
        self.validate(token)
            .ok()
            .filter(Claims::is_access)
            .map(|c| c.sub)
    }

    /// Hash a token for storage (raw refresh tokens are never stored).
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}
