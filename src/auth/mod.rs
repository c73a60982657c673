use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::Claims;

/// JWT Authentication Service. The coordinator consumes this only as
/// "verify token, yield identity"; credential issuance lives with the
/// account system.
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiry_seconds: u64,
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            expiry_seconds: config.jwt_expiry_seconds,
        }
    }

    /// Generate a bearer token for a user.
    pub fn generate_token(&self, user_id: &str, username: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let exp = now + self.expiry_seconds as i64;

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            iat: now,
            exp,
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate a bearer token and return the claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::default();
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Auth(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }

    /// Extract a bearer token from an `Authorization` header value.
    pub fn extract_bearer(&self, header: &str) -> Result<Claims> {
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Auth("Expected Bearer token".to_string()))?;

        self.validate_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> Config {
        Config {
            server_host: "localhost".to_string(),
            server_port: 8080,
            redis_url: None,
            jwt_secret: "test-secret-key".to_string(),
            jwt_expiry_seconds: 900,
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_server: None,
            turn_username: None,
            turn_credential: None,
        }
    }

    #[test]
    fn test_generate_and_validate_token() {
        let auth = AuthService::new(&test_config());

        let token = auth
            .generate_token("user-123", "alice")
            .expect("Should generate token");

        let claims = auth.validate_token(&token).expect("Should validate token");

        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_extract_bearer() {
        let auth = AuthService::new(&test_config());

        let token = auth
            .generate_token("user-123", "alice")
            .expect("Should generate token");

        let claims = auth
            .extract_bearer(&format!("Bearer {}", token))
            .expect("Should extract bearer token");

        assert_eq!(claims.sub, "user-123");
        assert!(auth.extract_bearer(&token).is_err());
    }

    #[test]
    fn test_invalid_token() {
        let auth = AuthService::new(&test_config());

        let result = auth.validate_token("invalid-token");
        assert!(result.is_err());
    }
}
