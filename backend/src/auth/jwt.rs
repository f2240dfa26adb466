use super::models::Claims;
use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT encoding error: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),
    #[error("JWT decoding error: {0}")]
    Decoding(String),
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
}

#[derive(Clone)]
pub struct JwtService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl JwtService {
    pub fn new(secret: &str) -> Self {
        Self::with_lifetime(secret, Duration::hours(24))
    }

    pub fn with_lifetime(secret: &str, lifetime: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_ref()),
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            lifetime,
        }
    }

    pub fn generate_token(&self, username: &str) -> Result<String, JwtError> {
        let now = Utc::now();
        let expiration = now + self.lifetime;

        let claims = Claims {
            sub: username.to_string(),
            exp: expiration.timestamp().max(0) as usize,
            iat: now.timestamp() as usize,
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.encoding_key).map_err(JwtError::Encoding)
    }

    /// Signature, algorithm and `exp` are all checked by `Validation`.
    pub fn verify_token(&self, token: &str) -> Result<Claims, JwtError> {
        let validation = Validation::new(Algorithm::HS256);

        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|token_data| {
                log::debug!("JWT token decoded for user {}", token_data.claims.sub);
                token_data.claims
            })
            .map_err(|err| {
                log::warn!("JWT token decode error: {:?}", err);
                match err.kind() {
                    ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                    ErrorKind::InvalidToken | ErrorKind::InvalidSignature => JwtError::InvalidToken,
                    _ => JwtError::Decoding(err.to_string()),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_username() {
        let service = JwtService::new("secret");
        let token = service.generate_token("farmer").unwrap();
        assert_eq!(service.verify_token(&token).unwrap().sub, "farmer");
    }

    #[test]
    fn rejects_foreign_signature() {
        let token = JwtService::new("one").generate_token("farmer").unwrap();
        assert!(matches!(
            JwtService::new("two").verify_token(&token),
            Err(JwtError::InvalidToken)
        ));
    }

    #[test]
    fn rejects_malformed_and_expired() {
        let service = JwtService::new("secret");
        assert!(matches!(service.verify_token(""), Err(JwtError::InvalidToken)));
        assert!(matches!(service.verify_token("a.b"), Err(JwtError::InvalidToken)));

        let expired = JwtService::with_lifetime("secret", Duration::hours(-2))
            .generate_token("farmer")
            .unwrap();
        assert!(matches!(service.verify_token(&expired), Err(JwtError::TokenExpired)));
    }
}
