//! Identity provider contract.
//!
//! Sessions are HS256 tokens minted by the external identity provider and
//! presented either as a bearer header or a `session` cookie. The resolved
//! identity is an explicit request-scoped value passed into every service
//! call; nothing reads ambient session state.

use crate::errors::ServiceError;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SESSION_COOKIE: &str = "session";

/// The authenticated principal for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
    pub email: String,
}

/// Session token claims issued by the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub exp: usize,
}

/// Verifies session tokens against the shared secret.
#[derive(Clone)]
pub struct AuthVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl AuthVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    /// Validates a session token and resolves the identity it carries.
    pub fn verify(&self, token: &str) -> Result<Identity, ServiceError> {
        let data = decode::<Claims>(
            token,
            &self.decoding_key,
            &Validation::new(Algorithm::HS256),
        )
        .map_err(|e| ServiceError::AuthError(format!("invalid session token: {}", e)))?;

        Ok(Identity {
            user_id: data.claims.sub,
            email: data.claims.email,
        })
    }

    /// Mints a session token. Used by tests and local tooling; production
    /// tokens come from the identity provider itself.
    pub fn issue(&self, user_id: Uuid, email: &str, ttl: Duration) -> Result<String, ServiceError> {
        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            exp: (Utc::now() + ttl).timestamp() as usize,
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| ServiceError::InternalError(format!("failed to sign token: {}", e)))
    }
}

/// Extractor resolving the current buyer from the request.
///
/// Every cart, address, and checkout operation requires this; a missing or
/// invalid session fails before the store is touched.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Identity);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
    AuthVerifier: FromRef<S>,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let verifier = AuthVerifier::from_ref(state);
        let token = bearer_token(parts)
            .or_else(|| session_cookie(parts))
            .ok_or_else(|| ServiceError::AuthError("no active session".to_string()))?;
        let identity = verifier.verify(&token)?;
        Ok(CurrentUser(identity))
    }
}

fn bearer_token(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    value
        .strip_prefix("Bearer ")
        .map(|token| token.trim().to_string())
}

fn session_cookie(parts: &Parts) -> Option<String> {
    let value = parts.headers.get(header::COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (name, token) = pair.trim().split_once('=')?;
        (name == SESSION_COOKIE).then(|| token.to_string())
    })
}
