//! Bearer token authentication.
//!
//! Tokens are HS256 JWTs carrying the user id (`sub`), a role and an expiry.
//! Issuing tokens belongs to the identity provider; this module only
//! verifies them.

use axum::extract::{FromRequestParts, Query};
use axum::http::request::Parts;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;

use vguard_models::{Requester, Role};

use crate::error::ApiError;
use crate::state::AppState;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    #[serde(default)]
    pub role: Role,
    /// Expiration (seconds since epoch)
    pub exp: i64,
}

/// Authenticated user extracted from request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub uid: String,
    pub role: Role,
}

impl AuthUser {
    pub fn requester(&self) -> Requester {
        Requester::new(self.uid.clone(), self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            uid: claims.sub,
            role: claims.role,
        }
    }
}

/// HS256 token verifier.
pub struct JwtVerifier {
    decoding: DecodingKey,
    encoding: EncodingKey,
    validation: Validation,
}

impl JwtVerifier {
    /// Create a verifier. An empty secret is rejected.
    pub fn new(secret: &str) -> Result<Self, ApiError> {
        if secret.is_empty() {
            return Err(ApiError::internal("JWT_SECRET must be set"));
        }
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);
        Ok(Self {
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Verify a token and return its claims.
    pub fn verify_token(&self, token: &str) -> Result<Claims, ApiError> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|e| ApiError::unauthorized(format!("Token validation failed: {}", e)))?;
        if data.claims.sub.is_empty() {
            return Err(ApiError::unauthorized("Token has an empty subject"));
        }
        Ok(data.claims)
    }

    /// Sign a token with the same secret (local tooling and tests).
    pub fn issue_token(&self, user_id: &str, role: Role, ttl_secs: i64) -> Result<String, ApiError> {
        let claims = Claims {
            sub: user_id.to_string(),
            role,
            exp: Utc::now().timestamp() + ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ApiError::internal(format!("Failed to sign token: {}", e)))
    }
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Bearer token from the Authorization header, or the `token` query
/// parameter for clients that cannot set headers (video elements, sockets).
fn extract_token(parts: &Parts) -> Result<String, ApiError> {
    if let Some(value) = parts.headers.get("Authorization") {
        let header = value
            .to_str()
            .map_err(|_| ApiError::unauthorized("Invalid Authorization header"))?;
        return header
            .strip_prefix("Bearer ")
            .map(str::to_string)
            .ok_or_else(|| ApiError::unauthorized("Invalid Authorization header format"));
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(q)| q.token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| ApiError::unauthorized("Missing Authorization header"))
}

/// Axum extractor for authenticated user.
#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(parts)?;
        let claims = state.verifier.verify_token(&token)?;
        debug!(uid = %claims.sub, role = %claims.role, "Authenticated request");
        Ok(AuthUser::from(claims))
    }
}
