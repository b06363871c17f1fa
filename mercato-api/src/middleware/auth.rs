use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mercato_core::{AuthContext, CoreError, CoreResult, IdentityResolver, Role};
use mercato_order::OrderError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// User id
    pub sub: String,
    #[serde(default)]
    pub roles: Vec<String>,
    pub exp: usize,
}

/// HS256 bearer tokens carrying the user id and role names
pub struct JwtIdentityResolver {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityResolver {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
        }
    }
}

impl IdentityResolver for JwtIdentityResolver {
    fn resolve(&self, token: &str) -> CoreResult<AuthContext> {
        let token_data = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| CoreError::IdentityError(e.to_string()))?;

        let user_id = Uuid::parse_str(&token_data.claims.sub)
            .map_err(|_| CoreError::IdentityError("subject is not a user id".to_string()))?;

        // Unknown role names grant nothing
        let roles = token_data.claims.roles.iter().filter_map(|r| Role::parse(r));

        Ok(AuthContext::new(user_id, roles))
    }
}

/// Sign a token for `user_id`. Used by tooling and tests.
pub fn issue_token(secret: &str, user_id: Uuid, roles: &[Role], ttl: Duration) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id.to_string(),
        roles: roles
            .iter()
            .map(|r| match r {
                Role::Customer => "CUSTOMER",
                Role::Seller => "SELLER",
                Role::Admin => "ADMIN",
            }.to_string())
            .collect(),
        exp: (Utc::now() + ttl).timestamp() as usize,
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

// ============================================================================
// Authentication Middleware
// ============================================================================

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req.headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(OrderError::TokenInvalid)?;

    let auth = state.identity.resolve(token).map_err(|e| {
        tracing::warn!("Rejected bearer token: {}", e);
        OrderError::TokenInvalid
    })?;

    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_resolve_round_trip() {
        let user_id = Uuid::new_v4();
        let token = issue_token(SECRET, user_id, &[Role::Customer, Role::Seller], Duration::minutes(5)).unwrap();

        let auth = JwtIdentityResolver::new(SECRET).resolve(&token).unwrap();

        assert_eq!(auth.user_id, user_id);
        assert!(auth.has_role(Role::Customer));
        assert!(auth.has_role(Role::Seller));
        assert!(!auth.has_role(Role::Admin));
    }

    #[test]
    fn test_resolve_fails_closed() {
        let resolver = JwtIdentityResolver::new(SECRET);

        let wrong_key = issue_token("other-secret", Uuid::new_v4(), &[Role::Customer], Duration::minutes(5)).unwrap();
        assert!(resolver.resolve(&wrong_key).is_err());

        let expired = issue_token(SECRET, Uuid::new_v4(), &[Role::Customer], Duration::hours(-2)).unwrap();
        assert!(resolver.resolve(&expired).is_err());

        assert!(resolver.resolve("not-a-jwt").is_err());
    }

    #[test]
    fn test_subject_must_be_uuid() {
        let claims = Claims {
            sub: "guest-42".to_string(),
            roles: vec!["CUSTOMER".to_string()],
            exp: (Utc::now() + Duration::minutes(5)).timestamp() as usize,
        };
        let token = encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap();

        assert!(JwtIdentityResolver::new(SECRET).resolve(&token).is_err());
    }
}
