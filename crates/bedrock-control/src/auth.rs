use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{error::ApiError, state::AppState};

/// Claims issued by the account service.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub user_id: i32,
    pub email: String,
    pub exp: usize,
    pub iat: usize,
}

/// Caller identity, inserted as a request extension by [`require_bearer`].
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i32,
    pub email: String,
}

pub fn validate_access_jwt(token: &str, secret: &[u8]) -> anyhow::Result<AuthUser> {
    let validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::HS256);
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &jsonwebtoken::DecodingKey::from_secret(secret),
        &validation,
    )?;
    Ok(AuthUser {
        user_id: data.claims.user_id,
        email: data.claims.email,
    })
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .trim();
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

// Middleware: every `/bedrock` route needs a valid HS256 bearer token.
pub async fn require_bearer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let Some(token) = bearer_token(req.headers()).map(str::to_string) else {
        return ApiError::unauthorized("missing bearer token").into_response();
    };
    match validate_access_jwt(&token, &state.config.jwt_secret) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(err) => {
            tracing::debug!(%err, "rejected bearer token");
            ApiError::unauthorized("invalid access token").into_response()
        }
    }
}

#[cfg(test)]
pub(crate) fn make_access_jwt(user_id: i32, email: &str, secret: &[u8], ttl_secs: i64) -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = Claims {
        user_id,
        email: email.to_string(),
        exp: (now + ttl_secs) as usize,
        iat: now as usize,
    };
    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(jsonwebtoken::Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret),
    )
    .unwrap()
}
