//! JWT-based request authentication.
//!
//! Session issuance lives outside this service; requests arrive with a
//! signed token in a cookie or an Authorization header, carrying the
//! caller's user id as the subject.

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id (UUID) as the token subject
    pub sub: String,
    pub email: Option<String>,
    pub iat: i64,
    pub exp: i64,
}

/// The authenticated caller, extracted from the request token.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub email: Option<String>,
}

/// Validate a JWT and return its claims.
pub fn validate_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

fn extract_token_from_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let cookie_header = headers.get(header::COOKIE)?.to_str().ok()?;

    for cookie_str in cookie_header.split(';') {
        if let Ok(cookie) = cookie::Cookie::parse(cookie_str.trim()) {
            if cookie.name() == cookie_name {
                return Some(cookie.value().to_string());
            }
        }
    }

    None
}

fn extract_token_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(|s| s.to_string())
}

#[async_trait::async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        // Cookie first, then Authorization header
        let token = extract_token_from_cookie(&parts.headers, &state.config.cookie_name)
            .or_else(|| extract_token_from_header(&parts.headers))
            .ok_or_else(|| ApiError::unauthorized("Missing authentication"))?;

        let claims = validate_token(&state.config.jwt_secret, &token)
            .map_err(|_| ApiError::unauthorized("Invalid or expired token"))?;

        let id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ApiError::unauthorized("Invalid token subject"))?;

        Ok(CurrentUser {
            id,
            email: claims.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "test-secret-key-for-testing-only";

    fn make_token(secret: &str, sub: &str, expires_in: Duration) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            email: Some("test@example.com".to_string()),
            iat: now.timestamp(),
            exp: (now + expires_in).timestamp(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .expect("should create token")
    }

    #[test]
    fn valid_token_round_trips() {
        let user_id = Uuid::new_v4();
        let token = make_token(SECRET, &user_id.to_string(), Duration::hours(1));

        let claims = validate_token(SECRET, &token).expect("should validate token");
        assert_eq!(claims.sub, user_id.to_string());
        assert_eq!(claims.email, Some("test@example.com".to_string()));
    }

    #[test]
    fn garbage_token_rejected() {
        assert!(validate_token(SECRET, "not-a-token").is_err());
    }

    #[test]
    fn wrong_secret_rejected() {
        let token = make_token(SECRET, "subject", Duration::hours(1));
        assert!(validate_token("some-other-secret", &token).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let token = make_token(SECRET, "subject", Duration::hours(-2));
        assert!(validate_token(SECRET, &token).is_err());
    }

    #[test]
    fn cookie_extraction_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            "other=1; auth_token=abc123; trailing=x".parse().unwrap(),
        );

        assert_eq!(
            extract_token_from_cookie(&headers, "auth_token"),
            Some("abc123".to_string())
        );
        assert_eq!(extract_token_from_cookie(&headers, "missing"), None);
    }

    #[test]
    fn bearer_extraction_strips_prefix() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Bearer abc123".parse().unwrap());
        assert_eq!(
            extract_token_from_header(&headers),
            Some("abc123".to_string())
        );

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, "Basic abc123".parse().unwrap());
        assert_eq!(extract_token_from_header(&basic), None);
    }
}
