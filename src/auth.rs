use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
};
use sha2::{Digest, Sha256};

/// Checks bearer tokens against the configured admin token.
///
/// Only the SHA-256 digest of the configured token is kept in memory.
pub struct AdminAuth {
    digest: Option<[u8; 32]>,
}

impl AdminAuth {
    pub fn new(token: Option<&str>) -> Self {
        let digest = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(digest);
        if digest.is_none() {
            tracing::warn!("no admin token configured, admin routes are disabled");
        }
        Self { digest }
    }

    pub fn verify(&self, token: Option<&str>) -> bool {
        match (self.digest, token) {
            (Some(expected), Some(token)) => expected == digest(token),
            _ => false,
        }
    }
}

fn digest(token: &str) -> [u8; 32] {
    Sha256::digest(token.as_bytes()).into()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim())
}

/// Extractor proving the request carries the admin token.
pub struct Admin;

#[async_trait]
impl FromRequestParts<AppState> for Admin {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if state.auth.verify(bearer(&parts.headers)) {
            Ok(Admin)
        } else {
            tracing::debug!(path = %parts.uri.path(), "admin token rejected");
            Err(ApiError::Unauthorized)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        h
    }

    #[test]
    fn accepts_only_the_configured_token() {
        let auth = AdminAuth::new(Some("s3cret"));
        assert!(auth.verify(bearer(&headers("Bearer s3cret"))));
        assert!(auth.verify(bearer(&headers("bearer  s3cret "))));
        assert!(!auth.verify(bearer(&headers("Bearer wrong"))));
        assert!(!auth.verify(bearer(&headers("Basic s3cret"))));
        assert!(!auth.verify(None));
    }

    #[test]
    fn unset_token_rejects_everything() {
        let auth = AdminAuth::new(None);
        assert!(!auth.verify(Some("")));
        let blank = AdminAuth::new(Some("   "));
        assert!(!blank.verify(Some("   ")));
    }
}
