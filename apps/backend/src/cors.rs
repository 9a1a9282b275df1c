//! Cross-origin policy.
//!
//! With an allow-list only exact origins are accepted. Without one, only
//! same-origin requests are, judged against the `Host` header. Requests
//! without an `Origin` header (non-browser clients) are never affected.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{
        header::{AUTHORIZATION, CONTENT_TYPE, HOST, ORIGIN},
        HeaderMap, HeaderValue, Method, Uri,
    },
    middleware::Next,
    response::Response,
};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::{ApiError, Result};
use crate::AppState;

#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed: Vec<String>,
}

impl OriginPolicy {
    pub fn new(allowed: Vec<String>) -> Self {
        Self { allowed }
    }

    pub fn allows(&self, origin: &str, host: Option<&str>) -> bool {
        if !self.allowed.is_empty() {
            return self.allowed.iter().any(|o| o == origin);
        }
        let Some(host) = host else {
            return false;
        };
        origin
            .parse::<Uri>()
            .ok()
            .and_then(|uri| uri.authority().map(|a| a.as_str().eq_ignore_ascii_case(host)))
            .unwrap_or(false)
    }

    fn allows_request(&self, origin: &HeaderValue, headers: &HeaderMap) -> bool {
        let host = headers.get(HOST).and_then(|h| h.to_str().ok());
        origin
            .to_str()
            .map(|o| self.allows(o, host))
            .unwrap_or(false)
    }

    /// CORS layer echoing only origins this policy accepts.
    pub fn layer(&self) -> CorsLayer {
        let policy = self.clone();
        CorsLayer::new()
            .allow_origin(AllowOrigin::predicate(move |origin, parts| {
                policy.allows_request(origin, &parts.headers)
            }))
            .allow_methods([Method::GET, Method::PUT, Method::OPTIONS])
            .allow_headers([CONTENT_TYPE, AUTHORIZATION])
    }
}

/// Reject cross-origin requests the policy does not accept with 403.
pub async fn reject_foreign_origin(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response> {
    if let Some(origin) = request.headers().get(ORIGIN) {
        if !state.origins.allows_request(origin, request.headers()) {
            tracing::warn!(origin = ?origin, "rejected cross-origin request");
            return Err(ApiError::Forbidden("Origin not allowed".to_string()));
        }
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_list_requires_exact_match() {
        let policy = OriginPolicy::new(vec!["https://quiz.example.com".to_string()]);
        assert!(policy.allows("https://quiz.example.com", None));
        assert!(!policy.allows("https://quiz.example.com.evil.net", None));
        assert!(!policy.allows("http://quiz.example.com", Some("quiz.example.com")));
    }

    #[test]
    fn test_same_origin_without_allow_list() {
        let policy = OriginPolicy::default();
        assert!(policy.allows("http://localhost:3000", Some("localhost:3000")));
        assert!(!policy.allows("http://localhost:5173", Some("localhost:3000")));
        assert!(!policy.allows("http://localhost:3000", None));
        assert!(!policy.allows("null", Some("localhost:3000")));
    }
}
