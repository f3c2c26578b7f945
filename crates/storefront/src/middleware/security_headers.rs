//! Security headers added to every response.
//!
//! The policy is locked down to same-origin resources, with one exception:
//! product images and covers are served from the object storage origin.

use axum::{
    extract::{Request, State},
    http::{
        HeaderName, HeaderValue,
        header::{
            CACHE_CONTROL, CONTENT_SECURITY_POLICY, REFERRER_POLICY, X_CONTENT_TYPE_OPTIONS,
            X_FRAME_OPTIONS,
        },
    },
    middleware::Next,
    response::Response,
};

/// Precomputed header values, shared by every request.
#[derive(Clone)]
pub struct SecurityHeaders {
    csp: HeaderValue,
}

impl SecurityHeaders {
    /// Build the policy allowing images from `storage_url`'s origin.
    #[must_use]
    pub fn new(storage_url: &str) -> Self {
        let image_origin = url::Url::parse(storage_url)
            .ok()
            .map(|u| u.origin().ascii_serialization())
            .filter(|origin| origin != "null")
            .unwrap_or_default();
        let policy = content_security_policy(&image_origin);
        let csp = HeaderValue::from_str(&policy)
            .unwrap_or_else(|_| HeaderValue::from_static("default-src 'self'"));
        Self { csp }
    }
}

fn content_security_policy(image_origin: &str) -> String {
    format!(
        "default-src 'none'; \
         script-src 'self'; \
         style-src 'self'; \
         font-src 'self'; \
         img-src 'self' {image_origin}; \
         connect-src 'self'; \
         frame-src 'none'; \
         object-src 'none'; \
         base-uri 'self'; \
         form-action 'self' https://checkout.stripe.com; \
         frame-ancestors 'none'"
    )
}

pub async fn security_headers_middleware(
    State(security): State<SecurityHeaders>,
    request: Request,
    next: Next,
) -> Response {
    let is_asset = request.uri().path().starts_with("/static/");
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static("DENY"));
    headers.insert(X_CONTENT_TYPE_OPTIONS, HeaderValue::from_static("nosniff"));
    headers.insert(
        REFERRER_POLICY,
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    headers.insert(CONTENT_SECURITY_POLICY, security.csp);
    headers.insert(
        HeaderName::from_static("permissions-policy"),
        HeaderValue::from_static("camera=(), geolocation=(), microphone=(), usb=()"),
    );
    headers.insert(
        HeaderName::from_static("cross-origin-opener-policy"),
        HeaderValue::from_static("same-origin"),
    );
    // Pages carry per-user cart and wallet data.
    if !is_asset && !headers.contains_key(CACHE_CONTROL) {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_origin_allowed_for_images() {
        let headers = SecurityHeaders::new("https://files.denim.na/some/path");
        let csp = headers.csp.to_str().unwrap_or_default();
        assert!(csp.contains("img-src 'self' https://files.denim.na;"));
        assert!(csp.contains("default-src 'none'"));
    }

    #[test]
    fn test_invalid_storage_url_keeps_self_only() {
        let headers = SecurityHeaders::new("not a url");
        let csp = headers.csp.to_str().unwrap_or_default();
        assert!(csp.contains("img-src 'self' ;"));
    }
}
