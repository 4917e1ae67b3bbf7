//! Security headers applied to every response.

use axum::{
    http::{HeaderName, HeaderValue},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

/// CSP for the auth surface: everything same-origin, no inline scripts.
const CONTENT_SECURITY_POLICY: &str = "default-src 'self'; script-src 'self'; \
     style-src 'self' 'unsafe-inline'; img-src 'self' data: blob:; \
     connect-src 'self'";

const HEADERS: &[(&str, &str)] = &[
    ("content-security-policy", CONTENT_SECURITY_POLICY),
    // Prevent browsers from incorrectly detecting non-scripts as scripts
    ("x-content-type-options", "nosniff"),
    ("x-xss-protection", "1; mode=block"),
    // Only allow being framed by same origin
    ("x-frame-options", "SAMEORIGIN"),
    ("x-permitted-cross-domain-policies", "none"),
    // Help ensure that provider tokens aren't leaked cross-origin
    ("cross-origin-resource-policy", "same-origin"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-embedder-policy", "require-corp"),
    ("referrer-policy", "no-referrer-when-downgrade"),
];

/// Apply the security-header set to a router.
#[must_use]
pub fn security_headers(mut router: Router) -> Router {
    for (name, value) in HEADERS {
        router = router.layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static(name),
            HeaderValue::from_static(value),
        ));
    }

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_set_is_well_formed() {
        for (name, value) in HEADERS {
            // from_static panics on malformed input; touching every pair
            // here keeps the table honest.
            let _ = HeaderName::from_static(name);
            let _ = HeaderValue::from_static(value);
        }
    }

    #[test]
    fn csp_restricts_scripts_to_self() {
        assert!(CONTENT_SECURITY_POLICY.contains("default-src 'self'"));
        assert!(CONTENT_SECURITY_POLICY.contains("script-src 'self'"));
        assert!(!CONTENT_SECURITY_POLICY.contains("unsafe-eval"));
    }
}
