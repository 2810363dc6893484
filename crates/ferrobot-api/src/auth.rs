//! HTTP Basic authentication with a constant-time credential check.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, StatusCode};
use axum::http::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use axum::middleware::Next;
use axum::response::Response;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use subtle::{Choice, ConstantTimeEq};
use tracing::debug;

use crate::routes::json_response;

pub const REALM: &str = "Basic realm=\"Authorization Required\"";

/// One accepted (username, password) pair.
pub struct BasicAuth {
    username: Vec<u8>,
    password: Vec<u8>,
}

impl BasicAuth {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            username: username.as_bytes().to_vec(),
            password: password.as_bytes().to_vec(),
        }
    }

    /// Check an `Authorization` header value. The scheme is matched
    /// case-insensitively and surrounding whitespace is ignored.
    pub fn verify(&self, header: &[u8]) -> bool {
        match parse_basic(header) {
            Some((username, password)) => bool::from(self.matches(&username, &password)),
            None => false,
        }
    }

    /// Both fields are always compared; the result is combined without
    /// branching.
    pub fn matches(&self, username: &[u8], password: &[u8]) -> Choice {
        secure_compare(username, &self.username) & secure_compare(password, &self.password)
    }
}

/// Decoded `username:password` from a `Basic` credential. The password may
/// contain colons.
fn parse_basic(header: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let header = std::str::from_utf8(header).ok()?.trim();
    let (scheme, token) = header.split_once(char::is_whitespace)?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let mut decoded = STANDARD.decode(token.trim()).ok()?;
    let colon = decoded.iter().position(|&b| b == b':')?;
    let password = decoded.split_off(colon + 1);
    decoded.truncate(colon);
    Some((decoded, password))
}

/// Equal-length inputs are compared in constant time. On a length mismatch
/// `actual` is still compared against itself so the work done does not
/// depend on where the inputs differ.
pub fn secure_compare(given: &[u8], actual: &[u8]) -> Choice {
    if given.len() == actual.len() {
        return given.ct_eq(actual);
    }
    let _ = actual.ct_eq(actual);
    Choice::from(0)
}

pub(crate) async fn require_basic_auth(
    State(auth): State<Arc<BasicAuth>>,
    request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    if auth.verify(header) {
        return next.run(request).await;
    }
    debug!(uri = %request.uri(), "rejected request without valid credentials");
    let mut response = json_response(
        StatusCode::UNAUTHORIZED,
        &serde_json::json!({ "error": "Not Authorized" }),
    );
    response
        .headers_mut()
        .insert(WWW_AUTHENTICATE, HeaderValue::from_static(REALM));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    fn basic(credentials: &str) -> String {
        format!("Basic {}", STANDARD.encode(credentials))
    }

    #[test]
    fn compares_whole_input() {
        assert!(bool::from(secure_compare(b"abc", b"abc")));
        assert!(!bool::from(secure_compare(b"abd", b"abc")));
        assert!(!bool::from(secure_compare(b"xbc", b"abc")));
        assert!(!bool::from(secure_compare(b"ab", b"abc")));
        assert!(!bool::from(secure_compare(b"", b"abc")));
    }

    #[test]
    fn header_for_known_credentials() {
        let auth = BasicAuth::new("admin", "password");
        assert!(auth.verify(b"Basic YWRtaW46cGFzc3dvcmQ="));
        assert!(!auth.verify(b"Basic YWRtaW46cGFzc3dvcmR4"));
        assert!(!auth.verify(b"YWRtaW46cGFzc3dvcmQ="));
        assert!(!auth.verify(b"Bearer YWRtaW46cGFzc3dvcmQ="));
        assert!(!auth.verify(b"Basic !!!"));
        assert!(!auth.verify(b""));
    }

    #[test]
    fn scheme_is_case_insensitive_and_whitespace_tolerant() {
        let auth = BasicAuth::new("admin", "password");
        assert!(auth.verify(b"basic YWRtaW46cGFzc3dvcmQ="));
        assert!(auth.verify(b"BASIC YWRtaW46cGFzc3dvcmQ="));
        assert!(auth.verify(b"  Basic   YWRtaW46cGFzc3dvcmQ=  "));
    }

    #[test]
    fn password_may_contain_colons() {
        let auth = BasicAuth::new("admin", "pa:ss");
        assert!(auth.verify(basic("admin:pa:ss").as_bytes()));
        assert!(!auth.verify(basic("admin:pa").as_bytes()));
        assert!(!auth.verify(basic("adminpass").as_bytes()));
    }

    #[test]
    fn both_fields_are_checked() {
        let auth = BasicAuth::new("admin", "password");
        assert!(bool::from(auth.matches(b"admin", b"password")));
        assert!(!bool::from(auth.matches(b"admin", b"passwore")));
        assert!(!bool::from(auth.matches(b"admin0", b"password")));
        assert!(!bool::from(auth.matches(b"root", b"password")));
        assert!(!bool::from(auth.matches(b"", b"")));
    }
}
