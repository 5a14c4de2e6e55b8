use axum::http::{header, HeaderMap, HeaderValue};
use cookie::{Cookie, SameSite};
use shared_types::AppError;

/// Carries the access token from the callback to the success page.
pub const HANDOFF_COOKIE: &str = "anduin-handoff";

/// Lifetime of the handoff cookie.
const HANDOFF_MAX_AGE_SECS: i64 = 300;

fn header_value(cookie: Cookie<'_>) -> Result<HeaderValue, AppError> {
    HeaderValue::from_str(&cookie.encoded().to_string())
        .map_err(|e| AppError::internal(format!("Invalid cookie header: {e}")))
}

/// Build the http-only session cookie holding the access token. It lives for
/// the browser session; the token's own expiry bounds its use.
pub fn build_session_cookie(name: &str, token: &str, secure: bool) -> Result<HeaderValue, AppError> {
    let cookie = Cookie::build((name.to_string(), token.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .secure(secure)
        .build();
    header_value(cookie)
}

/// Build the short-lived cookie used between the callback and the success page.
pub fn build_handoff_cookie(token: &str, secure: bool) -> Result<HeaderValue, AppError> {
    let cookie = Cookie::build((HANDOFF_COOKIE, token.to_string()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(cookie::time::Duration::seconds(HANDOFF_MAX_AGE_SECS))
        .secure(secure)
        .build();
    header_value(cookie)
}

/// Build a Set-Cookie header that expires the cookie called `name`.
pub fn build_clear_cookie(name: &str) -> Result<HeaderValue, AppError> {
    let cookie = Cookie::build((name.to_string(), String::new()))
        .http_only(true)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(cookie::time::Duration::ZERO)
        .build();
    header_value(cookie)
}

/// Extract the access token from the session cookie (preferred) or an
/// `Authorization: Bearer` header. The scheme is matched ignoring case.
pub fn extract_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    if let Some(token) = extract_cookie(headers, cookie_name).filter(|t| !t.is_empty()) {
        return Some(token);
    }

    let auth = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = auth.trim().split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then(|| token.to_string())
}

/// Parse a specific cookie value from the Cookie header.
pub fn extract_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    for header_value in headers.get_all(header::COOKIE) {
        if let Ok(cookie_str) = header_value.to_str() {
            for piece in cookie_str.split(';') {
                if let Ok(c) = Cookie::parse_encoded(piece.trim().to_string()) {
                    if c.name() == name {
                        return Some(c.value().to_string());
                    }
                }
            }
        }
    }
    None
}
