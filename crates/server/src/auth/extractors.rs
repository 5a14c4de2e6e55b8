use axum::{extract::FromRequestParts, http::request::Parts};
use shared_types::GatewayUser;

/// Extractor that optionally extracts the verified user. Never fails.
pub struct MaybeAuth(pub Option<GatewayUser>);

impl<S: Send + Sync> FromRequestParts<S> for MaybeAuth {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuth(parts.extensions.get::<GatewayUser>().cloned()))
    }
}
