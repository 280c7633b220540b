//! Caller identity handed over by the upstream authentication gateway.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use classhub_shared::constants::CALLER_HEADER;
use classhub_shared::UserId;

use crate::error::ServerError;

/// The authenticated, already-authorized caller of a request.
#[derive(Debug, Clone)]
pub struct Caller(pub UserId);

#[async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(CALLER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ServerError::Unauthorized)?;

        UserId::parse(raw)
            .map(Caller)
            .map_err(|_| ServerError::Unauthorized)
    }
}
