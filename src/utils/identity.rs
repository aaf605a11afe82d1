// src/utils/identity.rs

use axum::{
    body::Body,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};

/// The authenticated caller, as asserted by the upstream gateway.
///
/// Token verification happens before requests reach this service; the
/// gateway forwards the resolved user id in the `X-User-Id` header. Every
/// core operation still re-checks resource ownership against this id.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: i64,
}

/// Axum Middleware: Identity.
///
/// Intercepts requests, reads the 'X-User-Id' header injected by the
/// gateway. If present, injects `Identity` into the request extensions for
/// handlers to use. If missing or unparsable, returns 401 Unauthorized.
pub async fn identity_middleware(
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let user_id = req
        .headers()
        .get("x-user-id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<i64>().ok());

    match user_id {
        Some(user_id) => {
            req.extensions_mut().insert(Identity { user_id });
            Ok(next.run(req).await)
        }
        None => Err(StatusCode::UNAUTHORIZED),
    }
}
