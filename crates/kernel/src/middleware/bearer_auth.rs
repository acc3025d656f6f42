//! Bearer token authentication middleware.
//!
//! Checks `Authorization: Bearer <token>` headers, verifies the JWT and
//! stores the resulting [`Caller`] in request extensions.

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::models::Caller;
use crate::state::AppState;

/// Middleware to authenticate Bearer JWT tokens.
///
/// If a valid Bearer token is present, sets the caller in request
/// extensions. If no token is present, passes through without modification
/// and handlers that extract [`Caller`] answer 401. If an invalid token is
/// present, returns 401.
pub async fn authenticate_bearer_token(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let Some(auth_header) = auth_header else {
        return next.run(request).await;
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return next.run(request).await;
    };

    let caller = match state.tokens().verify(token) {
        Ok(caller) => caller,
        Err(e) => {
            debug!(error = %e, "invalid bearer token");
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, "Bearer error=\"invalid_token\"")],
                "Invalid token",
            )
                .into_response();
        }
    };

    debug!(caller = %caller.id, role = %caller.role, "authenticated bearer token");
    request.extensions_mut().insert::<Caller>(caller);

    next.run(request).await
}
