use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use tracing::debug;

use crate::auth::AuthError;
use crate::server::error::ApiError;
use crate::server::handlers::bearer_token;
use crate::server::types::AppState;

/// Rejects requests without a valid ID token when the server requires
/// sign-in. The resolved [`crate::auth::CurrentUser`] is stored in the request
/// extensions.
pub async fn require_user(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.require_auth {
        return Ok(next.run(request).await);
    }

    let identity = state
        .identity
        .as_ref()
        .ok_or_else(|| ApiError::from(AuthError::NotConfigured))?;
    let token = bearer_token(request.headers())
        .ok_or_else(|| ApiError::Unauthorized("Missing bearer token".to_string()))?
        .to_string();

    let user = identity.lookup(&token).await?;
    debug!(uid = %user.uid, path = %request.uri().path(), "authenticated request");
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}
