use crate::auth::jwt::JwtService;
use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use cofile_core::AppError;
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: JwtService,
}

/// Resolve the bearer token into a [`Caller`](crate::auth::Caller) extension.
pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim);

    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return HttpAppError(AppError::Unauthorized(
            "Missing or malformed authorization header".to_string(),
        ))
        .into_response();
    };

    match auth_state.jwt.verify_token(token) {
        Ok(caller) => {
            tracing::debug!(user_id = %caller.user_id, role = %caller.role, "Request authenticated");
            request.extensions_mut().insert(caller);
            next.run(request).await
        }
        Err(e) => HttpAppError(e).into_response(),
    }
}
