//! 会话检查
//!
//! 需要登录时，`/` 和 `/websocket` 都经过同一个检查。

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use super::AppState;
use crate::security::SESSION_COOKIE;

/// cookie 是否有效；不需要登录时总是有效
pub fn has_session(state: &AppState, jar: &CookieJar) -> bool {
    if !state.security.require_login() {
        return true;
    }
    jar.get(SESSION_COOKIE)
        .map(|cookie| state.security.signer.verify(cookie.value()))
        .unwrap_or(false)
}

/// 没有有效会话时，页面跳转到登录页，WebSocket 返回 401
pub async fn require_session(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    if has_session(&state, &jar) {
        return next.run(request).await;
    }

    debug!("未登录请求: {}", request.uri().path());
    if request.uri().path() == "/websocket" {
        StatusCode::UNAUTHORIZED.into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}
