//! HTTP 路由处理

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{RawQuery, State};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::Form;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{pages, AppState};
use crate::security::{LOGIN_FAILURE_DELAY, SESSION_COOKIE};
use crate::stream::StreamSession;

/// 命令通道容量
const COMMAND_BUFFER: usize = 32;

/// 登录表单
#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub password: String,
}

/// GET /
pub async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    Html(pages::viewer_page(state.port))
}

/// GET /login
pub async fn login_page(State(state): State<Arc<AppState>>, RawQuery(query): RawQuery) -> Response {
    if !state.security.require_login() {
        return Redirect::to("/").into_response();
    }
    let error = query
        .as_deref()
        .map(|q| q.split('&').any(|p| p == "error" || p.starts_with("error=")))
        .unwrap_or(false);
    Html(pages::login_page(error)).into_response()
}

/// POST /login
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let Some(gate) = state.security.gate.as_ref() else {
        return Redirect::to("/").into_response();
    };

    if gate.verify(&form.password) {
        let token = state.security.signer.issue();
        info!("登录成功");
        let max_age = state.security.signer.max_age().as_secs() as i64;
        let cookie = Cookie::build((SESSION_COOKIE, token.value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(state.security.tls.is_some())
            .max_age(cookie::time::Duration::seconds(max_age))
            .build();
        (jar.add(cookie), Redirect::to("/")).into_response()
    } else {
        warn!("登录失败: 密码错误");
        tokio::time::sleep(LOGIN_FAILURE_DELAY).await;
        Redirect::to("/login?error").into_response()
    }
}

/// GET /websocket
pub async fn websocket(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    let peer = state.next_peer();
    ws.on_upgrade(move |socket| handle_socket(socket, state, peer))
}

/// 把 WebSocket 接到一个推流会话上
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, peer: String) {
    info!("客户端连接: {}", peer);

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (command_tx, command_rx) = mpsc::channel::<String>(COMMAND_BUFFER);
    let (frame_tx, mut frame_rx) = mpsc::channel::<String>(1);

    let session = StreamSession::new(
        peer.clone(),
        state.stream,
        state.provider.clone(),
        state.session.clone(),
    );
    let session_task = tokio::spawn(session.run(command_rx, frame_tx));

    // 发送任务：会话结束后发送 Close
    let send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.send(Message::Close(None)).await;
    });

    // 接收任务：退出时 command_tx 被丢弃，会话随之结束
    let recv_peer = peer.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    if command_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Ok(Message::Close(_)) => break,
                Err(e) => {
                    debug!("{} 接收错误: {}", recv_peer, e);
                    break;
                }
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => recv_task.abort(),
        _ = &mut recv_task => {}
    }

    match session_task.await {
        Ok(Ok(report)) => info!(
            "客户端断开: {} ({} 帧, 状态 {})",
            peer, report.frames_sent, report.final_state
        ),
        Ok(Err(e)) => warn!("会话 {} 因错误结束: {}", peer, e),
        Err(e) => error!("会话任务异常: {}: {}", peer, e),
    }
}
