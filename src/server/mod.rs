//! HTTP / WebSocket 服务
//!
//! 路由:
//! - `GET /` 查看器页面 (需要会话)
//! - `GET|POST /login` 登录
//! - `GET /websocket` 推流连接 (需要会话)
//! - `/static/*` 静态文件

pub mod guard;
pub mod pages;
pub mod routes;

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::routing::get;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::camera::device::DeviceProvider;
use crate::protocol::StreamConfig;
use crate::security::{SecurityConfig, TlsConfig};
use crate::stream::SessionOptions;

/// 所有连接共享的只读状态
pub struct AppState {
    pub security: SecurityConfig,
    /// 每个连接的初始推流配置
    pub stream: StreamConfig,
    pub provider: Arc<dyn DeviceProvider>,
    pub session: SessionOptions,
    /// 查看器页面里使用的端口
    pub port: u16,
    next_peer: AtomicU64,
}

impl AppState {
    pub fn new(
        security: SecurityConfig,
        stream: StreamConfig,
        provider: Arc<dyn DeviceProvider>,
        session: SessionOptions,
        port: u16,
    ) -> Self {
        Self {
            security,
            stream,
            provider,
            session,
            port,
            next_peer: AtomicU64::new(1),
        }
    }

    /// 连接编号，用于日志
    pub fn next_peer(&self) -> String {
        format!("viewer_{}", self.next_peer.fetch_add(1, Ordering::Relaxed))
    }
}

/// 创建路由
pub fn router(state: Arc<AppState>, static_dir: &Path) -> Router {
    let guarded = Router::new()
        .route("/", get(routes::index))
        .route("/websocket", get(routes::websocket))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            guard::require_session,
        ));

    Router::new()
        .merge(guarded)
        .route("/login", get(routes::login_page).post(routes::login))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 运行服务直到 Ctrl-C
pub async fn serve(listener: TcpListener, app: Router, tls: Option<TlsConfig>) -> Result<()> {
    let addr = listener.local_addr()?;

    match tls {
        None => {
            info!("服务启动: http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await
                .context("HTTP 服务异常退出")?;
        }
        #[cfg(feature = "security")]
        Some(tls) => {
            info!("服务启动: https://{}", addr);
            serve_tls(listener, app, tls).await?;
        }
        #[cfg(not(feature = "security"))]
        Some(_) => {
            return Err(crate::config::ConfigError::TlsUnavailable.into());
        }
    }

    info!("服务已停止");
    Ok(())
}

#[cfg(feature = "security")]
async fn serve_tls(listener: TcpListener, app: Router, tls: TlsConfig) -> Result<()> {
    use hyper_util::rt::{TokioExecutor, TokioIo};
    use hyper_util::server::conn::auto::Builder;
    use hyper_util::service::TowerToHyperService;
    use tracing::debug;

    let acceptor = tls.create_acceptor()?;
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok(conn) => conn,
                Err(e) => {
                    error!("接受连接失败: {}", e);
                    continue;
                }
            },
            _ = &mut shutdown => break,
        };

        let acceptor = acceptor.clone();
        let app = app.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(e) => {
                    debug!("TLS 握手失败 {}: {}", addr, e);
                    return;
                }
            };
            let service = TowerToHyperService::new(app);
            if let Err(e) = Builder::new(TokioExecutor::new())
                .serve_connection_with_upgrades(TokioIo::new(tls_stream), service)
                .await
            {
                debug!("连接结束 {}: {}", addr, e);
            }
        });
    }

    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("收到退出信号"),
        Err(e) => {
            error!("无法监听 Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
