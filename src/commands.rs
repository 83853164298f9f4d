//! Command handlers for camp
//!
//! 日志初始化、子命令处理和服务启动。

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::camera::device::DeviceProvider;
use crate::camera::test_pattern::TestPatternProvider;
use crate::cli::Args;
use crate::config::{Config, DeviceSource, ServeSettings, SYSTEM_CONFIG_DIR};
use crate::security::{write_password_file, PasswordGate, SecurityConfig};
use crate::server::{self, AppState};
use crate::stream::SessionOptions;

/// 日志过滤规则: RUST_LOG > -v > 配置文件
pub fn log_filter(verbose: Option<u8>, config_level: &str) -> String {
    match verbose {
        Some(0) => "warn".to_string(),
        Some(1) => "info".to_string(),
        Some(2) => "debug".to_string(),
        Some(_) => "trace".to_string(),
        None => config_level.to_string(),
    }
}

/// Initialize logging with the specified verbosity level
pub fn init_logging(verbose: Option<u8>, config_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_filter(verbose, config_level)))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_env_filter(filter)
        .init();
}

/// 命令行参数覆盖配置文件
pub fn apply_cli_overrides(config: &mut Config, args: &Args) {
    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(ref resolution) = args.resolution {
        config.camera.resolution = resolution.clone();
    }
    if let Some(brightness) = args.brightness {
        config.camera.brightness = brightness;
    }
    if args.require_login {
        config.security.require_login = true;
    }
    if args.use_usb {
        config.camera.backend = "usb".to_string();
    }
    if args.vflip {
        config.camera.vflip = true;
    }
    if args.hflip {
        config.camera.hflip = true;
    }
    if args.use_ssl {
        config.security.use_ssl = true;
    }
    if args.test_pattern {
        config.camera.source = "test-pattern".to_string();
    }
}

/// Handle password command
pub fn handle_password(path: Option<PathBuf>) -> Result<()> {
    let path = path.unwrap_or_else(|| Path::new(SYSTEM_CONFIG_DIR).join("camp_password.txt"));

    let password = loop {
        let first = rpassword::prompt_password("输入密码: ").context("读取密码失败")?;
        let second = rpassword::prompt_password("再次输入: ").context("读取密码失败")?;
        if first.is_empty() {
            println!("密码不能为空");
        } else if first != second {
            println!("两次输入不一致，请重试");
        } else {
            break first;
        }
    };

    write_password_file(&path, &password)?;
    println!("密码已保存到: {}", path.display());
    Ok(())
}

/// Handle config command
pub fn handle_config(path: Option<PathBuf>) -> Result<()> {
    let config = Config::default();
    let path = Config::get_config_path(path.as_deref());

    config.save(&path)?;
    println!("配置文件已生成: {}", path.display());
    Ok(())
}

/// 选择设备提供者
pub fn device_provider(source: DeviceSource) -> Result<Arc<dyn DeviceProvider>> {
    match source {
        DeviceSource::TestPattern => Ok(Arc::new(TestPatternProvider::new())),
        #[cfg(feature = "v4l2")]
        DeviceSource::V4l2 => Ok(Arc::new(crate::camera::v4l2::V4l2Provider::new())),
        #[cfg(not(feature = "v4l2"))]
        DeviceSource::V4l2 => Err(crate::config::ConfigError::V4l2Unavailable.into()),
    }
}

/// 根据运行参数构建共享状态
pub fn build_state(settings: &ServeSettings) -> Result<Arc<AppState>> {
    let mut security = match settings.password_file {
        Some(ref path) => {
            let gate = PasswordGate::load(path)?;
            info!("需要登录，密码文件: {}", path.display());
            SecurityConfig::with_password(gate, settings.cookie_max_age)
        }
        None => SecurityConfig::open(settings.cookie_max_age),
    };
    if let Some(ref tls) = settings.tls {
        tls.validate()?;
        security = security.with_tls(tls.clone());
    }

    let provider = device_provider(settings.source)?;
    let session = SessionOptions {
        tick_interval: settings.tick_interval,
        device: settings.device.clone(),
    };

    Ok(Arc::new(AppState::new(
        security,
        settings.stream,
        provider,
        session,
        settings.port,
    )))
}

/// 启动服务
pub async fn serve(settings: ServeSettings) -> Result<()> {
    info!(
        backend = %settings.stream.backend,
        resolution = %settings.stream.settings.resolution,
        brightness = settings.stream.settings.brightness,
        source = ?settings.source,
        "摄像头配置"
    );
    if settings.source == DeviceSource::TestPattern {
        warn!("使用测试图案，不会打开真实摄像头");
    }

    let state = build_state(&settings)?;
    let app = server::router(state, &settings.static_dir);

    let addr = format!("{}:{}", settings.bind, settings.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("监听 {} 失败", addr))?;

    server::serve(listener, app, settings.tls).await
}
