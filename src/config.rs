//! 配置管理模块
//!
//! 负责加载和管理应用程序配置。文件里的值是原始值，
//! `Config::validate` 把它们转换成服务启动需要的运行参数。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use thiserror::Error;

use crate::camera::{BackendKind, CameraSettings, DeviceOptions, Resolution};
use crate::protocol::{StreamConfig, MAX_BRIGHTNESS};
use crate::security::TlsConfig;

/// 配置文件名
pub const CONFIG_FILE_NAME: &str = "camp.toml";

/// 系统配置目录
pub const SYSTEM_CONFIG_DIR: &str = "/etc/camp";

/// 会话 cookie 最长有效期 (天)
pub const MAX_COOKIE_AGE_DAYS: u64 = 3650;

/// 配置错误，只在启动时出现
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} not in resolution options (high, medium, low)")]
    InvalidResolution(String),

    #[error("brightness {0} out of range (0-100)")]
    InvalidBrightness(u32),

    #[error("unknown camera backend: {0}")]
    InvalidBackend(String),

    #[error("unknown device source: {0} (v4l2, test-pattern)")]
    InvalidSource(String),

    #[error("cookie max age {0} days out of range (0-3650)")]
    InvalidCookieMaxAge(u64),

    #[error("login required but password file {0} is missing; run `camp password` first")]
    MissingPassword(PathBuf),

    #[error("TLS requested but camp was built without the `security` feature")]
    TlsUnavailable,

    #[error("device source v4l2 requires the `v4l2` feature")]
    V4l2Unavailable,
}

/// 应用程序配置
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// 监听地址
    #[serde(default = "default_bind")]
    pub bind: String,
    /// 监听端口
    #[serde(default = "default_port")]
    pub port: u16,
    /// 静态文件目录
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
    /// 推流 tick 周期 (毫秒)
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,
}

/// 安全配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SecurityConfig {
    /// 是否需要登录
    #[serde(default)]
    pub require_login: bool,
    /// 密码摘要文件
    #[serde(default = "default_password_file")]
    pub password_file: PathBuf,
    /// 是否启用 TLS
    #[serde(default)]
    pub use_ssl: bool,
    /// TLS 证书 (PEM)
    #[serde(default = "default_cert_file")]
    pub cert_file: PathBuf,
    /// TLS 私钥 (PEM)
    #[serde(default = "default_key_file")]
    pub key_file: PathBuf,
    /// 会话 cookie 有效期 (天)
    #[serde(default = "default_cookie_days")]
    pub cookie_max_age_days: u64,
}

/// 摄像头配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CameraConfig {
    /// 后端: onboard / usb
    #[serde(default = "default_backend")]
    pub backend: String,
    /// 设备来源: v4l2 / test-pattern
    #[serde(default = "default_source")]
    pub source: String,
    /// 初始分辨率: low / medium / high
    #[serde(default = "default_resolution")]
    pub resolution: String,
    /// 初始亮度 0-100 (仅板载摄像头)
    #[serde(default = "default_brightness")]
    pub brightness: u32,
    #[serde(default)]
    pub vflip: bool,
    #[serde(default)]
    pub hflip: bool,
    /// 板载摄像头设备节点
    #[serde(default = "default_onboard_device")]
    pub onboard_device: PathBuf,
    /// USB 摄像头索引
    #[serde(default)]
    pub usb_index: usize,
    /// JPEG 质量 1-100
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
}

/// 日志配置
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// 日志级别: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind: default_bind(),
            port: default_port(),
            static_dir: default_static_dir(),
            tick_interval_ms: default_tick_ms(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        SecurityConfig {
            require_login: false,
            password_file: default_password_file(),
            use_ssl: false,
            cert_file: default_cert_file(),
            key_file: default_key_file(),
            cookie_max_age_days: default_cookie_days(),
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        CameraConfig {
            backend: default_backend(),
            source: default_source(),
            resolution: default_resolution(),
            brightness: default_brightness(),
            vflip: false,
            hflip: false,
            onboard_device: default_onboard_device(),
            usb_index: 0,
            jpeg_quality: default_jpeg_quality(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_log_level(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("static")
}

fn default_tick_ms() -> u64 {
    10
}

fn default_password_file() -> PathBuf {
    Path::new(SYSTEM_CONFIG_DIR).join("camp_password.txt")
}

fn default_cert_file() -> PathBuf {
    Path::new(SYSTEM_CONFIG_DIR).join("cert.crt")
}

fn default_key_file() -> PathBuf {
    Path::new(SYSTEM_CONFIG_DIR).join("cert.key")
}

fn default_cookie_days() -> u64 {
    31
}

fn default_backend() -> String {
    "onboard".to_string()
}

fn default_source() -> String {
    if cfg!(feature = "v4l2") {
        "v4l2".to_string()
    } else {
        "test-pattern".to_string()
    }
}

fn default_resolution() -> String {
    "low".to_string()
}

fn default_brightness() -> u32 {
    50
}

fn default_onboard_device() -> PathBuf {
    PathBuf::from("/dev/video0")
}

fn default_jpeg_quality() -> u8 {
    85
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 设备来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSource {
    V4l2,
    TestPattern,
}

impl std::str::FromStr for DeviceSource {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v4l2" => Ok(DeviceSource::V4l2),
            "test-pattern" | "test_pattern" | "testpattern" => Ok(DeviceSource::TestPattern),
            other => Err(ConfigError::InvalidSource(other.to_string())),
        }
    }
}

/// 校验后的运行参数
#[derive(Debug, Clone)]
pub struct ServeSettings {
    pub bind: String,
    pub port: u16,
    pub static_dir: PathBuf,
    pub tick_interval: Duration,
    /// 需要登录时的密码文件
    pub password_file: Option<PathBuf>,
    pub tls: Option<TlsConfig>,
    pub cookie_max_age: Duration,
    /// 每个连接的初始推流配置
    pub stream: StreamConfig,
    pub source: DeviceSource,
    pub device: DeviceOptions,
}

impl Config {
    /// 从文件加载配置
    ///
    /// 文件不存在时返回默认配置
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("配置文件解析失败: {}", e))?;

        Ok(config)
    }

    /// 保存配置到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)
            .with_context(|| format!("写入配置文件失败: {}", path.display()))?;
        Ok(())
    }

    /// 获取配置文件路径
    ///
    /// 优先级: 命令行指定 > 当前目录 > /etc/camp
    pub fn get_config_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }

        let local = PathBuf::from(CONFIG_FILE_NAME);
        if local.exists() {
            return local;
        }

        let system = Path::new(SYSTEM_CONFIG_DIR).join(CONFIG_FILE_NAME);
        if system.exists() {
            return system;
        }

        local
    }

    /// 校验并生成运行参数
    pub fn validate(&self) -> Result<ServeSettings, ConfigError> {
        let resolution: Resolution = self
            .camera
            .resolution
            .parse()
            .map_err(|_| ConfigError::InvalidResolution(self.camera.resolution.clone()))?;

        if self.camera.brightness > u32::from(MAX_BRIGHTNESS) {
            return Err(ConfigError::InvalidBrightness(self.camera.brightness));
        }
        let brightness = self.camera.brightness as u8;

        let backend: BackendKind = self
            .camera
            .backend
            .parse()
            .map_err(|_| ConfigError::InvalidBackend(self.camera.backend.clone()))?;

        let source: DeviceSource = self.camera.source.parse()?;
        if source == DeviceSource::V4l2 && !cfg!(feature = "v4l2") {
            return Err(ConfigError::V4l2Unavailable);
        }

        let password_file = if self.security.require_login {
            let path = &self.security.password_file;
            if !path.is_file() {
                return Err(ConfigError::MissingPassword(path.clone()));
            }
            Some(path.clone())
        } else {
            None
        };

        let tls = if self.security.use_ssl {
            if !cfg!(feature = "security") {
                return Err(ConfigError::TlsUnavailable);
            }
            Some(TlsConfig::new(
                self.security.cert_file.clone(),
                self.security.key_file.clone(),
            ))
        } else {
            None
        };

        let days = self.security.cookie_max_age_days;
        if days > MAX_COOKIE_AGE_DAYS {
            return Err(ConfigError::InvalidCookieMaxAge(days));
        }
        let cookie_max_age = Duration::from_secs(days * 24 * 60 * 60);

        let settings = CameraSettings {
            resolution,
            brightness,
            vflip: self.camera.vflip,
            hflip: self.camera.hflip,
        };

        Ok(ServeSettings {
            bind: self.server.bind.clone(),
            port: self.server.port,
            static_dir: self.server.static_dir.clone(),
            tick_interval: Duration::from_millis(self.server.tick_interval_ms.max(1)),
            password_file,
            tls,
            cookie_max_age,
            stream: StreamConfig::new(backend, settings),
            source,
            device: DeviceOptions {
                onboard_device: self.camera.onboard_device.clone(),
                usb_index: self.camera.usb_index,
                jpeg_quality: self.camera.jpeg_quality.clamp(1, 100),
            },
        })
    }
}
