//! 控制协议
//!
//! 浏览器通过 WebSocket 发送纯文本命令 (没有 JSON 封装)。
//! 命令只修改 `StreamConfig`，不直接操作摄像头；下一个 tick 才会生效。

use std::fmt;

use tracing::{debug, info, warn};

use crate::camera::{BackendKind, CameraSettings, Resolution};

/// 每次调整亮度的步长
pub const BRIGHTNESS_STEP: u8 = 5;

/// 亮度上限
pub const MAX_BRIGHTNESS: u8 = 100;

/// 控制命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `read_camera` / `start`：打开摄像头开始推流
    ReadCamera,
    MoreResolution,
    LessResolution,
    MoreBrightness,
    LessBrightness,
    /// 无法识别的命令
    Unsupported(String),
}

impl Command {
    /// 解析一条文本命令
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            "read_camera" | "start" => Command::ReadCamera,
            "more_resolution" => Command::MoreResolution,
            "less_resolution" => Command::LessResolution,
            "more_brightness" => Command::MoreBrightness,
            "less_brightness" => Command::LessBrightness,
            other => Command::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ReadCamera => f.write_str("read_camera"),
            Command::MoreResolution => f.write_str("more_resolution"),
            Command::LessResolution => f.write_str("less_resolution"),
            Command::MoreBrightness => f.write_str("more_brightness"),
            Command::LessBrightness => f.write_str("less_brightness"),
            Command::Unsupported(token) => write!(f, "{}", token),
        }
    }
}

/// 命令应用后的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// 请求开始推流，由推流循环处理
    StartRequested,
    Resolution(Resolution),
    Brightness(u8),
    /// 当前后端不支持，配置未变
    Ignored(BackendKind),
    Unsupported(String),
}

/// 单个连接的推流配置
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamConfig {
    pub backend: BackendKind,
    pub settings: CameraSettings,
}

impl StreamConfig {
    pub fn new(backend: BackendKind, settings: CameraSettings) -> Self {
        Self { backend, settings }
    }

    /// 应用一条命令
    pub fn apply(&mut self, command: &Command) -> Applied {
        match command {
            Command::ReadCamera => Applied::StartRequested,
            Command::MoreResolution => {
                self.settings.resolution = self.settings.resolution.step_up();
                info!("Resolution: {}", self.settings.resolution);
                Applied::Resolution(self.settings.resolution)
            }
            Command::LessResolution => {
                self.settings.resolution = self.settings.resolution.step_down();
                info!("Resolution: {}", self.settings.resolution);
                Applied::Resolution(self.settings.resolution)
            }
            Command::MoreBrightness | Command::LessBrightness
                if self.backend == BackendKind::Usb =>
            {
                debug!("USB 摄像头不支持亮度调整，忽略 {}", command);
                Applied::Ignored(self.backend)
            }
            Command::MoreBrightness => {
                self.settings.brightness = self
                    .settings
                    .brightness
                    .saturating_add(BRIGHTNESS_STEP)
                    .min(MAX_BRIGHTNESS);
                info!("Brightness: {}", self.settings.brightness);
                Applied::Brightness(self.settings.brightness)
            }
            Command::LessBrightness => {
                self.settings.brightness = self.settings.brightness.saturating_sub(BRIGHTNESS_STEP);
                info!("Brightness: {}", self.settings.brightness);
                Applied::Brightness(self.settings.brightness)
            }
            Command::Unsupported(token) => {
                warn!("Unsupported function: {}", token);
                Applied::Unsupported(token.clone())
            }
        }
    }
}
