//! 摄像头模块
//!
//! 提供两种摄像头后端 (板载 CSI 摄像头 / USB UVC 摄像头) 的统一抽象

pub mod convert;
pub mod device;
pub mod onboard;
pub mod test_pattern;
pub mod usb;

#[cfg(feature = "v4l2")]
pub mod v4l2;

#[cfg(test)]
pub(crate) mod mock;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use device::{DeviceProvider, DeviceTarget};

pub use onboard::OnboardCamera;
pub use usb::UsbCamera;

/// 摄像头错误
#[derive(Debug, Error)]
pub enum CameraError {
    /// 设备无法打开 (被占用或硬件不存在)
    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    /// 采集过程中读取失败
    #[error("frame capture failed: {0}")]
    Capture(String),

    /// 图像编码失败
    #[error("frame encoding failed: {0}")]
    Encode(String),

    /// 设备不支持该操作
    #[error("operation not supported by device: {0}")]
    Unsupported(String),
}

impl From<image::ImageError> for CameraError {
    fn from(e: image::ImageError) -> Self {
        CameraError::Encode(e.to_string())
    }
}

/// 分辨率档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resolution {
    Low,
    Medium,
    High,
}

impl Resolution {
    /// 从低到高排列的全部档位
    pub const ALL: [Resolution; 3] = [Resolution::Low, Resolution::Medium, Resolution::High];

    /// 档位对应的像素尺寸 (宽, 高)
    pub const fn dimensions(self) -> (u32, u32) {
        match self {
            Resolution::Low => (320, 240),
            Resolution::Medium => (640, 480),
            Resolution::High => (1280, 720),
        }
    }

    /// 提高一档，最高停留在 High
    pub fn step_up(self) -> Self {
        match self {
            Resolution::Low => Resolution::Medium,
            Resolution::Medium | Resolution::High => Resolution::High,
        }
    }

    /// 降低一档，最低停留在 Low
    pub fn step_down(self) -> Self {
        match self {
            Resolution::High => Resolution::Medium,
            Resolution::Medium | Resolution::Low => Resolution::Low,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Resolution::Low => "low",
            Resolution::Medium => "medium",
            Resolution::High => "high",
        }
    }
}

impl Default for Resolution {
    fn default() -> Self {
        Resolution::Low
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Resolution::Low),
            "medium" => Ok(Resolution::Medium),
            "high" => Ok(Resolution::High),
            other => Err(format!(
                "{} not in resolution options (high, medium, low)",
                other
            )),
        }
    }
}

/// 后端类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// 板载摄像头 (CSI)
    Onboard,
    /// USB 摄像头 (UVC)
    Usb,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Onboard => "onboard",
            BackendKind::Usb => "usb",
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Onboard
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "onboard" | "picamera" | "csi" => Ok(BackendKind::Onboard),
            "usb" | "uvc" => Ok(BackendKind::Usb),
            other => Err(format!("unknown camera backend: {}", other)),
        }
    }
}

/// 摄像头参数 (每个 tick 前重新应用)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CameraSettings {
    pub resolution: Resolution,
    /// 亮度 0..=100
    pub brightness: u8,
    pub vflip: bool,
    pub hflip: bool,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            resolution: Resolution::Low,
            brightness: 50,
            vflip: false,
            hflip: false,
        }
    }
}

/// 编码后的一帧 JPEG 图像
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, jpeg: Vec<u8>) -> Self {
        Frame { width, height, jpeg }
    }
}

/// 摄像头后端 trait
///
/// 推流循环只依赖这个接口，不关心具体是哪种后端
pub trait Camera: Send {
    /// 后端类型
    fn kind(&self) -> BackendKind;

    /// 应用参数；不支持的参数静默忽略
    fn configure(&mut self, settings: &CameraSettings) -> Result<(), CameraError>;

    /// 同步采集一帧并编码为 JPEG
    fn capture_frame(&mut self) -> Result<Frame, CameraError>;

    /// 释放设备。重复调用是空操作
    fn close(&mut self);

    /// 设备是否仍处于打开状态
    fn is_open(&self) -> bool;
}

/// 打开设备时使用的选项
#[derive(Debug, Clone)]
pub struct DeviceOptions {
    /// 板载摄像头设备节点
    pub onboard_device: PathBuf,
    /// USB 摄像头索引
    pub usb_index: usize,
    /// JPEG 质量 1..=100
    pub jpeg_quality: u8,
}

impl Default for DeviceOptions {
    fn default() -> Self {
        Self {
            onboard_device: PathBuf::from("/dev/video0"),
            usb_index: 0,
            jpeg_quality: 85,
        }
    }
}

/// 按后端类型打开摄像头
pub fn open_camera(
    kind: BackendKind,
    provider: &dyn DeviceProvider,
    options: &DeviceOptions,
) -> Result<Box<dyn Camera>, CameraError> {
    match kind {
        BackendKind::Onboard => {
            let target = DeviceTarget::Onboard {
                path: options.onboard_device.clone(),
            };
            let device = provider.open(&target)?;
            Ok(Box::new(OnboardCamera::new(device, options.jpeg_quality)))
        }
        BackendKind::Usb => {
            let target = DeviceTarget::Usb {
                index: options.usb_index,
            };
            let device = provider.open(&target)?;
            Ok(Box::new(UsbCamera::new(device, options.jpeg_quality)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::MockProvider;

    #[test]
    fn test_resolution_table() {
        assert_eq!(Resolution::Low.dimensions(), (320, 240));
        assert_eq!(Resolution::Medium.dimensions(), (640, 480));
        assert_eq!(Resolution::High.dimensions(), (1280, 720));
    }

    #[test]
    fn test_resolution_clamps_at_ends() {
        for start in Resolution::ALL {
            let mut r = start;
            for _ in 0..5 {
                r = r.step_up();
            }
            assert_eq!(r, Resolution::High);
            assert_eq!(r.step_up(), Resolution::High);

            let mut r = start;
            for _ in 0..5 {
                r = r.step_down();
            }
            assert_eq!(r, Resolution::Low);
            assert_eq!(r.step_down(), Resolution::Low);
        }
    }

    #[test]
    fn test_resolution_steps_are_ordered() {
        assert_eq!(Resolution::Low.step_up(), Resolution::Medium);
        assert_eq!(Resolution::Medium.step_up(), Resolution::High);
        assert_eq!(Resolution::High.step_down(), Resolution::Medium);
        assert_eq!(Resolution::Medium.step_down(), Resolution::Low);
    }

    #[test]
    fn test_resolution_from_str() {
        assert_eq!("high".parse::<Resolution>().unwrap(), Resolution::High);
        assert_eq!(" Medium ".parse::<Resolution>().unwrap(), Resolution::Medium);
        assert!("ultra".parse::<Resolution>().is_err());
    }

    #[test]
    fn test_backend_kind_from_str() {
        assert_eq!("usb".parse::<BackendKind>().unwrap(), BackendKind::Usb);
        assert_eq!("onboard".parse::<BackendKind>().unwrap(), BackendKind::Onboard);
        assert!("firewire".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_open_camera_selects_backend() {
        let provider = MockProvider::new();
        let options = DeviceOptions::default();

        let camera = open_camera(BackendKind::Usb, &provider, &options).unwrap();
        assert_eq!(camera.kind(), BackendKind::Usb);
        assert!(camera.is_open());

        let camera = open_camera(BackendKind::Onboard, &provider, &options).unwrap();
        assert_eq!(camera.kind(), BackendKind::Onboard);
        assert_eq!(provider.stats().opens(), 2);
    }

    #[test]
    fn test_open_camera_device_unavailable() {
        let provider = MockProvider::new().fail_open();
        let result = open_camera(BackendKind::Usb, &provider, &DeviceOptions::default());
        assert!(matches!(result, Err(CameraError::DeviceUnavailable(_))));
    }
}
