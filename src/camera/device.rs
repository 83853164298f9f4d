//! 设备层抽象
//!
//! `VideoDevice` 是对单个视频设备的原始操作 (协商格式、设置控制项、读一帧)。
//! 设备在 drop 时释放。

use std::fmt;
use std::path::PathBuf;

use super::CameraError;

/// 原始像素格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// 硬件编码的 JPEG
    Mjpeg,
    /// YUYV 4:2:2 packed
    Yuyv,
    /// 每像素 3 字节，B G R 顺序
    Bgr24,
    /// 每像素 3 字节，R G B 顺序
    Rgb24,
}

/// 设备控制项
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// 亮度，取值 0..=100
    Brightness,
    /// 垂直翻转，取值 0/1
    VerticalFlip,
    /// 水平翻转，取值 0/1
    HorizontalFlip,
}

/// 设备读出的一帧原始数据
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

/// 打开目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceTarget {
    /// 板载摄像头设备节点
    Onboard { path: PathBuf },
    /// USB 摄像头索引 (/dev/video{index})
    Usb { index: usize },
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTarget::Onboard { path } => write!(f, "onboard:{}", path.display()),
            DeviceTarget::Usb { index } => write!(f, "usb:{}", index),
        }
    }
}

/// 视频设备 trait
pub trait VideoDevice: Send {
    /// 设备描述，用于日志
    fn name(&self) -> &str;

    /// 协商分辨率和像素格式，返回设备实际采用的尺寸
    fn set_format(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(u32, u32), CameraError>;

    /// 设置控制项
    fn set_control(&mut self, control: Control, value: i32) -> Result<(), CameraError>;

    /// 阻塞读取一帧
    fn read_frame(&mut self) -> Result<RawFrame, CameraError>;
}

/// 设备提供者：负责打开具体的视频设备
pub trait DeviceProvider: Send + Sync {
    fn open(&self, target: &DeviceTarget) -> Result<Box<dyn VideoDevice>, CameraError>;
}
