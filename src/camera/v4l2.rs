//! V4L2 设备驱动
//!
//! 板载摄像头 (bcm2835 / unicam) 和 UVC 摄像头在 Linux 上都以 V4L2 设备出现，
//! 区别只在打开的节点和请求的像素格式。

use std::io;

use tracing::{debug, warn};
use v4l::buffer::Type;
use v4l::control::{self, Description};
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::device::{Control, DeviceProvider, DeviceTarget, PixelFormat, RawFrame, VideoDevice};
use super::CameraError;

const V4L2_CID_BRIGHTNESS: u32 = 0x0098_0900;
const V4L2_CID_HFLIP: u32 = 0x0098_0914;
const V4L2_CID_VFLIP: u32 = 0x0098_0915;

const BUFFER_COUNT: u32 = 4;

/// V4L2 设备提供者
#[derive(Debug, Clone, Default)]
pub struct V4l2Provider;

impl V4l2Provider {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceProvider for V4l2Provider {
    fn open(&self, target: &DeviceTarget) -> Result<Box<dyn VideoDevice>, CameraError> {
        let device = match target {
            DeviceTarget::Onboard { path } => Device::with_path(path),
            DeviceTarget::Usb { index } => Device::new(*index),
        }
        .map_err(|e| unavailable(target, e))?;

        let controls = device.query_controls().unwrap_or_else(|e| {
            warn!("查询控制项失败 {}: {}", target, e);
            Vec::new()
        });

        Ok(Box::new(V4l2Device {
            name: target.to_string(),
            device,
            controls,
            stream: None,
            format: None,
        }))
    }
}

fn unavailable(target: &DeviceTarget, e: io::Error) -> CameraError {
    CameraError::DeviceUnavailable(format!("{}: {}", target, e))
}

/// Linux EBUSY
const EBUSY: i32 = 16;

/// 设备节点能打开但被其他进程占用时，S_FMT / REQBUFS 返回 EBUSY
fn busy_or_capture(what: &str, e: io::Error) -> CameraError {
    if e.raw_os_error() == Some(EBUSY) {
        CameraError::DeviceUnavailable(format!("{}: {}", what, e))
    } else {
        CameraError::Capture(format!("{}: {}", what, e))
    }
}

/// 已打开的 V4L2 设备
pub struct V4l2Device {
    name: String,
    device: Device,
    controls: Vec<Description>,
    stream: Option<Stream<'static>>,
    format: Option<(u32, u32, PixelFormat)>,
}

impl V4l2Device {
    fn control_id(control: Control) -> u32 {
        match control {
            Control::Brightness => V4L2_CID_BRIGHTNESS,
            Control::VerticalFlip => V4L2_CID_VFLIP,
            Control::HorizontalFlip => V4L2_CID_HFLIP,
        }
    }

    fn stream(&mut self) -> Result<&mut Stream<'static>, CameraError> {
        if self.stream.is_none() {
            let stream = Stream::with_buffers(&self.device, Type::VideoCapture, BUFFER_COUNT)
                .map_err(|e| busy_or_capture("start streaming", e))?;
            self.stream = Some(stream);
        }
        self.stream
            .as_mut()
            .ok_or_else(|| CameraError::Capture("stream not started".into()))
    }
}

fn fourcc_of(format: PixelFormat) -> FourCC {
    match format {
        PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
        PixelFormat::Yuyv => FourCC::new(b"YUYV"),
        PixelFormat::Bgr24 => FourCC::new(b"BGR3"),
        PixelFormat::Rgb24 => FourCC::new(b"RGB3"),
    }
}

fn format_of(fourcc: FourCC) -> Option<PixelFormat> {
    match &fourcc.repr {
        b"MJPG" | b"JPEG" => Some(PixelFormat::Mjpeg),
        b"YUYV" => Some(PixelFormat::Yuyv),
        b"BGR3" => Some(PixelFormat::Bgr24),
        b"RGB3" => Some(PixelFormat::Rgb24),
        _ => None,
    }
}

/// 把 0..=100 的亮度映射到设备控制项的取值范围
fn scale_percent(value: i32, desc: &Description) -> i64 {
    let value = value.clamp(0, 100) as i64;
    desc.minimum + (desc.maximum - desc.minimum) * value / 100
}

impl VideoDevice for V4l2Device {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_format(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(u32, u32), CameraError> {
        // 流运行时不能改格式
        self.stream = None;

        let mut fmt = self
            .device
            .format()
            .map_err(|e| CameraError::Capture(format!("read format: {}", e)))?;
        fmt.width = width;
        fmt.height = height;
        fmt.fourcc = fourcc_of(format);

        let actual = self
            .device
            .set_format(&fmt)
            .map_err(|e| busy_or_capture("set format", e))?;
        let pixel_format = format_of(actual.fourcc).ok_or_else(|| {
            CameraError::Unsupported(format!("{} negotiated {}", self.name, actual.fourcc))
        })?;

        debug!(
            "{}: 格式 {}x{} {}",
            self.name, actual.width, actual.height, actual.fourcc
        );
        self.format = Some((actual.width, actual.height, pixel_format));
        Ok((actual.width, actual.height))
    }

    fn set_control(&mut self, control: Control, value: i32) -> Result<(), CameraError> {
        let id = Self::control_id(control);
        let desc = self
            .controls
            .iter()
            .find(|d| d.id == id)
            .ok_or_else(|| CameraError::Unsupported(format!("{}: {:?}", self.name, control)))?;

        let value = match (control, desc.typ) {
            (_, control::Type::Boolean) => control::Value::Boolean(value != 0),
            (Control::Brightness, _) => control::Value::Integer(scale_percent(value, desc)),
            _ => control::Value::Integer(i64::from(value != 0)),
        };

        self.device
            .set_control(control::Control { id, value })
            .map_err(|e| CameraError::Capture(format!("set {:?}: {}", control, e)))
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        let (width, height, format) = match self.format {
            Some(f) => f,
            None => {
                let fmt = self
                    .device
                    .format()
                    .map_err(|e| CameraError::Capture(format!("read format: {}", e)))?;
                let pf = format_of(fmt.fourcc).ok_or_else(|| {
                    CameraError::Unsupported(format!("{} uses {}", self.name, fmt.fourcc))
                })?;
                self.format = Some((fmt.width, fmt.height, pf));
                (fmt.width, fmt.height, pf)
            }
        };

        let stream = self.stream()?;
        let (buf, meta) = stream
            .next()
            .map_err(|e| CameraError::Capture(format!("dequeue buffer: {}", e)))?;
        let used = (meta.bytesused as usize).min(buf.len());
        let data = if used > 0 { buf[..used].to_vec() } else { buf.to_vec() };

        Ok(RawFrame {
            width,
            height,
            format,
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_device_is_unavailable() {
        let busy = busy_or_capture("set format", io::Error::from_raw_os_error(EBUSY));
        assert!(matches!(busy, CameraError::DeviceUnavailable(_)));

        let other = busy_or_capture("set format", io::Error::from_raw_os_error(5));
        assert!(matches!(other, CameraError::Capture(_)));
    }
}
