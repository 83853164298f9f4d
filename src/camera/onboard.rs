//! 板载摄像头后端
//!
//! 支持分辨率、亮度和翻转。设备直接输出硬件编码的 JPEG 时原样透传。

use tracing::{debug, info, warn};

use super::convert::{encode_jpeg, to_rgb_image};
use super::device::{Control, PixelFormat, VideoDevice};
use super::{BackendKind, Camera, CameraError, CameraSettings, Frame};

pub struct OnboardCamera {
    device: Option<Box<dyn VideoDevice>>,
    /// 最近一次成功应用的参数
    applied: Option<CameraSettings>,
    jpeg_quality: u8,
}

impl OnboardCamera {
    pub fn new(device: Box<dyn VideoDevice>, jpeg_quality: u8) -> Self {
        info!("板载摄像头已打开: {}", device.name());
        Self {
            device: Some(device),
            applied: None,
            jpeg_quality,
        }
    }

    fn device_mut(&mut self) -> Result<&mut Box<dyn VideoDevice>, CameraError> {
        self.device
            .as_mut()
            .ok_or_else(|| CameraError::DeviceUnavailable("onboard camera is closed".into()))
    }
}

/// 设置控制项；设备缺少该控制项时只记录警告
fn apply_control(
    device: &mut Box<dyn VideoDevice>,
    control: Control,
    value: i32,
) -> Result<(), CameraError> {
    match device.set_control(control, value) {
        Err(CameraError::Unsupported(reason)) => {
            warn!("板载摄像头不支持 {:?}: {}", control, reason);
            Ok(())
        }
        other => other,
    }
}

impl Camera for OnboardCamera {
    fn kind(&self) -> BackendKind {
        BackendKind::Onboard
    }

    fn configure(&mut self, settings: &CameraSettings) -> Result<(), CameraError> {
        let previous = self.applied;
        let device = self.device_mut()?;

        if previous.map(|p| p.resolution) != Some(settings.resolution) {
            let (w, h) = settings.resolution.dimensions();
            let actual = device.set_format(w, h, PixelFormat::Mjpeg)?;
            debug!("板载摄像头分辨率: 请求 {}x{}, 实际 {}x{}", w, h, actual.0, actual.1);
        }
        if previous.map(|p| p.brightness) != Some(settings.brightness) {
            apply_control(device, Control::Brightness, i32::from(settings.brightness.min(100)))?;
        }
        if previous.map(|p| p.vflip) != Some(settings.vflip) {
            apply_control(device, Control::VerticalFlip, i32::from(settings.vflip))?;
        }
        if previous.map(|p| p.hflip) != Some(settings.hflip) {
            apply_control(device, Control::HorizontalFlip, i32::from(settings.hflip))?;
        }

        self.applied = Some(*settings);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let quality = self.jpeg_quality;
        let raw = self.device_mut()?.read_frame()?;

        if raw.format == PixelFormat::Mjpeg {
            return Ok(Frame::new(raw.width, raw.height, raw.data));
        }

        let image = to_rgb_image(&raw)?;
        let jpeg = encode_jpeg(&image, quality)?;
        Ok(Frame::new(image.width(), image.height(), jpeg))
    }

    fn close(&mut self) {
        if let Some(device) = self.device.take() {
            info!("板载摄像头已关闭: {}", device.name());
        }
        self.applied = None;
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }
}

impl Drop for OnboardCamera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::device::{DeviceProvider, DeviceTarget};
    use crate::camera::mock::MockProvider;
    use crate::camera::Resolution;
    use std::path::PathBuf;

    fn open(provider: &MockProvider) -> OnboardCamera {
        let device = provider
            .open(&DeviceTarget::Onboard {
                path: PathBuf::from("/dev/video0"),
            })
            .unwrap();
        OnboardCamera::new(device, 85)
    }

    #[test]
    fn test_configure_applies_all_controls() {
        let provider = MockProvider::new();
        let mut camera = open(&provider);
        let settings = CameraSettings {
            resolution: Resolution::Medium,
            brightness: 70,
            vflip: true,
            hflip: false,
        };
        camera.configure(&settings).unwrap();

        let stats = provider.stats();
        assert_eq!(stats.last_format(), Some((640, 480, PixelFormat::Mjpeg)));
        assert_eq!(stats.control(Control::Brightness), Some(70));
        assert_eq!(stats.control(Control::VerticalFlip), Some(1));
        assert_eq!(stats.control(Control::HorizontalFlip), Some(0));
    }

    #[test]
    fn test_configure_skips_unchanged_settings() {
        let provider = MockProvider::new();
        let mut camera = open(&provider);
        let settings = CameraSettings::default();
        camera.configure(&settings).unwrap();
        camera.configure(&settings).unwrap();
        assert_eq!(provider.stats().format_calls(), 1);

        camera
            .configure(&CameraSettings {
                resolution: Resolution::High,
                ..settings
            })
            .unwrap();
        assert_eq!(provider.stats().format_calls(), 2);
    }

    #[test]
    fn test_capture_passes_hardware_jpeg_through() {
        let provider = MockProvider::new();
        let mut camera = open(&provider);
        camera.configure(&CameraSettings::default()).unwrap();
        let frame = camera.capture_frame().unwrap();
        assert_eq!((frame.width, frame.height), (320, 240));
        assert_eq!(&frame.jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let provider = MockProvider::new();
        let mut camera = open(&provider);
        camera.close();
        camera.close();
        drop(camera);
        assert_eq!(provider.stats().releases(), 1);
    }

    #[test]
    fn test_capture_after_close_fails() {
        let provider = MockProvider::new();
        let mut camera = open(&provider);
        camera.close();
        assert!(camera.capture_frame().is_err());
        assert_eq!(provider.stats().captures(), 0);
    }
}
