//! USB 摄像头后端
//!
//! 只支持分辨率。读出原始帧后转换为 RGB 再编码成 JPEG，
//! 保证下游传输与板载后端一致。

use tracing::{debug, info};

use super::convert::{encode_jpeg, to_rgb_image};
use super::device::{PixelFormat, VideoDevice};
use super::{BackendKind, Camera, CameraError, CameraSettings, Frame, Resolution};

pub struct UsbCamera {
    device: Option<Box<dyn VideoDevice>>,
    applied: Option<Resolution>,
    jpeg_quality: u8,
    warned_unsupported: bool,
}

impl UsbCamera {
    pub fn new(device: Box<dyn VideoDevice>, jpeg_quality: u8) -> Self {
        info!("USB 摄像头已打开: {}", device.name());
        Self {
            device: Some(device),
            applied: None,
            jpeg_quality,
            warned_unsupported: false,
        }
    }

    fn device_mut(&mut self) -> Result<&mut Box<dyn VideoDevice>, CameraError> {
        self.device
            .as_mut()
            .ok_or_else(|| CameraError::DeviceUnavailable("usb camera is closed".into()))
    }
}

impl Camera for UsbCamera {
    fn kind(&self) -> BackendKind {
        BackendKind::Usb
    }

    fn configure(&mut self, settings: &CameraSettings) -> Result<(), CameraError> {
        if (settings.vflip || settings.hflip) && !self.warned_unsupported {
            debug!("USB 摄像头不支持翻转，已忽略");
            self.warned_unsupported = true;
        }

        if self.applied == Some(settings.resolution) {
            return Ok(());
        }

        let (w, h) = settings.resolution.dimensions();
        let actual = self.device_mut()?.set_format(w, h, PixelFormat::Yuyv)?;
        debug!("USB 摄像头分辨率: 请求 {}x{}, 实际 {}x{}", w, h, actual.0, actual.1);
        self.applied = Some(settings.resolution);
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<Frame, CameraError> {
        let quality = self.jpeg_quality;
        let raw = self.device_mut()?.read_frame()?;
        let image = to_rgb_image(&raw)?;
        let jpeg = encode_jpeg(&image, quality)?;
        Ok(Frame::new(image.width(), image.height(), jpeg))
    }

    fn close(&mut self) {
        if let Some(device) = self.device.take() {
            info!("USB 摄像头已释放: {}", device.name());
        }
        self.applied = None;
    }

    fn is_open(&self) -> bool {
        self.device.is_some()
    }
}

impl Drop for UsbCamera {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::device::{Control, DeviceProvider, DeviceTarget};
    use crate::camera::mock::MockProvider;

    fn open(provider: &MockProvider) -> UsbCamera {
        let device = provider.open(&DeviceTarget::Usb { index: 0 }).unwrap();
        UsbCamera::new(device, 85)
    }

    #[test]
    fn test_configure_sets_only_resolution() {
        let provider = MockProvider::new();
        let mut camera = open(&provider);
        let settings = CameraSettings {
            resolution: Resolution::High,
            brightness: 5,
            vflip: true,
            hflip: true,
        };
        camera.configure(&settings).unwrap();

        let stats = provider.stats();
        assert_eq!(stats.last_format(), Some((1280, 720, PixelFormat::Yuyv)));
        assert_eq!(stats.control(Control::Brightness), None);
        assert_eq!(stats.control(Control::VerticalFlip), None);
    }

    #[test]
    fn test_capture_converts_and_encodes() {
        let provider = MockProvider::new().with_raw_format(PixelFormat::Bgr24);
        let mut camera = open(&provider);
        camera
            .configure(&CameraSettings {
                resolution: Resolution::Medium,
                ..CameraSettings::default()
            })
            .unwrap();

        let frame = camera.capture_frame().unwrap();
        let decoded = image::load_from_memory(&frame.jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (640, 480));
        assert_eq!((frame.width, frame.height), (640, 480));
    }

    #[test]
    fn test_capture_error_propagates() {
        let provider = MockProvider::new().fail_capture_after(0);
        let mut camera = open(&provider);
        camera.configure(&CameraSettings::default()).unwrap();
        assert!(matches!(camera.capture_frame(), Err(CameraError::Capture(_))));
    }

    #[test]
    fn test_drop_releases_device_once() {
        let provider = MockProvider::new();
        let mut camera = open(&provider);
        camera.close();
        drop(camera);
        assert_eq!(provider.stats().releases(), 1);
    }
}
