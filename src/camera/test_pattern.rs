//! 测试图案设备
//!
//! 不依赖硬件的合成视频源：移动的渐变色条，会响应分辨率、亮度和翻转。
//! 用于没有摄像头的开发环境 (`--test-pattern`) 和测试。

use image::RgbImage;

use super::convert::encode_jpeg;
use super::device::{Control, DeviceProvider, DeviceTarget, PixelFormat, RawFrame, VideoDevice};
use super::CameraError;

/// 测试图案设备提供者
#[derive(Debug, Clone, Default)]
pub struct TestPatternProvider;

impl TestPatternProvider {
    pub fn new() -> Self {
        Self
    }
}

impl DeviceProvider for TestPatternProvider {
    fn open(&self, target: &DeviceTarget) -> Result<Box<dyn VideoDevice>, CameraError> {
        Ok(Box::new(TestPatternDevice::new(target)))
    }
}

/// 合成视频设备
pub struct TestPatternDevice {
    name: String,
    width: u32,
    height: u32,
    format: PixelFormat,
    brightness: i32,
    vflip: bool,
    hflip: bool,
    frame_index: u32,
}

impl TestPatternDevice {
    pub fn new(target: &DeviceTarget) -> Self {
        let (width, height) = (320, 240);
        Self {
            name: format!("test-pattern ({})", target),
            width,
            height,
            format: PixelFormat::Rgb24,
            brightness: 50,
            vflip: false,
            hflip: false,
            frame_index: 0,
        }
    }

    /// 生成当前帧的 RGB 图像
    pub fn render(&self) -> RgbImage {
        let (w, h) = (self.width.max(1), self.height.max(1));
        let bar = (self.frame_index.wrapping_mul(4)) % w;
        // 亮度 50 为原始亮度
        let gain = self.brightness.clamp(0, 100) as f32 / 50.0;

        RgbImage::from_fn(w, h, |x, y| {
            let x = if self.hflip { w - 1 - x } else { x };
            let y = if self.vflip { h - 1 - y } else { y };
            let base = if x.abs_diff(bar) < 4 {
                [255.0, 255.0, 255.0]
            } else {
                [
                    (x * 255 / w) as f32,
                    (y * 255 / h) as f32,
                    128.0,
                ]
            };
            image::Rgb(base.map(|c| (c * gain).clamp(0.0, 255.0) as u8))
        })
    }
}

impl VideoDevice for TestPatternDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_format(
        &mut self,
        width: u32,
        height: u32,
        format: PixelFormat,
    ) -> Result<(u32, u32), CameraError> {
        if width == 0 || height == 0 {
            return Err(CameraError::Unsupported(format!(
                "invalid size {}x{}",
                width, height
            )));
        }
        // YUYV 要求宽度为偶数
        self.width = if format == PixelFormat::Yuyv { width & !1 } else { width };
        self.height = height;
        self.format = format;
        Ok((self.width, self.height))
    }

    fn set_control(&mut self, control: Control, value: i32) -> Result<(), CameraError> {
        match control {
            Control::Brightness => self.brightness = value.clamp(0, 100),
            Control::VerticalFlip => self.vflip = value != 0,
            Control::HorizontalFlip => self.hflip = value != 0,
        }
        Ok(())
    }

    fn read_frame(&mut self) -> Result<RawFrame, CameraError> {
        let image = self.render();
        self.frame_index = self.frame_index.wrapping_add(1);
        let (width, height) = image.dimensions();

        let data = match self.format {
            PixelFormat::Rgb24 => image.into_raw(),
            PixelFormat::Bgr24 => image
                .into_raw()
                .chunks_exact(3)
                .flat_map(|px| [px[2], px[1], px[0]])
                .collect(),
            PixelFormat::Yuyv => rgb_to_yuyv(&image),
            PixelFormat::Mjpeg => encode_jpeg(&image, 85)?,
        };

        Ok(RawFrame {
            width,
            height,
            format: self.format,
            data,
        })
    }
}

fn rgb_to_yuyv(image: &RgbImage) -> Vec<u8> {
    let mut out = Vec::with_capacity(image.width() as usize * image.height() as usize * 2);
    for pair in image.as_raw().chunks_exact(6) {
        let (y0, u0, v0) = rgb_to_yuv(pair[0], pair[1], pair[2]);
        let (y1, u1, v1) = rgb_to_yuv(pair[3], pair[4], pair[5]);
        let u = ((u0 as u16 + u1 as u16) / 2) as u8;
        let v = ((v0 as u16 + v1 as u16) / 2) as u8;
        out.extend_from_slice(&[y0, u, y1, v]);
    }
    out
}

fn rgb_to_yuv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    let y = ((66 * r + 129 * g + 25 * b + 128) >> 8) + 16;
    let u = ((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128;
    let v = ((112 * r - 94 * g - 18 * b + 128) >> 8) + 128;
    (
        y.clamp(0, 255) as u8,
        u.clamp(0, 255) as u8,
        v.clamp(0, 255) as u8,
    )
}
