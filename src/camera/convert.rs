//! 像素格式转换和 JPEG 编码

use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, RgbImage};

use super::device::{PixelFormat, RawFrame};
use super::CameraError;

/// BGR24 转 RGB24
pub fn bgr_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    for px in data.chunks_exact(3) {
        out.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    out
}

/// YUYV (4:2:2) 转 RGB24，BT.601 系数
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Result<Vec<u8>, CameraError> {
    let pixels = width as usize * height as usize;
    if data.len() < pixels * 2 {
        return Err(CameraError::Capture(format!(
            "short YUYV frame: {} bytes for {}x{}",
            data.len(),
            width,
            height
        )));
    }

    let mut out = Vec::with_capacity(pixels * 3);
    for chunk in data[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        out.extend_from_slice(&yuv_pixel(y0, u, v));
        out.extend_from_slice(&yuv_pixel(y1, u, v));
    }
    Ok(out)
}

fn yuv_pixel(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let r = (298 * c + 409 * e + 128) >> 8;
    let g = (298 * c - 100 * d - 208 * e + 128) >> 8;
    let b = (298 * c + 516 * d + 128) >> 8;
    [clamp(r), clamp(g), clamp(b)]
}

fn clamp(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// 原始帧转为 RGB 图像；MJPEG 帧会先解码
pub fn to_rgb_image(frame: &RawFrame) -> Result<RgbImage, CameraError> {
    let rgb = match frame.format {
        PixelFormat::Rgb24 => frame.data.clone(),
        PixelFormat::Bgr24 => bgr_to_rgb(&frame.data),
        PixelFormat::Yuyv => yuyv_to_rgb(&frame.data, frame.width, frame.height)?,
        PixelFormat::Mjpeg => {
            let decoded = image::load_from_memory(&frame.data)
                .map_err(|e| CameraError::Capture(format!("corrupt MJPEG frame: {}", e)))?;
            return Ok(decoded.to_rgb8());
        }
    };

    RgbImage::from_raw(frame.width, frame.height, rgb).ok_or_else(|| {
        CameraError::Capture(format!(
            "frame buffer does not match {}x{}",
            frame.width, frame.height
        ))
    })
}

/// RGB 图像编码为 JPEG
pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>, CameraError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    encoder.encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgr_to_rgb_swaps_channels() {
        let bgr = [1u8, 2, 3, 10, 20, 30];
        assert_eq!(bgr_to_rgb(&bgr), vec![3, 2, 1, 30, 20, 10]);
    }

    #[test]
    fn test_yuyv_gray_stays_gray() {
        // Y=128 U=V=128 -> 中灰
        let data = vec![128u8; 4 * 2 * 2];
        let rgb = yuyv_to_rgb(&data, 4, 2).unwrap();
        assert_eq!(rgb.len(), 4 * 2 * 3);
        for px in rgb.chunks_exact(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
        }
    }

    #[test]
    fn test_yuyv_short_buffer() {
        assert!(yuyv_to_rgb(&[0u8; 6], 4, 2).is_err());
    }

    #[test]
    fn test_encode_jpeg_roundtrip_dimensions() {
        let img = RgbImage::from_pixel(64, 48, image::Rgb([200, 10, 10]));
        let jpeg = encode_jpeg(&img, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (64, 48));
    }

    #[test]
    fn test_to_rgb_image_rejects_wrong_size() {
        let frame = RawFrame {
            width: 10,
            height: 10,
            format: PixelFormat::Rgb24,
            data: vec![0; 12],
        };
        assert!(matches!(to_rgb_image(&frame), Err(CameraError::Capture(_))));
    }
}
