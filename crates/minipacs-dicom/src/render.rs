//! DICOM图像渲染
//!
//! 将像素数据按窗宽窗位渲染为可编码图像，并提供JPEG/PNG编码与等比缩放。
//! 传输语法解码完全委托给 dicom-pixeldata，不支持的语法以渲染错误返回。

use dicom::object::open_file;
use dicom_pixeldata::image::imageops::FilterType;
use dicom_pixeldata::image::DynamicImage;
use dicom_pixeldata::{image, ConvertOptions, PixelDecoder, VoiLutOption, WindowLevel};
use minipacs_core::{PacsError, Result};
use std::path::Path;
use tracing::debug;

/// 窗宽窗位参数
#[derive(Debug, Clone, Copy, Default)]
pub struct WindowParams {
    pub center: Option<f64>,
    pub width: Option<f64>,
}

impl WindowParams {
    /// 合成有效窗参数
    ///
    /// 窗位与窗宽都已知时才构成自定义窗，否则交由解码器使用文件内置VOI LUT。
    /// 窗宽最小限制为1，避免退化窗。
    pub fn effective(self) -> Option<(f64, f64)> {
        match (self.center, self.width) {
            (Some(center), Some(width)) => Some((center, width.max(1.0))),
            _ => None,
        }
    }
}

/// DICOM图像渲染器
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomRenderer;

impl DicomRenderer {
    /// 渲染单帧图像
    pub fn render_frame<P: AsRef<Path>>(
        path: P,
        frame: u32,
        window: WindowParams,
    ) -> Result<DynamicImage> {
        let path = path.as_ref();
        let obj = open_file(path)
            .map_err(|e| PacsError::Render(format!("无法打开DICOM文件: {}", e)))?;

        let pixel_data = obj
            .decode_pixel_data()
            .map_err(|e| PacsError::Render(format!("像素数据解码失败: {}", e)))?;

        if frame >= pixel_data.number_of_frames() {
            return Err(PacsError::Render(format!(
                "帧序号越界: {} (共 {} 帧)",
                frame,
                pixel_data.number_of_frames()
            )));
        }

        let options = match window.effective() {
            Some((center, width)) => {
                debug!("使用自定义窗: center={}, width={}", center, width);
                ConvertOptions::new().with_voi_lut(VoiLutOption::Custom(WindowLevel {
                    center,
                    width,
                }))
            }
            None => ConvertOptions::new(),
        };

        pixel_data
            .to_dynamic_image_with_options(frame, &options)
            .map_err(|e| PacsError::Render(format!("图像转换失败: {}", e)))
    }

    /// 编码为JPEG，质量范围 [0,100]
    pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        // JPEG不支持alpha通道与16位灰度，统一转为RGB8
        let rgb = image.to_rgb8();
        let mut buf = Vec::new();
        let mut encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.min(100));
        encoder
            .encode_image(&rgb)
            .map_err(|e| PacsError::Render(format!("JPEG编码失败: {}", e)))?;
        Ok(buf)
    }

    /// 编码为PNG（无损）
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        use dicom_pixeldata::image::ImageEncoder;

        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        encoder
            .write_image(
                image.as_bytes(),
                image.width(),
                image.height(),
                image.color().into(),
            )
            .map_err(|e| PacsError::Render(format!("PNG编码失败: {}", e)))?;
        Ok(buf)
    }

    /// 等比缩放，使长边等于max_side
    pub fn resize_to_fit(image: &DynamicImage, max_side: u32) -> DynamicImage {
        image.resize(max_side, max_side, FilterType::Lanczos3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_width_clamped_to_one() {
        // 窗宽0与窗宽1必须产生相同的有效窗
        let zero = WindowParams {
            center: Some(40.0),
            width: Some(0.0),
        };
        let one = WindowParams {
            center: Some(40.0),
            width: Some(1.0),
        };
        assert_eq!(zero.effective(), one.effective());
        assert_eq!(zero.effective(), Some((40.0, 1.0)));
    }

    #[test]
    fn test_partial_window_falls_back_to_default() {
        let only_center = WindowParams {
            center: Some(40.0),
            width: None,
        };
        assert_eq!(only_center.effective(), None);
        assert_eq!(WindowParams::default().effective(), None);
    }

    #[test]
    fn test_resize_preserves_aspect_ratio() {
        let source = DynamicImage::new_rgb8(512, 256);
        let resized = DicomRenderer::resize_to_fit(&source, 128);
        assert_eq!(resized.width(), 128);
        assert_eq!(resized.height(), 64);

        // 纵向图像同样以长边为准
        let tall = DynamicImage::new_rgb8(256, 512);
        let resized = DicomRenderer::resize_to_fit(&tall, 128);
        assert_eq!(resized.width(), 64);
        assert_eq!(resized.height(), 128);
    }

    #[test]
    fn test_encode_jpeg_produces_jfif_bytes() {
        let image = DynamicImage::new_rgb8(8, 8);
        let bytes = DicomRenderer::encode_jpeg(&image, 85).unwrap();
        assert!(bytes.starts_with(&[0xFF, 0xD8])); // JPEG SOI
    }

    #[test]
    fn test_encode_png_produces_png_signature() {
        let image = DynamicImage::new_rgb8(8, 8);
        let bytes = DicomRenderer::encode_png(&image).unwrap();
        assert!(bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn test_render_corrupt_file_fails_gracefully() {
        let path = std::env::temp_dir().join(format!("minipacs-render-{}.bin", std::process::id()));
        std::fs::write(&path, b"truncated garbage").unwrap();

        let result = DicomRenderer::render_frame(&path, 0, WindowParams::default());
        assert!(matches!(result, Err(PacsError::Render(_))));

        std::fs::remove_file(&path).ok();
    }
}
