//! DICOM图像服务
//!
//! 渲染图像、缩略图与原始文件读取的统一入口。
//! UID经由索引解析为文件路径；渲染失败与未找到对调用方同样以错误返回，
//! 由上层映射为404，不会传播为崩溃。

use crate::thumbnail::{ThumbnailCache, ThumbnailKind};
use minipacs_core::models::DicomTagDto;
use minipacs_core::{PacsError, Result};
use minipacs_dicom::image::DynamicImage;
use minipacs_dicom::{tags, DicomExtractor, DicomRenderer, WindowParams};
use minipacs_index::DicomIndex;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

/// 渲染接口的默认JPEG质量
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

/// 缩略图固定使用的JPEG质量
const THUMBNAIL_JPEG_QUALITY: u8 = 80;

/// DICOM图像服务
pub struct ImageService {
    index: Arc<DicomIndex>,
    extractor: DicomExtractor,
    cache: ThumbnailCache,
}

impl ImageService {
    pub fn new(index: Arc<DicomIndex>, cache: ThumbnailCache) -> Self {
        Self {
            index,
            extractor: DicomExtractor::new(),
            cache,
        }
    }

    // ========== 渲染 ==========

    /// 渲染JPEG图像
    pub async fn rendered_jpeg(
        &self,
        sop_uid: &str,
        frame: u32,
        window: WindowParams,
        quality: u8,
    ) -> Result<Vec<u8>> {
        let image = self.render_instance(sop_uid, frame, window).await?;
        DicomRenderer::encode_jpeg(&image, quality)
    }

    /// 渲染PNG图像（无损）
    pub async fn rendered_png(
        &self,
        sop_uid: &str,
        frame: u32,
        window: WindowParams,
    ) -> Result<Vec<u8>> {
        let image = self.render_instance(sop_uid, frame, window).await?;
        DicomRenderer::encode_png(&image)
    }

    /// 渲染单个实例的一帧
    ///
    /// 窗参数：请求值优先，其次实例记录的窗值，最后交给解码器默认VOI LUT。
    async fn render_instance(
        &self,
        sop_uid: &str,
        frame: u32,
        window: WindowParams,
    ) -> Result<DynamicImage> {
        let record = self
            .index
            .instance(sop_uid)
            .ok_or_else(|| PacsError::NotFound(format!("实例不存在: {}", sop_uid)))?;

        let window = WindowParams {
            center: window.center.or(record.window_center),
            width: window.width.or(record.window_width),
        };

        let path = record.file_path.clone();
        let rendered = tokio::task::spawn_blocking(move || {
            DicomRenderer::render_frame(&path, frame, window)
        })
        .await
        .map_err(|e| PacsError::Internal(format!("渲染任务失败: {}", e)))?;

        if let Err(e) = &rendered {
            error!("渲染图像失败 {}: {}", sop_uid, e);
        }
        rendered
    }

    // ========== 缩略图 ==========

    /// 系列缩略图（代表帧为系列的第一个实例）
    pub async fn series_thumbnail(&self, series_uid: &str, size: u32) -> Result<Vec<u8>> {
        let size = self.effective_size(size);
        if let Some(bytes) = self.cache.read(ThumbnailKind::Series, series_uid, size).await {
            return Ok(bytes);
        }

        let path = self
            .index
            .first_instance_file_path(series_uid)
            .ok_or_else(|| PacsError::NotFound(format!("系列不存在或没有实例: {}", series_uid)))?;

        let bytes = self.render_thumbnail(path, size).await?;
        self.cache
            .persist(ThumbnailKind::Series, series_uid, size, bytes.clone());
        Ok(bytes)
    }

    /// 实例缩略图
    pub async fn instance_thumbnail(&self, sop_uid: &str, size: u32) -> Result<Vec<u8>> {
        let size = self.effective_size(size);
        if let Some(bytes) = self.cache.read(ThumbnailKind::Instance, sop_uid, size).await {
            return Ok(bytes);
        }

        let path = self
            .index
            .instance_file_path(sop_uid)
            .ok_or_else(|| PacsError::NotFound(format!("实例不存在: {}", sop_uid)))?;

        let bytes = self.render_thumbnail(path, size).await?;
        self.cache
            .persist(ThumbnailKind::Instance, sop_uid, size, bytes.clone());
        Ok(bytes)
    }

    /// 首帧按默认窗渲染，等比缩放到长边等于size，JPEG编码
    async fn render_thumbnail(&self, path: PathBuf, size: u32) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || {
            let image = DicomRenderer::render_frame(&path, 0, WindowParams::default())?;
            let resized = DicomRenderer::resize_to_fit(&image, size);
            DicomRenderer::encode_jpeg(&resized, THUMBNAIL_JPEG_QUALITY)
        })
        .await
        .map_err(|e| PacsError::Internal(format!("缩略图渲染任务失败: {}", e)))?
    }

    fn effective_size(&self, size: u32) -> u32 {
        if size == 0 {
            self.cache.default_size()
        } else {
            size
        }
    }

    /// 清空缩略图缓存
    pub async fn clear_thumbnail_cache(&self) {
        self.cache.clear().await;
    }

    // ========== 文件级操作 ==========

    /// 原始DICOM文件内容
    pub async fn dicom_file(&self, sop_uid: &str) -> Result<Vec<u8>> {
        let path = self
            .index
            .instance_file_path(sop_uid)
            .ok_or_else(|| PacsError::NotFound(format!("实例不存在: {}", sop_uid)))?;

        tokio::fs::read(&path)
            .await
            .map_err(|e| PacsError::NotFound(format!("DICOM文件不可读 {}: {}", path.display(), e)))
    }

    /// 实例帧数，UID未知或文件不可读时为0
    pub async fn frame_count(&self, sop_uid: &str) -> u32 {
        let Some(path) = self.index.instance_file_path(sop_uid) else {
            return 0;
        };
        let extractor = self.extractor;
        tokio::task::spawn_blocking(move || extractor.frame_count(&path).unwrap_or(0))
            .await
            .unwrap_or(0)
    }

    /// 实例的全部DICOM标签，UID未知或文件不可读时为空列表
    pub async fn dicom_tags(&self, sop_uid: &str) -> Vec<DicomTagDto> {
        let Some(path) = self.index.instance_file_path(sop_uid) else {
            return Vec::new();
        };
        tokio::task::spawn_blocking(move || match tags::enumerate_tags(&path) {
            Ok(tags) => tags,
            Err(e) => {
                debug!("读取DICOM标签失败 {}: {}", path.display(), e);
                Vec::new()
            }
        })
        .await
        .unwrap_or_default()
    }
}
