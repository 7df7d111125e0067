//! WADO服务
//!
//! Web Access to DICOM Objects：按UID获取原始对象、渲染图像、帧与标签。
//! 对象获取支持内容协商（DICOM/JPEG/PNG），并校验实例的层级归属。

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Json, Response},
};
use minipacs_core::models::{ApiResponse, DicomTagDto};
use minipacs_core::utils::is_valid_dicom_uid;
use minipacs_core::PacsError;
use minipacs_dicom::WindowParams;
use minipacs_imaging::DEFAULT_JPEG_QUALITY;
use serde::Deserialize;
use std::sync::Arc;

use crate::handlers::{binary_error, binary_response};
use crate::server::AppState;

/// WADO对象内容协商结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ContentKind {
    Dicom,
    Jpeg,
    Png,
}

impl ContentKind {
    /// 从contentType查询参数或Accept头解析，默认DICOM
    fn negotiate(content_type: Option<&str>, accept: Option<&str>) -> Self {
        let requested = content_type
            .map(str::to_lowercase)
            .or_else(|| accept.map(str::to_lowercase))
            .unwrap_or_default();
        if requested.contains("image/jpeg") {
            ContentKind::Jpeg
        } else if requested.contains("image/png") {
            ContentKind::Png
        } else {
            ContentKind::Dicom
        }
    }
}

// ========== 查询参数 ==========

#[derive(Debug, Deserialize)]
pub struct WadoObjectParams {
    #[serde(rename = "contentType")]
    pub content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WadoObjectPath {
    pub study_uid: String,
    pub series_uid: String,
    pub sop_uid: String,
}

/// 渲染查询参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderParams {
    #[serde(default)]
    pub frame: u32,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub quality: Option<u8>,
}

impl RenderParams {
    fn window(&self) -> WindowParams {
        WindowParams {
            center: self.window_center,
            width: self.window_width,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DicomFileParams {
    #[serde(default)]
    pub download: bool,
}

// ========== 处理器 ==========

/// WADO对象获取
///
/// 校验实例归属于路径中的检查与系列后，按协商的内容类型返回
/// 原始DICOM、渲染JPEG或渲染PNG。
pub async fn dicom_object(
    State(state): State<Arc<AppState>>,
    Path(path): Path<WadoObjectPath>,
    Query(params): Query<WadoObjectParams>,
    headers: HeaderMap,
) -> Response {
    for uid in [&path.study_uid, &path.series_uid, &path.sop_uid] {
        if !is_valid_dicom_uid(uid) {
            return (StatusCode::BAD_REQUEST, "无效的UID格式").into_response();
        }
    }

    let instance = match state.index.instance(&path.sop_uid) {
        Some(instance) => instance,
        None => {
            return binary_error(PacsError::NotFound(format!(
                "实例不存在: {}",
                path.sop_uid
            )))
        }
    };

    // 层级校验：实例必须归属于路径中的检查与系列
    if instance.study_instance_uid != path.study_uid
        || instance.series_instance_uid != path.series_uid
    {
        return (StatusCode::BAD_REQUEST, "实例UID与检查/系列不匹配").into_response();
    }

    let accept = headers
        .get(header::ACCEPT)
        .and_then(|value| value.to_str().ok());

    match ContentKind::negotiate(params.content_type.as_deref(), accept) {
        ContentKind::Jpeg => {
            match state
                .images
                .rendered_jpeg(&path.sop_uid, 0, WindowParams::default(), DEFAULT_JPEG_QUALITY)
                .await
            {
                Ok(bytes) => binary_response(bytes, "image/jpeg"),
                Err(e) => binary_error(e),
            }
        }
        ContentKind::Png => {
            match state
                .images
                .rendered_png(&path.sop_uid, 0, WindowParams::default())
                .await
            {
                Ok(bytes) => binary_response(bytes, "image/png"),
                Err(e) => binary_error(e),
            }
        }
        ContentKind::Dicom => match state.images.dicom_file(&path.sop_uid).await {
            Ok(bytes) => binary_response(bytes, "application/dicom"),
            Err(e) => binary_error(e),
        },
    }
}

/// 渲染JPEG图像
pub async fn rendered_jpeg(
    State(state): State<Arc<AppState>>,
    Path(sop_uid): Path<String>,
    Query(params): Query<RenderParams>,
) -> Response {
    let quality = params.quality.unwrap_or(DEFAULT_JPEG_QUALITY);
    match state
        .images
        .rendered_jpeg(&sop_uid, params.frame, params.window(), quality)
        .await
    {
        Ok(bytes) => binary_response(bytes, "image/jpeg"),
        Err(e) => binary_error(e),
    }
}

/// 渲染PNG图像
pub async fn rendered_png(
    State(state): State<Arc<AppState>>,
    Path(sop_uid): Path<String>,
    Query(params): Query<RenderParams>,
) -> Response {
    match state
        .images
        .rendered_png(&sop_uid, params.frame, params.window())
        .await
    {
        Ok(bytes) => binary_response(bytes, "image/png"),
        Err(e) => binary_error(e),
    }
}

/// 渲染指定帧（JPEG）
pub async fn rendered_frame(
    State(state): State<Arc<AppState>>,
    Path((sop_uid, frame)): Path<(String, u32)>,
    Query(params): Query<RenderParams>,
) -> Response {
    let quality = params.quality.unwrap_or(DEFAULT_JPEG_QUALITY);
    match state
        .images
        .rendered_jpeg(&sop_uid, frame, params.window(), quality)
        .await
    {
        Ok(bytes) => binary_response(bytes, "image/jpeg"),
        Err(e) => binary_error(e),
    }
}

/// 原始DICOM文件（download=true时作为附件下载）
pub async fn dicom_file(
    State(state): State<Arc<AppState>>,
    Path(sop_uid): Path<String>,
    Query(params): Query<DicomFileParams>,
) -> Response {
    match state.images.dicom_file(&sop_uid).await {
        Ok(bytes) => {
            let mut response = binary_response(bytes, "application/dicom");
            if params.download {
                let disposition = format!("attachment; filename=\"{}.dcm\"", sop_uid);
                if let Ok(value) = HeaderValue::from_str(&disposition) {
                    response
                        .headers_mut()
                        .insert(header::CONTENT_DISPOSITION, value);
                }
            }
            response
        }
        Err(e) => binary_error(e),
    }
}

/// DICOM标签列表（WADO风格，读不到标签时为404）
pub async fn metadata(
    State(state): State<Arc<AppState>>,
    Path(sop_uid): Path<String>,
) -> Response {
    let tags = state.images.dicom_tags(&sop_uid).await;
    if tags.is_empty() {
        return (
            StatusCode::NOT_FOUND,
            Json(ApiResponse::<Vec<DicomTagDto>>::error("无法读取DICOM标签")),
        )
            .into_response();
    }
    Json(ApiResponse::ok(tags)).into_response()
}
