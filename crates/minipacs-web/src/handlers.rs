//! HTTP处理器
//!
//! REST管理接口：患者/检查/系列/实例的查询与索引管理。
//! JSON接口统一使用ApiResponse包装；二进制接口（缩略图等）失败时返回裸状态码。

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use minipacs_core::models::*;
use minipacs_core::PacsError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use crate::server::AppState;

/// 错误响应包装
///
/// 渲染失败对调用方等同于资源不可得，与未找到一样映射为404。
pub struct ApiError(pub PacsError);

impl From<PacsError> for ApiError {
    fn from(err: PacsError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            PacsError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            PacsError::Render(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            PacsError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            other => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("请求处理失败: {}", self.0);
        }
        (status, Json(ApiResponse::<()>::error(message))).into_response()
    }
}

/// 二进制接口的错误映射：裸状态码，不带JSON包装
pub(crate) fn binary_error(err: PacsError) -> Response {
    let status = match &err {
        PacsError::NotFound(_) | PacsError::Render(_) => StatusCode::NOT_FOUND,
        PacsError::Validation(_) => StatusCode::BAD_REQUEST,
        _ => {
            error!("请求处理失败: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    status.into_response()
}

/// 二进制响应
pub(crate) fn binary_response(bytes: Vec<u8>, content_type: &'static str) -> Response {
    ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
}

// ========== 查询参数 ==========

/// 列表查询参数
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListParams {
    #[serde(default)]
    pub page_index: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    #[serde(default = "default_sort_desc")]
    pub sort_desc: bool,
}

fn default_page_size() -> usize {
    20
}

fn default_sort_desc() -> bool {
    true
}

impl ListParams {
    /// 转为内部查询参数，页大小限制在 [1,100]
    fn into_query(self) -> QueryParameters {
        QueryParameters {
            page_index: self.page_index,
            page_size: self.page_size.clamp(1, 100),
            search_term: self.search,
            sort_by: self.sort_by,
            sort_descending: self.sort_desc,
        }
    }
}

/// 缩略图查询参数
#[derive(Debug, Deserialize)]
pub struct ThumbnailParams {
    pub size: Option<u32>,
}

// ========== 基础接口 ==========

/// API根路径处理器
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "MiniPACS Server API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api",
            "wado": "/api/wado"
        }
    }))
}

/// 健康检查处理器
pub async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ========== 患者 ==========

/// 患者列表
pub async fn list_patients(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let result = state.index.query_patients(&params.into_query());
    Json(ApiResponse::ok(result))
}

/// 患者的检查列表
pub async fn patient_studies(
    State(state): State<Arc<AppState>>,
    Path(patient_id): Path<String>,
) -> impl IntoResponse {
    Json(ApiResponse::ok(state.index.studies_by_patient(&patient_id)))
}

// ========== 检查 ==========

/// 检查列表
pub async fn list_studies(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> impl IntoResponse {
    let result = state.index.query_studies(&params.into_query());
    Json(ApiResponse::ok(result))
}

/// 检查详情
pub async fn study_detail(
    State(state): State<Arc<AppState>>,
    Path(study_uid): Path<String>,
) -> Result<Json<ApiResponse<StudyDto>>, ApiError> {
    let study = state
        .index
        .study(&study_uid)
        .ok_or_else(|| PacsError::NotFound("检查不存在".to_string()))?;
    Ok(Json(ApiResponse::ok(state.index.study_dto(&study))))
}

/// 检查的系列列表
pub async fn study_series(
    State(state): State<Arc<AppState>>,
    Path(study_uid): Path<String>,
) -> impl IntoResponse {
    Json(ApiResponse::ok(state.index.series_by_study(&study_uid)))
}

// ========== 系列 ==========

/// 系列详情
pub async fn series_detail(
    State(state): State<Arc<AppState>>,
    Path(series_uid): Path<String>,
) -> Result<Json<ApiResponse<SeriesDto>>, ApiError> {
    let series = state
        .index
        .series(&series_uid)
        .ok_or_else(|| PacsError::NotFound("系列不存在".to_string()))?;
    Ok(Json(ApiResponse::ok(SeriesDto::from(&series))))
}

/// 系列的实例列表
pub async fn series_instances(
    State(state): State<Arc<AppState>>,
    Path(series_uid): Path<String>,
) -> impl IntoResponse {
    Json(ApiResponse::ok(state.index.instances_by_series(&series_uid)))
}

/// 系列缩略图
pub async fn series_thumbnail(
    State(state): State<Arc<AppState>>,
    Path(series_uid): Path<String>,
    Query(params): Query<ThumbnailParams>,
) -> Response {
    match state
        .images
        .series_thumbnail(&series_uid, params.size.unwrap_or(0))
        .await
    {
        Ok(bytes) => binary_response(bytes, "image/jpeg"),
        Err(e) => binary_error(e),
    }
}

// ========== 实例 ==========

/// 实例详情
pub async fn instance_detail(
    State(state): State<Arc<AppState>>,
    Path(sop_uid): Path<String>,
) -> Result<Json<ApiResponse<InstanceDto>>, ApiError> {
    let instance = state
        .index
        .instance(&sop_uid)
        .ok_or_else(|| PacsError::NotFound("实例不存在".to_string()))?;
    Ok(Json(ApiResponse::ok(InstanceDto::from(&instance))))
}

/// 实例的DICOM标签列表
pub async fn instance_tags(
    State(state): State<Arc<AppState>>,
    Path(sop_uid): Path<String>,
) -> impl IntoResponse {
    Json(ApiResponse::ok(state.images.dicom_tags(&sop_uid).await))
}

/// 实例缩略图
pub async fn instance_thumbnail(
    State(state): State<Arc<AppState>>,
    Path(sop_uid): Path<String>,
    Query(params): Query<ThumbnailParams>,
) -> Response {
    match state
        .images
        .instance_thumbnail(&sop_uid, params.size.unwrap_or(0))
        .await
    {
        Ok(bytes) => binary_response(bytes, "image/jpeg"),
        Err(e) => binary_error(e),
    }
}

/// 实例帧数
pub async fn instance_frame_count(
    State(state): State<Arc<AppState>>,
    Path(sop_uid): Path<String>,
) -> impl IntoResponse {
    Json(ApiResponse::ok(state.images.frame_count(&sop_uid).await))
}

// ========== 索引管理 ==========

/// 索引统计信息
pub async fn index_statistics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(ApiResponse::ok(state.index.statistics()))
}

/// 重建索引（阻塞至完成；已在进行时立即返回当前统计）
pub async fn rebuild_index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("收到重建索引请求");
    let stats = state.scanner.rebuild(&state.cancel).await;
    Json(ApiResponse::ok_with_message(stats, "索引重建完成"))
}

/// 清除缩略图缓存
pub async fn clear_cache(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.images.clear_thumbnail_cache().await;
    Json(ApiResponse::ok("缓存已清除".to_string()))
}
