//! Web服务器
//!
//! 组装路由与中间件，持有共享应用状态。

use axum::{
    routing::{get, post},
    Router,
};
use minipacs_core::{PacsError, Result};
use minipacs_imaging::ImageService;
use minipacs_index::{DicomIndex, IndexScanner};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::handlers;
use crate::wado;

/// 应用共享状态
pub struct AppState {
    pub index: Arc<DicomIndex>,
    pub scanner: Arc<IndexScanner>,
    pub images: Arc<ImageService>,
    /// 停机时取消进行中的索引重建
    pub cancel: CancellationToken,
}

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: Arc<AppState>) -> Self {
        Self {
            addr,
            app: create_app(state),
        }
    }

    /// 运行服务器直至取消令牌触发
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await
            .map_err(|e| PacsError::Internal(format!("Web服务器运行失败: {}", e)))?;

        Ok(())
    }
}

/// 构建完整路由（测试同样从此入口构建）
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        // 根路径与健康检查
        .route("/", get(handlers::api_root))
        .route("/health", get(handlers::health))
        // API路由
        .nest("/api", api_routes())
        // 全局中间件
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(
                    CorsLayer::new()
                        .allow_origin(Any)
                        .allow_methods(Any)
                        .allow_headers(Any),
                ),
        )
        .with_state(state)
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // 患者
        .route("/patients", get(handlers::list_patients))
        .route("/patients/:patient_id/studies", get(handlers::patient_studies))
        // 检查
        .route("/studies", get(handlers::list_studies))
        .route("/studies/:study_uid", get(handlers::study_detail))
        .route("/studies/:study_uid/series", get(handlers::study_series))
        // 系列
        .route("/series/:series_uid", get(handlers::series_detail))
        .route("/series/:series_uid/instances", get(handlers::series_instances))
        .route("/series/:series_uid/thumbnail", get(handlers::series_thumbnail))
        // 实例
        .route("/instances/:sop_uid", get(handlers::instance_detail))
        .route("/instances/:sop_uid/tags", get(handlers::instance_tags))
        .route("/instances/:sop_uid/thumbnail", get(handlers::instance_thumbnail))
        .route("/instances/:sop_uid/frames", get(handlers::instance_frame_count))
        // 索引管理
        .route("/index/statistics", get(handlers::index_statistics))
        .route("/index/rebuild", post(handlers::rebuild_index))
        .route("/index/clear-cache", post(handlers::clear_cache))
        // WADO
        .nest("/wado", wado_routes())
}

fn wado_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/studies/:study_uid/series/:series_uid/instances/:sop_uid",
            get(wado::dicom_object),
        )
        .route("/image/:sop_uid", get(wado::rendered_jpeg))
        .route("/image/:sop_uid/png", get(wado::rendered_png))
        .route("/frames/:sop_uid/:frame", get(wado::rendered_frame))
        .route("/thumbnail/:series_uid", get(handlers::series_thumbnail))
        .route("/thumbnail/instance/:sop_uid", get(handlers::instance_thumbnail))
        .route("/dicom/:sop_uid", get(wado::dicom_file))
        .route("/metadata/:sop_uid", get(wado::metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use minipacs_core::models::*;
    use minipacs_imaging::ThumbnailCache;
    use serde_json::Value;
    use std::path::PathBuf;
    use tower::ServiceExt;

    /// 构建带一个检查（2系列，3+1实例）的测试应用
    fn test_app() -> Router {
        let index = Arc::new(DicomIndex::new("/tmp/minipacs-web-storage"));
        populate(&index);

        let cache_dir =
            std::env::temp_dir().join(format!("minipacs-web-cache-{}", std::process::id()));
        let cache = ThumbnailCache::new(cache_dir, 128).unwrap();
        let scanner = Arc::new(IndexScanner::new(index.clone()));
        let images = Arc::new(ImageService::new(index.clone(), cache));

        create_app(Arc::new(AppState {
            index,
            scanner,
            images,
            cancel: CancellationToken::new(),
        }))
    }

    fn populate(index: &DicomIndex) {
        {
            let mut patient = index.upsert_patient("P1", || PatientRecord {
                patient_id: "P1".to_string(),
                patient_name: "Zhang^San".to_string(),
                birth_date: Some("19800101".to_string()),
                sex: Some("M".to_string()),
                study_uids: Vec::new(),
                latest_study_date: None,
            });
            patient.study_uids.push("1.2.3".to_string());
        }
        {
            let mut study = index.upsert_study("1.2.3", || StudyRecord {
                study_instance_uid: "1.2.3".to_string(),
                patient_id: "P1".to_string(),
                patient_name: "Zhang^San".to_string(),
                study_date: Some("20231015".to_string()),
                study_time: None,
                study_description: Some("CT Chest".to_string()),
                accession_number: Some("ACC001".to_string()),
                referring_physician: None,
                modalities: vec!["CT".to_string()],
                series_uids: Vec::new(),
                folder_path: None,
            });
            study.series_uids.push("1.2.3.2".to_string());
            study.series_uids.push("1.2.3.1".to_string());
        }
        for (series_uid, number, count) in [("1.2.3.1", "1", 3), ("1.2.3.2", "2", 1)] {
            let mut series = index.upsert_series(series_uid, || SeriesRecord {
                series_instance_uid: series_uid.to_string(),
                study_instance_uid: "1.2.3".to_string(),
                series_number: Some(number.to_string()),
                series_description: None,
                modality: Some("CT".to_string()),
                body_part_examined: None,
                instance_uids: Vec::new(),
            });
            for n in 1..=count {
                let sop_uid = format!("{}.{}", series_uid, n);
                series.instance_uids.push(sop_uid.clone());
                index.set_instance(InstanceRecord {
                    sop_instance_uid: sop_uid.clone(),
                    series_instance_uid: series_uid.to_string(),
                    study_instance_uid: "1.2.3".to_string(),
                    instance_number: Some(n),
                    sop_class_uid: None,
                    file_path: PathBuf::from(format!("/tmp/minipacs-web-storage/{}.dcm", sop_uid)),
                    rows: Some(512),
                    columns: Some(512),
                    number_of_frames: None,
                    window_center: Some(40.0),
                    window_width: Some(400.0),
                    photometric_interpretation: Some("MONOCHROME2".to_string()),
                });
            }
        }
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let app = test_app();
        let (status, body) = get_json(&app, "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_study_list_scenario() {
        let app = test_app();

        // 单个检查
        let (status, body) = get_json(&app, "/api/studies").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["totalCount"], 1);
        assert_eq!(body["data"]["items"][0]["seriesCount"], 2);
        assert_eq!(body["data"]["items"][0]["instanceCount"], 4);

        // 系列按系列号升序
        let (status, body) = get_json(&app, "/api/studies/1.2.3/series").await;
        assert_eq!(status, StatusCode::OK);
        let series = body["data"].as_array().unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0]["seriesNumber"], "1");
        assert_eq!(series[1]["seriesNumber"], "2");

        // 实例按实例号升序
        let (status, body) = get_json(&app, "/api/series/1.2.3.1/instances").await;
        assert_eq!(status, StatusCode::OK);
        let instances = body["data"].as_array().unwrap();
        assert_eq!(instances.len(), 3);
        let numbers: Vec<i64> = instances
            .iter()
            .map(|i| i["instanceNumber"].as_i64().unwrap())
            .collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_unknown_study_returns_404_envelope() {
        let app = test_app();
        let (status, body) = get_json(&app, "/api/studies/9.9.9").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
    }

    #[tokio::test]
    async fn test_patient_list_pagination() {
        let app = test_app();
        let (status, body) = get_json(&app, "/api/patients?pageIndex=0&pageSize=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalCount"], 1);
        assert_eq!(body["data"]["totalPages"], 1);
        assert_eq!(body["data"]["items"][0]["patientId"], "P1");
        assert_eq!(body["data"]["items"][0]["studyCount"], 1);
    }

    #[tokio::test]
    async fn test_wado_object_hierarchy_validation() {
        let app = test_app();

        // 实例归属不匹配 -> 400
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/wado/studies/1.2.3/series/1.2.3.2/instances/1.2.3.1.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        // 未知实例 -> 404
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/wado/studies/1.2.3/series/1.2.3.1/instances/9.9.9")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // 非法UID -> 400
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/wado/studies/not-a-uid/series/1.2.3.1/instances/1.2.3.1.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_missing_file_render_returns_404() {
        let app = test_app();
        // 索引里有记录但文件不存在，渲染失败映射为404
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/api/wado/image/1.2.3.1.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_index_statistics_endpoint() {
        let app = test_app();
        let (status, body) = get_json(&app, "/api/index/statistics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["totalPatients"], 1);
        assert_eq!(body["data"]["totalStudies"], 1);
        assert_eq!(body["data"]["totalSeries"], 2);
        assert_eq!(body["data"]["totalInstances"], 4);
        assert_eq!(body["data"]["isIndexing"], false);
    }

    #[tokio::test]
    async fn test_instance_frames_endpoint_unreadable_file() {
        let app = test_app();
        // 文件不存在时帧数为0
        let (status, body) = get_json(&app, "/api/instances/1.2.3.1.1/frames").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], 0);
    }
}
