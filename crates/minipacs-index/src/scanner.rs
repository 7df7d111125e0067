//! 存储目录扫描与索引重建协调
//!
//! 遍历存储根目录，逐文件提取元数据并写入层级索引。
//! 重建全程单飞：已有重建在进行时立即返回当前统计信息。
//! 单个文件的解析失败只计数，不中断扫描。

use crate::index::DicomIndex;
use minipacs_core::models::*;
use minipacs_core::utils::parse_dicom_date;
use minipacs_dicom::{DicomExtractor, DicomMetadata};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 缓存产物等非DICOM扩展名，扫描时排除
const EXCLUDED_EXTENSIONS: [&str; 3] = ["png", "jpg", "txt"];

/// 索引扫描器
pub struct IndexScanner {
    index: Arc<DicomIndex>,
    extractor: DicomExtractor,
}

impl IndexScanner {
    pub fn new(index: Arc<DicomIndex>) -> Self {
        Self {
            index,
            extractor: DicomExtractor::new(),
        }
    }

    /// 重建完整索引
    ///
    /// 已有重建在进行时立即返回当前（过期）统计信息，不排队、不报错。
    /// 取消发生在文件之间，已索引的部分结果保留为有效状态。
    pub async fn rebuild(&self, cancel: &CancellationToken) -> IndexStatistics {
        if !self.index.try_begin_indexing() {
            info!("索引重建已在进行中，返回当前统计信息");
            return self.index.statistics();
        }

        info!("开始重建DICOM索引...");
        self.index.clear_all();

        let root = self.index.storage_root().to_path_buf();
        if !root.exists() {
            warn!("存储路径不存在: {}", root.display());
            self.index.finish_indexing();
            return self.index.statistics();
        }

        let files = match tokio::task::spawn_blocking(move || collect_files(&root)).await {
            Ok(files) => files,
            Err(e) => {
                warn!("扫描存储目录失败: {}", e);
                self.index.finish_indexing();
                return self.index.statistics();
            }
        };
        info!("找到 {} 个文件待处理", files.len());

        let mut processed = 0usize;
        let mut errors = 0usize;
        for file in &files {
            if cancel.is_cancelled() {
                warn!("索引重建被取消，保留已索引的部分结果");
                break;
            }

            match self.index_file(file) {
                Ok(()) => {
                    processed += 1;
                    if processed % 100 == 0 {
                        info!("已处理 {}/{} 个文件", processed, files.len());
                    }
                }
                Err(e) => {
                    errors += 1;
                    debug!("跳过文件 {}: {}", file.display(), e);
                }
            }
        }

        self.index.finish_indexing();
        info!("索引完成: {} 个文件成功, {} 个错误", processed, errors);
        self.index.statistics()
    }

    /// 索引单个DICOM文件
    ///
    /// 缺少任一必需UID的文件静默跳过（计入成功）。
    fn index_file(&self, path: &Path) -> minipacs_core::Result<()> {
        let meta = self.extractor.extract(path)?;

        let (Some(study_uid), Some(series_uid), Some(sop_uid)) = (
            meta.study_instance_uid.clone(),
            meta.series_instance_uid.clone(),
            meta.sop_instance_uid.clone(),
        ) else {
            return Ok(());
        };

        let patient_id = meta
            .patient_id
            .clone()
            .unwrap_or_else(|| "Unknown".to_string());

        // 患者与检查的描述性字段首见即定，后续文件不回写
        let mut patient = self.index.upsert_patient(&patient_id, || {
            new_patient_record(&patient_id, &meta)
        });
        let patient_name = patient.patient_name.clone();

        let mut study = self.index.upsert_study(&study_uid, || {
            new_study_record(&study_uid, &patient_id, &patient_name, &meta, path)
        });

        // Modality累积：同一检查下出现过的所有不同模态
        if let Some(modality) = meta.modality.clone().filter(|m| !m.is_empty()) {
            if !study.modalities.contains(&modality) {
                study.modalities.push(modality);
            }
        }

        let mut series = self.index.upsert_series(&series_uid, || {
            new_series_record(&series_uid, &study_uid, &meta)
        });

        // 实例记录整体覆盖，重复索引同一UID不产生重复项
        self.index.set_instance(InstanceRecord {
            sop_instance_uid: sop_uid.clone(),
            series_instance_uid: series_uid.clone(),
            study_instance_uid: study_uid.clone(),
            instance_number: meta.instance_number,
            sop_class_uid: meta.sop_class_uid.clone(),
            file_path: path.to_path_buf(),
            rows: meta.rows,
            columns: meta.columns,
            number_of_frames: meta.number_of_frames,
            window_center: meta.window_center,
            window_width: meta.window_width,
            photometric_interpretation: meta.photometric_interpretation.clone(),
        });

        register_child(&mut patient.study_uids, &study_uid);
        register_child(&mut study.series_uids, &series_uid);
        register_child(&mut series.instance_uids, &sop_uid);

        // 患者最新检查日期（StudyDate严格按YYYYMMDD解析）
        if let Some(date) = study.study_date.as_deref().and_then(parse_dicom_date) {
            if patient.latest_study_date.map_or(true, |latest| date > latest) {
                patient.latest_study_date = Some(date);
            }
        }

        Ok(())
    }
}

fn new_patient_record(patient_id: &str, meta: &DicomMetadata) -> PatientRecord {
    PatientRecord {
        patient_id: patient_id.to_string(),
        patient_name: meta
            .patient_name
            .clone()
            .unwrap_or_else(|| "Unknown".to_string()),
        birth_date: meta.patient_birth_date.clone(),
        sex: meta.patient_sex.clone(),
        study_uids: Vec::new(),
        latest_study_date: None,
    }
}

fn new_study_record(
    study_uid: &str,
    patient_id: &str,
    patient_name: &str,
    meta: &DicomMetadata,
    path: &Path,
) -> StudyRecord {
    StudyRecord {
        study_instance_uid: study_uid.to_string(),
        patient_id: patient_id.to_string(),
        patient_name: patient_name.to_string(),
        study_date: meta.study_date.clone(),
        study_time: meta.study_time.clone(),
        study_description: meta.study_description.clone(),
        accession_number: meta.accession_number.clone(),
        referring_physician: meta.referring_physician.clone(),
        modalities: Vec::new(),
        series_uids: Vec::new(),
        folder_path: path.parent().map(|p| p.display().to_string()),
    }
}

fn new_series_record(series_uid: &str, study_uid: &str, meta: &DicomMetadata) -> SeriesRecord {
    SeriesRecord {
        series_instance_uid: series_uid.to_string(),
        study_instance_uid: study_uid.to_string(),
        series_number: meta.series_number.clone(),
        series_description: meta.series_description.clone(),
        modality: meta.modality.clone(),
        body_part_examined: meta.body_part_examined.clone(),
        instance_uids: Vec::new(),
    }
}

/// 子UID集合按插入顺序去重保存
fn register_child(children: &mut Vec<String>, uid: &str) {
    if !children.iter().any(|c| c == uid) {
        children.push(uid.to_string());
    }
}

/// 递归枚举存储根目录下的常规文件，排除缓存产物扩展名
fn collect_files(root: &Path) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .filter(|path| !is_excluded(path))
        .collect()
}

fn is_excluded(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            EXCLUDED_EXTENSIONS
                .iter()
                .any(|excluded| ext.eq_ignore_ascii_case(excluded))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_excluded_by_extension() {
        assert!(is_excluded(Path::new("/data/thumb.png")));
        assert!(is_excluded(Path::new("/data/thumb.JPG")));
        assert!(is_excluded(Path::new("/data/notes.txt")));
        assert!(!is_excluded(Path::new("/data/image.dcm")));
        assert!(!is_excluded(Path::new("/data/noextension")));
    }

    #[test]
    fn test_register_child_keeps_order_and_dedupes() {
        let mut children = Vec::new();
        register_child(&mut children, "1.2.9");
        register_child(&mut children, "1.2.1");
        register_child(&mut children, "1.2.9");

        assert_eq!(children, vec!["1.2.9".to_string(), "1.2.1".to_string()]);
    }

    #[tokio::test]
    async fn test_rebuild_missing_root_finishes_cleanly() {
        let index = Arc::new(DicomIndex::new("/nonexistent/minipacs-storage"));
        let scanner = IndexScanner::new(index.clone());

        let stats = scanner.rebuild(&CancellationToken::new()).await;

        assert_eq!(stats.total_instances, 0);
        assert!(!stats.is_indexing);
        assert!(stats.last_index_time.is_some());
    }

    #[tokio::test]
    async fn test_rebuild_counts_unparseable_files_as_errors() {
        let root = std::env::temp_dir().join(format!("minipacs-scan-{}", std::process::id()));
        std::fs::create_dir_all(&root).unwrap();
        std::fs::write(root.join("garbage.bin"), b"not a dicom file").unwrap();
        std::fs::write(root.join("thumb.png"), b"cached artifact").unwrap();

        let index = Arc::new(DicomIndex::new(&root));
        let scanner = IndexScanner::new(index.clone());
        let stats = scanner.rebuild(&CancellationToken::new()).await;

        // 垃圾文件被吞掉计数，扫描正常完成
        assert_eq!(stats.total_instances, 0);
        assert!(!stats.is_indexing);

        std::fs::remove_dir_all(&root).ok();
    }

    #[tokio::test]
    async fn test_rebuild_single_flight_returns_stale_statistics() {
        let index = Arc::new(DicomIndex::new("/nonexistent/minipacs-storage"));
        let scanner = IndexScanner::new(index.clone());

        // 手动占住重建标志，模拟进行中的重建
        assert!(index.try_begin_indexing());
        let stats = scanner.rebuild(&CancellationToken::new()).await;
        assert!(stats.is_indexing);
        // 没有触发清空重建流程，标志仍被原持有者占据
        assert!(!index.try_begin_indexing());
        index.finish_indexing();
    }
}
