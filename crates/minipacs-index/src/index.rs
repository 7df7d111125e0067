//! 内存层级索引
//!
//! 四级实体存储 (Patient → Study → Series → Instance)，按UID键控。
//! 每级使用独立的分片并发映射，索引写入与查询可并发进行；
//! 重建期间读取到空或部分内容是已知且接受的过渡窗口。

use chrono::{DateTime, Utc};
use dashmap::mapref::one::RefMut;
use dashmap::DashMap;
use minipacs_core::models::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

/// DICOM层级索引
#[derive(Debug)]
pub struct DicomIndex {
    patients: DashMap<String, PatientRecord>,
    studies: DashMap<String, StudyRecord>,
    series: DashMap<String, SeriesRecord>,
    instances: DashMap<String, InstanceRecord>,
    is_indexing: AtomicBool,
    /// 上次索引完成时间（毫秒时间戳，0表示从未索引）
    last_index_millis: AtomicI64,
    storage_root: PathBuf,
}

impl DicomIndex {
    /// 创建空索引
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            patients: DashMap::new(),
            studies: DashMap::new(),
            series: DashMap::new(),
            instances: DashMap::new(),
            is_indexing: AtomicBool::new(false),
            last_index_millis: AtomicI64::new(0),
            storage_root: storage_root.into(),
        }
    }

    pub fn storage_root(&self) -> &Path {
        &self.storage_root
    }

    // ========== 写入 ==========

    /// 获取或创建患者记录（原子），返回可变句柄
    pub fn upsert_patient(
        &self,
        patient_id: &str,
        init: impl FnOnce() -> PatientRecord,
    ) -> RefMut<'_, String, PatientRecord> {
        self.patients
            .entry(patient_id.to_string())
            .or_insert_with(init)
    }

    /// 获取或创建检查记录（原子），返回可变句柄
    pub fn upsert_study(
        &self,
        study_uid: &str,
        init: impl FnOnce() -> StudyRecord,
    ) -> RefMut<'_, String, StudyRecord> {
        self.studies.entry(study_uid.to_string()).or_insert_with(init)
    }

    /// 获取或创建系列记录（原子），返回可变句柄
    pub fn upsert_series(
        &self,
        series_uid: &str,
        init: impl FnOnce() -> SeriesRecord,
    ) -> RefMut<'_, String, SeriesRecord> {
        self.series.entry(series_uid.to_string()).or_insert_with(init)
    }

    /// 写入实例记录，同UID整体覆盖而非合并
    pub fn set_instance(&self, record: InstanceRecord) {
        self.instances
            .insert(record.sop_instance_uid.clone(), record);
    }

    /// 清空全部索引
    pub fn clear_all(&self) {
        self.patients.clear();
        self.studies.clear();
        self.series.clear();
        self.instances.clear();
    }

    // ========== 查找 ==========

    pub fn patient(&self, patient_id: &str) -> Option<PatientRecord> {
        self.patients.get(patient_id).map(|r| r.value().clone())
    }

    pub fn study(&self, study_uid: &str) -> Option<StudyRecord> {
        self.studies.get(study_uid).map(|r| r.value().clone())
    }

    pub fn series(&self, series_uid: &str) -> Option<SeriesRecord> {
        self.series.get(series_uid).map(|r| r.value().clone())
    }

    pub fn instance(&self, sop_uid: &str) -> Option<InstanceRecord> {
        self.instances.get(sop_uid).map(|r| r.value().clone())
    }

    /// 实例对应的文件路径
    pub fn instance_file_path(&self, sop_uid: &str) -> Option<PathBuf> {
        self.instances.get(sop_uid).map(|r| r.file_path.clone())
    }

    /// 系列的第一个实例文件路径（缩略图用）
    ///
    /// "第一个"按子UID集合的插入顺序取，是缩略图代表帧的约定。
    pub fn first_instance_file_path(&self, series_uid: &str) -> Option<PathBuf> {
        let first_uid = {
            let series = self.series.get(series_uid)?;
            series.instance_uids.first()?.clone()
        };
        self.instance_file_path(&first_uid)
    }

    // ========== 快照与投影 ==========

    pub(crate) fn patients_snapshot(&self) -> Vec<PatientRecord> {
        self.patients.iter().map(|r| r.value().clone()).collect()
    }

    pub(crate) fn studies_snapshot(&self) -> Vec<StudyRecord> {
        self.studies.iter().map(|r| r.value().clone()).collect()
    }

    /// 投影为StudyDto（实例总数需要跨系列统计）
    pub fn study_dto(&self, record: &StudyRecord) -> StudyDto {
        let instance_count = record
            .series_uids
            .iter()
            .filter_map(|uid| self.series.get(uid).map(|s| s.instance_uids.len()))
            .sum();
        StudyDto {
            study_instance_uid: record.study_instance_uid.clone(),
            patient_id: record.patient_id.clone(),
            patient_name: record.patient_name.clone(),
            study_date: record.study_date.clone(),
            study_time: record.study_time.clone(),
            study_description: record.study_description.clone(),
            accession_number: record.accession_number.clone(),
            referring_physician: record.referring_physician.clone(),
            modalities: record.modalities.join(", "),
            series_count: record.series_uids.len(),
            instance_count,
            folder_path: record.folder_path.clone(),
        }
    }

    // ========== 重建状态 ==========

    /// 尝试进入重建状态
    ///
    /// 非阻塞：已有重建在进行时返回false，调用方直接使用当前统计信息。
    pub fn try_begin_indexing(&self) -> bool {
        self.is_indexing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// 结束重建，记录完成时间
    pub fn finish_indexing(&self) {
        self.last_index_millis
            .store(Utc::now().timestamp_millis(), Ordering::SeqCst);
        self.is_indexing.store(false, Ordering::SeqCst);
    }

    fn last_index_time(&self) -> Option<DateTime<Utc>> {
        match self.last_index_millis.load(Ordering::SeqCst) {
            0 => None,
            millis => DateTime::<Utc>::from_timestamp_millis(millis),
        }
    }

    /// 索引统计信息
    pub fn statistics(&self) -> IndexStatistics {
        IndexStatistics {
            total_patients: self.patients.len(),
            total_studies: self.studies.len(),
            total_series: self.series.len(),
            total_instances: self.instances.len(),
            last_index_time: self.last_index_time(),
            storage_path: self.storage_root.display().to_string(),
            is_indexing: self.is_indexing.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_instance(sop_uid: &str, series_uid: &str, path: &str) -> InstanceRecord {
        InstanceRecord {
            sop_instance_uid: sop_uid.to_string(),
            series_instance_uid: series_uid.to_string(),
            study_instance_uid: "1.2.3".to_string(),
            instance_number: Some(1),
            sop_class_uid: None,
            file_path: PathBuf::from(path),
            rows: Some(512),
            columns: Some(512),
            number_of_frames: None,
            window_center: None,
            window_width: None,
            photometric_interpretation: None,
        }
    }

    #[test]
    fn test_set_instance_overwrites_same_uid() {
        let index = DicomIndex::new("/tmp/storage");

        index.set_instance(sample_instance("1.2.3.4.5", "1.2.3.4", "/data/a.dcm"));
        index.set_instance(sample_instance("1.2.3.4.5", "1.2.3.4", "/data/b.dcm"));

        // 重复索引不产生重复项，且保留第二次的字段值
        assert_eq!(index.statistics().total_instances, 1);
        assert_eq!(
            index.instance_file_path("1.2.3.4.5"),
            Some(PathBuf::from("/data/b.dcm"))
        );
    }

    #[test]
    fn test_upsert_keeps_first_seen_fields() {
        let index = DicomIndex::new("/tmp/storage");

        index.upsert_patient("P1", || PatientRecord {
            patient_id: "P1".to_string(),
            patient_name: "Zhang^San".to_string(),
            birth_date: None,
            sex: None,
            study_uids: Vec::new(),
            latest_study_date: None,
        });
        // 后续文件携带不同姓名时不回写
        index.upsert_patient("P1", || PatientRecord {
            patient_id: "P1".to_string(),
            patient_name: "Li^Si".to_string(),
            birth_date: None,
            sex: None,
            study_uids: Vec::new(),
            latest_study_date: None,
        });

        assert_eq!(index.patient("P1").unwrap().patient_name, "Zhang^San");
        assert_eq!(index.statistics().total_patients, 1);
    }

    #[test]
    fn test_first_instance_follows_insertion_order() {
        let index = DicomIndex::new("/tmp/storage");

        {
            let mut series = index.upsert_series("1.2.3.4", || SeriesRecord {
                series_instance_uid: "1.2.3.4".to_string(),
                study_instance_uid: "1.2.3".to_string(),
                series_number: Some("1".to_string()),
                series_description: None,
                modality: Some("CT".to_string()),
                body_part_examined: None,
                instance_uids: Vec::new(),
            });
            series.instance_uids.push("1.2.3.4.9".to_string());
            series.instance_uids.push("1.2.3.4.1".to_string());
        }
        index.set_instance(sample_instance("1.2.3.4.9", "1.2.3.4", "/data/first.dcm"));
        index.set_instance(sample_instance("1.2.3.4.1", "1.2.3.4", "/data/second.dcm"));

        // 取插入顺序的第一个，而非UID排序
        assert_eq!(
            index.first_instance_file_path("1.2.3.4"),
            Some(PathBuf::from("/data/first.dcm"))
        );
    }

    #[test]
    fn test_clear_all_empties_every_store() {
        let index = DicomIndex::new("/tmp/storage");
        index.set_instance(sample_instance("1.2.3.4.5", "1.2.3.4", "/data/a.dcm"));
        index.upsert_series("1.2.3.4", || SeriesRecord {
            series_instance_uid: "1.2.3.4".to_string(),
            study_instance_uid: "1.2.3".to_string(),
            series_number: None,
            series_description: None,
            modality: None,
            body_part_examined: None,
            instance_uids: Vec::new(),
        });

        index.clear_all();

        let stats = index.statistics();
        assert_eq!(stats.total_patients, 0);
        assert_eq!(stats.total_studies, 0);
        assert_eq!(stats.total_series, 0);
        assert_eq!(stats.total_instances, 0);
    }

    #[test]
    fn test_indexing_flag_single_flight() {
        let index = DicomIndex::new("/tmp/storage");

        assert!(index.try_begin_indexing());
        // 第二个并发请求不等待，直接失败
        assert!(!index.try_begin_indexing());
        assert!(index.statistics().is_indexing);

        index.finish_indexing();
        assert!(!index.statistics().is_indexing);
        assert!(index.statistics().last_index_time.is_some());
        assert!(index.try_begin_indexing());
        index.finish_indexing();
    }
}
