//! 核心数据模型定义
//!
//! 索引内部记录 (Record) 与对外 DTO 分离：记录持有层级关系与子UID集合，
//! DTO 面向 JSON API 输出（camelCase）。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ========== 索引内部记录 ==========

/// 患者记录
#[derive(Debug, Clone)]
pub struct PatientRecord {
    pub patient_id: String,
    pub patient_name: String,
    pub birth_date: Option<String>, // DICOM日期字符串 (YYYYMMDD)
    pub sex: Option<String>,
    /// 所属检查UID，按插入顺序去重保存
    pub study_uids: Vec<String>,
    pub latest_study_date: Option<NaiveDate>,
}

/// 检查记录
#[derive(Debug, Clone)]
pub struct StudyRecord {
    pub study_instance_uid: String,
    pub patient_id: String,
    /// 首见快照，后续文件不回写
    pub patient_name: String,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub study_description: Option<String>,
    pub accession_number: Option<String>,
    pub referring_physician: Option<String>,
    /// 该检查下出现过的所有不同模态，只增不减
    pub modalities: Vec<String>,
    pub series_uids: Vec<String>,
    pub folder_path: Option<String>,
}

/// 系列记录
#[derive(Debug, Clone)]
pub struct SeriesRecord {
    pub series_instance_uid: String,
    pub study_instance_uid: String,
    pub series_number: Option<String>,
    pub series_description: Option<String>,
    pub modality: Option<String>,
    pub body_part_examined: Option<String>,
    pub instance_uids: Vec<String>,
}

/// 影像实例记录
#[derive(Debug, Clone)]
pub struct InstanceRecord {
    pub sop_instance_uid: String,
    pub series_instance_uid: String,
    pub study_instance_uid: String,
    pub instance_number: Option<i32>,
    pub sop_class_uid: Option<String>,
    pub file_path: PathBuf,
    pub rows: Option<i32>,
    pub columns: Option<i32>,
    pub number_of_frames: Option<i32>,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub photometric_interpretation: Option<String>,
}

// ========== API DTO ==========

/// 患者信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientDto {
    pub patient_id: String,
    pub patient_name: String,
    pub birth_date: Option<String>,
    pub sex: Option<String>,
    pub study_count: usize,
    pub latest_study_date: Option<NaiveDate>,
}

impl From<&PatientRecord> for PatientDto {
    fn from(record: &PatientRecord) -> Self {
        Self {
            patient_id: record.patient_id.clone(),
            patient_name: record.patient_name.clone(),
            birth_date: record.birth_date.clone(),
            sex: record.sex.clone(),
            study_count: record.study_uids.len(),
            latest_study_date: record.latest_study_date,
        }
    }
}

/// 检查信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyDto {
    pub study_instance_uid: String,
    pub patient_id: String,
    pub patient_name: String,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub study_description: Option<String>,
    pub accession_number: Option<String>,
    pub referring_physician: Option<String>,
    /// 逗号连接的模态列表，如 "CT, MR"
    pub modalities: String,
    pub series_count: usize,
    pub instance_count: usize,
    pub folder_path: Option<String>,
}

/// 系列信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesDto {
    pub series_instance_uid: String,
    pub study_instance_uid: String,
    pub series_number: Option<String>,
    pub series_description: Option<String>,
    pub modality: Option<String>,
    pub body_part_examined: Option<String>,
    pub instance_count: usize,
    pub thumbnail_url: String,
}

impl From<&SeriesRecord> for SeriesDto {
    fn from(record: &SeriesRecord) -> Self {
        Self {
            series_instance_uid: record.series_instance_uid.clone(),
            study_instance_uid: record.study_instance_uid.clone(),
            series_number: record.series_number.clone(),
            series_description: record.series_description.clone(),
            modality: record.modality.clone(),
            body_part_examined: record.body_part_examined.clone(),
            instance_count: record.instance_uids.len(),
            thumbnail_url: format!("/api/wado/thumbnail/{}", record.series_instance_uid),
        }
    }
}

/// 实例信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceDto {
    pub sop_instance_uid: String,
    pub series_instance_uid: String,
    pub study_instance_uid: String,
    pub instance_number: Option<i32>,
    pub sop_class_uid: Option<String>,
    pub file_path: String,
    pub rows: Option<i32>,
    pub columns: Option<i32>,
    pub number_of_frames: Option<i32>,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub photometric_interpretation: Option<String>,
}

impl From<&InstanceRecord> for InstanceDto {
    fn from(record: &InstanceRecord) -> Self {
        Self {
            sop_instance_uid: record.sop_instance_uid.clone(),
            series_instance_uid: record.series_instance_uid.clone(),
            study_instance_uid: record.study_instance_uid.clone(),
            instance_number: record.instance_number,
            sop_class_uid: record.sop_class_uid.clone(),
            file_path: record.file_path.display().to_string(),
            rows: record.rows,
            columns: record.columns,
            number_of_frames: record.number_of_frames,
            window_center: record.window_center,
            window_width: record.window_width,
            photometric_interpretation: record.photometric_interpretation.clone(),
        }
    }
}

/// DICOM标签信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DicomTagDto {
    /// 形如 "(0010,0020)"
    pub tag: String,
    pub name: String,
    pub vr: String,
    pub value: String,
}

/// 索引统计信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatistics {
    pub total_patients: usize,
    pub total_studies: usize,
    pub total_series: usize,
    pub total_instances: usize,
    pub last_index_time: Option<DateTime<Utc>>,
    pub storage_path: String,
    pub is_indexing: bool,
}

// ========== API 响应包装 ==========

/// 统一API响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            message: None,
            data: Some(data),
        }
    }

    pub fn ok_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

/// 分页响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub total_count: usize,
    pub page_index: usize,
    pub page_size: usize,
    pub total_pages: usize,
}

impl<T> PagedResponse<T> {
    /// 创建分页响应，总页数向上取整
    pub fn new(items: Vec<T>, total_count: usize, page_index: usize, page_size: usize) -> Self {
        let total_pages = if page_size == 0 {
            0
        } else {
            total_count.div_ceil(page_size)
        };
        Self {
            items,
            total_count,
            page_index,
            page_size,
            total_pages,
        }
    }
}

/// 列表查询参数
#[derive(Debug, Clone, Default)]
pub struct QueryParameters {
    pub page_index: usize,
    /// 调用方负责限制在 [1,100]
    pub page_size: usize,
    pub search_term: Option<String>,
    pub sort_by: Option<String>,
    pub sort_descending: bool,
}
