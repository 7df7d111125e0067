//! DICOM元数据提取器
//!
//! 打开单个文件并提取索引所需的结构化标识符与图像属性。

use dicom::core::Tag;
use dicom::dictionary_std::tags;
use dicom::object::{open_file, DefaultDicomObject};
use minipacs_core::{PacsError, Result};
use std::path::Path;
use tracing::debug;

/// DICOM元数据提取器
#[derive(Debug, Clone, Copy, Default)]
pub struct DicomExtractor;

impl DicomExtractor {
    /// 创建新的提取器
    pub fn new() -> Self {
        Self
    }

    /// 提取单个DICOM文件的元数据
    pub fn extract<P: AsRef<Path>>(&self, path: P) -> Result<DicomMetadata> {
        let path = path.as_ref();
        let obj = open_file(path).map_err(|e| {
            debug!("DICOM文件解析失败 {}: {}", path.display(), e);
            PacsError::DicomParse(format!("无法解析DICOM文件: {}", e))
        })?;

        Ok(DicomMetadata {
            patient_id: get_string(&obj, tags::PATIENT_ID),
            patient_name: get_string(&obj, tags::PATIENT_NAME),
            patient_birth_date: get_string(&obj, tags::PATIENT_BIRTH_DATE),
            patient_sex: get_string(&obj, tags::PATIENT_SEX),
            study_instance_uid: get_string(&obj, tags::STUDY_INSTANCE_UID),
            study_date: get_string(&obj, tags::STUDY_DATE),
            study_time: get_string(&obj, tags::STUDY_TIME),
            study_description: get_string(&obj, tags::STUDY_DESCRIPTION),
            accession_number: get_string(&obj, tags::ACCESSION_NUMBER),
            referring_physician: get_string(&obj, tags::REFERRING_PHYSICIAN_NAME),
            series_instance_uid: get_string(&obj, tags::SERIES_INSTANCE_UID),
            series_number: get_string(&obj, tags::SERIES_NUMBER),
            series_description: get_string(&obj, tags::SERIES_DESCRIPTION),
            modality: get_string(&obj, tags::MODALITY),
            body_part_examined: get_string(&obj, tags::BODY_PART_EXAMINED),
            sop_instance_uid: get_string(&obj, tags::SOP_INSTANCE_UID),
            sop_class_uid: get_string(&obj, tags::SOP_CLASS_UID),
            instance_number: get_int(&obj, tags::INSTANCE_NUMBER),
            rows: get_int(&obj, tags::ROWS),
            columns: get_int(&obj, tags::COLUMNS),
            number_of_frames: get_int(&obj, tags::NUMBER_OF_FRAMES),
            window_center: get_f64(&obj, tags::WINDOW_CENTER),
            window_width: get_f64(&obj, tags::WINDOW_WIDTH),
            photometric_interpretation: get_string(&obj, tags::PHOTOMETRIC_INTERPRETATION),
        })
    }

    /// 读取实例帧数
    ///
    /// 无像素数据时为0，否则至少为1（NumberOfFrames缺省按单帧处理）。
    pub fn frame_count<P: AsRef<Path>>(&self, path: P) -> Result<u32> {
        let obj = open_file(path.as_ref())
            .map_err(|e| PacsError::DicomParse(format!("无法解析DICOM文件: {}", e)))?;

        if obj.element(tags::PIXEL_DATA).is_err() {
            return Ok(0);
        }

        let frames = get_int(&obj, tags::NUMBER_OF_FRAMES).unwrap_or(1);
        Ok(frames.max(1) as u32)
    }
}

/// 提取后的DICOM元数据
#[derive(Debug, Clone, Default)]
pub struct DicomMetadata {
    // === 患者信息 ===
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,

    // === 检查信息 ===
    pub study_instance_uid: Option<String>,
    pub study_date: Option<String>,
    pub study_time: Option<String>,
    pub study_description: Option<String>,
    pub accession_number: Option<String>,
    pub referring_physician: Option<String>,

    // === 系列信息 ===
    pub series_instance_uid: Option<String>,
    pub series_number: Option<String>,
    pub series_description: Option<String>,
    pub modality: Option<String>,
    pub body_part_examined: Option<String>,

    // === 实例信息 ===
    pub sop_instance_uid: Option<String>,
    pub sop_class_uid: Option<String>,
    pub instance_number: Option<i32>,

    // === 图像信息 ===
    pub rows: Option<i32>,
    pub columns: Option<i32>,
    pub number_of_frames: Option<i32>,
    pub window_center: Option<f64>,
    pub window_width: Option<f64>,
    pub photometric_interpretation: Option<String>,
}

impl DicomMetadata {
    /// 索引所需的三个UID是否齐全
    pub fn has_required_uids(&self) -> bool {
        self.study_instance_uid.is_some()
            && self.series_instance_uid.is_some()
            && self.sop_instance_uid.is_some()
    }
}

/// 获取字符串类型元素的值，空白视为缺失
fn get_string(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// 获取整数类型元素的值（兼容IS整数字符串）
fn get_int(obj: &DefaultDicomObject, tag: Tag) -> Option<i32> {
    obj.element(tag).ok().and_then(|e| e.to_int::<i32>().ok())
}

/// 获取浮点类型元素的值（多值时取第一个，兼容DS字符串）
fn get_f64(obj: &DefaultDicomObject, tag: Tag) -> Option<f64> {
    obj.element(tag)
        .ok()
        .and_then(|e| e.to_multi_float64().ok())
        .and_then(|values| values.first().copied())
}
