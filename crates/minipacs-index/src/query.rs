//! 查询引擎
//!
//! 对索引内容做过滤、排序与分页，以及父子层级的列表展开。
//! 排序键不在已知集合内时回落到默认键；并列项的相对顺序不做保证。

use crate::index::DicomIndex;
use minipacs_core::models::*;

impl DicomIndex {
    /// 分页查询患者列表
    ///
    /// 搜索字段：患者ID、姓名。排序键：name、date（默认date倒序）。
    pub fn query_patients(&self, query: &QueryParameters) -> PagedResponse<PatientDto> {
        let mut patients = self.patients_snapshot();

        if let Some(term) = normalized_term(&query.search_term) {
            patients.retain(|p| {
                contains_ci(&p.patient_id, &term) || contains_ci(&p.patient_name, &term)
            });
        }

        let key = query.sort_by.as_deref().map(str::to_lowercase);
        match (key.as_deref(), query.sort_descending) {
            (Some("name"), false) => patients.sort_by(|a, b| a.patient_name.cmp(&b.patient_name)),
            (Some("name"), true) => patients.sort_by(|a, b| b.patient_name.cmp(&a.patient_name)),
            (Some("date"), false) => {
                patients.sort_by(|a, b| a.latest_study_date.cmp(&b.latest_study_date))
            }
            (Some("date"), true) => {
                patients.sort_by(|a, b| b.latest_study_date.cmp(&a.latest_study_date))
            }
            // 未识别的排序键：最近检查日期倒序
            _ => patients.sort_by(|a, b| b.latest_study_date.cmp(&a.latest_study_date)),
        }

        let total_count = patients.len();
        let items = page_slice(patients, query)
            .iter()
            .map(PatientDto::from)
            .collect();
        PagedResponse::new(items, total_count, query.page_index, query.page_size)
    }

    /// 分页查询检查列表
    ///
    /// 搜索字段：患者ID、姓名、检查描述、检查号。
    /// 排序键：patient、description、date（默认date）。
    pub fn query_studies(&self, query: &QueryParameters) -> PagedResponse<StudyDto> {
        let mut studies = self.studies_snapshot();

        if let Some(term) = normalized_term(&query.search_term) {
            studies.retain(|s| {
                contains_ci(&s.patient_id, &term)
                    || contains_ci(&s.patient_name, &term)
                    || opt_contains_ci(&s.study_description, &term)
                    || opt_contains_ci(&s.accession_number, &term)
            });
        }

        let key = query.sort_by.as_deref().map(str::to_lowercase);
        match (key.as_deref(), query.sort_descending) {
            (Some("patient"), false) => studies.sort_by(|a, b| a.patient_name.cmp(&b.patient_name)),
            (Some("patient"), true) => studies.sort_by(|a, b| b.patient_name.cmp(&a.patient_name)),
            (Some("description"), false) => {
                studies.sort_by(|a, b| a.study_description.cmp(&b.study_description))
            }
            (Some("description"), true) => {
                studies.sort_by(|a, b| b.study_description.cmp(&a.study_description))
            }
            (_, false) => studies.sort_by(|a, b| a.study_date.cmp(&b.study_date)),
            (_, true) => studies.sort_by(|a, b| b.study_date.cmp(&a.study_date)),
        }

        let total_count = studies.len();
        let items = page_slice(studies, query)
            .iter()
            .map(|s| self.study_dto(s))
            .collect();
        PagedResponse::new(items, total_count, query.page_index, query.page_size)
    }

    /// 患者的检查列表（按检查日期倒序）
    ///
    /// 子UID对应的记录暂时缺失时直接丢弃，不报错。
    pub fn studies_by_patient(&self, patient_id: &str) -> Vec<StudyDto> {
        let Some(patient) = self.patient(patient_id) else {
            return Vec::new();
        };
        let mut studies: Vec<StudyRecord> = patient
            .study_uids
            .iter()
            .filter_map(|uid| self.study(uid))
            .collect();
        studies.sort_by(|a, b| b.study_date.cmp(&a.study_date));
        studies.iter().map(|s| self.study_dto(s)).collect()
    }

    /// 检查的系列列表（按系列号升序）
    pub fn series_by_study(&self, study_uid: &str) -> Vec<SeriesDto> {
        let Some(study) = self.study(study_uid) else {
            return Vec::new();
        };
        let mut series: Vec<SeriesRecord> = study
            .series_uids
            .iter()
            .filter_map(|uid| self.series(uid))
            .collect();
        series.sort_by_key(|s| series_number_key(s.series_number.as_deref()));
        series.iter().map(SeriesDto::from).collect()
    }

    /// 系列的实例列表（按实例号升序）
    pub fn instances_by_series(&self, series_uid: &str) -> Vec<InstanceDto> {
        let Some(series) = self.series(series_uid) else {
            return Vec::new();
        };
        let mut instances: Vec<InstanceRecord> = series
            .instance_uids
            .iter()
            .filter_map(|uid| self.instance(uid))
            .collect();
        instances.sort_by_key(|i| i.instance_number);
        instances.iter().map(InstanceDto::from).collect()
    }
}

/// 系列号的自然排序键：数字优先，无法解析的排在最后
fn series_number_key(series_number: Option<&str>) -> (bool, i32) {
    match series_number.and_then(|n| n.trim().parse::<i32>().ok()) {
        Some(n) => (false, n),
        None => (true, 0),
    }
}

fn normalized_term(term: &Option<String>) -> Option<String> {
    term.as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

fn opt_contains_ci(haystack: &Option<String>, needle_lower: &str) -> bool {
    haystack
        .as_deref()
        .map(|h| contains_ci(h, needle_lower))
        .unwrap_or(false)
}

fn page_slice<T>(items: Vec<T>, query: &QueryParameters) -> Vec<T> {
    items
        .into_iter()
        .skip(query.page_index.saturating_mul(query.page_size))
        .take(query.page_size)
        .collect()
}
