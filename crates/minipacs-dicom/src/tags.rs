//! DICOM标签枚举
//!
//! 将文件内全部数据元素转为可展示的标签列表，供标签浏览接口使用。

use dicom::core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom::core::header::Header;
use dicom::core::value::Value;
use dicom::dictionary_std::{tags, StandardDataDictionary};
use dicom::object::mem::InMemElement;
use dicom::object::open_file;
use minipacs_core::models::DicomTagDto;
use minipacs_core::{PacsError, Result};
use std::path::Path;

/// 标签值展示长度上限
const MAX_VALUE_LEN: usize = 100;

/// 枚举DICOM文件的全部标签
pub fn enumerate_tags<P: AsRef<Path>>(path: P) -> Result<Vec<DicomTagDto>> {
    let obj = open_file(path.as_ref())
        .map_err(|e| PacsError::DicomParse(format!("无法打开DICOM文件: {}", e)))?;

    let dict = StandardDataDictionary;
    let mut out = Vec::new();
    for element in obj.iter() {
        let tag = element.tag();
        let name = dict
            .by_tag(tag)
            .map(|entry| entry.alias().to_string())
            .unwrap_or_else(|| "Unknown".to_string());
        out.push(DicomTagDto {
            tag: format!("({:04X},{:04X})", tag.group(), tag.element()),
            name,
            vr: format!("{:?}", element.vr()),
            value: value_preview(element),
        });
    }
    Ok(out)
}

/// 标签值预览：序列与像素数据用占位符，超长值截断
fn value_preview(element: &InMemElement) -> String {
    if element.tag() == tags::PIXEL_DATA {
        return "[Pixel Data]".to_string();
    }
    match element.value() {
        Value::Primitive(_) => {
            let text = element
                .to_str()
                .map(|v| v.to_string())
                .unwrap_or_default();
            truncate_value(text)
        }
        _ => "[Sequence]".to_string(),
    }
}

fn truncate_value(value: String) -> String {
    if value.chars().count() <= MAX_VALUE_LEN {
        return value;
    }
    let mut truncated: String = value.chars().take(MAX_VALUE_LEN).collect();
    truncated.push_str("...");
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_value() {
        assert_eq!(truncate_value("short".to_string()), "short");

        let long = "x".repeat(150);
        let truncated = truncate_value(long);
        assert_eq!(truncated.chars().count(), MAX_VALUE_LEN + 3);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_enumerate_tags_rejects_non_dicom() {
        let path = std::env::temp_dir().join(format!("minipacs-tags-{}.bin", std::process::id()));
        std::fs::write(&path, b"not dicom").unwrap();

        assert!(enumerate_tags(&path).is_err());

        std::fs::remove_file(&path).ok();
    }
}
