//! # MiniPACS DICOM
//!
//! 封装 dicom-rs 的元数据提取、标签枚举与像素渲染功能。
//! 索引和图像服务只通过本模块访问DICOM文件。

pub mod extractor;
pub mod render;
pub mod tags;

pub use dicom_pixeldata::image;
pub use extractor::{DicomExtractor, DicomMetadata};
pub use render::{DicomRenderer, WindowParams};
