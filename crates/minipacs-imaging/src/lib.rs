//! # MiniPACS Imaging
//!
//! 图像服务：渲染、缩略图缓存与原始文件读取。
//! UID到文件路径的解析依赖层级索引，渲染与编码委托给 minipacs-dicom。

pub mod service;
pub mod thumbnail;

pub use service::{ImageService, DEFAULT_JPEG_QUALITY};
pub use thumbnail::{ThumbnailCache, ThumbnailKind};
