//! # MiniPACS Index
//!
//! DICOM存储树的内存层级索引：四级实体存储、扫描重建与列表查询。
//! 索引是易失的，随服务启动从源文件重建。

pub mod index;
pub mod query;
pub mod scanner;

pub use index::DicomIndex;
pub use scanner::IndexScanner;
