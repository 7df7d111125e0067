//! 错误定义模块

use thiserror::Error;

/// MiniPACS系统统一错误类型
#[derive(Error, Debug)]
pub enum PacsError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("DICOM解析错误: {0}")]
    DicomParse(String),

    #[error("图像渲染错误: {0}")]
    Render(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("缓存写入错误: {0}")]
    CacheWrite(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

/// MiniPACS系统统一结果类型
pub type Result<T> = std::result::Result<T, PacsError>;
