//! 服务器配置
//!
//! 加载顺序：内置默认值 → 可选配置文件 → MINIPACS环境变量。
//! 命令行参数最后覆盖个别字段。

use config::{Config, Environment, File};
use serde::Deserialize;

/// 服务器完整配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    pub server: ServerConfig,
    pub storage: StorageConfig,
}

/// 监听配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// DICOM存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// DICOM文件存储根目录
    pub root_path: String,
    /// 缩略图缓存目录
    pub thumbnail_cache_path: String,
    /// 默认缩略图尺寸（长边像素）
    pub thumbnail_size: u32,
}

impl ServerSettings {
    /// 加载配置
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let mut builder = Config::builder()
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 5180_i64)?
            .set_default("storage.root_path", "./data/dicom")?
            .set_default("storage.thumbnail_cache_path", "./data/thumbnails")?
            .set_default("storage.thumbnail_size", 128_i64)?;

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        let settings = builder
            .add_source(Environment::with_prefix("MINIPACS").separator("__"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// 应用命令行覆盖
    pub fn with_overrides(mut self, storage_dir: Option<String>, port: Option<u16>) -> Self {
        if let Some(dir) = storage_dir {
            self.storage.root_path = dir;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_config_file() {
        let settings = ServerSettings::load(None).unwrap();
        assert_eq!(settings.server.port, 5180);
        assert_eq!(settings.storage.thumbnail_size, 128);
        assert_eq!(settings.storage.root_path, "./data/dicom");
    }

    #[test]
    fn test_cli_overrides() {
        let settings = ServerSettings::load(None)
            .unwrap()
            .with_overrides(Some("/mnt/dicom".to_string()), Some(8080));
        assert_eq!(settings.storage.root_path, "/mnt/dicom");
        assert_eq!(settings.server.port, 8080);
    }
}
