//! 磁盘缩略图缓存
//!
//! 以 (种类, 实体ID, 尺寸) 为键映射到确定的缓存文件名。
//! 写入通过有界队列由独立任务落盘，失败只记录日志，不影响已返回的响应；
//! 同键并发未命中可能各自渲染并写入同一文件，渲染是确定性的，后写为准。

use minipacs_core::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 落盘队列容量，超出时放弃本次写入（下次未命中重新渲染即可）
const WRITE_QUEUE_CAPACITY: usize = 64;

/// 缩略图实体种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbnailKind {
    Series,
    Instance,
}

/// 待落盘的缓存条目
struct PendingWrite {
    path: PathBuf,
    bytes: Vec<u8>,
}

/// 缩略图缓存
pub struct ThumbnailCache {
    cache_dir: PathBuf,
    default_size: u32,
    writer: mpsc::Sender<PendingWrite>,
}

impl ThumbnailCache {
    /// 创建缓存目录并启动落盘任务
    pub fn new(cache_dir: impl Into<PathBuf>, default_size: u32) -> Result<Self> {
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;

        let (writer, mut rx) = mpsc::channel::<PendingWrite>(WRITE_QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(write) = rx.recv().await {
                if let Err(e) = tokio::fs::write(&write.path, &write.bytes).await {
                    warn!("缩略图缓存写入失败 {}: {}", write.path.display(), e);
                }
            }
        });

        Ok(Self {
            cache_dir,
            default_size,
            writer,
        })
    }

    pub fn default_size(&self) -> u32 {
        self.default_size
    }

    /// 缓存文件名：系列 {uid}_{size}.jpg，实例 inst_{uid}_{size}.jpg
    fn cache_path(&self, kind: ThumbnailKind, id: &str, size: u32) -> PathBuf {
        let name = match kind {
            ThumbnailKind::Series => format!("{}_{}.jpg", id, size),
            ThumbnailKind::Instance => format!("inst_{}_{}.jpg", id, size),
        };
        self.cache_dir.join(name)
    }

    /// 读缓存，未命中返回None
    pub async fn read(&self, kind: ThumbnailKind, id: &str, size: u32) -> Option<Vec<u8>> {
        let path = self.cache_path(kind, id, size);
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                debug!("缩略图缓存命中: {}", path.display());
                Some(bytes)
            }
            Err(_) => None,
        }
    }

    /// 提交落盘（不阻塞响应路径；队列满时放弃本次写入）
    pub fn persist(&self, kind: ThumbnailKind, id: &str, size: u32, bytes: Vec<u8>) {
        let path = self.cache_path(kind, id, size);
        if self.writer.try_send(PendingWrite { path, bytes }).is_err() {
            debug!("缩略图写入队列已满，放弃本次缓存写入");
        }
    }

    /// 清空缓存目录（尽力而为，单个删除失败只记录日志）
    pub async fn clear(&self) {
        let mut dir = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(e) => {
                warn!("读取缓存目录失败 {}: {}", self.cache_dir.display(), e);
                return;
            }
        };

        while let Ok(Some(entry)) = dir.next_entry().await {
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                warn!("删除缓存文件失败 {}: {}", entry.path().display(), e);
            }
        }
        info!("缩略图缓存已清除");
    }
}
