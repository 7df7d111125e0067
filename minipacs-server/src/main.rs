//! MiniPACS服务器主程序

use clap::Parser;
use minipacs_imaging::{ImageService, ThumbnailCache};
use minipacs_index::{DicomIndex, IndexScanner};
use minipacs_web::{AppState, WebServer};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod config;
use config::ServerSettings;

/// MiniPACS服务器命令行参数
#[derive(Parser, Debug)]
#[command(name = "minipacs-server")]
#[command(about = "MiniPACS 轻量级医学影像索引与查看服务")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// DICOM文件存储目录（覆盖配置文件）
    #[arg(short, long)]
    storage_dir: Option<String>,

    /// 监听端口（覆盖配置文件）
    #[arg(short, long)]
    port: Option<u16>,

    /// 日志级别
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(args.log_level.as_str())
        .init();

    let settings = ServerSettings::load(args.config.as_deref())?
        .with_overrides(args.storage_dir, args.port);

    info!("MiniPACS服务器配置:");
    info!("  监听地址: {}:{}", settings.server.host, settings.server.port);
    info!("  存储目录: {}", settings.storage.root_path);
    info!("  缩略图缓存: {}", settings.storage.thumbnail_cache_path);

    let index = Arc::new(DicomIndex::new(&settings.storage.root_path));
    let scanner = Arc::new(IndexScanner::new(index.clone()));
    let cache = ThumbnailCache::new(
        &settings.storage.thumbnail_cache_path,
        settings.storage.thumbnail_size,
    )?;
    let images = Arc::new(ImageService::new(index.clone(), cache));
    let cancel = CancellationToken::new();

    let state = Arc::new(AppState {
        index,
        scanner: scanner.clone(),
        images,
        cancel: cancel.clone(),
    });

    // 启动后延迟自动重建索引
    {
        let scanner = scanner.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            let stats = scanner.rebuild(&cancel).await;
            info!(
                "启动索引完成: {} 患者 / {} 检查 / {} 系列 / {} 实例",
                stats.total_patients, stats.total_studies, stats.total_series, stats.total_instances
            );
        });
    }

    // Ctrl-C触发优雅停机，并取消进行中的重建
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("收到停止信号，开始优雅停机");
                cancel.cancel();
            }
        });
    }

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    let server = WebServer::new(addr, state);
    if let Err(e) = server.run(cancel).await {
        error!("服务器运行失败: {}", e);
        return Err(e.into());
    }

    Ok(())
}
