use break_even_core::{api, models::AppConfig, AppState};
use std::{env, fs, io, net::SocketAddr, sync::atomic::Ordering};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// --- 核心常量 ---
const CONFIG_ENV: &str = "BREAK_EVEN_CONFIG";
const DEFAULT_CONFIG_FILE: &str = "config.json";

// =========================================================================
// 1. 配置加载 (只读，不持久化用户输入)
// =========================================================================

struct Storage;
impl Storage {
    fn load<T: serde::de::DeserializeOwned>(file: &str) -> Option<T> {
        let data = fs::read(file).ok()?;
        match serde_json::from_slice(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("⚠️ 配置文件 {} 解析失败: {}", file, e);
                None
            }
        }
    }
}

fn load_config() -> AppConfig {
    let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
    Storage::load::<AppConfig>(&path).unwrap_or_else(|| {
        info!("📄 未找到可用配置 ({})，使用默认配置", path);
        AppConfig::default()
    })
}

// =========================================================================
// 2. 入口与生命周期
// =========================================================================

#[tokio::main]
async fn main() -> io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    info!("🚀 Break-Even Core v1.0 启动中...");

    let config = load_config();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let state = AppState::new(config);
    let app = api::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("✨ API 节点已上线: {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!(
        "👋 服务已退出 (累计计算 {} 次)",
        state.metrics.total_calculations.load(Ordering::Relaxed)
    );
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
