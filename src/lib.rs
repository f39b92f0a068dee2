//! 票务/报名平台盈亏平衡分析引擎与 HTTP 服务

pub mod api;
pub mod error;
pub mod logic;
pub mod models;

use chrono::Local;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use std::sync::{Arc, atomic::AtomicU64};

use crate::logic::BreakEvenCalculator;
use crate::models::{AppConfig, BreakEvenResponse, CacheKey};

pub use crate::error::{EngineError, EngineResult};
pub use crate::logic::compute;

pub struct SystemMetrics {
    pub total_calculations: AtomicU64,
    pub cache_hits: AtomicU64,
    pub rejected_requests: AtomicU64,
    pub start_time: i64,
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub calculator: BreakEvenCalculator,
    pub result_cache: Arc<RwLock<FxHashMap<CacheKey, BreakEvenResponse>>>,
    pub metrics: Arc<SystemMetrics>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            calculator: BreakEvenCalculator::from_config(&config),
            config: Arc::new(config),
            result_cache: Arc::new(RwLock::new(FxHashMap::default())),
            metrics: Arc::new(SystemMetrics {
                total_calculations: AtomicU64::new(0),
                cache_hits: AtomicU64::new(0),
                rejected_requests: AtomicU64::new(0),
                start_time: Local::now().timestamp(),
            }),
        }
    }
}
