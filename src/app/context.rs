//! # 应用共享状态
//!
//! 所有 HTTP 处理器共享的服务句柄集合

use crate::auth::{JwtManager, ProxyKeyService};
use crate::cache::CacheClient;
use crate::config::AppConfig;
use crate::detection::progress::ProgressBus;
use crate::detection::service::DetectionService;
use crate::proxy::router::ProxyRouter;
use crate::proxy::transport::ProxyFetchClient;
use crate::scheduler::SchedulerManager;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// 应用共享状态
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub config: Arc<AppConfig>,
    pub cache: CacheClient,
    pub transport: Arc<ProxyFetchClient>,
    pub router: Arc<ProxyRouter>,
    pub proxy_keys: Arc<ProxyKeyService>,
    pub jwt: Arc<JwtManager>,
    pub detection: Arc<DetectionService>,
    pub scheduler: Arc<SchedulerManager>,
    pub progress: ProgressBus,
}
