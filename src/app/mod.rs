//! # 应用装配模块
//!
//! 组装共享状态、启动后台任务（工作池、进度转发、调度器）并
//! 拉起 HTTP 服务。

mod context;

pub use context::AppState;

use crate::auth::{JwtManager, ProxyKeyService};
use crate::cache::CacheClient;
use crate::config::AppConfig;
use crate::database;
use crate::detection::progress::ProgressBus;
use crate::detection::queue::JobQueue;
use crate::detection::semaphore::DetectionSemaphores;
use crate::detection::service::DetectionService;
use crate::detection::worker::WorkerPool;
use crate::detection::DetectionSettings;
use crate::error::{GatewayError, Result};
use crate::logging::{LogComponent, LogStage};
use crate::management::management_routes;
use crate::proxy::router::ProxyRouter;
use crate::proxy::transport::ProxyFetchClient;
use crate::proxy::proxy_routes;
use crate::scheduler::SchedulerManager;
use crate::linfo;
use axum::Router;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// 启动网关：装配依赖、启动后台任务、阻塞在 HTTP 服务上
pub async fn run(config: AppConfig) -> Result<()> {
    let config = Arc::new(config);

    let db = database::init_database(&config.database.url).await?;
    database::run_migrations(&db).await?;

    let cache = CacheClient::new(&config.redis.url).await?;
    let transport = ProxyFetchClient::new(config.proxy.global_proxy.clone());

    // 探测引擎
    let queue = JobQueue::new(cache.clone());
    let semaphores = DetectionSemaphores::new(cache.clone());
    let progress = ProgressBus::new(cache.clone());
    let _forwarder = progress.spawn_forwarder();

    let settings = Arc::new(RwLock::new(DetectionSettings {
        channel_concurrency: config.detection.channel_concurrency,
        global_concurrency: config.detection.max_global_concurrency,
        min_delay_ms: config.detection.min_delay_ms,
        max_delay_ms: config.detection.max_delay_ms,
    }));

    let workers = WorkerPool::new(
        queue.clone(),
        semaphores.clone(),
        progress.clone(),
        Arc::clone(&transport),
        db.clone(),
        Arc::clone(&settings),
        cache.clone(),
        config.detection.detect_prompt.clone(),
    );
    workers.spawn();

    let detection = DetectionService::new(
        db.clone(),
        queue,
        semaphores,
        Arc::clone(&transport),
        workers,
        cache.clone(),
    );

    // 调度控制平面
    let scheduler = SchedulerManager::new(
        db.clone(),
        Arc::clone(&detection),
        settings,
        config.detection.clone(),
    );
    scheduler.start().await?;

    // 转发面
    let router = Arc::new(ProxyRouter::new(db.clone()));
    let proxy_keys = Arc::new(ProxyKeyService::new(
        db.clone(),
        config.proxy.proxy_api_key.clone(),
    ));
    let jwt = Arc::new(JwtManager::new(
        &config.admin.jwt_secret,
        config.admin.jwt_expires_in,
    ));

    let state = AppState {
        db,
        config: Arc::clone(&config),
        cache,
        transport,
        router,
        proxy_keys,
        jwt,
        detection,
        scheduler: Arc::clone(&scheduler),
        progress,
    };

    let app = Router::new()
        .merge(proxy_routes())
        .nest("/api", management_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| GatewayError::internal_with_source(format!("监听 {addr} 失败"), e))?;

    linfo!(
        "system",
        LogStage::Startup,
        LogComponent::Main,
        "server_started",
        &format!("网关已启动: http://{addr}")
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| GatewayError::internal_with_source("HTTP 服务异常退出", e))?;

    scheduler.shutdown().await;
    linfo!(
        "system",
        LogStage::Shutdown,
        LogComponent::Main,
        "server_stopped",
        "网关已退出"
    );
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
