//! # 路由配置
//!
//! 管理端全部 API 路由；除登录与 ping 外都挂认证中间件。

use crate::app::AppState;
use crate::management::handlers;
use crate::management::middleware::auth::auth;
use axum::Router;
use axum::middleware;
use axum::routing::{get, post, put};

/// 创建管理端路由
pub fn management_routes(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/ping", get(handlers::system::ping_handler))
        .route("/auth/login", post(handlers::auth::login));

    let protected_routes = Router::new()
        // 探测控制
        .route(
            "/detect",
            post(handlers::detect::trigger_detection)
                .delete(handlers::detect::stop_detection)
                .get(handlers::detect::detection_status),
        )
        // 进度订阅
        .route("/sse/progress", get(handlers::detect::progress_stream))
        // 调度配置
        .route(
            "/scheduler/config",
            get(handlers::scheduler::get_config).put(handlers::scheduler::update_config),
        )
        // 渠道管理
        .route(
            "/channels",
            get(handlers::channels::list_channels).post(handlers::channels::create_channel),
        )
        .route("/channels/export", get(handlers::channels::export_channels))
        .route("/channels/import", post(handlers::channels::import_channels))
        .route(
            "/channels/{id}",
            put(handlers::channels::update_channel).delete(handlers::channels::delete_channel),
        )
        .route("/channels/{id}/sync", post(handlers::channels::sync_channel))
        // 代理密钥管理
        .route(
            "/proxy-keys",
            get(handlers::proxy_keys::list_keys).post(handlers::proxy_keys::create_key),
        )
        .route(
            "/proxy-keys/{id}",
            put(handlers::proxy_keys::update_key).delete(handlers::proxy_keys::delete_key),
        )
        .route(
            "/proxy-keys/{id}/regenerate",
            post(handlers::proxy_keys::regenerate_key),
        )
        .layer(middleware::from_fn_with_state(state, auth));

    Router::new().merge(public_routes).merge(protected_routes)
}
