//! # 管理端模块
//!
//! 控制 API：探测触发/停止/进度、调度配置、渠道与代理密钥管理

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

pub use routes::management_routes;
