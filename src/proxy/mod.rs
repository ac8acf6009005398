//! # 代理转发模块
//!
//! 协议保持的请求转发：统一出站传输、路由与各协议处理器

pub mod handlers;
pub mod router;
pub mod transport;

pub use handlers::proxy_routes;
pub use router::ProxyRouter;
pub use transport::ProxyFetchClient;
