//! # 认证模块
//!
//! 管理端 JWT 与网关边界的代理密钥/权限服务

pub mod jwt;
pub mod proxy_key;

pub use jwt::{AdminClaims, JwtManager};
pub use proxy_key::{KeyPrincipal, ProxyKeyService};
