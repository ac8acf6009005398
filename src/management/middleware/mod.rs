//! # 管理端中间件

pub mod auth;
