//! # Model Gateway
//!
//! 多租户 AI 推理网关入口：加载环境配置、初始化日志后启动服务。

use model_gateway::config::AppConfig;

#[tokio::main]
async fn main() -> model_gateway::Result<()> {
    model_gateway::logging::init_logging(None);

    let config = AppConfig::from_env();
    model_gateway::app::run(config).await
}
