mod api;
mod application;
mod domain;
mod infrastructure;
mod ports;

use api::AppState;
use application::PaymentGatewayService;
use infrastructure::{GatewayHttpConfig, HttpGatewayAdapter, MySqlPaymentRepository};
use sqlx::MySqlPool;
use std::sync::Arc;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    // 加载环境变量
    dotenvy::dotenv().ok();

    info!("Starting Payment Gateway Service...");

    // 创建数据库连接池
    let database_url = std::env::var("DATABASE_URL")
        .expect("DATABASE_URL must be set");
    info!("Connecting to database...");

    let pool = MySqlPool::connect(&database_url).await?;
    info!("Database connected successfully");

    // 初始化网关配置
    let gateway_config = GatewayHttpConfig::from_env();
    info!("Gateway configuration loaded: {}", gateway_config.gateway_id);

    // 创建网关适配器
    let gateway_adapter = Arc::new(HttpGatewayAdapter::new(gateway_config));

    // 创建仓储
    let repository = Arc::new(MySqlPaymentRepository::new(Arc::new(pool)));

    // 创建编排服务并注册网关
    let mut gateway_service = PaymentGatewayService::new(repository);
    gateway_service.register_gateway(gateway_adapter);
    let gateway_service = Arc::new(gateway_service);

    // 创建应用状态
    let app_state = AppState { gateway_service };

    // 创建路由
    let app = api::create_router(app_state);

    // 启动服务器
    let host = std::env::var("SERVER_HOST")
        .unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("SERVER_PORT")
        .unwrap_or_else(|_| "3000".to_string());
    let addr = format!("{}:{}", host, port);

    info!("Server listening on {}", addr);
    info!("Available endpoints:");
    info!("  GET  /health - Health check");
    info!("  POST /api/payments/:id/process - Authorize and capture in one step");
    info!("  POST /api/payments/:id/authorize - Authorize payment");
    info!("  POST /api/payments/:id/capture - Capture payment");
    info!("  POST /api/payments/:id/refund - Refund payment");
    info!("  POST /api/payments/:id/void - Void authorization");
    info!("  POST /api/payments/:id/confirm - Confirm payment");
    info!("  GET  /api/gateways - List configured gateways");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
