use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// HTTP网关适配器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayHttpConfig {
    /// 网关标识（支付记录里的gateway字段与之对应）
    pub gateway_id: String,

    /// 展示名称
    pub display_name: String,

    /// API密钥
    pub api_key: String,

    /// 请求签名密钥（HMAC-SHA256）
    pub api_secret: String,

    /// API基础URL
    pub base_url: String,

    /// 支持的货币代码
    pub currencies: Vec<String>,
}

impl GatewayHttpConfig {
    pub fn from_env() -> Arc<Self> {
        Arc::new(Self {
            gateway_id: std::env::var("GATEWAY_ID")
                .unwrap_or_else(|_| "default".to_string()),
            display_name: std::env::var("GATEWAY_DISPLAY_NAME")
                .unwrap_or_else(|_| "Default Gateway".to_string()),
            api_key: std::env::var("GATEWAY_API_KEY")
                .expect("GATEWAY_API_KEY must be set"),
            api_secret: std::env::var("GATEWAY_API_SECRET")
                .expect("GATEWAY_API_SECRET must be set"),
            base_url: std::env::var("GATEWAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.gateway.example.com".to_string()),
            currencies: std::env::var("GATEWAY_CURRENCIES")
                .unwrap_or_else(|_| "USD".to_string())
                .split(',')
                .map(|c| c.trim().to_string())
                .collect(),
        })
    }
}
