use crate::domain::errors::DomainResult;
use crate::domain::value_objects::{Money, TransactionKind};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 发送给网关的支付载荷
///
/// 所有操作共用同一种载荷形状，`token`在不同操作里含义不同：
/// 预授权/组合支付时是客户端支付令牌，扣款/退款/撤销时是前置
/// 成功交易的关联标识。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentData {
    pub payment_id: Uuid,
    pub gateway: String,
    pub token: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub store_source: bool,
    pub additional_data: Option<serde_json::Value>,
}

/// 网关响应中的支付方式元数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodInfo {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u16>,
    pub exp_year: Option<u16>,
}

/// 网关响应（经过适配器归一化后的形状）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    /// 网关是否接受了该操作
    pub is_success: bool,

    /// 是否需要客户进一步操作（如3-D Secure）
    pub action_required: bool,

    /// 网关侧视角的交易类型
    pub kind: TransactionKind,

    /// 网关侧关联标识
    pub transaction_id: String,

    /// 网关实际处理的金额
    pub amount: Money,

    /// 货币代码
    pub currency: String,

    /// 网关返回的错误描述
    pub error: Option<String>,

    /// 支付方式元数据
    pub payment_method_info: Option<PaymentMethodInfo>,

    /// 原始响应载荷（仅审计用途）
    pub raw_response: Option<serde_json::Value>,
}

/// 客户已存储的支付来源
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSource {
    pub id: String,
    pub gateway: String,
    pub card_info: Option<PaymentMethodInfo>,
}

/// 获取客户端令牌所需的配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenConfig {
    pub customer_id: Option<String>,
}

/// 网关描述信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentGatewayInfo {
    pub id: String,
    pub name: String,
    pub currencies: Vec<String>,
}

/// 支付网关端口接口
///
/// 每个网关插件实现一份。插件内部的重试/HTTP逻辑不属于编排核心，
/// 实现只需在通信失败或响应格式非法时返回`DomainError::GatewayError`。
#[async_trait]
pub trait GatewayPort: Send + Sync {
    /// 网关描述
    fn info(&self) -> PaymentGatewayInfo;

    /// 预授权
    async fn authorize_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse>;

    /// 扣款
    async fn capture_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse>;

    /// 退款
    async fn refund_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse>;

    /// 撤销预授权
    async fn void_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse>;

    /// 组合支付（预授权+扣款一步完成）
    async fn process_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse>;

    /// 确认（客户完成3-D Secure等操作后）
    async fn confirm_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse>;

    /// 列出客户已存储的支付来源
    async fn list_payment_sources(&self, customer_id: &str) -> DomainResult<Vec<CustomerSource>>;

    /// 获取客户端令牌
    async fn get_client_token(&self, config: &TokenConfig) -> DomainResult<String>;
}
