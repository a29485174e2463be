use crate::domain::value_objects::Money;
use crate::domain::Transaction;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 组合支付请求
#[derive(Debug, Deserialize)]
pub struct ProcessPaymentRequest {
    /// 客户端支付令牌
    pub token: String,

    /// 是否存储支付来源供后续复用
    #[serde(default)]
    pub store_source: bool,

    /// 透传给网关的附加数据
    pub additional_data: Option<serde_json::Value>,
}

/// 预授权请求
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    /// 客户端支付令牌
    pub token: String,

    /// 是否存储支付来源供后续复用
    #[serde(default)]
    pub store_source: bool,
}

/// 扣款请求
#[derive(Debug, Deserialize)]
pub struct CaptureRequest {
    /// 扣款金额，缺省为剩余可扣款金额
    pub amount: Option<Money>,

    /// 是否存储支付来源供后续复用
    #[serde(default)]
    pub store_source: bool,
}

/// 退款请求
#[derive(Debug, Deserialize)]
pub struct RefundRequest {
    /// 退款金额，缺省为已扣款金额
    pub amount: Option<Money>,
}

/// 确认请求
#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    /// 透传给网关的附加数据
    pub additional_data: Option<serde_json::Value>,
}

/// 获取客户端令牌请求
#[derive(Debug, Deserialize)]
pub struct ClientTokenRequest {
    pub customer_id: Option<String>,
}

/// 交易响应
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// 交易ID
    pub transaction_id: Uuid,

    /// 所属支付
    pub payment_id: Uuid,

    /// 交易类型
    pub kind: String,

    /// 网关侧关联标识
    pub token: String,

    /// 金额（分）
    pub amount: i64,

    /// 货币代码
    pub currency: String,

    /// 是否需要客户进一步操作
    pub action_required: bool,
}

impl From<&Transaction> for TransactionResponse {
    fn from(transaction: &Transaction) -> Self {
        Self {
            transaction_id: transaction.id,
            payment_id: transaction.payment_id,
            kind: transaction.kind.to_string(),
            token: transaction.token.clone(),
            amount: transaction.amount.to_cents(),
            currency: transaction.currency.clone(),
            action_required: transaction.action_required,
        }
    }
}

/// 错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error: String, message: String) -> Self {
        Self { error, message }
    }
}
