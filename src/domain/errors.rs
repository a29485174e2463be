use crate::domain::value_objects::TransactionKind;
use thiserror::Error;

/// 领域层错误类型
#[derive(Error, Debug)]
pub enum DomainError {
    /// 验证错误
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// 支付未找到
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),

    /// 支付已停用
    #[error("This payment is no longer active.")]
    InactivePayment,

    /// 金额无效
    #[error("{0}")]
    InvalidAmount(String),

    /// 缺少前置成功交易
    #[error("Cannot find successful {0} transaction.")]
    MissingPriorTransaction(TransactionKind),

    /// 支付不支持该操作
    #[error("{0}")]
    UnsupportedOperation(String),

    /// 操作失败（网关拒绝或通信失败，消息已脱敏）
    #[error("{0}")]
    PaymentFailed(String),

    /// 网关通信/响应格式错误（仅在边界内部使用，对外统一脱敏）
    #[error("Gateway error: {0}")]
    GatewayError(String),

    /// 签名计算错误
    #[error("Cryptography error: {0}")]
    CryptoError(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// 数据库错误
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP请求错误
    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// 领域结果类型
pub type DomainResult<T> = Result<T, DomainError>;
