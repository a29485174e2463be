use crate::domain::errors::DomainError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 交易类型
///
/// 每个编排器负责选择自己要写入的类型，以及读取哪种类型的
/// 前置交易作为前提条件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// 预授权
    Auth,
    /// 扣款
    Capture,
    /// 撤销预授权
    Void,
    /// 退款
    Refund,
    /// 确认（3-D Secure等客户操作完成后）
    Confirm,
    /// 线下/手工支付
    External,
    /// 等待客户进一步操作
    ActionToConfirm,
    /// 取消
    Cancel,
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionKind::Auth => write!(f, "auth"),
            TransactionKind::Capture => write!(f, "capture"),
            TransactionKind::Void => write!(f, "void"),
            TransactionKind::Refund => write!(f, "refund"),
            TransactionKind::Confirm => write!(f, "confirm"),
            TransactionKind::External => write!(f, "external"),
            TransactionKind::ActionToConfirm => write!(f, "action_to_confirm"),
            TransactionKind::Cancel => write!(f, "cancel"),
        }
    }
}

impl FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auth" => Ok(TransactionKind::Auth),
            "capture" => Ok(TransactionKind::Capture),
            "void" => Ok(TransactionKind::Void),
            "refund" => Ok(TransactionKind::Refund),
            "confirm" => Ok(TransactionKind::Confirm),
            "external" => Ok(TransactionKind::External),
            "action_to_confirm" => Ok(TransactionKind::ActionToConfirm),
            "cancel" => Ok(TransactionKind::Cancel),
            other => Err(DomainError::InternalError(format!(
                "Unknown transaction kind: {}",
                other
            ))),
        }
    }
}

/// 支付的扣款状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChargeStatus {
    /// 未扣款
    NotCharged,
    /// 部分扣款
    PartiallyCharged,
    /// 全额扣款
    FullyCharged,
    /// 部分退款
    PartiallyRefunded,
    /// 全额退款
    FullyRefunded,
}

impl fmt::Display for ChargeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChargeStatus::NotCharged => write!(f, "not_charged"),
            ChargeStatus::PartiallyCharged => write!(f, "partially_charged"),
            ChargeStatus::FullyCharged => write!(f, "fully_charged"),
            ChargeStatus::PartiallyRefunded => write!(f, "partially_refunded"),
            ChargeStatus::FullyRefunded => write!(f, "fully_refunded"),
        }
    }
}

impl FromStr for ChargeStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "not_charged" => Ok(ChargeStatus::NotCharged),
            "partially_charged" => Ok(ChargeStatus::PartiallyCharged),
            "fully_charged" => Ok(ChargeStatus::FullyCharged),
            "partially_refunded" => Ok(ChargeStatus::PartiallyRefunded),
            "fully_refunded" => Ok(ChargeStatus::FullyRefunded),
            other => Err(DomainError::InternalError(format!(
                "Unknown charge status: {}",
                other
            ))),
        }
    }
}

/// 货币金额（最小货币单位，避免浮点数精度问题）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money {
    /// 金额（分）
    pub amount_cents: i64,
}

impl Money {
    /// 零金额
    pub fn zero() -> Self {
        Self { amount_cents: 0 }
    }

    /// 创建新的金额对象（单位：分）
    pub fn from_cents(cents: i64) -> Self {
        Self { amount_cents: cents }
    }

    /// 转换为分
    pub fn to_cents(&self) -> i64 {
        self.amount_cents
    }

    /// 是否为正金额
    pub fn is_positive(&self) -> bool {
        self.amount_cents > 0
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Money {
        Money::from_cents(self.amount_cents + rhs.amount_cents)
    }
}

impl std::ops::Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Money {
        Money::from_cents(self.amount_cents - rhs.amount_cents)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.amount_cents as f64 / 100.0)
    }
}

/// 支付卡片信息（来自网关响应的支付方式元数据）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardInfo {
    pub brand: Option<String>,
    pub last4: Option<String>,
    pub exp_month: Option<u16>,
    pub exp_year: Option<u16>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_money_arithmetic() {
        let total = Money::from_cents(1000);
        let captured = Money::from_cents(400);
        assert_eq!((total - captured).to_cents(), 600);
        assert_eq!((captured + captured).to_cents(), 800);
        assert!(captured.is_positive());
        assert!(!Money::zero().is_positive());
    }

    #[test]
    fn test_money_ordering() {
        assert!(Money::from_cents(100) > Money::from_cents(99));
        assert!(Money::from_cents(100) <= Money::from_cents(100));
    }

    #[test]
    fn test_money_display() {
        let money = Money::from_cents(1050);
        assert_eq!(format!("{}", money), "10.50");
    }

    #[test]
    fn test_transaction_kind_round_trip() {
        for kind in [
            TransactionKind::Auth,
            TransactionKind::Capture,
            TransactionKind::Void,
            TransactionKind::Refund,
            TransactionKind::Confirm,
            TransactionKind::External,
            TransactionKind::ActionToConfirm,
            TransactionKind::Cancel,
        ] {
            let parsed: TransactionKind = kind.to_string().parse().unwrap();
            assert_eq!(parsed, kind);
        }
    }

    #[test]
    fn test_unknown_transaction_kind() {
        let result: Result<TransactionKind, _> = "deposit".parse();
        assert!(result.is_err());
    }
}
