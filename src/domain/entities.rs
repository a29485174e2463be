use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{CardInfo, ChargeStatus, Money, TransactionKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 支付实体
///
/// 代表一个订单的一次客户支付尝试，是加锁的基本单位。
/// 只能在编排器持有排他锁的情况下被修改，永不删除，只会被停用。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    /// 支付ID（内部）
    pub id: Uuid,

    /// 处理该支付的网关插件标识
    pub gateway: String,

    /// 是否仍然可操作（取消后置为false）
    pub is_active: bool,

    /// 是否为手工/线下支付（退款、撤销仅做账务记录，不调用网关）
    pub is_manual: bool,

    /// 应收总金额
    pub total: Money,

    /// 已扣款金额
    pub captured_amount: Money,

    /// 货币代码（ISO 4217）
    pub currency: String,

    /// 扣款状态
    pub charge_status: ChargeStatus,

    /// 是否等待客户确认（3-D Secure等）
    pub to_confirm: bool,

    /// 卡片元数据（来自网关响应）
    pub card_info: Option<CardInfo>,

    /// 创建时间
    pub created_at: DateTime<Utc>,

    /// 更新时间
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// 创建新的支付
    pub fn new(
        gateway: String,
        total: Money,
        currency: String,
        is_manual: bool,
    ) -> DomainResult<Self> {
        if !total.is_positive() {
            return Err(DomainError::InvalidAmount(
                "Amount should be a positive number.".to_string(),
            ));
        }

        if gateway.is_empty() {
            return Err(DomainError::ValidationError(
                "Gateway identifier must not be empty".to_string(),
            ));
        }

        if currency.len() != 3 {
            return Err(DomainError::ValidationError(
                "Currency must be a 3-letter ISO code".to_string(),
            ));
        }

        let now = Utc::now();

        Ok(Self {
            id: Uuid::new_v4(),
            gateway,
            is_active: true,
            is_manual,
            total,
            captured_amount: Money::zero(),
            currency,
            charge_status: ChargeStatus::NotCharged,
            to_confirm: false,
            card_info: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// 剩余可扣款金额
    pub fn get_charge_amount(&self) -> Money {
        self.total - self.captured_amount
    }

    /// 检查是否允许预授权
    pub fn clean_authorize(&self) -> DomainResult<()> {
        if self.charge_status != ChargeStatus::NotCharged {
            return Err(DomainError::UnsupportedOperation(
                "Charged transactions cannot be authorized again.".to_string(),
            ));
        }
        Ok(())
    }

    /// 检查扣款金额是否合法
    pub fn clean_capture(&self, amount: Money) -> DomainResult<()> {
        if !amount.is_positive() {
            return Err(DomainError::InvalidAmount(
                "Amount should be a positive number.".to_string(),
            ));
        }
        if amount > self.get_charge_amount() {
            return Err(DomainError::InvalidAmount(
                "Unable to charge more than un-captured amount.".to_string(),
            ));
        }
        Ok(())
    }

    /// 是否支持退款
    pub fn can_refund(&self) -> bool {
        matches!(
            self.charge_status,
            ChargeStatus::PartiallyCharged
                | ChargeStatus::FullyCharged
                | ChargeStatus::PartiallyRefunded
        ) && self.captured_amount.is_positive()
    }

    /// 是否支持撤销预授权
    pub fn can_void(&self) -> bool {
        self.is_active && self.charge_status == ChargeStatus::NotCharged
    }

    /// 停用支付，之后不再接受任何操作
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.updated_at = Utc::now();
    }

    /// 根据账本汇总结果更新扣款金额与扣款状态
    ///
    /// `charged`为成功的capture/confirm/external交易金额之和，
    /// `refunded`为成功的refund交易金额之和。按汇总重算是幂等的，
    /// 同一笔交易重复触发后处理不会重复记账。
    pub fn settle(&mut self, charged: Money, refunded: Money) {
        self.captured_amount = charged - refunded;
        self.charge_status = if refunded.is_positive() {
            if self.captured_amount.is_positive() {
                ChargeStatus::PartiallyRefunded
            } else {
                ChargeStatus::FullyRefunded
            }
        } else if !self.captured_amount.is_positive() {
            ChargeStatus::NotCharged
        } else if self.captured_amount < self.total {
            ChargeStatus::PartiallyCharged
        } else {
            ChargeStatus::FullyCharged
        };
        self.updated_at = Utc::now();
    }

    /// 更新卡片元数据
    pub fn update_card_info(&mut self, card_info: CardInfo) {
        self.card_info = Some(card_info);
        self.updated_at = Utc::now();
    }
}

/// 交易账本条目
///
/// 记录针对某个支付的一次操作尝试，写入后不可变更，永不删除。
/// 同一(payment, kind, token)组合至多有一条成功记录作为最终结果。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// 交易ID（内部）
    pub id: Uuid,

    /// 所属支付
    pub payment_id: Uuid,

    /// 交易类型
    pub kind: TransactionKind,

    /// 网关侧关联标识（如预授权ID）
    pub token: String,

    /// 交易金额
    pub amount: Money,

    /// 货币代码
    pub currency: String,

    /// 是否成功
    pub is_success: bool,

    /// 网关是否要求客户进一步操作
    pub action_required: bool,

    /// 网关原始响应（仅审计用途）
    pub gateway_response: Option<serde_json::Value>,

    /// 错误信息（已脱敏）
    pub error: Option<String>,

    /// 创建时间
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        payment_id: Uuid,
        kind: TransactionKind,
        token: String,
        amount: Money,
        currency: String,
        is_success: bool,
        action_required: bool,
        gateway_response: Option<serde_json::Value>,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            payment_id,
            kind,
            token,
            amount,
            currency,
            is_success,
            action_required,
            gateway_response,
            error,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(total_cents: i64) -> Payment {
        Payment::new(
            "dummy".to_string(),
            Money::from_cents(total_cents),
            "USD".to_string(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_create_payment() {
        let payment = payment(1000);
        assert!(payment.is_active);
        assert_eq!(payment.charge_status, ChargeStatus::NotCharged);
        assert_eq!(payment.get_charge_amount().to_cents(), 1000);
        assert!(payment.can_void());
        assert!(!payment.can_refund());
    }

    #[test]
    fn test_non_positive_total_rejected() {
        let result = Payment::new(
            "dummy".to_string(),
            Money::zero(),
            "USD".to_string(),
            false,
        );
        assert!(matches!(result, Err(DomainError::InvalidAmount(_))));
    }

    #[test]
    fn test_clean_capture_bounds() {
        let payment = payment(1000);
        assert!(payment.clean_capture(Money::from_cents(1000)).is_ok());
        assert!(matches!(
            payment.clean_capture(Money::from_cents(1001)),
            Err(DomainError::InvalidAmount(_))
        ));
        assert!(matches!(
            payment.clean_capture(Money::zero()),
            Err(DomainError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_clean_authorize_rejects_charged_payment() {
        let mut payment = payment(1000);
        payment.settle(Money::from_cents(1000), Money::zero());
        assert!(matches!(
            payment.clean_authorize(),
            Err(DomainError::UnsupportedOperation(_))
        ));
    }

    #[test]
    fn test_settle_partial_and_full_charge() {
        let mut payment = payment(1000);

        payment.settle(Money::from_cents(400), Money::zero());
        assert_eq!(payment.charge_status, ChargeStatus::PartiallyCharged);
        assert_eq!(payment.captured_amount.to_cents(), 400);
        assert_eq!(payment.get_charge_amount().to_cents(), 600);
        assert!(payment.can_refund());
        assert!(!payment.can_void());

        payment.settle(Money::from_cents(1000), Money::zero());
        assert_eq!(payment.charge_status, ChargeStatus::FullyCharged);
    }

    #[test]
    fn test_settle_refunds() {
        let mut payment = payment(1000);

        payment.settle(Money::from_cents(1000), Money::from_cents(400));
        assert_eq!(payment.charge_status, ChargeStatus::PartiallyRefunded);
        assert_eq!(payment.captured_amount.to_cents(), 600);

        payment.settle(Money::from_cents(1000), Money::from_cents(1000));
        assert_eq!(payment.charge_status, ChargeStatus::FullyRefunded);
        assert_eq!(payment.captured_amount.to_cents(), 0);
    }

    #[test]
    fn test_deactivate() {
        let mut payment = payment(1000);
        payment.deactivate();
        assert!(!payment.is_active);
        assert!(!payment.can_void());
    }
}
