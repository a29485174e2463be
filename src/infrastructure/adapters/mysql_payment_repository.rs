use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{CardInfo, ChargeStatus, Money, TransactionKind};
use crate::domain::{Payment, Transaction};
use crate::ports::payment_repository_port::PaymentRepositoryPort;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySql, Pool};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

/// MySQL支付仓储实现
///
/// `payments`表可更新，`payment_transactions`表只追加。
#[derive(Clone)]
pub struct MySqlPaymentRepository {
    pool: Arc<Pool<MySql>>,
}

impl MySqlPaymentRepository {
    pub fn new(pool: Arc<Pool<MySql>>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PaymentRepositoryPort for MySqlPaymentRepository {
    /// 保存支付
    async fn save(&self, payment: &Payment) -> DomainResult<()> {
        let query = r#"
            INSERT INTO payments (
                id, gateway, is_active, is_manual, total_cents,
                captured_cents, currency, charge_status, to_confirm,
                card_brand, card_last4, card_exp_month, card_exp_year,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        let card = payment.card_info.as_ref();
        sqlx::query(query)
            .bind(payment.id)
            .bind(&payment.gateway)
            .bind(payment.is_active)
            .bind(payment.is_manual)
            .bind(payment.total.to_cents())
            .bind(payment.captured_amount.to_cents())
            .bind(&payment.currency)
            .bind(payment.charge_status.to_string())
            .bind(payment.to_confirm)
            .bind(card.and_then(|c| c.brand.clone()))
            .bind(card.and_then(|c| c.last4.clone()))
            .bind(card.and_then(|c| c.exp_month))
            .bind(card.and_then(|c| c.exp_year))
            .bind(payment.created_at)
            .bind(payment.updated_at)
            .execute(self.pool.as_ref())
            .await?;

        debug!("Payment saved: {}", payment.id);
        Ok(())
    }

    /// 根据ID查找支付
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Payment>> {
        let query = r#"
            SELECT id, gateway, is_active, is_manual, total_cents,
                   captured_cents, currency, charge_status, to_confirm,
                   card_brand, card_last4, card_exp_month, card_exp_year,
                   created_at, updated_at
            FROM payments
            WHERE id = ?
        "#;

        let result = sqlx::query_as::<_, PaymentRow>(query)
            .bind(id)
            .fetch_optional(self.pool.as_ref())
            .await?;

        result.map(|row| row.into_payment()).transpose()
    }

    /// 更新支付
    async fn update(&self, payment: &Payment) -> DomainResult<()> {
        let query = r#"
            UPDATE payments
            SET is_active = ?, captured_cents = ?, charge_status = ?,
                to_confirm = ?, card_brand = ?, card_last4 = ?,
                card_exp_month = ?, card_exp_year = ?, updated_at = ?
            WHERE id = ?
        "#;

        let card = payment.card_info.as_ref();
        let rows_affected = sqlx::query(query)
            .bind(payment.is_active)
            .bind(payment.captured_amount.to_cents())
            .bind(payment.charge_status.to_string())
            .bind(payment.to_confirm)
            .bind(card.and_then(|c| c.brand.clone()))
            .bind(card.and_then(|c| c.last4.clone()))
            .bind(card.and_then(|c| c.exp_month))
            .bind(card.and_then(|c| c.exp_year))
            .bind(payment.updated_at)
            .bind(payment.id)
            .execute(self.pool.as_ref())
            .await?
            .rows_affected();

        if rows_affected == 0 {
            error!("No payment found to update: {}", payment.id);
            return Err(DomainError::PaymentNotFound(payment.id.to_string()));
        }

        debug!("Payment updated: {}", payment.id);
        Ok(())
    }

    /// 追加交易账本条目
    async fn insert_transaction(&self, transaction: &Transaction) -> DomainResult<()> {
        let query = r#"
            INSERT INTO payment_transactions (
                id, payment_id, kind, token, amount_cents, currency,
                is_success, action_required, gateway_response,
                error_message, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#;

        sqlx::query(query)
            .bind(transaction.id)
            .bind(transaction.payment_id)
            .bind(transaction.kind.to_string())
            .bind(&transaction.token)
            .bind(transaction.amount.to_cents())
            .bind(&transaction.currency)
            .bind(transaction.is_success)
            .bind(transaction.action_required)
            .bind(&transaction.gateway_response)
            .bind(&transaction.error)
            .bind(transaction.created_at)
            .execute(self.pool.as_ref())
            .await?;

        debug!(
            "Transaction appended: {} ({} for payment {})",
            transaction.id, transaction.kind, transaction.payment_id
        );
        Ok(())
    }

    /// 查找指定类型的最近一条成功交易
    async fn latest_successful_transaction(
        &self,
        payment_id: Uuid,
        kind: TransactionKind,
    ) -> DomainResult<Option<Transaction>> {
        let query = r#"
            SELECT id, payment_id, kind, token, amount_cents, currency,
                   is_success, action_required, gateway_response,
                   error_message, created_at
            FROM payment_transactions
            WHERE payment_id = ? AND kind = ? AND is_success = TRUE
            ORDER BY created_at DESC
            LIMIT 1
        "#;

        let result = sqlx::query_as::<_, TransactionRow>(query)
            .bind(payment_id)
            .bind(kind.to_string())
            .fetch_optional(self.pool.as_ref())
            .await?;

        result.map(|row| row.into_transaction()).transpose()
    }

    /// 按(kind, token)查找已有的成功交易
    async fn find_successful_transaction(
        &self,
        payment_id: Uuid,
        kind: TransactionKind,
        token: &str,
    ) -> DomainResult<Option<Transaction>> {
        let query = r#"
            SELECT id, payment_id, kind, token, amount_cents, currency,
                   is_success, action_required, gateway_response,
                   error_message, created_at
            FROM payment_transactions
            WHERE payment_id = ? AND kind = ? AND token = ? AND is_success = TRUE
            ORDER BY created_at DESC
            LIMIT 1
        "#;

        let result = sqlx::query_as::<_, TransactionRow>(query)
            .bind(payment_id)
            .bind(kind.to_string())
            .bind(token)
            .fetch_optional(self.pool.as_ref())
            .await?;

        result.map(|row| row.into_transaction()).transpose()
    }

    /// 列出支付的全部交易
    async fn list_transactions(&self, payment_id: Uuid) -> DomainResult<Vec<Transaction>> {
        let query = r#"
            SELECT id, payment_id, kind, token, amount_cents, currency,
                   is_success, action_required, gateway_response,
                   error_message, created_at
            FROM payment_transactions
            WHERE payment_id = ?
            ORDER BY created_at ASC
        "#;

        let rows = sqlx::query_as::<_, TransactionRow>(query)
            .bind(payment_id)
            .fetch_all(self.pool.as_ref())
            .await?;

        rows.into_iter().map(|row| row.into_transaction()).collect()
    }
}

/// 数据库行结构体
#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    gateway: String,
    is_active: bool,
    is_manual: bool,
    total_cents: i64,
    captured_cents: i64,
    currency: String,
    charge_status: String,
    to_confirm: bool,
    card_brand: Option<String>,
    card_last4: Option<String>,
    card_exp_month: Option<u16>,
    card_exp_year: Option<u16>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl PaymentRow {
    fn into_payment(self) -> DomainResult<Payment> {
        let card_info = if self.card_brand.is_some() || self.card_last4.is_some() {
            Some(CardInfo {
                brand: self.card_brand,
                last4: self.card_last4,
                exp_month: self.card_exp_month,
                exp_year: self.card_exp_year,
            })
        } else {
            None
        };

        Ok(Payment {
            id: self.id,
            gateway: self.gateway,
            is_active: self.is_active,
            is_manual: self.is_manual,
            total: Money::from_cents(self.total_cents),
            captured_amount: Money::from_cents(self.captured_cents),
            currency: self.currency,
            charge_status: ChargeStatus::from_str(&self.charge_status)?,
            to_confirm: self.to_confirm,
            card_info,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    payment_id: Uuid,
    kind: String,
    token: String,
    amount_cents: i64,
    currency: String,
    is_success: bool,
    action_required: bool,
    gateway_response: Option<serde_json::Value>,
    error_message: Option<String>,
    created_at: DateTime<Utc>,
}

impl TransactionRow {
    fn into_transaction(self) -> DomainResult<Transaction> {
        Ok(Transaction {
            id: self.id,
            payment_id: self.payment_id,
            kind: TransactionKind::from_str(&self.kind)?,
            token: self.token,
            amount: Money::from_cents(self.amount_cents),
            currency: self.currency,
            is_success: self.is_success,
            action_required: self.action_required,
            gateway_response: self.gateway_response,
            error: self.error_message,
            created_at: self.created_at,
        })
    }
}
