use crate::domain::errors::DomainResult;
use crate::domain::value_objects::TransactionKind;
use crate::domain::{Payment, Transaction};
use async_trait::async_trait;
use uuid::Uuid;

/// 支付仓储端口接口
///
/// 支付行可读可更新，交易账本只追加。跨进程的行级互斥由
/// 编排器的锁注册表负责，仓储只需保证单条语句的原子性。
#[async_trait]
pub trait PaymentRepositoryPort: Send + Sync {
    /// 保存支付
    async fn save(&self, payment: &Payment) -> DomainResult<()>;

    /// 根据ID查找支付
    async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Payment>>;

    /// 更新支付
    async fn update(&self, payment: &Payment) -> DomainResult<()>;

    /// 追加交易账本条目
    async fn insert_transaction(&self, transaction: &Transaction) -> DomainResult<()>;

    /// 查找指定类型的最近一条成功交易
    async fn latest_successful_transaction(
        &self,
        payment_id: Uuid,
        kind: TransactionKind,
    ) -> DomainResult<Option<Transaction>>;

    /// 按(kind, token)查找已有的成功交易（幂等提交的去重依据）
    async fn find_successful_transaction(
        &self,
        payment_id: Uuid,
        kind: TransactionKind,
        token: &str,
    ) -> DomainResult<Option<Transaction>>;

    /// 列出支付的全部交易（按创建时间升序）
    async fn list_transactions(&self, payment_id: Uuid) -> DomainResult<Vec<Transaction>>;
}
