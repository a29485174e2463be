use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{CardInfo, Money, TransactionKind};
use crate::domain::{Payment, Transaction};
use crate::ports::gateway_port::{
    CustomerSource, GatewayResponse, PaymentData, PaymentGatewayInfo, TokenConfig,
};
use crate::ports::{GatewayPort, PaymentRepositoryPort};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// 对外统一的网关通信错误提示，具体原因只进日志
const GENERIC_GATEWAY_ERROR: &str = "Oops! Something went wrong.";

/// 交易失败但网关没有给出错误描述时的兜底提示
const GENERIC_TRANSACTION_ERROR: &str = "Transaction was unsuccessful.";

/// 按支付ID分配的进程内排他锁注册表
///
/// 同一支付上的操作串行执行，不同支付完全并行。锁在编排器
/// 整个调用期间持有，守卫离开作用域即释放，失败路径也不会泄漏。
/// 守卫释放时没有其他等待者的条目会被回收，注册表大小只与
/// 正在进行的操作数相关，不随历史支付数量增长。
struct PaymentLockRegistry {
    locks: std::sync::Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl PaymentLockRegistry {
    fn new() -> Self {
        Self {
            locks: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// 锁住某个支付，返回的守卫离开作用域即解锁并回收条目
    async fn lock(&self, payment_id: Uuid) -> PaymentLockGuard<'_> {
        let lock = {
            let mut locks = match self.locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            locks.entry(payment_id).or_default().clone()
        };
        let permit = lock.lock_owned().await;
        PaymentLockGuard {
            registry: self,
            payment_id,
            _permit: permit,
        }
    }

    fn evict(&self, payment_id: Uuid) {
        let mut locks = match self.locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(lock) = locks.get(&payment_id) {
            // 注册表和当前守卫各持有一个句柄，计数更高说明还有等待者
            if Arc::strong_count(lock) <= 2 {
                locks.remove(&payment_id);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        match self.locks.lock() {
            Ok(guard) => guard.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

struct PaymentLockGuard<'a> {
    registry: &'a PaymentLockRegistry,
    payment_id: Uuid,
    _permit: tokio::sync::OwnedMutexGuard<()>,
}

impl Drop for PaymentLockGuard<'_> {
    fn drop(&mut self) {
        self.registry.evict(self.payment_id);
    }
}

/// 支付网关编排服务
///
/// 驱动单个支付完成预授权/扣款/退款/撤销/确认等操作：
/// 加锁并校验支付可用 → 构建载荷 → 调用网关端口 → 归一化响应
/// → 幂等提交账本条目 → 后处理更新支付聚合 → 返回结果。
pub struct PaymentGatewayService<R: PaymentRepositoryPort> {
    gateways: HashMap<String, Arc<dyn GatewayPort>>,
    repository: Arc<R>,
    locks: PaymentLockRegistry,
}

impl<R: PaymentRepositoryPort> PaymentGatewayService<R> {
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            gateways: HashMap::new(),
            repository,
            locks: PaymentLockRegistry::new(),
        }
    }

    /// 注册网关插件，按其描述ID索引
    pub fn register_gateway(&mut self, gateway: Arc<dyn GatewayPort>) {
        let info = gateway.info();
        info!("Registering payment gateway: {}", info.id);
        self.gateways.insert(info.id, gateway);
    }

    /// 组合支付（预授权+扣款一步完成）
    pub async fn process_payment(
        &self,
        payment_id: Uuid,
        token: String,
        store_source: bool,
        additional_data: Option<serde_json::Value>,
    ) -> DomainResult<Transaction> {
        let _guard = self.locks.lock(payment_id).await;

        let mut payment = self.load_active_payment(payment_id).await?;
        let gateway = self.resolve_gateway(&payment.gateway)?;

        let payment_data = create_payment_information(
            &payment,
            Some(token),
            payment.total,
            store_source,
            additional_data,
        );

        let (response, gateway_error) =
            fetch_gateway_response(gateway.process_payment(&payment_data)).await;

        let action_required = response
            .as_ref()
            .map(|r| r.action_required)
            .unwrap_or(false);
        self.apply_payment_method_info(&mut payment, response.as_ref());

        let transaction = self
            .commit_transaction(
                &mut payment,
                TransactionKind::Capture,
                action_required,
                &payment_data,
                gateway_error,
                response,
            )
            .await?;
        require_successful(transaction)
    }

    /// 预授权
    pub async fn authorize(
        &self,
        payment_id: Uuid,
        token: String,
        store_source: bool,
    ) -> DomainResult<Transaction> {
        let _guard = self.locks.lock(payment_id).await;

        let mut payment = self.load_active_payment(payment_id).await?;
        payment.clean_authorize()?;
        let gateway = self.resolve_gateway(&payment.gateway)?;

        let payment_data =
            create_payment_information(&payment, Some(token), payment.total, store_source, None);

        let (response, gateway_error) =
            fetch_gateway_response(gateway.authorize_payment(&payment_data)).await;
        self.apply_payment_method_info(&mut payment, response.as_ref());

        let transaction = self
            .commit_transaction(
                &mut payment,
                TransactionKind::Auth,
                false,
                &payment_data,
                gateway_error,
                response,
            )
            .await?;
        require_successful(transaction)
    }

    /// 扣款，金额缺省为剩余可扣款金额
    pub async fn capture(
        &self,
        payment_id: Uuid,
        amount: Option<Money>,
        store_source: bool,
    ) -> DomainResult<Transaction> {
        let _guard = self.locks.lock(payment_id).await;

        let mut payment = self.load_active_payment(payment_id).await?;
        let amount = amount.unwrap_or_else(|| payment.get_charge_amount());
        payment.clean_capture(amount)?;

        let token = self
            .past_transaction_token(payment_id, TransactionKind::Auth)
            .await?;
        let gateway = self.resolve_gateway(&payment.gateway)?;

        let payment_data =
            create_payment_information(&payment, Some(token), amount, store_source, None);

        let (response, gateway_error) =
            fetch_gateway_response(gateway.capture_payment(&payment_data)).await;
        self.apply_payment_method_info(&mut payment, response.as_ref());

        let transaction = self
            .commit_transaction(
                &mut payment,
                TransactionKind::Capture,
                false,
                &payment_data,
                gateway_error,
                response,
            )
            .await?;
        require_successful(transaction)
    }

    /// 退款，金额缺省为已扣款金额
    ///
    /// 手工支付不调用网关，直接写入一条成功的退款账本条目。
    pub async fn refund(
        &self,
        payment_id: Uuid,
        amount: Option<Money>,
    ) -> DomainResult<Transaction> {
        let _guard = self.locks.lock(payment_id).await;

        let mut payment = self.load_active_payment(payment_id).await?;
        let amount = amount.unwrap_or(payment.captured_amount);
        validate_refund_amount(&payment, amount)?;
        if !payment.can_refund() {
            return Err(DomainError::UnsupportedOperation(
                "This payment cannot be refunded.".to_string(),
            ));
        }

        let prior_kind = if payment.is_manual {
            TransactionKind::External
        } else {
            TransactionKind::Capture
        };
        let token = self.past_transaction_token(payment_id, prior_kind).await?;

        if payment.is_manual {
            // 手工支付仅做账务记录
            let transaction = Transaction::new(
                payment.id,
                TransactionKind::Refund,
                token,
                amount,
                payment.currency.clone(),
                true,
                false,
                None,
                None,
            );
            self.repository.insert_transaction(&transaction).await?;
            self.gateway_postprocess(&transaction, &mut payment).await?;
            return Ok(transaction);
        }

        let gateway = self.resolve_gateway(&payment.gateway)?;
        let payment_data =
            create_payment_information(&payment, Some(token), amount, false, None);
        let (response, gateway_error) =
            fetch_gateway_response(gateway.refund_payment(&payment_data)).await;

        let transaction = self
            .commit_transaction(
                &mut payment,
                TransactionKind::Refund,
                false,
                &payment_data,
                gateway_error,
                response,
            )
            .await?;
        require_successful(transaction)
    }

    /// 撤销预授权
    pub async fn void(&self, payment_id: Uuid) -> DomainResult<Transaction> {
        let _guard = self.locks.lock(payment_id).await;

        let mut payment = self.load_active_payment(payment_id).await?;
        if !payment.can_void() {
            return Err(DomainError::UnsupportedOperation(
                "Only pre-authorized transactions can be voided.".to_string(),
            ));
        }

        let token = self
            .past_transaction_token(payment_id, TransactionKind::Auth)
            .await?;
        let gateway = self.resolve_gateway(&payment.gateway)?;

        let payment_data =
            create_payment_information(&payment, Some(token), payment.total, false, None);

        let (response, gateway_error) =
            fetch_gateway_response(gateway.void_payment(&payment_data)).await;

        let transaction = self
            .commit_transaction(
                &mut payment,
                TransactionKind::Void,
                false,
                &payment_data,
                gateway_error,
                response,
            )
            .await?;
        require_successful(transaction)
    }

    /// 确认（客户完成3-D Secure等操作后）
    ///
    /// 令牌取最近一条成功的action_to_confirm交易，没有则为空串。
    pub async fn confirm(
        &self,
        payment_id: Uuid,
        additional_data: Option<serde_json::Value>,
    ) -> DomainResult<Transaction> {
        let _guard = self.locks.lock(payment_id).await;

        let mut payment = self.load_active_payment(payment_id).await?;
        let token = self
            .repository
            .latest_successful_transaction(payment_id, TransactionKind::ActionToConfirm)
            .await?
            .map(|txn| txn.token)
            .unwrap_or_default();
        let gateway = self.resolve_gateway(&payment.gateway)?;

        let payment_data = create_payment_information(
            &payment,
            Some(token),
            payment.total,
            false,
            additional_data,
        );

        let (response, gateway_error) =
            fetch_gateway_response(gateway.confirm_payment(&payment_data)).await;

        let action_required = response
            .as_ref()
            .map(|r| r.action_required)
            .unwrap_or(false);
        self.apply_payment_method_info(&mut payment, response.as_ref());

        let transaction = self
            .commit_transaction(
                &mut payment,
                TransactionKind::Confirm,
                action_required,
                &payment_data,
                gateway_error,
                response,
            )
            .await?;
        require_successful(transaction)
    }

    /// 取消流程使用的便捷操作：可退则退，可撤则撤，否则什么都不做
    pub async fn refund_or_void(&self, payment_id: Option<Uuid>) -> DomainResult<()> {
        let Some(payment_id) = payment_id else {
            return Ok(());
        };
        let Some(payment) = self.repository.find_by_id(payment_id).await? else {
            return Ok(());
        };

        if payment.can_refund() {
            self.refund(payment_id, None).await?;
        } else if payment.can_void() {
            self.void(payment_id).await?;
        }
        Ok(())
    }

    /// 列出客户在某网关已存储的支付来源（只读，不加锁）
    pub async fn list_payment_sources(
        &self,
        gateway: &str,
        customer_id: &str,
    ) -> DomainResult<Vec<CustomerSource>> {
        self.resolve_gateway(gateway)?
            .list_payment_sources(customer_id)
            .await
    }

    /// 获取客户端令牌（只读，不加锁）
    pub async fn get_client_token(
        &self,
        gateway: &str,
        customer_id: Option<String>,
    ) -> DomainResult<String> {
        let config = TokenConfig { customer_id };
        self.resolve_gateway(gateway)?.get_client_token(&config).await
    }

    /// 列出所有已注册的网关（只读，不加锁）
    pub fn list_gateways(&self) -> Vec<PaymentGatewayInfo> {
        self.gateways.values().map(|g| g.info()).collect()
    }

    /// 在锁内重新加载支付并校验其仍然可操作
    async fn load_active_payment(&self, payment_id: Uuid) -> DomainResult<Payment> {
        let payment = self
            .repository
            .find_by_id(payment_id)
            .await?
            .ok_or_else(|| DomainError::PaymentNotFound(payment_id.to_string()))?;
        if !payment.is_active {
            return Err(DomainError::InactivePayment);
        }
        Ok(payment)
    }

    fn resolve_gateway(&self, gateway: &str) -> DomainResult<Arc<dyn GatewayPort>> {
        self.gateways.get(gateway).cloned().ok_or_else(|| {
            DomainError::ConfigurationError(format!("Payment gateway {} is not configured", gateway))
        })
    }

    /// 查找前置成功交易的令牌，没有则报错
    async fn past_transaction_token(
        &self,
        payment_id: Uuid,
        kind: TransactionKind,
    ) -> DomainResult<String> {
        self.repository
            .latest_successful_transaction(payment_id, kind)
            .await?
            .map(|txn| txn.token)
            .ok_or(DomainError::MissingPriorTransaction(kind))
    }

    fn apply_payment_method_info(&self, payment: &mut Payment, response: Option<&GatewayResponse>) {
        if let Some(info) = response.and_then(|r| r.payment_method_info.as_ref()) {
            payment.update_card_info(CardInfo {
                brand: info.brand.clone(),
                last4: info.last4.clone(),
                exp_month: info.exp_month,
                exp_year: info.exp_year,
            });
        }
    }

    /// 幂等提交：所有操作类型的唯一写入路径
    ///
    /// 同(kind, token)已有成功交易时直接复用，不追加新行；否则
    /// 写入新条目。两条路径提交后都会执行一次后处理。
    async fn commit_transaction(
        &self,
        payment: &mut Payment,
        kind: TransactionKind,
        action_required: bool,
        payment_data: &PaymentData,
        gateway_error: Option<String>,
        response: Option<GatewayResponse>,
    ) -> DomainResult<Transaction> {
        let token = response
            .as_ref()
            .map(|r| r.transaction_id.clone())
            .or_else(|| payment_data.token.clone())
            .unwrap_or_default();

        if let Some(existing) = self
            .repository
            .find_successful_transaction(payment.id, kind, &token)
            .await?
        {
            debug!(
                "Reusing already processed {} transaction {} for payment {}",
                kind, existing.id, payment.id
            );
            self.gateway_postprocess(&existing, payment).await?;
            return Ok(existing);
        }

        let is_success =
            gateway_error.is_none() && response.as_ref().map(|r| r.is_success).unwrap_or(false);
        let amount = response
            .as_ref()
            .map(|r| r.amount)
            .unwrap_or(payment_data.amount);
        let raw_response = response.as_ref().and_then(|r| r.raw_response.clone());
        let transaction_error =
            gateway_error.or_else(|| response.as_ref().and_then(|r| r.error.clone()));

        let transaction = Transaction::new(
            payment.id,
            kind,
            token,
            amount,
            payment_data.currency.clone(),
            is_success,
            action_required,
            raw_response,
            transaction_error,
        );
        self.repository.insert_transaction(&transaction).await?;
        debug!(
            "Committed {} transaction {} for payment {} (success: {})",
            kind, transaction.id, payment.id, transaction.is_success
        );

        self.gateway_postprocess(&transaction, payment).await?;
        Ok(transaction)
    }

    /// 提交后的副作用：根据账本更新支付聚合
    ///
    /// 每次提交后都会执行，包括幂等复用路径。扣款/退款金额按
    /// 账本汇总重算，重复执行不会重复记账。
    async fn gateway_postprocess(
        &self,
        transaction: &Transaction,
        payment: &mut Payment,
    ) -> DomainResult<()> {
        // 需要客户进一步操作时只标记等待确认，不做任何记账
        if transaction.action_required {
            payment.to_confirm = true;
            self.repository.update(payment).await?;
            return Ok(());
        }

        if transaction.is_success {
            match transaction.kind {
                TransactionKind::Capture
                | TransactionKind::Confirm
                | TransactionKind::External
                | TransactionKind::Refund => {
                    let transactions = self.repository.list_transactions(payment.id).await?;
                    let mut charged = Money::zero();
                    let mut refunded = Money::zero();
                    for txn in transactions.iter().filter(|t| t.is_success) {
                        match txn.kind {
                            TransactionKind::Capture
                            | TransactionKind::Confirm
                            | TransactionKind::External => charged = charged + txn.amount,
                            TransactionKind::Refund => refunded = refunded + txn.amount,
                            _ => {}
                        }
                    }
                    payment.settle(charged, refunded);
                    if transaction.kind == TransactionKind::Confirm {
                        payment.to_confirm = false;
                    }
                }
                TransactionKind::Void | TransactionKind::Cancel => payment.deactivate(),
                TransactionKind::ActionToConfirm => payment.to_confirm = true,
                TransactionKind::Auth => {}
            }
        }

        self.repository.update(payment).await?;
        Ok(())
    }
}

/// 构建发送给网关的载荷
fn create_payment_information(
    payment: &Payment,
    token: Option<String>,
    amount: Money,
    store_source: bool,
    additional_data: Option<serde_json::Value>,
) -> PaymentData {
    PaymentData {
        payment_id: payment.id,
        gateway: payment.gateway.clone(),
        token,
        amount,
        currency: payment.currency.clone(),
        store_source,
        additional_data,
    }
}

/// 调用网关并归一化结果
///
/// 网关调用失败或响应非法时，完整原因只写日志，向上只返回
/// 统一的脱敏错误信息。原始异常永远不会越过这个边界。
async fn fetch_gateway_response<F>(call: F) -> (Option<GatewayResponse>, Option<String>)
where
    F: Future<Output = DomainResult<GatewayResponse>>,
{
    match call.await {
        Ok(response) => match validate_gateway_response(&response) {
            Ok(()) => (Some(response), None),
            Err(e) => {
                error!("Gateway response validation failed: {}", e);
                (None, Some(GENERIC_GATEWAY_ERROR.to_string()))
            }
        },
        Err(e) => {
            error!("Error encountered while executing payment gateway: {}", e);
            (None, Some(GENERIC_GATEWAY_ERROR.to_string()))
        }
    }
}

/// 校验网关响应的基本形状
fn validate_gateway_response(response: &GatewayResponse) -> DomainResult<()> {
    if response.transaction_id.is_empty() {
        return Err(DomainError::GatewayError(
            "Gateway response is missing a transaction id".to_string(),
        ));
    }
    if response.amount.to_cents() < 0 {
        return Err(DomainError::GatewayError(
            "Gateway response carries a negative amount".to_string(),
        ));
    }
    Ok(())
}

/// 校验退款金额区间
fn validate_refund_amount(payment: &Payment, amount: Money) -> DomainResult<()> {
    if !amount.is_positive() {
        return Err(DomainError::InvalidAmount(
            "Amount should be a positive number.".to_string(),
        ));
    }
    if amount > payment.captured_amount {
        return Err(DomainError::InvalidAmount(
            "Cannot refund more than captured.".to_string(),
        ));
    }
    Ok(())
}

/// 调用方契约：要么返回成功交易，要么带原因报错
fn require_successful(transaction: Transaction) -> DomainResult<Transaction> {
    if transaction.is_success {
        Ok(transaction)
    } else {
        let message = transaction
            .error
            .clone()
            .unwrap_or_else(|| GENERIC_TRANSACTION_ERROR.to_string());
        Err(DomainError::PaymentFailed(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::ChargeStatus;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// 可编排响应的网关桩
    struct MockGateway {
        responses: Mutex<VecDeque<DomainResult<GatewayResponse>>>,
        calls: AtomicUsize,
        last_payload: Mutex<Option<PaymentData>>,
        delay: Option<Duration>,
    }

    impl MockGateway {
        fn new() -> Self {
            Self {
                responses: Mutex::new(VecDeque::new()),
                calls: AtomicUsize::new(0),
                last_payload: Mutex::new(None),
                delay: None,
            }
        }

        fn with_delay(delay: Duration) -> Self {
            Self {
                delay: Some(delay),
                ..Self::new()
            }
        }

        fn push(&self, response: DomainResult<GatewayResponse>) {
            self.responses.lock().unwrap().push_back(response);
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn last_payload(&self) -> Option<PaymentData> {
            self.last_payload.lock().unwrap().clone()
        }

        async fn next(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_payload.lock().unwrap() = Some(data.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self.responses.lock().unwrap().pop_front();
            match scripted {
                Some(response) => response,
                None => Ok(success(
                    TransactionKind::Capture,
                    &format!("txn-{}", n),
                    data.amount,
                )),
            }
        }
    }

    #[async_trait::async_trait]
    impl GatewayPort for MockGateway {
        fn info(&self) -> PaymentGatewayInfo {
            PaymentGatewayInfo {
                id: "dummy".to_string(),
                name: "Dummy Gateway".to_string(),
                currencies: vec!["USD".to_string()],
            }
        }

        async fn authorize_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
            self.next(data).await
        }

        async fn capture_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
            self.next(data).await
        }

        async fn refund_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
            self.next(data).await
        }

        async fn void_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
            self.next(data).await
        }

        async fn process_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
            self.next(data).await
        }

        async fn confirm_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
            self.next(data).await
        }

        async fn list_payment_sources(
            &self,
            _customer_id: &str,
        ) -> DomainResult<Vec<CustomerSource>> {
            Ok(vec![])
        }

        async fn get_client_token(&self, _config: &TokenConfig) -> DomainResult<String> {
            Ok("client-token".to_string())
        }
    }

    /// 内存仓储，测试专用
    #[derive(Default)]
    struct InMemoryRepository {
        payments: Mutex<HashMap<Uuid, Payment>>,
        transactions: Mutex<Vec<Transaction>>,
    }

    impl InMemoryRepository {
        fn transactions_of_kind(&self, payment_id: Uuid, kind: TransactionKind) -> Vec<Transaction> {
            self.transactions
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.payment_id == payment_id && t.kind == kind)
                .cloned()
                .collect()
        }

        fn payment(&self, payment_id: Uuid) -> Payment {
            self.payments.lock().unwrap().get(&payment_id).unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl PaymentRepositoryPort for InMemoryRepository {
        async fn save(&self, payment: &Payment) -> DomainResult<()> {
            self.payments
                .lock()
                .unwrap()
                .insert(payment.id, payment.clone());
            Ok(())
        }

        async fn find_by_id(&self, id: Uuid) -> DomainResult<Option<Payment>> {
            Ok(self.payments.lock().unwrap().get(&id).cloned())
        }

        async fn update(&self, payment: &Payment) -> DomainResult<()> {
            self.payments
                .lock()
                .unwrap()
                .insert(payment.id, payment.clone());
            Ok(())
        }

        async fn insert_transaction(&self, transaction: &Transaction) -> DomainResult<()> {
            self.transactions.lock().unwrap().push(transaction.clone());
            Ok(())
        }

        async fn latest_successful_transaction(
            &self,
            payment_id: Uuid,
            kind: TransactionKind,
        ) -> DomainResult<Option<Transaction>> {
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.payment_id == payment_id && t.kind == kind && t.is_success)
                .last()
                .cloned())
        }

        async fn find_successful_transaction(
            &self,
            payment_id: Uuid,
            kind: TransactionKind,
            token: &str,
        ) -> DomainResult<Option<Transaction>> {
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .iter()
                .filter(|t| {
                    t.payment_id == payment_id
                        && t.kind == kind
                        && t.token == token
                        && t.is_success
                })
                .last()
                .cloned())
        }

        async fn list_transactions(&self, payment_id: Uuid) -> DomainResult<Vec<Transaction>> {
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .iter()
                .filter(|t| t.payment_id == payment_id)
                .cloned()
                .collect())
        }
    }

    fn success(kind: TransactionKind, token: &str, amount: Money) -> GatewayResponse {
        GatewayResponse {
            is_success: true,
            action_required: false,
            kind,
            transaction_id: token.to_string(),
            amount,
            currency: "USD".to_string(),
            error: None,
            payment_method_info: None,
            raw_response: Some(serde_json::json!({ "transaction_id": token })),
        }
    }

    fn setup(
        gateway: MockGateway,
    ) -> (
        PaymentGatewayService<InMemoryRepository>,
        Arc<InMemoryRepository>,
        Arc<MockGateway>,
    ) {
        let repository = Arc::new(InMemoryRepository::default());
        let gateway = Arc::new(gateway);
        let mut service = PaymentGatewayService::new(repository.clone());
        service.register_gateway(gateway.clone() as Arc<dyn GatewayPort>);
        (service, repository, gateway)
    }

    async fn seed_payment(repository: &InMemoryRepository, total_cents: i64) -> Payment {
        let payment = Payment::new(
            "dummy".to_string(),
            Money::from_cents(total_cents),
            "USD".to_string(),
            false,
        )
        .unwrap();
        repository.save(&payment).await.unwrap();
        payment
    }

    /// 预置一笔已扣款的支付，附带对应的成功capture账本条目
    async fn seed_captured_payment(repository: &InMemoryRepository, total_cents: i64) -> Payment {
        let mut payment = seed_payment(repository, total_cents).await;
        let capture = Transaction::new(
            payment.id,
            TransactionKind::Capture,
            "cap-seed".to_string(),
            Money::from_cents(total_cents),
            "USD".to_string(),
            true,
            false,
            None,
            None,
        );
        repository.insert_transaction(&capture).await.unwrap();
        payment.settle(Money::from_cents(total_cents), Money::zero());
        repository.update(&payment).await.unwrap();
        payment
    }

    #[tokio::test]
    async fn test_capture_requires_prior_auth() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;

        let result = service.capture(payment.id, None, false).await;
        assert!(matches!(
            result,
            Err(DomainError::MissingPriorTransaction(TransactionKind::Auth))
        ));
        assert_eq!(gateway.call_count(), 0);

        gateway.push(Ok(success(
            TransactionKind::Auth,
            "auth-1",
            Money::from_cents(1000),
        )));
        service
            .authorize(payment.id, "nonce".to_string(), false)
            .await
            .unwrap();

        gateway.push(Ok(success(
            TransactionKind::Capture,
            "cap-1",
            Money::from_cents(1000),
        )));
        let transaction = service.capture(payment.id, None, false).await.unwrap();
        assert!(transaction.is_success);
        assert_eq!(transaction.kind, TransactionKind::Capture);
        // 扣款载荷携带的是预授权交易的令牌
        assert_eq!(gateway.last_payload().unwrap().token, Some("auth-1".to_string()));
    }

    #[tokio::test]
    async fn test_capture_is_idempotent_per_token() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;

        gateway.push(Ok(success(
            TransactionKind::Auth,
            "auth-1",
            Money::from_cents(1000),
        )));
        service
            .authorize(payment.id, "nonce".to_string(), false)
            .await
            .unwrap();

        // 网关两次都返回同一个令牌（重复投递/重试场景）
        gateway.push(Ok(success(
            TransactionKind::Capture,
            "cap-1",
            Money::from_cents(500),
        )));
        gateway.push(Ok(success(
            TransactionKind::Capture,
            "cap-1",
            Money::from_cents(500),
        )));

        let first = service
            .capture(payment.id, Some(Money::from_cents(500)), false)
            .await
            .unwrap();
        let second = service
            .capture(payment.id, Some(Money::from_cents(500)), false)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        let captures = repository.transactions_of_kind(payment.id, TransactionKind::Capture);
        assert_eq!(captures.len(), 1);
        // 复用路径的后处理不会重复记账
        let stored = repository.payment(payment.id);
        assert_eq!(stored.captured_amount.to_cents(), 500);
        assert_eq!(stored.charge_status, ChargeStatus::PartiallyCharged);
    }

    #[tokio::test]
    async fn test_refund_amount_bounds() {
        let (service, repository, _gateway) = setup(MockGateway::new());
        let payment = seed_captured_payment(&repository, 1000).await;

        let too_much = service
            .refund(payment.id, Some(Money::from_cents(1001)))
            .await;
        assert!(matches!(too_much, Err(DomainError::InvalidAmount(_))));

        let zero = service.refund(payment.id, Some(Money::zero())).await;
        assert!(matches!(zero, Err(DomainError::InvalidAmount(_))));

        let exact = service
            .refund(payment.id, Some(Money::from_cents(1000)))
            .await
            .unwrap();
        assert!(exact.is_success);
        assert_eq!(exact.kind, TransactionKind::Refund);

        let stored = repository.payment(payment.id);
        assert_eq!(stored.captured_amount.to_cents(), 0);
        assert_eq!(stored.charge_status, ChargeStatus::FullyRefunded);
    }

    #[tokio::test]
    async fn test_inactive_payment_rejected_before_gateway_call() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let mut payment = seed_payment(&repository, 1000).await;
        payment.deactivate();
        repository.update(&payment).await.unwrap();

        let result = service
            .authorize(payment.id, "nonce".to_string(), false)
            .await;
        assert!(matches!(result, Err(DomainError::InactivePayment)));
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_manual_refund_skips_gateway() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let mut payment = Payment::new(
            "dummy".to_string(),
            Money::from_cents(800),
            "USD".to_string(),
            true,
        )
        .unwrap();
        let external = Transaction::new(
            payment.id,
            TransactionKind::External,
            "ext-1".to_string(),
            Money::from_cents(800),
            "USD".to_string(),
            true,
            false,
            None,
            None,
        );
        payment.settle(Money::from_cents(800), Money::zero());
        repository.save(&payment).await.unwrap();
        repository.insert_transaction(&external).await.unwrap();

        let transaction = service.refund(payment.id, None).await.unwrap();
        assert!(transaction.is_success);
        assert_eq!(transaction.kind, TransactionKind::Refund);
        assert_eq!(transaction.token, "ext-1");
        assert_eq!(gateway.call_count(), 0);

        let stored = repository.payment(payment.id);
        assert_eq!(stored.charge_status, ChargeStatus::FullyRefunded);
    }

    #[tokio::test]
    async fn test_gateway_error_is_normalized() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;

        gateway.push(Err(DomainError::GatewayError(
            "connection refused: internal acquirer endpoint 10.0.0.7".to_string(),
        )));

        let result = service
            .authorize(payment.id, "nonce".to_string(), false)
            .await;
        match result {
            Err(DomainError::PaymentFailed(message)) => {
                assert_eq!(message, GENERIC_GATEWAY_ERROR);
            }
            other => panic!("Expected PaymentFailed, got {:?}", other.map(|t| t.id)),
        }

        // 失败的尝试也会留下账本条目
        let auths = repository.transactions_of_kind(payment.id, TransactionKind::Auth);
        assert_eq!(auths.len(), 1);
        assert!(!auths[0].is_success);
        assert_eq!(auths[0].error, Some(GENERIC_GATEWAY_ERROR.to_string()));
    }

    #[tokio::test]
    async fn test_declined_transaction_surfaces_gateway_message() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;

        let mut declined = success(TransactionKind::Capture, "cap-declined", Money::from_cents(1000));
        declined.is_success = false;
        declined.error = Some("Insufficient funds.".to_string());
        gateway.push(Ok(declined));

        let result = service
            .process_payment(payment.id, "nonce".to_string(), false, None)
            .await;
        match result {
            Err(DomainError::PaymentFailed(message)) => {
                assert_eq!(message, "Insufficient funds.");
            }
            other => panic!("Expected PaymentFailed, got {:?}", other.map(|t| t.id)),
        }
        assert_eq!(repository.payment(payment.id).captured_amount.to_cents(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_refunds_are_serialized() {
        let (service, repository, _gateway) = setup(MockGateway::with_delay(
            Duration::from_millis(20),
        ));
        let payment = seed_captured_payment(&repository, 1000).await;

        let service = Arc::new(service);
        let first = tokio::spawn({
            let service = service.clone();
            let id = payment.id;
            async move { service.refund(id, Some(Money::from_cents(600))).await }
        });
        let second = tokio::spawn({
            let service = service.clone();
            let id = payment.id;
            async move { service.refund(id, Some(Money::from_cents(600))).await }
        });

        let results = [first.await.unwrap(), second.await.unwrap()];
        let successes = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(successes, 1);
        // 后到的调用在锁内看到的是对方已提交的扣款余额
        assert!(results.iter().any(|r| matches!(
            r,
            Err(DomainError::InvalidAmount(_))
        )));
        assert_eq!(repository.payment(payment.id).captured_amount.to_cents(), 400);
        // 两次调用都已结束，锁注册表不保留条目
        assert_eq!(service.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_lock_registry_releases_entry_after_operation() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;

        gateway.push(Ok(success(
            TransactionKind::Auth,
            "auth-1",
            Money::from_cents(1000),
        )));
        service
            .authorize(payment.id, "nonce".to_string(), false)
            .await
            .unwrap();
        assert_eq!(service.locks.len(), 0);

        // 出错路径同样不残留条目
        let other = seed_payment(&repository, 1000).await;
        let result = service.capture(other.id, None, false).await;
        assert!(result.is_err());
        assert_eq!(service.locks.len(), 0);
    }

    #[tokio::test]
    async fn test_process_payment_marks_fully_charged() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;

        gateway.push(Ok(success(
            TransactionKind::Capture,
            "proc-1",
            Money::from_cents(1000),
        )));
        let transaction = service
            .process_payment(payment.id, "nonce".to_string(), false, None)
            .await
            .unwrap();
        assert_eq!(transaction.kind, TransactionKind::Capture);

        let stored = repository.payment(payment.id);
        assert_eq!(stored.captured_amount.to_cents(), 1000);
        assert_eq!(stored.charge_status, ChargeStatus::FullyCharged);
    }

    #[tokio::test]
    async fn test_process_payment_propagates_action_required() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;

        let mut response = success(
            TransactionKind::ActionToConfirm,
            "act-1",
            Money::from_cents(1000),
        );
        response.action_required = true;
        gateway.push(Ok(response));

        let transaction = service
            .process_payment(payment.id, "nonce".to_string(), false, None)
            .await
            .unwrap();
        assert!(transaction.action_required);
        let stored = repository.payment(payment.id);
        assert!(stored.to_confirm);
        // 等待客户操作期间不记账
        assert_eq!(stored.captured_amount.to_cents(), 0);
    }

    #[tokio::test]
    async fn test_confirm_uses_action_to_confirm_token() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;
        let pending = Transaction::new(
            payment.id,
            TransactionKind::ActionToConfirm,
            "act-7".to_string(),
            Money::from_cents(1000),
            "USD".to_string(),
            true,
            false,
            None,
            None,
        );
        repository.insert_transaction(&pending).await.unwrap();

        gateway.push(Ok(success(
            TransactionKind::Confirm,
            "conf-1",
            Money::from_cents(1000),
        )));
        let transaction = service.confirm(payment.id, None).await.unwrap();
        assert_eq!(transaction.kind, TransactionKind::Confirm);
        assert_eq!(gateway.last_payload().unwrap().token, Some("act-7".to_string()));

        let stored = repository.payment(payment.id);
        assert!(!stored.to_confirm);
        assert_eq!(stored.charge_status, ChargeStatus::FullyCharged);
    }

    #[tokio::test]
    async fn test_confirm_without_pending_action_sends_empty_token() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;

        gateway.push(Ok(success(
            TransactionKind::Confirm,
            "conf-1",
            Money::from_cents(1000),
        )));
        let transaction = service.confirm(payment.id, None).await.unwrap();
        assert_eq!(transaction.kind, TransactionKind::Confirm);
        // 没有待确认交易时令牌取空串
        assert_eq!(gateway.last_payload().unwrap().token, Some(String::new()));
    }

    #[tokio::test]
    async fn test_void_deactivates_payment() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let payment = seed_payment(&repository, 1000).await;

        gateway.push(Ok(success(
            TransactionKind::Auth,
            "auth-1",
            Money::from_cents(1000),
        )));
        service
            .authorize(payment.id, "nonce".to_string(), false)
            .await
            .unwrap();

        gateway.push(Ok(success(
            TransactionKind::Void,
            "void-1",
            Money::from_cents(1000),
        )));
        let transaction = service.void(payment.id).await.unwrap();
        assert_eq!(transaction.kind, TransactionKind::Void);
        assert!(!repository.payment(payment.id).is_active);
    }

    #[tokio::test]
    async fn test_refund_or_void_picks_refund_when_refundable() {
        let (service, repository, _gateway) = setup(MockGateway::new());
        let payment = seed_captured_payment(&repository, 1000).await;

        service.refund_or_void(Some(payment.id)).await.unwrap();
        let refunds = repository.transactions_of_kind(payment.id, TransactionKind::Refund);
        assert_eq!(refunds.len(), 1);
    }

    #[tokio::test]
    async fn test_refund_or_void_is_noop_without_either() {
        let (service, repository, gateway) = setup(MockGateway::new());
        let mut payment = seed_payment(&repository, 1000).await;
        payment.deactivate();
        repository.update(&payment).await.unwrap();

        // 既不可退也不可撤：安静返回
        service.refund_or_void(Some(payment.id)).await.unwrap();
        service.refund_or_void(None).await.unwrap();
        assert_eq!(gateway.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_gateway_is_configuration_error() {
        let repository = Arc::new(InMemoryRepository::default());
        let service = PaymentGatewayService::new(repository.clone());
        let payment = seed_payment(&repository, 1000).await;

        let result = service
            .authorize(payment.id, "nonce".to_string(), false)
            .await;
        assert!(matches!(result, Err(DomainError::ConfigurationError(_))));
    }

    #[tokio::test]
    async fn test_list_gateways() {
        let (service, _repository, _gateway) = setup(MockGateway::new());
        let gateways = service.list_gateways();
        assert_eq!(gateways.len(), 1);
        assert_eq!(gateways[0].id, "dummy");
    }
}
