use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::value_objects::{Money, TransactionKind};
use crate::infrastructure::config::gateway_config::GatewayHttpConfig;
use crate::ports::gateway_port::*;
use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tracing::{debug, error};

type HmacSha256 = Hmac<Sha256>;

/// HTTP支付网关适配器
///
/// 把`GatewayPort`的各操作映射到远端PSP的REST API，请求用
/// HMAC-SHA256签名。通信失败或响应格式非法时返回
/// `DomainError::GatewayError`，由编排核心统一脱敏。
#[derive(Clone)]
pub struct HttpGatewayAdapter {
    config: Arc<GatewayHttpConfig>,
    client: Client,
}

/// 网关线上API的响应形状
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireGatewayResponse {
    status: String,
    transaction_id: String,
    amount_cents: i64,
    currency: String,
    #[serde(default)]
    action_required: bool,
    error_message: Option<String>,
    payment_method: Option<WirePaymentMethod>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WirePaymentMethod {
    brand: Option<String>,
    last4: Option<String>,
    exp_month: Option<u16>,
    exp_year: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct WireCustomerSource {
    id: String,
    payment_method: Option<WirePaymentMethod>,
}

#[derive(Debug, Deserialize)]
struct WireClientToken {
    client_token: String,
}

impl HttpGatewayAdapter {
    pub fn new(config: Arc<GatewayHttpConfig>) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    /// 生成请求签名
    fn sign_request(
        &self,
        method: &str,
        path: &str,
        timestamp: &str,
        nonce: &str,
        body: &str,
    ) -> DomainResult<String> {
        let message = format!("{}\n{}\n{}\n{}\n{}", method, path, timestamp, nonce, body);

        let mut mac = HmacSha256::new_from_slice(self.config.api_secret.as_bytes())
            .map_err(|e| DomainError::CryptoError(format!("Failed to initialize HMAC: {}", e)))?;
        mac.update(message.as_bytes());

        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    /// 生成随机字符串
    fn generate_nonce() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(32)
            .map(char::from)
            .collect()
    }

    /// 发送签名请求并解析响应体
    async fn send_signed(&self, method: &str, path: &str, body: String) -> DomainResult<String> {
        let timestamp = chrono::Utc::now().timestamp().to_string();
        let nonce = Self::generate_nonce();
        let signature = self.sign_request(method, path, &timestamp, &nonce, &body)?;
        let url = format!("{}{}", self.config.base_url, path);

        debug!("Calling gateway {}: {} {}", self.config.gateway_id, method, path);

        let request = match method {
            "GET" => self.client.get(&url),
            _ => self.client.post(&url).body(body),
        };

        let response = request
            .header("Content-Type", "application/json")
            .header("X-Api-Key", &self.config.api_key)
            .header("X-Timestamp", &timestamp)
            .header("X-Nonce", &nonce)
            .header("X-Signature", &signature)
            .send()
            .await
            .map_err(|e| DomainError::GatewayError(format!("Gateway request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| DomainError::GatewayError(format!("Failed to read gateway response: {}", e)))?;

        if !status.is_success() {
            error!(
                "Gateway {} returned HTTP {}: {}",
                self.config.gateway_id, status, text
            );
            return Err(DomainError::GatewayError(format!(
                "Gateway returned HTTP {}",
                status
            )));
        }

        Ok(text)
    }

    /// 执行一次支付操作调用
    async fn call_operation(
        &self,
        path: &str,
        kind: TransactionKind,
        data: &PaymentData,
    ) -> DomainResult<GatewayResponse> {
        let payload = serde_json::json!({
            "payment_id": data.payment_id,
            "token": data.token,
            "amount_cents": data.amount.to_cents(),
            "currency": data.currency,
            "store_source": data.store_source,
            "additional_data": data.additional_data,
        });
        let body = serde_json::to_string(&payload)?;

        let text = self.send_signed("POST", path, body).await?;
        let wire: WireGatewayResponse = serde_json::from_str(&text)
            .map_err(|e| DomainError::GatewayError(format!("Invalid gateway response: {}", e)))?;

        self.into_gateway_response(kind, wire)
    }

    fn into_gateway_response(
        &self,
        kind: TransactionKind,
        wire: WireGatewayResponse,
    ) -> DomainResult<GatewayResponse> {
        let raw_response = serde_json::to_value(&wire)?;
        let kind = if wire.action_required {
            TransactionKind::ActionToConfirm
        } else {
            kind
        };

        Ok(GatewayResponse {
            is_success: wire.status == "succeeded" || wire.status == "requires_action",
            action_required: wire.action_required,
            kind,
            transaction_id: wire.transaction_id,
            amount: Money::from_cents(wire.amount_cents),
            currency: wire.currency,
            error: wire.error_message,
            payment_method_info: wire.payment_method.map(|pm| PaymentMethodInfo {
                brand: pm.brand,
                last4: pm.last4,
                exp_month: pm.exp_month,
                exp_year: pm.exp_year,
            }),
            raw_response: Some(raw_response),
        })
    }
}

#[async_trait]
impl GatewayPort for HttpGatewayAdapter {
    fn info(&self) -> PaymentGatewayInfo {
        PaymentGatewayInfo {
            id: self.config.gateway_id.clone(),
            name: self.config.display_name.clone(),
            currencies: self.config.currencies.clone(),
        }
    }

    async fn authorize_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
        self.call_operation("/v1/payments/authorize", TransactionKind::Auth, data)
            .await
    }

    async fn capture_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
        self.call_operation("/v1/payments/capture", TransactionKind::Capture, data)
            .await
    }

    async fn refund_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
        self.call_operation("/v1/payments/refund", TransactionKind::Refund, data)
            .await
    }

    async fn void_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
        self.call_operation("/v1/payments/void", TransactionKind::Void, data)
            .await
    }

    async fn process_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
        self.call_operation("/v1/payments/process", TransactionKind::Capture, data)
            .await
    }

    async fn confirm_payment(&self, data: &PaymentData) -> DomainResult<GatewayResponse> {
        self.call_operation("/v1/payments/confirm", TransactionKind::Confirm, data)
            .await
    }

    async fn list_payment_sources(&self, customer_id: &str) -> DomainResult<Vec<CustomerSource>> {
        let path = format!("/v1/customers/{}/sources", customer_id);
        let text = self.send_signed("GET", &path, String::new()).await?;
        let sources: Vec<WireCustomerSource> = serde_json::from_str(&text)
            .map_err(|e| DomainError::GatewayError(format!("Invalid gateway response: {}", e)))?;

        Ok(sources
            .into_iter()
            .map(|source| CustomerSource {
                id: source.id,
                gateway: self.config.gateway_id.clone(),
                card_info: source.payment_method.map(|pm| PaymentMethodInfo {
                    brand: pm.brand,
                    last4: pm.last4,
                    exp_month: pm.exp_month,
                    exp_year: pm.exp_year,
                }),
            })
            .collect())
    }

    async fn get_client_token(&self, config: &TokenConfig) -> DomainResult<String> {
        let payload = serde_json::json!({ "customer_id": config.customer_id });
        let body = serde_json::to_string(&payload)?;
        let text = self.send_signed("POST", "/v1/tokens/client", body).await?;
        let token: WireClientToken = serde_json::from_str(&text)
            .map_err(|e| DomainError::GatewayError(format!("Invalid gateway response: {}", e)))?;
        Ok(token.client_token)
    }
}
