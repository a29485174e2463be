use crate::application::{
    AuthorizeRequest, CaptureRequest, ClientTokenRequest, ConfirmRequest, ErrorResponse,
    PaymentGatewayService, ProcessPaymentRequest, RefundRequest, TransactionResponse,
};
use crate::domain::errors::DomainError;
use crate::ports::PaymentRepositoryPort;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// 应用状态
pub struct AppState<R: PaymentRepositoryPort> {
    pub gateway_service: Arc<PaymentGatewayService<R>>,
}

impl<R: PaymentRepositoryPort> Clone for AppState<R> {
    fn clone(&self) -> Self {
        Self {
            gateway_service: self.gateway_service.clone(),
        }
    }
}

/// 领域错误到HTTP状态码的映射
///
/// 基础设施类错误（数据库、网关通信等）的细节只进日志，
/// 响应体里统一用固定提示。
fn error_response(e: DomainError) -> (StatusCode, Json<ErrorResponse>) {
    error!("Payment operation error: {}", e);
    let (status, message) = match &e {
        DomainError::ValidationError(_) | DomainError::InvalidAmount(_) => {
            (StatusCode::BAD_REQUEST, e.to_string())
        }
        DomainError::PaymentNotFound(_) => (StatusCode::NOT_FOUND, e.to_string()),
        DomainError::InactivePayment
        | DomainError::MissingPriorTransaction(_)
        | DomainError::UnsupportedOperation(_) => (StatusCode::CONFLICT, e.to_string()),
        DomainError::PaymentFailed(_) => (StatusCode::PAYMENT_REQUIRED, e.to_string()),
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal server error.".to_string(),
        ),
    };
    (
        status,
        Json(ErrorResponse::new("PAYMENT_ERROR".to_string(), message)),
    )
}

/// 组合支付
pub async fn process_payment<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<ProcessPaymentRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    info!("Received process request for payment: {}", payment_id);

    state
        .gateway_service
        .process_payment(
            payment_id,
            request.token,
            request.store_source,
            request.additional_data,
        )
        .await
        .map(|txn| (StatusCode::OK, Json(TransactionResponse::from(&txn))))
        .map_err(error_response)
}

/// 预授权
pub async fn authorize<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<AuthorizeRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    info!("Received authorize request for payment: {}", payment_id);

    state
        .gateway_service
        .authorize(payment_id, request.token, request.store_source)
        .await
        .map(|txn| (StatusCode::OK, Json(TransactionResponse::from(&txn))))
        .map_err(error_response)
}

/// 扣款
pub async fn capture<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<CaptureRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    info!("Received capture request for payment: {}", payment_id);

    state
        .gateway_service
        .capture(payment_id, request.amount, request.store_source)
        .await
        .map(|txn| (StatusCode::OK, Json(TransactionResponse::from(&txn))))
        .map_err(error_response)
}

/// 退款
pub async fn refund<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<RefundRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    info!("Received refund request for payment: {}", payment_id);

    state
        .gateway_service
        .refund(payment_id, request.amount)
        .await
        .map(|txn| (StatusCode::OK, Json(TransactionResponse::from(&txn))))
        .map_err(error_response)
}

/// 撤销预授权
pub async fn void<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    info!("Received void request for payment: {}", payment_id);

    state
        .gateway_service
        .void(payment_id)
        .await
        .map(|txn| (StatusCode::OK, Json(TransactionResponse::from(&txn))))
        .map_err(error_response)
}

/// 确认
pub async fn confirm<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<ConfirmRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    info!("Received confirm request for payment: {}", payment_id);

    state
        .gateway_service
        .confirm(payment_id, request.additional_data)
        .await
        .map(|txn| (StatusCode::OK, Json(TransactionResponse::from(&txn))))
        .map_err(error_response)
}

/// 取消流程：可退则退，可撤则撤
pub async fn refund_or_void<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
    Path(payment_id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    info!("Received refund-or-void request for payment: {}", payment_id);

    state
        .gateway_service
        .refund_or_void(Some(payment_id))
        .await
        .map(|_| StatusCode::NO_CONTENT)
        .map_err(error_response)
}

/// 列出已注册的网关
pub async fn list_gateways<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
) -> impl IntoResponse {
    (StatusCode::OK, Json(state.gateway_service.list_gateways()))
}

/// 列出客户已存储的支付来源
pub async fn list_payment_sources<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
    Path((gateway, customer_id)): Path<(String, String)>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    state
        .gateway_service
        .list_payment_sources(&gateway, &customer_id)
        .await
        .map(|sources| (StatusCode::OK, Json(sources)))
        .map_err(error_response)
}

/// 获取客户端令牌
pub async fn get_client_token<R: PaymentRepositoryPort + 'static>(
    State(state): State<AppState<R>>,
    Path(gateway): Path<String>,
    Json(request): Json<ClientTokenRequest>,
) -> Result<impl IntoResponse, (StatusCode, Json<ErrorResponse>)> {
    state
        .gateway_service
        .get_client_token(&gateway, request.customer_id)
        .await
        .map(|token| {
            (
                StatusCode::OK,
                Json(serde_json::json!({ "client_token": token })),
            )
        })
        .map_err(error_response)
}

/// 健康检查
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "ok" })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_errors_keep_their_message() {
        let (status, Json(body)) = error_response(DomainError::InvalidAmount(
            "Amount should be a positive number.".to_string(),
        ));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.message, "Amount should be a positive number.");
    }

    #[test]
    fn test_infrastructure_error_detail_stays_out_of_response() {
        let (status, Json(body)) = error_response(DomainError::GatewayError(
            "connection refused by upstream".to_string(),
        ));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Internal server error.");

        let (status, Json(body)) = error_response(DomainError::DatabaseError(
            sqlx::Error::PoolTimedOut,
        ));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.message, "Internal server error.");
    }
}
