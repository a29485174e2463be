use super::handlers::*;
use crate::ports::PaymentRepositoryPort;
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub fn create_router<R: PaymentRepositoryPort + 'static>(state: AppState<R>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/payments/:payment_id/process", post(process_payment))
        .route("/api/payments/:payment_id/authorize", post(authorize))
        .route("/api/payments/:payment_id/capture", post(capture))
        .route("/api/payments/:payment_id/refund", post(refund))
        .route("/api/payments/:payment_id/void", post(void))
        .route("/api/payments/:payment_id/confirm", post(confirm))
        .route(
            "/api/payments/:payment_id/refund-or-void",
            post(refund_or_void),
        )
        .route("/api/gateways", get(list_gateways))
        .route(
            "/api/gateways/:gateway/sources/:customer_id",
            get(list_payment_sources),
        )
        .route("/api/gateways/:gateway/client-token", post(get_client_token))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
