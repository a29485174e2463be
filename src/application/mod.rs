pub mod dto;
pub mod gateway_service;

pub use dto::*;
pub use gateway_service::PaymentGatewayService;
