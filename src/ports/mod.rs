pub mod gateway_port;
pub mod payment_repository_port;

pub use gateway_port::GatewayPort;
pub use payment_repository_port::PaymentRepositoryPort;
