pub mod adapters;
pub mod config;

pub use adapters::{HttpGatewayAdapter, MySqlPaymentRepository};
pub use config::GatewayHttpConfig;
