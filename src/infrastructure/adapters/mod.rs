pub mod http_gateway_adapter;
pub mod mysql_payment_repository;

pub use http_gateway_adapter::HttpGatewayAdapter;
pub use mysql_payment_repository::MySqlPaymentRepository;
