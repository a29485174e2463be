pub mod entities;
pub mod errors;
pub mod value_objects;

pub use entities::{Payment, Transaction};
pub use errors::{DomainError, DomainResult};
pub use value_objects::{CardInfo, ChargeStatus, Money, TransactionKind};
