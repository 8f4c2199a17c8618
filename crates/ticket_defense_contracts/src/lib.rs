#![forbid(unsafe_code)]

pub mod analysis;
pub mod case;
pub mod common;
pub mod provider_secrets;
pub mod strategy;
pub mod ticket;

pub use common::{ContractViolation, Validate};
