pub mod account;
pub mod errors;
pub mod fees;
pub mod position;
pub mod pricing;
pub mod types;
