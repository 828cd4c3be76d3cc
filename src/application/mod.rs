pub mod balance;
pub mod order_ledger;
pub mod settler;
pub mod statistics;
