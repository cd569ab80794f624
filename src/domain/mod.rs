//! Domain model: money, accounts, transactions and their lifecycle rules,
//! plus the ports the application layer talks to.

pub mod account;
pub mod clearance;
pub mod money;
pub mod policy;
pub mod ports;
pub mod time;
pub mod transaction;
