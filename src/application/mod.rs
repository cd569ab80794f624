//! Application layer containing the core business logic orchestration.
//!
//! `TransferService` creates transactions; `LifecycleEngine` drives them from
//! submission to arrival on an injected scheduler.

pub mod lifecycle;
pub mod transfer;
