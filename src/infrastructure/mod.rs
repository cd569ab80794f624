//! Implementations of the domain ports: in-memory stores and the two
//! schedulers (virtual time for batch runs and tests, tokio for real time).

pub mod in_memory;
pub mod tokio_scheduler;
pub mod virtual_clock;
