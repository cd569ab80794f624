//! Adapters between the outside world (files, terminals) and the application layer.

pub mod csv;
