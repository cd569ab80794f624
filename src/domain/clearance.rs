use crate::error::TransferError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Checks clearance codes entered to release flagged transfers.
///
/// The code is injected configuration. This is a demo gate, not an
/// authentication boundary.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClearanceGate {
    code: String,
}

impl ClearanceGate {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    pub fn verify(&self, entered: &str) -> Result<(), TransferError> {
        if !self.code.is_empty() && entered.trim() == self.code {
            Ok(())
        } else {
            Err(TransferError::InvalidClearanceCode)
        }
    }
}

impl Default for ClearanceGate {
    fn default() -> Self {
        Self::new("CLR-7731")
    }
}

// Keep the code out of logs and `{:?}` dumps of the config.
impl fmt::Debug for ClearanceGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClearanceGate").field("code", &"***").finish()
    }
}
