//! Export Errors
//!
//! Every failure of the exporter is terminal for that export. A malformed
//! trace has to be fixed where it was captured; nothing here retries.

use thiserror::Error;

use crate::trace::BufferId;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The trace breaks the input contract (non-buffer argument, bad special
    /// designation, written input, missing weight contents, ...).
    #[error("Contract violation: {0}")]
    ContractViolation(String),

    /// One identity was observed with two different shapes or payloads.
    #[error("Consistency violation for buffer {buffer}: {detail}")]
    ConsistencyViolation { buffer: BufferId, detail: String },

    /// A kernel name was seen with two different bodies.
    #[error("Consistency violation for kernel {kernel}: {detail}")]
    KernelMismatch { kernel: String, detail: String },

    #[error("Invalid export configuration: {0}")]
    InvalidConfig(String),
}

impl ExportError {
    pub fn contract(msg: impl Into<String>) -> Self {
        ExportError::ContractViolation(msg.into())
    }

    pub fn consistency(buffer: BufferId, detail: impl Into<String>) -> Self {
        ExportError::ConsistencyViolation {
            buffer,
            detail: detail.into(),
        }
    }

    /// Is this a malformed-trace error (as opposed to IO or configuration)?
    pub fn is_trace_error(&self) -> bool {
        matches!(
            self,
            ExportError::ContractViolation(_)
                | ExportError::ConsistencyViolation { .. }
                | ExportError::KernelMismatch { .. }
        )
    }
}
