//! Error types for registry lookups.

use crate::handle::Handle;
use crate::value::ExecutionId;
use std::fmt::{Display, Formatter};

/// Errors surfaced to the protocol layer by registry lookups.
///
/// All variants describe stale or malformed client requests. None of them
/// indicate a broken registry, so callers usually report them as an empty
/// result rather than failing the whole protocol turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No active session owns the handle (never issued, or already resumed).
    NotFound { handle: Handle },
    /// No active session is tracking the thread or sub-execution.
    UnknownThread { thread_id: ExecutionId },
    /// A frame id that is neither the wildcard nor an integer.
    InvalidFrameId { raw: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { handle } => write!(f, "handle not found: {}", handle),
            Self::UnknownThread { thread_id } => {
                write!(f, "thread is not suspended: {}", thread_id)
            }
            Self::InvalidFrameId { raw } => write!(f, "invalid frame id: {:?}", raw),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Result type for registry lookups.
pub type RegistryResult<T> = Result<T, RegistryError>;
