//! Error surface for the instrument-control frontend
//!
//! Backend statuses of the warning class never surface here; they are
//! recorded on the resource (`last_status`) and logged. Everything below is
//! a true failure that aborts the attempted operation.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Malformed resource name.
    #[error("invalid resource name at offset {pos}: {reason}")]
    Parse { pos: usize, reason: String },

    /// Operation on a closed or never-opened session.
    #[error("invalid session: the resource is closed")]
    InvalidSession,

    /// A blocking operation exceeded its deadline.
    #[error("{op} timed out after {timeout_ms} ms")]
    Timeout { op: &'static str, timeout_ms: u32 },

    /// No resource matched the requested name or pattern.
    #[error("resource not found")]
    ResourceNotFound,

    /// The resource is held by another session or lock.
    #[error("resource busy")]
    ResourceBusy,

    /// The backend denied the requested access mode.
    #[error("access denied")]
    AccessDenied,

    /// Generic backend-status failure with the operation tag.
    #[error("{op} failed with status {status:#010X}")]
    Io { status: i32, op: &'static str },

    /// Malformed binary block framing or length mismatch.
    #[error("protocol error: {reason}")]
    Protocol { reason: String },

    /// Capability absent on this resource kind or backend.
    #[error("{op} is not supported by {kind} resources")]
    Unsupported { op: &'static str, kind: String },

    /// Decode failure on a text read; bytes already consumed are gone.
    #[error("cannot decode received bytes as {encoding} at offset {offset}")]
    Encoding { encoding: String, offset: usize },

    /// A user event handler panicked. Caught at the dispatch boundary and
    /// logged; never forwarded to the backend.
    #[error("event handler panicked")]
    Handler,

    /// The foreign shared library could not be loaded or is missing a
    /// required symbol.
    #[error("visa library error ({path}): {reason}")]
    Library { path: String, reason: String },

    /// Malformed backend selector or configuration value.
    #[error("configuration error: {reason}")]
    Config { reason: String },
}

impl Error {
    /// Operation tag carried by the variant, if any. Used for diagnostics.
    pub fn op(&self) -> Option<&'static str> {
        match self {
            Error::Timeout { op, .. } | Error::Io { op, .. } | Error::Unsupported { op, .. } => {
                Some(op)
            }
            _ => None,
        }
    }

    /// Backend status carried by the variant, if any.
    pub fn status(&self) -> Option<i32> {
        match self {
            Error::Io { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_context() {
        let err = Error::Timeout {
            op: "viRead",
            timeout_ms: 2000,
        };
        assert_eq!(err.to_string(), "viRead timed out after 2000 ms");

        let err = Error::Io {
            status: 0x3FFF_0006,
            op: "viWrite",
        };
        assert!(err.to_string().contains("viWrite"));
        assert!(err.to_string().contains("0x3FFF0006"));
    }

    #[test]
    fn test_accessors() {
        let err = Error::Io {
            status: -5,
            op: "viClear",
        };
        assert_eq!(err.op(), Some("viClear"));
        assert_eq!(err.status(), Some(-5));
        assert_eq!(Error::InvalidSession.op(), None);
    }
}
