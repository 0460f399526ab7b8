//! Stable error codes shared across the init/push/lifecycle boundary.
//!
//! These are returned by core operations (`Engine::add_graph`, `Element::start`,
//! `DataPipe::push`, ...) and also attached to a failed `ObjectMetadata` so a
//! sink can observe what went wrong with a particular frame.

use thiserror::Error;

/// Stable error codes at the core boundary (see SPEC_FULL.md §6, §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ErrorCode {
    #[error("success")]
    Success,

    #[error("graph configuration could not be parsed")]
    ParseConfigureFail,

    #[error("invalid lifecycle transition for current thread status")]
    ThreadStatusError,

    #[error("no such worker port")]
    NoSuchWorkerPort,

    #[error("stream end")]
    StreamEnd,

    #[error("operation timed out")]
    Timeout,

    #[error("not implemented")]
    NotImplemented,

    #[error("unknown error")]
    Unknown,
}

impl ErrorCode {
    /// Whether this code represents successful completion.
    pub fn is_success(self) -> bool {
        matches!(self, ErrorCode::Success)
    }
}

impl Default for ErrorCode {
    fn default() -> Self {
        ErrorCode::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_is_default() {
        assert_eq!(ErrorCode::default(), ErrorCode::Success);
        assert!(ErrorCode::Success.is_success());
        assert!(!ErrorCode::Timeout.is_success());
    }

    #[test]
    fn display_is_stable() {
        assert_eq!(ErrorCode::NoSuchWorkerPort.to_string(), "no such worker port");
    }
}
