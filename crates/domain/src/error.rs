use std::time::Duration;

/// Failure raised by one of the three external capabilities (LLM, web
/// search, chart renderer). Kept separate from [`Error`] so the executor
/// can recover per-tool failures without unwrapping the whole error chain.
#[derive(thiserror::Error, Debug, Clone)]
pub enum CapabilityError {
    #[error("deadline exceeded after {0:?}")]
    Timeout(Duration),

    #[error("transport: {0}")]
    Transport(String),

    #[error("upstream HTTP {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("parse: {0}")]
    Parse(String),

    #[error("invalid chart payload: {0}")]
    InvalidPayload(String),

    #[error("render: {0}")]
    Render(String),
}

impl CapabilityError {
    /// Wire-stable kind string, used in `tool.error` payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout(_) => "timeout",
            Self::Transport(_) => "transport",
            Self::Upstream { status, .. } if *status < 500 => "upstream_4xx",
            Self::Upstream { .. } => "upstream_5xx",
            Self::Parse(_) => "parse_error",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::Render(_) => "render_error",
        }
    }
}

/// Shared error type used across all Dossier crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("validation: {0}")]
    Validation(String),

    #[error("{capability}: {source}")]
    Capability {
        capability: &'static str,
        source: CapabilityError,
    },

    #[error("planner failed: {0}")]
    PlannerFailed(String),

    #[error("compile failed: {0}")]
    CompileFailed(String),

    #[error("store: {0}")]
    Store(String),

    #[error("run cancelled")]
    Cancelled,

    #[error("run deadline exceeded")]
    RunTimeout,

    #[error("config: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

impl Error {
    /// Wire-stable error kind, used in `run.failed` payloads and the poll
    /// response. Matches the taxonomy clients are expected to branch on.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::PlannerFailed(_) => "planner_failed",
            Self::CompileFailed(_) => "compile_failed",
            Self::Capability { source, .. } => match source {
                CapabilityError::Timeout(_) => "tool_timeout",
                CapabilityError::Transport(_) => "tool_transport",
                _ => "tool_upstream",
            },
            Self::Cancelled => "cancelled",
            Self::RunTimeout => "run_timeout",
            Self::Store(_) | Self::Io(_) => "internal",
            _ => "internal",
        }
    }

    /// A short message safe to surface to clients (no paths, no secrets).
    pub fn sanitized_message(&self) -> String {
        match self {
            Self::Io(_) | Self::Store(_) => "internal storage error".into(),
            Self::Internal(_) => "internal error".into(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capability_kind_strings() {
        assert_eq!(
            CapabilityError::Timeout(Duration::from_secs(1)).kind(),
            "timeout"
        );
        assert_eq!(
            CapabilityError::Upstream {
                status: 404,
                message: "gone".into()
            }
            .kind(),
            "upstream_4xx"
        );
        assert_eq!(
            CapabilityError::Upstream {
                status: 503,
                message: "down".into()
            }
            .kind(),
            "upstream_5xx"
        );
    }

    #[test]
    fn error_kind_taxonomy() {
        assert_eq!(Error::Validation("bad".into()).kind(), "validation");
        assert_eq!(Error::PlannerFailed("x".into()).kind(), "planner_failed");
        assert_eq!(Error::CompileFailed("x".into()).kind(), "compile_failed");
        assert_eq!(Error::Cancelled.kind(), "cancelled");
        assert_eq!(Error::RunTimeout.kind(), "run_timeout");
        assert_eq!(Error::Store("boom".into()).kind(), "internal");
    }

    #[test]
    fn sanitized_message_hides_internals() {
        let e = Error::Internal("secret /var/lib path".into());
        assert_eq!(e.sanitized_message(), "internal error");
        let e = Error::Store("disk full at /data".into());
        assert_eq!(e.sanitized_message(), "internal storage error");
    }

    #[test]
    fn capability_error_maps_to_tool_kinds() {
        let e = Error::Capability {
            capability: "search",
            source: CapabilityError::Timeout(Duration::from_secs(30)),
        };
        assert_eq!(e.kind(), "tool_timeout");
        let e = Error::Capability {
            capability: "llm",
            source: CapabilityError::Upstream {
                status: 500,
                message: "oops".into(),
            },
        };
        assert_eq!(e.kind(), "tool_upstream");
    }
}
