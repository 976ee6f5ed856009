//! Error taxonomy (§7). Each variant maps to one `kind` and, where applicable,
//! a JSON-RPC error code via [`Error::rpc_code`].

use thiserror::Error;

/// Reason a path failed sandbox resolution (C4).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathSecurityReason {
    NotAllowed,
    EscapesSandbox,
    NotFound,
    NotDirectory,
    SymlinkEscape,
}

impl std::fmt::Display for PathSecurityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PathSecurityReason::NotAllowed => "not_allowed",
            PathSecurityReason::EscapesSandbox => "escapes_sandbox",
            PathSecurityReason::NotFound => "not_found",
            PathSecurityReason::NotDirectory => "not_directory",
            PathSecurityReason::SymlinkEscape => "symlink_escape",
        };
        f.write_str(s)
    }
}

use serde::{Deserialize, Serialize};

#[derive(Error, Debug)]
pub enum Error {
    /// missing/ill-typed RPC field, unknown preset, YOLO over RPC, busy agent
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// policy forbids action, ceiling violation, write without allowance
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// escape, symlink follow, not-in-sandbox
    #[error("path security violation ({reason}): original={original} resolved={resolved}")]
    PathSecurity {
        original: String,
        resolved: String,
        reason: PathSecurityReason,
    },

    /// subprocess non-zero exit, schema failure, timeout
    #[error("tool error: {name} - {message}")]
    ToolError { name: String, message: String },

    /// network/HTTP failure from the LLM adapter, after retries exhausted
    #[error("provider error: {0}")]
    ProviderError(String),

    /// summarization failure, ill-formed persisted session
    #[error("context error: {0}")]
    ContextError(String),

    /// invariant violation
    #[error("internal error: {0}")]
    Internal(String),

    /// cooperative cancellation observed at a checkpoint
    #[error("cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn path_security(
        original: impl Into<String>,
        resolved: impl Into<String>,
        reason: PathSecurityReason,
    ) -> Self {
        Self::PathSecurity {
            original: original.into(),
            resolved: resolved.into(),
            reason,
        }
    }

    pub fn tool_error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The taxonomy kind name, as used in §7 and in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidParams(_) => "invalid_params",
            Error::PermissionDenied(_) => "permission_denied",
            Error::PathSecurity { .. } => "path_security",
            Error::ToolError { .. } => "tool_error",
            Error::ProviderError(_) => "provider_error",
            Error::ContextError(_) => "context_error",
            Error::Internal(_) => "internal",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "internal",
            Error::Json(_) => "internal",
        }
    }

    /// JSON-RPC 2.0 error code for this error, per §6.
    pub fn rpc_code(&self) -> i32 {
        match self {
            Error::InvalidParams(_) => -32602,
            Error::PermissionDenied(_) => -32000,
            Error::PathSecurity { .. } => -32000,
            Error::ToolError { .. } => -32000,
            Error::ProviderError(_) => -32000,
            Error::ContextError(_) => -32000,
            Error::Internal(_) | Error::Io(_) | Error::Json(_) => -32603,
            Error::Cancelled => -32000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_params_maps_to_32602() {
        let e = Error::InvalidParams("bad".into());
        assert_eq!(e.rpc_code(), -32602);
        assert_eq!(e.kind(), "invalid_params");
    }

    #[test]
    fn internal_maps_to_32603() {
        let e = Error::Internal("oops".into());
        assert_eq!(e.rpc_code(), -32603);
    }
}
