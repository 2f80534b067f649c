// RetailOps Gateway - Error Taxonomy
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Every failure a tool call can hit, with a stable machine-readable kind.
// Authorization and confirmation errors are terminal for the call.
// Backend errors distinguish "nothing happened" (unavailable/rejected)
// from "unknown whether something happened" (ambiguous).

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use thiserror::Error;

/// Gateway error taxonomy. Serialized to callers as
/// `{error_kind, message, retry_hint}` — never swallowed.
#[derive(Debug, Clone, Error)]
pub enum GateError {
    #[error("no role supplied: set the X-DEMO-ROLE header or pass a 'role' argument")]
    UnauthenticatedRole,

    #[error("unrecognized role '{0}': expected associate, merch, or support")]
    UnrecognizedRole(String),

    #[error("role mismatch: header says '{header}' but argument says '{arg}'")]
    RoleMismatch { header: String, arg: String },

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("role '{role}' is not allowed to call '{tool}'")]
    PermissionDenied { tool: String, role: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("confirmation token not found — never issued, already used, or swept")]
    TokenNotFound,

    #[error("confirmation token expired at {0}")]
    TokenExpired(DateTime<Utc>),

    #[error("confirming request does not match the previewed action")]
    RequestMismatch,

    #[error("RetailCore is unreachable: {0}")]
    BackendUnavailable(String),

    #[error("RetailCore timed out: {0}")]
    BackendTimeout(String),

    #[error("RetailCore outcome unknown after timeout: {0}")]
    BackendAmbiguous(String),

    #[error("RetailCore rejected the request (HTTP {status}): {detail}")]
    BackendRejected { status: u16, detail: String },
}

impl GateError {
    /// Stable machine-readable kind, snake_case.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnauthenticatedRole => "unauthenticated_role",
            Self::UnrecognizedRole(_) => "unauthenticated_role",
            Self::RoleMismatch { .. } => "role_mismatch",
            Self::UnknownTool(_) => "unknown_tool",
            Self::PermissionDenied { .. } => "permission_denied",
            Self::InvalidArguments(_) => "invalid_arguments",
            Self::TokenNotFound => "token_not_found",
            Self::TokenExpired(_) => "token_expired",
            Self::RequestMismatch => "request_mismatch",
            Self::BackendUnavailable(_) => "backend_unavailable",
            Self::BackendTimeout(_) => "backend_timeout",
            Self::BackendAmbiguous(_) => "backend_ambiguous",
            Self::BackendRejected { .. } => "backend_rejected",
        }
    }

    /// One concrete fallback action for the caller.
    pub fn retry_hint(&self) -> &'static str {
        match self {
            Self::UnauthenticatedRole | Self::UnrecognizedRole(_) | Self::RoleMismatch { .. } => {
                "resend with a single valid role (associate, merch, or support)"
            }
            Self::UnknownTool(_) => "call tools/list for the available tool names",
            Self::PermissionDenied { .. } => "switch to a role in the tool's allowed set",
            Self::InvalidArguments(_) => "fix the flagged argument and resend",
            Self::TokenNotFound | Self::TokenExpired(_) => {
                "resend the call without a token to get a fresh preview"
            }
            Self::RequestMismatch => {
                "resend the exact previewed arguments, or drop the token for a new preview"
            }
            Self::BackendUnavailable(_) | Self::BackendTimeout(_) => {
                "safe to retry the same call after a short wait"
            }
            Self::BackendAmbiguous(_) => {
                "do NOT resend — re-issue the identical call to replay the recorded outcome once it settles"
            }
            Self::BackendRejected { .. } => "the backend refused this action; adjust and preview again",
        }
    }

    /// Structured error object returned to tool callers.
    pub fn to_value(&self) -> Value {
        json!({
            "error_kind": self.kind(),
            "message": self.to_string(),
            "retry_hint": self.retry_hint(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
