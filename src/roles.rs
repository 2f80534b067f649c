// RetailOps Gateway - Role Context
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// One role per request: associate, merch, or support.
// Arrives via the X-DEMO-ROLE transport header or an explicit 'role'
// argument. Resolved ONCE per call and threaded through every check —
// never re-read ad hoc downstream.

use crate::error::GateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Caller role. Closed set — the backend speaks the same three values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Associate,
    Merch,
    Support,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Associate, Role::Merch, Role::Support];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Associate => "associate",
            Role::Merch => "merch",
            Role::Support => "support",
        }
    }

    /// Parse a raw role string (case-insensitive, trimmed).
    pub fn parse(raw: &str) -> Result<Role, GateError> {
        match raw.trim().to_lowercase().as_str() {
            "associate" => Ok(Role::Associate),
            "merch" => Ok(Role::Merch),
            "support" => Ok(Role::Support),
            _ => Err(GateError::UnrecognizedRole(raw.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolve the role context for one request.
///
/// Header and argument may each be absent. Both present must agree
/// (post-normalization) or the call fails with RoleMismatch. Neither
/// present fails with UnauthenticatedRole. No side effects.
pub fn resolve(header_role: Option<&str>, arg_role: Option<&str>) -> Result<Role, GateError> {
    match (header_role, arg_role) {
        (Some(h), Some(a)) => {
            let header = Role::parse(h)?;
            let arg = Role::parse(a)?;
            if header != arg {
                return Err(GateError::RoleMismatch {
                    header: header.as_str().to_string(),
                    arg: arg.as_str().to_string(),
                });
            }
            Ok(header)
        }
        (Some(h), None) => Role::parse(h),
        (None, Some(a)) => Role::parse(a),
        (None, None) => Err(GateError::UnauthenticatedRole),
    }
}

// ============================================================================
// TESTS
// ============================================================================
