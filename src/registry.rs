// RetailOps Gateway - Tool Schema Registry
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Static map of tool name -> {classification, allowed roles, input schema}.
// Built once at process start, read-only after, safe to share across
// worker threads. Unknown tools and disallowed roles stop here.

use crate::error::GateError;
use crate::roles::Role;
use serde_json::{json, Value};

/// READ tools are stateless pass-throughs. WRITE tools mutate backend
/// state and must clear the preview->confirm protocol first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Read,
    Write,
}

/// One registered tool. Immutable after startup.
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub kind: ToolKind,
    /// Empty slice = any authenticated role.
    pub allowed_roles: &'static [Role],
    pub description: &'static str,
    properties: Value,
    required: &'static [&'static str],
}

impl ToolDefinition {
    pub fn allows(&self, role: Role) -> bool {
        self.allowed_roles.is_empty() || self.allowed_roles.contains(&role)
    }

    /// MCP tool descriptor for tools/list.
    pub fn descriptor(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": {
                "type": "object",
                "properties": self.properties,
                "required": self.required,
            }
        })
    }
}

/// The registry itself — a fixed table, linear lookup (six tools).
pub struct ToolRegistry {
    tools: Vec<ToolDefinition>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: build_tools() }
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolDefinition, GateError> {
        self.tools
            .iter()
            .find(|t| t.name == name)
            .ok_or_else(|| GateError::UnknownTool(name.to_string()))
    }

    /// Role gate. PermissionDenied carries both sides for the caller.
    pub fn authorize(&self, def: &ToolDefinition, role: Role) -> Result<(), GateError> {
        if def.allows(role) {
            Ok(())
        } else {
            Err(GateError::PermissionDenied {
                tool: def.name.to_string(),
                role: role.as_str().to_string(),
            })
        }
    }

    /// All tool descriptors, registry order.
    pub fn descriptors(&self) -> Vec<Value> {
        self.tools.iter().map(ToolDefinition::descriptor).collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tools.iter().map(|t| t.name).collect()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

const ANY_ROLE: &[Role] = &[];

fn build_tools() -> Vec<ToolDefinition> {
    vec![
        // ====== READ TOOLS — stateless, no preview, no ledger ======
        ToolDefinition {
            name: "search",
            kind: ToolKind::Read,
            allowed_roles: ANY_ROLE,
            description: "Search internal markdown knowledge docs and return top citation candidates.",
            properties: json!({
                "query": {"type": "string", "description": "Search query"},
                "role": {"type": "string", "description": "Caller role if headers are unavailable"}
            }),
            required: &["query"],
        },
        ToolDefinition {
            name: "fetch",
            kind: ToolKind::Read,
            allowed_roles: ANY_ROLE,
            description: "Fetch a specific knowledge section by stable id for citation-ready content.",
            properties: json!({
                "id": {"type": "string", "description": "Stable section id, e.g. doc:Support_Runbook#section-2"},
                "role": {"type": "string", "description": "Caller role if headers are unavailable"}
            }),
            required: &["id"],
        },
        ToolDefinition {
            name: "inventory_lookup",
            kind: ToolKind::Read,
            allowed_roles: ANY_ROLE,
            description: "Lookup inventory availability across nearby stores.",
            properties: json!({
                "sku": {"type": "string", "description": "Product SKU"},
                "store_id": {"type": "string", "description": "Base store for the radius search"},
                "radius_miles": {"type": "number", "description": "Search radius in miles (default: 25)", "default": 25.0},
                "role": {"type": "string", "description": "Caller role if headers are unavailable"}
            }),
            required: &["sku", "store_id"],
        },

        // ====== WRITE TOOLS — preview->confirm + idempotency ledger ======
        ToolDefinition {
            name: "reserve_item",
            kind: ToolKind::Write,
            allowed_roles: &[Role::Associate],
            description: "Reserve units of a SKU at a store. First call returns a preview; \
                          resend with confirm_token to execute.",
            properties: json!({
                "sku": {"type": "string", "description": "Product SKU"},
                "store_id": {"type": "string", "description": "Store holding the reservation"},
                "qty": {"type": "integer", "description": "Units to reserve (1-20)"},
                "confirm_token": {"type": "string", "description": "Token from the preview response"},
                "idempotency_key": {"type": "string", "description": "Optional client-supplied dedup key"},
                "role": {"type": "string", "description": "Caller role if headers are unavailable"}
            }),
            required: &["sku", "store_id", "qty"],
        },
        ToolDefinition {
            name: "create_transfer",
            kind: ToolKind::Write,
            allowed_roles: &[Role::Merch],
            description: "Create a store-to-store transfer. First call returns a preview; \
                          resend with confirm_token to execute.",
            properties: json!({
                "sku": {"type": "string", "description": "Product SKU"},
                "from_store": {"type": "string", "description": "Source store"},
                "to_store": {"type": "string", "description": "Destination store"},
                "qty": {"type": "integer", "description": "Units to transfer (1-20)"},
                "reason": {"type": "string", "description": "Why the transfer is needed"},
                "confirm_token": {"type": "string", "description": "Token from the preview response"},
                "idempotency_key": {"type": "string", "description": "Optional client-supplied dedup key"},
                "role": {"type": "string", "description": "Caller role if headers are unavailable"}
            }),
            required: &["sku", "from_store", "to_store", "qty"],
        },
        ToolDefinition {
            name: "create_ticket",
            kind: ToolKind::Write,
            allowed_roles: &[Role::Support],
            description: "Open a support ticket for a store. First call returns a preview; \
                          resend with confirm_token to execute.",
            properties: json!({
                "category": {"type": "string", "description": "Ticket category"},
                "severity": {"type": "string", "description": "Ticket severity"},
                "store_id": {"type": "string", "description": "Store the ticket concerns"},
                "description": {"type": "string", "description": "What happened (non-empty)"},
                "confirm_token": {"type": "string", "description": "Token from the preview response"},
                "idempotency_key": {"type": "string", "description": "Optional client-supplied dedup key"},
                "role": {"type": "string", "description": "Caller role if headers are unavailable"}
            }),
            required: &["category", "severity", "store_id", "description"],
        },
    ]
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_every_registered_tool() {
        let reg = ToolRegistry::new();
        for name in ["search", "fetch", "inventory_lookup", "reserve_item", "create_transfer", "create_ticket"] {
            assert!(reg.lookup(name).is_ok(), "missing tool {}", name);
        }
    }

    #[test]
    fn unknown_tool_rejected() {
        let reg = ToolRegistry::new();
        let err = reg.lookup("drop_tables").unwrap_err();
        assert_eq!(err.kind(), "unknown_tool");
    }

    #[test]
    fn read_tools_allow_any_role() {
        let reg = ToolRegistry::new();
        for name in ["search", "fetch", "inventory_lookup"] {
            let def = reg.lookup(name).unwrap();
            assert_eq!(def.kind, ToolKind::Read);
            for role in Role::ALL {
                assert!(reg.authorize(def, role).is_ok(), "{} should allow {}", name, role);
            }
        }
    }

    #[test]
    fn write_tools_enforce_role_table() {
        let reg = ToolRegistry::new();
        let cases = [
            ("reserve_item", Role::Associate),
            ("create_transfer", Role::Merch),
            ("create_ticket", Role::Support),
        ];
        for (name, allowed) in cases {
            let def = reg.lookup(name).unwrap();
            assert_eq!(def.kind, ToolKind::Write);
            for role in Role::ALL {
                let outcome = reg.authorize(def, role);
                if role == allowed {
                    assert!(outcome.is_ok(), "{} should allow {}", name, role);
                } else {
                    assert_eq!(outcome.unwrap_err().kind(), "permission_denied");
                }
            }
        }
    }

    #[test]
    fn descriptors_expose_input_schema() {
        let reg = ToolRegistry::new();
        let descriptors = reg.descriptors();
        assert_eq!(descriptors.len(), 6);
        let reserve = descriptors.iter().find(|d| d["name"] == "reserve_item").unwrap();
        assert_eq!(reserve["inputSchema"]["type"], "object");
        assert!(reserve["inputSchema"]["properties"]["confirm_token"].is_object());
    }
}
