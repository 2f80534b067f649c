// RetailOps Gateway - Tool Router
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// One pipeline for every tools/call, in a fixed order:
// lookup -> role resolve -> authorize -> validate -> dispatch.
// READs pass straight through. WRITEs clear preview->confirm and the
// idempotency ledger before the backend sees anything.

use crate::backend::{
    Backend, InventoryQuery, ReserveRequest, TicketRequest, TransferRequest,
};
use crate::confirm::ConfirmStore;
use crate::docs::DocsIndex;
use crate::error::GateError;
use crate::ledger::{derive_key, BeginOutcome, IdempotencyLedger};
use crate::registry::{ToolKind, ToolRegistry};
use crate::roles::{self, Role};
use serde::Serialize;
use serde_json::{json, Map, Value};

/// One inbound tool invocation, transport-agnostic. The HTTP transport
/// fills header_role from X-DEMO-ROLE; stdio leaves it None.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub tool: String,
    pub header_role: Option<String>,
    pub arguments: Value,
}

/// The gateway's single decision point. Shared across worker threads;
/// all interior mutability lives in the confirm store and the ledger.
pub struct ToolRouter {
    registry: ToolRegistry,
    confirm: ConfirmStore,
    ledger: IdempotencyLedger,
    backend: Box<dyn Backend>,
    docs: DocsIndex,
}

impl ToolRouter {
    pub fn new(
        confirm: ConfirmStore,
        ledger: IdempotencyLedger,
        backend: Box<dyn Backend>,
        docs: DocsIndex,
    ) -> Self {
        Self {
            registry: ToolRegistry::new(),
            confirm,
            ledger,
            backend,
            docs,
        }
    }

    /// Tool descriptors for tools/list.
    pub fn descriptors(&self) -> Vec<Value> {
        self.registry.descriptors()
    }

    pub fn tool_names(&self) -> Vec<&'static str> {
        self.registry.names()
    }

    /// Route a call and flatten the outcome into a JSON payload. Errors
    /// become structured {error_kind, message, retry_hint} objects so
    /// the calling model can react instead of guessing.
    pub fn handle(&self, call: &ToolCall) -> Value {
        match self.route(call) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("tool={} rejected: {}", call.tool, e);
                e.to_value()
            }
        }
    }

    fn route(&self, call: &ToolCall) -> Result<Value, GateError> {
        let def = self.registry.lookup(&call.tool)?;

        let mut args = match &call.arguments {
            Value::Object(m) => m.clone(),
            Value::Null => Map::new(),
            _ => {
                return Err(GateError::InvalidArguments(
                    "arguments must be a JSON object".to_string(),
                ))
            }
        };

        // Control fields come out before anything else; the remainder is
        // the business payload that gets canonicalized and validated.
        let arg_role = take_string(&mut args, "role")?;
        let confirm_token = take_string(&mut args, "confirm_token")?;
        let client_key = take_string(&mut args, "idempotency_key")?;

        let role = roles::resolve(call.header_role.as_deref(), arg_role.as_deref())?;
        self.registry.authorize(def, role)?;

        log::info!("tool={} role={} kind={:?}", def.name, role, def.kind);

        match def.kind {
            ToolKind::Read => self.run_read(def.name, role, &args),
            ToolKind::Write => {
                self.run_write(def.name, role, args, confirm_token, client_key)
            }
        }
    }

    // ====== READ PATH — stateless, no preview, no ledger ======

    fn run_read(&self, tool: &str, role: Role, args: &Map<String, Value>) -> Result<Value, GateError> {
        match tool {
            "search" => {
                let query = require_str(args, "query")?;
                let hits = self.docs.search(&query, 5);
                Ok(json!({ "results": hits }))
            }
            "fetch" => {
                let id = require_str(args, "id")?;
                let section = self
                    .docs
                    .fetch(&id)
                    .ok_or_else(|| GateError::InvalidArguments(format!("unknown knowledge id: {}", id)))?;
                Ok(serialize_payload(section))
            }
            "inventory_lookup" => {
                let query = InventoryQuery {
                    sku: require_str(args, "sku")?,
                    store_id: require_str(args, "store_id")?,
                    radius_miles: optional_radius(args)?,
                };
                let report = self.backend.lookup_inventory(role, &query)?;
                Ok(serialize_payload(&report))
            }
            other => Err(GateError::UnknownTool(other.to_string())),
        }
    }

    // ====== WRITE PATH — preview->confirm->execute ======

    fn run_write(
        &self,
        tool: &str,
        role: Role,
        args: Map<String, Value>,
        confirm_token: Option<String>,
        client_key: Option<String>,
    ) -> Result<Value, GateError> {
        // Guardrails run on BOTH phases, so a bad request never earns
        // a token in the first place.
        let action = WriteAction::parse(tool, &args)?;

        let canonical = canonicalize(args);
        let key = client_key.unwrap_or_else(|| derive_key(tool, &canonical));

        let token = match confirm_token {
            None => {
                // Tokenless repeat of a completed action replays the
                // stored result instead of minting a pointless preview.
                if let Some(result) = self.ledger.replay(&key) {
                    log::info!("tool={} key={} replayed", tool, key_prefix(&key));
                    return Ok(result);
                }
                self.confirm.sweep();
                let preview = self.confirm.preview(tool, &canonical, action.effect_summary());
                return Ok(json!({
                    "status": "preview",
                    "token": preview.token,
                    "expires_at": preview.expires_at,
                    "effect_summary": preview.effect_summary,
                }));
            }
            Some(t) => t,
        };

        // A lost confirm response leaves the client retrying the same
        // tokened call after the token was consumed. The action already
        // executed, so replay the stored result instead of erroring.
        if let Some(result) = self.ledger.replay(&key) {
            log::info!("tool={} key={} replayed on confirm retry", tool, key_prefix(&key));
            return Ok(result);
        }

        // Token must match the previewed action exactly; any failure here
        // never reaches the ledger or the backend.
        self.confirm.confirm(&token, tool, &canonical)?;

        match self.ledger.begin(&key) {
            BeginOutcome::AlreadySucceeded(result) => Ok(result),
            BeginOutcome::AlreadyPending => Ok(json!({
                "status": "pending",
                "message": "An identical action is in flight or awaiting manual review.",
                "retry_hint": "Do not resend. Check back or escalate to an operator.",
            })),
            BeginOutcome::Proceed => match self.execute(role, &action) {
                Ok(result) => {
                    self.ledger.complete(&key, result.clone());
                    Ok(result)
                }
                // Ambiguous outcome stays pending: RetailCore may have
                // executed, so nobody gets to re-run this key blindly.
                Err(e @ GateError::BackendAmbiguous(_)) => {
                    log::error!("tool={} key={} ambiguous, held pending", tool, key_prefix(&key));
                    Err(e)
                }
                Err(e) => {
                    self.ledger.fail(&key, &e.to_string());
                    Err(e)
                }
            },
        }
    }

    fn execute(&self, role: Role, action: &WriteAction) -> Result<Value, GateError> {
        match action {
            WriteAction::Reserve(req) => {
                let outcome = self.backend.reserve_item(role, req)?;
                Ok(with_status(serialize_payload(&outcome), "reserved"))
            }
            WriteAction::Transfer(req) => {
                let outcome = self.backend.create_transfer(role, req)?;
                Ok(with_status(serialize_payload(&outcome), "created"))
            }
            WriteAction::Ticket(req) => {
                let outcome = self.backend.create_ticket(role, req)?;
                Ok(with_status(serialize_payload(&outcome), "created"))
            }
        }
    }
}

/// Parsed, guardrail-checked WRITE request plus its human summary.
enum WriteAction {
    Reserve(ReserveRequest),
    Transfer(TransferRequest),
    Ticket(TicketRequest),
}

impl WriteAction {
    fn parse(tool: &str, args: &Map<String, Value>) -> Result<Self, GateError> {
        match tool {
            "reserve_item" => Ok(WriteAction::Reserve(ReserveRequest {
                sku: require_str(args, "sku")?,
                store_id: require_str(args, "store_id")?,
                qty: require_qty(args)?,
            })),
            "create_transfer" => {
                let from_store = require_str(args, "from_store")?;
                let to_store = require_str(args, "to_store")?;
                if from_store == to_store {
                    return Err(GateError::InvalidArguments(
                        "from_store and to_store must differ".to_string(),
                    ));
                }
                Ok(WriteAction::Transfer(TransferRequest {
                    sku: require_str(args, "sku")?,
                    from_store,
                    to_store,
                    qty: require_qty(args)?,
                    reason: optional_str(args, "reason")?,
                }))
            }
            "create_ticket" => Ok(WriteAction::Ticket(TicketRequest {
                category: require_str(args, "category")?,
                severity: require_str(args, "severity")?,
                store_id: require_str(args, "store_id")?,
                description: require_str(args, "description")?,
            })),
            other => Err(GateError::UnknownTool(other.to_string())),
        }
    }

    fn effect_summary(&self) -> String {
        match self {
            WriteAction::Reserve(r) => {
                format!("Reserve {} x {} at {}", r.qty, r.sku, r.store_id)
            }
            WriteAction::Transfer(t) => format!(
                "Transfer {} x {} from {} to {}",
                t.qty, t.sku, t.from_store, t.to_store
            ),
            WriteAction::Ticket(t) => format!(
                "Open a {} {} ticket for {}",
                t.severity, t.category, t.store_id
            ),
        }
    }
}

// ====== ARGUMENT HELPERS ======

/// Canonical argument form: compact JSON with sorted keys. serde_json's
/// map is ordered, so serializing the object directly is stable.
fn canonicalize(args: Map<String, Value>) -> String {
    serde_json::to_string(&Value::Object(args)).unwrap_or_default()
}

/// Short key prefix for log lines. Client keys are arbitrary UTF-8, so
/// slice by chars, not bytes.
fn key_prefix(key: &str) -> String {
    key.chars().take(12).collect()
}

fn take_string(obj: &mut Map<String, Value>, key: &str) -> Result<Option<String>, GateError> {
    match obj.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(GateError::InvalidArguments(format!("{} must be a string", key))),
    }
}

fn require_str(obj: &Map<String, Value>, key: &str) -> Result<String, GateError> {
    let value = obj
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| GateError::InvalidArguments(format!("{} must be a non-empty string", key)))?;
    Ok(value.to_string())
}

fn optional_str(obj: &Map<String, Value>, key: &str) -> Result<Option<String>, GateError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(GateError::InvalidArguments(format!("{} must be a string", key))),
    }
}

fn require_qty(obj: &Map<String, Value>) -> Result<u32, GateError> {
    let qty = obj
        .get("qty")
        .and_then(Value::as_u64)
        .ok_or_else(|| GateError::InvalidArguments("qty must be a positive integer".to_string()))?;
    if !(1..=20).contains(&qty) {
        return Err(GateError::InvalidArguments(
            "qty must be between 1 and 20".to_string(),
        ));
    }
    Ok(qty as u32)
}

fn optional_radius(obj: &Map<String, Value>) -> Result<f64, GateError> {
    let radius = match obj.get("radius_miles") {
        None | Some(Value::Null) => 25.0,
        Some(v) => v
            .as_f64()
            .ok_or_else(|| GateError::InvalidArguments("radius_miles must be a number".to_string()))?,
    };
    if radius <= 0.0 {
        return Err(GateError::InvalidArguments(
            "radius_miles must be greater than zero".to_string(),
        ));
    }
    Ok(radius)
}

/// Serialize a plain data struct. These types are string/number records,
/// so serialization cannot fail in practice.
fn serialize_payload<T: Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

fn with_status(mut payload: Value, status: &str) -> Value {
    if let Value::Object(m) = &mut payload {
        m.insert("status".to_string(), json!(status));
    }
    payload
}

// ============================================================================
// TESTS
// ============================================================================
