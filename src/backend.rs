// RetailOps Gateway - Backend Proxy Client
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Typed client for RetailCore's inventory/reserve/transfer/ticket
// endpoints. READs: short timeout, bounded retries with backoff.
// WRITEs: one longer-deadline attempt; only connection-refused (request
// never left) is retried. A write whose outcome is unknown surfaces
// BackendAmbiguous — never a blind resend.

use crate::error::GateError;
use crate::roles::Role;
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;

/// Role propagation header, shared contract with RetailCore.
pub const ROLE_HEADER: &str = "X-DEMO-ROLE";

// ============================================================================
// TYPED REQUESTS / RESULTS — RetailCore wire contract
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryQuery {
    pub sku: String,
    pub store_id: String,
    pub radius_miles: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreAvailability {
    pub store_id: String,
    pub store_name: String,
    pub city: String,
    pub state: String,
    pub distance_miles: f64,
    pub on_hand: i64,
    pub reserved: i64,
    pub available: i64,
    pub last_updated: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryReport {
    pub sku: String,
    pub query_store_id: String,
    pub radius_miles: f64,
    pub stores: Vec<StoreAvailability>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveRequest {
    pub sku: String,
    pub store_id: String,
    pub qty: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReserveOutcome {
    pub reservation_id: String,
    pub store_id: String,
    pub sku: String,
    pub qty: u32,
    pub on_hand: i64,
    pub reserved: i64,
    pub last_updated: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub sku: String,
    pub from_store: String,
    pub to_store: String,
    pub qty: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOutcome {
    pub transfer_id: i64,
    pub from_store: String,
    pub to_store: String,
    pub sku: String,
    pub qty: u32,
    pub inbound_status: String,
    pub expected_date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketRequest {
    pub category: String,
    pub severity: String,
    pub store_id: String,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketOutcome {
    pub ticket_id: String,
    pub opened_date: String,
    pub store_id: String,
    pub category: String,
    pub severity: String,
    // RetailCore sends this as "status"; kept distinct from the
    // gateway's response envelope status.
    #[serde(alias = "status")]
    pub ticket_status: String,
}

// ============================================================================
// BACKEND SEAM
// ============================================================================

/// One method per RetailCore operation. The router talks only to this
/// trait, so tests can count invocations with a double.
pub trait Backend: Send + Sync {
    fn lookup_inventory(&self, role: Role, query: &InventoryQuery) -> Result<InventoryReport, GateError>;
    fn reserve_item(&self, role: Role, req: &ReserveRequest) -> Result<ReserveOutcome, GateError>;
    fn create_transfer(&self, role: Role, req: &TransferRequest) -> Result<TransferOutcome, GateError>;
    fn create_ticket(&self, role: Role, req: &TicketRequest) -> Result<TicketOutcome, GateError>;
}

/// Production client over HTTP.
pub struct RetailCoreClient {
    base_url: String,
    /// Short deadline, fail closed.
    read_client: Client,
    /// Longer deadline; timeout here means outcome unknown.
    write_client: Client,
    read_retries: u32,
    write_connect_retries: u32,
}

impl RetailCoreClient {
    pub fn new(
        base_url: &str,
        read_timeout: Duration,
        write_timeout: Duration,
        read_retries: u32,
    ) -> anyhow::Result<Self> {
        let read_client = Client::builder()
            .user_agent("RetailOpsGate/1.0")
            .timeout(read_timeout)
            .build()?;
        let write_client = Client::builder()
            .user_agent("RetailOpsGate/1.0")
            .timeout(write_timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            read_client,
            write_client,
            read_retries,
            write_connect_retries: 1,
        })
    }

    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        role: Role,
        params: &[(&str, String)],
    ) -> Result<T, GateError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            let sent = self
                .read_client
                .get(&url)
                .header(ROLE_HEADER, role.as_str())
                .query(params)
                .send();
            match sent {
                Ok(resp) => return parse_response(resp, false),
                Err(e) if attempt < self.read_retries && (e.is_connect() || e.is_timeout()) => {
                    attempt += 1;
                    log::warn!("GET {} attempt {} failed ({}), backing off", path, attempt, e);
                    thread::sleep(backoff(attempt));
                }
                Err(e) if e.is_timeout() => {
                    return Err(GateError::BackendTimeout(format!("GET {}: {}", path, e)))
                }
                Err(e) => return Err(GateError::BackendUnavailable(format!("GET {}: {}", path, e))),
            }
        }
    }

    fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        role: Role,
        payload: &Value,
    ) -> Result<T, GateError> {
        let url = format!("{}{}", self.base_url, path);
        let mut attempt = 0u32;
        loop {
            let sent = self
                .write_client
                .post(&url)
                .header(ROLE_HEADER, role.as_str())
                .json(payload)
                .send();
            match sent {
                Ok(resp) => return parse_response(resp, true),
                // Connection refused: the request never left, no effect
                // can exist yet, so this one class is safe to retry.
                Err(e) if e.is_connect() && attempt < self.write_connect_retries => {
                    attempt += 1;
                    log::warn!("POST {} connect failed ({}), one retry", path, e);
                    thread::sleep(backoff(attempt));
                }
                Err(e) if e.is_connect() => {
                    return Err(GateError::BackendUnavailable(format!("POST {}: {}", path, e)))
                }
                Err(e) if e.is_timeout() => {
                    return Err(GateError::BackendAmbiguous(format!(
                        "POST {} hit the write deadline; RetailCore may have executed it: {}",
                        path, e
                    )))
                }
                // Sent but failed mid-flight — effect unknown.
                Err(e) => {
                    return Err(GateError::BackendAmbiguous(format!("POST {}: {}", path, e)))
                }
            }
        }
    }
}

impl Backend for RetailCoreClient {
    fn lookup_inventory(&self, role: Role, query: &InventoryQuery) -> Result<InventoryReport, GateError> {
        self.get_json(
            "/inventory/lookup",
            role,
            &[
                ("sku", query.sku.clone()),
                ("store_id", query.store_id.clone()),
                ("radius_miles", query.radius_miles.to_string()),
            ],
        )
    }

    fn reserve_item(&self, role: Role, req: &ReserveRequest) -> Result<ReserveOutcome, GateError> {
        // confirm:true — the gateway owns the preview protocol; the proxy
        // only ever asks RetailCore to execute.
        let payload = json!({
            "sku": req.sku,
            "store_id": req.store_id,
            "qty": req.qty,
            "confirm": true,
        });
        self.post_json("/reserve", role, &payload)
    }

    fn create_transfer(&self, role: Role, req: &TransferRequest) -> Result<TransferOutcome, GateError> {
        let payload = json!({
            "sku": req.sku,
            "from_store": req.from_store,
            "to_store": req.to_store,
            "qty": req.qty,
            "reason": req.reason,
            "confirm": true,
        });
        self.post_json("/transfer", role, &payload)
    }

    fn create_ticket(&self, role: Role, req: &TicketRequest) -> Result<TicketOutcome, GateError> {
        let payload = json!({
            "category": req.category,
            "severity": req.severity,
            "store_id": req.store_id,
            "description": req.description,
        });
        self.post_json("/tickets", role, &payload)
    }
}

fn backoff(attempt: u32) -> Duration {
    Duration::from_millis(100 * u64::from(attempt))
}

/// Classify a completed HTTP exchange. 2xx parses into the typed result;
/// 4xx is a business rejection carrying RetailCore's detail string;
/// 5xx is transient. A 2xx write body we cannot parse counts as
/// ambiguous — the backend executed, we just can't prove what.
fn parse_response<T: DeserializeOwned>(
    resp: reqwest::blocking::Response,
    is_write: bool,
) -> Result<T, GateError> {
    let status = resp.status().as_u16();
    if (200..300).contains(&status) {
        return resp.json::<T>().map_err(|e| {
            let msg = format!("unreadable RetailCore response: {}", e);
            if is_write {
                GateError::BackendAmbiguous(msg)
            } else {
                GateError::BackendUnavailable(msg)
            }
        });
    }

    let detail = resp
        .text()
        .ok()
        .map(|body| {
            serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v.get("detail").and_then(|d| d.as_str()).map(str::to_string))
                .unwrap_or(body)
        })
        .unwrap_or_default();

    if (400..500).contains(&status) {
        Err(GateError::BackendRejected { status, detail })
    } else {
        Err(GateError::BackendUnavailable(format!("HTTP {}: {}", status, detail)))
    }
}

// ============================================================================
// TESTS — tiny_http mock RetailCore
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::thread::JoinHandle;

    fn client_for(base: &str) -> RetailCoreClient {
        RetailCoreClient::new(base, Duration::from_secs(2), Duration::from_secs(2), 0).unwrap()
    }

    /// One-shot mock backend: answers a single request then exits.
    fn mock_backend(
        status: u16,
        body: &'static str,
    ) -> (String, JoinHandle<(String, String, String)>) {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = std::thread::spawn(move || {
            let mut req = server.recv().unwrap();
            let method = req.method().to_string();
            let url = req.url().to_string();
            let role = req
                .headers()
                .iter()
                .find(|h| h.field.equiv(ROLE_HEADER))
                .map(|h| h.value.as_str().to_string())
                .unwrap_or_default();
            let mut request_body = String::new();
            req.as_reader().read_to_string(&mut request_body).unwrap();
            let response = tiny_http::Response::from_string(body).with_status_code(status);
            req.respond(response).unwrap();
            (format!("{} {}", method, url), role, request_body)
        });
        (format!("http://{}", addr), handle)
    }

    #[test]
    fn lookup_parses_report_and_propagates_role() {
        let (base, handle) = mock_backend(
            200,
            r#"{"sku":"AST-LIN-BLZ-SND-M","query_store_id":"ST002","radius_miles":25.0,
                "stores":[{"store_id":"ST002","store_name":"Soho","city":"New York","state":"NY",
                "distance_miles":0.0,"on_hand":4,"reserved":1,"available":3,
                "last_updated":"2026-08-01T00:00:00Z"}]}"#,
        );
        let client = client_for(&base);
        let query = InventoryQuery {
            sku: "AST-LIN-BLZ-SND-M".into(),
            store_id: "ST002".into(),
            radius_miles: 25.0,
        };

        let report = client.lookup_inventory(Role::Associate, &query).unwrap();
        assert_eq!(report.stores.len(), 1);
        assert_eq!(report.stores[0].available, 3);

        let (line, role, _) = handle.join().unwrap();
        assert!(line.starts_with("GET /inventory/lookup?"));
        assert_eq!(role, "associate");
    }

    #[test]
    fn reserve_sends_confirm_true_and_parses_outcome() {
        let (base, handle) = mock_backend(
            200,
            r#"{"reservation_id":"R123","store_id":"ST002","sku":"AST-LIN-BLZ-SND-M",
                "qty":1,"on_hand":3,"reserved":2,"last_updated":"2026-08-01T00:00:00Z"}"#,
        );
        let client = client_for(&base);
        let req = ReserveRequest { sku: "AST-LIN-BLZ-SND-M".into(), store_id: "ST002".into(), qty: 1 };

        let outcome = client.reserve_item(Role::Associate, &req).unwrap();
        assert_eq!(outcome.reservation_id, "R123");

        let (line, _, body) = handle.join().unwrap();
        assert_eq!(line, "POST /reserve");
        assert!(body.contains(r#""confirm":true"#), "proxy must always execute: {}", body);
    }

    #[test]
    fn read_retries_after_timeout_then_succeeds() {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let handle = std::thread::spawn(move || {
            // First request stalls past the read deadline; the client
            // gives up and the late response hits a dead socket.
            let first = server.recv().unwrap();
            std::thread::sleep(Duration::from_millis(400));
            let _ = first.respond(tiny_http::Response::from_string("late"));

            let second = server.recv().unwrap();
            let _ = second.respond(tiny_http::Response::from_string(
                r#"{"sku":"X","query_store_id":"ST001","radius_miles":25.0,"stores":[]}"#,
            ));
        });

        let client = RetailCoreClient::new(
            &format!("http://{}", addr),
            Duration::from_millis(300),
            Duration::from_secs(2),
            1,
        )
        .unwrap();
        let query = InventoryQuery { sku: "X".into(), store_id: "ST001".into(), radius_miles: 25.0 };

        let report = client.lookup_inventory(Role::Associate, &query).unwrap();
        assert!(report.stores.is_empty());
        handle.join().unwrap();
    }

    #[test]
    fn http_409_is_backend_rejected_with_detail() {
        let (base, _handle) = mock_backend(409, r#"{"detail":"Insufficient on_hand inventory"}"#);
        let client = client_for(&base);
        let req = ReserveRequest { sku: "X".into(), store_id: "ST001".into(), qty: 20 };

        let err = client.reserve_item(Role::Associate, &req).unwrap_err();
        match err {
            GateError::BackendRejected { status, detail } => {
                assert_eq!(status, 409);
                assert!(detail.contains("Insufficient"));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[test]
    fn http_500_is_backend_unavailable() {
        let (base, _handle) = mock_backend(500, "internal error");
        let client = client_for(&base);
        let query = InventoryQuery { sku: "X".into(), store_id: "ST001".into(), radius_miles: 25.0 };

        let err = client.lookup_inventory(Role::Associate, &query).unwrap_err();
        assert_eq!(err.kind(), "backend_unavailable");
    }

    #[test]
    fn unreachable_backend_is_unavailable_not_ambiguous() {
        // Nothing listens here; connect is refused, so no effect exists.
        let client = client_for("http://127.0.0.1:1");
        let req = TicketRequest {
            category: "pos".into(),
            severity: "high".into(),
            store_id: "ST001".into(),
            description: "register down".into(),
        };
        let err = client.create_ticket(Role::Support, &req).unwrap_err();
        assert_eq!(err.kind(), "backend_unavailable");
    }
}
