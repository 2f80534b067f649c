// RetailOps Gateway - MCP Server (JSON-RPC 2.0)
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// ALL tool calls route through this gateway.
// Two transports share one dispatcher: stdio for local agents, HTTP
// (POST /mcp) for containerized ones. The HTTP side also carries the
// X-DEMO-ROLE header into the role context.

use crate::backend::ROLE_HEADER;
use crate::router::{ToolCall, ToolRouter};
use serde_json::{json, Value};
use std::io::{self, BufRead, Read, Write};
use std::sync::Arc;
use std::thread;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "retailops-gate";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP worker threads. Each request blocks on RetailCore for at most
/// the write deadline, so a small pool is plenty.
const HTTP_WORKERS: usize = 4;

/// Log to stderr (stdout is JSON-RPC on the stdio transport)
fn log(msg: &str) {
    eprintln!("[{}] {}", SERVER_NAME, msg);
}

fn rpc_result(id: &Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    })
}

fn rpc_error(id: &Value, code: i64, message: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

/// Handle one JSON-RPC message. Returns None for notifications, which
/// get no response on either transport.
pub fn dispatch(router: &ToolRouter, msg: &Value, header_role: Option<&str>) -> Option<Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = &msg["id"];
    let params = &msg["params"];

    match method {
        "initialize" => Some(rpc_result(id, json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": SERVER_NAME,
                "version": SERVER_VERSION,
            }
        }))),

        "notifications/initialized" => None,

        "tools/list" => Some(rpc_result(id, json!({ "tools": router.descriptors() }))),

        "tools/call" => {
            let name = params["name"].as_str().unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

            let call = ToolCall {
                tool: name.to_string(),
                header_role: header_role.map(str::to_string),
                arguments,
            };
            let payload = router.handle(&call);
            let is_error = payload.get("error_kind").is_some();
            let text = serde_json::to_string_pretty(&payload).unwrap_or_default();

            Some(rpc_result(id, json!({
                "content": [{ "type": "text", "text": text }],
                "isError": is_error,
            })))
        }

        "ping" => Some(rpc_result(id, json!({}))),

        _ => {
            if id.is_null() {
                None
            } else {
                Some(rpc_error(id, -32601, &format!("Unknown method: {}", method)))
            }
        }
    }
}

// ============================================================================
// STDIO TRANSPORT
// ============================================================================

/// One JSON-RPC message per line on stdin, one response per line on
/// stdout. No transport headers, so the role must ride in arguments.
pub fn run_stdio(router: Arc<ToolRouter>) {
    log(&format!("Starting {} v{} (stdio)", SERVER_NAME, SERVER_VERSION));
    log(&format!("Tools: {}", router.tool_names().join(", ")));

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                log(&format!("stdin read error: {}", e));
                continue;
            }
        };

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let msg: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                log(&format!("JSON parse error: {}", e));
                continue;
            }
        };

        log(&format!("Received: {}", msg["method"].as_str().unwrap_or("?")));

        if let Some(response) = dispatch(&router, &msg, None) {
            send_line(&response);
        }
    }
}

fn send_line(response: &Value) {
    let msg = serde_json::to_string(response).unwrap_or_default();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    let _ = out.write_all(msg.as_bytes());
    let _ = out.write_all(b"\n");
    let _ = out.flush();
}

// ============================================================================
// HTTP TRANSPORT
// ============================================================================

/// Serve POST /mcp and GET /health on the given port. Blocks forever.
pub fn run_http(router: Arc<ToolRouter>, port: u16) -> anyhow::Result<()> {
    let server = tiny_http::Server::http(("0.0.0.0", port))
        .map_err(|e| anyhow::anyhow!("failed to bind port {}: {}", port, e))?;
    let server = Arc::new(server);

    log(&format!("Starting {} v{} (http) on :{}", SERVER_NAME, SERVER_VERSION, port));
    log(&format!("Tools: {}", router.tool_names().join(", ")));

    let mut workers = Vec::with_capacity(HTTP_WORKERS);
    for _ in 0..HTTP_WORKERS {
        let server = Arc::clone(&server);
        let router = Arc::clone(&router);
        workers.push(thread::spawn(move || loop {
            match server.recv() {
                Ok(request) => handle_http_request(&router, request),
                Err(e) => {
                    log(&format!("accept error: {}", e));
                    return;
                }
            }
        }));
    }

    for worker in workers {
        let _ = worker.join();
    }
    Ok(())
}

fn handle_http_request(router: &ToolRouter, mut request: tiny_http::Request) {
    let path = request.url().split('?').next().unwrap_or("").to_string();
    let method = request.method().clone();

    let (status, body) = match (method, path.as_str()) {
        (tiny_http::Method::Get, "/health") => (
            200,
            json!({"status": "ok", "service": SERVER_NAME}).to_string(),
        ),
        (tiny_http::Method::Post, "/mcp") => {
            let header_role = request
                .headers()
                .iter()
                .find(|h| h.field.equiv(ROLE_HEADER))
                .map(|h| h.value.as_str().to_string());

            let mut raw = String::new();
            if request.as_reader().read_to_string(&mut raw).is_err() {
                (400, rpc_error(&Value::Null, -32700, "unreadable request body").to_string())
            } else {
                match serde_json::from_str::<Value>(&raw) {
                    Err(e) => (
                        400,
                        rpc_error(&Value::Null, -32700, &format!("parse error: {}", e)).to_string(),
                    ),
                    Ok(msg) => match dispatch(router, &msg, header_role.as_deref()) {
                        Some(response) => (200, response.to_string()),
                        // Notification: acknowledged, nothing to say.
                        None => (202, "{}".to_string()),
                    },
                }
            }
        }
        _ => (404, json!({"error": "not found"}).to_string()),
    };

    let mut response = tiny_http::Response::from_string(body).with_status_code(status);
    if let Ok(header) = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..]) {
        response.add_header(header);
    }
    if let Err(e) = request.respond(response) {
        log(&format!("respond error: {}", e));
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::RetailCoreClient;
    use crate::confirm::ConfirmStore;
    use crate::docs::DocsIndex;
    use crate::ledger::IdempotencyLedger;
    use std::path::Path;
    use std::time::Duration;

    fn router() -> ToolRouter {
        // Backend endpoint is never reached by these tests.
        let backend = RetailCoreClient::new(
            "http://127.0.0.1:1",
            Duration::from_secs(1),
            Duration::from_secs(1),
            0,
        )
        .unwrap();
        ToolRouter::new(
            ConfirmStore::new(300),
            IdempotencyLedger::new(3600),
            Box::new(backend),
            DocsIndex::load(Path::new("/nonexistent-docs")).unwrap(),
        )
    }

    #[test]
    fn initialize_reports_server_info() {
        let router = router();
        let msg = json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}});
        let response = dispatch(&router, &msg, None).unwrap();
        assert_eq!(response["result"]["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(response["result"]["serverInfo"]["name"], SERVER_NAME);
    }

    #[test]
    fn tools_list_exposes_all_six() {
        let router = router();
        let msg = json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"});
        let response = dispatch(&router, &msg, None).unwrap();
        assert_eq!(response["result"]["tools"].as_array().unwrap().len(), 6);
    }

    #[test]
    fn tools_call_uses_the_header_role() {
        let router = router();
        let msg = json!({
            "jsonrpc": "2.0", "id": 3, "method": "tools/call",
            "params": {"name": "search", "arguments": {"query": "returns"}}
        });

        // No role anywhere: structured unauthenticated error.
        let response = dispatch(&router, &msg, None).unwrap();
        assert_eq!(response["result"]["isError"], true);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("unauthenticated_role"));

        // Same call with the transport header succeeds.
        let response = dispatch(&router, &msg, Some("associate")).unwrap();
        assert_eq!(response["result"]["isError"], false);
        let text = response["result"]["content"][0]["text"].as_str().unwrap();
        assert!(text.contains("results"));
    }

    #[test]
    fn unknown_method_is_rpc_error() {
        let router = router();
        let msg = json!({"jsonrpc": "2.0", "id": 4, "method": "bogus/method"});
        let response = dispatch(&router, &msg, None).unwrap();
        assert_eq!(response["error"]["code"], -32601);
    }

    #[test]
    fn notifications_get_no_response() {
        let router = router();
        let msg = json!({"jsonrpc": "2.0", "method": "notifications/initialized"});
        assert!(dispatch(&router, &msg, None).is_none());
    }
}
