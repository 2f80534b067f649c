// RetailOps Gateway - Idempotency Ledger
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Key -> {pending|succeeded|failed, result}. Exactly one caller per key
// gets Proceed and owns the backend call; everyone else sees the pending
// or succeeded signal. Keys derive from tool + canonical args (or an
// explicit client key), so repeats of the same action collapse.
// Terminal entries are evicted after the retention window.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;

/// Entry status. Pending also covers confirmed-but-ambiguous writes,
/// which stay pending for manual review rather than auto-retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerStatus {
    Pending,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    status: LedgerStatus,
    result: Option<Value>,
    error: Option<String>,
    updated_at: DateTime<Utc>,
}

/// What begin() tells the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum BeginOutcome {
    /// This caller owns the backend call and MUST complete() or fail().
    Proceed,
    /// Another caller is mid-flight (or the outcome is ambiguous).
    AlreadyPending,
    /// The write already happened; replay this result, do not re-execute.
    AlreadySucceeded(Value),
}

/// Lifecycle-scoped store, created at process start. The mutex
/// serializes concurrent begin() calls on the same key.
pub struct IdempotencyLedger {
    retention: Duration,
    inner: Mutex<HashMap<String, LedgerEntry>>,
}

impl IdempotencyLedger {
    pub fn new(retention_secs: i64) -> Self {
        Self {
            retention: Duration::seconds(retention_secs),
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Claim a key. Failed entries may be retried: the claim resets them
    /// to pending. Evicts stale terminal entries as a side effect.
    pub fn begin(&self, key: &str) -> BeginOutcome {
        let now = Utc::now();
        let mut table = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        // Lazy eviction — terminal entries past retention go away here.
        // Pending entries are never evicted: an in-flight or ambiguous
        // write must stay visible until an operator resolves it.
        let horizon = now - self.retention;
        table.retain(|_, e| e.status == LedgerStatus::Pending || e.updated_at >= horizon);

        let existing = table.get(key).map(|e| (e.status, e.result.clone()));
        match existing {
            Some((LedgerStatus::Pending, _)) => BeginOutcome::AlreadyPending,
            Some((LedgerStatus::Succeeded, result)) => {
                BeginOutcome::AlreadySucceeded(result.unwrap_or(Value::Null))
            }
            // Failed keys may be retried; absent keys are claimed fresh.
            Some((LedgerStatus::Failed, _)) | None => {
                table.insert(key.to_string(), LedgerEntry {
                    status: LedgerStatus::Pending,
                    result: None,
                    error: None,
                    updated_at: now,
                });
                BeginOutcome::Proceed
            }
        }
    }

    /// Record the terminal success for a key. The stored result is what
    /// later replays return verbatim.
    pub fn complete(&self, key: &str, result: Value) {
        let mut table = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        table.insert(key.to_string(), LedgerEntry {
            status: LedgerStatus::Succeeded,
            result: Some(result),
            error: None,
            updated_at: Utc::now(),
        });
    }

    /// Record a terminal failure. A later begin() on this key proceeds
    /// again — the backend provably did nothing.
    pub fn fail(&self, key: &str, error: &str) {
        let mut table = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        table.insert(key.to_string(), LedgerEntry {
            status: LedgerStatus::Failed,
            result: None,
            error: Some(error.to_string()),
            updated_at: Utc::now(),
        });
    }

    /// Non-claiming peek: stored result if the key already succeeded.
    /// Used by tokenless WRITE calls to honor the replay tie-break.
    pub fn replay(&self, key: &str) -> Option<Value> {
        let table = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        match table.get(key) {
            Some(e) if e.status == LedgerStatus::Succeeded => e.result.clone(),
            _ => None,
        }
    }

    /// Recorded failure message, for operator review of failed keys.
    pub fn last_error(&self, key: &str) -> Option<String> {
        let table = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        table.get(key).and_then(|e| e.error.clone())
    }

    pub fn status_of(&self, key: &str) -> Option<LedgerStatus> {
        let table = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        table.get(key).map(|e| e.status)
    }

    pub fn entry_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Deterministic key: SHA-256 over tool name + canonical (sorted-key)
/// argument JSON. Two confirmations of the same action collapse to one key.
pub fn derive_key(tool: &str, canonical_args: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tool.as_bytes());
    hasher.update(b"\n");
    hasher.update(canonical_args.as_bytes());
    hex::encode(hasher.finalize())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn begin_complete_replay_cycle() {
        let ledger = IdempotencyLedger::new(3600);
        assert_eq!(ledger.begin("k1"), BeginOutcome::Proceed);

        ledger.complete("k1", json!({"status": "reserved", "id": "R123"}));

        match ledger.begin("k1") {
            BeginOutcome::AlreadySucceeded(v) => assert_eq!(v["id"], "R123"),
            other => panic!("expected replay, got {:?}", other),
        }
        assert_eq!(ledger.replay("k1").unwrap()["status"], "reserved");
    }

    #[test]
    fn second_begin_while_pending_blocked() {
        let ledger = IdempotencyLedger::new(3600);
        assert_eq!(ledger.begin("k1"), BeginOutcome::Proceed);
        assert_eq!(ledger.begin("k1"), BeginOutcome::AlreadyPending);
    }

    #[test]
    fn failed_key_may_be_retried() {
        let ledger = IdempotencyLedger::new(3600);
        assert_eq!(ledger.begin("k1"), BeginOutcome::Proceed);
        ledger.fail("k1", "RetailCore rejected");
        assert_eq!(ledger.status_of("k1"), Some(LedgerStatus::Failed));
        assert_eq!(ledger.last_error("k1").as_deref(), Some("RetailCore rejected"));
        assert_eq!(ledger.begin("k1"), BeginOutcome::Proceed);
    }

    #[test]
    fn replay_does_not_claim() {
        let ledger = IdempotencyLedger::new(3600);
        assert!(ledger.replay("fresh").is_none());
        assert_eq!(ledger.status_of("fresh"), None, "replay must not create entries");
    }

    #[test]
    fn concurrent_begins_yield_exactly_one_proceed() {
        let ledger = Arc::new(IdempotencyLedger::new(3600));
        let proceeds = Arc::new(AtomicUsize::new(0));
        let pendings = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                let proceeds = Arc::clone(&proceeds);
                let pendings = Arc::clone(&pendings);
                thread::spawn(move || match ledger.begin("contested") {
                    BeginOutcome::Proceed => {
                        proceeds.fetch_add(1, Ordering::SeqCst);
                    }
                    BeginOutcome::AlreadyPending => {
                        pendings.fetch_add(1, Ordering::SeqCst);
                    }
                    BeginOutcome::AlreadySucceeded(_) => panic!("nothing completed yet"),
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(proceeds.load(Ordering::SeqCst), 1);
        assert_eq!(pendings.load(Ordering::SeqCst), 15);
    }

    #[test]
    fn retention_evicts_terminal_but_not_pending() {
        let ledger = IdempotencyLedger::new(-1);
        assert_eq!(ledger.begin("done"), BeginOutcome::Proceed);
        ledger.complete("done", json!({"ok": true}));
        assert_eq!(ledger.begin("stuck"), BeginOutcome::Proceed);

        // Any begin() sweeps; "done" is terminal and past retention,
        // "stuck" is pending and must survive.
        assert_eq!(ledger.begin("other"), BeginOutcome::Proceed);
        assert_eq!(ledger.status_of("done"), None);
        assert_eq!(ledger.status_of("stuck"), Some(LedgerStatus::Pending));
    }

    #[test]
    fn derived_keys_deterministic_and_distinct() {
        let a1 = derive_key("reserve_item", r#"{"qty":1,"sku":"A","store_id":"ST002"}"#);
        let a2 = derive_key("reserve_item", r#"{"qty":1,"sku":"A","store_id":"ST002"}"#);
        let b = derive_key("reserve_item", r#"{"qty":2,"sku":"A","store_id":"ST002"}"#);
        let c = derive_key("create_transfer", r#"{"qty":1,"sku":"A","store_id":"ST002"}"#);
        assert_eq!(a1, a2);
        assert_ne!(a1, b);
        assert_ne!(a1, c);
        assert_eq!(a1.len(), 64);
    }
}
