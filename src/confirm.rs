// RetailOps Gateway - Confirmation State Machine
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Every WRITE goes NONE -> PREVIEWED -> CONFIRMED, or expires:
// NONE -> PREVIEWED -> EXPIRED. No transition skips PREVIEWED.
// Tokens are single-use: a confirm OR a mismatch reject consumes them.
// Previews never touch the backend.

use crate::error::GateError;
use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;

const TOKEN_BYTES: usize = 24;

/// Preview returned to the caller: non-committing effect description
/// gated behind a single-use token.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub effect_summary: String,
}

/// Explicit per-token state. PREVIEWED is the only confirmable state;
/// CONFIRMED and EXPIRED are terminal and the entry is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenState {
    Previewed,
    Confirmed,
    Expired,
}

#[derive(Debug)]
struct PendingAction {
    tool: String,
    canonical_args: String,
    effect_summary: String,
    expires_at: DateTime<Utc>,
    state: TokenState,
}

/// In-flight preview table. Owned by the router for the process
/// lifetime; the mutex is the only shared mutable state here.
pub struct ConfirmStore {
    ttl: Duration,
    inner: Mutex<HashMap<String, PendingAction>>,
}

impl ConfirmStore {
    /// ttl_secs may be negative in tests to mint pre-expired tokens.
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            ttl: Duration::seconds(ttl_secs),
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Mint a preview for a WRITE call. Token is unique across all live
    /// previews; expiry is now + TTL. Never contacts the backend.
    pub fn preview(&self, tool: &str, canonical_args: &str, effect_summary: String) -> Preview {
        let expires_at = Utc::now() + self.ttl;
        let mut table = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        let mut token = mint_token();
        while table.contains_key(&token) {
            token = mint_token();
        }

        table.insert(
            token.clone(),
            PendingAction {
                tool: tool.to_string(),
                canonical_args: canonical_args.to_string(),
                effect_summary: effect_summary.clone(),
                expires_at,
                state: TokenState::Previewed,
            },
        );

        log::info!("preview minted: tool={} expires_at={}", tool, expires_at);
        Preview { token, expires_at, effect_summary }
    }

    /// Validate and consume a token. Fails with TokenNotFound (unknown or
    /// already consumed), TokenExpired (past expiry; entry removed), or
    /// RequestMismatch (tool/args diverge from the previewed action —
    /// token replay defense; the token is burned either way).
    pub fn confirm(&self, token: &str, tool: &str, canonical_args: &str) -> Result<(), GateError> {
        let mut table = self.inner.lock().unwrap_or_else(|p| p.into_inner());

        let pending = table.get_mut(token).ok_or(GateError::TokenNotFound)?;
        if pending.state != TokenState::Previewed {
            return Err(GateError::TokenNotFound);
        }

        if Utc::now() > pending.expires_at {
            pending.state = TokenState::Expired;
            let expired_at = pending.expires_at;
            table.remove(token);
            return Err(GateError::TokenExpired(expired_at));
        }

        if pending.tool != tool || pending.canonical_args != canonical_args {
            // Reject consumes the token too — a replayed token must not
            // get a second chance against a different action.
            table.remove(token);
            return Err(GateError::RequestMismatch);
        }

        pending.state = TokenState::Confirmed;
        table.remove(token);
        Ok(())
    }

    /// Drop every expired preview. Called opportunistically by the router;
    /// confirm() also rejects expired tokens on its own, so the sweep is
    /// hygiene, not correctness.
    pub fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut table = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let before = table.len();
        table.retain(|_, p| p.expires_at >= now);
        before - table.len()
    }

    pub fn live_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

fn mint_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

// ============================================================================
// TESTS
// ============================================================================
