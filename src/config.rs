// RetailOps Gateway - Configuration
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// Gateway settings: backend endpoint, docs directory, listen port,
// preview TTL, ledger retention, backend deadlines. Loads from JSON
// with environment overrides for the container knobs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// RetailCore base URL, no trailing slash needed.
    pub backend_base_url: String,
    /// Directory of markdown knowledge docs.
    pub docs_dir: PathBuf,
    /// HTTP transport port.
    pub port: u16,
    /// Preview token lifetime. Short on purpose: a stale confirmation
    /// should fail rather than fire.
    pub confirm_ttl_secs: i64,
    /// How long terminal ledger entries stay replayable.
    pub ledger_retention_secs: i64,
    /// READ deadline against RetailCore.
    pub read_timeout_secs: u64,
    /// WRITE deadline. Longer than the read deadline: a timeout here
    /// means the outcome is unknown, so we give the backend room.
    pub write_timeout_secs: u64,
    /// Retries for READ calls (connect/timeout only).
    pub read_retries: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_base_url: "http://retailcore:8080".to_string(),
            docs_dir: PathBuf::from("docs"),
            port: 8081,
            confirm_ttl_secs: 300,
            ledger_retention_secs: 3600,
            read_timeout_secs: 5,
            write_timeout_secs: 20,
            read_retries: 2,
        }
    }
}

impl GatewayConfig {
    /// Load from JSON, falling back to defaults, then apply environment
    /// overrides. Env wins over file so one image serves every deploy.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            serde_json::from_str(&content)?
        } else {
            log::warn!("Config not found at {:?}, using defaults", path);
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("RETAILCORE_BASE_URL") {
            self.backend_base_url = url;
        }
        if let Ok(dir) = std::env::var("RETAIL_GATE_DOCS_DIR") {
            self.docs_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("RETAIL_GATE_PORT") {
            match port.parse() {
                Ok(p) => self.port = p,
                Err(_) => log::warn!("RETAIL_GATE_PORT={:?} is not a port, keeping {}", port, self.port),
            }
        }
        if let Ok(ttl) = std::env::var("RETAIL_GATE_CONFIRM_TTL_SECS") {
            match ttl.parse() {
                Ok(t) => self.confirm_ttl_secs = t,
                Err(_) => log::warn!("RETAIL_GATE_CONFIRM_TTL_SECS={:?} ignored", ttl),
            }
        }
        if let Ok(retention) = std::env::var("RETAIL_GATE_LEDGER_RETENTION_SECS") {
            match retention.parse() {
                Ok(r) => self.ledger_retention_secs = r,
                Err(_) => log::warn!("RETAIL_GATE_LEDGER_RETENTION_SECS={:?} ignored", retention),
            }
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

// ============================================================================
// TESTS
// ============================================================================
