// RetailOps Gateway - Main Entry Point
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// CLI and MCP server. All tool calls route through this gateway.
// Usage:
//   retailops-gate serve                          # Run MCP server (http)
//   retailops-gate serve --transport stdio        # Run MCP server (stdio)
//   retailops-gate tools                          # List registered tools
//   retailops-gate status                         # Show gateway configuration
//   retailops-gate call <tool> <args> --role <r>  # One-shot tool call

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use retailops_gate::{
    backend::RetailCoreClient,
    config::GatewayConfig,
    confirm::ConfirmStore,
    docs::DocsIndex,
    ledger::IdempotencyLedger,
    mcp,
    router::{ToolCall, ToolRouter},
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "retailops-gate")]
#[command(author = "Joseph Stone")]
#[command(version)]
#[command(about = "RetailOps Gateway - role-gated MCP tool gateway for RetailCore")]
struct Cli {
    /// Config file (JSON); missing file means defaults + env overrides
    #[arg(short, long, default_value = "gateway.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Transport {
    Http,
    Stdio,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the MCP server
    Serve {
        /// Transport to listen on
        #[arg(long, value_enum, default_value_t = Transport::Http)]
        transport: Transport,

        /// Override the configured HTTP port
        #[arg(long)]
        port: Option<u16>,
    },

    /// List registered tools with their schemas
    Tools,

    /// Show gateway configuration
    Status,

    /// One-shot tool call (for smoke-testing against a live RetailCore)
    Call {
        /// Tool name (search, fetch, inventory_lookup, reserve_item, ...)
        tool: String,

        /// Arguments as JSON string
        args: String,

        /// Caller role (associate, merch, support)
        #[arg(long)]
        role: Option<String>,
    },
}

fn build_router(config: &GatewayConfig) -> Result<ToolRouter> {
    let backend = RetailCoreClient::new(
        &config.backend_base_url,
        config.read_timeout(),
        config.write_timeout(),
        config.read_retries,
    )
    .with_context(|| format!("Failed to build RetailCore client for {}", config.backend_base_url))?;

    let docs = DocsIndex::load(&config.docs_dir)
        .with_context(|| format!("Failed to index docs at {:?}", config.docs_dir))?;

    Ok(ToolRouter::new(
        ConfirmStore::new(config.confirm_ttl_secs),
        IdempotencyLedger::new(config.ledger_retention_secs),
        Box::new(backend),
        docs,
    ))
}

fn main() -> Result<()> {
    // Initialize logging (safe if already init). On stdio transport all
    // logging goes to stderr; stdout belongs to JSON-RPC.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();

    let cli = Cli::parse();

    let config = GatewayConfig::load(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match &cli.command {
        Commands::Serve { transport, port } => {
            let router = Arc::new(build_router(&config)?);
            match transport {
                Transport::Http => {
                    let port = (*port).unwrap_or(config.port);
                    mcp::run_http(router, port)?;
                }
                Transport::Stdio => {
                    mcp::run_stdio(router);
                }
            }
        }

        Commands::Tools => {
            let router = build_router(&config)?;
            println!("{}", serde_json::to_string_pretty(&router.descriptors())?);
        }

        Commands::Status => {
            let router = build_router(&config)?;
            println!("RetailOps Gateway v{}", env!("CARGO_PKG_VERSION"));
            println!("Backend: {}", config.backend_base_url);
            println!("Docs: {:?}", config.docs_dir);
            println!("Port: {}", config.port);
            println!("Confirm TTL: {}s", config.confirm_ttl_secs);
            println!("Ledger retention: {}s", config.ledger_retention_secs);
            println!("Timeouts: read {}s (x{} retries), write {}s",
                config.read_timeout_secs, config.read_retries, config.write_timeout_secs);
            println!();
            println!("Tools: {}", router.tool_names().join(", "));
        }

        Commands::Call { tool, args, role } => {
            let arguments: serde_json::Value = serde_json::from_str(args)
                .with_context(|| format!("Invalid args JSON: {}", args))?;

            let router = build_router(&config)?;
            let result = router.handle(&ToolCall {
                tool: tool.clone(),
                header_role: role.clone(),
                arguments,
            });

            println!("{}", serde_json::to_string_pretty(&result)?);

            if result.get("error_kind").is_some() {
                std::process::exit(1);
            }
        }
    }

    Ok(())
}
