// RetailOps Gateway - Library Root
// Copyright 2026 Joseph Stone - All Rights Reserved
//
// All modules exported here for use by the binary and tests.

pub mod backend;
pub mod config;
pub mod confirm;
pub mod docs;
pub mod error;
pub mod ledger;
pub mod mcp;
pub mod registry;
pub mod roles;
pub mod router;
