use std::path::Path;

use anyhow::{Context, Result};

pub mod commands;
pub mod logging;

/// SHA-256 of a file as a hex string.
pub fn sha256_file(path: &Path) -> Result<String> {
    hintdis_core::services::disasm::sha256_file(path)
        .with_context(|| format!("Failed to hash file: {}", path.display()))
}

/// Parse an address given on the command line (`0x` hex or decimal).
pub fn parse_cli_address(token: &str) -> Result<u64> {
    hintdis_core::hints::parse_address(token)
        .with_context(|| format!("Invalid address '{token}' (expected 0x-prefixed hex or decimal)"))
}
