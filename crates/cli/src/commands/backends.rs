use anyhow::Result;
use serde::Serialize;

use hintdis_core::services::disasm::{default_backend_name, default_backend_registry};

#[derive(Debug, Serialize)]
pub struct BackendInfo {
    pub name: String,
    pub description: String,
    pub default: bool,
}

/// Backends compiled into this binary, sorted by name.
pub fn available_backends() -> Vec<BackendInfo> {
    let registry = default_backend_registry();
    registry
        .names()
        .into_iter()
        .filter_map(|name| {
            let backend = registry.get(&name)?;
            Some(BackendInfo {
                default: name == default_backend_name(),
                description: backend.description().to_string(),
                name,
            })
        })
        .collect()
}

/// List available disassembly backends known to this binary.
pub fn list_backends_command(json: bool) -> Result<()> {
    let entries = available_backends();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Backends: (none)");
        return Ok(());
    }

    println!("Backends:");
    for entry in entries {
        let marker = if entry.default { " (default)" } else { "" };
        println!("- {}{}: {}", entry.name, marker, entry.description);
    }

    Ok(())
}
