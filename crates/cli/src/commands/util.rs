use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use hintdis_core::config::{load_config, DisasmConfig};
use hintdis_core::hints::{HintLoadReport, PredicateRegistry};
use hintdis_core::services::pipeline::HintOutcome;

use crate::sha256_file;

/// Load the config file if one was given; otherwise use defaults.
pub fn load_config_or_default(path: Option<&str>) -> Result<DisasmConfig> {
    match path {
        Some(p) => load_config(Path::new(p))
            .with_context(|| format!("Failed to load config from {}", p)),
        None => Ok(DisasmConfig::default()),
    }
}

/// Config hint files first, then command-line ones, preserving declaration order.
pub fn merged_hint_files(config: &DisasmConfig, cli: &[String]) -> Vec<PathBuf> {
    config.hints.iter().cloned().chain(cli.iter().map(PathBuf::from)).collect()
}

/// Registry with the built-ins, configured extras and command-line extras.
pub fn merged_registry(config: &DisasmConfig, cli: &[String]) -> PredicateRegistry {
    PredicateRegistry::with_extra(config.predicates.iter().chain(cli.iter()))
}

/// Command-line debug dir wins over the configured one.
pub fn merged_debug_dir(config: &DisasmConfig, cli: Option<&str>) -> Option<PathBuf> {
    cli.map(PathBuf::from).or_else(|| config.debug_dir.clone())
}

#[derive(Debug, Serialize)]
pub struct HintFileDigest {
    pub path: String,
    pub sha256: String,
}

/// Out-of-band run metadata; kept apart from the IR so the IR stays deterministic.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub command: String,
    pub backend: Option<String>,
    pub binary: Option<String>,
    pub binary_sha256: Option<String>,
    pub hints: Vec<HintFileDigest>,
    pub outcome: HintOutcome,
    pub started_at: String,
    pub finished_at: String,
}

impl RunReport {
    pub fn new(command: &str, started_at: DateTime<Utc>, outcome: HintOutcome) -> Self {
        Self {
            command: command.to_string(),
            backend: None,
            binary: None,
            binary_sha256: None,
            hints: Vec::new(),
            outcome,
            started_at: started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
        }
    }

    pub fn with_hint_files(mut self, files: &[PathBuf]) -> Result<Self> {
        for path in files {
            self.hints.push(HintFileDigest {
                path: path.display().to_string(),
                sha256: sha256_file(path)?,
            });
        }
        Ok(self)
    }
}

pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create report dir: {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(report)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write run report: {}", path.display()))?;
    Ok(())
}

pub fn print_load_report(report: &HintLoadReport) {
    println!(
        "Hints: {} accepted ({} lines in {} file(s); {} skipped, {} rejected, {} superseded)",
        report.accepted,
        report.lines,
        report.files,
        report.skipped,
        report.rejected,
        report.superseded
    );
}

pub fn print_hint_outcome(outcome: &HintOutcome) {
    print_load_report(&outcome.load);
    for log in &outcome.logs {
        println!("  Log: {}", log.display());
    }
    let re = &outcome.reclassify;
    println!(
        "Reclassified: {} block(s) demoted to data ({} already data, {} duplicate, {} unresolved, {} edge(s) removed)",
        re.demoted.len(),
        re.already_data,
        re.duplicate,
        re.unresolved,
        re.removed_edges
    );
    for d in &re.demoted {
        println!(
            "  - {} {}: 0x{:X}..0x{:X} (hint 0x{:X}, line {})",
            d.module,
            d.block,
            d.address,
            d.address + d.size,
            d.hint_address,
            d.hint_line
        );
    }
}
