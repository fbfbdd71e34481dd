use std::path::Path;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use serde::Serialize;

use hintdis_core::hints::{load_hint_files, HintLoadReport};
use hintdis_core::ir::{load_ir, save_ir};
use hintdis_core::services::pipeline::{process_hints, HintOptions};

use crate::commands::util::{
    load_config_or_default, merged_debug_dir, merged_hint_files, merged_registry,
    print_hint_outcome, print_load_report, write_report, RunReport,
};

/// Arguments for `hintdis apply-hints`.
#[derive(Debug, Clone, Default)]
pub struct ApplyHintsArgs {
    pub ir: String,
    /// Output IR path; defaults to rewriting `ir` in place.
    pub out: Option<String>,
    pub hints: Vec<String>,
    pub debug_dir: Option<String>,
    pub predicates: Vec<String>,
    pub config: Option<String>,
    pub report: Option<String>,
}

/// Apply hint files to a persisted IR and write the reclassified model.
pub fn apply_hints_command(args: &ApplyHintsArgs) -> Result<()> {
    let started_at = Utc::now();
    let config = load_config_or_default(args.config.as_deref())?;
    let options = HintOptions {
        files: merged_hint_files(&config, &args.hints),
        debug_dir: merged_debug_dir(&config, args.debug_dir.as_deref()),
        registry: merged_registry(&config, &args.predicates),
    };
    if options.files.is_empty() {
        return Err(anyhow!("No hint files given (use --hints or a config file)"));
    }

    let ir_path = Path::new(&args.ir);
    let mut model =
        load_ir(ir_path).with_context(|| format!("Failed to load IR from {}", ir_path.display()))?;
    let outcome = process_hints(&mut model, &options)
        .with_context(|| format!("Failed to apply hints to {}", ir_path.display()))?;

    let out_path = Path::new(args.out.as_deref().unwrap_or(&args.ir));
    save_ir(&model, out_path)
        .with_context(|| format!("Failed to write IR to {}", out_path.display()))?;

    print_hint_outcome(&outcome);
    println!("IR: {}", out_path.display());

    if let Some(report_path) = args.report.as_deref() {
        let report =
            RunReport::new("apply-hints", started_at, outcome).with_hint_files(&options.files)?;
        write_report(&report, Path::new(report_path))?;
        println!("Report: {}", report_path);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct CheckedHint {
    predicate: String,
    address: String,
    label: Option<String>,
    file: String,
    line: usize,
}

#[derive(Debug, Serialize)]
struct CheckReport {
    load: HintLoadReport,
    hints: Vec<CheckedHint>,
    conflicting_addresses: Vec<String>,
}

/// Parse and validate hint files without touching a model.
pub fn check_hints_command(hints: &[String], predicates: &[String], json: bool) -> Result<()> {
    if hints.is_empty() {
        return Err(anyhow!("No hint files given"));
    }
    let registry = merged_registry(&Default::default(), predicates);
    let table = load_hint_files(hints, registry).context("Failed to load hint files")?;

    let report = CheckReport {
        load: table.report().clone(),
        hints: table
            .iter()
            .map(|h| CheckedHint {
                predicate: h.predicate().to_string(),
                address: format!("0x{:X}", h.address()),
                label: h.label().map(str::to_string),
                file: h.source().path.display().to_string(),
                line: h.source().line,
            })
            .collect(),
        conflicting_addresses: table
            .conflicting_addresses()
            .into_iter()
            .map(|a| format!("0x{a:X}"))
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_load_report(&report.load);
    for hint in &report.hints {
        match &hint.label {
            Some(label) => println!("- {} {} {} ({}:{})", hint.predicate, hint.address, label, hint.file, hint.line),
            None => println!("- {} {} ({}:{})", hint.predicate, hint.address, hint.file, hint.line),
        }
    }
    if !report.conflicting_addresses.is_empty() {
        println!("Addresses hinted by more than one predicate: {}", report.conflicting_addresses.join(", "));
    }
    Ok(())
}
