use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use tracing::debug;

use hintdis_core::ir::save_ir;
use hintdis_core::services::disasm::{
    default_backend_name, default_backend_registry, DisasmOptions, DisassemblyRequest,
};
use hintdis_core::services::pipeline::{DisassemblyPipeline, HintOptions};

use crate::commands::util::{
    load_config_or_default, merged_debug_dir, merged_hint_files, merged_registry,
    print_hint_outcome, write_report, RunReport,
};
use crate::{parse_cli_address, sha256_file};

/// Arguments for `hintdis disassemble`.
#[derive(Debug, Clone, Default)]
pub struct DisassembleArgs {
    pub binary: String,
    pub ir: String,
    pub hints: Vec<String>,
    pub debug_dir: Option<String>,
    pub predicates: Vec<String>,
    pub backend: Option<String>,
    pub arch: Option<String>,
    pub base_address: Option<String>,
    pub max_instructions: Option<usize>,
    pub config: Option<String>,
    pub report: Option<String>,
}

/// Run the initial pass on a binary, apply hints, and persist the IR.
pub fn disassemble_command(args: &DisassembleArgs) -> Result<()> {
    let started_at = Utc::now();
    let config = load_config_or_default(args.config.as_deref())?;

    let binary_path = PathBuf::from(&args.binary);
    if !binary_path.is_file() {
        return Err(anyhow!("Binary not found at {}", binary_path.display()));
    }

    let backend_name = args
        .backend
        .clone()
        .or_else(|| config.backend.clone())
        .unwrap_or_else(|| default_backend_name().to_string());
    let registry = default_backend_registry();
    let backend = registry.get(&backend_name).ok_or_else(|| {
        anyhow!("Backend '{}' not found (available: {})", backend_name, registry.names().join(", "))
    })?;

    let mut request = DisassemblyRequest::new(&binary_path);
    request.arch = args.arch.clone().or_else(|| config.arch.clone());
    if let Some(base) = args.base_address.as_deref() {
        request.base_address = parse_cli_address(base)?;
    }
    request.options =
        DisasmOptions { max_instructions: args.max_instructions.or(config.max_instructions) };

    let hints = HintOptions {
        files: merged_hint_files(&config, &args.hints),
        debug_dir: merged_debug_dir(&config, args.debug_dir.as_deref()),
        registry: merged_registry(&config, &args.predicates),
    };
    debug!(
        backend = %backend_name,
        hint_files = hints.files.len(),
        debug_dir = ?hints.debug_dir,
        "resolved run options"
    );
    let hint_files = hints.files.clone();
    let pipeline = DisassemblyPipeline { backend, hints };
    let outcome = pipeline
        .run(&request)
        .with_context(|| format!("Failed to disassemble {}", binary_path.display()))?;

    let ir_path = Path::new(&args.ir);
    save_ir(&outcome.model, ir_path)
        .with_context(|| format!("Failed to write IR to {}", ir_path.display()))?;

    println!("Disassembled {} with backend '{}'", binary_path.display(), backend_name);
    for module in &outcome.model.modules {
        println!(
            "  Module {}: {} code block(s), {} data block(s), {} symbol(s), {} edge(s)",
            module.name,
            module.code_block_count(),
            module.data_block_count(),
            module.symbols().len(),
            module.cfg().len()
        );
    }
    print_hint_outcome(&outcome.hints);
    println!("IR: {}", ir_path.display());

    if let Some(report_path) = args.report.as_deref() {
        let mut report = RunReport::new("disassemble", started_at, outcome.hints)
            .with_hint_files(&hint_files)?;
        report.backend = Some(backend_name);
        report.binary = Some(binary_path.display().to_string());
        report.binary_sha256 = Some(sha256_file(&binary_path)?);
        write_report(&report, Path::new(report_path))?;
        println!("Report: {}", report_path);
    }

    Ok(())
}
