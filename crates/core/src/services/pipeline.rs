use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::hints::{
    apply_hints, load_hint_files, write_hint_logs, HintError, HintLoadReport, HintTable,
    PredicateRegistry, ReclassifyReport,
};
use crate::model::{ModelError, ProgramModel};
use crate::services::disasm::{sha256_file, DisasmError, DisassemblyBackend, DisassemblyRequest};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Hints(#[from] HintError),
    #[error(transparent)]
    Disasm(#[from] DisasmError),
    /// Hint application would have broken exclusive block coverage.
    #[error("Hint application failed: {0}")]
    Model(#[from] ModelError),
}

/// Hint inputs for one run.
#[derive(Debug, Clone, Default)]
pub struct HintOptions {
    /// Hint files, applied in declaration order.
    pub files: Vec<PathBuf>,
    /// When set, `<predicate>.csv` logs are written here.
    pub debug_dir: Option<PathBuf>,
    pub registry: PredicateRegistry,
}

/// What hint processing did during a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HintOutcome {
    pub load: HintLoadReport,
    pub logs: Vec<PathBuf>,
    pub reclassify: ReclassifyReport,
}

/// Result of a full disassembly run.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub model: ProgramModel,
    pub hints: HintOutcome,
}

/// Write logs for an already-loaded table, then apply it to `model`.
pub fn apply_loaded_hints(
    model: &mut ProgramModel,
    table: &HintTable,
    debug_dir: Option<&Path>,
) -> Result<HintOutcome, PipelineError> {
    let logs = match debug_dir {
        Some(dir) => write_hint_logs(table, dir)?,
        None => Vec::new(),
    };
    let reclassify = apply_hints(model, table)?;
    Ok(HintOutcome { load: table.report().clone(), logs, reclassify })
}

/// Load, log and apply hints against an existing model (second pass over persisted IR).
pub fn process_hints(
    model: &mut ProgramModel,
    options: &HintOptions,
) -> Result<HintOutcome, PipelineError> {
    let table = load_hint_files(options.files.as_slice(), options.registry.clone())?;
    apply_loaded_hints(model, &table, options.debug_dir.as_deref())
}

/// Coordinator for initial disassembly followed by hint processing.
pub struct DisassemblyPipeline<'a> {
    pub backend: &'a dyn DisassemblyBackend,
    pub hints: HintOptions,
}

impl<'a> DisassemblyPipeline<'a> {
    pub fn run(&self, request: &DisassemblyRequest) -> Result<PipelineOutcome, PipelineError> {
        // Hint files are read before disassembly so an unreadable file fails fast.
        let table = load_hint_files(self.hints.files.as_slice(), self.hints.registry.clone())?;

        let mut module = self.backend.disassemble(request)?;
        if module.binary_hash.is_none() {
            module.binary_hash = sha256_file(&request.binary_path).ok();
        }
        info!(
            backend = self.backend.name(),
            module = %module.name,
            code_blocks = module.code_block_count(),
            data_blocks = module.data_block_count(),
            "initial disassembly finished"
        );

        let mut model = ProgramModel::with_module(module);
        let hints = apply_loaded_hints(&mut model, &table, self.hints.debug_dir.as_deref())?;
        Ok(PipelineOutcome { model, hints })
    }
}
