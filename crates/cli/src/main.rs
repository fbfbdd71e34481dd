use anyhow::Result;
use clap::{Parser, Subcommand};

use hintdis::commands::{
    apply_hints_command, check_hints_command, disassemble_command, list_backends_command,
    show_command, ApplyHintsArgs, DisassembleArgs,
};
use hintdis::logging::init_tracing;

/// Static disassembler with hint-driven code/data reclassification.
///
/// This CLI is a thin wrapper around `hintdis-core` (exposed in code as `hintdis_core`).
/// Set `HINTDIS_LOG` (e.g. `hintdis_core=debug`) to control log output on stderr.
#[derive(Parser, Debug)]
#[command(
    name = "hintdis",
    version,
    about = "Static disassembler with hint-driven code/data reclassification",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Disassemble a binary, apply hints, and write the IR.
    ///
    /// Hint files are read before disassembly; an unreadable file aborts the run.
    Disassemble {
        /// Path to the binary to disassemble.
        #[arg(long)]
        binary: String,

        /// Output IR path (`.json`, `.yaml` or `.yml`).
        #[arg(long)]
        ir: String,

        /// Hints file (`predicate<TAB>address[<TAB>label]`); may be repeated.
        #[arg(long = "hints")]
        hints: Vec<String>,

        /// Directory receiving `<predicate>.csv` hint logs.
        #[arg(long)]
        debug_dir: Option<String>,

        /// Extra record-only predicate accepted in hint files; may be repeated.
        #[arg(long = "predicate")]
        predicates: Vec<String>,

        /// Disassembly backend (see `hintdis backends`).
        #[arg(long)]
        backend: Option<String>,

        /// Architecture override (e.g., x86_64, arm64).
        #[arg(long)]
        arch: Option<String>,

        /// Load address for raw images (hex `0x...` or decimal).
        #[arg(long)]
        base_address: Option<String>,

        /// Upper bound on decoded instructions.
        #[arg(long)]
        max_instructions: Option<usize>,

        /// Config file (JSON or YAML).
        #[arg(long)]
        config: Option<String>,

        /// Write a JSON run report (hashes, counters, timestamps) here.
        #[arg(long)]
        report: Option<String>,
    },

    /// Apply hint files to an existing IR.
    ApplyHints {
        /// Input IR path.
        #[arg(long)]
        ir: String,

        /// Output IR path. Defaults to rewriting the input.
        #[arg(long)]
        out: Option<String>,

        /// Hints file; may be repeated. Applied in the order given.
        #[arg(long = "hints")]
        hints: Vec<String>,

        #[arg(long)]
        debug_dir: Option<String>,

        #[arg(long = "predicate")]
        predicates: Vec<String>,

        #[arg(long)]
        config: Option<String>,

        #[arg(long)]
        report: Option<String>,
    },

    /// Parse and validate hint files without touching a model.
    CheckHints {
        #[arg(long = "hints", required = true)]
        hints: Vec<String>,

        #[arg(long = "predicate")]
        predicates: Vec<String>,

        /// Emit JSON instead of human-readable output.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Show modules, blocks and symbols of an IR file.
    Show {
        #[arg(long)]
        ir: String,

        /// Only show where this symbol points.
        #[arg(long)]
        symbol: Option<String>,

        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// List available disassembly backends.
    Backends {
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.command {
        Command::Disassemble {
            binary,
            ir,
            hints,
            debug_dir,
            predicates,
            backend,
            arch,
            base_address,
            max_instructions,
            config,
            report,
        } => disassemble_command(&DisassembleArgs {
            binary,
            ir,
            hints,
            debug_dir,
            predicates,
            backend,
            arch,
            base_address,
            max_instructions,
            config,
            report,
        })?,
        Command::ApplyHints { ir, out, hints, debug_dir, predicates, config, report } => {
            apply_hints_command(&ApplyHintsArgs {
                ir,
                out,
                hints,
                debug_dir,
                predicates,
                config,
                report,
            })?
        }
        Command::CheckHints { hints, predicates, json } => {
            check_hints_command(&hints, &predicates, json)?
        }
        Command::Show { ir, symbol, json } => show_command(&ir, symbol.as_deref(), json)?,
        Command::Backends { json } => list_backends_command(json)?,
    }

    Ok(())
}
