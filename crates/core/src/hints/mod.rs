//! User hints: address-anchored assertions that override the default
//! code/data classification.
//!
//! Processing runs in four steps:
//! - [`record`]: parse one tab-separated line
//! - [`table`]: validate predicates and keep the last hint per `(predicate, address)`
//! - [`log`]: write `<predicate>.csv` debug artifacts
//! - [`apply`]: demote code blocks covering `invalid` addresses to data blocks
//!
//! Malformed lines are counted and dropped; they never reach the logs or the model.

pub mod apply;
pub mod log;
pub mod record;
pub mod registry;
pub mod table;

use std::path::PathBuf;

use thiserror::Error;

pub use apply::{apply_hints, demote_block, resolve, Demotion, ReclassifyReport, Resolution};
pub use log::{log_file_name, render_predicate_csv, write_hint_logs};
pub use record::{parse_address, parse_line, HintRecord, ParsedLine, RejectReason};
pub use registry::{HintEffect, Predicate, PredicateRegistry, INVALID};
pub use table::{load_hint_files, AcceptedHint, HintLoadReport, HintSource, HintTable};

/// Fatal errors raised while processing hints.
#[derive(Debug, Error)]
pub enum HintError {
    /// The hints file could not be opened or read.
    #[error("Failed to read hints file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write hint log {path}: {source}")]
    WriteLog {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Predicates '{first}' and '{second}' would both log to {file_name}")]
    LogNameCollision { file_name: String, first: String, second: String },
}
