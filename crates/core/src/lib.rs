//! hintdis-core
//!
//! Core library for hint-driven code/data classification of native binaries.
//!
//! This crate defines the program model (modules, blocks, symbols, CFG), the
//! persisted IR, the hint parser/table/log writer, the reclassification pass
//! that demotes hinted code blocks to data, and the disassembly backends that
//! produce the initial model.
//!
//! All substantive logic lives here so it is testable without the CLI.

pub mod config;
pub mod hints;
pub mod ir;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
