//! Disassembly services: backends that build the initial model and the
//! pipeline that runs hint processing on top of it.

pub mod backends;
pub mod disasm;
pub mod pipeline;
