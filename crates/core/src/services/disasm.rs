use std::collections::HashMap;
use std::fs;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::{Block, ModelError, Module, Symbol};

/// Options for the initial disassembly pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DisasmOptions {
    /// Upper bound on decoded instructions for backends that decode.
    pub max_instructions: Option<usize>,
}

/// Request to disassemble one binary into a module.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisassemblyRequest {
    /// Module name recorded in the IR.
    pub binary_name: String,
    pub binary_path: PathBuf,
    /// Optional architecture override (e.g., x86_64, arm64, armv7).
    pub arch: Option<String>,
    /// Load address for formats that carry none (raw images).
    pub base_address: u64,
    pub options: DisasmOptions,
}

impl DisassemblyRequest {
    /// Request with defaults; the module is named after the file.
    pub fn new(binary_path: impl Into<PathBuf>) -> Self {
        let binary_path = binary_path.into();
        let binary_name = binary_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("module")
            .to_string();
        Self {
            binary_name,
            binary_path,
            arch: None,
            base_address: 0,
            options: DisasmOptions::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DisasmError {
    #[error("Binary not found at {0}")]
    MissingBinary(PathBuf),
    #[error("Backend not found: {0}")]
    MissingBackend(String),
    #[error("Disassembly backend error: {0}")]
    Backend(String),
    #[error("Disassembly produced an inconsistent model: {0}")]
    Model(#[from] ModelError),
}

/// Trait implemented by disassembly backends.
///
/// A backend produces the candidate code/data classification that hints later narrow.
pub trait DisassemblyBackend: Send + Sync {
    fn disassemble(&self, request: &DisassemblyRequest) -> Result<Module, DisasmError>;
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
}

/// Registry for disassembly backends; callers select by name.
#[derive(Default)]
pub struct BackendRegistry {
    backends: HashMap<String, Box<dyn DisassemblyBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self { backends: HashMap::new() }
    }

    pub fn register<B: DisassemblyBackend + 'static>(&mut self, backend: B) -> &mut Self {
        self.backends.insert(backend.name().to_string(), Box::new(backend));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn DisassemblyBackend> {
        self.backends.get(name).map(|b| &**b)
    }

    /// Return a sorted list of registered backend names for error messages/help.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.backends.keys().cloned().collect();
        keys.sort();
        keys
    }
}

/// Backend that maps the whole file as one data block at the base address.
///
/// Nothing is decoded, so every byte starts out as data.
pub struct RawBackend;

impl DisassemblyBackend for RawBackend {
    fn disassemble(&self, request: &DisassemblyRequest) -> Result<Module, DisasmError> {
        let bytes = read_binary(&request.binary_path)?;
        let mut module = Module::new(&request.binary_name);
        module.isa = request.arch.clone();
        module.binary_path = Some(request.binary_path.display().to_string());
        if !bytes.is_empty() {
            let id = module.add_block(Block::data(request.base_address, bytes.len() as u64))?;
            module.add_symbol(Symbol::new(
                format!("raw_{:X}", request.base_address),
                Some(request.base_address),
                Some(id),
            ))?;
        }
        Ok(module)
    }

    fn name(&self) -> &'static str {
        "raw"
    }

    fn description(&self) -> &'static str {
        "Maps the file as a single data block; no decoding"
    }
}

/// Name of the backend used when neither CLI nor config picks one.
pub fn default_backend_name() -> &'static str {
    if cfg!(feature = "capstone-backend") {
        "capstone"
    } else {
        "raw"
    }
}

/// Registry populated with every backend compiled into this build.
pub fn default_backend_registry() -> BackendRegistry {
    let mut registry = BackendRegistry::new();
    registry.register(RawBackend);
    #[cfg(feature = "capstone-backend")]
    {
        registry.register(crate::services::backends::CapstoneBackend);
    }
    registry
}

pub(crate) fn read_binary(path: &Path) -> Result<Vec<u8>, DisasmError> {
    if !path.is_file() {
        return Err(DisasmError::MissingBinary(path.to_path_buf()));
    }
    fs::read(path).map_err(|_| DisasmError::MissingBinary(path.to_path_buf()))
}

/// Compute the SHA-256 hash of a file and return it as a hex string.
pub fn sha256_file(path: &Path) -> std::io::Result<String> {
    let mut reader = BufReader::new(fs::File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
