use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hints::PredicateRegistry;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to parse config YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Serializable run configuration.
///
/// Every field is optional; command-line flags take precedence over values
/// loaded from a config file, which take precedence over built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisasmConfig {
    /// Hint files applied before any given on the command line.
    pub hints: Vec<PathBuf>,
    /// Directory receiving `<predicate>.csv` hint logs.
    pub debug_dir: Option<PathBuf>,
    /// Extra record-only predicates accepted in hint files.
    pub predicates: Vec<String>,
    /// Disassembly backend name (e.g., `capstone`, `raw`).
    pub backend: Option<String>,
    /// Architecture override (e.g., x86_64, arm64).
    pub arch: Option<String>,
    /// Upper bound on decoded instructions per binary.
    pub max_instructions: Option<usize>,
}

impl DisasmConfig {
    /// Predicate registry with the built-ins plus configured extras.
    pub fn registry(&self) -> PredicateRegistry {
        PredicateRegistry::with_extra(&self.predicates)
    }

    /// Resolve relative paths against `base` (typically the config file's directory).
    pub fn resolve_paths(mut self, base: &Path) -> Self {
        let join = |p: PathBuf| if p.is_absolute() { p } else { base.join(p) };
        self.hints = self.hints.into_iter().map(join).collect();
        self.debug_dir = self.debug_dir.map(join);
        self
    }
}

/// Load a config file; `.json` is parsed as JSON, anything else as YAML.
///
/// Relative paths inside the file are resolved against the file's directory.
pub fn load_config(path: &Path) -> Result<DisasmConfig, ConfigError> {
    let body = fs::read(path)
        .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
    let config: DisasmConfig = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_slice(&body)?
    } else {
        serde_yaml::from_slice(&body)?
    };
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(config.resolve_paths(base))
}
