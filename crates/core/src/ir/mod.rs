//! Persisted intermediate representation.
//!
//! The on-disk form is an [`IrDocument`]: a format version plus one
//! [`ModuleDoc`] per module. JSON is the default; `.yaml`/`.yml` paths are
//! written and read as YAML. Documents contain no timestamps, so the same
//! model always serializes to the same bytes.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Block, BlockId, CfgEdge, ModelError, Module, ProgramModel, Symbol};

/// Oldest document format this crate can read.
const MIN_SUPPORTED_FORMAT_VERSION: u32 = 1;

/// Format version written by this crate.
pub const CURRENT_FORMAT_VERSION: u32 = 1;

/// Error type for loading and saving IR documents.
#[derive(Debug, Error)]
pub enum IrError {
    #[error("Failed to access IR at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid IR JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid IR YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The document was written by a newer (or unknown) format version.
    #[error("Unsupported IR format version {found}; supported range is {min_supported}..={max_supported}")]
    UnsupportedFormatVersion { found: u32, min_supported: u32, max_supported: u32 },

    #[error("Inconsistent IR: {0}")]
    Model(#[from] ModelError),
}

pub type IrResult<T> = Result<T, IrError>;

/// Serialization format, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrFormat {
    Json,
    Yaml,
}

impl IrFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_ascii_lowercase()) {
            Some(ext) if ext == "yaml" || ext == "yml" => IrFormat::Yaml,
            _ => IrFormat::Json,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IrDocument {
    pub format_version: u32,
    pub modules: Vec<ModuleDoc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDoc {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub isa: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_point: Option<BlockId>,
    #[serde(default)]
    pub blocks: Vec<BlockDoc>,
    #[serde(default)]
    pub symbols: Vec<Symbol>,
    #[serde(default)]
    pub cfg: Vec<CfgEdge>,
}

/// A block together with its stable handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockDoc {
    pub id: BlockId,
    #[serde(flatten)]
    pub block: Block,
}

impl From<&Module> for ModuleDoc {
    fn from(module: &Module) -> Self {
        ModuleDoc {
            name: module.name.clone(),
            isa: module.isa.clone(),
            binary_path: module.binary_path.clone(),
            binary_hash: module.binary_hash.clone(),
            entry_point: module.entry_point,
            blocks: module
                .blocks()
                .iter()
                .map(|(id, block)| BlockDoc { id, block: block.clone() })
                .collect(),
            symbols: module.symbols().to_vec(),
            cfg: module.cfg().to_vec(),
        }
    }
}

impl TryFrom<ModuleDoc> for Module {
    type Error = ModelError;

    fn try_from(doc: ModuleDoc) -> Result<Self, Self::Error> {
        let mut module = Module::new(doc.name);
        module.isa = doc.isa;
        module.binary_path = doc.binary_path;
        module.binary_hash = doc.binary_hash;
        for entry in doc.blocks {
            module.blocks_mut().insert_with_id(entry.id, entry.block)?;
        }
        for symbol in doc.symbols {
            module.add_symbol(symbol)?;
        }
        for edge in doc.cfg {
            module.add_edge(edge)?;
        }
        module.entry_point = doc.entry_point;
        module.validate()?;
        Ok(module)
    }
}

/// Snapshot a model as a serializable document.
pub fn to_document(model: &ProgramModel) -> IrDocument {
    IrDocument {
        format_version: CURRENT_FORMAT_VERSION,
        modules: model.modules.iter().map(ModuleDoc::from).collect(),
    }
}

/// Rebuild a model from a document, checking the format version and model invariants.
pub fn from_document(doc: IrDocument) -> IrResult<ProgramModel> {
    if doc.format_version < MIN_SUPPORTED_FORMAT_VERSION
        || doc.format_version > CURRENT_FORMAT_VERSION
    {
        return Err(IrError::UnsupportedFormatVersion {
            found: doc.format_version,
            min_supported: MIN_SUPPORTED_FORMAT_VERSION,
            max_supported: CURRENT_FORMAT_VERSION,
        });
    }
    let modules =
        doc.modules.into_iter().map(Module::try_from).collect::<Result<Vec<_>, _>>()?;
    Ok(ProgramModel { modules })
}

/// Parse a document body in the given format.
pub fn parse_ir(body: &[u8], format: IrFormat) -> IrResult<ProgramModel> {
    let doc: IrDocument = match format {
        IrFormat::Json => serde_json::from_slice(body)?,
        IrFormat::Yaml => serde_yaml::from_slice(body)?,
    };
    from_document(doc)
}

/// Render a model in the given format. Output ends with a newline.
pub fn render_ir(model: &ProgramModel, format: IrFormat) -> IrResult<String> {
    let doc = to_document(model);
    let mut body = match format {
        IrFormat::Json => serde_json::to_string_pretty(&doc)?,
        IrFormat::Yaml => serde_yaml::to_string(&doc)?,
    };
    if !body.ends_with('\n') {
        body.push('\n');
    }
    Ok(body)
}

/// Load a model from disk; the format follows the file extension.
pub fn load_ir(path: &Path) -> IrResult<ProgramModel> {
    let body = fs::read(path).map_err(|source| IrError::Io { path: path.to_path_buf(), source })?;
    parse_ir(&body, IrFormat::from_path(path))
}

/// Write a model to disk, replacing any existing file.
pub fn save_ir(model: &ProgramModel, path: &Path) -> IrResult<()> {
    let body = render_ir(model, IrFormat::from_path(path))?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|source| IrError::Io { path: parent.to_path_buf(), source })?;
    }
    fs::write(path, body).map_err(|source| IrError::Io { path: path.to_path_buf(), source })
}
