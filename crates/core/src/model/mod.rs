//! Core data model (IR) for disassembled binaries.
//!
//! A [`ProgramModel`] owns one [`Module`] per binary. Each module holds:
//! - A [`BlockStore`] of code and data blocks addressed by stable [`BlockId`] handles
//! - Symbols whose referents are block handles
//! - Control-flow edges between blocks
//!
//! Blocks never point back at symbols or edges. Changing a block's classification
//! is a slot update in the store and leaves every handle valid.

mod store;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use store::BlockStore;

/// Error type for program model operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    /// Blocks must cover at least one byte and must not wrap the address space.
    #[error("Invalid block range at 0x{address:X} (size {size})")]
    InvalidBlockRange { address: u64, size: u64 },

    #[error("Duplicate block id {0}")]
    DuplicateBlockId(BlockId),

    #[error("Unknown block id {0}")]
    UnknownBlock(BlockId),

    /// A replacement block must cover exactly the range of the block it replaces.
    #[error("Replacement for block {id} changes its range (0x{address:X}+{size})")]
    RangeMismatch { id: BlockId, address: u64, size: u64 },

    #[error("Symbol '{symbol}' refers to unknown block {block}")]
    DanglingReferent { symbol: String, block: BlockId },

    #[error("CFG edge refers to unknown block {0}")]
    DanglingEdge(BlockId),

    #[error("Entry point refers to unknown block {0}")]
    DanglingEntryPoint(BlockId),

    /// An address resolved to more than one block.
    #[error("Address 0x{address:X} is covered by multiple blocks: {blocks:?}")]
    AmbiguousAddress { address: u64, blocks: Vec<BlockId> },

    /// A block's range is shared with other blocks, so its classification is not exclusive.
    #[error("Block {block} at 0x{address:X}+{size} overlaps blocks {others:?}")]
    OverlappingBlocks { block: BlockId, address: u64, size: u64, others: Vec<BlockId> },
}

/// Convenience result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;

/// Stable handle for a block inside one module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u64);

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Contiguous byte range classified as decodable instructions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeBlock {
    pub address: u64,
    pub size: u64,
}

impl CodeBlock {
    pub fn new(address: u64, size: u64) -> Self {
        Self { address, size }
    }
}

/// Contiguous byte range classified as non-instruction content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBlock {
    pub address: u64,
    pub size: u64,
}

impl DataBlock {
    pub fn new(address: u64, size: u64) -> Self {
        Self { address, size }
    }
}

/// Code/data classification of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockKind {
    Code,
    Data,
}

impl BlockKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BlockKind::Code => "code",
            BlockKind::Data => "data",
        }
    }
}

impl fmt::Display for BlockKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A block is either code or data; the classification covers its whole range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Block {
    Code(CodeBlock),
    Data(DataBlock),
}

impl Block {
    pub fn code(address: u64, size: u64) -> Self {
        Block::Code(CodeBlock::new(address, size))
    }

    pub fn data(address: u64, size: u64) -> Self {
        Block::Data(DataBlock::new(address, size))
    }

    pub fn address(&self) -> u64 {
        match self {
            Block::Code(b) => b.address,
            Block::Data(b) => b.address,
        }
    }

    pub fn size(&self) -> u64 {
        match self {
            Block::Code(b) => b.size,
            Block::Data(b) => b.size,
        }
    }

    /// Exclusive end address. Saturates; stores reject ranges that would wrap.
    pub fn end(&self) -> u64 {
        self.address().saturating_add(self.size())
    }

    pub fn kind(&self) -> BlockKind {
        match self {
            Block::Code(_) => BlockKind::Code,
            Block::Data(_) => BlockKind::Data,
        }
    }

    pub fn is_code(&self) -> bool {
        matches!(self, Block::Code(_))
    }

    pub fn is_data(&self) -> bool {
        matches!(self, Block::Data(_))
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.address() && address < self.end()
    }

    /// Data block covering the same bytes as this block.
    pub fn as_data(&self) -> DataBlock {
        DataBlock::new(self.address(), self.size())
    }
}

/// Kind of control-flow edge between blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    Fallthrough,
    Branch,
    ConditionalBranch,
    IndirectBranch,
    Call,
    IndirectCall,
    Return,
}

/// Destination of a control-flow edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeTarget {
    Block(BlockId),
    /// Unknown or external destination (indirect jumps, returns, imports).
    Proxy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CfgEdge {
    pub source: BlockId,
    pub target: EdgeTarget,
    pub kind: EdgeKind,
}

impl CfgEdge {
    pub fn touches(&self, id: BlockId) -> bool {
        self.source == id || self.target == EdgeTarget::Block(id)
    }
}

/// Named symbol; its referent is a block handle, not a block value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referent: Option<BlockId>,
}

impl Symbol {
    pub fn new(name: impl Into<String>, address: Option<u64>, referent: Option<BlockId>) -> Self {
        Self { name: name.into(), address, referent }
    }
}

/// One disassembled binary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Module {
    pub name: String,
    /// Instruction set name (e.g., x86_64, arm64).
    pub isa: Option<String>,
    pub binary_path: Option<String>,
    /// SHA-256 of the input binary, hex-encoded.
    pub binary_hash: Option<String>,
    pub entry_point: Option<BlockId>,
    blocks: BlockStore,
    symbols: Vec<Symbol>,
    cfg: Vec<CfgEdge>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut BlockStore {
        &mut self.blocks
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id)
    }

    /// Add a block under a freshly allocated handle.
    pub fn add_block(&mut self, block: Block) -> ModelResult<BlockId> {
        self.blocks.insert(block)
    }

    pub fn symbols(&self) -> &[Symbol] {
        &self.symbols
    }

    /// Add a symbol; its referent (if any) must already exist.
    pub fn add_symbol(&mut self, symbol: Symbol) -> ModelResult<()> {
        if let Some(id) = symbol.referent {
            if self.blocks.get(id).is_none() {
                return Err(ModelError::DanglingReferent { symbol: symbol.name, block: id });
            }
        }
        self.symbols.push(symbol);
        Ok(())
    }

    /// First symbol with the given name, in insertion order.
    pub fn symbol(&self, name: &str) -> Option<&Symbol> {
        self.symbols.iter().find(|s| s.name == name)
    }

    /// Follow a symbol to the block it currently refers to.
    pub fn referent(&self, symbol: &Symbol) -> Option<&Block> {
        symbol.referent.and_then(|id| self.blocks.get(id))
    }

    pub fn symbol_referent(&self, name: &str) -> Option<&Block> {
        self.symbol(name).and_then(|s| self.referent(s))
    }

    pub fn cfg(&self) -> &[CfgEdge] {
        &self.cfg
    }

    /// Add a CFG edge; both endpoints must already exist.
    pub fn add_edge(&mut self, edge: CfgEdge) -> ModelResult<()> {
        if self.blocks.get(edge.source).is_none() {
            return Err(ModelError::DanglingEdge(edge.source));
        }
        if let EdgeTarget::Block(target) = edge.target {
            if self.blocks.get(target).is_none() {
                return Err(ModelError::DanglingEdge(target));
            }
        }
        self.cfg.push(edge);
        Ok(())
    }

    /// Drop every edge that has `id` as its source or target. Returns how many were removed.
    pub fn remove_edges_touching(&mut self, id: BlockId) -> usize {
        let before = self.cfg.len();
        self.cfg.retain(|edge| !edge.touches(id));
        before - self.cfg.len()
    }

    /// Re-check referential integrity of symbols, edges and the entry point.
    pub fn validate(&self) -> ModelResult<()> {
        for symbol in &self.symbols {
            if let Some(id) = symbol.referent {
                if self.blocks.get(id).is_none() {
                    return Err(ModelError::DanglingReferent {
                        symbol: symbol.name.clone(),
                        block: id,
                    });
                }
            }
        }
        for edge in &self.cfg {
            if self.blocks.get(edge.source).is_none() {
                return Err(ModelError::DanglingEdge(edge.source));
            }
            if let EdgeTarget::Block(target) = edge.target {
                if self.blocks.get(target).is_none() {
                    return Err(ModelError::DanglingEdge(target));
                }
            }
        }
        if let Some(entry) = self.entry_point {
            if self.blocks.get(entry).is_none() {
                return Err(ModelError::DanglingEntryPoint(entry));
            }
        }
        Ok(())
    }

    pub fn code_block_count(&self) -> usize {
        self.blocks.iter().filter(|(_, b)| b.is_code()).count()
    }

    pub fn data_block_count(&self) -> usize {
        self.blocks.iter().filter(|(_, b)| b.is_data()).count()
    }
}

/// Collection of modules produced by one disassembly run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgramModel {
    pub modules: Vec<Module>,
}

impl ProgramModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(module: Module) -> Self {
        Self { modules: vec![module] }
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.iter().find(|m| m.name == name)
    }

    /// Find the first symbol with `name` across modules, with its owning module.
    pub fn find_symbol(&self, name: &str) -> Option<(&Module, &Symbol)> {
        self.modules.iter().find_map(|m| m.symbol(name).map(|s| (m, s)))
    }

    pub fn validate(&self) -> ModelResult<()> {
        self.modules.iter().try_for_each(Module::validate)
    }
}
