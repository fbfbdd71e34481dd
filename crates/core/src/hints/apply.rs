use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info};

use super::registry::HintEffect;
use super::table::{AcceptedHint, HintTable};
use crate::model::{Block, BlockId, ModelError, Module, ProgramModel};

/// One code block reclassified as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Demotion {
    pub module: String,
    pub block: BlockId,
    pub address: u64,
    pub size: u64,
    /// Hinted address that resolved to the block.
    pub hint_address: u64,
    pub hint_line: usize,
    pub removed_edges: usize,
}

/// Outcome of applying hints to a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReclassifyReport {
    pub demoted: Vec<Demotion>,
    /// Hints that resolved to a block that was already data.
    pub already_data: usize,
    /// Hints that resolved to a code block an earlier hint already demotes.
    pub duplicate: usize,
    /// Hints whose address is not covered by any block in any module.
    pub unresolved: usize,
    pub removed_edges: usize,
}

/// How a single address resolves inside one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Unresolved,
    Data(BlockId),
    Code(BlockId),
}

/// Resolve `address` to the single block covering it.
///
/// A code block only resolves when its whole range is exclusively its own;
/// shared coverage is reported as an error instead of being guessed at.
pub fn resolve(module: &Module, address: u64) -> Result<Resolution, ModelError> {
    let covering = module.blocks().covering(address);
    let id = match covering.as_slice() {
        [] => return Ok(Resolution::Unresolved),
        [id] => *id,
        _ => return Err(ModelError::AmbiguousAddress { address, blocks: covering }),
    };
    let block = module.block(id).ok_or(ModelError::UnknownBlock(id))?;
    if block.is_data() {
        return Ok(Resolution::Data(id));
    }
    let others: Vec<BlockId> = module
        .blocks()
        .overlapping(block.address(), block.end())
        .into_iter()
        .filter(|other| *other != id)
        .collect();
    if !others.is_empty() {
        return Err(ModelError::OverlappingBlocks {
            block: id,
            address: block.address(),
            size: block.size(),
            others,
        });
    }
    Ok(Resolution::Code(id))
}

/// Replace a code block with a data block over the same range and drop its CFG edges.
///
/// The block keeps its handle, so symbols that referred to it now refer to the
/// data block. Returns the number of removed edges; data blocks are left as is.
pub fn demote_block(module: &mut Module, id: BlockId) -> Result<usize, ModelError> {
    let block = module.block(id).ok_or(ModelError::UnknownBlock(id))?;
    if block.is_data() {
        return Ok(0);
    }
    let data = Block::Data(block.as_data());
    module.blocks_mut().replace(id, data)?;
    Ok(module.remove_edges_touching(id))
}

/// Apply every accepted hint whose predicate demotes code, in registry order.
///
/// All hints are resolved against the unmodified model first; if any
/// resolution violates the exclusive-coverage invariant the model is left
/// untouched and the error is returned. Demotion is not transitive: only the
/// block covering each hinted address changes.
pub fn apply_hints(
    model: &mut ProgramModel,
    table: &HintTable,
) -> Result<ReclassifyReport, ModelError> {
    let mut report = ReclassifyReport::default();
    let mut planned: Vec<(usize, BlockId, &AcceptedHint)> = Vec::new();
    let mut seen: BTreeSet<(usize, BlockId)> = BTreeSet::new();

    for predicate in table.predicates_with_hints() {
        if predicate.effect != HintEffect::Demote {
            continue;
        }
        for hint in table.for_predicate(&predicate.name) {
            let mut resolved = false;
            for (index, module) in model.modules.iter().enumerate() {
                match resolve(module, hint.address())? {
                    Resolution::Unresolved => {}
                    Resolution::Data(_) => {
                        resolved = true;
                        report.already_data += 1;
                    }
                    Resolution::Code(id) => {
                        resolved = true;
                        if seen.insert((index, id)) {
                            planned.push((index, id, hint));
                        } else {
                            report.duplicate += 1;
                        }
                    }
                }
            }
            if !resolved {
                report.unresolved += 1;
                debug!(address = %format!("0x{:X}", hint.address()), "hint address not covered");
            }
        }
    }

    for (index, id, hint) in planned {
        let module = &mut model.modules[index];
        let (address, size) = match module.block(id) {
            Some(block) => (block.address(), block.size()),
            None => return Err(ModelError::UnknownBlock(id)),
        };
        let removed_edges = demote_block(module, id)?;
        info!(
            module = %module.name,
            block = %id,
            address = %format!("0x{address:X}"),
            size,
            removed_edges,
            "demoted code block to data"
        );
        report.removed_edges += removed_edges;
        report.demoted.push(Demotion {
            module: module.name.clone(),
            block: id,
            address,
            size,
            hint_address: hint.address(),
            hint_line: hint.source().line,
            removed_edges,
        });
    }

    Ok(report)
}
