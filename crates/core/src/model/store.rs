use std::collections::{BTreeMap, BTreeSet};

use super::{Block, BlockId, ModelError, ModelResult};

/// Index-based block storage.
///
/// Blocks live in slots keyed by [`BlockId`]; a second index maps start
/// addresses to handles. A block's range key never changes after insertion,
/// so reclassifying a block is a single slot update.
///
/// Overlapping blocks are accepted on insertion (disassemblers produce them),
/// callers that need exclusive coverage check with [`BlockStore::covering`]
/// and [`BlockStore::overlapping`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockStore {
    slots: BTreeMap<BlockId, Block>,
    by_start: BTreeMap<u64, BTreeSet<BlockId>>,
    next_id: u64,
    /// Largest block size seen; bounds the backwards scan in range queries.
    max_size: u64,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Insert a block under a newly allocated handle.
    pub fn insert(&mut self, block: Block) -> ModelResult<BlockId> {
        let id = BlockId(self.next_id);
        self.insert_with_id(id, block)?;
        Ok(id)
    }

    /// Insert a block under a caller-chosen handle (used when loading persisted IR).
    pub fn insert_with_id(&mut self, id: BlockId, block: Block) -> ModelResult<()> {
        check_range(&block)?;
        if self.slots.contains_key(&id) {
            return Err(ModelError::DuplicateBlockId(id));
        }
        self.by_start.entry(block.address()).or_default().insert(id);
        self.max_size = self.max_size.max(block.size());
        self.next_id = self.next_id.max(id.0.saturating_add(1));
        self.slots.insert(id, block);
        Ok(())
    }

    pub fn get(&self, id: BlockId) -> Option<&Block> {
        self.slots.get(&id)
    }

    /// Blocks in address order (ties broken by handle).
    pub fn iter(&self) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
        self.by_start.values().flat_map(|ids| ids.iter()).filter_map(|id| {
            self.slots.get(id).map(|block| (*id, block))
        })
    }

    /// Handles of every block whose range contains `address`.
    pub fn covering(&self, address: u64) -> Vec<BlockId> {
        self.candidates(address, address.saturating_add(1))
            .filter(|(_, block)| block.contains(address))
            .map(|(id, _)| id)
            .collect()
    }

    /// Handles of every block intersecting `[start, end)`.
    pub fn overlapping(&self, start: u64, end: u64) -> Vec<BlockId> {
        if end <= start {
            return Vec::new();
        }
        self.candidates(start, end)
            .filter(|(_, block)| block.address() < end && block.end() > start)
            .map(|(id, _)| id)
            .collect()
    }

    /// Swap the block stored under `id` for `block`, returning the old one.
    ///
    /// The replacement must cover the identical range; the range index is untouched.
    pub fn replace(&mut self, id: BlockId, block: Block) -> ModelResult<Block> {
        let slot = self.slots.get_mut(&id).ok_or(ModelError::UnknownBlock(id))?;
        if slot.address() != block.address() || slot.size() != block.size() {
            return Err(ModelError::RangeMismatch {
                id,
                address: block.address(),
                size: block.size(),
            });
        }
        Ok(std::mem::replace(slot, block))
    }

    fn candidates(&self, start: u64, end: u64) -> impl Iterator<Item = (BlockId, &Block)> + '_ {
        let low = start.saturating_sub(self.max_size.saturating_sub(1));
        self.by_start
            .range(low..end)
            .flat_map(|(_, ids)| ids.iter())
            .filter_map(|id| self.slots.get(id).map(|block| (*id, block)))
    }
}

fn check_range(block: &Block) -> ModelResult<()> {
    if block.size() == 0 || block.address().checked_add(block.size()).is_none() {
        return Err(ModelError::InvalidBlockRange {
            address: block.address(),
            size: block.size(),
        });
    }
    Ok(())
}
