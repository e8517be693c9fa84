//! Block-granular backing stores.

use std::collections::BTreeMap;

use crate::{Block, BlockAddress};

/// Mapping from block address to block data, zero-filled on first touch.
///
/// The directory protocol gives every node its own store for the addresses
/// it owns; the snoop protocol uses a single store shared by all nodes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BackingStore {
    blocks: BTreeMap<BlockAddress, Block>,
}

impl BackingStore {
    /// Creates an empty store; every block reads as zero until written.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            blocks: BTreeMap::new(),
        }
    }

    /// Reads a block for a cache fill, materialising a zero block if needed.
    pub fn load(&mut self, block: BlockAddress) -> Block {
        *self.blocks.entry(block).or_default()
    }

    /// Overwrites a whole block.
    pub fn store(&mut self, block: BlockAddress, data: Block) {
        self.blocks.insert(block, data);
    }

    /// Returns the current block contents without materialising it.
    #[must_use]
    pub fn peek(&self, block: BlockAddress) -> Block {
        self.blocks.get(&block).copied().unwrap_or_default()
    }

    /// Number of blocks that have been touched.
    #[must_use]
    pub fn populated(&self) -> usize {
        self.blocks.len()
    }

    /// Iterates over touched blocks in address order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockAddress, &Block)> {
        self.blocks.iter().map(|(address, data)| (*address, data))
    }
}
