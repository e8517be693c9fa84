//! Read-only views of caches and directories for display.

use crate::{
    Block, BlockAddress, CacheLine, DirectoryEntry, LineIndex, LineState, NodeId, Protocol, Tag,
};

/// Copy of one cache line together with its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CacheLineView {
    /// Line slot.
    pub index: LineIndex,
    /// Tag last loaded into the line; may be stale when invalid.
    pub tag: Option<Tag>,
    /// Coherence state.
    pub state: LineState,
    /// Whether the data differs from the backing store.
    pub dirty: bool,
    /// Line contents.
    pub data: Block,
}

impl CacheLineView {
    /// Captures `line` held at `index`.
    #[must_use]
    pub const fn new(index: LineIndex, line: &CacheLine) -> Self {
        Self {
            index,
            tag: line.tag(),
            state: line.state(),
            dirty: line.is_dirty(),
            data: *line.data(),
        }
    }

    /// Block the line currently holds, if valid.
    #[must_use]
    pub fn block(&self) -> Option<BlockAddress> {
        match (self.state, self.tag) {
            (LineState::Invalid, _) | (_, None) => None,
            (_, Some(tag)) => Some(BlockAddress::from_line(tag, self.index)),
        }
    }
}

/// One directory entry with the block it tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DirectoryRow {
    /// Tracked block.
    pub block: BlockAddress,
    /// State and sharers.
    pub entry: DirectoryEntry,
}

impl DirectoryRow {
    /// Captures `entry` for `block`.
    #[must_use]
    pub fn new(block: BlockAddress, entry: &DirectoryEntry) -> Self {
        Self {
            block,
            entry: entry.clone(),
        }
    }
}

/// Everything one node holds.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct NodeSnapshot {
    /// Node described.
    pub node: NodeId,
    /// All cache lines in index order.
    pub lines: Vec<CacheLineView>,
    /// Directory rows in block order; `None` for the snoop protocol.
    pub directory: Option<Vec<DirectoryRow>>,
}

/// Whole-system view.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SystemSnapshot {
    /// Protocol being simulated.
    pub protocol: Protocol,
    /// One entry per node, in node order.
    pub nodes: Vec<NodeSnapshot>,
}

impl SystemSnapshot {
    /// Returns the snapshot of `node`.
    #[must_use]
    pub fn node(&self, node: NodeId) -> Option<&NodeSnapshot> {
        self.nodes.iter().find(|snapshot| snapshot.node == node)
    }
}
