//! Per-home-node directory of cached blocks.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::node::format_nodes;
use crate::{BlockAddress, NodeId};

/// Aggregate state a home node records for one of its blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum DirectoryState {
    /// No node caches the block.
    #[default]
    Uncached,
    /// One or more nodes hold clean read-only copies.
    Shared,
    /// Exactly one node holds the block, modified.
    Exclusive,
}

impl DirectoryState {
    /// Single-letter abbreviation used in tables and narratives.
    #[must_use]
    pub const fn abbreviation(self) -> char {
        match self {
            Self::Uncached => 'U',
            Self::Shared => 'S',
            Self::Exclusive => 'E',
        }
    }
}

impl fmt::Display for DirectoryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// Directory state plus the set of nodes caching the block.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct DirectoryEntry {
    state: DirectoryState,
    sharers: BTreeSet<NodeId>,
}

impl DirectoryEntry {
    /// Creates an uncached entry with no sharers.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: DirectoryState::Uncached,
            sharers: BTreeSet::new(),
        }
    }

    /// Returns the directory state.
    #[must_use]
    pub const fn state(&self) -> DirectoryState {
        self.state
    }

    /// Returns the sharer set in node order.
    #[must_use]
    pub const fn sharers(&self) -> &BTreeSet<NodeId> {
        &self.sharers
    }

    /// Returns `true` when `node` is recorded as holding the block.
    #[must_use]
    pub fn is_sharer(&self, node: NodeId) -> bool {
        self.sharers.contains(&node)
    }

    /// Returns the lowest-numbered sharer other than `node`.
    #[must_use]
    pub fn sharer_other_than(&self, node: NodeId) -> Option<NodeId> {
        self.sharers.iter().copied().find(|sharer| *sharer != node)
    }

    /// Returns the owning node while the entry is exclusive.
    #[must_use]
    pub fn exclusive_owner(&self) -> Option<NodeId> {
        match self.state {
            DirectoryState::Exclusive => self.sharers.iter().next().copied(),
            DirectoryState::Uncached | DirectoryState::Shared => None,
        }
    }

    /// Checks the state/sharer-count pairing: uncached iff empty, exclusive
    /// iff exactly one sharer, shared with at least one.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        match self.state {
            DirectoryState::Uncached => self.sharers.is_empty(),
            DirectoryState::Shared => !self.sharers.is_empty(),
            DirectoryState::Exclusive => self.sharers.len() == 1,
        }
    }

    /// Adds a reader; the entry becomes shared.
    pub(crate) fn share_with(&mut self, node: NodeId) {
        self.sharers.insert(node);
        self.state = DirectoryState::Shared;
    }

    /// Hands sole ownership to `node`.
    pub(crate) fn grant_exclusive(&mut self, node: NodeId) {
        self.sharers.clear();
        self.sharers.insert(node);
        self.state = DirectoryState::Exclusive;
    }

    /// Drops `node` from the sharers, returning `true` once none remain.
    pub(crate) fn release(&mut self, node: NodeId) -> bool {
        self.sharers.remove(&node);
        if self.sharers.is_empty() {
            self.state = DirectoryState::Uncached;
            true
        } else {
            false
        }
    }
}

impl fmt::Display for DirectoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.state, format_nodes(&self.sharers))
    }
}

/// Directory kept by one home node for the blocks it owns.
///
/// Entries are created lazily on first caching and removed as soon as their
/// sharer set empties.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Directory {
    entries: BTreeMap<BlockAddress, DirectoryEntry>,
}

impl Directory {
    /// Creates an empty directory.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Returns the entry for `block`, if one exists.
    #[must_use]
    pub fn get(&self, block: BlockAddress) -> Option<&DirectoryEntry> {
        self.entries.get(&block)
    }

    /// Returns the state recorded for `block`; absent entries are uncached.
    #[must_use]
    pub fn state_of(&self, block: BlockAddress) -> DirectoryState {
        self.get(block)
            .map_or(DirectoryState::Uncached, DirectoryEntry::state)
    }

    /// Returns the entry for `block`, creating an uncached one on first use.
    pub(crate) fn entry_for(&mut self, block: BlockAddress) -> &mut DirectoryEntry {
        self.entries.entry(block).or_default()
    }

    /// Removes `node` from the sharers of `block`, deleting the entry when
    /// it empties. Returns `true` when the entry was deleted.
    pub(crate) fn release(&mut self, block: BlockAddress, node: NodeId) -> bool {
        let emptied = self
            .entries
            .get_mut(&block)
            .is_some_and(|entry| entry.release(node));
        if emptied {
            self.entries.remove(&block);
        }
        emptied
    }

    /// Deletes the entry for `block`.
    pub(crate) fn remove(&mut self, block: BlockAddress) -> Option<DirectoryEntry> {
        self.entries.remove(&block)
    }

    /// Drops every entry.
    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterates over entries in block-address order.
    pub fn iter(&self) -> impl Iterator<Item = (BlockAddress, &DirectoryEntry)> {
        self.entries.iter().map(|(block, entry)| (*block, entry))
    }

    /// Number of tracked blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no block is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
