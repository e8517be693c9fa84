//! Processing node identifiers.

use std::fmt;

/// Identifier of one processing node (`0..node_count`).
///
/// Nodes display as `CPU` followed by their index in binary, padded to two
/// digits: `CPU00`, `CPU01`, `CPU10`, `CPU11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct NodeId(u8);

impl NodeId {
    /// Wraps a raw node index.
    #[must_use]
    pub const fn new(index: u8) -> Self {
        Self(index)
    }

    /// Returns the array position of this node.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Returns the raw node number.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Returns `true` when the node belongs to a system of `node_count` nodes.
    #[must_use]
    pub const fn is_member_of(self, node_count: usize) -> bool {
        self.index() < node_count
    }

    /// Iterates over every node of a `node_count`-node system in id order.
    pub fn all(node_count: usize) -> impl Iterator<Item = Self> {
        (0..node_count).filter_map(|index| u8::try_from(index).ok().map(Self))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CPU{:02b}", self.0)
    }
}

/// Formats a node list as `{CPU00, CPU01}`.
pub(crate) fn format_nodes<'a>(nodes: impl IntoIterator<Item = &'a NodeId>) -> String {
    let names: Vec<String> = nodes.into_iter().map(ToString::to_string).collect();
    format!("{{{}}}", names.join(", "))
}
