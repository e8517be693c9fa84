//! Fixed-size direct-mapped cache owned by one node.

use crate::{Address, CacheLine, LineIndex, NodeId, CACHE_LINES};

/// Result of probing a node cache for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lookup {
    /// The indexed line is valid and holds the requested tag.
    Hit,
    /// The indexed line is invalid or holds another block.
    Miss,
}

impl Lookup {
    /// Returns `true` for [`Lookup::Hit`].
    #[must_use]
    pub const fn is_hit(self) -> bool {
        matches!(self, Self::Hit)
    }
}

/// The `CACHE_LINES` lines of one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCache {
    node: NodeId,
    lines: [CacheLine; CACHE_LINES],
}

impl NodeCache {
    /// Creates an all-invalid cache for `node`.
    #[must_use]
    pub const fn new(node: NodeId) -> Self {
        Self {
            node,
            lines: [CacheLine::empty(); CACHE_LINES],
        }
    }

    /// Returns the owning node.
    #[must_use]
    pub const fn node(&self) -> NodeId {
        self.node
    }

    /// Probes the line `address` maps to.
    #[must_use]
    pub fn lookup(&self, address: Address) -> Lookup {
        if self.line(address.index()).holds(address.tag()) {
            Lookup::Hit
        } else {
            Lookup::Miss
        }
    }

    /// Returns the line at `index`.
    #[must_use]
    pub const fn line(&self, index: LineIndex) -> &CacheLine {
        &self.lines[index.as_usize()]
    }

    pub(crate) fn line_mut(&mut self, index: LineIndex) -> &mut CacheLine {
        &mut self.lines[index.as_usize()]
    }

    /// Iterates over all lines with their index, in index order.
    pub fn iter(&self) -> impl Iterator<Item = (LineIndex, &CacheLine)> {
        LineIndex::all().zip(self.lines.iter())
    }

    /// Number of lines that currently hold valid data.
    #[must_use]
    pub fn valid_lines(&self) -> usize {
        self.lines.iter().filter(|line| line.is_valid()).count()
    }

    /// Returns every line to the empty invalid state.
    pub(crate) fn clear(&mut self) {
        self.lines = [CacheLine::empty(); CACHE_LINES];
    }
}

#[cfg(test)]
mod tests {
    use super::{Lookup, NodeCache};
    use crate::{Address, Block, LineState, NodeId, CACHE_LINES};

    fn address(raw: u32) -> Address {
        Address::new(raw).expect("24-bit address")
    }

    #[test]
    fn new_cache_misses_everywhere() {
        let cache = NodeCache::new(NodeId::new(2));
        assert_eq!(cache.node(), NodeId::new(2));
        assert_eq!(cache.iter().count(), CACHE_LINES);
        assert_eq!(cache.valid_lines(), 0);
        assert_eq!(cache.lookup(address(0x00_00_00)), Lookup::Miss);
    }

    #[test]
    fn lookup_hits_only_matching_valid_tag() {
        let mut cache = NodeCache::new(NodeId::new(0));
        let target = address(0x01_00_30);
        cache
            .line_mut(target.index())
            .fill_shared(target.tag(), Block::splat(7));

        assert!(cache.lookup(target).is_hit());
        assert!(cache.lookup(address(0x01_00_3F)).is_hit());
        assert_eq!(cache.lookup(address(0x02_00_30)), Lookup::Miss);
        assert_eq!(cache.lookup(address(0x01_00_40)), Lookup::Miss);

        cache.line_mut(target.index()).invalidate();
        assert_eq!(cache.lookup(target), Lookup::Miss);
    }

    #[test]
    fn clear_resets_every_line() {
        let mut cache = NodeCache::new(NodeId::new(1));
        let target = address(0x00_00_10);
        cache
            .line_mut(target.index())
            .write(target.tag(), Block::splat(3));
        assert_eq!(cache.valid_lines(), 1);

        cache.clear();

        assert_eq!(cache.valid_lines(), 0);
        assert!(cache
            .iter()
            .all(|(_, line)| line.state() == LineState::Invalid && line.tag().is_none()));
    }
}
