//! One direct-mapped cache slot.

use std::fmt;

use crate::{Block, BlockAddress, LineIndex, Tag};

/// Per-line coherence state shared by both protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum LineState {
    /// Line holds no usable data; any tag still stored is stale.
    #[default]
    Invalid,
    /// Clean read-only copy; other nodes may hold the same block.
    Shared,
    /// Sole writable copy; the backing store may be out of date.
    Modified,
}

impl LineState {
    /// Single-letter abbreviation used in tables and narratives.
    #[must_use]
    pub const fn abbreviation(self) -> char {
        match self {
            Self::Invalid => 'I',
            Self::Shared => 'S',
            Self::Modified => 'M',
        }
    }
}

impl fmt::Display for LineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.abbreviation())
    }
}

/// One cache slot: tag, coherence state, dirty flag and block data.
///
/// `dirty` is only ever set together with [`LineState::Modified`]. An
/// invalid line may keep its last tag; that tag is never used for hit tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CacheLine {
    tag: Option<Tag>,
    state: LineState,
    dirty: bool,
    data: Block,
}

impl CacheLine {
    /// Returns an empty invalid line.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            tag: None,
            state: LineState::Invalid,
            dirty: false,
            data: Block::ZERO,
        }
    }

    /// Returns the stored tag, including a stale tag on an invalid line.
    #[must_use]
    pub const fn tag(&self) -> Option<Tag> {
        self.tag
    }

    /// Returns the coherence state.
    #[must_use]
    pub const fn state(&self) -> LineState {
        self.state
    }

    /// Returns `true` when the line differs from its backing store.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Returns the block data held by the line.
    #[must_use]
    pub const fn data(&self) -> &Block {
        &self.data
    }

    /// Returns `true` for any state other than [`LineState::Invalid`].
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        !matches!(self.state, LineState::Invalid)
    }

    /// Returns `true` when the line validly holds the block tagged `tag`.
    #[must_use]
    pub fn holds(&self, tag: Tag) -> bool {
        self.is_valid() && self.tag == Some(tag)
    }

    /// Returns `true` when the line must be written back before it changes.
    #[must_use]
    pub const fn needs_write_back(&self) -> bool {
        matches!(self.state, LineState::Modified) && self.dirty
    }

    /// Returns the block a valid line at `index` holds.
    #[must_use]
    pub fn resident_block(&self, index: LineIndex) -> Option<BlockAddress> {
        match (self.state, self.tag) {
            (LineState::Shared | LineState::Modified, Some(tag)) => {
                Some(BlockAddress::from_line(tag, index))
            }
            _ => None,
        }
    }

    /// Installs a clean shared copy of a block.
    pub(crate) fn fill_shared(&mut self, tag: Tag, data: Block) {
        self.tag = Some(tag);
        self.data = data;
        self.state = LineState::Shared;
        self.dirty = false;
    }

    /// Replaces the whole block with `payload` and takes write ownership.
    pub(crate) fn write(&mut self, tag: Tag, payload: Block) {
        self.tag = Some(tag);
        self.data = payload;
        self.state = LineState::Modified;
        self.dirty = true;
    }

    /// Drops write ownership, keeping a clean shared copy.
    pub(crate) fn downgrade(&mut self) {
        self.state = LineState::Shared;
        self.dirty = false;
    }

    /// Marks the line invalid; the tag and data are left as stale artifacts.
    pub(crate) fn invalidate(&mut self) {
        self.state = LineState::Invalid;
        self.dirty = false;
    }
}

#[cfg(test)]
mod tests {
    use super::{CacheLine, LineState};
    use crate::{Block, BlockAddress, LineIndex, Tag};

    #[test]
    fn empty_line_is_invalid_and_clean() {
        let line = CacheLine::empty();
        assert_eq!(line.state(), LineState::Invalid);
        assert!(!line.is_dirty());
        assert!(line.tag().is_none());
        assert!(line.data().is_zero());
        assert_eq!(line, CacheLine::default());
    }

    #[test]
    fn write_sets_modified_and_dirty_together() {
        let mut line = CacheLine::empty();
        line.write(Tag::new(0x0100), Block::splat(0xAA));

        assert_eq!(line.state(), LineState::Modified);
        assert!(line.is_dirty());
        assert!(line.needs_write_back());
        assert!(line.holds(Tag::new(0x0100)));
    }

    #[test]
    fn downgrade_and_invalidate_clear_dirty() {
        let mut line = CacheLine::empty();
        line.write(Tag::new(0x0100), Block::splat(0xAA));
        line.downgrade();
        assert_eq!(line.state(), LineState::Shared);
        assert!(!line.is_dirty());

        line.write(Tag::new(0x0100), Block::splat(0xBB));
        line.invalidate();
        assert_eq!(line.state(), LineState::Invalid);
        assert!(!line.is_dirty());
    }

    #[test]
    fn stale_tag_on_invalid_line_never_hits() {
        let mut line = CacheLine::empty();
        line.fill_shared(Tag::new(0x0042), Block::splat(1));
        line.invalidate();

        assert_eq!(line.tag(), Some(Tag::new(0x0042)));
        assert!(!line.holds(Tag::new(0x0042)));
        assert!(line.resident_block(LineIndex::new(3).expect("index")).is_none());
    }

    #[test]
    fn resident_block_reconstructs_block_address() {
        let index = LineIndex::new(0x7).expect("index");
        let mut line = CacheLine::empty();
        line.fill_shared(Tag::new(0xABCD), Block::ZERO);

        assert_eq!(
            line.resident_block(index),
            Some(BlockAddress::from_line(Tag::new(0xABCD), index))
        );
        assert_eq!(
            line.resident_block(index).map(|block| block.address().raw()),
            Some(0xAB_CD_70)
        );
    }

    #[test]
    fn state_abbreviations_match_table_columns() {
        assert_eq!(LineState::Invalid.to_string(), "I");
        assert_eq!(LineState::Shared.to_string(), "S");
        assert_eq!(LineState::Modified.to_string(), "M");
    }
}
