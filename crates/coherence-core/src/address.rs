//! Fixed-width address decoding and home-node interleaving.
//!
//! A 24-bit address is split, from the most significant end, into a 16-bit
//! tag, a 4-bit line index and a 4-bit offset:
//!
//! ```text
//! 23            8 7     4 3     0
//! +--------------+-------+-------+
//! |     tag      | index | offset|
//! +--------------+-------+-------+
//! ```
//!
//! The directory protocol additionally reads the top bits of the most
//! significant nibble as an owner selector.

use std::fmt;

use crate::NodeId;

/// Width of an architectural address in bits.
pub const ADDRESS_BITS: u32 = 24;
/// Width of the in-block offset field in bits.
pub const OFFSET_BITS: u32 = 4;
/// Width of the cache line index field in bits.
pub const INDEX_BITS: u32 = 4;
/// Width of the tag field in bits.
pub const TAG_BITS: u32 = ADDRESS_BITS - INDEX_BITS - OFFSET_BITS;
/// Width of the nibble the owner selector is taken from.
pub const SELECTOR_NIBBLE_BITS: u32 = 4;

/// Number of direct-mapped lines in every node cache.
pub const CACHE_LINES: usize = 1 << INDEX_BITS;
/// Number of data units (bytes) in one block.
pub const BLOCK_SIZE: usize = 1 << OFFSET_BITS;

/// Largest representable address value.
pub const ADDRESS_MAX: u32 = (1 << ADDRESS_BITS) - 1;

const OFFSET_MASK: u32 = (1 << OFFSET_BITS) - 1;
const INDEX_MASK: u32 = (1 << INDEX_BITS) - 1;
const TAG_MASK: u32 = (1 << TAG_BITS) - 1;

const _: () = assert_address_geometry();

const fn assert_address_geometry() {
    assert!(
        TAG_BITS + INDEX_BITS + OFFSET_BITS == ADDRESS_BITS,
        "address fields must cover the full address width"
    );
    assert!(TAG_BITS == u16::BITS, "tag must fit a u16 exactly");
    assert!(
        SELECTOR_NIBBLE_BITS <= TAG_BITS,
        "owner selector must come from tag bits"
    );
    assert!(BLOCK_SIZE == 16, "block size must be sixteen units");
    assert!(CACHE_LINES == 16, "cache must have sixteen lines");
}

/// High-order address bits identifying which block a line holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Tag(u16);

impl Tag {
    /// Wraps a raw 16-bit tag value.
    #[must_use]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    /// Returns the raw tag bits.
    #[must_use]
    pub const fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Direct-mapped line slot selector (`0..CACHE_LINES`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct LineIndex(u8);

impl LineIndex {
    /// Builds a line index, rejecting values outside the cache.
    #[must_use]
    pub const fn new(raw: u8) -> Option<Self> {
        if (raw as usize) < CACHE_LINES {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Returns the raw index value.
    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Returns the index as an array position.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Iterates over every line index in ascending order.
    #[allow(clippy::cast_possible_truncation)]
    pub fn all() -> impl Iterator<Item = Self> {
        (0..CACHE_LINES).map(|index| Self(index as u8))
    }
}

impl fmt::Display for LineIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:X}", self.0)
    }
}

/// Fields of a decoded address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DecodedAddress {
    /// Block identifier bits.
    pub tag: Tag,
    /// Cache line slot.
    pub index: LineIndex,
    /// Unit offset inside the block; unused for coherence decisions.
    pub offset: u8,
}

/// A validated 24-bit memory address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Address(u32);

impl Address {
    /// Builds an address, rejecting values wider than [`ADDRESS_BITS`].
    #[must_use]
    pub const fn new(raw: u32) -> Option<Self> {
        if raw <= ADDRESS_MAX {
            Some(Self(raw))
        } else {
            None
        }
    }

    /// Reassembles an address from its decoded fields.
    #[must_use]
    pub const fn from_parts(tag: Tag, index: LineIndex, offset: u8) -> Self {
        Self(
            ((tag.0 as u32) << (INDEX_BITS + OFFSET_BITS))
                | ((index.0 as u32) << OFFSET_BITS)
                | (offset as u32 & OFFSET_MASK),
        )
    }

    /// Returns the raw address bits.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the tag field.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn tag(self) -> Tag {
        Tag(((self.0 >> (INDEX_BITS + OFFSET_BITS)) & TAG_MASK) as u16)
    }

    /// Returns the line index field.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn index(self) -> LineIndex {
        LineIndex(((self.0 >> OFFSET_BITS) & INDEX_MASK) as u8)
    }

    /// Returns the offset field.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn offset(self) -> u8 {
        (self.0 & OFFSET_MASK) as u8
    }

    /// Splits the address into tag, index and offset.
    #[must_use]
    pub const fn decode(self) -> DecodedAddress {
        DecodedAddress {
            tag: self.tag(),
            index: self.index(),
            offset: self.offset(),
        }
    }

    /// Returns the block-aligned address containing this address.
    #[must_use]
    pub const fn block(self) -> BlockAddress {
        BlockAddress(self.0 & !OFFSET_MASK)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:06X}", self.0)
    }
}

/// Block-aligned address used as the key of backing stores and directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct BlockAddress(u32);

impl BlockAddress {
    /// Rebuilds the block address a line at `index` holding `tag` refers to.
    #[must_use]
    pub const fn from_line(tag: Tag, index: LineIndex) -> Self {
        Self(Address::from_parts(tag, index, 0).0)
    }

    /// Returns the block base as a full address (offset zero).
    #[must_use]
    pub const fn address(self) -> Address {
        Address(self.0)
    }

    /// Returns the tag field of the block.
    #[must_use]
    pub const fn tag(self) -> Tag {
        self.address().tag()
    }

    /// Returns the line index the block maps to.
    #[must_use]
    pub const fn index(self) -> LineIndex {
        self.address().index()
    }
}

impl fmt::Display for BlockAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.address(), f)
    }
}

/// Number of selector bits needed to address `node_count` nodes.
#[must_use]
pub const fn selector_bits(node_count: usize) -> u32 {
    if node_count <= 1 {
        0
    } else {
        usize::BITS - (node_count - 1).leading_zeros()
    }
}

/// Resolves the node whose private memory and directory own `address`.
///
/// The selector is the top `log2(node_count)` bits of the most significant
/// address nibble, so with four nodes `0x0xxxxx..0x3xxxxx` belong to `CPU00`,
/// `0x4xxxxx..0x7xxxxx` to `CPU01` and so on. `node_count` is expected to be
/// a power of two no larger than sixteen; other counts wrap modulo the node
/// count.
///
/// Despite the "interleaving" name this is a contiguous range split, not a
/// round-robin over consecutive blocks: neighbouring blocks share a home.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub const fn home_node(address: Address, node_count: usize) -> NodeId {
    let bits = selector_bits(node_count);
    if bits == 0 || bits > SELECTOR_NIBBLE_BITS {
        return NodeId::new(0);
    }

    let selector = (address.0 >> (ADDRESS_BITS - bits)) as usize;
    NodeId::new((selector % node_count) as u8)
}
