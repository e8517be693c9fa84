//! Fixed-size block payload moved between caches and backing stores.

use std::fmt;

use crate::BLOCK_SIZE;

/// One block of data; every transfer in the system moves a whole block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Block([u8; BLOCK_SIZE]);

impl Block {
    /// The zero-filled block every backing store starts from.
    pub const ZERO: Self = Self([0; BLOCK_SIZE]);

    /// Wraps raw block bytes.
    #[must_use]
    pub const fn new(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }

    /// Builds a block with every unit set to `value`.
    #[must_use]
    pub const fn splat(value: u8) -> Self {
        Self([value; BLOCK_SIZE])
    }

    /// Returns the block bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; BLOCK_SIZE] {
        &self.0
    }

    /// Returns `true` when every unit is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|unit| *unit == 0)
    }
}

impl From<[u8; BLOCK_SIZE]> for Block {
    fn from(bytes: [u8; BLOCK_SIZE]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for unit in &self.0 {
            write!(f, "{unit:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Block;
    use crate::BLOCK_SIZE;

    #[test]
    fn default_block_is_zero_filled() {
        assert_eq!(Block::default(), Block::ZERO);
        assert!(Block::ZERO.is_zero());
        assert!(!Block::splat(1).is_zero());
    }

    #[test]
    fn display_renders_two_hex_digits_per_unit() {
        let mut bytes = [0_u8; BLOCK_SIZE];
        bytes[0] = 0xAB;
        bytes[BLOCK_SIZE - 1] = 0x0C;

        let rendered = Block::new(bytes).to_string();
        assert_eq!(rendered.len(), BLOCK_SIZE * 2);
        assert!(rendered.starts_with("AB00"));
        assert!(rendered.ends_with("000C"));
    }
}
