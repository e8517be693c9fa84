//! System configuration and validation.

use std::fmt;

use thiserror::Error;

use crate::address::SELECTOR_NIBBLE_BITS;

/// Node count used when no configuration is given.
pub const DEFAULT_NODE_COUNT: usize = 4;
/// Number of requests the history keeps by default.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
/// Largest node count the owner selector nibble can address.
pub const MAX_NODES: usize = 1 << SELECTOR_NIBBLE_BITS;

/// Coherence protocol family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum Protocol {
    /// Home nodes track sharers in a directory; private memory per node.
    #[default]
    Directory,
    /// No directory; every miss snoops all other caches; one shared memory.
    Snoop,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Directory => f.write_str("directory"),
            Self::Snoop => f.write_str("snoop"),
        }
    }
}

/// Reasons a [`SystemConfig`] is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ConfigError {
    /// Node count is zero or wider than the selector nibble allows.
    #[error("node count {count} is outside 1..={max}")]
    NodeCountOutOfRange {
        /// Requested node count.
        count: usize,
        /// Largest supported node count.
        max: usize,
    },
    /// Directory interleaving needs a 1:1 selector-to-node mapping.
    #[error("directory protocol needs a power-of-two node count, got {0}")]
    NodeCountNotPowerOfTwo(usize),
    /// The request history must hold at least one entry.
    #[error("history capacity must be non-zero")]
    EmptyHistory,
}

/// Top-level immutable configuration for a simulated system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct SystemConfig {
    /// Protocol family to simulate.
    pub protocol: Protocol,
    /// Number of processing nodes.
    pub node_count: usize,
    /// Maximum number of requests kept in the history.
    pub history_capacity: usize,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            protocol: Protocol::Directory,
            node_count: DEFAULT_NODE_COUNT,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
        }
    }
}

impl SystemConfig {
    /// Returns the default configuration for `protocol`.
    #[must_use]
    pub fn for_protocol(protocol: Protocol) -> Self {
        Self {
            protocol,
            ..Self::default()
        }
    }

    /// Checks node count and history bounds.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the node count is out of range, not a
    /// power of two under the directory protocol, or the history capacity is
    /// zero.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.node_count == 0 || self.node_count > MAX_NODES {
            return Err(ConfigError::NodeCountOutOfRange {
                count: self.node_count,
                max: MAX_NODES,
            });
        }
        if matches!(self.protocol, Protocol::Directory) && !self.node_count.is_power_of_two() {
            return Err(ConfigError::NodeCountNotPowerOfTwo(self.node_count));
        }
        if self.history_capacity == 0 {
            return Err(ConfigError::EmptyHistory);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ConfigError, Protocol, SystemConfig, DEFAULT_HISTORY_CAPACITY, DEFAULT_NODE_COUNT,
        MAX_NODES,
    };

    #[test]
    fn default_config_matches_four_node_directory_system() {
        let config = SystemConfig::default();
        assert_eq!(config.protocol, Protocol::Directory);
        assert_eq!(config.node_count, DEFAULT_NODE_COUNT);
        assert_eq!(config.history_capacity, DEFAULT_HISTORY_CAPACITY);
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn node_count_bounds_are_enforced() {
        let zero = SystemConfig {
            node_count: 0,
            ..SystemConfig::default()
        };
        assert_eq!(
            zero.validate(),
            Err(ConfigError::NodeCountOutOfRange {
                count: 0,
                max: MAX_NODES
            })
        );

        let wide = SystemConfig {
            node_count: MAX_NODES * 2,
            ..SystemConfig::default()
        };
        assert!(matches!(
            wide.validate(),
            Err(ConfigError::NodeCountOutOfRange { .. })
        ));
    }

    #[test]
    fn only_directory_protocol_requires_power_of_two() {
        let directory = SystemConfig {
            node_count: 3,
            ..SystemConfig::default()
        };
        assert_eq!(
            directory.validate(),
            Err(ConfigError::NodeCountNotPowerOfTwo(3))
        );

        let snoop = SystemConfig {
            node_count: 3,
            ..SystemConfig::for_protocol(Protocol::Snoop)
        };
        assert_eq!(snoop.validate(), Ok(()));
    }

    #[test]
    fn empty_history_is_rejected() {
        let config = SystemConfig {
            history_capacity: 0,
            ..SystemConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyHistory));
        assert_eq!(
            ConfigError::EmptyHistory.to_string(),
            "history capacity must be non-zero"
        );
    }
}
