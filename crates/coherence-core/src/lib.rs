//! Cache-coherence simulation core: directory and snoop protocols over a set
//! of nodes with direct-mapped caches.

/// Address geometry, decoding and home-node interleaving.
pub mod address;
pub use address::{
    home_node, selector_bits, Address, BlockAddress, DecodedAddress, LineIndex, Tag,
    ADDRESS_BITS, ADDRESS_MAX, BLOCK_SIZE, CACHE_LINES, INDEX_BITS, OFFSET_BITS,
    SELECTOR_NIBBLE_BITS, TAG_BITS,
};

/// Fixed-size block payload.
pub mod block;
pub use block::Block;

/// Processing node identifiers.
pub mod node;
pub use node::NodeId;

/// Per-node direct-mapped caches.
pub mod cache;
pub use cache::{CacheLine, LineState, Lookup, NodeCache};

/// Private and shared backing stores.
pub mod memory;
pub use memory::BackingStore;

/// Home-node directories for the directory protocol.
pub mod directory;
pub use directory::{Directory, DirectoryEntry, DirectoryState};

/// System configuration.
pub mod config;
pub use config::{
    ConfigError, Protocol, SystemConfig, DEFAULT_HISTORY_CAPACITY, DEFAULT_NODE_COUNT, MAX_NODES,
};

/// Errors reported by the engines.
pub mod error;
pub use error::CoherenceError;

/// Protocol engines and the request/outcome types they exchange.
pub mod engine;
pub use engine::{
    CoherenceEngine, DirectoryEngine, Engine, Operation, Request, RequestOutcome, SnoopEngine,
    Step, Store,
};

/// Read-only views for display.
pub mod snapshot;
pub use snapshot::{CacheLineView, DirectoryRow, NodeSnapshot, SystemSnapshot};

/// Bounded request history.
pub mod history;
pub use history::{LogEntry, RequestLog};

/// Whole-system invariant checker.
pub mod invariants;
pub use invariants::InvariantViolation;

/// Engine plus history facade.
pub mod simulator;
pub use simulator::Simulator;

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
