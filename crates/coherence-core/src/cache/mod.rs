//! Direct-mapped per-node caches.

/// Single cache line and its coherence state.
pub mod line;
/// Fixed array of lines owned by one node.
pub mod node_cache;

pub use line::{CacheLine, LineState};
pub use node_cache::{Lookup, NodeCache};
