use thiserror::Error;

use crate::NodeId;

/// Contract violations the engine reports instead of executing a request.
///
/// Validation of user input happens before the engine is reached; the only
/// condition the engine itself can detect is a node outside the configured
/// set. The check runs before any state is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CoherenceError {
    /// A request or snapshot referenced a node that does not exist.
    #[error("node {node} is not part of the {node_count}-node system")]
    UnknownNode {
        /// Offending node id.
        node: NodeId,
        /// Number of nodes in the system.
        node_count: usize,
    },
}

/// Rejects nodes outside a `node_count`-node system.
pub(crate) const fn check_node(node: NodeId, node_count: usize) -> Result<(), CoherenceError> {
    if node.is_member_of(node_count) {
        Ok(())
    } else {
        Err(CoherenceError::UnknownNode { node, node_count })
    }
}
