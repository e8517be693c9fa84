//! Coherence engines: request types, protocol trait and dispatch.

/// Directory-based protocol engine.
pub mod directory;
/// Broadcast/snoop protocol engine.
pub mod snoop;

use std::fmt;

pub use directory::DirectoryEngine;
pub use snoop::SnoopEngine;

use crate::node::format_nodes;
use crate::snapshot::{CacheLineView, DirectoryRow, NodeSnapshot, SystemSnapshot};
use crate::{
    Address, Block, BlockAddress, CacheLine, CoherenceError, ConfigError, Directory, DirectoryState,
    LineIndex, LineState, NodeCache, NodeId, Protocol, SystemConfig,
};

/// Memory operation requested by a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Read the block containing the address.
    Read,
    /// Replace the whole block containing the address with the payload.
    Write(Block),
}

impl Operation {
    /// Returns the write payload, if any.
    #[must_use]
    pub const fn payload(&self) -> Option<Block> {
        match self {
            Self::Read => None,
            Self::Write(payload) => Some(*payload),
        }
    }

    /// Returns `true` for writes.
    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self, Self::Write(_))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write(_) => f.write_str("write"),
        }
    }
}

/// One validated request entering the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Request {
    /// Node issuing the request.
    pub requester: NodeId,
    /// Target address.
    pub address: Address,
    /// Requested operation, carrying the payload for writes.
    pub operation: Operation,
}

impl Request {
    /// Builds a read request.
    #[must_use]
    pub const fn read(requester: NodeId, address: Address) -> Self {
        Self {
            requester,
            address,
            operation: Operation::Read,
        }
    }

    /// Builds a write request.
    #[must_use]
    pub const fn write(requester: NodeId, address: Address, payload: Block) -> Self {
        Self {
            requester,
            address,
            operation: Operation::Write(payload),
        }
    }
}

/// Memory a write-back or fill talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Store {
    /// Private memory of a home node (directory protocol).
    Private(NodeId),
    /// The single shared main memory (snoop protocol).
    Main,
}

impl fmt::Display for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Private(node) => write!(f, "private memory of {node}"),
            Self::Main => f.write_str("main memory"),
        }
    }
}

/// One protocol action taken while serving a request, in execution order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Step {
    /// Requester found the block in its own cache.
    Hit {
        /// Requesting node.
        node: NodeId,
        /// Block served.
        block: BlockAddress,
        /// State of the hitting line.
        state: LineState,
    },
    /// A valid line was displaced to make room.
    Evict {
        /// Node losing the line.
        node: NodeId,
        /// Block that was resident.
        block: BlockAddress,
        /// State of the displaced line.
        state: LineState,
    },
    /// Dirty data was copied to memory.
    WriteBack {
        /// Node whose line was flushed.
        node: NodeId,
        /// Block written.
        block: BlockAddress,
        /// Destination memory.
        store: Store,
    },
    /// Block was loaded from memory.
    FillFromMemory {
        /// Node receiving the block.
        node: NodeId,
        /// Block loaded.
        block: BlockAddress,
        /// Source memory.
        store: Store,
    },
    /// Block was copied from another cache.
    FillFromPeer {
        /// Node receiving the block.
        node: NodeId,
        /// Block copied.
        block: BlockAddress,
        /// Node supplying the data.
        peer: NodeId,
    },
    /// A modified copy was demoted to shared.
    Downgrade {
        /// Node whose line was demoted.
        node: NodeId,
        /// Block affected.
        block: BlockAddress,
    },
    /// A copy was invalidated.
    Invalidate {
        /// Node whose line was invalidated.
        node: NodeId,
        /// Block affected.
        block: BlockAddress,
    },
    /// Requester stored the payload and now owns the block.
    LocalWrite {
        /// Writing node.
        node: NodeId,
        /// Block written.
        block: BlockAddress,
    },
    /// A home directory entry changed.
    DirectoryUpdate {
        /// Home node keeping the directory.
        home: NodeId,
        /// Block tracked.
        block: BlockAddress,
        /// New directory state.
        state: DirectoryState,
        /// New sharer set in node order.
        sharers: Vec<NodeId>,
    },
    /// A home directory entry was deleted.
    DirectoryRemove {
        /// Home node keeping the directory.
        home: NodeId,
        /// Block no longer tracked.
        block: BlockAddress,
    },
}

impl Step {
    /// Node other than `requester` this step involved, if any.
    const fn participant(&self, requester: NodeId) -> Option<NodeId> {
        let node = match self {
            Self::FillFromPeer { peer, .. } => *peer,
            Self::Downgrade { node, .. }
            | Self::Invalidate { node, .. }
            | Self::WriteBack { node, .. } => *node,
            Self::Hit { .. }
            | Self::Evict { .. }
            | Self::FillFromMemory { .. }
            | Self::LocalWrite { .. }
            | Self::DirectoryUpdate { .. }
            | Self::DirectoryRemove { .. } => return None,
        };
        if node.raw() == requester.raw() {
            None
        } else {
            Some(node)
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hit { node, block, state } => {
                write!(f, "{node} hits {block} in its cache ({state})")
            }
            Self::Evict { node, block, state } => {
                write!(f, "{node} evicts {block} ({state}) from line {}", block.index())
            }
            Self::WriteBack { node, block, store } => {
                write!(f, "{node} writes {block} back to {store}")
            }
            Self::FillFromMemory { node, block, store } => {
                write!(f, "{node} loads {block} from {store}")
            }
            Self::FillFromPeer { node, block, peer } => {
                write!(f, "{node} copies {block} from {peer}")
            }
            Self::Downgrade { node, block } => write!(f, "{node} downgrades {block} from M to S"),
            Self::Invalidate { node, block } => write!(f, "{node} invalidates its copy of {block}"),
            Self::LocalWrite { node, block } => write!(f, "{node} writes {block}, line now M"),
            Self::DirectoryUpdate {
                home,
                block,
                state,
                sharers,
            } => write!(
                f,
                "directory of {home}: {block} -> {state} {}",
                format_nodes(sharers)
            ),
            Self::DirectoryRemove { home, block } => {
                write!(f, "directory of {home}: entry for {block} removed")
            }
        }
    }
}

/// Result record of one executed request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestOutcome {
    /// Whether the requester's cache already held the block.
    pub hit: bool,
    /// Home node of the block (directory protocol only).
    pub home: Option<NodeId>,
    /// Other nodes whose caches supplied data, were downgraded or invalidated.
    pub participants: Vec<NodeId>,
    /// Protocol actions in execution order.
    pub steps: Vec<Step>,
    /// Block held by the requester's line once the request completed.
    pub data: Block,
}

impl RequestOutcome {
    /// Renders the steps as human-readable narrative lines.
    #[must_use]
    pub fn narrative(&self) -> Vec<String> {
        self.steps.iter().map(ToString::to_string).collect()
    }
}

/// Collects the steps of one request while it executes.
#[derive(Debug)]
pub(crate) struct Trail {
    requester: NodeId,
    steps: Vec<Step>,
}

impl Trail {
    pub(crate) const fn new(requester: NodeId) -> Self {
        Self {
            requester,
            steps: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, step: Step) {
        log::trace!("{step}");
        self.steps.push(step);
    }

    pub(crate) fn finish(self, hit: bool, home: Option<NodeId>, data: Block) -> RequestOutcome {
        let mut participants: Vec<NodeId> = self
            .steps
            .iter()
            .filter_map(|step| step.participant(self.requester))
            .collect();
        participants.sort_unstable();
        participants.dedup();

        RequestOutcome {
            hit,
            home,
            participants,
            steps: self.steps,
            data,
        }
    }
}

/// Behaviour shared by both protocol engines.
pub trait CoherenceEngine {
    /// Protocol family implemented by this engine.
    fn protocol(&self) -> Protocol;

    /// All node caches, indexed by node id.
    fn caches(&self) -> &[NodeCache];

    /// Per-home-node directories, or `None` for protocols without one.
    fn directories(&self) -> Option<&[Directory]>;

    /// Current backing-store contents of `block`, without populating it.
    fn backing_block(&self, block: BlockAddress) -> Block;

    /// Serves one request end to end.
    ///
    /// # Errors
    ///
    /// Returns [`CoherenceError::UnknownNode`] when the requester is not part
    /// of the system; no state is modified in that case.
    fn execute(&mut self, request: &Request) -> Result<RequestOutcome, CoherenceError>;

    /// Flushes every dirty line to its backing store, then empties all caches
    /// and directories. Backing stores keep their contents.
    fn reset(&mut self);

    /// Number of nodes in the system.
    fn node_count(&self) -> usize {
        self.caches().len()
    }

    /// Returns the cache of `node`.
    ///
    /// # Errors
    ///
    /// Returns [`CoherenceError::UnknownNode`] for nodes outside the system.
    fn cache(&self, node: NodeId) -> Result<&NodeCache, CoherenceError> {
        self.caches()
            .get(node.index())
            .ok_or(CoherenceError::UnknownNode {
                node,
                node_count: self.node_count(),
            })
    }

    /// Read-only view of every line in `node`'s cache.
    ///
    /// # Errors
    ///
    /// Returns [`CoherenceError::UnknownNode`] for nodes outside the system.
    fn cache_snapshot(&self, node: NodeId) -> Result<Vec<CacheLineView>, CoherenceError> {
        Ok(self
            .cache(node)?
            .iter()
            .map(|(index, line)| CacheLineView::new(index, line))
            .collect())
    }

    /// Read-only view of `node`'s directory, or `None` without directories.
    ///
    /// # Errors
    ///
    /// Returns [`CoherenceError::UnknownNode`] for nodes outside the system.
    fn directory_snapshot(
        &self,
        node: NodeId,
    ) -> Result<Option<Vec<DirectoryRow>>, CoherenceError> {
        self.cache(node)?;
        Ok(self
            .directories()
            .and_then(|directories| directories.get(node.index()))
            .map(directory_rows))
    }

    /// Full read-only view of every node.
    fn snapshot(&self) -> SystemSnapshot {
        let nodes = self
            .caches()
            .iter()
            .map(|cache| {
                let lines = cache
                    .iter()
                    .map(|(index, line)| CacheLineView::new(index, line))
                    .collect();
                let directory = self
                    .directories()
                    .and_then(|directories| directories.get(cache.node().index()))
                    .map(directory_rows);
                NodeSnapshot {
                    node: cache.node(),
                    lines,
                    directory,
                }
            })
            .collect();

        SystemSnapshot {
            protocol: self.protocol(),
            nodes,
        }
    }
}

/// Engine for either protocol, selected at run time from a [`SystemConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Engine {
    /// Directory protocol engine.
    Directory(DirectoryEngine),
    /// Snoop protocol engine.
    Snoop(SnoopEngine),
}

impl Engine {
    /// Builds the engine selected by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `config` does not validate.
    pub fn with_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(match config.protocol {
            Protocol::Directory => Self::Directory(DirectoryEngine::with_config(config)?),
            Protocol::Snoop => Self::Snoop(SnoopEngine::with_config(config)?),
        })
    }
}

impl CoherenceEngine for Engine {
    fn protocol(&self) -> Protocol {
        match self {
            Self::Directory(engine) => engine.protocol(),
            Self::Snoop(engine) => engine.protocol(),
        }
    }

    fn caches(&self) -> &[NodeCache] {
        match self {
            Self::Directory(engine) => engine.caches(),
            Self::Snoop(engine) => engine.caches(),
        }
    }

    fn directories(&self) -> Option<&[Directory]> {
        match self {
            Self::Directory(engine) => engine.directories(),
            Self::Snoop(engine) => engine.directories(),
        }
    }

    fn backing_block(&self, block: BlockAddress) -> Block {
        match self {
            Self::Directory(engine) => engine.backing_block(block),
            Self::Snoop(engine) => engine.backing_block(block),
        }
    }

    fn execute(&mut self, request: &Request) -> Result<RequestOutcome, CoherenceError> {
        match self {
            Self::Directory(engine) => engine.execute(request),
            Self::Snoop(engine) => engine.execute(request),
        }
    }

    fn reset(&mut self) {
        match self {
            Self::Directory(engine) => engine.reset(),
            Self::Snoop(engine) => engine.reset(),
        }
    }
}

fn directory_rows(directory: &Directory) -> Vec<DirectoryRow> {
    directory
        .iter()
        .map(|(block, entry)| DirectoryRow::new(block, entry))
        .collect()
}

/// Line `index` of every node except `requester`, with its node id.
pub(crate) fn peers(
    caches: &[NodeCache],
    requester: NodeId,
    index: LineIndex,
) -> impl Iterator<Item = (NodeId, &CacheLine)> {
    caches
        .iter()
        .filter(move |cache| cache.node() != requester)
        .map(move |cache| (cache.node(), cache.line(index)))
}

#[cfg(test)]
mod tests {
    use super::{Engine, Operation, Request, Step, Store};
    use crate::{
        Address, Block, CoherenceEngine, DirectoryState, LineState, NodeId, Protocol,
        SystemConfig,
    };

    fn address(raw: u32) -> Address {
        Address::new(raw).expect("24-bit address")
    }

    #[test]
    fn write_requests_carry_their_payload() {
        let request = Request::write(NodeId::new(1), address(0x10), Block::splat(9));
        assert_eq!(request.operation.payload(), Some(Block::splat(9)));
        assert!(request.operation.is_write());
        assert_eq!(Operation::Read.payload(), None);
        assert_eq!(request.operation.to_string(), "write");
    }

    #[test]
    fn step_narratives_name_nodes_and_blocks() {
        let block = address(0x01_00_00).block();
        let steps = [
            Step::FillFromMemory {
                node: NodeId::new(1),
                block,
                store: Store::Private(NodeId::new(0)),
            },
            Step::DirectoryUpdate {
                home: NodeId::new(0),
                block,
                state: DirectoryState::Shared,
                sharers: vec![NodeId::new(1), NodeId::new(2)],
            },
            Step::Evict {
                node: NodeId::new(3),
                block,
                state: LineState::Modified,
            },
            Step::WriteBack {
                node: NodeId::new(3),
                block,
                store: Store::Main,
            },
        ];
        let rendered: Vec<String> = steps.iter().map(ToString::to_string).collect();

        assert_eq!(
            rendered,
            [
                "CPU01 loads 0x010000 from private memory of CPU00",
                "directory of CPU00: 0x010000 -> S {CPU01, CPU10}",
                "CPU11 evicts 0x010000 (M) from line 0",
                "CPU11 writes 0x010000 back to main memory",
            ]
        );
    }

    #[test]
    fn engine_follows_configured_protocol() {
        let directory = Engine::with_config(&SystemConfig::default()).expect("valid config");
        assert_eq!(directory.protocol(), Protocol::Directory);
        assert!(directory.directories().is_some());

        let snoop = Engine::with_config(&SystemConfig::for_protocol(Protocol::Snoop))
            .expect("valid config");
        assert_eq!(snoop.protocol(), Protocol::Snoop);
        assert!(snoop.directories().is_none());
        assert_eq!(snoop.node_count(), 4);
    }

    #[test]
    fn snapshots_reject_unknown_nodes() {
        let engine = Engine::with_config(&SystemConfig::default()).expect("valid config");
        assert!(engine.cache_snapshot(NodeId::new(4)).is_err());
        assert!(engine.directory_snapshot(NodeId::new(9)).is_err());
        assert_eq!(
            engine
                .cache_snapshot(NodeId::new(0))
                .expect("known node")
                .len(),
            16
        );
    }
}
