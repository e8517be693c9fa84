//! Broadcast/snoop protocol engine.
//!
//! There is no directory. A miss inspects the same line of every other node
//! for the requested tag; a write broadcasts an invalidation to all of them.
//! All nodes share one main memory.

use crate::error::check_node;
use crate::{
    Address, BackingStore, Block, BlockAddress, CoherenceError, ConfigError, Directory,
    LineState, NodeCache, NodeId, Protocol, SystemConfig, DEFAULT_NODE_COUNT,
};

use super::{peers, CoherenceEngine, Operation, Request, RequestOutcome, Step, Store, Trail};

/// Snoop protocol state: one cache per node over a single main memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnoopEngine {
    caches: Vec<NodeCache>,
    memory: BackingStore,
}

impl Default for SnoopEngine {
    fn default() -> Self {
        Self::build(DEFAULT_NODE_COUNT)
    }
}

impl SnoopEngine {
    /// Creates an engine for `config.node_count` nodes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the node count is out of range or the
    /// history capacity is zero.
    pub fn with_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        let config = SystemConfig {
            protocol: Protocol::Snoop,
            ..*config
        };
        config.validate()?;
        Ok(Self::build(config.node_count))
    }

    fn build(node_count: usize) -> Self {
        Self {
            caches: NodeId::all(node_count).map(NodeCache::new).collect(),
            memory: BackingStore::new(),
        }
    }

    /// Returns the shared main memory.
    #[must_use]
    pub const fn memory(&self) -> &BackingStore {
        &self.memory
    }

    #[cfg(test)]
    pub(crate) fn cache_mut(&mut self, node: NodeId) -> &mut NodeCache {
        &mut self.caches[node.index()]
    }

    /// Brings the block at `address` into `requester`'s cache as Shared.
    fn load_on_miss(&mut self, requester: NodeId, address: Address, trail: &mut Trail) {
        let block = address.block();
        let index = address.index();
        let tag = address.tag();

        let resident = *self.caches[requester.index()].line(index);
        if let Some(victim) = resident.resident_block(index) {
            trail.push(Step::Evict {
                node: requester,
                block: victim,
                state: resident.state(),
            });
            if resident.needs_write_back() {
                self.memory.store(victim, *resident.data());
                trail.push(Step::WriteBack {
                    node: requester,
                    block: victim,
                    store: Store::Main,
                });
            }
        }

        let supplier = peers(&self.caches, requester, index)
            .find(|(_, line)| line.holds(tag))
            .map(|(peer, line)| (peer, *line));

        let data = match supplier {
            Some((peer, line)) => {
                if line.state() == LineState::Modified {
                    if line.needs_write_back() {
                        self.memory.store(block, *line.data());
                        trail.push(Step::WriteBack {
                            node: peer,
                            block,
                            store: Store::Main,
                        });
                    }
                    self.caches[peer.index()].line_mut(index).downgrade();
                    trail.push(Step::Downgrade { node: peer, block });
                }
                trail.push(Step::FillFromPeer {
                    node: requester,
                    block,
                    peer,
                });
                *line.data()
            }
            None => {
                trail.push(Step::FillFromMemory {
                    node: requester,
                    block,
                    store: Store::Main,
                });
                self.memory.load(block)
            }
        };

        self.caches[requester.index()]
            .line_mut(index)
            .fill_shared(tag, data);
    }

    /// Stores `payload` locally, then invalidates every other copy.
    ///
    /// Runs after the miss load, so a peer that just supplied the data is
    /// invalidated in the same request.
    fn complete_write(
        &mut self,
        requester: NodeId,
        address: Address,
        payload: Block,
        trail: &mut Trail,
    ) {
        let block = address.block();
        let index = address.index();
        let tag = address.tag();

        self.caches[requester.index()]
            .line_mut(index)
            .write(tag, payload);
        trail.push(Step::LocalWrite {
            node: requester,
            block,
        });

        for cache in &mut self.caches {
            let node = cache.node();
            if node == requester {
                continue;
            }
            let line = cache.line_mut(index);
            if line.holds(tag) {
                line.invalidate();
                trail.push(Step::Invalidate { node, block });
            }
        }
    }
}

impl CoherenceEngine for SnoopEngine {
    fn protocol(&self) -> Protocol {
        Protocol::Snoop
    }

    fn caches(&self) -> &[NodeCache] {
        &self.caches
    }

    fn directories(&self) -> Option<&[Directory]> {
        None
    }

    fn backing_block(&self, block: BlockAddress) -> Block {
        self.memory.peek(block)
    }

    fn execute(&mut self, request: &Request) -> Result<RequestOutcome, CoherenceError> {
        let requester = request.requester;
        check_node(requester, self.caches.len())?;

        let address = request.address;
        let index = address.index();
        let hit = self.caches[requester.index()].lookup(address).is_hit();
        let mut trail = Trail::new(requester);

        if hit {
            trail.push(Step::Hit {
                node: requester,
                block: address.block(),
                state: self.caches[requester.index()].line(index).state(),
            });
        } else {
            self.load_on_miss(requester, address, &mut trail);
        }

        if let Operation::Write(payload) = request.operation {
            self.complete_write(requester, address, payload, &mut trail);
        }

        log::debug!(
            "snoop: {requester} {} {address} {}",
            request.operation,
            if hit { "hit" } else { "miss" }
        );
        let data = *self.caches[requester.index()].line(index).data();
        Ok(trail.finish(hit, None, data))
    }

    fn reset(&mut self) {
        let mut flushed = 0_usize;
        for cache in &mut self.caches {
            for (index, line) in cache.iter() {
                if !line.needs_write_back() {
                    continue;
                }
                if let Some(block) = line.resident_block(index) {
                    self.memory.store(block, *line.data());
                    log::trace!("reset: {} flushes {block} to main memory", cache.node());
                    flushed += 1;
                }
            }
            cache.clear();
        }
        log::info!("snoop system reset, {flushed} dirty lines flushed");
    }
}
