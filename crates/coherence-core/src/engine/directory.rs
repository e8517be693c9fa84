//! Directory protocol engine.
//!
//! Every block has a home node chosen by address interleaving. The home node
//! keeps the block in its private memory and records in its directory which
//! nodes cache it. Transitions are keyed by the requested operation, the
//! requester's hit/miss status and the directory state of the block:
//!
//! | operation | lookup | directory  | action                                              |
//! |-----------|--------|------------|-----------------------------------------------------|
//! | read      | hit    | any        | none                                                |
//! | read      | miss   | uncached   | load from home memory, `S {requester}`              |
//! | read      | miss   | shared     | copy from a sharer, add requester                   |
//! | read      | miss   | exclusive  | copy from owner, owner written back and set to `S`  |
//! | write     | any    | uncached   | load (miss), write, `E {requester}`                 |
//! | write     | any    | shared     | copy (miss), invalidate other sharers, write, `E`   |
//! | write     | miss   | exclusive  | owner written back and invalidated, copy, write     |
//! | write     | hit    | exclusive  | write in place                                      |
//!
//! Misses first evict whatever valid block occupies the destination line.

use crate::address::home_node;
use crate::error::check_node;
use crate::{
    Address, BackingStore, Block, BlockAddress, CoherenceError, ConfigError, Directory,
    DirectoryState, LineIndex, LineState, NodeCache, NodeId, Protocol, SystemConfig,
    DEFAULT_NODE_COUNT,
};

use super::{CoherenceEngine, Operation, Request, RequestOutcome, Step, Store, Trail};

/// Directory protocol state: one cache, private memory and directory per node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEngine {
    caches: Vec<NodeCache>,
    memories: Vec<BackingStore>,
    directories: Vec<Directory>,
}

impl Default for DirectoryEngine {
    fn default() -> Self {
        Self::build(DEFAULT_NODE_COUNT)
    }
}

impl DirectoryEngine {
    /// Creates an engine for `config.node_count` nodes.
    ///
    /// The protocol field of `config` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the node count is out of range or not a
    /// power of two, or the history capacity is zero.
    pub fn with_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        let config = SystemConfig {
            protocol: Protocol::Directory,
            ..*config
        };
        config.validate()?;
        Ok(Self::build(config.node_count))
    }

    fn build(node_count: usize) -> Self {
        Self {
            caches: NodeId::all(node_count).map(NodeCache::new).collect(),
            memories: (0..node_count).map(|_| BackingStore::new()).collect(),
            directories: (0..node_count).map(|_| Directory::new()).collect(),
        }
    }

    /// Returns the home node owning `block`.
    #[must_use]
    pub fn home_of(&self, block: BlockAddress) -> NodeId {
        home_node(block.address(), self.caches.len())
    }

    /// Returns the private memory of `node`.
    #[must_use]
    pub fn memory(&self, node: NodeId) -> Option<&BackingStore> {
        self.memories.get(node.index())
    }

    /// Returns the directory kept by `node`.
    #[must_use]
    pub fn directory(&self, node: NodeId) -> Option<&Directory> {
        self.directories.get(node.index())
    }

    fn record_entry(&self, home: NodeId, block: BlockAddress, trail: &mut Trail) {
        if let Some(entry) = self.directories[home.index()].get(block) {
            trail.push(Step::DirectoryUpdate {
                home,
                block,
                state: entry.state(),
                sharers: entry.sharers().iter().copied().collect(),
            });
        }
    }

    fn fill_from_memory(
        &mut self,
        requester: NodeId,
        address: Address,
        home: NodeId,
        trail: &mut Trail,
    ) {
        let block = address.block();
        let data = self.memories[home.index()].load(block);
        self.caches[requester.index()]
            .line_mut(address.index())
            .fill_shared(address.tag(), data);
        trail.push(Step::FillFromMemory {
            node: requester,
            block,
            store: Store::Private(home),
        });
    }

    fn fill_from_peer(
        &mut self,
        requester: NodeId,
        address: Address,
        peer: NodeId,
        data: Block,
        trail: &mut Trail,
    ) {
        self.caches[requester.index()]
            .line_mut(address.index())
            .fill_shared(address.tag(), data);
        trail.push(Step::FillFromPeer {
            node: requester,
            block: address.block(),
            peer,
        });
    }

    /// Flushes `owner`'s copy of `block` to home memory if it is dirty.
    fn write_back(
        &mut self,
        owner: NodeId,
        block: BlockAddress,
        home: NodeId,
        trail: &mut Trail,
    ) -> Block {
        let line = *self.caches[owner.index()].line(block.index());
        if line.needs_write_back() {
            self.memories[home.index()].store(block, *line.data());
            trail.push(Step::WriteBack {
                node: owner,
                block,
                store: Store::Private(home),
            });
        }
        *line.data()
    }

    /// Vacates line `index` of `node`, keeping the victim's home directory
    /// and memory consistent.
    fn evict(&mut self, node: NodeId, index: LineIndex, trail: &mut Trail) {
        let line = *self.caches[node.index()].line(index);
        let Some(victim) = line.resident_block(index) else {
            return;
        };
        let home = self.home_of(victim);
        trail.push(Step::Evict {
            node,
            block: victim,
            state: line.state(),
        });

        match line.state() {
            LineState::Shared => {
                if self.directories[home.index()].release(victim, node) {
                    trail.push(Step::DirectoryRemove {
                        home,
                        block: victim,
                    });
                } else {
                    self.record_entry(home, victim, trail);
                }
            }
            LineState::Modified => {
                self.write_back(node, victim, home, trail);
                if self.directories[home.index()].remove(victim).is_some() {
                    trail.push(Step::DirectoryRemove {
                        home,
                        block: victim,
                    });
                }
            }
            LineState::Invalid => {}
        }

        self.caches[node.index()].line_mut(index).invalidate();
    }

    fn read_miss(&mut self, requester: NodeId, address: Address, home: NodeId, trail: &mut Trail) {
        let block = address.block();
        let index = address.index();
        let entry = self.directories[home.index()].entry_for(block);
        let state = entry.state();
        let source = entry.sharer_other_than(requester);

        match (state, source) {
            (DirectoryState::Uncached, _) | (_, None) => {
                self.fill_from_memory(requester, address, home, trail);
            }
            (DirectoryState::Shared, Some(peer)) => {
                let data = *self.caches[peer.index()].line(index).data();
                self.fill_from_peer(requester, address, peer, data, trail);
            }
            (DirectoryState::Exclusive, Some(owner)) => {
                let data = *self.caches[owner.index()].line(index).data();
                self.fill_from_peer(requester, address, owner, data, trail);
                self.write_back(owner, block, home, trail);
                self.caches[owner.index()].line_mut(index).downgrade();
                trail.push(Step::Downgrade { node: owner, block });
            }
        }

        self.directories[home.index()]
            .entry_for(block)
            .share_with(requester);
        self.record_entry(home, block, trail);
    }

    fn write(
        &mut self,
        requester: NodeId,
        address: Address,
        payload: Block,
        hit: bool,
        home: NodeId,
        trail: &mut Trail,
    ) {
        let block = address.block();
        let index = address.index();
        let entry = self.directories[home.index()].entry_for(block);
        let state = entry.state();
        let others: Vec<NodeId> = entry
            .sharers()
            .iter()
            .copied()
            .filter(|node| *node != requester)
            .collect();

        match state {
            DirectoryState::Uncached => {
                if !hit {
                    self.fill_from_memory(requester, address, home, trail);
                }
            }
            DirectoryState::Shared => {
                if !hit {
                    if let Some(&peer) = others.first() {
                        let data = *self.caches[peer.index()].line(index).data();
                        self.fill_from_peer(requester, address, peer, data, trail);
                    } else {
                        self.fill_from_memory(requester, address, home, trail);
                    }
                }
                // Shared copies are clean; no write-back before invalidating.
                for &peer in &others {
                    self.caches[peer.index()].line_mut(index).invalidate();
                    trail.push(Step::Invalidate { node: peer, block });
                }
            }
            DirectoryState::Exclusive => {
                if let Some(&owner) = others.first() {
                    let data = self.write_back(owner, block, home, trail);
                    if !hit {
                        self.fill_from_peer(requester, address, owner, data, trail);
                    }
                    self.caches[owner.index()].line_mut(index).invalidate();
                    trail.push(Step::Invalidate { node: owner, block });
                } else if !hit {
                    self.fill_from_memory(requester, address, home, trail);
                }
            }
        }

        self.caches[requester.index()]
            .line_mut(index)
            .write(address.tag(), payload);
        trail.push(Step::LocalWrite {
            node: requester,
            block,
        });
        self.directories[home.index()]
            .entry_for(block)
            .grant_exclusive(requester);
        self.record_entry(home, block, trail);
    }
}

impl CoherenceEngine for DirectoryEngine {
    fn protocol(&self) -> Protocol {
        Protocol::Directory
    }

    fn caches(&self) -> &[NodeCache] {
        &self.caches
    }

    fn directories(&self) -> Option<&[Directory]> {
        Some(&self.directories)
    }

    fn backing_block(&self, block: BlockAddress) -> Block {
        self.memories[self.home_of(block).index()].peek(block)
    }

    fn execute(&mut self, request: &Request) -> Result<RequestOutcome, CoherenceError> {
        let requester = request.requester;
        check_node(requester, self.caches.len())?;

        let address = request.address;
        let block = address.block();
        let index = address.index();
        let home = self.home_of(block);
        let hit = self.caches[requester.index()].lookup(address).is_hit();
        let mut trail = Trail::new(requester);

        if hit {
            trail.push(Step::Hit {
                node: requester,
                block,
                state: self.caches[requester.index()].line(index).state(),
            });
        } else {
            self.evict(requester, index, &mut trail);
        }

        match request.operation {
            Operation::Read => {
                if !hit {
                    self.read_miss(requester, address, home, &mut trail);
                }
            }
            Operation::Write(payload) => {
                self.write(requester, address, payload, hit, home, &mut trail);
            }
        }

        log::debug!(
            "directory: {requester} {} {address} {} (home {home})",
            request.operation,
            if hit { "hit" } else { "miss" }
        );
        let data = *self.caches[requester.index()].line(index).data();
        Ok(trail.finish(hit, Some(home), data))
    }

    fn reset(&mut self) {
        let node_count = self.caches.len();
        let mut flushed = 0_usize;
        for cache in &mut self.caches {
            for (index, line) in cache.iter() {
                if !line.needs_write_back() {
                    continue;
                }
                if let Some(block) = line.resident_block(index) {
                    let home = home_node(block.address(), node_count);
                    self.memories[home.index()].store(block, *line.data());
                    log::trace!("reset: {} flushes {block} to {home}", cache.node());
                    flushed += 1;
                }
            }
            cache.clear();
        }
        for directory in &mut self.directories {
            directory.clear();
        }
        log::info!("directory system reset, {flushed} dirty lines flushed");
    }
}

#[cfg(test)]
mod tests {
    use super::DirectoryEngine;
    use crate::engine::{Request, Step, Store};
    use crate::{
        Address, Block, CoherenceEngine, CoherenceError, DirectoryState, LineState, NodeId,
    };

    const CPU00: NodeId = NodeId::new(0);
    const CPU01: NodeId = NodeId::new(1);
    const CPU10: NodeId = NodeId::new(2);
    const CPU11: NodeId = NodeId::new(3);

    fn address(raw: u32) -> Address {
        Address::new(raw).expect("24-bit address")
    }

    fn state_of(engine: &DirectoryEngine, node: NodeId, at: Address) -> LineState {
        engine
            .cache(node)
            .expect("known node")
            .line(at.index())
            .state()
    }

    #[test]
    fn read_miss_on_uncached_block_loads_from_home_memory() {
        let mut engine = DirectoryEngine::default();
        let target = address(0x01_00_00);

        let outcome = engine
            .execute(&Request::read(CPU01, target))
            .expect("valid request");

        assert!(!outcome.hit);
        assert_eq!(outcome.home, Some(CPU00));
        assert_eq!(outcome.data, Block::ZERO);
        assert_eq!(
            outcome.steps[0],
            Step::FillFromMemory {
                node: CPU01,
                block: target.block(),
                store: Store::Private(CPU00),
            }
        );
        assert_eq!(state_of(&engine, CPU01, target), LineState::Shared);

        let entry = engine
            .directory(CPU00)
            .and_then(|directory| directory.get(target.block()))
            .expect("entry created");
        assert_eq!(entry.state(), DirectoryState::Shared);
        assert_eq!(entry.sharers().iter().copied().collect::<Vec<_>>(), [CPU01]);
    }

    #[test]
    fn read_hit_changes_nothing() {
        let mut engine = DirectoryEngine::default();
        let target = address(0x01_00_00);
        engine
            .execute(&Request::read(CPU01, target))
            .expect("valid request");
        let before = engine.clone();

        let outcome = engine
            .execute(&Request::read(CPU01, target))
            .expect("valid request");

        assert!(outcome.hit);
        assert_eq!(outcome.steps.len(), 1);
        assert_eq!(engine, before);
    }

    #[test]
    fn read_from_exclusive_owner_writes_back_and_downgrades() {
        let mut engine = DirectoryEngine::default();
        let target = address(0x40_01_20);
        let home = engine.home_of(target.block());
        assert_eq!(home, CPU01);

        engine
            .execute(&Request::write(CPU11, target, Block::splat(0x5A)))
            .expect("valid request");
        let outcome = engine
            .execute(&Request::read(CPU00, target))
            .expect("valid request");

        assert_eq!(outcome.data, Block::splat(0x5A));
        assert_eq!(outcome.participants, [CPU11]);
        assert_eq!(state_of(&engine, CPU11, target), LineState::Shared);
        assert_eq!(state_of(&engine, CPU00, target), LineState::Shared);
        assert_eq!(engine.backing_block(target.block()), Block::splat(0x5A));
        assert!(outcome.steps.contains(&Step::Downgrade {
            node: CPU11,
            block: target.block()
        }));

        let entry = engine
            .directory(home)
            .and_then(|directory| directory.get(target.block()))
            .expect("entry kept");
        assert_eq!(entry.state(), DirectoryState::Shared);
        assert_eq!(entry.sharers().len(), 2);
    }

    #[test]
    fn write_miss_on_exclusive_block_transfers_ownership() {
        let mut engine = DirectoryEngine::default();
        let target = address(0x80_00_50);

        engine
            .execute(&Request::write(CPU00, target, Block::splat(1)))
            .expect("valid request");
        let outcome = engine
            .execute(&Request::write(CPU01, target, Block::splat(2)))
            .expect("valid request");

        assert!(!outcome.hit);
        assert_eq!(outcome.data, Block::splat(2));
        assert_eq!(state_of(&engine, CPU00, target), LineState::Invalid);
        assert_eq!(state_of(&engine, CPU01, target), LineState::Modified);
        assert_eq!(engine.backing_block(target.block()), Block::splat(1));

        let entry = engine
            .directory(CPU10)
            .and_then(|directory| directory.get(target.block()))
            .expect("entry kept");
        assert_eq!(entry.exclusive_owner(), Some(CPU01));
    }

    #[test]
    fn write_hit_while_exclusive_updates_in_place() {
        let mut engine = DirectoryEngine::default();
        let target = address(0x00_00_A0);
        engine
            .execute(&Request::write(CPU10, target, Block::splat(3)))
            .expect("valid request");

        let outcome = engine
            .execute(&Request::write(CPU10, target, Block::splat(4)))
            .expect("valid request");

        assert!(outcome.hit);
        assert!(outcome.participants.is_empty());
        assert_eq!(outcome.data, Block::splat(4));
        assert_eq!(engine.backing_block(target.block()), Block::ZERO);
        let line = *engine.cache(CPU10).expect("known node").line(target.index());
        assert!(line.is_dirty());
        assert_eq!(line.state(), LineState::Modified);
    }

    #[test]
    fn evicting_modified_line_writes_back_and_drops_entry() {
        let mut engine = DirectoryEngine::default();
        let first = address(0x01_00_30);
        let conflicting = address(0x02_00_30);
        assert_eq!(first.index(), conflicting.index());

        engine
            .execute(&Request::write(CPU01, first, Block::splat(0xEE)))
            .expect("valid request");
        let outcome = engine
            .execute(&Request::read(CPU01, conflicting))
            .expect("valid request");

        assert_eq!(
            outcome.steps[0],
            Step::Evict {
                node: CPU01,
                block: first.block(),
                state: LineState::Modified,
            }
        );
        assert_eq!(engine.backing_block(first.block()), Block::splat(0xEE));
        assert!(engine
            .directory(CPU00)
            .and_then(|directory| directory.get(first.block()))
            .is_none());
    }

    #[test]
    fn evicting_one_of_several_sharers_keeps_entry() {
        let mut engine = DirectoryEngine::default();
        let first = address(0x01_00_30);
        let conflicting = address(0x02_00_30);

        engine
            .execute(&Request::read(CPU01, first))
            .expect("valid request");
        engine
            .execute(&Request::read(CPU10, first))
            .expect("valid request");
        engine
            .execute(&Request::read(CPU01, conflicting))
            .expect("valid request");

        let entry = engine
            .directory(CPU00)
            .and_then(|directory| directory.get(first.block()))
            .expect("entry kept for remaining sharer");
        assert_eq!(entry.state(), DirectoryState::Shared);
        assert_eq!(entry.sharers().iter().copied().collect::<Vec<_>>(), [CPU10]);
    }

    #[test]
    fn unknown_requester_is_rejected_without_mutation() {
        let mut engine = DirectoryEngine::default();
        let before = engine.clone();

        let err = engine
            .execute(&Request::read(NodeId::new(7), address(0x00_00_00)))
            .expect_err("node 7 is outside a four-node system");

        assert!(matches!(err, CoherenceError::UnknownNode { .. }));
        assert_eq!(engine, before);
    }

    #[test]
    fn reset_flushes_dirty_lines_then_clears() {
        let mut engine = DirectoryEngine::default();
        let target = address(0xC1_23_40);
        engine
            .execute(&Request::write(CPU00, target, Block::splat(0x77)))
            .expect("valid request");

        engine.reset();

        assert_eq!(engine.backing_block(target.block()), Block::splat(0x77));
        assert!(engine
            .caches()
            .iter()
            .all(|cache| cache.valid_lines() == 0));
        assert!(engine
            .directories()
            .is_some_and(|directories| directories.iter().all(crate::Directory::is_empty)));
    }
}
