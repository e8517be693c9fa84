//! Whole-system coherence checks.
//!
//! [`check`] inspects every cache (and every directory, when the protocol has
//! them) and reports the first broken rule. Tests, property tests and the
//! fuzz harness call it after each request.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::address::home_node;
use crate::node::format_nodes;
use crate::{
    BlockAddress, CoherenceEngine, Directory, DirectoryEntry, DirectoryState, LineIndex,
    LineState, NodeId,
};

/// A coherence rule that does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    /// A line is dirty without being modified.
    #[error("{node} line {index} is dirty but {state}")]
    DirtyNotModified {
        /// Node holding the line.
        node: NodeId,
        /// Offending slot.
        index: LineIndex,
        /// State found.
        state: LineState,
    },
    /// Two nodes hold the same block modified.
    #[error("{block} is modified in both {first} and {second}")]
    MultipleWriters {
        /// Affected block.
        block: BlockAddress,
        /// Lower-numbered writer.
        first: NodeId,
        /// Higher-numbered writer.
        second: NodeId,
    },
    /// A modified copy coexists with a shared one.
    #[error("{block} is modified in {writer} while {reader} shares it")]
    WriterWithReaders {
        /// Affected block.
        block: BlockAddress,
        /// Node holding the modified copy.
        writer: NodeId,
        /// Node holding a shared copy.
        reader: NodeId,
    },
    /// Directory state and sharer count disagree.
    #[error("directory of {home} has malformed entry {entry} for {block}")]
    MalformedEntry {
        /// Node keeping the directory.
        home: NodeId,
        /// Affected block.
        block: BlockAddress,
        /// Entry found.
        entry: DirectoryEntry,
    },
    /// An entry is kept by a node other than the block's home.
    #[error("directory of {home} tracks {block}, whose home is {expected}")]
    MisplacedEntry {
        /// Node keeping the entry.
        home: NodeId,
        /// Affected block.
        block: BlockAddress,
        /// Node that should keep it.
        expected: NodeId,
    },
    /// The sharer set differs from the nodes actually caching the block.
    #[error(
        "directory of {home} lists {} for {block} but {} hold it",
        format_nodes(.listed),
        format_nodes(.holders)
    )]
    SharerMismatch {
        /// Node keeping the directory.
        home: NodeId,
        /// Affected block.
        block: BlockAddress,
        /// Sharers recorded.
        listed: Vec<NodeId>,
        /// Nodes with a valid copy.
        holders: Vec<NodeId>,
    },
    /// A node caches a block its home directory does not track.
    #[error("{node} holds {block} but the directory of {home} has no entry")]
    UntrackedCopy {
        /// Node holding the copy.
        node: NodeId,
        /// Affected block.
        block: BlockAddress,
        /// Home node of the block.
        home: NodeId,
    },
    /// A modified copy exists while the directory does not record exclusivity.
    #[error("{node} holds {block} modified but the directory of {home} records {state}")]
    WriterNotExclusive {
        /// Node holding the modified copy.
        node: NodeId,
        /// Affected block.
        block: BlockAddress,
        /// Home node of the block.
        home: NodeId,
        /// Directory state found.
        state: DirectoryState,
    },
    /// The directory records an exclusive owner whose copy is not modified.
    #[error("directory of {home} marks {block} exclusive to {owner}, whose copy is not modified")]
    ExclusiveWithoutWriter {
        /// Node keeping the directory.
        home: NodeId,
        /// Affected block.
        block: BlockAddress,
        /// Recorded owner.
        owner: NodeId,
    },
}

type Holders = BTreeMap<BlockAddress, Vec<(NodeId, LineState)>>;

/// Verifies every coherence invariant over `engine`.
///
/// # Errors
///
/// Returns the first [`InvariantViolation`] found.
pub fn check<E: CoherenceEngine + ?Sized>(engine: &E) -> Result<(), InvariantViolation> {
    let holders = collect_holders(engine)?;
    check_single_writer(&holders)?;
    if let Some(directories) = engine.directories() {
        check_directories(directories, &holders)?;
    }
    Ok(())
}

fn collect_holders<E: CoherenceEngine + ?Sized>(
    engine: &E,
) -> Result<Holders, InvariantViolation> {
    let mut holders = Holders::new();
    for cache in engine.caches() {
        for (index, line) in cache.iter() {
            if line.is_dirty() && line.state() != LineState::Modified {
                return Err(InvariantViolation::DirtyNotModified {
                    node: cache.node(),
                    index,
                    state: line.state(),
                });
            }
            if let Some(block) = line.resident_block(index) {
                holders
                    .entry(block)
                    .or_default()
                    .push((cache.node(), line.state()));
            }
        }
    }
    Ok(holders)
}

fn check_single_writer(holders: &Holders) -> Result<(), InvariantViolation> {
    for (&block, copies) in holders {
        let mut writers = copies
            .iter()
            .filter(|(_, state)| *state == LineState::Modified)
            .map(|(node, _)| *node);
        let Some(writer) = writers.next() else {
            continue;
        };
        if let Some(second) = writers.next() {
            return Err(InvariantViolation::MultipleWriters {
                block,
                first: writer,
                second,
            });
        }
        if let Some(&(reader, _)) = copies
            .iter()
            .find(|(_, state)| *state == LineState::Shared)
        {
            return Err(InvariantViolation::WriterWithReaders {
                block,
                writer,
                reader,
            });
        }
    }
    Ok(())
}

fn check_directories(
    directories: &[Directory],
    holders: &Holders,
) -> Result<(), InvariantViolation> {
    let node_count = directories.len();

    for (home, directory) in NodeId::all(node_count).zip(directories) {
        for (block, entry) in directory.iter() {
            if !entry.is_well_formed() {
                return Err(InvariantViolation::MalformedEntry {
                    home,
                    block,
                    entry: entry.clone(),
                });
            }
            let expected = home_node(block.address(), node_count);
            if expected != home {
                return Err(InvariantViolation::MisplacedEntry {
                    home,
                    block,
                    expected,
                });
            }

            let copies = holders.get(&block).map_or(&[][..], Vec::as_slice);
            let listed: Vec<NodeId> = entry.sharers().iter().copied().collect();
            let mut actual: Vec<NodeId> = copies.iter().map(|(node, _)| *node).collect();
            actual.sort_unstable();
            if listed != actual {
                return Err(InvariantViolation::SharerMismatch {
                    home,
                    block,
                    listed,
                    holders: actual,
                });
            }

            if let Some(owner) = entry.exclusive_owner() {
                let owner_modified = copies
                    .iter()
                    .any(|&(node, state)| node == owner && state == LineState::Modified);
                if !owner_modified {
                    return Err(InvariantViolation::ExclusiveWithoutWriter { home, block, owner });
                }
            }
        }
    }

    for (&block, copies) in holders {
        let home = home_node(block.address(), node_count);
        let state = directories[home.index()].state_of(block);
        let Some(&(node, _)) = copies.first() else {
            continue;
        };
        if directories[home.index()].get(block).is_none() {
            return Err(InvariantViolation::UntrackedCopy { node, block, home });
        }
        if let Some(&(writer, _)) = copies
            .iter()
            .find(|(_, line_state)| *line_state == LineState::Modified)
        {
            if state != DirectoryState::Exclusive {
                return Err(InvariantViolation::WriterNotExclusive {
                    node: writer,
                    block,
                    home,
                    state,
                });
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{check, InvariantViolation};
    use crate::engine::Request;
    use crate::{Address, Block, CoherenceEngine, DirectoryEngine, NodeId, SnoopEngine};

    fn address(raw: u32) -> Address {
        Address::new(raw).expect("24-bit address")
    }

    #[test]
    fn fresh_and_busy_systems_are_coherent() {
        let mut directory = DirectoryEngine::default();
        let mut snoop = SnoopEngine::default();
        assert_eq!(check(&directory), Ok(()));
        assert_eq!(check(&snoop), Ok(()));

        let requests = [
            Request::read(NodeId::new(0), address(0x01_00_00)),
            Request::read(NodeId::new(1), address(0x01_00_00)),
            Request::write(NodeId::new(2), address(0x01_00_00), Block::splat(1)),
            Request::write(NodeId::new(3), address(0x81_00_00), Block::splat(2)),
            Request::read(NodeId::new(0), address(0x81_00_00)),
        ];
        for request in &requests {
            directory.execute(request).expect("valid request");
            snoop.execute(request).expect("valid request");
            assert_eq!(check(&directory), Ok(()));
            assert_eq!(check(&snoop), Ok(()));
        }
    }

    #[test]
    fn corrupted_cache_is_reported() {
        let mut engine = SnoopEngine::default();
        let target = address(0x02_00_00);
        engine
            .execute(&Request::write(NodeId::new(0), target, Block::splat(3)))
            .expect("valid request");
        engine
            .execute(&Request::write(NodeId::new(1), target, Block::splat(4)))
            .expect("valid request");
        assert_eq!(check(&engine), Ok(()));

        engine
            .cache_mut(NodeId::new(0))
            .line_mut(target.index())
            .write(target.tag(), Block::splat(3));

        assert_eq!(
            check(&engine),
            Err(InvariantViolation::MultipleWriters {
                block: target.block(),
                first: NodeId::new(0),
                second: NodeId::new(1),
            })
        );
    }

    #[test]
    fn violation_messages_name_the_nodes_involved() {
        let violation = InvariantViolation::SharerMismatch {
            home: NodeId::new(0),
            block: address(0x01_00_00).block(),
            listed: vec![NodeId::new(1)],
            holders: vec![NodeId::new(1), NodeId::new(2)],
        };
        assert_eq!(
            violation.to_string(),
            "directory of CPU00 lists {CPU01} for 0x010000 but {CPU01, CPU10} hold it"
        );
    }
}
