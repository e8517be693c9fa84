//! Snoop protocol walkthroughs checked end to end.

use coherence_core::{
    invariants, Address, Block, CoherenceEngine, LineState, NodeId, Protocol, Request,
    Simulator, SnoopEngine, SystemConfig,
};
use log as _;
use proptest as _;
use rstest::rstest;
#[cfg(feature = "serde")]
use serde as _;
use thiserror as _;

const CPU00: NodeId = NodeId::new(0);
const CPU01: NodeId = NodeId::new(1);
const CPU10: NodeId = NodeId::new(2);
const CPU11: NodeId = NodeId::new(3);

fn address(raw: u32) -> Address {
    Address::new(raw).expect("24-bit address")
}

fn line_state(engine: &SnoopEngine, node: NodeId, at: Address) -> LineState {
    engine
        .cache(node)
        .expect("known node")
        .line(at.index())
        .state()
}

#[test]
fn write_then_remote_read_downgrades_the_writer() {
    let mut engine = SnoopEngine::default();
    let target = address(0x02_00_00);

    let write = engine
        .execute(&Request::write(CPU00, target, Block::splat(0xAA)))
        .expect("valid request");
    assert!(!write.hit);
    assert_eq!(
        write.narrative(),
        [
            "CPU00 loads 0x020000 from main memory",
            "CPU00 writes 0x020000, line now M",
        ]
    );

    let read = engine
        .execute(&Request::read(CPU01, target))
        .expect("valid request");
    assert!(!read.hit);
    assert_eq!(read.data, Block::splat(0xAA));
    assert_eq!(
        read.narrative(),
        [
            "CPU00 writes 0x020000 back to main memory",
            "CPU00 downgrades 0x020000 from M to S",
            "CPU01 copies 0x020000 from CPU00",
        ]
    );
    assert_eq!(line_state(&engine, CPU00, target), LineState::Shared);
    assert_eq!(line_state(&engine, CPU01, target), LineState::Shared);
    assert_eq!(engine.backing_block(target.block()), Block::splat(0xAA));
    invariants::check(&engine).expect("coherent");
}

#[test]
fn write_hit_broadcasts_invalidation_to_every_sharer() {
    let mut engine = SnoopEngine::default();
    let target = address(0x33_33_30);
    for node in [CPU00, CPU01, CPU10, CPU11] {
        engine
            .execute(&Request::read(node, target))
            .expect("valid request");
    }

    let outcome = engine
        .execute(&Request::write(CPU10, target, Block::splat(0x5E)))
        .expect("valid request");

    assert!(outcome.hit);
    assert_eq!(outcome.participants, [CPU00, CPU01, CPU11]);
    for node in [CPU00, CPU01, CPU11] {
        assert_eq!(line_state(&engine, node, target), LineState::Invalid);
    }
    assert_eq!(line_state(&engine, CPU10, target), LineState::Modified);
    invariants::check(&engine).expect("coherent");
}

#[test]
fn write_miss_over_modified_peer_keeps_peer_data_in_memory() {
    let mut engine = SnoopEngine::default();
    let target = address(0x12_34_50);
    engine
        .execute(&Request::write(CPU11, target, Block::splat(1)))
        .expect("valid request");

    let outcome = engine
        .execute(&Request::write(CPU01, target, Block::splat(2)))
        .expect("valid request");

    assert!(!outcome.hit);
    assert_eq!(outcome.data, Block::splat(2));
    assert_eq!(engine.backing_block(target.block()), Block::splat(1));
    assert_eq!(line_state(&engine, CPU11, target), LineState::Invalid);
    assert_eq!(line_state(&engine, CPU01, target), LineState::Modified);
    invariants::check(&engine).expect("coherent");
}

#[rstest]
#[case(1)]
#[case(3)]
#[case(5)]
#[case(16)]
fn any_node_count_stays_coherent(#[case] node_count: usize) {
    let config = SystemConfig {
        node_count,
        ..SystemConfig::for_protocol(Protocol::Snoop)
    };
    let mut engine = SnoopEngine::with_config(&config).expect("valid config");

    for (round, raw) in [0x00_00_10_u32, 0x01_00_10, 0x00_00_10, 0x02_00_10]
        .into_iter()
        .enumerate()
    {
        for node in NodeId::all(node_count) {
            let request = if (round + node.index()) % 2 == 0 {
                Request::write(node, address(raw), Block::splat(0x20))
            } else {
                Request::read(node, address(raw))
            };
            engine.execute(&request).expect("valid request");
            invariants::check(&engine).expect("coherent");
        }
    }
}

#[test]
fn simulator_reset_preserves_written_data() {
    let mut simulator =
        Simulator::with_config(SystemConfig::for_protocol(Protocol::Snoop)).expect("valid config");
    let target = address(0x44_44_40);
    simulator
        .execute(Request::write(CPU10, target, Block::splat(0x61)))
        .expect("valid request");

    simulator.reset();
    simulator.reset();

    assert!(simulator.history().is_empty());
    let outcome = simulator
        .execute(Request::read(CPU00, target))
        .expect("valid request");
    assert_eq!(outcome.data, Block::splat(0x61));
    assert_eq!(
        outcome.narrative(),
        ["CPU00 loads 0x444440 from main memory"]
    );
}
