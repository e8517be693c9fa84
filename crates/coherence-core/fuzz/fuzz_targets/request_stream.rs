#![no_main]

use coherence_core::{
    invariants, Address, Block, CoherenceEngine, Engine, NodeId, Protocol, Request, SystemConfig,
};
use libfuzzer_sys::fuzz_target;

const NODES: u8 = 4;

fn decode(chunk: &[u8]) -> Option<Request> {
    let &[control, high, low, fill] = chunk else {
        return None;
    };
    let node = NodeId::new(control % NODES);
    // Keep the middle byte narrow so lines collide often.
    let raw = (u32::from(high) << 16) | (u32::from(low & 0x0F) << 8) | u32::from(low & 0xF0);
    let address = Address::new(raw)?;
    Some(if control & 0x80 == 0 {
        Request::read(node, address)
    } else {
        Request::write(node, address, Block::splat(fill))
    })
}

fuzz_target!(|data: &[u8]| {
    let Some((&selector, stream)) = data.split_first() else {
        return;
    };
    let protocol = if selector & 1 == 0 {
        Protocol::Directory
    } else {
        Protocol::Snoop
    };
    let Ok(mut engine) = Engine::with_config(&SystemConfig::for_protocol(protocol)) else {
        return;
    };

    for chunk in stream.chunks(4) {
        if chunk == [0xFF; 4] {
            engine.reset();
        } else if let Some(request) = decode(chunk) {
            let outcome = engine.execute(&request);
            assert!(outcome.is_ok(), "in-range node rejected: {outcome:?}");
        }
        if let Err(violation) = invariants::check(&engine) {
            panic!("{protocol} protocol broke coherence: {violation}");
        }
    }
});
