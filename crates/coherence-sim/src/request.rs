//! Validation of user-supplied request fields.
//!
//! Everything here runs before a request reaches the engine, so the engine
//! only ever sees in-range nodes, 24-bit addresses and full-width payloads.

use coherence_core::{Address, Block, NodeId, Request, ADDRESS_BITS, BLOCK_SIZE};
use thiserror::Error;

/// Hex digits in an address literal.
pub const ADDRESS_HEX_DIGITS: usize = (ADDRESS_BITS / 4) as usize;
/// Hex digits in a payload literal, two per unit.
pub const PAYLOAD_HEX_DIGITS: usize = BLOCK_SIZE * 2;
/// Hex digits in the short payload form, one per unit.
pub const SHORT_PAYLOAD_HEX_DIGITS: usize = BLOCK_SIZE;

/// Reasons a request is rejected before execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// Address is not six hex digits.
    #[error("malformed address `{0}`: expected {ADDRESS_HEX_DIGITS} hex digits")]
    MalformedAddress(String),
    /// Payload has the wrong width or non-hex characters.
    #[error(
        "malformed payload `{0}`: expected {SHORT_PAYLOAD_HEX_DIGITS} or {PAYLOAD_HEX_DIGITS} hex digits"
    )]
    MalformedPayload(String),
    /// A write came without data.
    #[error("write requires a payload")]
    MissingPayload,
    /// A read came with data.
    #[error("read does not take a payload")]
    UnexpectedPayload,
    /// Node name does not parse or is outside the system.
    #[error("unknown node `{name}` in a {node_count}-node system")]
    UnknownNode {
        /// Text as given.
        name: String,
        /// Number of configured nodes.
        node_count: usize,
    },
    /// Operation is neither `read` nor `write`.
    #[error("unknown operation `{0}`: expected read or write")]
    UnknownOperation(String),
    /// Line does not have the `<node> <op> <address> [payload]` shape.
    #[error("malformed line: {0}")]
    MalformedLine(String),
}

/// Operation keyword before its payload is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// `read`
    Read,
    /// `write`
    Write,
}

/// Parses `0x`-prefixed or bare six-digit hex addresses.
///
/// # Errors
///
/// Returns [`RequestError::MalformedAddress`] for any other shape.
pub fn parse_address(text: &str) -> Result<Address, RequestError> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    if digits.len() != ADDRESS_HEX_DIGITS || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(RequestError::MalformedAddress(text.to_string()));
    }
    u32::from_str_radix(digits, 16)
        .ok()
        .and_then(Address::new)
        .ok_or_else(|| RequestError::MalformedAddress(text.to_string()))
}

/// Parses a block payload.
///
/// [`PAYLOAD_HEX_DIGITS`] digits give two per unit; the short form of
/// [`SHORT_PAYLOAD_HEX_DIGITS`] digits gives one unit per digit, so
/// `FFFFFFFFFFFFFFFF` fills every unit with `0x0F`.
///
/// # Errors
///
/// Returns [`RequestError::MalformedPayload`] for any other width or for
/// non-hex characters.
pub fn parse_payload(text: &str) -> Result<Block, RequestError> {
    let malformed = || RequestError::MalformedPayload(text.to_string());
    if !text.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(malformed());
    }
    let digits_per_unit = match text.len() {
        PAYLOAD_HEX_DIGITS => 2,
        SHORT_PAYLOAD_HEX_DIGITS => 1,
        _ => return Err(malformed()),
    };

    let mut bytes = [0_u8; BLOCK_SIZE];
    for (slot, unit) in bytes
        .iter_mut()
        .zip(text.as_bytes().chunks_exact(digits_per_unit))
    {
        let unit = std::str::from_utf8(unit).map_err(|_| malformed())?;
        *slot = u8::from_str_radix(unit, 16).map_err(|_| malformed())?;
    }
    Ok(Block::new(bytes))
}

/// Parses `CPU` + binary digits (`CPU10`) or a decimal index (`2`).
///
/// # Errors
///
/// Returns [`RequestError::UnknownNode`] when the name does not parse or
/// the node is not one of the first `node_count` nodes.
pub fn parse_node(text: &str, node_count: usize) -> Result<NodeId, RequestError> {
    let unknown = || RequestError::UnknownNode {
        name: text.to_string(),
        node_count,
    };
    let upper = text.to_ascii_uppercase();
    let raw = match upper.strip_prefix("CPU") {
        Some(bits) if !bits.is_empty() => u8::from_str_radix(bits, 2),
        Some(_) => return Err(unknown()),
        None => text.parse::<u8>(),
    }
    .map_err(|_| unknown())?;

    let node = NodeId::new(raw);
    if node.is_member_of(node_count) {
        Ok(node)
    } else {
        Err(unknown())
    }
}

/// Parses `read` or `write`, ignoring case.
///
/// # Errors
///
/// Returns [`RequestError::UnknownOperation`] for anything else.
pub fn parse_operation(text: &str) -> Result<OperationKind, RequestError> {
    if text.eq_ignore_ascii_case("read") {
        Ok(OperationKind::Read)
    } else if text.eq_ignore_ascii_case("write") {
        Ok(OperationKind::Write)
    } else {
        Err(RequestError::UnknownOperation(text.to_string()))
    }
}

/// Validates every field and assembles the request.
///
/// # Errors
///
/// Returns the first [`RequestError`] found, checking node, operation,
/// address and payload in that order.
pub fn build_request(
    node: &str,
    operation: &str,
    address: &str,
    payload: Option<&str>,
    node_count: usize,
) -> Result<Request, RequestError> {
    let requester = parse_node(node, node_count)?;
    let kind = parse_operation(operation)?;
    let address = parse_address(address)?;

    match (kind, payload) {
        (OperationKind::Read, None) => Ok(Request::read(requester, address)),
        (OperationKind::Read, Some(_)) => Err(RequestError::UnexpectedPayload),
        (OperationKind::Write, None) => Err(RequestError::MissingPayload),
        (OperationKind::Write, Some(text)) => {
            Ok(Request::write(requester, address, parse_payload(text)?))
        }
    }
}
