//! Request script parsing.
//!
//! One command per line:
//!
//! ```text
//! # comment
//! CPU01 read  0x010000
//! CPU01 write 0x010000 FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF
//! reset
//! ```

use std::fmt;

use coherence_core::Request;

use crate::request::{build_request, RequestError};

/// A command taken from one script line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptCommand {
    /// Execute a validated request.
    Request(Request),
    /// Flush and clear the whole system.
    Reset,
}

/// A command with the 1-indexed line it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptItem {
    /// Source line number.
    pub line: usize,
    /// Parsed command.
    pub command: ScriptCommand,
}

/// A rejected script line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptError {
    /// Source line number.
    pub line: usize,
    /// What was wrong with it.
    pub kind: RequestError,
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl std::error::Error for ScriptError {}

/// Parses one line; blank and comment-only lines yield `None`.
///
/// # Errors
///
/// Returns [`RequestError`] when the line is not `reset` and not a valid
/// `<node> <read|write> <address> [payload]` request.
pub fn parse_line(text: &str, node_count: usize) -> Result<Option<ScriptCommand>, RequestError> {
    let code = text.split_once('#').map_or(text, |(code, _)| code);
    let fields: Vec<&str> = code.split_whitespace().collect();

    match fields.as_slice() {
        [] => Ok(None),
        [keyword] if keyword.eq_ignore_ascii_case("reset") => Ok(Some(ScriptCommand::Reset)),
        [node, operation, address] => {
            build_request(node, operation, address, None, node_count)
                .map(|request| Some(ScriptCommand::Request(request)))
        }
        [node, operation, address, payload] => {
            build_request(node, operation, address, Some(*payload), node_count)
                .map(|request| Some(ScriptCommand::Request(request)))
        }
        _ => Err(RequestError::MalformedLine(code.trim().to_string())),
    }
}

/// Parses a whole script, keeping going past bad lines.
#[must_use]
pub fn parse_script(source: &str, node_count: usize) -> Vec<Result<ScriptItem, ScriptError>> {
    source
        .lines()
        .enumerate()
        .filter_map(|(position, text)| {
            let line = position + 1;
            match parse_line(text, node_count) {
                Ok(None) => None,
                Ok(Some(command)) => Some(Ok(ScriptItem { line, command })),
                Err(kind) => Some(Err(ScriptError { line, kind })),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{parse_line, parse_script, ScriptCommand, ScriptError};
    use crate::request::RequestError;
    use coherence_core::{Address, Block, NodeId, Request};

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        assert_eq!(parse_line("", 4), Ok(None));
        assert_eq!(parse_line("   # just a note", 4), Ok(None));
    }

    #[test]
    fn reset_and_requests_parse() {
        assert_eq!(parse_line("RESET", 4), Ok(Some(ScriptCommand::Reset)));

        let address = Address::new(0x01_00_00).expect("24-bit address");
        assert_eq!(
            parse_line("CPU01 read 0x010000   # first touch", 4),
            Ok(Some(ScriptCommand::Request(Request::read(
                NodeId::new(1),
                address
            ))))
        );
        assert_eq!(
            parse_line(&format!("2 write 010000 {}", "ff".repeat(16)), 4),
            Ok(Some(ScriptCommand::Request(Request::write(
                NodeId::new(2),
                address,
                Block::splat(0xFF)
            ))))
        );
    }

    #[test]
    fn wrong_field_count_is_a_malformed_line() {
        assert_eq!(
            parse_line("CPU01 read", 4),
            Err(RequestError::MalformedLine("CPU01 read".to_string()))
        );
        assert_eq!(
            parse_line("reset now", 4),
            Err(RequestError::MalformedLine("reset now".to_string()))
        );
    }

    #[test]
    fn script_reports_bad_lines_with_numbers() {
        let source = "CPU00 read 0x000000\n\n# skip\nCPU09 read 0x000000\nreset\n";
        let items = parse_script(source, 4);

        assert_eq!(items.len(), 3);
        assert_eq!(items[0].as_ref().map(|item| item.line), Ok(1));
        assert_eq!(
            items[1],
            Err(ScriptError {
                line: 4,
                kind: RequestError::UnknownNode {
                    name: "CPU09".to_string(),
                    node_count: 4,
                },
            })
        );
        assert_eq!(
            items[2].as_ref().map(|item| item.command),
            Ok(ScriptCommand::Reset)
        );
    }
}
