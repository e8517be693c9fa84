//! Plain-text and JSON rendering of outcomes, history and snapshots.

use std::fmt::Write as _;

use coherence_core::{CacheLineView, LogEntry, RequestLog, SystemSnapshot};

/// Summary line of `entry` followed by its narrative and resulting data.
#[must_use]
pub fn entry_report(entry: &LogEntry) -> String {
    let mut out = format!("{entry}\n");
    for step in &entry.outcome.steps {
        let _ = writeln!(out, "  {step}");
    }
    let _ = writeln!(out, "  data {}", entry.outcome.data);
    out
}

/// History summaries, newest first.
#[must_use]
pub fn history_report(history: &RequestLog) -> String {
    let mut out = format!("history ({} of {} kept)\n", history.len(), history.capacity());
    for entry in history.iter() {
        let _ = writeln!(out, "  {entry}");
    }
    out
}

fn line_row(line: &CacheLineView) -> String {
    let tag = line
        .tag
        .map_or_else(|| "----".to_string(), |tag| format!("{tag}"));
    format!(
        "  {:>2}  {tag}  {}  {}  {}",
        line.index.to_string(),
        line.state,
        if line.dirty { 'D' } else { '-' },
        line.data
    )
}

/// Per-node cache tables and, for the directory protocol, directory rows.
///
/// Lines that never held a block are omitted unless `all_lines`.
#[must_use]
pub fn snapshot_report(snapshot: &SystemSnapshot, all_lines: bool) -> String {
    let mut out = format!("{} protocol, {} nodes\n", snapshot.protocol, snapshot.nodes.len());
    for node in &snapshot.nodes {
        let _ = writeln!(out, "{}", node.node);
        let _ = writeln!(out, "  ln  tag   st dt data");
        for line in &node.lines {
            if all_lines || line.tag.is_some() {
                let _ = writeln!(out, "{}", line_row(line));
            }
        }
        if let Some(rows) = &node.directory {
            if rows.is_empty() {
                let _ = writeln!(out, "  directory empty");
            }
            for row in rows {
                let _ = writeln!(out, "  dir {} {}", row.block, row.entry);
            }
        }
    }
    out
}

/// Pretty-printed JSON form of `snapshot`.
///
/// # Errors
///
/// Returns the `serde_json` error if serialization fails.
pub fn snapshot_json(snapshot: &SystemSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(snapshot)
}
