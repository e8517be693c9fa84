//! CLI entry point for the coherence simulator binary.

use std::env;
use std::ffi::OsString;
use std::fs;
use std::path::PathBuf;

use coherence_core::{Protocol, Simulator, SystemConfig, DEFAULT_NODE_COUNT};
use coherence_sim::{logger, parse_script, render, ScriptCommand};
use log as _;
use serde_json as _;
#[cfg(test)]
use tempfile as _;
use thiserror as _;

const USAGE_TEXT: &str = "\
Usage: coherence-sim <command> [options]

Commands:
  run <script>  Execute a request script and print every outcome

Options:
  -p, --protocol <name>  directory (default) or snoop
  -n, --nodes <count>    Number of nodes (default: 4)
      --json             Print only the final snapshot, as JSON
  -v, --verbose          Log requests to stderr; repeat for every step
  -h, --help             Show this help message

Script lines:
  <node> read <address>
  <node> write <address> <payload>
  reset

  Nodes are CPU00..CPU11 or decimal indices, addresses six hex digits,
  payloads 16 hex digits (one per unit) or 32 (two per unit).
  '#' starts a comment.

Examples:
  coherence-sim run scenario.txt
  coherence-sim run scenario.txt --protocol snoop -vv
";

const EXIT_REJECTED: i32 = 1;
const EXIT_USAGE: i32 = 2;

#[derive(Debug, PartialEq, Eq)]
struct RunArgs {
    script: PathBuf,
    protocol: Protocol,
    nodes: usize,
    json: bool,
    verbosity: u8,
}

#[derive(Debug)]
enum ParseResult {
    Run(RunArgs),
    Help,
}

fn parse_args(mut args: impl Iterator<Item = OsString>) -> Result<ParseResult, String> {
    let first = args.next().ok_or_else(|| "missing command".to_string())?;

    if first == "--help" || first == "-h" {
        return Ok(ParseResult::Help);
    }

    let command_str = first.to_string_lossy().to_string();

    match command_str.as_str() {
        "run" => {
            parse_run_args(args).map(|parsed| parsed.map_or(ParseResult::Help, ParseResult::Run))
        }
        other => Err(format!("unknown command: {other}")),
    }
}

fn parse_protocol(value: &str) -> Result<Protocol, String> {
    if value.eq_ignore_ascii_case("directory") {
        Ok(Protocol::Directory)
    } else if value.eq_ignore_ascii_case("snoop") {
        Ok(Protocol::Snoop)
    } else {
        Err(format!("unknown protocol: {value}"))
    }
}

/// Returns `Ok(None)` when help was requested.
#[allow(clippy::while_let_on_iterator)]
fn parse_run_args(mut args: impl Iterator<Item = OsString>) -> Result<Option<RunArgs>, String> {
    let mut script: Option<PathBuf> = None;
    let mut protocol = Protocol::Directory;
    let mut nodes = DEFAULT_NODE_COUNT;
    let mut json = false;
    let mut verbosity = 0_u8;

    while let Some(arg) = args.next() {
        let text = arg.to_string_lossy().to_string();
        match text.as_str() {
            "--help" | "-h" => return Ok(None),
            "--json" => json = true,
            "-v" | "--verbose" => verbosity = verbosity.saturating_add(1),
            "-vv" => verbosity = verbosity.saturating_add(2),
            "-p" | "--protocol" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for {text}"))?;
                protocol = parse_protocol(&value.to_string_lossy())?;
            }
            "-n" | "--nodes" => {
                let value = args
                    .next()
                    .ok_or_else(|| format!("missing value for {text}"))?;
                let value = value.to_string_lossy();
                nodes = value
                    .parse()
                    .map_err(|_| format!("invalid node count: {value}"))?;
            }
            option if option.starts_with('-') => {
                return Err(format!("unknown option: {option}"));
            }
            _ => {
                if script.is_some() {
                    return Err("multiple script paths provided".to_string());
                }
                script = Some(PathBuf::from(arg));
            }
        }
    }

    let script = script.ok_or_else(|| "missing script path".to_string())?;
    Ok(Some(RunArgs {
        script,
        protocol,
        nodes,
        json,
        verbosity,
    }))
}

fn run(args: &RunArgs) -> Result<(), i32> {
    if let Err(error) = logger::install(args.verbosity) {
        eprintln!("warning: {error}");
    }

    let config = SystemConfig {
        node_count: args.nodes,
        ..SystemConfig::for_protocol(args.protocol)
    };
    let mut simulator = Simulator::with_config(config).map_err(|error| {
        eprintln!("error: {error}");
        EXIT_USAGE
    })?;

    let source = fs::read_to_string(&args.script).map_err(|error| {
        eprintln!("error: failed to read {}: {error}", args.script.display());
        EXIT_USAGE
    })?;

    let mut rejected = 0_usize;
    for item in parse_script(&source, config.node_count) {
        let item = match item {
            Ok(item) => item,
            Err(error) => {
                eprintln!("{}:{}: error: {}", args.script.display(), error.line, error.kind);
                rejected += 1;
                continue;
            }
        };

        match item.command {
            ScriptCommand::Reset => {
                simulator.reset();
                if !args.json {
                    println!("reset");
                }
            }
            ScriptCommand::Request(request) => {
                if let Err(error) = simulator.execute(request) {
                    eprintln!("{}:{}: error: {error}", args.script.display(), item.line);
                    rejected += 1;
                    continue;
                }
                if !args.json {
                    if let Some(entry) = simulator.history().latest() {
                        print!("{}", render::entry_report(entry));
                    }
                }
            }
        }
    }

    if args.json {
        let json = render::snapshot_json(&simulator.snapshot()).map_err(|error| {
            eprintln!("error: failed to serialize snapshot: {error}");
            EXIT_USAGE
        })?;
        println!("{json}");
    } else {
        println!();
        print!("{}", render::history_report(simulator.history()));
        println!();
        print!("{}", render::snapshot_report(&simulator.snapshot(), false));
    }

    if rejected == 0 {
        Ok(())
    } else {
        eprintln!("{rejected} line(s) rejected");
        Err(EXIT_REJECTED)
    }
}

fn main() {
    let exit_code = match parse_args(env::args_os().skip(1)) {
        Ok(ParseResult::Help) => {
            println!("{USAGE_TEXT}");
            0
        }
        Ok(ParseResult::Run(args)) => match run(&args) {
            Ok(()) => 0,
            Err(code) => code,
        },
        Err(error) => {
            eprintln!("error: {error}");
            eprintln!("{USAGE_TEXT}");
            EXIT_USAGE
        }
    };

    std::process::exit(exit_code);
}
