//! # CLI - lsmkv interactive shell
//!
//! A REPL-style command-line interface for the lsmkv storage engine.
//! Reads commands from stdin, executes them against the engine, and prints
//! results to stdout. Works interactively and with piped input.
//!
//! ## Commands
//!
//! ```text
//! PUT key value      Insert or update a key-value pair
//! GET key            Look up a key (prints the value, or an empty line)
//! DELETE key         Delete a key (writes a tombstone)
//! DROP               Remove every key, segment and WAL record
//! FLUSH              Force the memtable into a level-0 segment
//! COMPACT            Merge segments level by level
//! STATS              Print engine debug info
//! EXIT / QUIT        Shut down
//! ```
//!
//! Command names are case-insensitive.
//!
//! ## Configuration
//!
//! ```text
//! LSMKV_DATA_DIR        Data directory              (default: "data")
//! LSMKV_MEMTABLE_BYTES  Memtable flush threshold    (default: 1000)
//! LSMKV_SPARSITY        Sparse index sampling step  (default: 1000)
//! LSMKV_WAL_SYNC        fsync every WAL append      (default: "false")
//! RUST_LOG              Log filter for stderr       (default: "warn")
//! ```
//!
//! ## Example
//!
//! ```text
//! $ cargo run -p lsmkv-cli
//! lsmkv started (data_dir=data, memtable_threshold=1000, segments=0)
//! > PUT name Alice
//! OK
//! > GET name
//! Alice
//! > EXIT
//! bye
//! ```

use anyhow::{Context, Result};
use config::EngineConfig;
use engine::Engine;
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

/// What the loop should do after a command.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Print(String),
    Nothing,
    Exit,
}

fn print(msg: impl Into<String>) -> Outcome {
    Outcome::Print(msg.into())
}

fn engine_error(e: anyhow::Error) -> Outcome {
    print(format!("ERR {:#}", e))
}

/// Parses and runs one input line.
fn execute(engine: &mut Engine, line: &str) -> Outcome {
    let mut parts = line.split_whitespace();
    let cmd = match parts.next() {
        Some(c) => c,
        None => return Outcome::Nothing,
    };

    match cmd.to_uppercase().as_str() {
        "PUT" => {
            let key = match parts.next() {
                Some(k) => k,
                None => return print("Key can not be empty."),
            };
            let value = parts.collect::<Vec<&str>>().join(" ");
            if value.is_empty() {
                return print("Value can not be empty.");
            }
            match engine.put(key, &value) {
                Ok(()) => print("OK"),
                Err(e) => engine_error(e),
            }
        }
        "GET" => match parts.next() {
            None => print("Key can not be empty."),
            Some(key) => match engine.get(key) {
                Ok(value) => print(value.unwrap_or_default()),
                Err(e) => engine_error(e),
            },
        },
        "DELETE" => match parts.next() {
            None => print("Key can not be empty."),
            Some(key) => match engine.remove(key) {
                Ok(()) => print("OK"),
                Err(e) => engine_error(e),
            },
        },
        "DROP" => match engine.drop_table() {
            Ok(()) => print("OK"),
            Err(e) => engine_error(e),
        },
        "FLUSH" => match engine.force_flush() {
            Ok(()) => print(format!("OK (levels={:?})", engine.levels())),
            Err(e) => engine_error(e),
        },
        "COMPACT" => match engine.compact() {
            Ok(()) => print(format!("OK (levels={:?})", engine.levels())),
            Err(e) => engine_error(e),
        },
        "STATS" => print(format!("{:?}", engine)),
        "EXIT" | "QUIT" => Outcome::Exit,
        _ => print(format!("Command '{}' not found.", cmd)),
    }
}

fn prompt() {
    print!("> ");
    io::stdout().flush().ok();
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let config = EngineConfig::from_env().context("reading configuration")?;
    let mut engine = Engine::open(config)?;

    println!(
        "lsmkv started (data_dir={}, memtable_threshold={}, segments={})",
        engine.config().data_dir.display(),
        engine.config().memtable_threshold,
        engine.segment_count()
    );
    println!("Commands: PUT key value | GET key | DELETE key | DROP");
    println!("          FLUSH | COMPACT | STATS | EXIT");
    prompt();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        match execute(&mut engine, &line) {
            Outcome::Print(msg) => println!("{}", msg),
            Outcome::Nothing => {}
            Outcome::Exit => break,
        }
        prompt();
    }

    println!("bye");
    Ok(())
}
