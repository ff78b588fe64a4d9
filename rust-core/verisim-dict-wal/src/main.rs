// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//!
//! dictwal: inspection tool for value dictionary WAL directories.
//!
//! Read-only: it never takes the directory lock, so it can run next to a
//! live store.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use verisim_dict_wal::frame::FramePayload;
use verisim_dict_wal::segment::list_segments;
use verisim_dict_wal::{WalReader, WalSearch};

/// Exit code of `scan` when the log is incomplete.
const EXIT_INCOMPLETE: u8 = 2;

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

/// dictwal: inspect a VeriSimDB value dictionary WAL.
#[derive(Parser, Debug)]
#[command(name = "dictwal", version, about = "Inspect a value dictionary WAL")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List segments in sequence order.
    Segments {
        /// WAL directory.
        dir: PathBuf,
    },
    /// Scan every segment and report completeness.
    Scan {
        /// WAL directory.
        dir: PathBuf,
        /// Print every mint record as a JSON line.
        #[arg(long)]
        records: bool,
    },
    /// Look up the term minted for an id.
    Find {
        /// WAL directory.
        dir: PathBuf,
        /// Dictionary id.
        #[arg(allow_negative_numbers = true)]
        id: i64,
    },
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Segments { dir } => {
            let segments = list_segments(&dir)
                .with_context(|| format!("listing segments in {}", dir.display()))?;
            for segment in segments {
                println!(
                    "{:>8}  {:>12}  {:>10}  {}{}",
                    segment.sequence,
                    segment
                        .first_id()
                        .map_or_else(|| "-".to_string(), |id| id.to_string()),
                    segment.file_size,
                    segment.path.display(),
                    if segment.is_compressed() { "  (gz)" } else { "" },
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Scan { dir, records } => {
            let reader = WalReader::open(&dir)
                .with_context(|| format!("opening WAL in {}", dir.display()))?;
            let segment_count = reader.segments().len();
            let scan = reader.scan();
            if records {
                for record in &scan.records {
                    let line = serde_json::to_string(&FramePayload::Mint(record.clone().into()))?;
                    println!("{line}");
                }
            }
            println!("segments:       {segment_count}");
            println!("records:        {}", scan.records.len());
            println!("last valid lsn: {}", scan.last_valid_lsn);
            println!("complete:       {}", scan.complete);
            if scan.complete {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::from(EXIT_INCOMPLETE))
            }
        }
        Command::Find { dir, id } => match WalSearch::new(&dir).find_value_by_id(id) {
            Some(term) => {
                println!("{term}");
                Ok(ExitCode::SUCCESS)
            }
            None => {
                eprintln!("id {id} not found");
                Ok(ExitCode::FAILURE)
            }
        },
    }
}
