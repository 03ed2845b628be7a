use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use serde::Serialize;

use super::{OutputFormat, confirm, print_json, resolve_format};
use crate::error::ExitError;
use crate::respawn::{RESPAWN_THRESHOLD, RespawnStore};
use crate::workspace::MarkerLocator;

/// Shared flags for respawn subcommands.
#[derive(Debug, clap::Args)]
pub struct RespawnArgs {
    /// Directory inside the town (default: current directory)
    #[arg(long)]
    pub workdir: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl RespawnArgs {
    fn store(&self) -> anyhow::Result<RespawnStore> {
        let workdir = match self.workdir.clone() {
            Some(dir) => dir,
            None => std::env::current_dir().context("could not determine current directory")?,
        };
        Ok(RespawnStore::for_workdir(&MarkerLocator::new(), &workdir))
    }
}

#[derive(Debug, Subcommand)]
pub enum RespawnCommand {
    /// Show respawn counts for every tracked bead
    Status {
        #[command(flatten)]
        args: RespawnArgs,
    },
    /// Report whether a bead is blocked from respawning
    Check {
        bead_id: String,
        #[command(flatten)]
        args: RespawnArgs,
    },
    /// Record a respawn attempt for a bead
    Record {
        bead_id: String,
        #[command(flatten)]
        args: RespawnArgs,
    },
    /// Clear a bead's respawn history so it can be dispatched again
    Reset {
        bead_id: String,
        /// Skip the confirmation prompt
        #[arg(long, short)]
        yes: bool,
        #[command(flatten)]
        args: RespawnArgs,
    },
}

#[derive(Debug, Serialize)]
struct BeadReport<'a> {
    bead_id: &'a str,
    count: u32,
    threshold: u32,
    blocked: bool,
}

impl RespawnCommand {
    pub fn execute(&self) -> anyhow::Result<()> {
        match self {
            Self::Status { args } => status(args),
            Self::Check { bead_id, args } => check(bead_id, args),
            Self::Record { bead_id, args } => record(bead_id, args),
            Self::Reset { bead_id, yes, args } => reset(bead_id, *yes, args),
        }
    }
}

fn status(args: &RespawnArgs) -> anyhow::Result<()> {
    let store = args.store()?;
    let snapshot = store.snapshot().logged("snapshot", "");
    match resolve_format(args.format) {
        OutputFormat::Json => print_json(&snapshot),
        OutputFormat::Text => {
            for record in snapshot.beads.values() {
                println!(
                    "{} count={} blocked={} last={}",
                    record.bead_id,
                    record.count,
                    record.is_blocked(),
                    record.last_respawn.to_rfc3339()
                );
            }
            Ok(())
        }
        OutputFormat::Pretty => {
            if snapshot.beads.is_empty() {
                println!("No respawns recorded ({})", store.state_path().display());
                return Ok(());
            }
            println!("{:<24} {:>5}  {:<8} LAST RESPAWN", "BEAD", "COUNT", "STATE");
            for record in snapshot.beads.values() {
                let state = if record.is_blocked() { "blocked" } else { "ok" };
                println!(
                    "{:<24} {:>5}  {:<8} {}",
                    record.bead_id,
                    record.count,
                    state,
                    record.last_respawn.format("%Y-%m-%d %H:%M:%S UTC")
                );
            }
            Ok(())
        }
    }
}

fn render_bead(report: &BeadReport<'_>, format: Option<OutputFormat>) -> anyhow::Result<()> {
    match resolve_format(format) {
        OutputFormat::Json => print_json(report),
        OutputFormat::Text => {
            println!(
                "{} count={} blocked={}",
                report.bead_id, report.count, report.blocked
            );
            Ok(())
        }
        OutputFormat::Pretty => {
            let state = if report.blocked { "BLOCKED" } else { "ok" };
            println!(
                "{}: {state} ({}/{} respawns)",
                report.bead_id, report.count, report.threshold
            );
            Ok(())
        }
    }
}

fn check(bead_id: &str, args: &RespawnArgs) -> anyhow::Result<()> {
    let store = args.store()?;
    let blocked = store.should_block(bead_id).logged("should_block", bead_id);
    let count = store.snapshot().logged("snapshot", bead_id).count(bead_id);
    render_bead(
        &BeadReport {
            bead_id,
            count,
            threshold: RESPAWN_THRESHOLD,
            blocked,
        },
        args.format,
    )
}

fn record(bead_id: &str, args: &RespawnArgs) -> anyhow::Result<()> {
    let store = args.store()?;
    let count = store.record_respawn(bead_id).logged("record_respawn", bead_id);
    render_bead(
        &BeadReport {
            bead_id,
            count,
            threshold: RESPAWN_THRESHOLD,
            blocked: count >= RESPAWN_THRESHOLD,
        },
        args.format,
    )
}

fn reset(bead_id: &str, yes: bool, args: &RespawnArgs) -> anyhow::Result<()> {
    if !confirm(&format!("Reset respawn history for {bead_id}?"), yes)? {
        return Err(ExitError::Other(format!(
            "reset of {bead_id} not confirmed (pass --yes in non-interactive mode)"
        ))
        .into());
    }
    let store = args.store()?;
    let outcome = store.reset(bead_id);
    if let Some(err) = outcome.warning {
        // An operator reset that did not reach disk did nothing.
        return Err(ExitError::State(err).into());
    }
    let existed = outcome.value;
    match resolve_format(args.format) {
        OutputFormat::Json => print_json(&serde_json::json!({
            "bead_id": bead_id,
            "reset": existed,
        })),
        OutputFormat::Pretty | OutputFormat::Text => {
            if existed {
                println!("{bead_id}: respawn history cleared");
            } else {
                println!("{bead_id}: no respawn history");
            }
            Ok(())
        }
    }
}
