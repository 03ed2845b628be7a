use std::path::PathBuf;

use anyhow::Context;
use clap::Args;

use super::{OutputFormat, print_json, resolve_format};
use crate::error::ExitError;
use crate::protocol::{HelpAssessment, ProtocolType, assess_help, classify};
use crate::respawn::RespawnStore;
use crate::witness::{Inbound, JsonFileMailbox, Witness, decode};
use crate::workspace::MarkerLocator;

#[derive(Debug, Args)]
pub struct ClassifyArgs {
    /// Message subject line
    pub subject: String,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl ClassifyArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let kind = classify(&self.subject);
        match resolve_format(self.format) {
            OutputFormat::Json => print_json(&serde_json::json!({
                "subject": self.subject,
                "type": kind,
            })),
            OutputFormat::Pretty | OutputFormat::Text => {
                println!("{kind}");
                Ok(())
            }
        }
    }
}

#[derive(Debug, Args)]
pub struct ParseArgs {
    /// Message subject line
    #[arg(long)]
    pub subject: String,
    /// Message body
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,
    /// Read the message body from a file
    #[arg(long)]
    pub body_file: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl ParseArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let body = match (&self.body, &self.body_file) {
            (Some(body), _) => body.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?,
            (None, None) => String::new(),
        };

        let inbound = decode(&self.subject, &body);
        if let Inbound::Unknown { subject } = &inbound {
            return Err(ExitError::new(5, format!("unrecognized subject: {subject:?}")).into());
        }

        match resolve_format(self.format) {
            OutputFormat::Json | OutputFormat::Text => print_json(&inbound),
            OutputFormat::Pretty => {
                println!("{}", inbound.protocol_type());
                print_json(&inbound)
            }
        }
    }
}

#[derive(Debug, Args)]
pub struct AssessArgs {
    /// Help topic (the text after `HELP:`)
    pub topic: String,
    /// Problem description
    #[arg(default_value = "")]
    pub problem: String,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl AssessArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let assessment = assess_help(&self.topic, &self.problem);
        render_assessment(&assessment, resolve_format(self.format))
    }
}

fn render_assessment(a: &HelpAssessment, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(a),
        OutputFormat::Text => {
            println!(
                "category={} severity={} suggest_to={}",
                a.category, a.severity, a.suggest_to
            );
            Ok(())
        }
        OutputFormat::Pretty => {
            println!("Category:   {}", a.category);
            println!("Severity:   {}", a.severity);
            println!("Escalate:   {}", a.suggest_to);
            println!("Rationale:  {}", a.rationale);
            Ok(())
        }
    }
}

#[derive(Debug, Args)]
pub struct InboxArgs {
    /// JSON file holding an array of {subject, body, id} messages
    pub file: PathBuf,
    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,
}

impl InboxArgs {
    pub fn execute(&self) -> anyhow::Result<()> {
        let cwd = std::env::current_dir().context("could not determine current directory")?;
        let witness = Witness::new(RespawnStore::for_workdir(&MarkerLocator::new(), &cwd));
        let mailbox = JsonFileMailbox::new(&self.file);
        let handled = witness.poll(&mailbox)?;

        match resolve_format(self.format) {
            OutputFormat::Json => print_json(&handled),
            OutputFormat::Text => {
                for inbound in &handled {
                    println!("{}", serde_json::to_string(inbound)?);
                }
                Ok(())
            }
            OutputFormat::Pretty => {
                for inbound in &handled {
                    println!("{}", summarize(inbound));
                }
                println!("{} message(s) handled", handled.len());
                Ok(())
            }
        }
    }
}

fn summarize(inbound: &Inbound) -> String {
    match inbound {
        Inbound::PolecatDone(p) => format!("{:<18} {} exit={} issue={}", ProtocolType::PolecatDone, p.polecat_name, p.exit, p.issue_id),
        Inbound::LifecycleShutdown(p) => format!("{:<18} {} {}", ProtocolType::LifecycleShutdown, p.polecat_name, p.reason),
        Inbound::Help(p) => format!(
            "{:<18} {} [{} / {} -> {}]",
            ProtocolType::Help, p.topic, p.assessment.category, p.assessment.severity, p.assessment.suggest_to
        ),
        Inbound::Merged(p) => format!("{:<18} {} branch={}", ProtocolType::Merged, p.polecat_name, p.branch),
        Inbound::MergeFailed(p) => format!("{:<18} {} {}: {}", ProtocolType::MergeFailed, p.polecat_name, p.failure_type, p.error),
        Inbound::MergeReady(p) => format!("{:<18} {} branch={}", ProtocolType::MergeReady, p.polecat_name, p.branch),
        Inbound::Handoff { subject, .. } => format!("{:<18} {subject}", ProtocolType::Handoff),
        Inbound::SwarmStart(p) => format!("{:<18} {} beads={}", ProtocolType::SwarmStart, p.swarm_id, p.bead_ids.join(",")),
        Inbound::Unknown { subject } => format!("{:<18} {subject}", ProtocolType::Unknown),
        Inbound::Malformed { subject, error } => format!("{:<18} {subject}: {error}", "malformed"),
    }
}
