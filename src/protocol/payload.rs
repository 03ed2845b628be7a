//! Typed payloads for protocol messages.
//!
//! Each parser checks the subject against its pattern and then scans the body
//! line by line for `Key: value` pairs. Unknown lines are skipped and missing
//! keys leave their field empty. Only a subject mismatch is an error.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::triage::{HelpAssessment, assess_help};
use super::{ProtocolType, subject_pattern};

/// Body keys the parsers understand.
const KNOWN_KEYS: &[&str] = &[
    "Exit",
    "Issue",
    "MR",
    "Branch",
    "Gate",
    "MRFailed",
    "Agent",
    "Problem",
    "Tried",
    "FailureType",
    "Error",
    "Reason",
    "SwarmID",
    "Beads",
    "Total",
    "Merged-At",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid subject for {expected}: {subject:?}")]
    InvalidSubject {
        expected: ProtocolType,
        subject: String,
    },
}

/// `POLECAT_DONE <name>`: a worker finished (or gave up on) its bead.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolecatDonePayload {
    pub polecat_name: String,
    pub exit: String,
    pub issue_id: String,
    pub mr_id: String,
    pub branch: String,
    pub gate: String,
    pub mr_failed: bool,
    pub error: String,
}

/// `LIFECYCLE:Shutdown <name>`: a worker asks to be torn down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleShutdownPayload {
    pub polecat_name: String,
    pub reason: String,
}

/// `HELP: <topic>`: a worker is stuck and wants escalation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpPayload {
    pub topic: String,
    pub agent: String,
    pub issue_id: String,
    pub problem: String,
    pub tried: String,
    pub assessment: HelpAssessment,
}

/// `MERGED <name>`: the refinery landed a worker's branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergedPayload {
    pub polecat_name: String,
    pub branch: String,
    pub issue_id: String,
    pub merged_at: Option<DateTime<Utc>>,
}

/// `MERGE_FAILED <name>`: the refinery rejected a worker's branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeFailedPayload {
    pub polecat_name: String,
    pub branch: String,
    pub issue_id: String,
    pub failure_type: String,
    pub error: String,
}

/// `MERGE_READY <name>`: a worker's branch is queued for merge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReadyPayload {
    pub polecat_name: String,
    pub branch: String,
    pub issue_id: String,
    pub mr_id: String,
}

/// `SWARM_START`: a batch of beads was dispatched together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwarmStartPayload {
    pub swarm_id: String,
    pub bead_ids: Vec<String>,
    pub total: u32,
}

/// Known `Key: value` pairs scanned out of a message body. Later lines win.
#[derive(Debug, Default)]
struct BodyFields<'a> {
    fields: HashMap<&'static str, &'a str>,
}

impl<'a> BodyFields<'a> {
    fn scan(body: &'a str) -> Self {
        let mut fields = HashMap::new();
        for line in body.lines() {
            let Some((key, value)) = line.trim().split_once(':') else {
                continue;
            };
            let key = key.trim();
            if let Some(known) = KNOWN_KEYS.iter().find(|k| **k == key) {
                fields.insert(*known, value.trim());
            }
        }
        Self { fields }
    }

    fn text(&self, key: &str) -> String {
        self.fields.get(key).map(|v| (*v).to_string()).unwrap_or_default()
    }

    fn flag(&self, key: &str) -> bool {
        self.fields.get(key).is_some_and(|v| *v == "true")
    }

    fn count(&self, key: &str) -> u32 {
        self.fields
            .get(key)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    fn timestamp(&self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.fields.get(key)?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }

    fn list(&self, key: &str) -> Vec<String> {
        self.fields
            .get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Match `subject` against `kind`'s pattern and return the first capture group
/// (or "" for patterns without one).
fn capture_subject(kind: ProtocolType, subject: &str) -> Result<String, ParseError> {
    let invalid = || ParseError::InvalidSubject {
        expected: kind,
        subject: subject.to_string(),
    };
    let re = subject_pattern(kind).ok_or_else(invalid)?;
    let caps = re.captures(subject).ok_or_else(invalid)?;
    Ok(caps
        .get(1)
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default())
}

pub fn parse_polecat_done(subject: &str, body: &str) -> Result<PolecatDonePayload, ParseError> {
    let polecat_name = capture_subject(ProtocolType::PolecatDone, subject)?;
    let f = BodyFields::scan(body);
    Ok(PolecatDonePayload {
        polecat_name,
        exit: f.text("Exit"),
        issue_id: f.text("Issue"),
        mr_id: f.text("MR"),
        branch: f.text("Branch"),
        gate: f.text("Gate"),
        mr_failed: f.flag("MRFailed"),
        error: f.text("Error"),
    })
}

pub fn parse_lifecycle_shutdown(
    subject: &str,
    body: &str,
) -> Result<LifecycleShutdownPayload, ParseError> {
    let polecat_name = capture_subject(ProtocolType::LifecycleShutdown, subject)?;
    let f = BodyFields::scan(body);
    Ok(LifecycleShutdownPayload {
        polecat_name,
        reason: f.text("Reason"),
    })
}

/// Parse a help request and attach its triage assessment.
pub fn parse_help(subject: &str, body: &str) -> Result<HelpPayload, ParseError> {
    let topic = capture_subject(ProtocolType::Help, subject)?;
    let f = BodyFields::scan(body);
    let problem = f.text("Problem");
    let assessment = assess_help(&topic, &problem);
    Ok(HelpPayload {
        topic,
        agent: f.text("Agent"),
        issue_id: f.text("Issue"),
        problem,
        tried: f.text("Tried"),
        assessment,
    })
}

pub fn parse_merged(subject: &str, body: &str) -> Result<MergedPayload, ParseError> {
    let polecat_name = capture_subject(ProtocolType::Merged, subject)?;
    let f = BodyFields::scan(body);
    Ok(MergedPayload {
        polecat_name,
        branch: f.text("Branch"),
        issue_id: f.text("Issue"),
        merged_at: f.timestamp("Merged-At"),
    })
}

pub fn parse_merge_failed(subject: &str, body: &str) -> Result<MergeFailedPayload, ParseError> {
    let polecat_name = capture_subject(ProtocolType::MergeFailed, subject)?;
    let f = BodyFields::scan(body);
    Ok(MergeFailedPayload {
        polecat_name,
        branch: f.text("Branch"),
        issue_id: f.text("Issue"),
        failure_type: f.text("FailureType"),
        error: f.text("Error"),
    })
}

pub fn parse_merge_ready(subject: &str, body: &str) -> Result<MergeReadyPayload, ParseError> {
    let polecat_name = capture_subject(ProtocolType::MergeReady, subject)?;
    let f = BodyFields::scan(body);
    Ok(MergeReadyPayload {
        polecat_name,
        branch: f.text("Branch"),
        issue_id: f.text("Issue"),
        mr_id: f.text("MR"),
    })
}

pub fn parse_swarm_start(subject: &str, body: &str) -> Result<SwarmStartPayload, ParseError> {
    capture_subject(ProtocolType::SwarmStart, subject)?;
    let f = BodyFields::scan(body);
    Ok(SwarmStartPayload {
        swarm_id: f.text("SwarmID"),
        bead_ids: f.list("Beads"),
        total: f.count("Total"),
    })
}
