//! Mailbox protocol spoken between workers and the witness.
//!
//! Workers report status by mail. The subject line carries the message kind
//! (and usually the sender's name); the body is an informal list of
//! `Key: value` lines. This module turns subjects into [`ProtocolType`]s,
//! bodies into typed payloads, and help requests into triage assessments.

pub mod format;
pub mod payload;
pub mod triage;

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use payload::{
    HelpPayload, LifecycleShutdownPayload, MergeFailedPayload, MergeReadyPayload, MergedPayload,
    ParseError, PolecatDonePayload, SwarmStartPayload,
};
pub use triage::{HelpAssessment, HelpCategory, HelpSeverity, assess_help};

/// A raw message pulled from a worker's inbox.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolMessage {
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default, alias = "messageID", alias = "message_id")]
    pub id: String,
}

impl ProtocolMessage {
    pub fn new(subject: impl Into<String>, body: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            body: body.into(),
            id: id.into(),
        }
    }

    pub fn protocol_type(&self) -> ProtocolType {
        classify(&self.subject)
    }
}

/// Kind of a protocol message, derived from its subject line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolType {
    PolecatDone,
    LifecycleShutdown,
    Help,
    Merged,
    MergeFailed,
    MergeReady,
    Handoff,
    SwarmStart,
    Unknown,
}

impl ProtocolType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PolecatDone => "polecat_done",
            Self::LifecycleShutdown => "lifecycle_shutdown",
            Self::Help => "help",
            Self::Merged => "merged",
            Self::MergeFailed => "merge_failed",
            Self::MergeReady => "merge_ready",
            Self::Handoff => "handoff",
            Self::SwarmStart => "swarm_start",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

pub(crate) const POLECAT_DONE_PATTERN: &str = r"^POLECAT_DONE\s+(\S+)";
pub(crate) const LIFECYCLE_SHUTDOWN_PATTERN: &str = r"^LIFECYCLE:Shutdown\s+(\S+)";
pub(crate) const HELP_PATTERN: &str = r"^HELP:\s+(.+)";
pub(crate) const MERGED_PATTERN: &str = r"^MERGED\s+(\S+)";
pub(crate) const MERGE_FAILED_PATTERN: &str = r"^MERGE_FAILED\s+(\S+)";
pub(crate) const MERGE_READY_PATTERN: &str = r"^MERGE_READY\s+(\S+)";
pub(crate) const HANDOFF_PATTERN: &str = r"^🤝\s*HANDOFF";
pub(crate) const SWARM_START_PATTERN: &str = r"^SWARM_START(?:\s|$)";

/// Subject patterns in priority order. First match wins.
static SUBJECT_PATTERNS: LazyLock<Vec<(ProtocolType, Regex)>> = LazyLock::new(|| {
    [
        (ProtocolType::PolecatDone, POLECAT_DONE_PATTERN),
        (ProtocolType::LifecycleShutdown, LIFECYCLE_SHUTDOWN_PATTERN),
        (ProtocolType::Help, HELP_PATTERN),
        (ProtocolType::Merged, MERGED_PATTERN),
        (ProtocolType::MergeFailed, MERGE_FAILED_PATTERN),
        (ProtocolType::MergeReady, MERGE_READY_PATTERN),
        (ProtocolType::Handoff, HANDOFF_PATTERN),
        (ProtocolType::SwarmStart, SWARM_START_PATTERN),
    ]
    .into_iter()
    .map(|(kind, pattern)| {
        let re = Regex::new(pattern).expect("subject patterns are valid regexes");
        (kind, re)
    })
    .collect()
});

/// Classify a subject line. Anything unrecognized (including "") is `Unknown`.
pub fn classify(subject: &str) -> ProtocolType {
    let kind = SUBJECT_PATTERNS
        .iter()
        .find(|(_, re)| re.is_match(subject))
        .map_or(ProtocolType::Unknown, |(kind, _)| *kind);
    tracing::debug!(subject, kind = kind.as_str(), "classified message");
    kind
}

/// Regex for one protocol type's subject, if it has one.
pub(crate) fn subject_pattern(kind: ProtocolType) -> Option<&'static Regex> {
    SUBJECT_PATTERNS
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, re)| re)
}
