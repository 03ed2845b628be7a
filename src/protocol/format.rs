//! Builders for outbound protocol mail.
//!
//! Bodies use the same `Key: value` lines the parsers read; empty fields are
//! omitted. Line breaks inside values are flattened to spaces so a value can
//! never start a line of its own.

use chrono::{DateTime, SecondsFormat, Utc};

use super::payload::{
    MergeFailedPayload, MergeReadyPayload, MergedPayload, PolecatDonePayload, SwarmStartPayload,
};

/// Subject and body of a message ready for the mail collaborator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub subject: String,
    pub body: String,
}

fn single_line(value: &str) -> String {
    value.replace("\r\n", " ").replace(['\r', '\n'], " ")
}

#[derive(Default)]
struct BodyBuilder {
    lines: Vec<String>,
}

impl BodyBuilder {
    fn field(mut self, key: &str, value: &str) -> Self {
        if !value.is_empty() {
            self.lines.push(format!("{key}: {}", single_line(value)));
        }
        self
    }

    fn build(self) -> String {
        self.lines.join("\n")
    }
}

pub fn polecat_done(p: &PolecatDonePayload) -> OutboundMessage {
    let mut body = BodyBuilder::default()
        .field("Exit", &p.exit)
        .field("Issue", &p.issue_id)
        .field("MR", &p.mr_id)
        .field("Branch", &p.branch)
        .field("Gate", &p.gate);
    if p.mr_failed {
        body = body.field("MRFailed", "true");
    }
    OutboundMessage {
        subject: format!("POLECAT_DONE {}", p.polecat_name),
        body: body.field("Error", &p.error).build(),
    }
}

pub fn help(topic: &str, agent: &str, issue_id: &str, problem: &str, tried: &str) -> OutboundMessage {
    OutboundMessage {
        subject: format!("HELP: {}", single_line(topic)),
        body: BodyBuilder::default()
            .field("Agent", agent)
            .field("Issue", issue_id)
            .field("Problem", problem)
            .field("Tried", tried)
            .build(),
    }
}

pub fn merge_ready(p: &MergeReadyPayload) -> OutboundMessage {
    OutboundMessage {
        subject: format!("MERGE_READY {}", p.polecat_name),
        body: BodyBuilder::default()
            .field("Branch", &p.branch)
            .field("Issue", &p.issue_id)
            .field("MR", &p.mr_id)
            .build(),
    }
}

pub fn merged(p: &MergedPayload) -> OutboundMessage {
    let merged_at = p
        .merged_at
        .map(|t: DateTime<Utc>| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();
    OutboundMessage {
        subject: format!("MERGED {}", p.polecat_name),
        body: BodyBuilder::default()
            .field("Branch", &p.branch)
            .field("Issue", &p.issue_id)
            .field("Merged-At", &merged_at)
            .build(),
    }
}

pub fn merge_failed(p: &MergeFailedPayload) -> OutboundMessage {
    OutboundMessage {
        subject: format!("MERGE_FAILED {}", p.polecat_name),
        body: BodyBuilder::default()
            .field("Branch", &p.branch)
            .field("Issue", &p.issue_id)
            .field("FailureType", &p.failure_type)
            .field("Error", &p.error)
            .build(),
    }
}

pub fn swarm_start(p: &SwarmStartPayload) -> OutboundMessage {
    let total = if p.total == 0 {
        String::new()
    } else {
        p.total.to_string()
    };
    OutboundMessage {
        subject: "SWARM_START".to_string(),
        body: BodyBuilder::default()
            .field("SwarmID", &p.swarm_id)
            .field("Beads", &p.bead_ids.join(","))
            .field("Total", &total)
            .build(),
    }
}

/// Handoff note a worker leaves for its successor session.
pub fn handoff(summary: &str, notes: &str) -> OutboundMessage {
    let subject = if summary.is_empty() {
        "🤝 HANDOFF".to_string()
    } else {
        format!("🤝 HANDOFF: {}", single_line(summary))
    };
    OutboundMessage {
        subject,
        body: notes.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::payload::{parse_help, parse_merged, parse_polecat_done};
    use crate::protocol::{ProtocolType, classify};

    #[test]
    fn polecat_done_reads_back() {
        let original = PolecatDonePayload {
            polecat_name: "nux".into(),
            exit: "ESCALATED".into(),
            issue_id: "gt-7".into(),
            mr_failed: true,
            error: "gate failed: lint".into(),
            ..Default::default()
        };
        let msg = polecat_done(&original);
        assert_eq!(msg.subject, "POLECAT_DONE nux");
        assert!(!msg.body.contains("Branch:"));
        let parsed = parse_polecat_done(&msg.subject, &msg.body).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn help_message_is_classified_and_triaged() {
        let msg = help("tests hang", "gastown/polecats/nux", "gt-3", "integration suite timed out", "");
        assert_eq!(classify(&msg.subject), ProtocolType::Help);
        let parsed = parse_help(&msg.subject, &msg.body).unwrap();
        assert_eq!(parsed.problem, "integration suite timed out");
        assert_eq!(parsed.tried, "");
    }

    #[test]
    fn multi_line_values_cannot_forge_fields() {
        let msg = help(
            "disk\nfilling",
            "gastown/polecats/nux",
            "gt-1",
            "line one\nIssue: gt-evil\r\nline three",
            "",
        );
        assert_eq!(msg.subject, "HELP: disk filling");
        assert_eq!(msg.body.lines().count(), 3);

        let parsed = parse_help(&msg.subject, &msg.body).unwrap();
        assert_eq!(parsed.topic, "disk filling");
        assert_eq!(parsed.issue_id, "gt-1");
        assert_eq!(parsed.problem, "line one Issue: gt-evil line three");
    }

    #[test]
    fn merged_timestamp_survives() {
        let at = DateTime::parse_from_rfc3339("2025-06-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let msg = merged(&MergedPayload {
            polecat_name: "slit".into(),
            merged_at: Some(at),
            ..Default::default()
        });
        assert!(msg.body.contains("Merged-At: 2025-06-01T08:00:00Z"));
        assert_eq!(parse_merged(&msg.subject, &msg.body).unwrap().merged_at, Some(at));
    }

    #[test]
    fn handoff_subjects_classify() {
        assert_eq!(classify(&handoff("", "").subject), ProtocolType::Handoff);
        assert_eq!(classify(&handoff("context full", "next: run tests").subject), ProtocolType::Handoff);
    }

    #[test]
    fn swarm_start_body() {
        let msg = swarm_start(&SwarmStartPayload {
            swarm_id: "sw-2".into(),
            bead_ids: vec!["gt-1".into(), "gt-2".into()],
            total: 2,
        });
        assert_eq!(msg.body, "SwarmID: sw-2\nBeads: gt-1,gt-2\nTotal: 2");
        assert_eq!(classify(&msg.subject), ProtocolType::SwarmStart);
    }
}
