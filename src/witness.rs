//! Inbox processing and respawn gating for one witness process.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Serialize;

use crate::dedup::MessageDeduplicator;
use crate::protocol::payload::{
    parse_help, parse_lifecycle_shutdown, parse_merge_failed, parse_merge_ready, parse_merged,
    parse_polecat_done, parse_swarm_start,
};
use crate::protocol::{
    HelpPayload, LifecycleShutdownPayload, MergeFailedPayload, MergeReadyPayload, MergedPayload,
    ParseError, PolecatDonePayload, ProtocolMessage, ProtocolType, SwarmStartPayload, classify,
};
use crate::respawn::{RESPAWN_THRESHOLD, RespawnStore};

/// Supplies inbox messages. Delivery, retry, and storage belong to the implementor.
pub trait MailSource {
    fn fetch(&self) -> anyhow::Result<Vec<ProtocolMessage>>;
}

/// Mail source backed by a JSON array of messages on disk.
#[derive(Debug, Clone)]
pub struct JsonFileMailbox {
    path: PathBuf,
}

impl JsonFileMailbox {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl MailSource for JsonFileMailbox {
    fn fetch(&self) -> anyhow::Result<Vec<ProtocolMessage>> {
        let contents = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading {}", self.path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("parsing messages in {}", self.path.display()))
    }
}

/// A classified, parsed inbox message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Inbound {
    PolecatDone(PolecatDonePayload),
    LifecycleShutdown(LifecycleShutdownPayload),
    Help(HelpPayload),
    Merged(MergedPayload),
    MergeFailed(MergeFailedPayload),
    MergeReady(MergeReadyPayload),
    Handoff { subject: String, body: String },
    SwarmStart(SwarmStartPayload),
    Unknown { subject: String },
    Malformed { subject: String, error: String },
}

impl Inbound {
    pub const fn protocol_type(&self) -> ProtocolType {
        match self {
            Self::PolecatDone(_) => ProtocolType::PolecatDone,
            Self::LifecycleShutdown(_) => ProtocolType::LifecycleShutdown,
            Self::Help(_) => ProtocolType::Help,
            Self::Merged(_) => ProtocolType::Merged,
            Self::MergeFailed(_) => ProtocolType::MergeFailed,
            Self::MergeReady(_) => ProtocolType::MergeReady,
            Self::Handoff { .. } => ProtocolType::Handoff,
            Self::SwarmStart(_) => ProtocolType::SwarmStart,
            Self::Unknown { .. } | Self::Malformed { .. } => ProtocolType::Unknown,
        }
    }
}

/// Classify and parse a message without deduplication.
pub fn decode(subject: &str, body: &str) -> Inbound {
    let parsed: Result<Inbound, ParseError> = match classify(subject) {
        ProtocolType::PolecatDone => parse_polecat_done(subject, body).map(Inbound::PolecatDone),
        ProtocolType::LifecycleShutdown => {
            parse_lifecycle_shutdown(subject, body).map(Inbound::LifecycleShutdown)
        }
        ProtocolType::Help => parse_help(subject, body).map(Inbound::Help),
        ProtocolType::Merged => parse_merged(subject, body).map(Inbound::Merged),
        ProtocolType::MergeFailed => parse_merge_failed(subject, body).map(Inbound::MergeFailed),
        ProtocolType::MergeReady => parse_merge_ready(subject, body).map(Inbound::MergeReady),
        ProtocolType::SwarmStart => parse_swarm_start(subject, body).map(Inbound::SwarmStart),
        ProtocolType::Handoff => Ok(Inbound::Handoff {
            subject: subject.to_string(),
            body: body.to_string(),
        }),
        ProtocolType::Unknown => Ok(Inbound::Unknown {
            subject: subject.to_string(),
        }),
    };
    parsed.unwrap_or_else(|e| Inbound::Malformed {
        subject: subject.to_string(),
        error: e.to_string(),
    })
}

/// Outcome of a gated respawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RespawnDecision {
    /// Threshold reached; dispatch was not attempted.
    Blocked { count: u32 },
    /// Dispatch was attempted and recorded.
    Dispatched { count: u32 },
}

pub struct Witness {
    dedup: MessageDeduplicator,
    respawns: RespawnStore,
}

impl Witness {
    pub fn new(respawns: RespawnStore) -> Self {
        Self {
            dedup: MessageDeduplicator::new(),
            respawns,
        }
    }

    pub const fn respawns(&self) -> &RespawnStore {
        &self.respawns
    }

    /// Decode a message unless it was already handled. Duplicates yield None.
    pub fn process(&self, msg: &ProtocolMessage) -> Option<Inbound> {
        if self.dedup.already_processed(&msg.id) {
            return None;
        }
        let inbound = decode(&msg.subject, &msg.body);
        if let Inbound::Help(help) = &inbound {
            tracing::info!(
                topic = %help.topic,
                category = %help.assessment.category,
                severity = %help.assessment.severity,
                suggest_to = %help.assessment.suggest_to,
                "help request triaged"
            );
        }
        Some(inbound)
    }

    /// Drain a mail source, returning decoded messages that were not duplicates.
    pub fn poll(&self, source: &dyn MailSource) -> anyhow::Result<Vec<Inbound>> {
        let messages = source.fetch()?;
        Ok(messages.iter().filter_map(|m| self.process(m)).collect())
    }

    /// Re-dispatch a bead through the circuit breaker.
    ///
    /// `dispatch` runs only when the bead is not blocked. The respawn is
    /// recorded once dispatch has been attempted, even if it returned an error;
    /// the error is then propagated.
    pub fn respawn_with<E>(
        &self,
        bead_id: &str,
        dispatch: impl FnOnce() -> Result<(), E>,
    ) -> Result<RespawnDecision, E> {
        if self.respawns.should_block(bead_id).logged("should_block", bead_id) {
            let count = self
                .respawns
                .snapshot()
                .logged("snapshot", bead_id)
                .count(bead_id)
                .max(RESPAWN_THRESHOLD);
            tracing::warn!(bead_id, count, "respawn blocked by circuit breaker");
            return Ok(RespawnDecision::Blocked { count });
        }

        let result = dispatch();
        let count = self
            .respawns
            .record_respawn(bead_id)
            .logged("record_respawn", bead_id);
        result.map(|()| RespawnDecision::Dispatched { count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::HelpCategory;

    struct FixedMailbox(Vec<ProtocolMessage>);

    impl MailSource for FixedMailbox {
        fn fetch(&self) -> anyhow::Result<Vec<ProtocolMessage>> {
            Ok(self.0.clone())
        }
    }

    fn witness(dir: &Path) -> Witness {
        Witness::new(RespawnStore::new(dir))
    }

    #[test]
    fn process_decodes_each_kind() {
        let dir = tempfile::tempdir().unwrap();
        let w = witness(dir.path());

        let done = w
            .process(&ProtocolMessage::new("POLECAT_DONE nux", "Exit: COMPLETED", "1"))
            .unwrap();
        assert!(matches!(done, Inbound::PolecatDone(ref p) if p.exit == "COMPLETED"));

        let help = w
            .process(&ProtocolMessage::new("HELP: db", "Problem: data corruption", "2"))
            .unwrap();
        match help {
            Inbound::Help(p) => assert_eq!(p.assessment.category, HelpCategory::Emergency),
            other => panic!("expected help, got {other:?}"),
        }

        let handoff = w.process(&ProtocolMessage::new("🤝 HANDOFF", "notes", "3")).unwrap();
        assert_eq!(handoff.protocol_type(), ProtocolType::Handoff);

        let unknown = w.process(&ProtocolMessage::new("lunch?", "", "4")).unwrap();
        assert_eq!(unknown, Inbound::Unknown { subject: "lunch?".into() });
    }

    #[test]
    fn duplicates_are_dropped_but_empty_ids_are_not() {
        let dir = tempfile::tempdir().unwrap();
        let w = witness(dir.path());
        let msg = ProtocolMessage::new("MERGED nux", "", "m-1");
        assert!(w.process(&msg).is_some());
        assert!(w.process(&msg).is_none());

        let anon = ProtocolMessage::new("MERGED nux", "", "");
        assert!(w.process(&anon).is_some());
        assert!(w.process(&anon).is_some());
    }

    #[test]
    fn poll_skips_duplicates_across_batches() {
        let dir = tempfile::tempdir().unwrap();
        let w = witness(dir.path());
        let mailbox = FixedMailbox(vec![
            ProtocolMessage::new("MERGE_READY nux", "Branch: b", "a"),
            ProtocolMessage::new("MERGE_READY nux", "Branch: b", "a"),
            ProtocolMessage::new("SWARM_START", "Beads: gt-1,gt-2", "b"),
        ]);
        assert_eq!(w.poll(&mailbox).unwrap().len(), 2);
        assert!(w.poll(&mailbox).unwrap().is_empty());
    }

    #[test]
    fn json_file_mailbox_reads_messages() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox.json");
        std::fs::write(
            &path,
            r#"[{"subject":"POLECAT_DONE nux","body":"Exit: DEFERRED","id":"x"},{"subject":"hi"}]"#,
        )
        .unwrap();
        let messages = JsonFileMailbox::new(&path).fetch().unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].id, "");
    }

    #[test]
    fn respawn_gate_blocks_after_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let w = witness(dir.path());
        let mut dispatched = 0;
        for expected in 1..=3 {
            let decision = w
                .respawn_with("gt-1", || -> Result<(), ()> {
                    dispatched += 1;
                    Ok(())
                })
                .unwrap();
            assert_eq!(decision, RespawnDecision::Dispatched { count: expected });
        }
        let decision = w
            .respawn_with("gt-1", || -> Result<(), ()> {
                dispatched += 1;
                Ok(())
            })
            .unwrap();
        assert_eq!(decision, RespawnDecision::Blocked { count: 3 });
        assert_eq!(dispatched, 3);
    }

    #[test]
    fn workdir_store_points_at_town_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("mayor")).unwrap();
        std::fs::write(dir.path().join(crate::workspace::TOWN_MARKER), "{}").unwrap();
        let nested = dir.path().join("gastown/polecats/nux");
        std::fs::create_dir_all(&nested).unwrap();

        let locator = crate::workspace::MarkerLocator::unbounded();
        let w = Witness::new(RespawnStore::for_workdir(&locator, &nested));
        assert_eq!(
            w.respawns().state_path(),
            dir.path().canonicalize().unwrap().join(crate::respawn::STATE_FILE)
        );
    }

    #[test]
    fn failed_dispatch_still_counts() {
        let dir = tempfile::tempdir().unwrap();
        let w = witness(dir.path());
        let err = w.respawn_with("gt-2", || Err("spawn failed")).unwrap_err();
        assert_eq!(err, "spawn failed");
        assert_eq!(w.respawns().snapshot().value.count("gt-2"), 1);
    }

    #[test]
    fn inbound_serializes_with_type_tag() {
        let inbound = decode("MERGE_FAILED nux", "FailureType: conflict");
        let json = serde_json::to_value(&inbound).unwrap();
        assert_eq!(json["type"], "merge_failed");
        assert_eq!(json["failure_type"], "conflict");
    }
}
