//! Help-request triage.
//!
//! Keyword groups are checked in priority order; the first group with any
//! keyword contained in the lower-cased `topic + problem` text decides the
//! category. Matching is plain substring containment, so incidental hits
//! inside unrelated words are possible.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Handler that receives help requests no keyword group claims.
pub const DEFAULT_HELP_TARGET: &str = "deacon";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelpCategory {
    Decision,
    Help,
    Blocked,
    Failed,
    Emergency,
    Lifecycle,
}

impl HelpCategory {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Help => "help",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
            Self::Emergency => "emergency",
            Self::Lifecycle => "lifecycle",
        }
    }

    /// Fixed escalation target for this category.
    pub const fn target(self) -> &'static str {
        match self {
            Self::Emergency => "overseer",
            Self::Blocked | Self::Decision => "mayor",
            Self::Lifecycle => "witness",
            Self::Failed | Self::Help => DEFAULT_HELP_TARGET,
        }
    }
}

impl fmt::Display for HelpCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HelpSeverity {
    Medium,
    High,
    Critical,
}

impl HelpSeverity {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for HelpSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpAssessment {
    pub category: HelpCategory,
    pub severity: HelpSeverity,
    pub suggest_to: String,
    pub rationale: String,
}

struct KeywordGroup {
    category: HelpCategory,
    severity: HelpSeverity,
    keywords: &'static [&'static str],
}

/// Priority order: emergency, failed, blocked, decision, lifecycle.
const KEYWORD_GROUPS: &[KeywordGroup] = &[
    KeywordGroup {
        category: HelpCategory::Emergency,
        severity: HelpSeverity::Critical,
        keywords: &[
            "security",
            "vulnerability",
            "exposed secret",
            "leaked",
            "credential",
            "breach",
            "corruption",
            "corrupted",
            "data loss",
            "outage",
            "production down",
            "prod down",
        ],
    },
    KeywordGroup {
        category: HelpCategory::Failed,
        severity: HelpSeverity::High,
        keywords: &[
            "crash",
            "panic",
            "segfault",
            "error",
            "exception",
            "fatal",
            "out of memory",
            "oom-kill",
            "oom killer",
            "disk full",
            "no space left",
            "quota exceeded",
        ],
    },
    KeywordGroup {
        category: HelpCategory::Blocked,
        severity: HelpSeverity::High,
        keywords: &[
            "blocked",
            "dependency",
            "waiting on",
            "waiting for",
            "merge conflict",
            "conflict",
            "deadlock",
            "cannot proceed",
            "can't proceed",
        ],
    },
    KeywordGroup {
        category: HelpCategory::Decision,
        severity: HelpSeverity::Medium,
        keywords: &[
            "which approach",
            "should i",
            "decide",
            "decision",
            "ambiguous",
            "unclear requirement",
            "architecture",
            "design choice",
            "trade-off",
            "tradeoff",
        ],
    },
    KeywordGroup {
        category: HelpCategory::Lifecycle,
        severity: HelpSeverity::Medium,
        keywords: &[
            "session",
            "zombie",
            "timeout",
            "timed out",
            "hung",
            "unresponsive",
            "respawn",
            "context limit",
            "handoff",
        ],
    },
];

/// Assess a help request by keyword scan over its topic and problem text.
pub fn assess_help(topic: &str, problem: &str) -> HelpAssessment {
    let text = format!("{topic} {problem}").to_lowercase();

    for group in KEYWORD_GROUPS {
        if let Some(keyword) = group.keywords.iter().find(|k| text.contains(*k)) {
            return HelpAssessment {
                category: group.category,
                severity: group.severity,
                suggest_to: group.category.target().to_string(),
                rationale: format!(
                    "matched keyword {keyword:?} ({} / {})",
                    group.category, group.severity
                ),
            };
        }
    }

    HelpAssessment {
        category: HelpCategory::Help,
        severity: HelpSeverity::Medium,
        suggest_to: DEFAULT_HELP_TARGET.to_string(),
        rationale: "no keywords matched; routing to default handler".to_string(),
    }
}
