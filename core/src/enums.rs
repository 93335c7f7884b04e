//! Enum types shared across the mnemo runtime

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The discriminant of a memory record, fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Episodic,
    Semantic,
    Procedural,
}

impl fmt::Display for MemoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            MemoryKind::Episodic => "episodic",
            MemoryKind::Semantic => "semantic",
            MemoryKind::Procedural => "procedural",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for MemoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "episodic" => Ok(MemoryKind::Episodic),
            "semantic" => Ok(MemoryKind::Semantic),
            "procedural" => Ok(MemoryKind::Procedural),
            _ => Err(format!("invalid memory kind: {}", s)),
        }
    }
}

/// The retrieval strategy requested of the query planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    #[default]
    Standard,
    Explore,
    Connect,
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            RetrievalMode::Standard => "standard",
            RetrievalMode::Explore => "explore",
            RetrievalMode::Connect => "connect",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "standard" => Ok(RetrievalMode::Standard),
            "explore" => Ok(RetrievalMode::Explore),
            "connect" => Ok(RetrievalMode::Connect),
            _ => Err(format!("invalid retrieval mode: {}", s)),
        }
    }
}

/// A structured reason the admission controller declined a store. Not an
/// error: callers may retry with modified content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionRejection {
    TooSimilar,
    DomainSaturated,
    BelowFloor,
}

impl fmt::Display for AdmissionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            AdmissionRejection::TooSimilar => "too_similar",
            AdmissionRejection::DomainSaturated => "domain_saturated",
            AdmissionRejection::BelowFloor => "below_floor",
        };
        write!(f, "{}", value)
    }
}

/// Lifecycle state of a cognition, per the evaluation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CognitionState {
    #[default]
    Parsed,
    Ready,
    Running,
    Suspended,
    Done,
}

impl fmt::Display for CognitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            CognitionState::Parsed => "parsed",
            CognitionState::Ready => "ready",
            CognitionState::Running => "running",
            CognitionState::Suspended => "suspended",
            CognitionState::Done => "done",
        };
        write!(f, "{}", value)
    }
}

/// Terminal outcome of a cognition, reported to the submitting caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CognitionOutcome {
    Success,
    Clarify,
    Error,
    Cancelled,
}

impl fmt::Display for CognitionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            CognitionOutcome::Success => "success",
            CognitionOutcome::Clarify => "clarify",
            CognitionOutcome::Error => "error",
            CognitionOutcome::Cancelled => "cancelled",
        };
        write!(f, "{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_kind_roundtrips_through_display_and_from_str() {
        for kind in [
            MemoryKind::Episodic,
            MemoryKind::Semantic,
            MemoryKind::Procedural,
        ] {
            let s = kind.to_string();
            assert_eq!(s.parse::<MemoryKind>().unwrap(), kind);
        }
    }

    #[test]
    fn retrieval_mode_defaults_to_standard() {
        assert_eq!(RetrievalMode::default(), RetrievalMode::Standard);
    }

    #[test]
    fn admission_rejection_displays_snake_case() {
        assert_eq!(AdmissionRejection::TooSimilar.to_string(), "too_similar");
        assert_eq!(
            AdmissionRejection::DomainSaturated.to_string(),
            "domain_saturated"
        );
        assert_eq!(AdmissionRejection::BelowFloor.to_string(), "below_floor");
    }

    #[test]
    fn memory_kind_rejects_unknown_token() {
        assert!("graph".parse::<MemoryKind>().is_err());
    }
}
