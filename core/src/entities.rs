//! Core entity structures

use crate::embedding::EmbeddingVector;
use crate::enums::{CognitionOutcome, MemoryKind};
use crate::identity::{AgentId, CognitionId, MemoryId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::time::Duration;

/// Episodic-kind fields: a remembered event tied to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodicPayload {
    pub session_id: String,
    pub context: Map<String, Value>,
    pub emotion: Option<String>,
    pub outcome: Option<String>,
    /// Scoring field, range [0,1], default 0.5.
    pub importance: f32,
}

/// Semantic-kind fields: a concept/definition pair, globally shared
/// when `agent_id` on the owning record is `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticPayload {
    pub concept: String,
    pub definition: String,
    pub domain: String,
    pub relations: Map<String, Value>,
    /// Scoring field, range [0,1], default 0.5.
    pub confidence: f32,
    /// Number of stores merged into this record (for weighted re-averaging).
    pub contributors: u32,
}

/// Procedural-kind fields: a named skill with ordered steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProceduralPayload {
    pub skill_name: String,
    pub domain: String,
    pub procedure: String,
    pub steps: Vec<String>,
    pub prerequisites: BTreeSet<String>,
    /// Scoring field, range [0,1], default 0.5.
    pub success_rate: f32,
    pub usage_count: u32,
}

/// The kind-specific payload of a memory record, a closed sum type over the
/// three memory kinds (episodic, semantic, procedural) rather than dynamic
/// dispatch by string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum MemoryPayload {
    Episodic(EpisodicPayload),
    Semantic(SemanticPayload),
    Procedural(ProceduralPayload),
}

impl MemoryPayload {
    pub fn kind(&self) -> MemoryKind {
        match self {
            MemoryPayload::Episodic(_) => MemoryKind::Episodic,
            MemoryPayload::Semantic(_) => MemoryKind::Semantic,
            MemoryPayload::Procedural(_) => MemoryKind::Procedural,
        }
    }

    /// The scoring field value (`importance`/`confidence`/`success_rate`),
    /// used uniformly by the admission controller and consolidation.
    pub fn score(&self) -> f32 {
        match self {
            MemoryPayload::Episodic(p) => p.importance,
            MemoryPayload::Semantic(p) => p.confidence,
            MemoryPayload::Procedural(p) => p.success_rate,
        }
    }

    pub fn set_score(&mut self, value: f32) {
        match self {
            MemoryPayload::Episodic(p) => p.importance = value,
            MemoryPayload::Semantic(p) => p.confidence = value,
            MemoryPayload::Procedural(p) => p.success_rate = value,
        }
    }

    /// The domain used by admission's saturation check and consolidation's
    /// owner-scoped grouping. Episodic records have no domain field; they
    /// fall back to their session id.
    pub fn domain(&self) -> &str {
        match self {
            MemoryPayload::Episodic(p) => &p.session_id,
            MemoryPayload::Semantic(p) => &p.domain,
            MemoryPayload::Procedural(p) => &p.domain,
        }
    }

    /// The uniqueness key a second store of the same fact collides on:
    /// `(concept, domain)` for semantic, `(skill_name, domain)` for
    /// procedural. Episodic records have no such key and are never merged.
    pub fn merge_key(&self) -> Option<(String, String)> {
        match self {
            MemoryPayload::Episodic(_) => None,
            MemoryPayload::Semantic(p) => Some((p.concept.clone(), p.domain.clone())),
            MemoryPayload::Procedural(p) => Some((p.skill_name.clone(), p.domain.clone())),
        }
    }

    /// Folds a second store of the same key into `self`: confidence/success
    /// rate is re-averaged by contributor/usage weight, relations and
    /// prerequisites are unioned, and the incoming definition/procedure text
    /// wins. `incoming` must be the same variant as `self`.
    pub fn merge_into(&mut self, incoming: MemoryPayload) {
        match (self, incoming) {
            (MemoryPayload::Semantic(existing), MemoryPayload::Semantic(incoming)) => {
                let total = existing.contributors + 1;
                existing.confidence =
                    (existing.confidence * existing.contributors as f32 + incoming.confidence) / total as f32;
                existing.contributors = total;
                existing.definition = incoming.definition;
                existing.relations.extend(incoming.relations);
            }
            (MemoryPayload::Procedural(existing), MemoryPayload::Procedural(incoming)) => {
                let existing_weight = existing.usage_count.max(1);
                let incoming_weight = incoming.usage_count.max(1);
                let total_weight = existing_weight + incoming_weight;
                existing.success_rate = (existing.success_rate * existing_weight as f32
                    + incoming.success_rate * incoming_weight as f32)
                    / total_weight as f32;
                existing.usage_count += incoming.usage_count.max(1);
                existing.procedure = incoming.procedure;
                existing.steps = merge_steps_by_common_prefix(&existing.steps, &incoming.steps);
                existing.prerequisites.extend(incoming.prerequisites);
            }
            (existing, _incoming) => {
                // Episodic has no merge key, so `insert_memory` never
                // reaches here for it; a mismatched pair is a caller bug.
                debug_assert!(false, "merge_into called on mismatched or unkeyed payload variants");
                let _ = existing;
            }
        }
    }
}

/// Merges two ordered step lists: the shared prefix, then any steps unique
/// to either remainder, in the order first seen.
fn merge_steps_by_common_prefix(existing: &[String], incoming: &[String]) -> Vec<String> {
    let prefix_len = existing
        .iter()
        .zip(incoming.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut merged: Vec<String> = existing[..prefix_len].to_vec();
    for step in existing[prefix_len..].iter().chain(incoming[prefix_len..].iter()) {
        if !merged.contains(step) {
            merged.push(step.clone());
        }
    }
    merged
}

/// A stored, retrievable unit of knowledge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: MemoryId,
    /// Owning agent; `None` for semantic/procedural records that are
    /// globally shared.
    pub agent_id: Option<AgentId>,
    pub payload: MemoryPayload,
    /// Present iff the record is queryable by similarity (I2). `None` only
    /// transiently, before the embedding step of `store` completes.
    pub embedding: Option<EmbeddingVector>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub access_count: u64,
    pub last_accessed_at: Option<Timestamp>,
    /// Arbitrary mapping, size-bounded to 10 KB of serialized form.
    pub metadata: Map<String, Value>,
    /// Optimistic-concurrency version, compared-and-swapped on update.
    pub version: u64,
    /// Soft-deleted records are invisible to retrieval but may still be
    /// physically removed later by consolidation.
    pub deleted: bool,
}

impl MemoryRecord {
    pub fn kind(&self) -> MemoryKind {
        self.payload.kind()
    }
}

/// One retrieval result with an associated similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryHit {
    pub id: MemoryId,
    pub kind: MemoryKind,
    pub content: Value,
    pub score: f32,
}

/// Append-only audit log entry for one submitted cognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CognitionRecord {
    pub cognition_id: CognitionId,
    pub il_source: String,
    pub agent_id: AgentId,
    pub submitted_at: Timestamp,
    pub result: CognitionOutcome,
    pub output: Value,
    pub duration_ms: i64,
    pub memories_read: u64,
    pub memories_written: u64,
    /// Error kind and message when `result == Error`; never includes the
    /// full operator stack (that lives only in the `debug` response field).
    pub error: Option<String>,
}

/// An awaitable selector: matches events by type, source, and
/// equality over filter keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDef {
    #[serde(rename = "type")]
    pub event_type: String,
    pub source: String,
    pub filter: Option<Map<String, Value>>,
    #[serde(with = "duration_millis_option", default)]
    pub timeout: Option<Duration>,
}

impl EventDef {
    /// Does `payload` satisfy this selector's `(type, source, filter)`
    /// triple (P5)?
    pub fn matches(&self, event_type: &str, source: &str, payload: &Map<String, Value>) -> bool {
        if self.event_type != event_type || self.source != source {
            return false;
        }
        match &self.filter {
            None => true,
            Some(filter) => filter
                .iter()
                .all(|(k, v)| payload.get(k).map(|pv| pv == v).unwrap_or(false)),
        }
    }
}

mod duration_millis_option {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis: Option<u64> = Option::deserialize(deserializer)?;
        Ok(millis.map(Duration::from_millis))
    }
}

/// Per-invocation resource caps enforced by `SANDBOXED-EXECUTE`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    pub cpu_seconds: u64,
    pub memory_bytes: u64,
    pub wall_clock_seconds: u64,
    pub network_allowed: bool,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_seconds: 5,
            memory_bytes: 256 * 1024 * 1024,
            wall_clock_seconds: 10,
            network_allowed: false,
        }
    }
}

/// Static metadata for a registered tool. The handler itself is not
/// data and lives in the tool registry's handler table, keyed by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub input_schema: Value,
    pub output_schema: Value,
    pub requires_sandbox: bool,
    /// Whether the handler performs network I/O; checked against the
    /// effective `resource_limits.network_allowed` on sandboxed dispatch.
    pub requires_network: bool,
    pub resource_limits: ResourceLimits,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn semantic_payload() -> SemanticPayload {
        SemanticPayload {
            concept: "http server".into(),
            definition: "net/http".into(),
            domain: "go".into(),
            relations: Map::new(),
            confidence: 0.5,
            contributors: 1,
        }
    }

    #[test]
    fn memory_payload_kind_matches_variant() {
        let payload = MemoryPayload::Semantic(semantic_payload());
        assert_eq!(payload.kind(), MemoryKind::Semantic);
    }

    #[test]
    fn memory_payload_score_reads_and_writes_scoring_field() {
        let mut payload = MemoryPayload::Semantic(semantic_payload());
        assert_eq!(payload.score(), 0.5);
        payload.set_score(0.8);
        assert_eq!(payload.score(), 0.8);
    }

    fn procedural_payload(usage_count: u32) -> ProceduralPayload {
        ProceduralPayload {
            skill_name: "deploy".into(),
            domain: "ops".into(),
            procedure: "roll out a release".into(),
            steps: vec!["build".into(), "test".into()],
            prerequisites: BTreeSet::from(["ci-green".to_string()]),
            success_rate: 0.5,
            usage_count,
        }
    }

    #[test]
    fn merge_key_is_none_for_episodic_and_present_for_the_rest() {
        let episodic = MemoryPayload::Episodic(EpisodicPayload {
            session_id: "s1".into(),
            context: Map::new(),
            emotion: None,
            outcome: None,
            importance: 0.5,
        });
        assert_eq!(episodic.merge_key(), None);

        let semantic = MemoryPayload::Semantic(semantic_payload());
        assert_eq!(semantic.merge_key(), Some(("http server".into(), "go".into())));

        let procedural = MemoryPayload::Procedural(procedural_payload(1));
        assert_eq!(procedural.merge_key(), Some(("deploy".into(), "ops".into())));
    }

    #[test]
    fn merge_into_semantic_averages_confidence_and_unions_relations() {
        let mut existing = MemoryPayload::Semantic(semantic_payload());
        let mut incoming_relations = Map::new();
        incoming_relations.insert("uses".into(), Value::String("goroutines".into()));
        let incoming = MemoryPayload::Semantic(SemanticPayload {
            concept: "http server".into(),
            definition: "net/http, updated".into(),
            domain: "go".into(),
            relations: incoming_relations,
            confidence: 0.9,
            contributors: 1,
        });

        existing.merge_into(incoming);

        match existing {
            MemoryPayload::Semantic(p) => {
                assert_eq!(p.contributors, 2);
                assert!((p.confidence - 0.7).abs() < 1e-6);
                assert_eq!(p.definition, "net/http, updated");
                assert_eq!(p.relations.get("uses").and_then(Value::as_str), Some("goroutines"));
            }
            _ => panic!("expected semantic payload"),
        }
    }

    #[test]
    fn merge_into_procedural_weighs_by_usage_and_merges_steps() {
        let mut existing = MemoryPayload::Procedural(procedural_payload(3));
        let incoming = MemoryPayload::Procedural(ProceduralPayload {
            skill_name: "deploy".into(),
            domain: "ops".into(),
            procedure: "roll out a canary release".into(),
            steps: vec!["build".into(), "test".into(), "canary".into()],
            prerequisites: BTreeSet::from(["staging-green".to_string()]),
            success_rate: 0.9,
            usage_count: 1,
        });

        existing.merge_into(incoming);

        match existing {
            MemoryPayload::Procedural(p) => {
                assert_eq!(p.usage_count, 4);
                assert!((p.success_rate - 0.6).abs() < 1e-6);
                assert_eq!(p.procedure, "roll out a canary release");
                assert_eq!(p.steps, vec!["build", "test", "canary"]);
                assert!(p.prerequisites.contains("ci-green"));
                assert!(p.prerequisites.contains("staging-green"));
            }
            _ => panic!("expected procedural payload"),
        }
    }

    use proptest::prelude::*;

    proptest! {
        /// Merging two confidences that are both in [0,1] always yields a
        /// confidence still in [0,1], and the contributor count strictly
        /// increases — for any pair of inputs, not just the hand-picked
        /// 0.5/0.9 case above.
        #[test]
        fn merge_into_semantic_keeps_confidence_in_range(a in 0.0f32..=1.0, b in 0.0f32..=1.0) {
            let mut existing = MemoryPayload::Semantic(SemanticPayload {
                confidence: a,
                ..semantic_payload()
            });
            let incoming = MemoryPayload::Semantic(SemanticPayload {
                confidence: b,
                ..semantic_payload()
            });
            existing.merge_into(incoming);
            match existing {
                MemoryPayload::Semantic(p) => {
                    prop_assert!((0.0..=1.0).contains(&p.confidence));
                    prop_assert_eq!(p.contributors, 2);
                }
                _ => prop_assert!(false, "expected semantic payload"),
            }
        }
    }

    #[test]
    fn event_def_matches_requires_all_filter_keys() {
        let mut filter = Map::new();
        filter.insert("status".into(), Value::String("ok".into()));
        let selector = EventDef {
            event_type: "message".into(),
            source: "a2".into(),
            filter: Some(filter),
            timeout: None,
        };

        let mut payload = Map::new();
        payload.insert("status".into(), Value::String("ok".into()));
        assert!(selector.matches("message", "a2", &payload));

        payload.insert("status".into(), Value::String("bad".into()));
        assert!(!selector.matches("message", "a2", &payload));
    }

    #[test]
    fn event_def_matches_rejects_wrong_source() {
        let selector = EventDef {
            event_type: "message".into(),
            source: "a2".into(),
            filter: None,
            timeout: None,
        };
        assert!(!selector.matches("message", "a3", &Map::new()));
    }
}
