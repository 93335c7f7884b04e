//! Runtime values produced by evaluating an instruction-language expression.
//!
//! A fresh data model for this crate, following
//! `mnemo_core::MemoryPayload`'s closed-sum-type convention rather than
//! boxing everything behind `serde_json::Value`.

use mnemo_core::{MemoryHit, MessageId};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;

/// The value of evaluating any expression. `QUERY` produces `Hits`,
/// `CLARIFY` produces `Clarify`, `EVENT`/the literal form of `AWAIT`'s
/// argument produce `EventSelector`, everything else produces a plain atom
/// or one of the two composite shapes.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    Hits(Vec<MemoryHit>),
    MessageId(MessageId),
    EventSelector {
        event_type: String,
        source: String,
        filter: Option<Map<String, Json>>,
    },
    Clarify {
        question: String,
        options: Vec<String>,
    },
}

impl Value {
    /// Best-effort conversion to the textual form tool invocation and
    /// `COMMUNICATE` recipients need.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Converts an incoming `serde_json::Value` (a tool result, an event
    /// payload field, a message body) into a runtime value. `Hits`,
    /// `MessageId`, `EventSelector`, and `Clarify` never arise from this
    /// direction; JSON objects and arrays map onto the plain `Map`/`List`
    /// shapes instead.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            Json::String(s) => Value::String(s.clone()),
            Json::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            Json::Object(obj) => {
                Value::Map(obj.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect())
            }
        }
    }

    /// Renders this value as `serde_json::Value` for transport across the
    /// API boundary and for storage in a `CognitionRecord.output`.
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::List(items) => Json::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), v.to_json());
                }
                Json::Object(out)
            }
            Value::Hits(hits) => Json::Array(
                hits.iter()
                    .map(|h| {
                        let mut obj = Map::new();
                        obj.insert("id".into(), Json::String(h.id.to_string()));
                        obj.insert("kind".into(), Json::String(h.kind.to_string()));
                        obj.insert("content".into(), h.content.clone());
                        obj.insert(
                            "score".into(),
                            serde_json::Number::from_f64(h.score as f64)
                                .map(Json::Number)
                                .unwrap_or(Json::Null),
                        );
                        Json::Object(obj)
                    })
                    .collect(),
            ),
            Value::MessageId(id) => Json::String(id.to_string()),
            Value::EventSelector {
                event_type,
                source,
                filter,
            } => {
                let mut obj = Map::new();
                obj.insert("type".into(), Json::String(event_type.clone()));
                obj.insert("source".into(), Json::String(source.clone()));
                obj.insert(
                    "filter".into(),
                    filter.clone().map(Json::Object).unwrap_or(Json::Null),
                );
                Json::Object(obj)
            }
            Value::Clarify { question, options } => {
                let mut obj = Map::new();
                obj.insert("kind".into(), Json::String("clarify".into()));
                obj.insert("question".into(), Json::String(question.clone()));
                obj.insert(
                    "options".into(),
                    Json::Array(options.iter().cloned().map(Json::String).collect()),
                );
                Json::Object(obj)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clarify_value_renders_expected_json_shape() {
        let v = Value::Clarify {
            question: "which?".into(),
            options: vec!["a".into(), "b".into()],
        };
        let json = v.to_json();
        assert_eq!(json["kind"], Json::String("clarify".into()));
        assert_eq!(json["options"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn list_of_numbers_round_trips_to_json_array() {
        let v = Value::List(vec![Value::Number(1.0), Value::Number(2.0)]);
        assert_eq!(v.to_json(), Json::Array(vec![Json::from(1.0), Json::from(2.0)]));
    }

    #[test]
    fn from_json_converts_nested_objects_to_maps() {
        let json = serde_json::json!({"a": 1, "b": {"c": "x"}});
        let value = Value::from_json(&json);
        match value {
            Value::Map(map) => {
                assert_eq!(map.get("a"), Some(&Value::Number(1.0)));
                assert_eq!(map.get("b"), Some(&Value::Map(BTreeMap::from([("c".to_string(), Value::String("x".into()))]))));
            }
            other => panic!("expected a map, got {other:?}"),
        }
    }
}
