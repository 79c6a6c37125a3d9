//! Core graph record types: symbols, edges, and their open metadata maps.
//!
//! Symbols are the nodes of the knowledge graph. Each carries a free-form
//! payload, an open `meta` map holding provenance, and a `lineage` list of
//! mutation markers. Edges are directed, weighted, and must carry a warrant.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Open mapping of provenance and bookkeeping fields.
pub type Meta = serde_json::Map<String, Value>;

/// Justification attached to an edge. Must be non-empty.
pub type Warrant = serde_json::Map<String, Value>;

/// Well-known keys the kernel reads and stamps in [`Meta`] and [`Warrant`] maps.
pub mod keys {
    pub const KERNEL_WRITTEN: &str = "kernel_written";
    pub const MODEL: &str = "model";
    pub const PROMPT_HASH: &str = "prompt_hash";
    pub const TIMESTAMP: &str = "timestamp";
    pub const CREATED: &str = "created";
    pub const MODIFIED: &str = "modified";
    pub const COST: &str = "cost";
    pub const TOKENS_USED: &str = "tokens_used";
    pub const JUSTIFICATION: &str = "justification";
    pub const CONFIDENCE: &str = "confidence";
    pub const TASK: &str = "task";
    pub const VECTOR_EMBEDDING: &str = "vector_embedding";
    pub const SYMBOL_FIRST: &str = "symbol_first";
    pub const CRITIQUE: &str = "critique";
    pub const REASON: &str = "reason";
}

/// Milliseconds since the UNIX epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Truthiness of a metadata value: `null`, `false`, `0`, and `""` are false.
pub fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}

/// A provenance-tagged node in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub id: String,
    /// Free-form classification tag.
    #[serde(rename = "type")]
    pub kind: String,
    pub payload: Value,
    pub meta: Meta,
    /// Ordered mutation history, e.g. `"update@1718000000000"`.
    pub lineage: Vec<String>,
}

impl Symbol {
    /// Whether `meta[key]` is set to a truthy value.
    pub fn flag(&self, key: &str) -> bool {
        is_truthy(self.meta.get(key))
    }

    /// Whether the kernel stamped this symbol as written through it.
    pub fn is_kernel_written(&self) -> bool {
        self.flag(keys::KERNEL_WRITTEN)
    }

    /// Payload rendered as text: strings verbatim, everything else as JSON.
    pub fn payload_text(&self) -> String {
        payload_text(&self.payload)
    }
}

/// Render a payload as text: strings verbatim, everything else as compact JSON.
pub fn payload_text(payload: &Value) -> String {
    match payload {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A directed, weighted, warranted relation between two symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub src: String,
    pub dst: String,
    pub rel: String,
    pub weight: f64,
    pub warrant: Warrant,
}

impl Edge {
    pub const DEFAULT_WEIGHT: f64 = 1.0;
}

/// Input for creating a symbol.
#[derive(Debug, Clone, Default)]
pub struct SymbolSpec {
    pub id: String,
    pub kind: String,
    pub payload: Value,
    pub meta: Meta,
    /// Initial lineage; empty when `None`.
    pub lineage: Option<Vec<String>>,
}

impl SymbolSpec {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, payload: impl Into<Value>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }

    pub fn with_lineage(mut self, lineage: Vec<String>) -> Self {
        self.lineage = Some(lineage);
        self
    }
}

/// Field changes applied by an update.
///
/// `payload` replaces the current payload, except when both the current and
/// the new payload are JSON objects, in which case keys are merged. `meta`
/// entries are merged over the existing map.
#[derive(Debug, Clone, Default)]
pub struct SymbolChanges {
    pub kind: Option<String>,
    pub payload: Option<Value>,
    pub meta: Meta,
}

impl SymbolChanges {
    pub fn payload(payload: impl Into<Value>) -> Self {
        Self {
            payload: Some(payload.into()),
            ..Default::default()
        }
    }

    pub fn with_meta(mut self, meta: Meta) -> Self {
        self.meta = meta;
        self
    }
}

/// Merge `incoming` into `current` key-wise when both are objects, otherwise replace.
pub fn merge_payload(current: &mut Value, incoming: Value) {
    match (current, incoming) {
        (Value::Object(cur), Value::Object(inc)) => {
            for (k, v) in inc {
                cur.insert(k, v);
            }
        }
        (cur, inc) => *cur = inc,
    }
}

/// Input for creating an edge.
#[derive(Debug, Clone)]
pub struct EdgeSpec {
    pub src: String,
    pub dst: String,
    pub rel: String,
    /// Defaults to [`Edge::DEFAULT_WEIGHT`].
    pub weight: Option<f64>,
    /// `None` and an empty map are both rejected.
    pub warrant: Option<Warrant>,
}

impl EdgeSpec {
    pub fn new(src: impl Into<String>, dst: impl Into<String>, rel: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            dst: dst.into(),
            rel: rel.into(),
            weight: None,
            warrant: None,
        }
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    pub fn warrant(mut self, warrant: Warrant) -> Self {
        self.warrant = Some(warrant);
        self
    }

    /// Shorthand for a warrant holding only a `reason`.
    pub fn because(self, reason: impl Into<String>) -> Self {
        let mut warrant = Warrant::new();
        warrant.insert(keys::REASON.into(), Value::String(reason.into()));
        self.warrant(warrant)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn truthiness_follows_metadata_conventions() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&json!(null))));
        assert!(!is_truthy(Some(&json!(false))));
        assert!(!is_truthy(Some(&json!(0))));
        assert!(!is_truthy(Some(&json!(""))));
        assert!(is_truthy(Some(&json!(true))));
        assert!(is_truthy(Some(&json!("yes"))));
        assert!(is_truthy(Some(&json!({}))));
    }

    #[test]
    fn merge_payload_merges_objects() {
        let mut current = json!({"a": 1, "b": 2});
        merge_payload(&mut current, json!({"b": 3, "c": 4}));
        assert_eq!(current, json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn merge_payload_replaces_scalars() {
        let mut current = json!("old");
        merge_payload(&mut current, json!("new"));
        assert_eq!(current, json!("new"));
    }

    #[test]
    fn symbol_serializes_kind_as_type() {
        let sym = Symbol {
            id: "s".into(),
            kind: "Note".into(),
            payload: json!("x"),
            meta: Meta::new(),
            lineage: vec![],
        };
        let v = serde_json::to_value(&sym).unwrap();
        assert_eq!(v["type"], "Note");
    }

    #[test]
    fn because_builds_reason_warrant() {
        let spec = EdgeSpec::new("a", "b", "rel").because("test");
        assert_eq!(spec.warrant.unwrap()["reason"], "test");
    }
}
