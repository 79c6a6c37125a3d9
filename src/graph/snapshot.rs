//! Frozen, shareable views of the graph.
//!
//! A [`GraphSnapshot`] holds reference-counted handles to the store's maps.
//! The store copies a map or record only when it is about to mutate one that
//! a live snapshot still holds, so exporting is cheap and a retained snapshot
//! never observes later writes.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::symbol::{Edge, Symbol};

pub(crate) type SymbolMap = BTreeMap<String, Arc<Symbol>>;
pub(crate) type EdgeMap = BTreeMap<String, Arc<Vec<Edge>>>;

/// Aggregate counters and diagnostics attached to a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotMetadata {
    pub total_symbols: usize,
    pub total_edges: usize,
    pub invariant_violations: Vec<String>,
    #[serde(default)]
    pub invariant_warnings: Vec<String>,
    /// Milliseconds since the UNIX epoch.
    pub last_modified: u64,
}

/// Read-only export of the whole graph.
///
/// Serializes as `{ symbols: {id: Symbol}, edges: {src: [Edge]}, metadata: {...} }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphSnapshot {
    symbols: Arc<SymbolMap>,
    edges: Arc<EdgeMap>,
    metadata: SnapshotMetadata,
}

impl GraphSnapshot {
    pub(crate) fn new(symbols: Arc<SymbolMap>, edges: Arc<EdgeMap>, metadata: SnapshotMetadata) -> Self {
        Self {
            symbols,
            edges,
            metadata,
        }
    }

    pub fn symbol(&self, id: &str) -> Option<&Symbol> {
        self.symbols.get(id).map(Arc::as_ref)
    }

    /// All symbols in id order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.values().map(Arc::as_ref)
    }

    /// Outgoing edges of `src`, empty if it has none.
    pub fn edges_from(&self, src: &str) -> &[Edge] {
        self.edges.get(src).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Every edge, grouped by source in id order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values().flat_map(|v| v.iter())
    }

    pub fn metadata(&self) -> &SnapshotMetadata {
        &self.metadata
    }

    pub fn symbol_count(&self) -> usize {
        self.metadata.total_symbols
    }

    pub fn edge_count(&self) -> usize {
        self.metadata.total_edges
    }

    /// Render as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::symbol::Meta;

    fn sample() -> GraphSnapshot {
        let mut symbols = SymbolMap::new();
        symbols.insert(
            "a".into(),
            Arc::new(Symbol {
                id: "a".into(),
                kind: "Note".into(),
                payload: json!("hello"),
                meta: Meta::new(),
                lineage: vec![],
            }),
        );
        GraphSnapshot::new(
            Arc::new(symbols),
            Arc::new(EdgeMap::new()),
            SnapshotMetadata {
                total_symbols: 1,
                total_edges: 0,
                invariant_violations: vec!["x".into()],
                invariant_warnings: vec![],
                last_modified: 42,
            },
        )
    }

    #[test]
    fn export_shape_uses_camel_case_metadata() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["symbols"]["a"]["type"], "Note");
        assert_eq!(value["metadata"]["totalSymbols"], 1);
        assert_eq!(value["metadata"]["totalEdges"], 0);
        assert_eq!(value["metadata"]["invariantViolations"], json!(["x"]));
        assert_eq!(value["metadata"]["lastModified"], 42);
        assert!(value["edges"].as_object().unwrap().is_empty());
    }

    #[test]
    fn missing_source_has_no_edges() {
        assert!(sample().edges_from("nobody").is_empty());
    }
}
