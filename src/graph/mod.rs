//! Graph store: the symbol and edge maps plus their invariant bookkeeping.
//!
//! Every mutation primitive demands the [`WriteToken`] of the authority the
//! store was bound to. A rejected call leaves the store untouched.

pub mod snapshot;

use std::sync::Arc;

use serde_json::Value;

use crate::authority::{AuthorityId, KernelAuthority, WriteToken};
use crate::error::{KernelError, KernelResult};
use crate::invariant::InvariantReport;
use crate::symbol::{
    keys, merge_payload, now_millis, Edge, EdgeSpec, Symbol, SymbolChanges, SymbolSpec,
};

pub use snapshot::{GraphSnapshot, SnapshotMetadata};
use snapshot::{EdgeMap, SymbolMap};

/// In-memory symbol and edge maps owned by a single write authority.
#[derive(Debug)]
pub struct GraphStore {
    owner: AuthorityId,
    symbols: Arc<SymbolMap>,
    edges: Arc<EdgeMap>,
    edge_count: usize,
    violations: Vec<String>,
    warnings: Vec<String>,
    last_modified: u64,
}

impl GraphStore {
    /// Create an empty store that only accepts `authority`'s token.
    pub fn new(authority: &KernelAuthority) -> Self {
        Self {
            owner: authority.id(),
            symbols: Arc::new(SymbolMap::new()),
            edges: Arc::new(EdgeMap::new()),
            edge_count: 0,
            violations: Vec::new(),
            warnings: Vec::new(),
            last_modified: now_millis(),
        }
    }

    // ── Mutation primitives ─────────────────────────────────────────────

    /// Insert a symbol, stamping write-through and timestamps into its meta.
    ///
    /// An existing symbol with the same id is replaced.
    pub fn create_symbol(&mut self, token: &WriteToken, spec: SymbolSpec) -> KernelResult<Symbol> {
        token.require(self.owner, "create_symbol")?;

        let now = now_millis();
        let mut meta = spec.meta;
        meta.entry(keys::TIMESTAMP).or_insert_with(|| Value::from(now));
        meta.insert(keys::CREATED.into(), Value::from(now));
        meta.insert(keys::KERNEL_WRITTEN.into(), Value::Bool(true));

        let symbol = Symbol {
            id: spec.id,
            kind: spec.kind,
            payload: spec.payload,
            meta,
            lineage: spec.lineage.unwrap_or_default(),
        };

        if self.symbols.contains_key(&symbol.id) {
            tracing::warn!(id = %symbol.id, "overwriting existing symbol");
        }
        Arc::make_mut(&mut self.symbols).insert(symbol.id.clone(), Arc::new(symbol.clone()));
        self.last_modified = now;
        tracing::debug!(id = %symbol.id, kind = %symbol.kind, "symbol created");
        Ok(symbol)
    }

    /// Apply `changes` to an existing symbol and append an `update@<time>` lineage marker.
    pub fn update_symbol(
        &mut self,
        token: &WriteToken,
        id: &str,
        changes: SymbolChanges,
    ) -> KernelResult<Symbol> {
        token.require(self.owner, "update_symbol")?;

        let symbols = Arc::make_mut(&mut self.symbols);
        let entry = symbols
            .get_mut(id)
            .ok_or_else(|| KernelError::NotFound { id: id.to_string() })?;
        let symbol = Arc::make_mut(entry);

        let now = now_millis();
        if let Some(kind) = changes.kind {
            symbol.kind = kind;
        }
        if let Some(payload) = changes.payload {
            merge_payload(&mut symbol.payload, payload);
        }
        for (k, v) in changes.meta {
            symbol.meta.insert(k, v);
        }
        symbol.meta.insert(keys::MODIFIED.into(), Value::from(now));
        symbol.meta.insert(keys::KERNEL_WRITTEN.into(), Value::Bool(true));
        symbol.lineage.push(format!("update@{now}"));

        let updated = symbol.clone();
        self.last_modified = now;
        tracing::debug!(id, lineage_len = updated.lineage.len(), "symbol updated");
        Ok(updated)
    }

    /// Append an edge to its source's outgoing list. The warrant must be non-empty.
    pub fn create_edge(&mut self, token: &WriteToken, spec: EdgeSpec) -> KernelResult<Edge> {
        token.require(self.owner, "create_edge")?;

        let mut warrant = match spec.warrant {
            Some(w) if !w.is_empty() => w,
            _ => {
                return Err(KernelError::MissingWarrant {
                    src: spec.src,
                    dst: spec.dst,
                    rel: spec.rel,
                });
            }
        };

        let now = now_millis();
        warrant.insert(keys::CREATED.into(), Value::from(now));
        warrant.insert(keys::KERNEL_WRITTEN.into(), Value::Bool(true));

        let edge = Edge {
            src: spec.src,
            dst: spec.dst,
            rel: spec.rel,
            weight: spec.weight.unwrap_or(Edge::DEFAULT_WEIGHT),
            warrant,
        };

        let list = Arc::make_mut(&mut self.edges)
            .entry(edge.src.clone())
            .or_default();
        Arc::make_mut(list).push(edge.clone());
        self.edge_count += 1;
        self.last_modified = now;
        tracing::debug!(src = %edge.src, dst = %edge.dst, rel = %edge.rel, "edge created");
        Ok(edge)
    }

    /// Replace the recorded invariant diagnostics with `report`.
    pub fn record_report(&mut self, token: &WriteToken, report: &InvariantReport) -> KernelResult<()> {
        token.require(self.owner, "record_report")?;
        self.violations = report.violations.clone();
        self.warnings = report.warnings.clone();
        Ok(())
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn symbol(&self, id: &str) -> Option<&Symbol> {
        self.symbols.get(id).map(Arc::as_ref)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.symbols.contains_key(id)
    }

    pub fn edges_from(&self, src: &str) -> &[Edge] {
        self.edges.get(src).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Edges where `id` is the source or the destination.
    pub fn edges_touching<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges
            .values()
            .flat_map(|v| v.iter())
            .filter(move |e| e.src == id || e.dst == id)
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn violations(&self) -> &[String] {
        &self.violations
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn last_modified(&self) -> u64 {
        self.last_modified
    }

    /// Export a frozen view. Shares structure with the store until the next write.
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::new(
            Arc::clone(&self.symbols),
            Arc::clone(&self.edges),
            SnapshotMetadata {
                total_symbols: self.symbols.len(),
                total_edges: self.edge_count,
                invariant_violations: self.violations.clone(),
                invariant_warnings: self.warnings.clone(),
                last_modified: self.last_modified,
            },
        )
    }
}
