//! Kernel: the mutation gateway and sole holder of write authority.
//!
//! The `Kernel` owns the graph store, the invariant enforcer, the generation
//! port, and the vector table. Every write goes through it, and every write
//! is followed by a full invariant check before control returns. Readers get
//! cloned records or frozen [`GraphSnapshot`]s.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::authority::KernelAuthority;
use crate::error::{KernelError, KernelResult};
use crate::graph::{GraphSnapshot, GraphStore};
use crate::invariant::{InvariantEnforcer, InvariantReport, InvariantRule};
use crate::port::{
    checked_confidence, DeltaOp, Generation, GenerationConstraints, GenerationError,
    GenerationPort, GenerationRequest,
};
use crate::symbol::{
    keys, now_millis, Edge, EdgeSpec, Meta, Symbol, SymbolChanges, SymbolSpec, Warrant,
};

/// Symbol type given to content created by [`Kernel::prompt`] unless overridden.
pub const GENERATED_KIND: &str = "llm_generated";

/// Relation used for parent links created by [`Kernel::prompt`].
pub const PARENT_REL: &str = "parent";

/// Tunables for the kernel's generation paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KernelConfig {
    /// Critique deltas at or below this confidence are ignored.
    pub critique_threshold: f32,
    /// Relation candidates at or below this confidence are ignored.
    pub link_threshold: f32,
    /// Embed every prompted payload and store the vector.
    pub embed_on_prompt: bool,
    /// Task used when a prompt names none.
    pub default_task: String,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            critique_threshold: 0.5,
            link_threshold: 0.6,
            embed_on_prompt: true,
            default_task: "Generate content".into(),
        }
    }
}

/// Input for [`Kernel::prompt`].
#[derive(Debug, Clone, Default)]
pub struct PromptSpec {
    pub task: Option<String>,
    pub context: serde_json::Map<String, Value>,
    pub constraints: GenerationConstraints,
    /// Parent symbol; becomes the initial lineage and the source of a `parent` edge.
    pub parent: Option<String>,
    /// Symbol type, [`GENERATED_KIND`] when `None`.
    pub kind: Option<String>,
    /// Extra metadata merged under the provenance fields.
    pub meta: Meta,
}

impl PromptSpec {
    pub fn task(task: impl Into<String>) -> Self {
        Self {
            task: Some(task.into()),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_constraints(mut self, constraints: GenerationConstraints) -> Self {
        self.constraints = constraints;
        self
    }
}

/// The mutation gateway.
pub struct Kernel {
    authority: KernelAuthority,
    store: GraphStore,
    enforcer: InvariantEnforcer,
    port: Arc<dyn GenerationPort>,
    vectors: BTreeMap<String, Vec<f32>>,
    last_report: InvariantReport,
    config: KernelConfig,
}

impl Kernel {
    /// Create a kernel with the core invariant rules and an empty graph.
    pub fn new(port: Arc<dyn GenerationPort>, config: KernelConfig) -> Self {
        let authority = KernelAuthority::new();
        let store = GraphStore::new(&authority);
        let enforcer = InvariantEnforcer::with_core_rules();

        tracing::info!(
            port = port.name(),
            rules = enforcer.rules().len(),
            embed_on_prompt = config.embed_on_prompt,
            "initializing xi kernel"
        );

        Self {
            authority,
            store,
            enforcer,
            port,
            vectors: BTreeMap::new(),
            last_report: InvariantReport::default(),
            config,
        }
    }

    /// Create a kernel with the default configuration.
    pub fn with_port(port: Arc<dyn GenerationPort>) -> Self {
        Self::new(port, KernelConfig::default())
    }

    // ── Direct mutations ────────────────────────────────────────────────

    pub fn create_symbol(&mut self, spec: SymbolSpec) -> KernelResult<Symbol> {
        let symbol = self.store.create_symbol(self.authority.token(), spec)?;
        self.vectors.remove(&symbol.id);
        self.enforce()?;
        Ok(symbol)
    }

    pub fn update_symbol(&mut self, id: &str, changes: SymbolChanges) -> KernelResult<Symbol> {
        let symbol = self.store.update_symbol(self.authority.token(), id, changes)?;
        self.enforce()?;
        Ok(symbol)
    }

    pub fn create_edge(&mut self, spec: EdgeSpec) -> KernelResult<Edge> {
        let edge = self.store.create_edge(self.authority.token(), spec)?;
        self.enforce()?;
        Ok(edge)
    }

    /// Register an extra invariant rule and re-check the graph.
    pub fn add_rule(&mut self, rule: InvariantRule) -> KernelResult<InvariantReport> {
        self.enforcer.add_rule(rule);
        self.enforce()?;
        Ok(self.last_report.clone())
    }

    fn enforce(&mut self) -> KernelResult<()> {
        let report = self.enforcer.check(&self.store.snapshot());
        self.store.record_report(self.authority.token(), &report)?;

        if !report.violations.is_empty() {
            tracing::warn!(
                count = report.violations.len(),
                violations = ?report.violations,
                "invariant violations detected"
            );
        }
        if !report.warnings.is_empty() {
            tracing::info!(
                count = report.warnings.len(),
                warnings = ?report.warnings,
                "invariant warnings"
            );
        }

        self.last_report = report;
        Ok(())
    }

    // ── Generation paths ────────────────────────────────────────────────

    /// Ask the port for content and store it as symbol `symbol_id` with full provenance.
    pub fn prompt(&mut self, symbol_id: &str, spec: PromptSpec) -> KernelResult<Symbol> {
        let request = GenerationRequest {
            symbol_id: symbol_id.to_string(),
            task: spec
                .task
                .unwrap_or_else(|| self.config.default_task.clone()),
            context: spec.context,
            constraints: spec.constraints,
        };
        let prompt_hash = request.content_hash();

        let started = Instant::now();
        let generation = self
            .propose(&request)
            .inspect_err(|e| {
                tracing::warn!(port = self.port.name(), symbol_id, error = %e, "generation failed");
            })?;
        if request.constraints.is_cancelled() {
            tracing::warn!(symbol_id, "discarding generation reply after cancel");
            return Err(GenerationError::Cancelled.into());
        }
        if let Some(timeout) = request.constraints.timeout {
            if started.elapsed() > timeout {
                tracing::warn!(symbol_id, ?timeout, "discarding late generation reply");
                return Err(GenerationError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into());
            }
        }

        let embedding = if self.config.embed_on_prompt {
            Some(self.port.embed(&generation.content)?)
        } else {
            None
        };

        let mut meta = spec.meta;
        meta.insert(keys::MODEL.into(), json!(generation.model));
        meta.insert(keys::PROMPT_HASH.into(), json!(prompt_hash));
        meta.insert(keys::TIMESTAMP.into(), json!(generation.timestamp));
        meta.insert(keys::COST.into(), json!(generation.cost));
        meta.insert(keys::TOKENS_USED.into(), json!(generation.tokens_used));
        meta.insert(keys::JUSTIFICATION.into(), json!(generation.justification));
        meta.insert(keys::CONFIDENCE.into(), json!(generation.confidence));
        meta.insert(keys::TASK.into(), json!(request.task));
        if embedding.is_some() {
            meta.insert(keys::SYMBOL_FIRST.into(), json!(true));
            meta.insert(keys::VECTOR_EMBEDDING.into(), json!(true));
        }

        let symbol_spec = SymbolSpec {
            id: symbol_id.to_string(),
            kind: spec.kind.unwrap_or_else(|| GENERATED_KIND.into()),
            payload: generation.content,
            meta,
            lineage: spec.parent.as_ref().map(|p| vec![p.clone()]),
        };
        let symbol = self.create_symbol(symbol_spec)?;

        // The symbol exists before its vector does.
        if let Some(vector) = embedding {
            self.vectors.insert(symbol.id.clone(), vector);
        }

        if let Some(parent) = spec.parent.filter(|p| !self.has_edge(p, &symbol.id, PARENT_REL)) {
            let mut warrant = Warrant::new();
            warrant.insert(keys::REASON.into(), json!("derived from parent"));
            warrant.insert(keys::MODEL.into(), json!(generation.model));
            self.create_edge(EdgeSpec::new(parent, symbol.id.clone(), PARENT_REL).warrant(warrant))?;
        }

        tracing::debug!(
            symbol_id,
            model = %generation.model,
            tokens = generation.tokens_used,
            "prompted symbol stored"
        );
        Ok(symbol)
    }

    /// Ask the port to critique `target` and apply confident update deltas.
    pub fn critique(&mut self, symbol_id: &str, target: &Value) -> KernelResult<Vec<Symbol>> {
        let deltas = self.port.critique(symbol_id, target)?;
        for delta in &deltas {
            checked_confidence(delta.confidence, "critique delta")?;
        }
        let mut updated = Vec::new();

        for delta in deltas {
            if delta.op != DeltaOp::Update || !(delta.confidence > self.config.critique_threshold) {
                tracing::debug!(
                    delta_target = %delta.target,
                    op = ?delta.op,
                    confidence = delta.confidence,
                    "skipping delta"
                );
                continue;
            }
            let Some(current) = self.store.symbol(&delta.target) else {
                tracing::debug!(delta_target = %delta.target, "critique target does not exist");
                continue;
            };

            let payload = if current.payload.is_object() {
                Some(Value::Object(delta.changes))
            } else {
                delta.changes.get("payload").cloned()
            };

            let mut meta = Meta::new();
            meta.insert(keys::CRITIQUE.into(), json!(true));
            meta.insert(keys::REASON.into(), json!(delta.reason));
            meta.insert(keys::CONFIDENCE.into(), json!(delta.confidence));
            meta.insert(keys::TIMESTAMP.into(), json!(now_millis()));

            let changes = SymbolChanges {
                kind: None,
                payload,
                meta,
            };
            updated.push(self.update_symbol(&delta.target, changes)?);
        }

        Ok(updated)
    }

    /// Ask the port for relations from `symbol_a` to `symbol_b` and materialize confident ones.
    pub fn link(&mut self, symbol_a: &str, symbol_b: &str, relation_hint: &str) -> KernelResult<Vec<Edge>> {
        for id in [symbol_a, symbol_b] {
            if !self.store.contains(id) {
                return Err(KernelError::NotFound { id: id.to_string() });
            }
        }

        let candidates = self.port.propose_relation(symbol_a, symbol_b, relation_hint)?;
        for candidate in &candidates {
            checked_confidence(candidate.confidence, "relation candidate")?;
        }
        let mut edges = Vec::new();

        for candidate in candidates {
            if !(candidate.confidence > self.config.link_threshold) {
                continue;
            }
            let mut warrant = Warrant::new();
            warrant.insert(
                keys::REASON.into(),
                json!(format!("suggested by {}", self.port.name())),
            );
            warrant.insert("llm_suggested".into(), json!(true));
            warrant.insert(keys::CONFIDENCE.into(), json!(candidate.confidence));
            warrant.insert("relation_hint".into(), json!(relation_hint));

            let spec = EdgeSpec::new(symbol_a, symbol_b, candidate.relation)
                .weight(f64::from(candidate.confidence))
                .warrant(warrant);
            edges.push(self.create_edge(spec)?);
        }

        Ok(edges)
    }

    /// Call the port unless already cancelled, and validate the reply.
    fn propose(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        if request.constraints.is_cancelled() {
            return Err(GenerationError::Cancelled);
        }
        let generation = self.port.propose(request)?;
        checked_confidence(generation.confidence, "generation")?;
        Ok(generation)
    }

    fn has_edge(&self, src: &str, dst: &str, rel: &str) -> bool {
        self.store
            .edges_from(src)
            .iter()
            .any(|e| e.dst == dst && e.rel == rel)
    }

    /// Embed an existing symbol's payload and mark it symbol-first.
    pub fn embed(&mut self, id: &str) -> KernelResult<&[f32]> {
        let payload = self
            .store
            .symbol(id)
            .map(|s| s.payload.clone())
            .ok_or_else(|| KernelError::NotFound { id: id.to_string() })?;
        let vector = self.port.embed(&payload)?;

        let mut meta = Meta::new();
        meta.insert(keys::SYMBOL_FIRST.into(), json!(true));
        meta.insert(keys::VECTOR_EMBEDDING.into(), json!(true));
        self.update_symbol(id, SymbolChanges::default().with_meta(meta))?;

        let slot = self.vectors.entry(id.to_string()).or_default();
        *slot = vector;
        Ok(slot.as_slice())
    }

    // ── Reads ───────────────────────────────────────────────────────────

    pub fn symbol(&self, id: &str) -> Option<Symbol> {
        self.store.symbol(id).cloned()
    }

    /// Outgoing edges of an existing symbol.
    pub fn edges_from(&self, id: &str) -> KernelResult<Vec<Edge>> {
        self.require_symbol(id)?;
        Ok(self.store.edges_from(id).to_vec())
    }

    /// Incoming and outgoing edges of an existing symbol.
    pub fn edges_touching(&self, id: &str) -> KernelResult<Vec<Edge>> {
        self.require_symbol(id)?;
        Ok(self.store.edges_touching(id).cloned().collect())
    }

    fn require_symbol(&self, id: &str) -> KernelResult<()> {
        if self.store.contains(id) {
            Ok(())
        } else {
            Err(KernelError::NotFound { id: id.to_string() })
        }
    }

    pub fn vector(&self, id: &str) -> Option<&[f32]> {
        self.vectors.get(id).map(Vec::as_slice)
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        self.store.snapshot()
    }

    /// The report produced by the most recent invariant check.
    pub fn last_report(&self) -> &InvariantReport {
        &self.last_report
    }

    pub fn symbol_count(&self) -> usize {
        self.store.symbol_count()
    }

    pub fn edge_count(&self) -> usize {
        self.store.edge_count()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn port_name(&self) -> &str {
        self.port.name()
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("port", &self.port.name())
            .field("symbols", &self.store.symbol_count())
            .field("edges", &self.store.edge_count())
            .field("vectors", &self.vectors.len())
            .finish()
    }
}
