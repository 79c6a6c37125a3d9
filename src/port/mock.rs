//! Deterministic, scriptable generation port for tests and offline demos.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::{
    Delta, DeltaOp, Generation, GenerationConstraints, GenerationError, GenerationPort,
    GenerationRequest, RelationCandidate,
};
use crate::symbol::{now_millis, payload_text};

/// A port whose replies are fully determined by its configuration and call count.
///
/// Replies cycle through `replies` (or a templated default). The reply on
/// call `complete_on` gets a trailing `COMPLETE`; call `fail_on` fails with
/// [`GenerationError::Rejected`]. Call numbers start at 1 and count only
/// [`GenerationPort::propose`]. Simulated latency is cut short by the
/// request's timeout or cancel flag.
#[derive(Debug)]
pub struct MockPort {
    model: String,
    replies: Vec<String>,
    complete_on: Option<usize>,
    fail_on: Option<usize>,
    confidence: f32,
    dimension: usize,
    latency: Option<Duration>,
    deltas: Option<Vec<Delta>>,
    relations: Option<Vec<RelationCandidate>>,
    calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

const CANCEL_POLL: Duration = Duration::from_millis(5);

impl Default for MockPort {
    fn default() -> Self {
        Self {
            model: "mock-gpt".into(),
            replies: Vec::new(),
            complete_on: None,
            fail_on: None,
            confidence: 0.75,
            dimension: 384,
            latency: None,
            deltas: None,
            relations: None,
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_replies<I, S>(mut self, replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies = replies.into_iter().map(Into::into).collect();
        self
    }

    pub fn complete_on(mut self, call: usize) -> Self {
        self.complete_on = Some(call);
        self
    }

    pub fn fail_on(mut self, call: usize) -> Self {
        self.fail_on = Some(call);
        self
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = dimension;
        self
    }

    /// Simulated backend latency. Honors the request timeout.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_deltas(mut self, deltas: Vec<Delta>) -> Self {
        self.deltas = Some(deltas);
        self
    }

    pub fn with_relations(mut self, relations: Vec<RelationCandidate>) -> Self {
        self.relations = Some(relations);
        self
    }

    /// Number of `propose` calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The most recent request passed to `propose`.
    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.last_request.lock().ok().and_then(|r| r.clone())
    }

    /// Sleep for the configured latency, waking early on cancel or timeout.
    fn wait(&self, constraints: &GenerationConstraints) -> Result<(), GenerationError> {
        let latency = self.latency.unwrap_or_default();
        let budget = constraints.timeout.map_or(latency, |t| t.min(latency));
        let started = Instant::now();

        loop {
            if constraints.is_cancelled() {
                return Err(GenerationError::Cancelled);
            }
            let elapsed = started.elapsed();
            if elapsed >= budget {
                break;
            }
            std::thread::sleep(CANCEL_POLL.min(budget - elapsed));
        }

        match constraints.timeout {
            Some(timeout) if timeout < latency => Err(GenerationError::Timeout {
                timeout_ms: timeout.as_millis() as u64,
            }),
            _ => Ok(()),
        }
    }

    fn reply_text(&self, call: usize, request: &GenerationRequest) -> String {
        let base = if self.replies.is_empty() {
            format!("Mock response #{call} for symbol {}", request.symbol_id)
        } else {
            self.replies[(call - 1) % self.replies.len()].clone()
        };
        if self.complete_on == Some(call) {
            format!("{base}\nCOMPLETE")
        } else {
            base
        }
    }
}

impl GenerationPort for MockPort {
    fn name(&self) -> &str {
        "mock"
    }

    fn propose(&self, request: &GenerationRequest) -> Result<Generation, GenerationError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut last) = self.last_request.lock() {
            *last = Some(request.clone());
        }

        self.wait(&request.constraints)?;

        if self.fail_on == Some(call) {
            return Err(GenerationError::Rejected {
                message: format!("scripted failure on call {call}"),
            });
        }

        let text = self.reply_text(call, request);
        Ok(Generation {
            tokens_used: text.split_whitespace().count() as u64,
            content: Value::String(text),
            justification: format!("generated from context: {}", Value::Object(request.context.clone())),
            confidence: self.confidence,
            model: self.model.clone(),
            cost: 0.0,
            timestamp: now_millis(),
        })
    }

    fn critique(&self, symbol_id: &str, _target: &Value) -> Result<Vec<Delta>, GenerationError> {
        if let Some(deltas) = &self.deltas {
            return Ok(deltas.clone());
        }
        let mut changes = serde_json::Map::new();
        changes.insert("improvement".into(), json!("Add more detail"));
        Ok(vec![Delta {
            op: DeltaOp::Update,
            target: symbol_id.to_string(),
            changes,
            reason: "Current content lacks specificity".into(),
            confidence: 0.6,
        }])
    }

    fn propose_relation(
        &self,
        _symbol_a: &str,
        _symbol_b: &str,
        relation_hint: &str,
    ) -> Result<Vec<RelationCandidate>, GenerationError> {
        if let Some(relations) = &self.relations {
            return Ok(relations.clone());
        }
        Ok(vec![RelationCandidate {
            relation: relation_hint.to_string(),
            confidence: 0.8,
        }])
    }

    fn embed(&self, payload: &Value) -> Result<Vec<f32>, GenerationError> {
        let digest = Sha256::digest(payload_text(payload).as_bytes());
        Ok((0..self.dimension)
            .map(|i| {
                let byte = digest[i % digest.len()] ^ (i / digest.len()) as u8;
                f32::from(byte) / 255.0 - 0.5
            })
            .collect())
    }
}
