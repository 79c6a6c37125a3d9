//! Generation port: the boundary to whatever service proposes content.
//!
//! The port is stateless between calls. It proposes content, critiques,
//! relations, and embeddings; the kernel alone decides what to write and
//! stamps provenance. Implementations must honor
//! [`GenerationConstraints::timeout`], stop with [`GenerationError::Cancelled`]
//! once [`GenerationConstraints::cancel`] is raised, and surface every
//! non-recoverable failure as a [`GenerationError`]. The kernel never retries.

pub mod mock;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Errors from the generation port.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum GenerationError {
    #[error("generation timed out after {timeout_ms}ms")]
    #[diagnostic(
        code(xi::port::timeout),
        help("Raise the per-call timeout or use a faster backend.")
    )]
    Timeout { timeout_ms: u64 },

    #[error("generation request rejected: {message}")]
    #[diagnostic(
        code(xi::port::rejected),
        help("The backend refused the request. Check credentials, quotas and request size.")
    )]
    Rejected { message: String },

    #[error("malformed generation response: {message}")]
    #[diagnostic(
        code(xi::port::malformed),
        help("The backend returned a response the port could not interpret.")
    )]
    Malformed { message: String },

    #[error("generation port \"{port}\" is unavailable")]
    #[diagnostic(
        code(xi::port::unavailable),
        help("Start the backend service or register a different port.")
    )]
    Unavailable { port: String },

    #[error("generation cancelled")]
    #[diagnostic(
        code(xi::port::cancelled),
        help("The caller cancelled the run before the port was invoked.")
    )]
    Cancelled,
}

/// Shared flag that asks in-flight and future calls to stop.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once raised.
    pub fn check(&self) -> Result<(), GenerationError> {
        if self.is_cancelled() {
            Err(GenerationError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Two flags are equal when they share state.
impl PartialEq for CancelFlag {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Output limits, per-call deadline, and cancellation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationConstraints {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Deadline for a single port call.
    pub timeout: Option<Duration>,
    /// Raised by the caller to abandon the call. Not part of the prompt hash.
    #[serde(skip)]
    pub cancel: Option<CancelFlag>,
}

impl GenerationConstraints {
    /// Whether the caller has cancelled this call.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }
}

/// Reject confidences outside `[0, 1]`, including NaN.
pub fn checked_confidence(confidence: f32, what: &str) -> Result<f32, GenerationError> {
    if (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(GenerationError::Malformed {
            message: format!("{what} confidence {confidence} is outside [0, 1]"),
        })
    }
}

/// Everything a port needs to propose content for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub symbol_id: String,
    pub task: String,
    pub context: serde_json::Map<String, Value>,
    pub constraints: GenerationConstraints,
}

impl GenerationRequest {
    /// SHA-256 of the request's JSON encoding, lowercase hex.
    pub fn content_hash(&self) -> String {
        let encoded = serde_json::to_string(self).unwrap_or_default();
        let digest = Sha256::digest(encoded.as_bytes());
        digest.iter().map(|b| format!("{b:02x}")).collect()
    }
}

/// A proposed piece of content with its resource accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Generation {
    pub content: Value,
    pub justification: String,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub tokens_used: u64,
    pub model: String,
    pub cost: f64,
    /// Milliseconds since the UNIX epoch.
    pub timestamp: u64,
}

/// Kind of change a critique proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaOp {
    Create,
    Update,
    Delete,
    Link,
}

/// One proposed change from a critique.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Delta {
    pub op: DeltaOp,
    pub target: String,
    pub changes: serde_json::Map<String, Value>,
    pub reason: String,
    pub confidence: f32,
}

/// A relation the port believes holds between two symbols.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationCandidate {
    pub relation: String,
    pub confidence: f32,
}

/// A stateless content-generation backend.
pub trait GenerationPort: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &str;

    /// Propose content for `request.symbol_id`.
    fn propose(&self, request: &GenerationRequest) -> Result<Generation, GenerationError>;

    /// Propose changes to an existing symbol.
    fn critique(&self, symbol_id: &str, target: &Value) -> Result<Vec<Delta>, GenerationError>;

    /// Propose relations from `symbol_a` to `symbol_b`.
    fn propose_relation(
        &self,
        symbol_a: &str,
        symbol_b: &str,
        relation_hint: &str,
    ) -> Result<Vec<RelationCandidate>, GenerationError>;

    /// Embed a payload into a fixed-length vector.
    fn embed(&self, payload: &Value) -> Result<Vec<f32>, GenerationError>;
}
