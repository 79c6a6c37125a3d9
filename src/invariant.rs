//! Invariant enforcer: a registry of named structural rules over graph snapshots.
//!
//! Rules are plain data (id, name, severity, message, check function) and are
//! evaluated uniformly in registration order. A check returns the list of
//! offending items; an empty list means the rule holds. Results are operator
//! diagnostics only and never block a mutation.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::graph::GraphSnapshot;
use crate::symbol::keys;

/// How a failed rule is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A rule check: returns the offending items, or an error if the check itself broke.
pub type RuleCheck = fn(&GraphSnapshot) -> Result<Vec<String>, String>;

/// A named structural rule.
#[derive(Debug, Clone)]
pub struct InvariantRule {
    pub id: String,
    pub name: String,
    pub severity: Severity,
    pub message: String,
    pub check: RuleCheck,
}

impl InvariantRule {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        check: RuleCheck,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            severity,
            message: message.into(),
            check,
        }
    }
}

/// Outcome of running every rule once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvariantReport {
    pub violations: Vec<String>,
    pub warnings: Vec<String>,
}

impl InvariantReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty() && self.warnings.is_empty()
    }

    /// Violations followed by warnings.
    pub fn all(&self) -> impl Iterator<Item = &str> {
        self.violations
            .iter()
            .chain(self.warnings.iter())
            .map(String::as_str)
    }
}

/// Ordered rule registry.
#[derive(Debug, Clone, Default)]
pub struct InvariantEnforcer {
    rules: Vec<InvariantRule>,
}

impl InvariantEnforcer {
    /// An enforcer with no rules.
    pub fn new() -> Self {
        Self::default()
    }

    /// An enforcer preloaded with [`core_rules`].
    pub fn with_core_rules() -> Self {
        let mut enforcer = Self::new();
        for rule in core_rules() {
            enforcer.add_rule(rule);
        }
        enforcer
    }

    /// Register a rule. A rule with the same id is replaced in place.
    pub fn add_rule(&mut self, rule: InvariantRule) {
        match self.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => self.rules.push(rule),
        }
    }

    pub fn rules(&self) -> &[InvariantRule] {
        &self.rules
    }

    /// Run every rule against `graph`.
    ///
    /// A rule whose check errors or panics is reported as an error naming the rule.
    pub fn check(&self, graph: &GraphSnapshot) -> InvariantReport {
        let mut report = InvariantReport::default();

        for rule in &self.rules {
            match catch_unwind(AssertUnwindSafe(|| (rule.check)(graph))) {
                Ok(Ok(offenders)) => {
                    let bucket = match rule.severity {
                        Severity::Error => &mut report.violations,
                        Severity::Warning => &mut report.warnings,
                    };
                    bucket.extend(
                        offenders
                            .into_iter()
                            .map(|o| format!("{}: {} [{o}]", rule.name, rule.message)),
                    );
                }
                Ok(Err(reason)) => report
                    .violations
                    .push(format!("{}: rule check failed - {reason}", rule.name)),
                Err(_) => report
                    .violations
                    .push(format!("{}: rule check failed - panicked", rule.name)),
            }
        }

        report
    }
}

// ---------------------------------------------------------------------------
// Core rules
// ---------------------------------------------------------------------------

pub const WRITE_THROUGH: &str = "write_through";
pub const PROVENANCE: &str = "provenance";
pub const LINEAGE_CLOSURE: &str = "lineage_closure";
pub const SYMBOL_FIRST: &str = "symbol_first";

/// The four rules every kernel ships with.
pub fn core_rules() -> Vec<InvariantRule> {
    vec![
        InvariantRule::new(
            WRITE_THROUGH,
            "Write-Through Kernel",
            Severity::Error,
            "all mutations must go through the kernel",
            check_write_through,
        ),
        InvariantRule::new(
            PROVENANCE,
            "Provenance Tracking",
            Severity::Error,
            "symbols must carry model, prompt hash and timestamp",
            check_provenance,
        ),
        InvariantRule::new(
            LINEAGE_CLOSURE,
            "Lineage Closure",
            Severity::Error,
            "all edges must have warrants",
            check_lineage_closure,
        ),
        InvariantRule::new(
            SYMBOL_FIRST,
            "Symbol-First Discipline",
            Severity::Warning,
            "vectors must be anchored to a symbol created first",
            check_symbol_first,
        ),
    ]
}

fn check_write_through(graph: &GraphSnapshot) -> Result<Vec<String>, String> {
    Ok(graph
        .symbols()
        .filter(|s| !s.is_kernel_written())
        .map(|s| format!("symbol {}", s.id))
        .collect())
}

fn check_provenance(graph: &GraphSnapshot) -> Result<Vec<String>, String> {
    const REQUIRED: [&str; 3] = [keys::MODEL, keys::PROMPT_HASH, keys::TIMESTAMP];
    Ok(graph
        .symbols()
        .filter(|s| !REQUIRED.iter().all(|k| s.meta.contains_key(*k)))
        .map(|s| format!("symbol {}", s.id))
        .collect())
}

fn check_lineage_closure(graph: &GraphSnapshot) -> Result<Vec<String>, String> {
    Ok(graph
        .edges()
        .filter(|e| e.warrant.is_empty())
        .map(|e| format!("edge {}->{}", e.src, e.dst))
        .collect())
}

fn check_symbol_first(graph: &GraphSnapshot) -> Result<Vec<String>, String> {
    Ok(graph
        .symbols()
        .filter(|s| s.flag(keys::VECTOR_EMBEDDING) && !s.flag(keys::SYMBOL_FIRST))
        .map(|s| format!("symbol {}", s.id))
        .collect())
}
