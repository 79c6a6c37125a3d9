//! Evaluation loop: a bounded, deterministic multi-step driver.
//!
//! Each step builds a task for the goal, prompts the kernel to create a step
//! symbol, and audits the reply. The run ends when a reply carries a
//! completion marker, when a step fails, or after `max_steps` steps:
//!
//! ```text
//! Running(i) ──reply w/ marker──▶ Completed
//!     │ ──port/kernel error──────▶ Failed
//!     │ ──cancelled──────────────▶ Failed
//!     │ ──i == max_steps─────────▶ Exhausted
//!     └──otherwise──────────────▶ Running(i + 1)
//! ```
//!
//! No step is retried. Step symbol ids are `<goal>:step:<i>`; each step is
//! linked from the previous one (or from the goal symbol, if it exists) by a
//! `parent` edge.

pub mod auditor;
pub mod planner;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::graph::GraphSnapshot;
use crate::kernel::{Kernel, PromptSpec};
pub use crate::port::CancelFlag;
use crate::port::{GenerationConstraints, GenerationError};
use crate::symbol::{keys, Meta, Symbol};

use auditor::{Auditor, CompletionAuditor};
use planner::{DefaultPlanner, PlanContext, Planner};

/// Symbol type of step symbols.
pub const STEP_KIND: &str = "evaluation_step";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a careful reasoning engine working inside a \
symbolic knowledge graph. Work step by step toward the goal and say plainly once the goal is met.";

/// Id of the symbol created for step `index` of `goal_id`.
pub fn step_symbol_id(goal_id: &str, index: usize) -> String {
    format!("{goal_id}:step:{index}")
}

/// Id recorded for a failed step. No symbol is created under it.
pub fn error_step_id(goal_id: &str, index: usize) -> String {
    format!("{goal_id}:error:{index}")
}

/// Tunables for the evaluation loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EvaluatorConfig {
    /// Step budget when the goal names none.
    pub default_max_steps: usize,
    /// Recent steps summarized into each task.
    pub history_window: usize,
    /// Characters kept per summarized step.
    pub summary_chars: usize,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-step generation deadline.
    pub step_timeout_secs: Option<f64>,
    /// Replies must be longer than this (after trimming) to be accepted.
    pub min_accept_chars: usize,
    /// Replies reporting a confidence must exceed this to be accepted.
    pub min_accept_confidence: f32,
    /// Used when the goal names none.
    pub system_prompt: String,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            default_max_steps: 10,
            history_window: 3,
            summary_chars: 200,
            temperature: 0.7,
            max_tokens: 2000,
            step_timeout_secs: None,
            min_accept_chars: 10,
            min_accept_confidence: 0.3,
            system_prompt: DEFAULT_SYSTEM_PROMPT.into(),
        }
    }
}

impl EvaluatorConfig {
    fn constraints(&self) -> GenerationConstraints {
        GenerationConstraints {
            max_tokens: Some(self.max_tokens),
            temperature: Some(self.temperature),
            timeout: self
                .step_timeout_secs
                .filter(|s| s.is_finite() && *s > 0.0)
                .map(Duration::from_secs_f64),
            cancel: None,
        }
    }
}

/// What the loop works toward.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub spec: Value,
    pub max_steps: Option<usize>,
    pub system_prompt: Option<String>,
}

impl Goal {
    pub fn new(id: impl Into<String>, spec: Value) -> Self {
        Self {
            id: id.into(),
            spec,
            max_steps: None,
            system_prompt: None,
        }
    }

    /// A goal whose spec is an existing symbol's payload.
    pub fn from_symbol(symbol: &Symbol) -> Self {
        Self::new(symbol.id.clone(), symbol.payload.clone())
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }
}

/// Record of one loop iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationStep {
    /// 1-based.
    pub step_index: usize,
    pub symbol_id: String,
    pub task: String,
    /// Reply text, or the failure reason for an error step.
    pub response: String,
    pub accepted: bool,
    pub reason: String,
    pub confidence: Option<f32>,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoopOutcome {
    Completed,
    Failed { reason: String },
    Exhausted,
}

/// Full account of a run.
#[derive(Debug, Clone, Serialize)]
pub struct EvaluationResult {
    pub goal_id: String,
    pub steps: Vec<EvaluationStep>,
    pub completed: bool,
    pub outcome: LoopOutcome,
    pub total_steps: usize,
    pub invariant_violations: Vec<String>,
    pub final_snapshot: GraphSnapshot,
}

/// Drives the evaluation loop against a kernel.
#[derive(Debug)]
pub struct Evaluator<P = DefaultPlanner, A = CompletionAuditor> {
    config: EvaluatorConfig,
    planner: P,
    auditor: A,
    cancel: CancelFlag,
}

impl Evaluator {
    /// An evaluator with the default planner and auditor tuned by `config`.
    pub fn new(config: EvaluatorConfig) -> Self {
        let planner = DefaultPlanner {
            history_window: config.history_window,
            summary_chars: config.summary_chars,
        };
        let auditor = CompletionAuditor {
            min_chars: config.min_accept_chars,
            min_confidence: config.min_accept_confidence,
        };
        Self {
            config,
            planner,
            auditor,
            cancel: CancelFlag::new(),
        }
    }
}

impl Default for Evaluator {
    fn default() -> Self {
        Self::new(EvaluatorConfig::default())
    }
}

impl<P: Planner, A: Auditor> Evaluator<P, A> {
    pub fn with_planner<Q: Planner>(self, planner: Q) -> Evaluator<Q, A> {
        Evaluator {
            config: self.config,
            planner,
            auditor: self.auditor,
            cancel: self.cancel,
        }
    }

    pub fn with_auditor<B: Auditor>(self, auditor: B) -> Evaluator<P, B> {
        Evaluator {
            config: self.config,
            planner: self.planner,
            auditor,
            cancel: self.cancel,
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// A handle that cancels runs of this evaluator.
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Run the loop for `goal` until completion, failure, or the step budget.
    ///
    /// Generation failures end the run with an error step; they are not returned.
    pub fn run(&self, kernel: &mut Kernel, goal: &Goal) -> EvaluationResult {
        let max_steps = goal.max_steps.unwrap_or(self.config.default_max_steps);
        let system_prompt = goal
            .system_prompt
            .clone()
            .unwrap_or_else(|| self.config.system_prompt.clone());
        let goal_anchored = kernel.symbol(&goal.id).is_some();

        tracing::info!(goal = %goal.id, max_steps, goal_anchored, "starting evaluation");

        let mut steps: Vec<EvaluationStep> = Vec::new();
        let mut outcome = LoopOutcome::Exhausted;

        for index in 1..=max_steps {
            let task = self.planner.task(&PlanContext {
                goal,
                step: index,
                max_steps,
                history: &steps,
            });

            if self.cancel.is_cancelled() {
                let reason = GenerationError::Cancelled.to_string();
                steps.push(error_step(goal, index, task, &reason));
                outcome = LoopOutcome::Failed { reason };
                break;
            }

            let symbol_id = step_symbol_id(&goal.id, index);
            if kernel.symbol(&symbol_id).is_some() {
                tracing::warn!(symbol_id = %symbol_id, "step symbol exists and will be overwritten");
            }

            let parent = match steps.last() {
                Some(prev) => Some(prev.symbol_id.clone()),
                None if goal_anchored => Some(goal.id.clone()),
                None => None,
            };

            let mut context = serde_json::Map::new();
            context.insert("goal_id".into(), json!(goal.id));
            context.insert("step".into(), json!(index));
            context.insert("max_steps".into(), json!(max_steps));
            context.insert("system_prompt".into(), json!(system_prompt));

            let mut meta = Meta::new();
            meta.insert("goal_id".into(), json!(goal.id));
            meta.insert("step_index".into(), json!(index));
            meta.insert("step_type".into(), json!("reasoning"));

            let spec = PromptSpec {
                task: Some(task.clone()),
                context,
                constraints: GenerationConstraints {
                    cancel: Some(self.cancel.clone()),
                    ..self.config.constraints()
                },
                parent,
                kind: Some(STEP_KIND.into()),
                meta,
            };

            match kernel.prompt(&symbol_id, spec) {
                Ok(symbol) => {
                    let response = symbol.payload_text();
                    let confidence = symbol
                        .meta
                        .get(keys::CONFIDENCE)
                        .and_then(Value::as_f64)
                        .map(|c| c as f32);
                    let verdict = self.auditor.audit(&response, confidence);

                    tracing::debug!(
                        goal = %goal.id,
                        step = index,
                        accepted = verdict.accepted,
                        complete = verdict.complete,
                        "step recorded"
                    );

                    steps.push(EvaluationStep {
                        step_index: index,
                        symbol_id,
                        task,
                        response,
                        accepted: verdict.accepted,
                        reason: verdict.reason,
                        confidence,
                    });

                    if verdict.complete {
                        outcome = LoopOutcome::Completed;
                        break;
                    }
                }
                Err(e) => {
                    tracing::warn!(goal = %goal.id, step = index, error = %e, "step failed, stopping");
                    let reason = e.to_string();
                    steps.push(error_step(goal, index, task, &reason));
                    outcome = LoopOutcome::Failed { reason };
                    break;
                }
            }
        }

        let final_snapshot = kernel.snapshot();
        let completed = outcome == LoopOutcome::Completed;

        tracing::info!(
            goal = %goal.id,
            steps = steps.len(),
            completed,
            outcome = ?outcome,
            "evaluation finished"
        );

        EvaluationResult {
            goal_id: goal.id.clone(),
            total_steps: steps.len(),
            steps,
            completed,
            outcome,
            invariant_violations: final_snapshot.metadata().invariant_violations.clone(),
            final_snapshot,
        }
    }
}

fn error_step(goal: &Goal, index: usize, task: String, reason: &str) -> EvaluationStep {
    EvaluationStep {
        step_index: index,
        symbol_id: error_step_id(&goal.id, index),
        task,
        response: format!("Error: {reason}"),
        accepted: false,
        reason: format!("generation error: {reason}"),
        confidence: None,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::port::mock::MockPort;
    use crate::symbol::SymbolSpec;

    fn kernel_with(port: MockPort) -> (Arc<MockPort>, Kernel) {
        let port = Arc::new(port);
        let kernel = Kernel::with_port(port.clone());
        (port, kernel)
    }

    #[test]
    fn completes_on_marker() {
        let (_, mut kernel) = kernel_with(MockPort::new().complete_on(2));
        let goal = Goal::new("g", json!("write a haiku")).with_max_steps(5);
        let result = Evaluator::default().run(&mut kernel, &goal);

        assert!(result.completed);
        assert_eq!(result.outcome, LoopOutcome::Completed);
        assert_eq!(result.total_steps, 2);
        assert!(result.final_snapshot.symbol("g:step:1").is_some());
        assert!(result.final_snapshot.symbol("g:step:2").is_some());
        assert!(result.final_snapshot.symbol("g:step:3").is_none());
    }

    #[test]
    fn exhausts_budget_without_marker() {
        let (port, mut kernel) = kernel_with(MockPort::new().with_replies(["thinking harder"]));
        let goal = Goal::new("g", json!("x")).with_max_steps(4);
        let result = Evaluator::default().run(&mut kernel, &goal);

        assert!(!result.completed);
        assert_eq!(result.outcome, LoopOutcome::Exhausted);
        assert_eq!(result.total_steps, 4);
        assert_eq!(port.calls(), 4);
    }

    #[test]
    fn failure_records_error_step_and_stops() {
        let (port, mut kernel) = kernel_with(MockPort::new().fail_on(2));
        let goal = Goal::new("g", json!("x")).with_max_steps(5);
        let result = Evaluator::default().run(&mut kernel, &goal);

        assert!(!result.completed);
        assert!(matches!(result.outcome, LoopOutcome::Failed { .. }));
        assert_eq!(result.steps.len(), 2);
        let last = &result.steps[1];
        assert_eq!(last.symbol_id, "g:error:2");
        assert!(!last.accepted);
        assert!(last.response.starts_with("Error:"));
        assert_eq!(port.calls(), 2);
        assert_eq!(result.final_snapshot.symbol_count(), 1);
    }

    #[test]
    fn timeout_maps_to_error_step() {
        let (_, mut kernel) =
            kernel_with(MockPort::new().with_latency(Duration::from_millis(50)));
        let config = EvaluatorConfig {
            step_timeout_secs: Some(0.005),
            ..Default::default()
        };
        let goal = Goal::new("g", json!("x")).with_max_steps(3);
        let result = Evaluator::new(config).run(&mut kernel, &goal);

        assert_eq!(result.steps.len(), 1);
        assert!(result.steps[0].response.contains("timed out"));
        assert!(matches!(result.outcome, LoopOutcome::Failed { .. }));
    }

    #[test]
    fn cancelled_run_never_calls_port() {
        let (port, mut kernel) = kernel_with(MockPort::new());
        let evaluator = Evaluator::default();
        evaluator.cancel_flag().cancel();
        let result = evaluator.run(&mut kernel, &Goal::new("g", json!("x")));

        assert_eq!(port.calls(), 0);
        assert_eq!(result.steps.len(), 1);
        assert_eq!(result.steps[0].symbol_id, "g:error:1");
        assert!(!result.completed);
    }

    #[test]
    fn steps_form_a_warranted_chain_from_the_goal() {
        let (_, mut kernel) = kernel_with(MockPort::new());
        kernel
            .create_symbol(SymbolSpec::new("g", "goal", json!({"task": "test"})))
            .unwrap();
        let goal = Goal::from_symbol(&kernel.symbol("g").unwrap()).with_max_steps(3);
        let result = Evaluator::default().run(&mut kernel, &goal);

        let snap = &result.final_snapshot;
        assert_eq!(snap.edges_from("g")[0].dst, "g:step:1");
        assert_eq!(snap.edges_from("g:step:1")[0].dst, "g:step:2");
        assert_eq!(snap.edges_from("g:step:2")[0].dst, "g:step:3");
        assert_eq!(snap.symbol("g:step:2").unwrap().lineage, vec!["g:step:1".to_string()]);
        assert!(snap.edges().all(|e| !e.warrant.is_empty()));
    }

    #[test]
    fn later_steps_see_earlier_replies() {
        let (_, mut kernel) = kernel_with(MockPort::new().with_replies(["alpha reply text", "beta reply text"]));
        let goal = Goal::new("g", json!("x")).with_max_steps(2);
        let result = Evaluator::default().run(&mut kernel, &goal);

        assert!(result.steps[1].task.contains("Step 1: alpha reply text"));
    }

    #[test]
    fn zero_budget_produces_no_steps() {
        let (port, mut kernel) = kernel_with(MockPort::new());
        let goal = Goal::new("g", json!("x")).with_max_steps(0);
        let result = Evaluator::default().run(&mut kernel, &goal);
        assert_eq!(result.total_steps, 0);
        assert_eq!(result.outcome, LoopOutcome::Exhausted);
        assert_eq!(port.calls(), 0);
    }
}
