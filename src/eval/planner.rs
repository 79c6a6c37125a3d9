//! Planner: builds the task text for each evaluation step.

use super::{EvaluationStep, Goal};

/// What a planner sees when building a step's task.
#[derive(Debug, Clone, Copy)]
pub struct PlanContext<'a> {
    pub goal: &'a Goal,
    /// 1-based step index.
    pub step: usize,
    pub max_steps: usize,
    /// Steps already taken in this run, oldest first.
    pub history: &'a [EvaluationStep],
}

/// Builds the task description sent to the generation port for a step.
pub trait Planner {
    fn task(&self, ctx: &PlanContext<'_>) -> String;
}

/// Restates the goal, summarizes a bounded window of recent steps, and asks
/// for a completion marker.
#[derive(Debug, Clone)]
pub struct DefaultPlanner {
    /// How many recent steps to summarize.
    pub history_window: usize,
    /// Characters kept from each summarized response.
    pub summary_chars: usize,
}

impl Default for DefaultPlanner {
    fn default() -> Self {
        Self {
            history_window: 3,
            summary_chars: 200,
        }
    }
}

impl Planner for DefaultPlanner {
    fn task(&self, ctx: &PlanContext<'_>) -> String {
        let mut task = format!("Goal: {}\n\nStep {}:\n", ctx.goal.spec, ctx.step);

        if !ctx.history.is_empty() {
            task.push_str("\nPrevious steps:\n");
            let skip = ctx.history.len().saturating_sub(self.history_window);
            for step in &ctx.history[skip..] {
                let summary: String = step.response.chars().take(self.summary_chars).collect();
                task.push_str(&format!("Step {}: {summary}...\n", step.step_index));
            }
            task.push('\n');
        }

        task.push_str(
            "Continue working toward the goal. If complete, end your response with \"COMPLETE\".\n",
        );
        task
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn step(index: usize, response: &str) -> EvaluationStep {
        EvaluationStep {
            step_index: index,
            symbol_id: format!("g:step:{index}"),
            task: String::new(),
            response: response.into(),
            accepted: true,
            reason: String::new(),
            confidence: None,
        }
    }

    #[test]
    fn first_step_has_no_history() {
        let goal = Goal::new("g", json!({"task": "plan a trip"}));
        let task = DefaultPlanner::default().task(&PlanContext {
            goal: &goal,
            step: 1,
            max_steps: 3,
            history: &[],
        });
        assert!(task.starts_with("Goal: {\"task\":\"plan a trip\"}"));
        assert!(task.contains("Step 1:"));
        assert!(!task.contains("Previous steps"));
        assert!(task.contains("COMPLETE"));
    }

    #[test]
    fn history_is_windowed_and_truncated() {
        let goal = Goal::new("g", json!("x"));
        let history: Vec<_> = (1..=5)
            .map(|i| step(i, &format!("response {i} {}", "z".repeat(300))))
            .collect();
        let planner = DefaultPlanner::default();
        let task = planner.task(&PlanContext {
            goal: &goal,
            step: 6,
            max_steps: 10,
            history: &history,
        });
        assert!(!task.contains("Step 2: "));
        assert!(task.contains("Step 3: response 3"));
        assert!(task.contains("Step 5: response 5"));
        assert!(!task.contains(&"z".repeat(250)));
    }
}
