//! Sequential plan execution with per-step failure isolation.

use crate::error::ToolError;
use crate::inference::truncate;
use crate::tools::ToolRegistry;
use crate::types::{StepOutcome, ToolExecutionResult, ToolPlanStep};
use tokio::time::Instant;
use tracing::{debug, info, warn};

const LOG_PREVIEW: usize = 256;

/// Run every step in plan order and record one result per step.
///
/// A failing step never stops the plan. Once `deadline` has passed, the
/// remaining steps are recorded as deadline failures without being invoked.
pub async fn execute(
    registry: &ToolRegistry,
    plan: &[ToolPlanStep],
    deadline: Instant,
) -> Vec<ToolExecutionResult> {
    let mut results = Vec::with_capacity(plan.len());

    for (idx, step) in plan.iter().enumerate() {
        let started = Instant::now();
        let (description, outcome) = run_step(registry, step, deadline).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(output) => {
                info!("[{}/{}] {} ok ({}ms)", idx + 1, plan.len(), step.tool, duration_ms);
                debug!(
                    "{} params={} output={}",
                    step.tool,
                    truncate(&step.params.to_string(), LOG_PREVIEW),
                    truncate(&output.to_string(), LOG_PREVIEW)
                );
            }
            Err(e) => warn!(
                "[{}/{}] {} failed ({}ms): {}",
                idx + 1,
                plan.len(),
                step.tool,
                duration_ms,
                e
            ),
        }

        results.push(ToolExecutionResult {
            step: step.clone(),
            description,
            outcome: match outcome {
                Ok(output) => StepOutcome::Success { output },
                Err(e) => StepOutcome::Error {
                    error: e.to_string(),
                },
            },
            duration_ms,
        });
    }

    results
}

async fn run_step(
    registry: &ToolRegistry,
    step: &ToolPlanStep,
    deadline: Instant,
) -> (String, Result<serde_json::Value, ToolError>) {
    let Some((tool, definition)) = registry.lookup(&step.tool) else {
        return (String::new(), Err(ToolError::NotRegistered(step.tool.clone())));
    };
    let description = definition.description.clone();

    if Instant::now() >= deadline {
        return (description, Err(ToolError::DeadlineExceeded(step.tool.clone())));
    }

    let outcome = tokio::time::timeout_at(deadline, tool.execute(&step.params))
        .await
        .unwrap_or_else(|_| Err(ToolError::DeadlineExceeded(step.tool.clone())));
    (description, outcome)
}
