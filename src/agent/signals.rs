//! Signal completeness: which required diagnostics were actually obtained.

use crate::tools::ToolDefinition;
use crate::types::{RequiredSignal, SignalState, SignalStatus, ToolExecutionResult};

/// One status per required signal, reflecting what was actually obtained.
pub fn derive_signal_statuses(
    catalog: &[ToolDefinition],
    results: &[ToolExecutionResult],
    required: &[RequiredSignal],
) -> Vec<SignalStatus> {
    required
        .iter()
        .map(|signal| {
            let (status, notes) = signal_state(catalog, results, &signal.tool);
            SignalStatus {
                key: signal.key.clone(),
                name: signal.name.clone(),
                tool: signal.tool.clone(),
                status,
                notes,
            }
        })
        .collect()
}

fn signal_state(
    catalog: &[ToolDefinition],
    results: &[ToolExecutionResult],
    tool: &str,
) -> (SignalState, String) {
    if !catalog.iter().any(|def| def.name == tool) {
        return (SignalState::Unsupported, "tool not registered".into());
    }

    let runs: Vec<&ToolExecutionResult> = results.iter().filter(|r| r.step.tool == tool).collect();
    if runs.is_empty() {
        return (SignalState::NotCollected, "tool was not run for this query".into());
    }
    if runs.iter().any(|r| r.outcome.is_success()) {
        return (SignalState::Collected, String::new());
    }

    let error = runs
        .iter()
        .find_map(|r| r.outcome.error())
        .unwrap_or_default()
        .to_string();
    (SignalState::Error, error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::default_signals;
    use crate::tools::empty_schema;
    use crate::types::{StepOutcome, ToolPlanStep};
    use serde_json::json;

    fn def(name: &str) -> ToolDefinition {
        ToolDefinition {
            name: name.into(),
            description: String::new(),
            parameters: empty_schema(),
        }
    }

    fn result(tool: &str, outcome: StepOutcome) -> ToolExecutionResult {
        ToolExecutionResult {
            step: ToolPlanStep::new(tool, json!({})),
            description: String::new(),
            outcome,
            duration_ms: 1,
        }
    }

    #[test]
    fn every_required_signal_gets_a_status() {
        let catalog = vec![
            def("show_status"),
            def("show_connections"),
            def("show_processlist"),
            def("innodb_trx"),
            def("innodb_status"),
        ];
        let results = vec![
            result("show_status", StepOutcome::Success { output: json!({}) }),
            result(
                "innodb_trx",
                StepOutcome::Error {
                    error: "Access denied; you need the PROCESS privilege".into(),
                },
            ),
        ];

        let statuses = derive_signal_statuses(&catalog, &results, &default_signals());
        assert_eq!(statuses.len(), 6);

        let by_key = |key: &str| statuses.iter().find(|s| s.key == key).unwrap();
        assert_eq!(by_key("server_status").status, SignalState::Collected);
        assert!(by_key("server_status").notes.is_empty());
        assert_eq!(by_key("connection_usage").status, SignalState::NotCollected);
        assert_eq!(by_key("active_sessions").status, SignalState::NotCollected);
        assert_eq!(by_key("slow_queries").status, SignalState::Unsupported);
        assert_eq!(by_key("slow_queries").notes, "tool not registered");
        assert_eq!(by_key("lock_waits").status, SignalState::Error);
        assert!(by_key("lock_waits").notes.contains("PROCESS privilege"));
        assert_eq!(by_key("engine_status").status, SignalState::NotCollected);
    }

    #[test]
    fn empty_plan_collects_nothing() {
        let catalog = vec![def("show_status")];
        let required = vec![RequiredSignal::new("server_status", "Server status", "show_status")];

        let statuses = derive_signal_statuses(&catalog, &[], &required);
        assert_eq!(statuses[0].status, SignalState::NotCollected);
    }
}
