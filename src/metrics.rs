//! Prometheus metrics for the assistant
//!
//! All metrics live in the default global registry. `encode_metrics()`
//! renders them in the Prometheus text format for the `/metrics` command.

use lazy_static::lazy_static;
use prometheus::{
    register_counter_vec, register_gauge, register_histogram, register_histogram_vec,
    CounterVec, Encoder, Gauge, Histogram, HistogramVec, TextEncoder,
};

lazy_static! {
    // ─────────────────────────────────────────────────────────────────────────────
    // Task Loop Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Finished task runs by outcome.
    ///
    /// Labels:
    /// - outcome: "completed", "failed", "step_exhausted"
    pub static ref AGENT_TASKS: CounterVec = register_counter_vec!(
        "shellpilot_agent_tasks_total",
        "Agent task runs by outcome",
        &["outcome"]
    ).expect("failed to register AGENT_TASKS metric");

    /// Steps taken per task run.
    pub static ref AGENT_STEPS: Histogram = register_histogram!(
        "shellpilot_agent_steps",
        "Steps taken per agent task run",
        vec![1.0, 2.0, 3.0, 5.0, 8.0, 10.0, 15.0]
    ).expect("failed to register AGENT_STEPS metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Shell Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Commands written to shell sessions.
    ///
    /// Labels:
    /// - shell: shell kind ("bash", "sh", "powershell", "cmd")
    /// - framed: "true" if the completion marker was seen before the timeout
    pub static ref SHELL_COMMANDS: CounterVec = register_counter_vec!(
        "shellpilot_shell_commands_total",
        "Commands executed in shell sessions",
        &["shell", "framed"]
    ).expect("failed to register SHELL_COMMANDS metric");

    /// Shell sessions currently open.
    pub static ref SHELL_SESSIONS_OPEN: Gauge = register_gauge!(
        "shellpilot_shell_sessions_open",
        "Shell sessions currently open"
    ).expect("failed to register SHELL_SESSIONS_OPEN metric");

    // ─────────────────────────────────────────────────────────────────────────────
    // Remote Call Metrics
    // ─────────────────────────────────────────────────────────────────────────────

    /// Completion call latency.
    ///
    /// Labels:
    /// - purpose: "proposal", "intent", "chat"
    pub static ref LLM_CALL_TIME: HistogramVec = register_histogram_vec!(
        "shellpilot_llm_call_duration_seconds",
        "Remote completion call duration",
        &["purpose"],
        vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]
    ).expect("failed to register LLM_CALL_TIME metric");

    /// Intent classification decisions.
    ///
    /// Labels:
    /// - intent: "chat" or "task"
    /// - source: "model" or "heuristic"
    pub static ref INTENT_DECISIONS: CounterVec = register_counter_vec!(
        "shellpilot_intent_decisions_total",
        "Intent classifier decisions",
        &["intent", "source"]
    ).expect("failed to register INTENT_DECISIONS metric");
}

/// Render all registered metrics in the Prometheus text format
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::warn!(error = %e, "failed to encode metrics");
    }
    String::from_utf8_lossy(&buffer).into_owned()
}
