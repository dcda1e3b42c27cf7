//! Activities — the append-only progress log of a run.
//!
//! One row per emission, identified by `(run_id, seq)`. `seq` starts at 1
//! and is contiguous per run; it is the canonical ordering for both SSE
//! replay and poll cursors. Payloads are built through the typed
//! constructors below and stored opaquely as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::mode::{Depth, Mode};
use crate::run::ExecutionCounts;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Activity kind
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivityKind {
    #[serde(rename = "run.init")]
    RunInit,
    #[serde(rename = "thinking")]
    Thinking,
    #[serde(rename = "tool.call")]
    ToolCall,
    #[serde(rename = "tool.result")]
    ToolResult,
    #[serde(rename = "tool.error")]
    ToolError,
    #[serde(rename = "section.drafted")]
    SectionDrafted,
    #[serde(rename = "run.progress")]
    RunProgress,
    #[serde(rename = "run.completed")]
    RunCompleted,
    #[serde(rename = "run.failed")]
    RunFailed,
    #[serde(rename = "run.cancelled")]
    RunCancelled,
    #[serde(rename = "heartbeat")]
    Heartbeat,
}

impl ActivityKind {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::RunCompleted | Self::RunFailed | Self::RunCancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::RunInit => "run.init",
            Self::Thinking => "thinking",
            Self::ToolCall => "tool.call",
            Self::ToolResult => "tool.result",
            Self::ToolError => "tool.error",
            Self::SectionDrafted => "section.drafted",
            Self::RunProgress => "run.progress",
            Self::RunCompleted => "run.completed",
            Self::RunFailed => "run.failed",
            Self::RunCancelled => "run.cancelled",
            Self::Heartbeat => "heartbeat",
        }
    }
}

/// The phase a `thinking` activity belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThoughtType {
    Planning,
    Analyzing,
    Synthesis,
    SelfCritique,
    Pivot,
    Writing,
    FinalReview,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Activity row
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    pub run_id: Uuid,
    /// 1-based, contiguous per run, allocated atomically at append time.
    pub seq: u64,
    pub kind: ActivityKind,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Typed payload constructors (stable wire shapes)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub fn run_init_payload(
    mode: Mode,
    goal: &str,
    depth: Depth,
    requested_charts: &[crate::chart::ChartKind],
    template_type: Option<crate::template::TemplateType>,
) -> Value {
    let mut payload = json!({
        "mode": mode,
        "goal": goal,
        "depth": depth,
    });
    if !requested_charts.is_empty() {
        payload["requestedCharts"] = json!(requested_charts);
    }
    if let Some(t) = template_type {
        payload["templateType"] = json!(t);
    }
    payload
}

pub fn thinking_payload(thought: &str, thought_type: ThoughtType) -> Value {
    json!({ "thought": thought, "thoughtType": thought_type })
}

pub fn tool_call_payload(tool: &str, parameters: Value, reasoning: &str) -> Value {
    json!({ "tool": tool, "parameters": parameters, "reasoning": reasoning })
}

pub fn tool_result_payload(
    tool: &str,
    summary: &str,
    counts: Option<(usize, usize)>,
    artifact_key: Option<&str>,
) -> Value {
    let mut payload = json!({ "tool": tool, "summary": summary });
    if let Some((findings, sources)) = counts {
        payload["counts"] = json!({ "findings": findings, "sources": sources });
    }
    if let Some(key) = artifact_key {
        payload["artifactKey"] = json!(key);
    }
    payload
}

pub fn tool_error_payload(tool: &str, error_kind: &str, message: &str) -> Value {
    json!({ "tool": tool, "errorKind": error_kind, "message": message })
}

pub fn section_drafted_payload(section_name: &str, char_count: usize) -> Value {
    json!({ "sectionName": section_name, "charCount": char_count })
}

pub fn run_progress_payload(completed: usize, total: usize) -> Value {
    json!({ "completed": completed, "total": total })
}

pub fn run_completed_payload(
    final_content: &str,
    counts: &ExecutionCounts,
    metadata: Value,
) -> Value {
    json!({
        "finalContent": final_content,
        "counts": { "findings": counts.findings, "sources": counts.sources, "charts": counts.charts },
        "metadata": metadata,
    })
}

pub fn run_failed_payload(error_kind: &str, message: &str) -> Value {
    json!({ "errorKind": error_kind, "message": message })
}

pub fn run_cancelled_payload() -> Value {
    json!({})
}

pub fn heartbeat_payload(server_time: DateTime<Utc>) -> Value {
    json!({ "serverTime": server_time })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartKind;

    #[test]
    fn kind_wire_names() {
        assert_eq!(
            serde_json::to_value(ActivityKind::RunInit).unwrap(),
            "run.init"
        );
        assert_eq!(
            serde_json::to_value(ActivityKind::ToolError).unwrap(),
            "tool.error"
        );
        assert_eq!(
            serde_json::to_value(ActivityKind::RunCancelled).unwrap(),
            "run.cancelled"
        );
    }

    #[test]
    fn kind_as_str_matches_serde() {
        for kind in [
            ActivityKind::RunInit,
            ActivityKind::Thinking,
            ActivityKind::ToolCall,
            ActivityKind::ToolResult,
            ActivityKind::ToolError,
            ActivityKind::SectionDrafted,
            ActivityKind::RunProgress,
            ActivityKind::RunCompleted,
            ActivityKind::RunFailed,
            ActivityKind::RunCancelled,
            ActivityKind::Heartbeat,
        ] {
            assert_eq!(
                serde_json::to_value(kind).unwrap(),
                serde_json::Value::String(kind.as_str().into())
            );
        }
    }

    #[test]
    fn terminal_kinds() {
        assert!(ActivityKind::RunCompleted.is_terminal());
        assert!(ActivityKind::RunFailed.is_terminal());
        assert!(ActivityKind::RunCancelled.is_terminal());
        assert!(!ActivityKind::ToolResult.is_terminal());
        assert!(!ActivityKind::Heartbeat.is_terminal());
    }

    #[test]
    fn run_init_payload_omits_empty_optionals() {
        let payload = run_init_payload(Mode::Research, "goal", Depth::Medium, &[], None);
        assert!(payload.get("requestedCharts").is_none());
        assert!(payload.get("templateType").is_none());
        assert_eq!(payload["mode"], "research");
        assert_eq!(payload["depth"], "medium");
    }

    #[test]
    fn run_init_payload_includes_charts_when_requested() {
        let payload = run_init_payload(
            Mode::Charts,
            "goal",
            Depth::Medium,
            &[ChartKind::Radar, ChartKind::Stackedbar],
            None,
        );
        assert_eq!(payload["requestedCharts"], json!(["radar", "stackedbar"]));
    }

    #[test]
    fn tool_result_payload_shape() {
        let payload = tool_result_payload("search_web", "12 findings", Some((12, 4)), None);
        assert_eq!(payload["counts"]["findings"], 12);
        assert_eq!(payload["counts"]["sources"], 4);
        assert!(payload.get("artifactKey").is_none());
    }

    #[test]
    fn thinking_payload_shape() {
        let payload = thinking_payload("splitting into topics", ThoughtType::Planning);
        assert_eq!(payload["thoughtType"], "planning");
    }
}
