//! Planner output — a typed, validated list of tool calls.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::chart::ChartKind;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tool invocations
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One step of a plan with its typed parameters. The tool set is closed;
/// the executor dispatches on the variant.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "tool", content = "parameters", rename_all = "snake_case")]
pub enum ToolInvocation {
    AnalyzeDocuments {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instruction: Option<String>,
    },
    SearchWeb {
        query: String,
    },
    GenerateChart {
        chart_kind: ChartKind,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        title: Option<String>,
    },
    DraftSection {
        section_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        instruction: Option<String>,
    },
    Compile,
}

impl ToolInvocation {
    pub fn tool_name(&self) -> &'static str {
        match self {
            Self::AnalyzeDocuments { .. } => "analyze_documents",
            Self::SearchWeb { .. } => "search_web",
            Self::GenerateChart { .. } => "generate_chart",
            Self::DraftSection { .. } => "draft_section",
            Self::Compile => "compile",
        }
    }

    /// The `parameters` document for activity payloads.
    pub fn parameters_json(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map
                .get("parameters")
                .cloned()
                .unwrap_or(Value::Object(Default::default())),
            _ => Value::Object(Default::default()),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Plan
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    #[serde(flatten)]
    pub invocation: ToolInvocation,
    /// Short human-readable justification, shown in the activity log.
    #[serde(default)]
    pub reasoning: String,
    /// Indices of earlier tool calls whose outputs must be present.
    /// Advisory — execution is strictly sequential.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<usize>,
}

impl ToolCall {
    pub fn new(invocation: ToolInvocation, reasoning: impl Into<String>) -> Self {
        Self {
            invocation,
            reasoning: reasoning.into(),
            depends_on: Vec::new(),
        }
    }
}

/// Validated planner output. `understanding` is a free-form mode-specific
/// record (e.g. core subject, key topics, data gaps) kept for display.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Plan {
    pub understanding: Value,
    pub tool_calls: Vec<ToolCall>,
}

impl Plan {
    /// Hard cap on plan length, independent of mode.
    pub const MAX_TOOL_CALLS: usize = 40;

    pub fn count_of(&self, tool_name: &str) -> usize {
        self.tool_calls
            .iter()
            .filter(|tc| tc.invocation.tool_name() == tool_name)
            .count()
    }

    pub fn chart_kinds(&self) -> Vec<ChartKind> {
        self.tool_calls
            .iter()
            .filter_map(|tc| match &tc.invocation {
                ToolInvocation::GenerateChart { chart_kind, .. } => Some(*chart_kind),
                _ => None,
            })
            .collect()
    }

    pub fn section_names(&self) -> Vec<&str> {
        self.tool_calls
            .iter()
            .filter_map(|tc| match &tc.invocation {
                ToolInvocation::DraftSection { section_name, .. } => Some(section_name.as_str()),
                _ => None,
            })
            .collect()
    }
}
