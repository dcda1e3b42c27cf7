//! Run records — the durable state of one agentic request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::chart::ChartKind;
use crate::mode::{Depth, Mode};
use crate::plan::Plan;
use crate::template::TemplateType;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether moving to `next` respects the forward-only state machine
    /// `queued → running → {completed | failed | cancelled}`.
    pub fn can_transition_to(self, next: RunStatus) -> bool {
        match (self, next) {
            (Self::Queued, Self::Running) => true,
            (Self::Queued | Self::Running, Self::Completed | Self::Failed | Self::Cancelled) => {
                true
            }
            _ => false,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Findings and sources
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingOrigin {
    Document,
    WebSearch,
    LlmSynthesis,
}

/// One atomic piece of evidence gathered during execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub text: String,
    pub origin: FindingOrigin,
    /// Index into the run's sources, or a file name for document findings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_ref: Option<String>,
}

/// A citation record: a URL for web findings, a file name for documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub origin: FindingOrigin,
}

impl Source {
    pub fn web(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            url: Some(url.into()),
            file_name: None,
            title,
            origin: FindingOrigin::WebSearch,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            url: None,
            file_name: Some(name.into()),
            title: None,
            origin: FindingOrigin::Document,
        }
    }

    /// The identity used for deduplication: the canonical URL for web
    /// sources, the file name otherwise.
    pub fn dedup_key(&self) -> String {
        match &self.url {
            Some(url) => canonical_url(url),
            None => self.file_name.clone().unwrap_or_default(),
        }
    }

    /// Display label for the Sources section.
    pub fn label(&self) -> String {
        match (&self.title, &self.url, &self.file_name) {
            (Some(title), Some(url), _) => format!("{title} — {url}"),
            (_, Some(url), _) => url.clone(),
            (_, _, Some(file)) => file.clone(),
            _ => "unknown source".into(),
        }
    }
}

/// Case-fold a URL for dedup: lowercase, fragment stripped, trailing
/// slash stripped.
pub fn canonical_url(url: &str) -> String {
    let mut u = url.trim().to_ascii_lowercase();
    if let Some(idx) = u.find('#') {
        u.truncate(idx);
    }
    while u.ends_with('/') {
        u.pop();
    }
    u
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inputs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One uploaded document. `content` is already-extracted plain text —
/// the document-intelligence pipeline runs before the core sees it.
/// Empty `content` means no usable body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFile {
    pub upload_id: String,
    pub file_name: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunParams {
    #[serde(default)]
    pub depth: Depth,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focus: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_type: Option<TemplateType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chart_kinds: Vec<ChartKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_format: Option<String>,
    /// Template mode only: user opt-in to supplement with web search.
    #[serde(default)]
    pub allow_web: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chart artifacts & metadata
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartArtifact {
    pub url: String,
    pub title: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ExecutionCounts {
    pub findings: usize,
    pub sources: usize,
    pub charts: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub regenerated_from: Option<Uuid>,
    #[serde(default)]
    pub execution_counts: ExecutionCounts,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Run record
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub mode: Mode,
    pub goal: String,
    pub params: RunParams,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<RunFile>,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<Plan>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub findings: Vec<Finding>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_content: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub chart_artifacts: BTreeMap<ChartKind, ChartArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: RunMetadata,
}

impl Run {
    pub fn new(
        user_id: impl Into<String>,
        org_id: Option<String>,
        mode: Mode,
        goal: impl Into<String>,
        params: RunParams,
        files: Vec<RunFile>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            org_id,
            mode,
            goal: goal.into(),
            params,
            files,
            status: RunStatus::Queued,
            plan: None,
            findings: Vec::new(),
            sources: Vec::new(),
            final_content: None,
            chart_artifacts: BTreeMap::new(),
            error_kind: None,
            error_message: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
            metadata: RunMetadata::default(),
        }
    }

    /// Append a source unless one with the same dedup key already exists.
    /// Returns the index of the (existing or new) source.
    pub fn push_source(&mut self, source: Source) -> usize {
        let key = source.dedup_key();
        if let Some(idx) = self.sources.iter().position(|s| s.dedup_key() == key) {
            return idx;
        }
        self.sources.push(source);
        self.sources.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_forward_transitions() {
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Running));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Completed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Failed));
        assert!(RunStatus::Running.can_transition_to(RunStatus::Cancelled));
        assert!(RunStatus::Queued.can_transition_to(RunStatus::Failed));
    }

    #[test]
    fn status_rejects_backward_and_lateral() {
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Queued));
        assert!(!RunStatus::Completed.can_transition_to(RunStatus::Failed));
        assert!(!RunStatus::Failed.can_transition_to(RunStatus::Running));
        assert!(!RunStatus::Cancelled.can_transition_to(RunStatus::Completed));
        assert!(!RunStatus::Running.can_transition_to(RunStatus::Running));
    }

    #[test]
    fn terminal_statuses() {
        assert!(!RunStatus::Queued.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(RunStatus::Cancelled.is_terminal());
    }

    #[test]
    fn canonical_url_folds_case_fragment_and_slash() {
        assert_eq!(
            canonical_url("https://Example.com/Path/#section"),
            "https://example.com/path"
        );
        assert_eq!(canonical_url("https://a.io///"), "https://a.io");
        assert_eq!(canonical_url("  https://b.io "), "https://b.io");
    }

    #[test]
    fn push_source_dedups_by_canonical_url() {
        let mut run = Run::new(
            "u1",
            None,
            Mode::Research,
            "goal",
            RunParams::default(),
            Vec::new(),
        );
        let a = run.push_source(Source::web("https://example.com/x", None));
        let b = run.push_source(Source::web("https://EXAMPLE.com/x/", Some("t".into())));
        assert_eq!(a, b);
        assert_eq!(run.sources.len(), 1);

        let c = run.push_source(Source::web("https://example.com/y", None));
        assert_eq!(c, 1);
        assert_eq!(run.sources.len(), 2);
    }

    #[test]
    fn push_source_files_dedup_by_name() {
        let mut run = Run::new(
            "u1",
            None,
            Mode::Research,
            "goal",
            RunParams::default(),
            Vec::new(),
        );
        run.push_source(Source::file("a.pdf"));
        run.push_source(Source::file("a.pdf"));
        run.push_source(Source::file("b.pdf"));
        assert_eq!(run.sources.len(), 2);
    }

    #[test]
    fn source_label_prefers_title() {
        let s = Source::web("https://a.io", Some("A site".into()));
        assert_eq!(s.label(), "A site — https://a.io");
        let s = Source::file("notes.txt");
        assert_eq!(s.label(), "notes.txt");
    }

    #[test]
    fn new_run_starts_queued_without_content() {
        let run = Run::new(
            "u1",
            Some("org".into()),
            Mode::Charts,
            "goal",
            RunParams::default(),
            Vec::new(),
        );
        assert_eq!(run.status, RunStatus::Queued);
        assert!(run.final_content.is_none());
        assert!(run.plan.is_none());
        assert!(run.chart_artifacts.is_empty());
    }
}
