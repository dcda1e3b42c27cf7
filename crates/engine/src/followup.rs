//! Follow-up helpers for completed runs: question answering and
//! regeneration. Both are stateless reads of the original run — the Q&A
//! is never persisted, and regeneration starts an ordinary fresh run
//! seeded with the original context.

use std::sync::Arc;

use uuid::Uuid;

use ds_capabilities::{ChatMessage, LlmRequest};
use ds_domain::mode::Mode;
use ds_domain::run::{Run, RunStatus};
use ds_domain::{Error, Result};

use crate::manager::{Engine, StartRequest};

/// How much of the original artifact is seeded into a regenerated goal.
/// The new run gathers its own evidence; the seed is context, not corpus.
const REGEN_CONTEXT_BYTES: usize = 4096;

impl Engine {
    /// Answer a question against a completed run's artifact. One LLM
    /// call; nothing is written to the run or its activity log.
    pub async fn follow_up(&self, run_id: Uuid, user_id: &str, question: &str) -> Result<String> {
        let run = self.owned_completed_run(run_id, user_id)?;
        let content = run
            .final_content
            .as_deref()
            .ok_or_else(|| Error::Validation("run has no content".into()))?;

        let system = qa_prompt(run.mode);
        let user = format!("Document:\n{content}\n\nQuestion: {question}");
        let req = LlmRequest::new(
            vec![ChatMessage::system(system), ChatMessage::user(user)],
            self.config.tool_deadlines.llm,
        );
        let reply = self.llm.ask(req).await.map_err(|source| Error::Capability {
            capability: "llm",
            source,
        })?;
        Ok(reply.content)
    }

    /// Start a fresh run seeded with the original goal, the user's
    /// feedback, and a clamped slice of the original output. Returns the
    /// new run id; the caller streams or polls it like any other run.
    pub fn regenerate(self: &Arc<Self>, run_id: Uuid, user_id: &str, feedback: &str) -> Result<Uuid> {
        let run = self.owned_completed_run(run_id, user_id)?;
        let request = regenerate_request(&run, feedback);
        self.start_run(request)
    }

    fn owned_completed_run(&self, run_id: Uuid, user_id: &str) -> Result<Run> {
        let run = self
            .store
            .get_run(run_id)
            .filter(|r| r.user_id == user_id)
            .ok_or_else(|| Error::Validation("run not found".into()))?;
        if run.status != RunStatus::Completed {
            return Err(Error::Validation("run is not completed".into()));
        }
        Ok(run)
    }
}

fn qa_prompt(mode: Mode) -> String {
    let flavor = match mode {
        Mode::Research => "a research report",
        Mode::Report => "a business report",
        Mode::Template => "a templated business document",
        Mode::Charts => "a set of data visualizations",
        Mode::Plan => "a strategic plan",
    };
    format!(
        "You answer questions about {flavor} the user generated earlier. \
         Ground every answer in the document provided; when the document \
         does not cover the question, say so plainly."
    )
}

/// Build the seeded request for a regenerated run. Inherits mode, depth,
/// files, and chart kinds; records the lineage in metadata.
pub fn regenerate_request(run: &Run, feedback: &str) -> StartRequest {
    let context = run
        .final_content
        .as_deref()
        .map(|c| clamp(c, REGEN_CONTEXT_BYTES))
        .unwrap_or_default();
    StartRequest {
        user_id: run.user_id.clone(),
        org_id: run.org_id.clone(),
        mode: run.mode,
        goal: format!(
            "{}. Additional feedback: {feedback}. Original output context: {context}",
            run.goal
        ),
        params: run.params.clone(),
        files: run.files.clone(),
        regenerated_from: Some(run.id),
    }
}

fn clamp(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
