//! Run manager — owns the lifecycle of every run.
//!
//! `start_run` validates the request, creates the run row, appends
//! `run.init`, and spawns the drive task: plan → execute → compile. A
//! watchdog trips the run's cancel token when the run-level deadline
//! expires; expiry behaves exactly like cancellation. This module is the
//! only writer of terminal status and terminal activities.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use uuid::Uuid;

use ds_capabilities::{ChartCapability, LlmCapability, SearchCapability};
use ds_domain::activity::{
    run_cancelled_payload, run_completed_payload, run_failed_payload, run_init_payload,
    thinking_payload, ActivityKind, ThoughtType,
};
use ds_domain::config::Config;
use ds_domain::mode::Mode;
use ds_domain::run::{ExecutionCounts, Run, RunFile, RunParams, RunStatus};
use ds_domain::{Error, Result};

use crate::cancel::{CancelMap, CancelReason, CancelToken};
use crate::executor::{Executor, ToolDeadlines};
use crate::planner::{build_plan, PlannerInput};
use crate::store::RunStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine configuration snapshot
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    pub run_timeout: Duration,
    pub planner_timeout: Duration,
    pub tool_deadlines: ToolDeadlines,
    pub max_concurrent_runs: usize,
    pub file_context_bytes: usize,
    pub max_goal_bytes: usize,
    pub max_files_bytes: usize,
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            run_timeout: Duration::from_secs(config.runtime.run_timeout_secs),
            planner_timeout: Duration::from_secs(config.runtime.planner_timeout_secs),
            tool_deadlines: ToolDeadlines {
                llm: Duration::from_secs(config.llm.timeout_secs),
                search: Duration::from_secs(config.search.timeout_secs),
                chart: Duration::from_secs(config.chart.timeout_secs),
            },
            max_concurrent_runs: config.runtime.max_concurrent_runs,
            file_context_bytes: config.limits.planner_file_context_bytes,
            max_goal_bytes: config.limits.max_goal_bytes,
            max_files_bytes: config.limits.max_files_bytes,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Start request
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct StartRequest {
    pub user_id: String,
    pub org_id: Option<String>,
    pub mode: Mode,
    pub goal: String,
    pub params: RunParams,
    pub files: Vec<RunFile>,
    pub regenerated_from: Option<Uuid>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Engine
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct Engine {
    pub store: Arc<RunStore>,
    pub llm: Arc<dyn LlmCapability>,
    pub search: Arc<dyn SearchCapability>,
    pub chart: Arc<dyn ChartCapability>,
    pub cancels: Arc<CancelMap>,
    pub config: EngineConfig,
}

impl Engine {
    /// Validate the request, create the run, and spawn its drive task.
    /// Returns the run id immediately — execution is asynchronous.
    pub fn start_run(self: &Arc<Self>, req: StartRequest) -> Result<Uuid> {
        self.validate(&req)?;

        let active = self.cancels.active_count();
        if active >= self.config.max_concurrent_runs {
            // Soft cap: accept anyway, but make the pressure visible.
            tracing::warn!(
                active,
                cap = self.config.max_concurrent_runs,
                "concurrent runs above the soft cap"
            );
        }

        let mut run = Run::new(
            req.user_id,
            req.org_id,
            req.mode,
            req.goal,
            req.params,
            req.files,
        );
        run.metadata.regenerated_from = req.regenerated_from;
        let run_id = run.id;

        self.store
            .create_run(run.clone())
            .map_err(|e| Error::Store(e.to_string()))?;
        self.store.append_activity(
            run_id,
            ActivityKind::RunInit,
            run_init_payload(
                run.mode,
                &run.goal,
                run.params.depth,
                &run.params.chart_kinds,
                run.params.template_type,
            ),
        )?;
        self.store.update_status(run_id, RunStatus::Running, None)?;

        let token = self.cancels.register(run_id);
        self.spawn_drive(run_id, token);
        Ok(run_id)
    }

    /// Signal cancellation. Idempotent; returns false for unknown or
    /// already-terminal runs.
    pub fn cancel_run(&self, run_id: Uuid) -> bool {
        self.cancels.cancel(run_id)
    }

    fn validate(&self, req: &StartRequest) -> Result<()> {
        let goal = req.goal.trim();
        if goal.is_empty() {
            return Err(Error::Validation("goal must not be empty".into()));
        }
        // Regenerated goals carry seeded context and may legitimately
        // exceed the user-input cap.
        if req.regenerated_from.is_none() && req.goal.len() > self.config.max_goal_bytes {
            return Err(Error::Validation(format!(
                "goal exceeds {} bytes",
                self.config.max_goal_bytes
            )));
        }
        let files_bytes: usize = req.files.iter().map(|f| f.content.len()).sum();
        if files_bytes > self.config.max_files_bytes {
            return Err(Error::Validation(format!(
                "uploaded files exceed {} bytes of extracted text",
                self.config.max_files_bytes
            )));
        }
        match req.mode {
            Mode::Template if req.params.template_type.is_none() => {
                Err(Error::Validation("template mode requires template_type".into()))
            }
            Mode::Charts if req.params.chart_kinds.is_empty() => {
                Err(Error::Validation("charts mode requires chart_types".into()))
            }
            _ => Ok(()),
        }
    }

    // ── Drive task ─────────────────────────────────────────────────

    fn spawn_drive(self: &Arc<Self>, run_id: Uuid, token: CancelToken) {
        let engine = Arc::clone(self);
        let span = tracing::info_span!("run", run_id = %run_id);
        tokio::spawn(
            async move {
                // Watchdog: deadline expiry is equivalent to cancellation.
                let watchdog = {
                    let token = token.clone();
                    let deadline = engine.config.run_timeout;
                    tokio::spawn(async move {
                        tokio::time::sleep(deadline).await;
                        token.cancel(CancelReason::Deadline);
                    })
                };

                let outcome = engine.drive(run_id, &token).await;
                watchdog.abort();
                engine.finish(run_id, outcome, &token);

                engine.cancels.remove(run_id);
                engine.store.cleanup_channel(run_id);
            }
            .instrument(span),
        );
    }

    async fn drive(&self, run_id: Uuid, token: &CancelToken) -> Result<String> {
        let run = self
            .store
            .get_run(run_id)
            .ok_or_else(|| Error::Store(format!("run {run_id} vanished")))?;

        let planner_input = PlannerInput {
            mode: run.mode,
            goal: &run.goal,
            params: &run.params,
            files: &run.files,
            file_context_bytes: self.config.file_context_bytes,
        };
        let plan = build_plan(
            self.llm.as_ref(),
            &planner_input,
            self.config.planner_timeout,
        )
        .await;

        if token.is_cancelled() {
            return Err(Error::Cancelled);
        }

        self.store.update_run(run_id, |r| r.plan = Some(plan.clone()));
        self.store.append_activity(
            run_id,
            ActivityKind::Thinking,
            thinking_payload(
                &format!(
                    "plan ready: {} step(s) — {}",
                    plan.tool_calls.len(),
                    plan.understanding
                        .get("core_subject")
                        .and_then(|v| v.as_str())
                        .unwrap_or(&run.goal)
                ),
                ThoughtType::Planning,
            ),
        )?;

        let executor = Executor {
            store: &self.store,
            llm: self.llm.as_ref(),
            search: self.search.as_ref(),
            chart: self.chart.as_ref(),
            deadlines: self.config.tool_deadlines,
        };
        executor.execute(&run, &plan, token).await
    }

    /// Terminal bookkeeping. The single place that writes terminal status
    /// and emits exactly one terminal activity per run.
    fn finish(&self, run_id: Uuid, outcome: Result<String>, token: &CancelToken) {
        let result = match outcome {
            Ok(content) => self.finish_completed(run_id, content),
            Err(Error::Cancelled) | Err(Error::RunTimeout) => self.finish_cancelled(run_id, token),
            Err(e) => self.finish_failed(run_id, e),
        };
        if let Err(e) = result {
            tracing::error!(run_id = %run_id, error = %e, "terminal bookkeeping failed");
        }
    }

    fn finish_completed(&self, run_id: Uuid, content: String) -> Result<()> {
        let run = self
            .store
            .get_run(run_id)
            .ok_or_else(|| Error::Store(format!("run {run_id} vanished")))?;
        let counts = ExecutionCounts {
            findings: run.findings.len(),
            sources: run.sources.len(),
            charts: run.chart_artifacts.len(),
        };
        let mut metadata = run.metadata.clone();
        metadata.execution_counts = counts.clone();

        self.store
            .set_final_content(run_id, content.clone(), metadata.clone())?;
        self.store.update_status(run_id, RunStatus::Completed, None)?;
        self.store.append_activity(
            run_id,
            ActivityKind::RunCompleted,
            run_completed_payload(&content, &counts, serde_json::to_value(&metadata)?),
        )?;
        tracing::info!(run_id = %run_id, findings = counts.findings, "run completed");
        Ok(())
    }

    fn finish_cancelled(&self, run_id: Uuid, token: &CancelToken) -> Result<()> {
        let reason = match token.reason() {
            Some(CancelReason::Deadline) => "run deadline exceeded",
            _ => "cancelled by user",
        };
        self.store.update_status(run_id, RunStatus::Cancelled, None)?;
        self.store.append_activity(
            run_id,
            ActivityKind::RunCancelled,
            run_cancelled_payload(),
        )?;
        tracing::info!(run_id = %run_id, reason = %reason, "run cancelled");
        Ok(())
    }

    fn finish_failed(&self, run_id: Uuid, error: Error) -> Result<()> {
        let kind = error.kind();
        let message = error.sanitized_message();
        tracing::warn!(run_id = %run_id, kind = %kind, error = %error, "run failed");
        self.store.update_status(
            run_id,
            RunStatus::Failed,
            Some((kind.to_string(), message.clone())),
        )?;
        self.store.append_activity(
            run_id,
            ActivityKind::RunFailed,
            run_failed_payload(kind, &message),
        )?;
        Ok(())
    }
}
