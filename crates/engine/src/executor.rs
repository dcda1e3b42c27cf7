//! Tool executor — runs a plan's tool calls strictly in order.
//!
//! Per step: emit `tool.call`, dispatch to the capability, emit
//! `tool.result` or `tool.error`, then `run.progress`. Tool failures are
//! recovered locally and execution continues; only `compile` is fatal.
//! The cancel token is checked at every step boundary — in-flight calls
//! are bounded by their own deadlines, so cancellation converges within
//! one capability timeout.

use std::collections::BTreeMap;
use std::time::Duration;

use ds_capabilities::{
    ChartCapability, ChatMessage, LlmCapability, LlmRequest, SearchCapability,
};
use ds_domain::activity::{
    run_progress_payload, section_drafted_payload, thinking_payload, tool_call_payload,
    tool_error_payload, tool_result_payload, ActivityKind, ThoughtType,
};
use ds_domain::chart::{sample_payload, ChartKind, ChartPayload};
use ds_domain::plan::{Plan, ToolInvocation};
use ds_domain::run::{ChartArtifact, Finding, FindingOrigin, Run, Source};
use ds_domain::{Error, Result};

use crate::cancel::CancelToken;
use crate::compiler::{self, findings_corpus, CompileContext};
use crate::store::RunStore;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Executor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy)]
pub struct ToolDeadlines {
    pub llm: Duration,
    pub search: Duration,
    pub chart: Duration,
}

pub struct Executor<'a> {
    pub store: &'a RunStore,
    pub llm: &'a dyn LlmCapability,
    pub search: &'a dyn SearchCapability,
    pub chart: &'a dyn ChartCapability,
    pub deadlines: ToolDeadlines,
}

/// Evidence and artifacts accumulated while a plan runs.
#[derive(Default)]
struct ExecutionState {
    findings: Vec<Finding>,
    sources: Vec<Source>,
    sections: Vec<(String, String)>,
    charts: BTreeMap<ChartKind, ChartArtifact>,
    failed_charts: Vec<(ChartKind, String)>,
}

impl ExecutionState {
    fn push_source(&mut self, source: Source) {
        let key = source.dedup_key();
        if !self.sources.iter().any(|s| s.dedup_key() == key) {
            self.sources.push(source);
        }
    }
}

impl Executor<'_> {
    /// Run every tool call of `plan` for `run`. Returns the compiled
    /// artifact. The caller (run manager) owns terminal bookkeeping.
    pub async fn execute(&self, run: &Run, plan: &Plan, token: &CancelToken) -> Result<String> {
        let mut state = ExecutionState::default();
        let mut artifact = None;
        let total = plan.tool_calls.len();

        for (step, call) in plan.tool_calls.iter().enumerate() {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }

            self.store.append_activity(
                run.id,
                ActivityKind::ToolCall,
                tool_call_payload(
                    call.invocation.tool_name(),
                    call.invocation.parameters_json(),
                    &call.reasoning,
                ),
            )?;

            match &call.invocation {
                ToolInvocation::AnalyzeDocuments { instruction } => {
                    self.analyze_documents(run, instruction.as_deref(), &mut state)
                        .await?;
                }
                ToolInvocation::SearchWeb { query } => {
                    self.search_web(run, query, &mut state).await?;
                }
                ToolInvocation::GenerateChart { chart_kind, title } => {
                    self.generate_chart(run, *chart_kind, title.as_deref(), &mut state)
                        .await?;
                }
                ToolInvocation::DraftSection {
                    section_name,
                    instruction,
                } => {
                    self.draft_section(run, section_name, instruction.as_deref(), &mut state)
                        .await?;
                }
                ToolInvocation::Compile => {
                    self.store.append_activity(
                        run.id,
                        ActivityKind::Thinking,
                        thinking_payload(
                            "assembling the final artifact from the gathered evidence",
                            ThoughtType::Writing,
                        ),
                    )?;
                    let ctx = CompileContext {
                        goal: &run.goal,
                        params: &run.params,
                        findings: &state.findings,
                        sources: &state.sources,
                        sections: &state.sections,
                        charts: &state.charts,
                        failed_charts: &state.failed_charts,
                        llm: self.llm,
                        llm_deadline: self.deadlines.llm,
                    };
                    // Compile failure is the one fatal tool outcome.
                    let compiled = compiler::compile(run.mode, &ctx).await?;
                    self.store.append_activity(
                        run.id,
                        ActivityKind::ToolResult,
                        tool_result_payload(
                            "compile",
                            &format!("artifact assembled ({} chars)", compiled.len()),
                            Some((state.findings.len(), state.sources.len())),
                            Some("final"),
                        ),
                    )?;
                    artifact = Some(compiled);
                }
            }

            // Keep the run record current for observers.
            self.sync_run(run, &state);

            self.store.append_activity(
                run.id,
                ActivityKind::RunProgress,
                run_progress_payload(step + 1, total),
            )?;
        }

        artifact.ok_or_else(|| Error::CompileFailed("plan ended without a compile step".into()))
    }

    fn sync_run(&self, run: &Run, state: &ExecutionState) {
        let findings = state.findings.clone();
        let sources = state.sources.clone();
        let charts = state.charts.clone();
        self.store.update_run(run.id, |r| {
            r.findings = findings;
            r.sources = sources;
            r.chart_artifacts = charts;
        });
    }

    // ── analyze_documents ──────────────────────────────────────────

    async fn analyze_documents(
        &self,
        run: &Run,
        instruction: Option<&str>,
        state: &mut ExecutionState,
    ) -> Result<()> {
        let usable: Vec<_> = run
            .files
            .iter()
            .filter(|f| !f.content.trim().is_empty())
            .collect();
        if usable.is_empty() {
            self.tool_error(run, "analyze_documents", "parse_error", "no usable file content")?;
            return Ok(());
        }

        let mut blob = String::new();
        for file in &usable {
            blob.push_str(&format!("### {}\n{}\n---\n", file.file_name, file.content));
        }

        let system = format!(
            "You extract factual evidence from uploaded documents for a {} task. \
             Respond with one finding per line, formatted as \
             `file name :: finding`. Each finding is one complete sentence \
             stating a concrete fact from the documents. Extract every \
             distinct fact; do not summarize them away. {}",
            run.mode,
            instruction.unwrap_or("")
        );
        let user = format!("Goal: {}\n\nDocuments:\n{blob}", run.goal);
        let req = LlmRequest::new(
            vec![ChatMessage::system(system), ChatMessage::user(user)],
            self.deadlines.llm,
        );

        match self.llm.ask(req).await {
            Ok(reply) => {
                let found = parse_document_findings(&reply.content);
                let count = found.len();
                state.findings.extend(found);
                for file in &usable {
                    state.push_source(Source::file(&file.file_name));
                }
                self.store.append_activity(
                    run.id,
                    ActivityKind::ToolResult,
                    tool_result_payload(
                        "analyze_documents",
                        &format!("extracted {count} findings from {} document(s)", usable.len()),
                        Some((state.findings.len(), state.sources.len())),
                        None,
                    ),
                )?;
            }
            Err(e) => {
                self.tool_error(run, "analyze_documents", e.kind(), &e.to_string())?;
            }
        }
        Ok(())
    }

    // ── search_web ─────────────────────────────────────────────────

    async fn search_web(&self, run: &Run, query: &str, state: &mut ExecutionState) -> Result<()> {
        match self.search.search(query, self.deadlines.search).await {
            Ok(harvest) => {
                let count = harvest.findings.len();
                for text in harvest.findings {
                    state.findings.push(Finding {
                        text,
                        origin: FindingOrigin::WebSearch,
                        source_ref: None,
                    });
                }
                for source in harvest.sources {
                    state.push_source(Source::web(source.url, source.title));
                }
                self.store.append_activity(
                    run.id,
                    ActivityKind::ToolResult,
                    tool_result_payload(
                        "search_web",
                        &format!("search \"{query}\" yielded {count} findings"),
                        Some((state.findings.len(), state.sources.len())),
                        None,
                    ),
                )?;
            }
            Err(e) => {
                // No retry at this layer; the run continues without this
                // search's evidence.
                self.tool_error(run, "search_web", e.kind(), &e.to_string())?;
            }
        }
        Ok(())
    }

    // ── generate_chart ─────────────────────────────────────────────

    async fn generate_chart(
        &self,
        run: &Run,
        kind: ChartKind,
        title: Option<&str>,
        state: &mut ExecutionState,
    ) -> Result<()> {
        let payload = self.build_chart_payload(run, kind, state).await;

        match self.chart.render(kind, payload, self.deadlines.chart).await {
            Ok(image) => {
                state.charts.insert(
                    kind,
                    ChartArtifact {
                        url: image.image_url,
                        title: title.unwrap_or(&run.goal).to_string(),
                        status: "rendered".into(),
                    },
                );
                self.store.append_activity(
                    run.id,
                    ActivityKind::ToolResult,
                    tool_result_payload(
                        "generate_chart",
                        &format!("{kind} chart rendered"),
                        None,
                        Some(kind.as_str()),
                    ),
                )?;
            }
            Err(e) => {
                state.failed_charts.push((kind, e.kind().to_string()));
                self.tool_error(run, "generate_chart", e.kind(), &e.to_string())?;
            }
        }
        Ok(())
    }

    /// Ask the LLM for a typed payload grounded in the findings; fall back
    /// to the deterministic sample for the kind on any failure, so the
    /// render step always has a valid payload.
    async fn build_chart_payload(
        &self,
        run: &Run,
        kind: ChartKind,
        state: &ExecutionState,
    ) -> ChartPayload {
        let system = format!(
            "You produce data for a {kind} chart. Respond with a JSON object \
             matching exactly this shape: {}. Ground the numbers in the \
             evidence; when the evidence has no usable numbers, choose \
             plausible illustrative values.",
            payload_schema_hint(kind)
        );
        let user = format!(
            "Goal: {}\n\nEvidence:\n{}",
            run.goal,
            findings_corpus(&state.findings)
        );
        let req = LlmRequest::new(
            vec![ChatMessage::system(system), ChatMessage::user(user)],
            self.deadlines.llm,
        )
        .expecting_json();

        match self.llm.ask(req).await {
            Ok(reply) => match ChartPayload::from_llm_json(kind, &reply.content) {
                Ok(payload) => payload,
                Err(reason) => {
                    tracing::debug!(kind = %kind, reason = %reason, "chart payload fell back to sample");
                    sample_payload(kind)
                }
            },
            Err(e) => {
                tracing::debug!(kind = %kind, error = %e, "chart payload LLM failed; using sample");
                sample_payload(kind)
            }
        }
    }

    // ── draft_section ──────────────────────────────────────────────

    async fn draft_section(
        &self,
        run: &Run,
        section_name: &str,
        instruction: Option<&str>,
        state: &mut ExecutionState,
    ) -> Result<()> {
        let corpus = findings_corpus(&state.findings);
        let others: Vec<&str> = state.sections.iter().map(|(n, _)| n.as_str()).collect();

        let full_prompt = format!(
            "You write the \"{section_name}\" section of a {} document. {} \
             This section has its own distinct responsibility: do not repeat \
             material that belongs to the other sections ({}). Use only the \
             evidence provided. Respond with the section body in markdown, \
             without the heading.",
            run.mode,
            instruction.unwrap_or(""),
            if others.is_empty() {
                "none drafted yet".to_string()
            } else {
                others.join(", ")
            }
        );
        let user = format!("Goal: {}\n\nEvidence:\n{corpus}", run.goal);

        let attempt = |system: String, user: String| {
            let req = LlmRequest::new(
                vec![ChatMessage::system(system), ChatMessage::user(user)],
                self.deadlines.llm,
            )
            .with_temperature(0.4);
            self.llm.ask(req)
        };

        let mut outcome = attempt(full_prompt, user.clone()).await;
        if !matches!(&outcome, Ok(r) if !r.content.trim().is_empty()) {
            // One retry with a shorter prompt.
            let short_prompt = format!(
                "Write the \"{section_name}\" section of a {} document in \
                 markdown, grounded in the evidence. Body only, no heading.",
                run.mode
            );
            outcome = attempt(short_prompt, user).await;
        }

        match outcome {
            Ok(reply) if !reply.content.trim().is_empty() => {
                let body = reply.content.trim().to_string();
                let chars = body.chars().count();
                state.sections.push((section_name.to_string(), body));
                self.store.append_activity(
                    run.id,
                    ActivityKind::SectionDrafted,
                    section_drafted_payload(section_name, chars),
                )?;
                self.store.append_activity(
                    run.id,
                    ActivityKind::ToolResult,
                    tool_result_payload(
                        "draft_section",
                        &format!("\"{section_name}\" drafted ({chars} chars)"),
                        None,
                        Some(section_name),
                    ),
                )?;
            }
            Ok(_) => {
                self.tool_error(
                    run,
                    "draft_section",
                    "parse_error",
                    &format!("\"{section_name}\" came back empty twice"),
                )?;
            }
            Err(e) => {
                self.tool_error(run, "draft_section", e.kind(), &e.to_string())?;
            }
        }
        Ok(())
    }

    fn tool_error(&self, run: &Run, tool: &str, kind: &str, message: &str) -> Result<()> {
        tracing::warn!(run_id = %run.id, tool = %tool, kind = %kind, message = %message, "tool failed");
        self.store.append_activity(
            run.id,
            ActivityKind::ToolError,
            tool_error_payload(tool, kind, message),
        )?;
        Ok(())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Parse the document-analysis reply: one finding per non-trivial line,
/// optionally prefixed with `file name ::` for attribution.
fn parse_document_findings(reply: &str) -> Vec<Finding> {
    reply
        .lines()
        .map(|line| {
            line.trim()
                .trim_start_matches(['-', '*', '•'])
                .trim_start_matches(|c: char| c.is_ascii_digit() || c == '.' || c == ')')
                .trim()
        })
        .filter(|line| line.len() >= 15)
        .map(|line| match line.split_once("::") {
            Some((file, text)) if !file.trim().is_empty() && text.trim().len() >= 15 => Finding {
                text: text.trim().to_string(),
                origin: FindingOrigin::Document,
                source_ref: Some(file.trim().to_string()),
            },
            _ => Finding {
                text: line.to_string(),
                origin: FindingOrigin::Document,
                source_ref: None,
            },
        })
        .collect()
}

/// A compact textual schema for the payload family of `kind`, embedded in
/// the payload-construction prompt.
fn payload_schema_hint(kind: ChartKind) -> String {
    let family = ChartPayload::expected_family(kind);
    let shape = match family {
        "cartesian" => {
            r#"{"family": "cartesian", "categories": ["Q1", ...], "series": [{"name": "...", "data": [1.0, ...]}]} (data length equals categories length)"#
        }
        "name_value" => r#"{"family": "name_value", "items": [{"name": "...", "value": 1.0}]}"#,
        "points" => {
            if kind == ChartKind::Bubble {
                r#"{"family": "points", "series": [{"name": "...", "points": [[x, y, size], ...]}]}"#
            } else {
                r#"{"family": "points", "series": [{"name": "...", "points": [[x, y], ...]}]}"#
            }
        }
        "radar" => {
            r#"{"family": "radar", "indicators": [{"name": "...", "max": 100.0}], "series": [{"name": "...", "data": [...]}]} (data length equals indicators length)"#
        }
        "matrix" => {
            r#"{"family": "matrix", "x_labels": [...], "y_labels": [...], "cells": [[xIndex, yIndex, value], ...]}"#
        }
        "tree" => {
            r#"{"family": "tree", "roots": [{"name": "...", "value": 1.0, "children": [...]}]}"#
        }
        "links" => {
            r#"{"family": "links", "nodes": ["A", "B"], "links": [{"source": "A", "target": "B", "value": 1.0}]}"#
        }
        "candlestick" => {
            r#"{"family": "candlestick", "categories": [...], "values": [[open, close, low, high], ...]}"#
        }
        "gantt" => {
            r#"{"family": "gantt", "tasks": [{"name": "...", "start": "2024-01-01", "end": "2024-02-01"}]}"#
        }
        _ => {
            r#"{"family": "theme_river", "events": [["2024-01", 10.0, "Theme A"], ...]}"#
        }
    };
    shape.to_string()
}
