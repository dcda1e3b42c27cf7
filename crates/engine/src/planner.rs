//! Planner — one LLM call that turns the request into a typed tool plan.
//!
//! The contract is rigid: the model must answer with a JSON object
//! matching [`Plan`]. Anything else — parse failure, guardrail violation,
//! timeout — falls back to a deterministic per-mode plan, so planning
//! itself can never fail a run.

use std::time::Duration;

use serde_json::json;

use ds_capabilities::{ChatMessage, LlmCapability, LlmRequest};
use ds_domain::chart::ChartKind;
use ds_domain::mode::Mode;
use ds_domain::plan::{Plan, ToolCall, ToolInvocation};
use ds_domain::run::{RunFile, RunParams};

use crate::compiler::plan::CANONICAL_SECTIONS;

const PLANNER_PROMPT: &str = "You are the planning stage of a research and \
content-generation agent. Given a goal, produce a JSON object:\n\
{\"understanding\": {\"core_subject\": string, \"user_goal\": string, \
\"key_topics\": [string], \"data_gaps\": [string]}, \"tool_calls\": [\
{\"tool\": string, \"parameters\": object, \"reasoning\": string, \
\"depends_on\": [int]}]}\n\
Available tools:\n\
- analyze_documents — parameters: {\"instruction\": string?}. Extract \
evidence from the uploaded documents.\n\
- search_web — parameters: {\"query\": string}. One focused web search.\n\
- generate_chart — parameters: {\"chart_kind\": string, \"title\": \
string?}. Render one chart of the given kind.\n\
- draft_section — parameters: {\"section_name\": string, \"instruction\": \
string?}. Draft one named section of the final document.\n\
- compile — no parameters. Assemble the final artifact. Must be the last \
call and appear exactly once.\n\
Respect the caps given in the user message exactly. Keep reasoning to one \
short sentence per call. Respond with the JSON object only.";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PlannerInput<'a> {
    pub mode: Mode,
    pub goal: &'a str,
    pub params: &'a RunParams,
    pub files: &'a [RunFile],
    /// How much combined file content the planner sees as context.
    pub file_context_bytes: usize,
}

impl PlannerInput<'_> {
    fn has_usable_files(&self) -> bool {
        self.files.iter().any(|f| !f.content.trim().is_empty())
    }

    fn search_cap(&self) -> usize {
        let base = self.params.depth.search_cap(self.mode);
        if self.mode == Mode::Template && self.params.allow_web {
            base + 1
        } else {
            base
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Entry point
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ask the LLM for a plan and validate it; fall back deterministically on
/// any failure. Infallible by construction.
pub async fn build_plan(
    llm: &dyn LlmCapability,
    input: &PlannerInput<'_>,
    deadline: Duration,
) -> Plan {
    let messages = vec![
        ChatMessage::system(PLANNER_PROMPT),
        ChatMessage::user(render_request(input)),
    ];
    let req = LlmRequest::new(messages, deadline)
        .with_temperature(0.2)
        .expecting_json();

    match llm.ask(req).await {
        Ok(reply) => match serde_json::from_str::<Plan>(&reply.content) {
            Ok(plan) => match validate_plan(input, &plan) {
                Ok(()) => plan,
                Err(reason) => {
                    tracing::warn!(reason = %reason, "plan failed guardrails; using fallback");
                    fallback_plan(input)
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "plan was not valid JSON; using fallback");
                fallback_plan(input)
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "planner LLM call failed; using fallback");
            fallback_plan(input)
        }
    }
}

fn render_request(input: &PlannerInput<'_>) -> String {
    let mut out = format!(
        "Mode: {}\nGoal: {}\nDepth: {}\n",
        input.mode, input.goal, input.params.depth
    );
    if let Some(focus) = &input.params.focus {
        out.push_str(&format!("Focus: {focus}\n"));
    }
    if let Some(template) = input.params.template_type {
        out.push_str(&format!(
            "Template: {} with fixed sections: {}\n",
            template,
            template.sections().join(", ")
        ));
    }
    if let Some(format) = &input.params.plan_format {
        out.push_str(&format!("Plan format preference: {format}\n"));
    }
    if !input.params.chart_kinds.is_empty() {
        let kinds: Vec<&str> = input.params.chart_kinds.iter().map(|k| k.as_str()).collect();
        out.push_str(&format!(
            "Requested chart kinds (one generate_chart each, no others): {}\n",
            kinds.join(", ")
        ));
    }

    out.push_str(&format!(
        "Caps: at most {} search_web call(s); ",
        input.search_cap()
    ));
    match input.mode {
        Mode::Research => out.push_str(
            "no generate_chart or draft_section calls (sections are drafted at compile time); ",
        ),
        Mode::Report => {
            let (lo, hi) = input.params.depth.report_section_range();
            out.push_str(&format!("between {lo} and {hi} draft_section calls; "));
        }
        Mode::Template => out.push_str("one draft_section per fixed template section; "),
        Mode::Charts => out.push_str("no draft_section calls; "),
        Mode::Plan => out.push_str(&format!(
            "one draft_section per canonical section ({}); ",
            CANONICAL_SECTIONS.join(", ")
        )),
    }
    out.push_str("exactly one compile call, last.\n");

    if input.has_usable_files() {
        out.push_str(&format!(
            "\n{} uploaded document(s); start with one analyze_documents call. Excerpt:\n",
            input.files.len()
        ));
        out.push_str(&file_excerpt(input.files, input.file_context_bytes));
    } else {
        out.push_str("\nNo uploaded documents: do not call analyze_documents.\n");
    }
    out
}

fn file_excerpt(files: &[RunFile], budget: usize) -> String {
    let mut out = String::new();
    for file in files {
        if out.len() >= budget {
            break;
        }
        let remaining = budget - out.len();
        let slice = truncate_chars(&file.content, remaining);
        out.push_str(&format!("### {}\n{}\n---\n", file.file_name, slice));
    }
    out
}

fn truncate_chars(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Guardrail validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Validate a plan against the per-mode guardrails. The error string is
/// for logging only — violations always route to the fallback plan.
pub fn validate_plan(input: &PlannerInput<'_>, plan: &Plan) -> Result<(), String> {
    if plan.understanding.is_null()
        || plan
            .understanding
            .as_object()
            .is_some_and(|o| o.is_empty())
    {
        return Err("understanding is empty".into());
    }
    if plan.tool_calls.is_empty() || plan.tool_calls.len() > Plan::MAX_TOOL_CALLS {
        return Err(format!(
            "tool_calls length {} outside [1, {}]",
            plan.tool_calls.len(),
            Plan::MAX_TOOL_CALLS
        ));
    }

    // Exactly one compile, and it must be last.
    if plan.count_of("compile") != 1 {
        return Err("plan must contain exactly one compile".into());
    }
    match plan.tool_calls.last() {
        Some(tc) if tc.invocation == ToolInvocation::Compile => {}
        _ => return Err("compile must be the last tool call".into()),
    }

    let searches = plan.count_of("search_web");
    if searches > input.search_cap() {
        return Err(format!(
            "{searches} search_web calls exceed the cap of {}",
            input.search_cap()
        ));
    }

    let analyzes = plan.count_of("analyze_documents");
    if analyzes > 0 && !input.has_usable_files() {
        return Err("analyze_documents without usable files".into());
    }
    if analyzes > 1 {
        return Err("at most one analyze_documents call is allowed".into());
    }

    // Chart calls: closed set is guaranteed by the type; check the kinds
    // against what the user requested.
    let chart_kinds = plan.chart_kinds();
    for kind in &chart_kinds {
        if !input.params.chart_kinds.contains(kind) {
            return Err(format!("chart kind {kind} was not requested"));
        }
    }
    let mut deduped = chart_kinds.clone();
    deduped.sort();
    deduped.dedup();
    if deduped.len() != chart_kinds.len() {
        return Err("a chart kind appears more than once".into());
    }

    let sections = plan.section_names();
    match input.mode {
        Mode::Research => {
            if !chart_kinds.is_empty() || !sections.is_empty() {
                return Err("research plans may not draft sections or render charts".into());
            }
        }
        Mode::Report => {
            if chart_kinds.len() != input.params.chart_kinds.len() {
                return Err(format!(
                    "report plan has {} chart calls for {} requested kinds",
                    chart_kinds.len(),
                    input.params.chart_kinds.len()
                ));
            }
            let (lo, hi) = input.params.depth.report_section_range();
            if sections.len() < lo || sections.len() > hi {
                return Err(format!(
                    "report plan drafts {} sections, expected {lo}..={hi}",
                    sections.len()
                ));
            }
        }
        Mode::Template => {
            let Some(template) = input.params.template_type else {
                return Err("template mode requires a template_type".into());
            };
            if !section_sets_match(&sections, template.sections()) {
                return Err(format!(
                    "template plan sections do not match the {template} catalog"
                ));
            }
            if !chart_kinds.is_empty() {
                return Err("template plans may not render charts".into());
            }
        }
        Mode::Charts => {
            if !sections.is_empty() {
                return Err("charts plans may not draft sections".into());
            }
            let mut expected = input.params.chart_kinds.clone();
            expected.sort();
            if deduped != expected {
                return Err("charts plan must render exactly the requested kinds".into());
            }
        }
        Mode::Plan => {
            if !section_sets_match(&sections, &CANONICAL_SECTIONS) {
                return Err("plan mode must draft exactly the canonical sections".into());
            }
            if !chart_kinds.is_empty() {
                return Err("plan-mode plans may not render charts".into());
            }
        }
    }

    Ok(())
}

fn section_sets_match(actual: &[&str], expected: &[&str]) -> bool {
    if actual.len() != expected.len() {
        return false;
    }
    expected.iter().all(|e| {
        actual
            .iter()
            .any(|a| a.eq_ignore_ascii_case(e))
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deterministic fallback
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The minimum plan consistent with the mode and inputs. Never fails.
pub fn fallback_plan(input: &PlannerInput<'_>) -> Plan {
    let mut calls = Vec::new();

    if input.has_usable_files() {
        calls.push(ToolCall::new(
            ToolInvocation::AnalyzeDocuments { instruction: None },
            "extract evidence from the uploaded documents",
        ));
    }

    let seed_search = |calls: &mut Vec<ToolCall>| {
        calls.push(ToolCall::new(
            ToolInvocation::SearchWeb {
                query: first_words(input.goal, 12),
            },
            "gather baseline evidence for the goal",
        ));
    };

    match input.mode {
        Mode::Research => seed_search(&mut calls),
        Mode::Report => {
            seed_search(&mut calls);
            for kind in &input.params.chart_kinds {
                calls.push(chart_call(*kind));
            }
            // The minimum section count the depth allows.
            const REPORT_SECTIONS: [&str; 5] = [
                "Executive Summary",
                "Key Insights",
                "Analysis",
                "Outlook",
                "Risks",
            ];
            let (min_sections, _) = input.params.depth.report_section_range();
            for section in REPORT_SECTIONS.iter().take(min_sections.max(2)) {
                calls.push(draft_call(section));
            }
        }
        Mode::Template => {
            if let Some(template) = input.params.template_type {
                if input.params.allow_web {
                    seed_search(&mut calls);
                }
                for section in template.sections() {
                    calls.push(draft_call(section));
                }
            }
        }
        Mode::Charts => {
            for kind in &input.params.chart_kinds {
                calls.push(chart_call(*kind));
            }
        }
        Mode::Plan => {
            seed_search(&mut calls);
            for section in CANONICAL_SECTIONS {
                calls.push(draft_call(section));
            }
        }
    }

    calls.push(ToolCall::new(
        ToolInvocation::Compile,
        "assemble the final artifact",
    ));

    Plan {
        understanding: json!({
            "core_subject": first_words(input.goal, 12),
            "user_goal": input.goal,
            "key_topics": [],
            "data_gaps": ["planner unavailable; minimal plan in effect"],
        }),
        tool_calls: calls,
    }
}

fn chart_call(kind: ChartKind) -> ToolCall {
    ToolCall::new(
        ToolInvocation::GenerateChart {
            chart_kind: kind,
            title: None,
        },
        format!("render the requested {kind} chart"),
    )
}

fn draft_call(section: &str) -> ToolCall {
    ToolCall::new(
        ToolInvocation::DraftSection {
            section_name: section.to_string(),
            instruction: None,
        },
        format!("draft the {section} section"),
    )
}

fn first_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;
    use ds_domain::mode::Depth;
    use ds_domain::template::TemplateType;

    fn input_for<'a>(mode: Mode, params: &'a RunParams, files: &'a [RunFile]) -> PlannerInput<'a> {
        PlannerInput {
            mode,
            goal: "quantum computing milestones 2024 and what they mean",
            params,
            files,
            file_context_bytes: 8192,
        }
    }

    fn file(name: &str, content: &str) -> RunFile {
        RunFile {
            upload_id: "up1".into(),
            file_name: name.into(),
            content: content.into(),
        }
    }

    #[test]
    fn research_fallback_without_files() {
        let params = RunParams::default();
        let input = input_for(Mode::Research, &params, &[]);
        let plan = fallback_plan(&input);

        assert_eq!(plan.count_of("analyze_documents"), 0);
        assert_eq!(plan.count_of("search_web"), 1);
        assert_eq!(plan.count_of("compile"), 1);
        assert_eq!(
            plan.tool_calls.last().unwrap().invocation,
            ToolInvocation::Compile
        );
        assert!(validate_plan(&input, &plan).is_ok());
    }

    #[test]
    fn research_fallback_with_file_analyzes_first() {
        let params = RunParams::default();
        let files = vec![file("cabots.pdf", "Cabot's Cookery School, Westport")];
        let input = input_for(Mode::Research, &params, &files);
        let plan = fallback_plan(&input);

        assert_eq!(
            plan.tool_calls[0].invocation,
            ToolInvocation::AnalyzeDocuments { instruction: None }
        );
        assert!(validate_plan(&input, &plan).is_ok());
    }

    #[test]
    fn empty_file_content_counts_as_no_files() {
        let params = RunParams::default();
        let files = vec![file("empty.pdf", "   ")];
        let input = input_for(Mode::Research, &params, &files);
        let plan = fallback_plan(&input);
        assert_eq!(plan.count_of("analyze_documents"), 0);
    }

    #[test]
    fn fallback_validates_for_every_mode() {
        let report_params = RunParams {
            chart_kinds: vec![ChartKind::Bar, ChartKind::Line],
            ..Default::default()
        };
        let template_params = RunParams {
            template_type: Some(TemplateType::SwotAnalysis),
            ..Default::default()
        };
        let charts_params = RunParams {
            chart_kinds: vec![ChartKind::Radar, ChartKind::Stackedbar],
            ..Default::default()
        };
        let plain = RunParams::default();

        for (mode, params) in [
            (Mode::Research, &plain),
            (Mode::Report, &report_params),
            (Mode::Template, &template_params),
            (Mode::Charts, &charts_params),
            (Mode::Plan, &plain),
        ] {
            let input = input_for(mode, params, &[]);
            let plan = fallback_plan(&input);
            assert!(
                validate_plan(&input, &plan).is_ok(),
                "fallback for {mode} failed validation: {:?}",
                validate_plan(&input, &plan)
            );
        }
    }

    #[test]
    fn search_cap_enforced_per_depth() {
        let params = RunParams {
            depth: Depth::Brief,
            ..Default::default()
        };
        let input = input_for(Mode::Research, &params, &[]);

        let mut plan = fallback_plan(&input);
        // Inject a second search over the brief cap of 1.
        plan.tool_calls.insert(
            0,
            ToolCall::new(
                ToolInvocation::SearchWeb {
                    query: "extra".into(),
                },
                "",
            ),
        );
        let err = validate_plan(&input, &plan).unwrap_err();
        assert!(err.contains("cap"));
    }

    #[test]
    fn compile_must_be_last_and_unique() {
        let params = RunParams::default();
        let input = input_for(Mode::Research, &params, &[]);
        let mut plan = fallback_plan(&input);

        plan.tool_calls.push(ToolCall::new(
            ToolInvocation::SearchWeb {
                query: "after compile".into(),
            },
            "",
        ));
        assert!(validate_plan(&input, &plan).is_err());

        let mut plan = fallback_plan(&input);
        plan.tool_calls.insert(0, ToolCall::new(ToolInvocation::Compile, ""));
        assert!(validate_plan(&input, &plan).is_err());
    }

    #[test]
    fn unrequested_chart_kind_rejected() {
        let params = RunParams {
            chart_kinds: vec![ChartKind::Bar],
            ..Default::default()
        };
        let input = input_for(Mode::Report, &params, &[]);
        let mut plan = fallback_plan(&input);
        for tc in &mut plan.tool_calls {
            if let ToolInvocation::GenerateChart { chart_kind, .. } = &mut tc.invocation {
                *chart_kind = ChartKind::Pie;
            }
        }
        let err = validate_plan(&input, &plan).unwrap_err();
        assert!(err.contains("not requested"));
    }

    #[test]
    fn report_chart_count_must_match_requested() {
        let params = RunParams {
            chart_kinds: vec![ChartKind::Bar, ChartKind::Line],
            ..Default::default()
        };
        let input = input_for(Mode::Report, &params, &[]);
        let mut plan = fallback_plan(&input);
        plan.tool_calls
            .retain(|tc| !matches!(tc.invocation, ToolInvocation::GenerateChart { chart_kind: ChartKind::Line, .. }));
        assert!(validate_plan(&input, &plan).is_err());
    }

    #[test]
    fn template_sections_must_match_catalog() {
        let params = RunParams {
            template_type: Some(TemplateType::SwotAnalysis),
            ..Default::default()
        };
        let input = input_for(Mode::Template, &params, &[]);
        let mut plan = fallback_plan(&input);
        // Rename one section away from the catalog.
        for tc in &mut plan.tool_calls {
            if let ToolInvocation::DraftSection { section_name, .. } = &mut tc.invocation {
                if section_name == "Threats" {
                    *section_name = "Dangers".into();
                }
            }
        }
        assert!(validate_plan(&input, &plan).is_err());
    }

    #[test]
    fn template_search_requires_opt_in_for_second_call() {
        let opted = RunParams {
            template_type: Some(TemplateType::ExecutiveBrief),
            allow_web: true,
            ..Default::default()
        };
        let input = input_for(Mode::Template, &opted, &[]);
        assert_eq!(input.search_cap(), 2);

        let default = RunParams {
            template_type: Some(TemplateType::ExecutiveBrief),
            ..Default::default()
        };
        let input = input_for(Mode::Template, &default, &[]);
        assert_eq!(input.search_cap(), 1);
    }

    #[test]
    fn analyze_without_files_rejected() {
        let params = RunParams::default();
        let input = input_for(Mode::Research, &params, &[]);
        let mut plan = fallback_plan(&input);
        plan.tool_calls.insert(
            0,
            ToolCall::new(ToolInvocation::AnalyzeDocuments { instruction: None }, ""),
        );
        let err = validate_plan(&input, &plan).unwrap_err();
        assert!(err.contains("without usable files"));
    }

    #[test]
    fn plan_mode_fallback_covers_canonical_sections() {
        let params = RunParams::default();
        let input = input_for(Mode::Plan, &params, &[]);
        let plan = fallback_plan(&input);
        let sections = plan.section_names();
        for canonical in CANONICAL_SECTIONS {
            assert!(sections.iter().any(|s| s.eq_ignore_ascii_case(canonical)));
        }
    }

    #[test]
    fn first_words_truncates() {
        assert_eq!(first_words("a b c d", 2), "a b");
        assert_eq!(first_words("one", 12), "one");
    }

    #[test]
    fn plan_json_contract_round_trips() {
        // The exact shape the planner prompt asks the model for.
        let raw = r#"{
            "understanding": {"core_subject": "qc", "user_goal": "g",
                              "key_topics": ["a"], "data_gaps": []},
            "tool_calls": [
                {"tool": "search_web", "parameters": {"query": "qc 2024"},
                 "reasoning": "baseline", "depends_on": []},
                {"tool": "compile", "reasoning": "assemble"}
            ]
        }"#;
        let plan: Plan = serde_json::from_str(raw).unwrap();
        let params = RunParams::default();
        let input = input_for(Mode::Research, &params, &[]);
        assert!(validate_plan(&input, &plan).is_ok());
    }
}
