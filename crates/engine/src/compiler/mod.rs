//! Mode compilers — turn accumulated findings and drafted sections into
//! the final markdown artifact.
//!
//! One module per mode. Research drafts its own sections here (dedicated
//! LLM call per section with MUST/MUST-NOT contracts); the other modes
//! assemble sections drafted earlier by the executor. Every drafting call
//! receives the entire findings corpus — truncating it is a contract
//! violation, not an optimization.

pub mod charts;
pub mod plan;
pub mod report;
pub mod research;
pub mod template;

use std::collections::BTreeMap;
use std::time::Duration;

use ds_capabilities::LlmCapability;
use ds_domain::chart::ChartKind;
use ds_domain::mode::Mode;
use ds_domain::run::{ChartArtifact, Finding, FindingOrigin, RunParams, Source};
use ds_domain::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Compile context
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything a mode compiler may read. Built by the executor when it
/// reaches the plan's `compile` step.
pub struct CompileContext<'a> {
    pub goal: &'a str,
    pub params: &'a RunParams,
    pub findings: &'a [Finding],
    pub sources: &'a [Source],
    /// Drafted sections in plan order: `(section_name, markdown)`.
    pub sections: &'a [(String, String)],
    pub charts: &'a BTreeMap<ChartKind, ChartArtifact>,
    /// Chart kinds that failed every render attempt, with the reason.
    pub failed_charts: &'a [(ChartKind, String)],
    pub llm: &'a dyn LlmCapability,
    pub llm_deadline: Duration,
}

impl CompileContext<'_> {
    /// Case-insensitive lookup of a drafted section.
    pub fn drafted(&self, name: &str) -> Option<&str> {
        self.sections
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, content)| content.as_str())
    }
}

/// Dispatch to the mode-specific compiler. An empty artifact is a compile
/// failure — the only fatal tool outcome.
pub async fn compile(mode: Mode, ctx: &CompileContext<'_>) -> Result<String> {
    let artifact = match mode {
        Mode::Research => research::compile(ctx).await?,
        Mode::Report => report::compile(ctx),
        Mode::Template => template::compile(ctx)?,
        Mode::Charts => charts::compile(ctx),
        Mode::Plan => plan::compile(ctx),
    };
    if artifact.trim().is_empty() {
        return Err(Error::CompileFailed(format!(
            "{mode} compiler produced no output"
        )));
    }
    Ok(artifact)
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Shared helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render the entire findings corpus for a drafting prompt, grouped by
/// origin (documents first). Nothing is dropped.
pub fn findings_corpus(findings: &[Finding]) -> String {
    if findings.is_empty() {
        return "(no findings were gathered)".into();
    }
    let mut out = String::new();
    for origin in [
        FindingOrigin::Document,
        FindingOrigin::WebSearch,
        FindingOrigin::LlmSynthesis,
    ] {
        for finding in findings.iter().filter(|f| f.origin == origin) {
            let tag = match origin {
                FindingOrigin::Document => "document",
                FindingOrigin::WebSearch => "web",
                FindingOrigin::LlmSynthesis => "synthesis",
            };
            match &finding.source_ref {
                Some(src) => out.push_str(&format!("- [{tag}, {src}] {}\n", finding.text)),
                None => out.push_str(&format!("- [{tag}] {}\n", finding.text)),
            }
        }
    }
    out
}

/// Deterministic numbered source list (already deduplicated upstream).
pub fn sources_section(sources: &[Source]) -> String {
    if sources.is_empty() {
        return "No sources were collected for this run.".into();
    }
    sources
        .iter()
        .enumerate()
        .map(|(i, s)| format!("{}. {}", i + 1, s.label()))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Markdown image line for a rendered chart.
pub fn chart_image_line(goal: &str, kind: ChartKind, url: &str) -> String {
    format!("![{goal} - {kind} chart]({url})")
}

/// Inline note for a chart that failed every attempt.
pub fn chart_failure_line(kind: ChartKind, reason: &str) -> String {
    format!("**{kind}:** chart generation failed ({reason})")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding(text: &str, origin: FindingOrigin) -> Finding {
        Finding {
            text: text.into(),
            origin,
            source_ref: None,
        }
    }

    #[test]
    fn corpus_groups_documents_first() {
        let findings = vec![
            finding("web fact", FindingOrigin::WebSearch),
            finding("doc fact", FindingOrigin::Document),
        ];
        let corpus = findings_corpus(&findings);
        let doc_pos = corpus.find("doc fact").unwrap();
        let web_pos = corpus.find("web fact").unwrap();
        assert!(doc_pos < web_pos);
    }

    #[test]
    fn corpus_keeps_every_finding() {
        let findings: Vec<Finding> = (0..200)
            .map(|i| finding(&format!("fact number {i}"), FindingOrigin::WebSearch))
            .collect();
        let corpus = findings_corpus(&findings);
        for i in 0..200 {
            assert!(corpus.contains(&format!("fact number {i}")));
        }
    }

    #[test]
    fn corpus_empty_statement() {
        assert!(findings_corpus(&[]).contains("no findings"));
    }

    #[test]
    fn sources_numbered() {
        let sources = vec![
            Source::web("https://a.io", Some("A".into())),
            Source::file("notes.txt"),
        ];
        let out = sources_section(&sources);
        assert!(out.starts_with("1. A — https://a.io"));
        assert!(out.contains("2. notes.txt"));
    }

    #[test]
    fn chart_lines() {
        assert_eq!(
            chart_image_line("AI usage", ChartKind::Radar, "https://img/1.png"),
            "![AI usage - radar chart](https://img/1.png)"
        );
        assert_eq!(
            chart_failure_line(ChartKind::Bar, "timeout"),
            "**bar:** chart generation failed (timeout)"
        );
    }
}
