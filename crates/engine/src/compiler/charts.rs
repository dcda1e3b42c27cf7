//! Charts-mode compiler.
//!
//! Minimal by contract: one line per requested chart kind — the image for
//! rendered kinds, an inline failure note otherwise. No headers, no
//! metadata, no timestamps.

use super::{chart_failure_line, chart_image_line, CompileContext};

pub fn compile(ctx: &CompileContext<'_>) -> String {
    let mut lines = Vec::new();
    for kind in &ctx.params.chart_kinds {
        if let Some(artifact) = ctx.charts.get(kind) {
            lines.push(chart_image_line(ctx.goal, *kind, &artifact.url));
        } else if let Some((_, reason)) = ctx.failed_charts.iter().find(|(k, _)| k == kind) {
            lines.push(chart_failure_line(*kind, reason));
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::CompileContext;
    use ds_capabilities::{LlmCapability, LlmReply, LlmRequest};
    use ds_domain::chart::ChartKind;
    use ds_domain::run::{ChartArtifact, RunParams};
    use ds_domain::CapabilityError;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct NoLlm;

    #[async_trait::async_trait]
    impl LlmCapability for NoLlm {
        async fn ask(&self, _req: LlmRequest) -> Result<LlmReply, CapabilityError> {
            Err(CapabilityError::Transport("unused".into()))
        }
    }

    #[test]
    fn minimal_output_two_lines_no_headers() {
        let params = RunParams {
            chart_kinds: vec![ChartKind::Radar, ChartKind::Stackedbar],
            ..Default::default()
        };
        let mut charts = BTreeMap::new();
        charts.insert(
            ChartKind::Radar,
            ChartArtifact {
                url: "https://img/radar.png".into(),
                title: "t".into(),
                status: "rendered".into(),
            },
        );
        charts.insert(
            ChartKind::Stackedbar,
            ChartArtifact {
                url: "https://img/sb.png".into(),
                title: "t".into(),
                status: "rendered".into(),
            },
        );
        let llm = NoLlm;
        let ctx = CompileContext {
            goal: "AI usage in industries",
            params: &params,
            findings: &[],
            sources: &[],
            sections: &[],
            charts: &charts,
            failed_charts: &[],
            llm: &llm,
            llm_deadline: Duration::from_secs(1),
        };

        let out = compile(&ctx);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0],
            "![AI usage in industries - radar chart](https://img/radar.png)"
        );
        assert_eq!(
            lines[1],
            "![AI usage in industries - stackedbar chart](https://img/sb.png)"
        );
        assert!(!out.contains('#'), "no headings allowed");
        assert!(!out.to_lowercase().contains("generated"));
    }

    #[test]
    fn failed_kind_becomes_inline_note() {
        let params = RunParams {
            chart_kinds: vec![ChartKind::Pie],
            ..Default::default()
        };
        let charts = BTreeMap::new();
        let failed = vec![(ChartKind::Pie, "render_error".to_string())];
        let llm = NoLlm;
        let ctx = CompileContext {
            goal: "g",
            params: &params,
            findings: &[],
            sources: &[],
            sections: &[],
            charts: &charts,
            failed_charts: &failed,
            llm: &llm,
            llm_deadline: Duration::from_secs(1),
        };

        assert_eq!(
            compile(&ctx),
            "**pie:** chart generation failed (render_error)"
        );
    }
}
