//! Report-mode compiler.
//!
//! The planner proposes the section list; sections arrive here already
//! drafted. `Executive Summary` always leads, `Visualizations` is
//! auto-appended last with one image per successful chart kind and an
//! inline note per failed kind.

use super::{chart_failure_line, chart_image_line, CompileContext};

pub fn compile(ctx: &CompileContext<'_>) -> String {
    let mut out = String::new();

    // Executive Summary first, whatever position it was drafted in.
    if let Some(body) = ctx.drafted("Executive Summary") {
        out.push_str(&format!("## Executive Summary\n\n{}\n\n", body.trim()));
    }
    for (name, body) in ctx.sections {
        if name.eq_ignore_ascii_case("Executive Summary") {
            continue;
        }
        out.push_str(&format!("## {}\n\n{}\n\n", name, body.trim()));
    }

    if !ctx.charts.is_empty() || !ctx.failed_charts.is_empty() {
        out.push_str("## Visualizations\n");
        // Requested order, not map order.
        for kind in &ctx.params.chart_kinds {
            if let Some(artifact) = ctx.charts.get(kind) {
                out.push_str(&format!(
                    "\n### {kind}\n\n{}\n",
                    chart_image_line(ctx.goal, *kind, &artifact.url)
                ));
            } else if let Some((_, reason)) =
                ctx.failed_charts.iter().find(|(k, _)| k == kind)
            {
                out.push_str(&format!(
                    "\n### {kind}\n\n{}\n",
                    chart_failure_line(*kind, reason)
                ));
            }
        }
    }

    out.trim_end().to_string()
}
