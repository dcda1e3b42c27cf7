//! Plan-mode compiler.
//!
//! Seven canonical sections, each drafted separately by the executor and
//! assembled here in canonical order.

use super::CompileContext;

pub const CANONICAL_SECTIONS: [&str; 7] = [
    "Executive Summary",
    "Goals",
    "Timeline",
    "Resources",
    "Risks",
    "Recommendations",
    "Conclusion",
];

pub fn compile(ctx: &CompileContext<'_>) -> String {
    let mut out = format!("# {}\n", ctx.goal);
    for section in CANONICAL_SECTIONS {
        let body = ctx
            .drafted(section)
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("*({section} could not be drafted)*"));
        out.push_str(&format!("\n## {section}\n\n{body}\n"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_capabilities::{LlmCapability, LlmReply, LlmRequest};
    use ds_domain::run::RunParams;
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
    fn canonical_sections_in_order() {
        let params = RunParams::default();
        let sections: Vec<(String, String)> = CANONICAL_SECTIONS
            .iter()
            .map(|s| (s.to_string(), format!("{s} body")))
            .collect();
        let charts = BTreeMap::new();
        let llm = NoLlm;
        let ctx = CompileContext {
            goal: "launch plan",
            params: &params,
            findings: &[],
            sources: &[],
            sections: &sections,
            charts: &charts,
            failed_charts: &[],
            llm: &llm,
            llm_deadline: Duration::from_secs(1),
        };

        let out = compile(&ctx);
        assert!(out.starts_with("# launch plan\n"));
        let positions: Vec<usize> = CANONICAL_SECTIONS
            .iter()
            .map(|s| out.find(&format!("## {s}")).unwrap())
            .collect();
        let mut sorted = positions.clone();
        sorted.sort_unstable();
        assert_eq!(positions, sorted);
    }
}
