//! Template-mode compiler.
//!
//! Fixed section list per template type, assembled as
//! `# {TemplateName}` followed by one `## {Section}` block each, in
//! catalog order regardless of draft order.

use ds_domain::{Error, Result};

use super::CompileContext;

pub fn compile(ctx: &CompileContext<'_>) -> Result<String> {
    let template = ctx
        .params
        .template_type
        .ok_or_else(|| Error::CompileFailed("template mode without a template_type".into()))?;

    let mut out = format!("# {}\n", template.display_name());
    for section in template.sections() {
        let body = ctx
            .drafted(section)
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(String::from)
            .unwrap_or_else(|| format!("*({section} could not be drafted)*"));
        out.push_str(&format!("\n## {section}\n{body}\n"));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ds_capabilities::{LlmCapability, LlmReply, LlmRequest};
    use ds_domain::run::RunParams;
    use ds_domain::template::TemplateType;
    use ds_domain::CapabilityError;
    use std::collections::BTreeMap;
    use std::time::Duration;

    struct NoLlm;

    #[async_trait::async_trait]
    impl LlmCapability for NoLlm {
        async fn ask(
            &self,
            _req: LlmRequest,
        ) -> std::result::Result<LlmReply, CapabilityError> {
            Err(CapabilityError::Transport("unused".into()))
        }
    }

    #[test]
    fn swot_headings_exact_order() {
        let params = RunParams {
            template_type: Some(TemplateType::SwotAnalysis),
            ..Default::default()
        };
        let sections: Vec<(String, String)> = TemplateType::SwotAnalysis
            .sections()
            .iter()
            .rev() // draft order deliberately scrambled
            .map(|s| (s.to_string(), format!("content for {s}")))
            .collect();
        let charts = BTreeMap::new();
        let llm = NoLlm;
        let ctx = CompileContext {
            goal: "Tesla 2024",
            params: &params,
            findings: &[],
            sources: &[],
            sections: &sections,
            charts: &charts,
            failed_charts: &[],
            llm: &llm,
            llm_deadline: Duration::from_secs(1),
        };

        let out = compile(&ctx).unwrap();
        assert!(out.starts_with("# SWOT Analysis\n"));

        let headings: Vec<usize> = TemplateType::SwotAnalysis
            .sections()
            .iter()
            .map(|s| out.find(&format!("## {s}")).unwrap())
            .collect();
        let mut sorted = headings.clone();
        sorted.sort_unstable();
        assert_eq!(headings, sorted, "catalog order must be preserved");
        assert!(out.contains("content for Threats"));
    }

    #[test]
    fn missing_section_gets_placeholder() {
        let params = RunParams {
            template_type: Some(TemplateType::ExecutiveBrief),
            ..Default::default()
        };
        let sections = vec![("Overview".to_string(), "ov".to_string())];
        let charts = BTreeMap::new();
        let llm = NoLlm;
        let ctx = CompileContext {
            goal: "g",
            params: &params,
            findings: &[],
            sources: &[],
            sections: &sections,
            charts: &charts,
            failed_charts: &[],
            llm: &llm,
            llm_deadline: Duration::from_secs(1),
        };

        let out = compile(&ctx).unwrap();
        assert!(out.contains("*(Key Findings could not be drafted)*"));
    }

    #[test]
    fn no_template_type_is_a_compile_failure() {
        let params = RunParams::default();
        let charts = BTreeMap::new();
        let llm = NoLlm;
        let ctx = CompileContext {
            goal: "g",
            params: &params,
            findings: &[],
            sources: &[],
            sections: &[],
            charts: &charts,
            failed_charts: &[],
            llm: &llm,
            llm_deadline: Duration::from_secs(1),
        };
        assert!(compile(&ctx).is_err());
    }
}
