//! Research-mode compiler.
//!
//! Five sections in fixed order, each non-mechanical one produced by a
//! dedicated LLM call whose prompt states what the section MUST contain
//! and MUST NOT contain — the anti-repetition contract. The `brief` depth
//! collapses the first four sections into a two-paragraph synthesis.

use ds_capabilities::{ChatMessage, LlmRequest};
use ds_domain::mode::Depth;
use ds_domain::Result;

use super::{findings_corpus, sources_section, CompileContext};

struct SectionContract {
    name: &'static str,
    must: &'static str,
    must_not: &'static str,
}

const SECTIONS: [SectionContract; 4] = [
    SectionContract {
        name: "Overview",
        must: "2-3 paragraphs that set context for the topic: what it is, why it \
               matters, and the scope of this report.",
        must_not: "individual findings, statistics from the evidence, analysis, \
                   or recommendations — those belong to later sections.",
    },
    SectionContract {
        name: "Key Findings",
        must: "a markdown bullet list of concrete facts taken directly from the \
               evidence, at least 5 bullets when the evidence allows, each one \
               self-contained.",
        must_not: "interpretation, opinion, forecasts, or any fact not present \
                   in the evidence.",
    },
    SectionContract {
        name: "Analysis",
        must: "3-5 paragraphs interpreting what the findings mean together: \
               patterns, tensions, implications.",
        must_not: "restating findings verbatim, introducing new facts, or \
                   making recommendations.",
    },
    SectionContract {
        name: "Recommendations",
        must: "a numbered list of 4-6 specific, actionable recommendations that \
               follow from the analysis.",
        must_not: "repeating findings or analysis text, vague advice, or \
                   padding.",
    },
];

const BRIEF_CONTRACT: &str = "Write exactly two paragraphs synthesizing the \
evidence: the first states the most important concrete facts (names, numbers, \
dates), the second interprets them and gives the key takeaway. Do not use \
headings or bullet lists. If the evidence is empty, state plainly that no \
findings could be gathered — never invent facts.";

pub async fn compile(ctx: &CompileContext<'_>) -> Result<String> {
    let corpus = findings_corpus(ctx.findings);

    let mut out = String::new();
    if ctx.params.depth == Depth::Brief {
        let synthesis = draft(ctx, "Brief", BRIEF_CONTRACT, &corpus).await;
        out.push_str(&synthesis);
        out.push_str("\n\n## Sources\n\n");
        out.push_str(&sources_section(ctx.sources));
        return Ok(out);
    }

    for contract in &SECTIONS {
        let prompt = format!(
            "This section MUST contain: {}\nThis section MUST NOT contain: {}\n\
             If the evidence is empty, state plainly that no findings could be \
             gathered for this topic — never invent facts.",
            contract.must, contract.must_not
        );
        let body = draft(ctx, contract.name, &prompt, &corpus).await;
        out.push_str(&format!("## {}\n\n{}\n\n", contract.name, body.trim()));
    }

    out.push_str("## Sources\n\n");
    out.push_str(&sources_section(ctx.sources));
    Ok(out)
}

/// One section-drafting call. A capability failure degrades to an honest
/// placeholder instead of failing the whole compile — a thin artifact
/// beats a dead run.
async fn draft(ctx: &CompileContext<'_>, section: &str, contract: &str, corpus: &str) -> String {
    let system = format!(
        "You write the \"{section}\" section of a research report. {contract} \
         Use only the evidence provided. Respond with the section body in \
         markdown, without the section heading."
    );
    let user = format!("Goal: {}\n\nEvidence:\n{corpus}", ctx.goal);
    let req = LlmRequest::new(
        vec![ChatMessage::system(system), ChatMessage::user(user)],
        ctx.llm_deadline,
    )
    .with_temperature(0.4);

    match ctx.llm.ask(req).await {
        Ok(reply) if !reply.content.trim().is_empty() => reply.content.trim().to_string(),
        Ok(_) => placeholder(section),
        Err(e) => {
            tracing::warn!(section = %section, error = %e, "section draft failed");
            placeholder(section)
        }
    }
}

fn placeholder(section: &str) -> String {
    format!("*(the {section} section could not be generated for this run)*")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn section_contracts_cover_the_research_shape() {
        let names: Vec<&str> = SECTIONS.iter().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["Overview", "Key Findings", "Analysis", "Recommendations"]
        );
        for contract in &SECTIONS {
            assert!(!contract.must.is_empty());
            assert!(!contract.must_not.is_empty());
        }
    }

    #[test]
    fn placeholder_names_the_section() {
        assert!(placeholder("Analysis").contains("Analysis"));
    }
}
