use serde::{Deserialize, Serialize};

/// The fixed business-document templates the template-mode compiler
/// produces. Each template carries an exact, ordered section list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    SwotAnalysis,
    ExecutiveBrief,
    MarketLandscape,
    CompetitorDossier,
    BusinessPlan,
    ProjectPlan,
    StrategicPlan,
}

pub const ALL_TEMPLATE_TYPES: [TemplateType; 7] = [
    TemplateType::SwotAnalysis,
    TemplateType::ExecutiveBrief,
    TemplateType::MarketLandscape,
    TemplateType::CompetitorDossier,
    TemplateType::BusinessPlan,
    TemplateType::ProjectPlan,
    TemplateType::StrategicPlan,
];

impl TemplateType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SwotAnalysis => "swot_analysis",
            Self::ExecutiveBrief => "executive_brief",
            Self::MarketLandscape => "market_landscape",
            Self::CompetitorDossier => "competitor_dossier",
            Self::BusinessPlan => "business_plan",
            Self::ProjectPlan => "project_plan",
            Self::StrategicPlan => "strategic_plan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        ALL_TEMPLATE_TYPES
            .iter()
            .copied()
            .find(|t| t.as_str() == s.trim().to_ascii_lowercase())
    }

    /// Human-readable document title.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::SwotAnalysis => "SWOT Analysis",
            Self::ExecutiveBrief => "Executive Brief",
            Self::MarketLandscape => "Market Landscape",
            Self::CompetitorDossier => "Competitor Dossier",
            Self::BusinessPlan => "Business Plan",
            Self::ProjectPlan => "Project Plan",
            Self::StrategicPlan => "Strategic Plan",
        }
    }

    /// The fixed, ordered section list for this template.
    pub fn sections(self) -> &'static [&'static str] {
        match self {
            Self::SwotAnalysis => &[
                "Overview",
                "Strengths",
                "Weaknesses",
                "Opportunities",
                "Threats",
                "Strategic Recommendations",
            ],
            Self::ExecutiveBrief => &[
                "Overview",
                "Key Findings",
                "Strategic Implications",
                "Recommendations",
            ],
            Self::MarketLandscape => &[
                "Market Overview",
                "Segments",
                "Key Players",
                "Trends",
                "Competitive Dynamics",
                "Outlook",
            ],
            Self::CompetitorDossier => &[
                "Company Profile",
                "Products",
                "Positioning",
                "Strengths & Weaknesses",
                "Outlook",
            ],
            Self::BusinessPlan => &[
                "Executive Summary",
                "Market",
                "Offering",
                "Go-to-Market",
                "Operations",
                "Financials",
                "Risks",
            ],
            Self::ProjectPlan => &[
                "Scope",
                "Milestones",
                "Workstreams",
                "Timeline",
                "Resources",
                "Risks",
            ],
            Self::StrategicPlan => &[
                "Vision",
                "Objectives",
                "Initiatives",
                "Timeline",
                "Metrics",
                "Risks",
            ],
        }
    }

    /// Sections that must render as bullet lists rather than prose.
    pub fn is_bullet_section(self, section: &str) -> bool {
        matches!(
            (self, section),
            (
                Self::SwotAnalysis,
                "Strengths" | "Weaknesses" | "Opportunities" | "Threats"
            ) | (Self::ExecutiveBrief, "Key Findings")
        )
    }
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trip() {
        for t in ALL_TEMPLATE_TYPES {
            assert_eq!(TemplateType::parse(t.as_str()), Some(t));
        }
        assert_eq!(TemplateType::parse("haiku"), None);
    }

    #[test]
    fn swot_sections_exact_order() {
        assert_eq!(
            TemplateType::SwotAnalysis.sections(),
            &[
                "Overview",
                "Strengths",
                "Weaknesses",
                "Opportunities",
                "Threats",
                "Strategic Recommendations"
            ]
        );
    }

    #[test]
    fn every_template_has_sections() {
        for t in ALL_TEMPLATE_TYPES {
            assert!(!t.sections().is_empty());
        }
    }

    #[test]
    fn swot_quadrants_are_bullet_sections() {
        let t = TemplateType::SwotAnalysis;
        assert!(t.is_bullet_section("Strengths"));
        assert!(t.is_bullet_section("Threats"));
        assert!(!t.is_bullet_section("Overview"));
        assert!(!t.is_bullet_section("Strategic Recommendations"));
    }
}
