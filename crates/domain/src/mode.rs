use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Mode
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What kind of artifact a run produces. Determines which compiler
/// assembles the final output and which guardrails the planner enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Research,
    Report,
    Template,
    Charts,
    Plan,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Research => "research",
            Self::Report => "report",
            Self::Template => "template",
            Self::Charts => "charts",
            Self::Plan => "plan",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "research" => Some(Self::Research),
            "report" => Some(Self::Report),
            "template" => Some(Self::Template),
            "charts" => Some(Self::Charts),
            "plan" => Some(Self::Plan),
            _ => None,
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Depth
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Coarse user-facing knob controlling how many searches and sections a
/// run is allowed. The meaning per mode is fixed here; the planner treats
/// deviation as a guardrail violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Depth {
    Brief,
    Short,
    #[default]
    Medium,
    Long,
    Comprehensive,
}

impl Depth {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Short => "short",
            Self::Medium => "medium",
            Self::Long => "long",
            Self::Comprehensive => "comprehensive",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "brief" => Some(Self::Brief),
            "short" => Some(Self::Short),
            "medium" => Some(Self::Medium),
            "long" => Some(Self::Long),
            "comprehensive" => Some(Self::Comprehensive),
            _ => None,
        }
    }

    /// Maximum `search_web` calls a plan may carry for the given mode.
    /// Template mode is capped at 1 only when the user opted into web
    /// search; the planner enforces the opt-in separately.
    pub fn search_cap(self, mode: Mode) -> usize {
        match mode {
            Mode::Research => match self {
                Self::Brief | Self::Short => 1,
                Self::Medium => 2,
                Self::Long => 3,
                Self::Comprehensive => 4,
            },
            Mode::Report | Mode::Plan => 2,
            Mode::Template | Mode::Charts => 1,
        }
    }

    /// Allowed `draft_section` count range for report mode, tuned to depth
    /// within the hard [2, 10] bounds.
    pub fn report_section_range(self) -> (usize, usize) {
        match self {
            Self::Brief => (2, 3),
            Self::Short => (2, 4),
            Self::Medium => (3, 6),
            Self::Long => (4, 8),
            Self::Comprehensive => (5, 10),
        }
    }
}

impl std::fmt::Display for Depth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_round_trip() {
        for mode in [
            Mode::Research,
            Mode::Report,
            Mode::Template,
            Mode::Charts,
            Mode::Plan,
        ] {
            assert_eq!(Mode::parse(mode.as_str()), Some(mode));
        }
        assert_eq!(Mode::parse("podcast"), None);
    }

    #[test]
    fn depth_round_trip() {
        for depth in [
            Depth::Brief,
            Depth::Short,
            Depth::Medium,
            Depth::Long,
            Depth::Comprehensive,
        ] {
            assert_eq!(Depth::parse(depth.as_str()), Some(depth));
        }
        assert_eq!(Depth::parse("exhaustive"), None);
    }

    #[test]
    fn research_search_caps_scale_with_depth() {
        assert_eq!(Depth::Brief.search_cap(Mode::Research), 1);
        assert_eq!(Depth::Short.search_cap(Mode::Research), 1);
        assert_eq!(Depth::Medium.search_cap(Mode::Research), 2);
        assert_eq!(Depth::Long.search_cap(Mode::Research), 3);
        assert_eq!(Depth::Comprehensive.search_cap(Mode::Research), 4);
    }

    #[test]
    fn report_search_cap_is_flat() {
        for depth in [Depth::Brief, Depth::Comprehensive] {
            assert_eq!(depth.search_cap(Mode::Report), 2);
        }
    }

    #[test]
    fn report_section_range_within_hard_bounds() {
        for depth in [
            Depth::Brief,
            Depth::Short,
            Depth::Medium,
            Depth::Long,
            Depth::Comprehensive,
        ] {
            let (lo, hi) = depth.report_section_range();
            assert!(lo >= 2 && hi <= 10 && lo <= hi);
        }
    }

    #[test]
    fn default_depth_is_medium() {
        assert_eq!(Depth::default(), Depth::Medium);
    }
}
