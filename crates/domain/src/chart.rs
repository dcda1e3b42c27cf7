//! Chart kinds and typed render payloads.
//!
//! The render service accepts a closed set of chart kinds, each with its
//! own payload shape. Payloads are grouped into families so validation and
//! the deterministic sample fallback stay in one place.

use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Chart kind (closed set)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Line,
    Bar,
    Area,
    Pie,
    Scatter,
    Bubble,
    Funnel,
    Heatmap,
    Radar,
    Sankey,
    Sunburst,
    Treemap,
    Candlestick,
    Flow,
    Gantt,
    Stackedbar,
    Themeriver,
    Wordcloud,
}

pub const ALL_CHART_KINDS: [ChartKind; 18] = [
    ChartKind::Line,
    ChartKind::Bar,
    ChartKind::Area,
    ChartKind::Pie,
    ChartKind::Scatter,
    ChartKind::Bubble,
    ChartKind::Funnel,
    ChartKind::Heatmap,
    ChartKind::Radar,
    ChartKind::Sankey,
    ChartKind::Sunburst,
    ChartKind::Treemap,
    ChartKind::Candlestick,
    ChartKind::Flow,
    ChartKind::Gantt,
    ChartKind::Stackedbar,
    ChartKind::Themeriver,
    ChartKind::Wordcloud,
];

impl ChartKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "line",
            Self::Bar => "bar",
            Self::Area => "area",
            Self::Pie => "pie",
            Self::Scatter => "scatter",
            Self::Bubble => "bubble",
            Self::Funnel => "funnel",
            Self::Heatmap => "heatmap",
            Self::Radar => "radar",
            Self::Sankey => "sankey",
            Self::Sunburst => "sunburst",
            Self::Treemap => "treemap",
            Self::Candlestick => "candlestick",
            Self::Flow => "flow",
            Self::Gantt => "gantt",
            Self::Stackedbar => "stackedbar",
            Self::Themeriver => "themeriver",
            Self::Wordcloud => "wordcloud",
        }
    }

    /// Parse user input, folding case, whitespace, and common aliases
    /// (`stackbar` → `stackedbar`, `theme river` → `themeriver`).
    pub fn parse(input: &str) -> Option<Self> {
        let normalized: String = input
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect();
        let canonical = match normalized.as_str() {
            "stackbar" | "stackedbars" => "stackedbar",
            "wordclouds" => "wordcloud",
            "candle" | "candles" => "candlestick",
            other => other,
        };
        ALL_CHART_KINDS
            .iter()
            .copied()
            .find(|k| k.as_str() == canonical)
    }
}

impl std::fmt::Display for ChartKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Payload union
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Series {
    pub name: String,
    pub data: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedValue {
    pub name: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PointSeries {
    pub name: String,
    /// `[x, y]` for scatter; `[x, y, size]` for bubble.
    pub points: Vec<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RadarIndicator {
    pub name: String,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TreeNode {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link {
    pub source: String,
    pub target: String,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GanttTask {
    pub name: String,
    pub start: String,
    pub end: String,
}

/// The typed payload union the render service accepts. Each chart kind
/// maps to exactly one family; `validate_for` rejects mismatches and
/// structurally empty payloads before any network call happens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ChartPayload {
    /// line, bar, area, stackedbar
    Cartesian {
        categories: Vec<String>,
        series: Vec<Series>,
    },
    /// pie, funnel, wordcloud
    NameValue { items: Vec<NamedValue> },
    /// scatter, bubble
    Points { series: Vec<PointSeries> },
    Radar {
        indicators: Vec<RadarIndicator>,
        series: Vec<Series>,
    },
    /// heatmap: cells are (x index, y index, value)
    Matrix {
        x_labels: Vec<String>,
        y_labels: Vec<String>,
        cells: Vec<(usize, usize, f64)>,
    },
    /// treemap, sunburst
    Tree { roots: Vec<TreeNode> },
    /// sankey, flow
    Links {
        nodes: Vec<String>,
        links: Vec<Link>,
    },
    /// candlestick: values are [open, close, low, high]
    Candlestick {
        categories: Vec<String>,
        values: Vec<[f64; 4]>,
    },
    Gantt { tasks: Vec<GanttTask> },
    /// themeriver: events are (date, value, series name)
    ThemeRiver { events: Vec<(String, f64, String)> },
}

impl ChartPayload {
    fn family_name(&self) -> &'static str {
        match self {
            Self::Cartesian { .. } => "cartesian",
            Self::NameValue { .. } => "name_value",
            Self::Points { .. } => "points",
            Self::Radar { .. } => "radar",
            Self::Matrix { .. } => "matrix",
            Self::Tree { .. } => "tree",
            Self::Links { .. } => "links",
            Self::Candlestick { .. } => "candlestick",
            Self::Gantt { .. } => "gantt",
            Self::ThemeRiver { .. } => "theme_river",
        }
    }

    /// The payload family a chart kind expects.
    pub fn expected_family(kind: ChartKind) -> &'static str {
        match kind {
            ChartKind::Line | ChartKind::Bar | ChartKind::Area | ChartKind::Stackedbar => {
                "cartesian"
            }
            ChartKind::Pie | ChartKind::Funnel | ChartKind::Wordcloud => "name_value",
            ChartKind::Scatter | ChartKind::Bubble => "points",
            ChartKind::Radar => "radar",
            ChartKind::Heatmap => "matrix",
            ChartKind::Treemap | ChartKind::Sunburst => "tree",
            ChartKind::Sankey | ChartKind::Flow => "links",
            ChartKind::Candlestick => "candlestick",
            ChartKind::Gantt => "gantt",
            ChartKind::Themeriver => "theme_river",
        }
    }

    /// Shape-check this payload against the kind it will be rendered as.
    pub fn validate_for(&self, kind: ChartKind) -> Result<(), String> {
        let expected = Self::expected_family(kind);
        if self.family_name() != expected {
            return Err(format!(
                "chart kind {kind} expects a {expected} payload, got {}",
                self.family_name()
            ));
        }

        let empty = match self {
            Self::Cartesian { categories, series } => {
                categories.is_empty()
                    || series.is_empty()
                    || series.iter().any(|s| s.data.len() != categories.len())
            }
            Self::NameValue { items } => items.is_empty(),
            Self::Points { series } => {
                let dims = if kind == ChartKind::Bubble { 3 } else { 2 };
                series.is_empty()
                    || series
                        .iter()
                        .any(|s| s.points.is_empty() || s.points.iter().any(|p| p.len() != dims))
            }
            Self::Radar { indicators, series } => {
                indicators.is_empty()
                    || series.is_empty()
                    || series.iter().any(|s| s.data.len() != indicators.len())
            }
            Self::Matrix {
                x_labels,
                y_labels,
                cells,
            } => {
                x_labels.is_empty()
                    || y_labels.is_empty()
                    || cells.is_empty()
                    || cells
                        .iter()
                        .any(|(x, y, _)| *x >= x_labels.len() || *y >= y_labels.len())
            }
            Self::Tree { roots } => roots.is_empty(),
            Self::Links { nodes, links } => {
                nodes.is_empty()
                    || links.is_empty()
                    || links
                        .iter()
                        .any(|l| !nodes.contains(&l.source) || !nodes.contains(&l.target))
            }
            Self::Candlestick { categories, values } => {
                categories.is_empty() || values.len() != categories.len()
            }
            Self::Gantt { tasks } => tasks.is_empty(),
            Self::ThemeRiver { events } => events.is_empty(),
        };

        if empty {
            return Err(format!("{} payload for {kind} is empty or inconsistent", expected));
        }
        Ok(())
    }

    /// Parse an LLM-produced JSON document into a payload for `kind`,
    /// validating shape. The document must carry the tagged `family` field.
    pub fn from_llm_json(kind: ChartKind, raw: &str) -> Result<Self, String> {
        let payload: ChartPayload =
            serde_json::from_str(raw).map_err(|e| format!("payload JSON: {e}"))?;
        payload.validate_for(kind)?;
        Ok(payload)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deterministic sample payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A fixed, always-valid payload for any kind. Used as the fallback when
/// the LLM cannot produce a usable payload, so a chart is always rendered.
pub fn sample_payload(kind: ChartKind) -> ChartPayload {
    let quarters = || vec!["Q1".into(), "Q2".into(), "Q3".into(), "Q4".into()];
    match kind {
        ChartKind::Line | ChartKind::Bar | ChartKind::Area | ChartKind::Stackedbar => {
            ChartPayload::Cartesian {
                categories: quarters(),
                series: vec![
                    Series {
                        name: "Series A".into(),
                        data: vec![12.0, 19.0, 24.0, 31.0],
                    },
                    Series {
                        name: "Series B".into(),
                        data: vec![8.0, 14.0, 17.0, 22.0],
                    },
                ],
            }
        }
        ChartKind::Pie | ChartKind::Funnel | ChartKind::Wordcloud => ChartPayload::NameValue {
            items: vec![
                NamedValue {
                    name: "Alpha".into(),
                    value: 40.0,
                },
                NamedValue {
                    name: "Beta".into(),
                    value: 32.0,
                },
                NamedValue {
                    name: "Gamma".into(),
                    value: 28.0,
                },
            ],
        },
        ChartKind::Scatter => ChartPayload::Points {
            series: vec![PointSeries {
                name: "Observations".into(),
                points: vec![vec![1.0, 3.2], vec![2.0, 4.1], vec![3.0, 5.9], vec![4.0, 7.4]],
            }],
        },
        ChartKind::Bubble => ChartPayload::Points {
            series: vec![PointSeries {
                name: "Observations".into(),
                points: vec![
                    vec![1.0, 3.2, 10.0],
                    vec![2.0, 4.1, 25.0],
                    vec![3.0, 5.9, 15.0],
                ],
            }],
        },
        ChartKind::Radar => ChartPayload::Radar {
            indicators: vec![
                RadarIndicator {
                    name: "Speed".into(),
                    max: 100.0,
                },
                RadarIndicator {
                    name: "Quality".into(),
                    max: 100.0,
                },
                RadarIndicator {
                    name: "Cost".into(),
                    max: 100.0,
                },
                RadarIndicator {
                    name: "Reach".into(),
                    max: 100.0,
                },
            ],
            series: vec![Series {
                name: "Current".into(),
                data: vec![65.0, 80.0, 55.0, 70.0],
            }],
        },
        ChartKind::Heatmap => ChartPayload::Matrix {
            x_labels: vec!["Mon".into(), "Tue".into(), "Wed".into()],
            y_labels: vec!["AM".into(), "PM".into()],
            cells: vec![
                (0, 0, 3.0),
                (1, 0, 7.0),
                (2, 0, 5.0),
                (0, 1, 6.0),
                (1, 1, 2.0),
                (2, 1, 8.0),
            ],
        },
        ChartKind::Treemap | ChartKind::Sunburst => ChartPayload::Tree {
            roots: vec![TreeNode {
                name: "Total".into(),
                value: None,
                children: vec![
                    TreeNode {
                        name: "Segment A".into(),
                        value: Some(55.0),
                        children: Vec::new(),
                    },
                    TreeNode {
                        name: "Segment B".into(),
                        value: Some(45.0),
                        children: Vec::new(),
                    },
                ],
            }],
        },
        ChartKind::Sankey | ChartKind::Flow => ChartPayload::Links {
            nodes: vec!["Input".into(), "Process".into(), "Output".into()],
            links: vec![
                Link {
                    source: "Input".into(),
                    target: "Process".into(),
                    value: 10.0,
                },
                Link {
                    source: "Process".into(),
                    target: "Output".into(),
                    value: 8.0,
                },
            ],
        },
        ChartKind::Candlestick => ChartPayload::Candlestick {
            categories: quarters(),
            values: vec![
                [20.0, 34.0, 18.0, 38.0],
                [34.0, 31.0, 28.0, 40.0],
                [31.0, 45.0, 30.0, 48.0],
                [45.0, 42.0, 39.0, 50.0],
            ],
        },
        ChartKind::Gantt => ChartPayload::Gantt {
            tasks: vec![
                GanttTask {
                    name: "Discovery".into(),
                    start: "2024-01-01".into(),
                    end: "2024-02-15".into(),
                },
                GanttTask {
                    name: "Build".into(),
                    start: "2024-02-16".into(),
                    end: "2024-05-31".into(),
                },
                GanttTask {
                    name: "Launch".into(),
                    start: "2024-06-01".into(),
                    end: "2024-06-30".into(),
                },
            ],
        },
        ChartKind::Themeriver => ChartPayload::ThemeRiver {
            events: vec![
                ("2024-01".into(), 10.0, "Theme A".into()),
                ("2024-02".into(), 15.0, "Theme A".into()),
                ("2024-01".into(), 8.0, "Theme B".into()),
                ("2024-02".into(), 12.0, "Theme B".into()),
            ],
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_canonical_names() {
        assert_eq!(ChartKind::parse("line"), Some(ChartKind::Line));
        assert_eq!(ChartKind::parse("Wordcloud"), Some(ChartKind::Wordcloud));
        assert_eq!(ChartKind::parse("  PIE  "), Some(ChartKind::Pie));
        assert_eq!(ChartKind::parse("histogram"), None);
    }

    #[test]
    fn parse_aliases() {
        assert_eq!(ChartKind::parse("stackbar"), Some(ChartKind::Stackedbar));
        assert_eq!(ChartKind::parse("stacked bar"), Some(ChartKind::Stackedbar));
        assert_eq!(ChartKind::parse("theme river"), Some(ChartKind::Themeriver));
        assert_eq!(ChartKind::parse("theme_river"), Some(ChartKind::Themeriver));
        assert_eq!(ChartKind::parse("candle"), Some(ChartKind::Candlestick));
    }

    #[test]
    fn every_kind_round_trips_through_parse() {
        for kind in ALL_CHART_KINDS {
            assert_eq!(ChartKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn sample_payloads_validate_for_every_kind() {
        for kind in ALL_CHART_KINDS {
            let payload = sample_payload(kind);
            assert!(
                payload.validate_for(kind).is_ok(),
                "sample payload for {kind} failed validation"
            );
        }
    }

    #[test]
    fn family_mismatch_is_rejected() {
        let payload = sample_payload(ChartKind::Pie);
        let err = payload.validate_for(ChartKind::Line).unwrap_err();
        assert!(err.contains("cartesian"));
    }

    #[test]
    fn cartesian_series_length_must_match_categories() {
        let payload = ChartPayload::Cartesian {
            categories: vec!["a".into(), "b".into()],
            series: vec![Series {
                name: "s".into(),
                data: vec![1.0],
            }],
        };
        assert!(payload.validate_for(ChartKind::Bar).is_err());
    }

    #[test]
    fn bubble_requires_three_dimensional_points() {
        let payload = ChartPayload::Points {
            series: vec![PointSeries {
                name: "s".into(),
                points: vec![vec![1.0, 2.0]],
            }],
        };
        assert!(payload.validate_for(ChartKind::Bubble).is_err());
        assert!(payload.validate_for(ChartKind::Scatter).is_ok());
    }

    #[test]
    fn links_must_reference_known_nodes() {
        let payload = ChartPayload::Links {
            nodes: vec!["a".into()],
            links: vec![Link {
                source: "a".into(),
                target: "ghost".into(),
                value: 1.0,
            }],
        };
        assert!(payload.validate_for(ChartKind::Sankey).is_err());
    }

    #[test]
    fn from_llm_json_round_trip() {
        let payload = sample_payload(ChartKind::Radar);
        let raw = serde_json::to_string(&payload).unwrap();
        let parsed = ChartPayload::from_llm_json(ChartKind::Radar, &raw).unwrap();
        assert_eq!(parsed, payload);
    }

    #[test]
    fn from_llm_json_rejects_garbage() {
        assert!(ChartPayload::from_llm_json(ChartKind::Line, "not json").is_err());
        assert!(ChartPayload::from_llm_json(ChartKind::Line, "{}").is_err());
    }
}
