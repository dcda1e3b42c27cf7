use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub chart: ChartConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Server
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "d_port")]
    pub port: u16,
    #[serde(default = "d_host")]
    pub host: String,
    /// Origins allowed for CORS. Defaults to localhost-only.
    #[serde(default = "d_cors_origins")]
    pub allowed_origins: Vec<String>,
    /// Env var holding the gateway bearer token. Unset token = dev mode.
    #[serde(default = "d_token_env")]
    pub api_token_env: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: d_port(),
            host: d_host(),
            allowed_origins: d_cors_origins(),
            api_token_env: d_token_env(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Storage
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for run snapshots and per-run activity logs.
    #[serde(default = "d_state_path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: d_state_path(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Capabilities
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "d_llm_url")]
    pub base_url: String,
    /// Env var holding the API key (never the key itself).
    #[serde(default = "d_llm_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_llm_model")]
    pub model: String,
    #[serde(default = "d_120")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: d_llm_url(),
            api_key_env: d_llm_key_env(),
            model: d_llm_model(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "d_search_url")]
    pub base_url: String,
    #[serde(default = "d_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "d_30")]
    pub timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: d_search_url(),
            api_key_env: d_search_key_env(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "d_chart_url")]
    pub base_url: String,
    #[serde(default = "d_60")]
    pub timeout_secs: u64,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            base_url: d_chart_url(),
            timeout_secs: 60,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Runtime knobs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Hard deadline for one whole run. Expiry behaves as cancellation.
    #[serde(default = "d_900")]
    pub run_timeout_secs: u64,
    /// Deadline for the single planner LLM call.
    #[serde(default = "d_90")]
    pub planner_timeout_secs: u64,
    /// Bounded per-subscriber buffer for the SSE fan-out.
    #[serde(default = "d_256")]
    pub activity_buffer: usize,
    /// Soft cap on concurrently running runs (exceeded = warning, not
    /// rejection).
    #[serde(default = "d_32")]
    pub max_concurrent_runs: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            run_timeout_secs: 900,
            planner_timeout_secs: 90,
            activity_buffer: 256,
            max_concurrent_runs: 32,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Practical cap on the goal text, bytes.
    #[serde(default = "d_1024")]
    pub max_goal_bytes: usize,
    /// Total extracted-text budget across uploaded files, bytes.
    #[serde(default = "d_2mib")]
    pub max_files_bytes: usize,
    /// How much combined file content the planner sees as context.
    #[serde(default = "d_8192")]
    pub planner_file_context_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_goal_bytes: 1024,
            max_files_bytes: 2 * 1024 * 1024,
            planner_file_context_bytes: 8192,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl std::fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    /// Sanity-check the loaded configuration. Errors abort startup;
    /// warnings are logged and tolerated.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        let error = |message: String| ConfigIssue {
            severity: ConfigSeverity::Error,
            message,
        };
        let warning = |message: String| ConfigIssue {
            severity: ConfigSeverity::Warning,
            message,
        };

        for (name, url) in [
            ("llm.base_url", &self.llm.base_url),
            ("search.base_url", &self.search.base_url),
            ("chart.base_url", &self.chart.base_url),
        ] {
            if url.is_empty() {
                issues.push(error(format!("{name} must not be empty")));
            } else if !url.starts_with("http://") && !url.starts_with("https://") {
                issues.push(error(format!("{name} must be an http(s) URL, got {url:?}")));
            }
        }

        if self.runtime.run_timeout_secs < self.llm.timeout_secs {
            issues.push(warning(format!(
                "runtime.run_timeout_secs ({}) is shorter than a single LLM call \
                 budget ({})",
                self.runtime.run_timeout_secs, self.llm.timeout_secs
            )));
        }
        if self.runtime.planner_timeout_secs > self.runtime.run_timeout_secs {
            issues.push(error(
                "runtime.planner_timeout_secs exceeds the run deadline".into(),
            ));
        }
        if self.runtime.activity_buffer == 0 {
            issues.push(error("runtime.activity_buffer must be > 0".into()));
        }
        if self.limits.max_goal_bytes == 0 {
            issues.push(error("limits.max_goal_bytes must be > 0".into()));
        }

        issues
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Defaulting functions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn d_port() -> u16 {
    4420
}
fn d_host() -> String {
    "127.0.0.1".into()
}
fn d_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".into(),
        "http://127.0.0.1:3000".into(),
    ]
}
fn d_token_env() -> String {
    "DOSSIER_API_TOKEN".into()
}
fn d_state_path() -> PathBuf {
    PathBuf::from("./data/state")
}
fn d_llm_url() -> String {
    "http://localhost:8000/v1".into()
}
fn d_llm_key_env() -> String {
    "DOSSIER_LLM_API_KEY".into()
}
fn d_llm_model() -> String {
    "gpt-4o".into()
}
fn d_search_url() -> String {
    "http://localhost:8001".into()
}
fn d_search_key_env() -> String {
    "DOSSIER_SEARCH_API_KEY".into()
}
fn d_chart_url() -> String {
    "http://localhost:8002".into()
}
fn d_120() -> u64 {
    120
}
fn d_90() -> u64 {
    90
}
fn d_60() -> u64 {
    60
}
fn d_30() -> u64 {
    30
}
fn d_900() -> u64 {
    900
}
fn d_256() -> usize {
    256
}
fn d_32() -> usize {
    32
}
fn d_1024() -> usize {
    1024
}
fn d_2mib() -> usize {
    2 * 1024 * 1024
}
fn d_8192() -> usize {
    8192
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        let issues = config.validate();
        assert!(
            issues
                .iter()
                .all(|i| i.severity != ConfigSeverity::Error),
            "default config must not have errors: {issues:?}"
        );
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 4420);
        assert_eq!(config.llm.timeout_secs, 120);
        assert_eq!(config.search.timeout_secs, 30);
        assert_eq!(config.chart.timeout_secs, 60);
        assert_eq!(config.runtime.run_timeout_secs, 900);
        assert_eq!(config.runtime.activity_buffer, 256);
    }

    #[test]
    fn partial_toml_overrides() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9999

            [runtime]
            run_timeout_secs = 60
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.runtime.run_timeout_secs, 60);
        // Untouched sections keep defaults.
        assert_eq!(config.llm.model, "gpt-4o");
    }

    #[test]
    fn bad_capability_url_is_an_error() {
        let config: Config = toml::from_str(
            r#"
            [llm]
            base_url = "not a url"
            "#,
        )
        .unwrap();
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error && i.message.contains("llm.base_url")));
    }

    #[test]
    fn planner_deadline_beyond_run_deadline_is_an_error() {
        let config: Config = toml::from_str(
            r#"
            [runtime]
            run_timeout_secs = 30
            planner_timeout_secs = 90
            "#,
        )
        .unwrap();
        let issues = config.validate();
        assert!(issues.iter().any(|i| i.severity == ConfigSeverity::Error));
    }
}
