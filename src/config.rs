use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration file structure for the relay.
///
/// Configuration files are loaded from the current directory or a specified path.
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// HTTP listener settings
    #[serde(default)]
    pub server: ServerConfig,

    /// GitLab instance the webhooks come from
    #[serde(default)]
    pub gitlab: GitLabConfig,

    /// Downstream CI servers every event is broadcast to
    #[serde(default)]
    pub ci_servers: Vec<CiServerConfig>,

    /// Names of the GitLab CI/CD variables consulted per project
    #[serde(default)]
    pub variables: VariableNames,

    /// Test result discovery
    #[serde(default)]
    pub test_results: TestResultsConfig,

    /// Prefix of the CI id given to pipeline (multi-branch) jobs
    #[serde(default = "default_job_ci_id_prefix")]
    pub job_ci_id_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Address the webhook listener binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitLabConfig {
    /// GitLab personal access token
    pub token: Option<String>,

    /// GitLab instance base URL
    #[serde(default = "default_gitlab_base_url")]
    pub base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CiServerConfig {
    /// Name used in logs and on the status endpoint
    pub name: String,

    /// Base URL of the server's ingestion API
    pub url: String,

    /// Bearer token for the ingestion API
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct VariableNames {
    #[serde(default = "default_coverage_report_path")]
    pub coverage_report_path: String,

    #[serde(default = "default_publish_merge_requests")]
    pub publish_merge_requests: String,

    #[serde(default = "default_destination_workspace")]
    pub destination_workspace: String,

    #[serde(default = "default_use_ssh_format")]
    pub use_ssh_format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TestResultsConfig {
    /// Glob matched against artifact archive entries
    #[serde(default = "default_test_results_pattern")]
    pub file_pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            gitlab: GitLabConfig::default(),
            ci_servers: Vec::new(),
            variables: VariableNames::default(),
            test_results: TestResultsConfig::default(),
            job_ci_id_prefix: default_job_ci_id_prefix(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for GitLabConfig {
    fn default() -> Self {
        Self {
            token: None,
            base_url: default_gitlab_base_url(),
        }
    }
}

impl Default for VariableNames {
    fn default() -> Self {
        Self {
            coverage_report_path: default_coverage_report_path(),
            publish_merge_requests: default_publish_merge_requests(),
            destination_workspace: default_destination_workspace(),
            use_ssh_format: default_use_ssh_format(),
        }
    }
}

impl Default for TestResultsConfig {
    fn default() -> Self {
        Self {
            file_pattern: default_test_results_pattern(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:9091".to_string()
}

fn default_gitlab_base_url() -> String {
    "https://gitlab.com".to_string()
}

fn default_coverage_report_path() -> String {
    "CIRELAY_COVERAGE_REPORT_PATH".to_string()
}

fn default_publish_merge_requests() -> String {
    "CIRELAY_PUBLISH_MERGE_REQUESTS".to_string()
}

fn default_destination_workspace() -> String {
    "CIRELAY_DESTINATION_WORKSPACE".to_string()
}

fn default_use_ssh_format() -> String {
    "CIRELAY_USE_SSH_FORMAT".to_string()
}

fn default_test_results_pattern() -> String {
    "**/*.xml".to_string()
}

fn default_job_ci_id_prefix() -> String {
    "pipeline:".to_string()
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./cirelay.toml
    /// 3. ./cirelay.json
    /// 4. ./cirelay.yaml
    /// 5. ./cirelay.yml
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        let candidates = ["cirelay.toml", "cirelay.json", "cirelay.yaml", "cirelay.yml"];

        for candidate in &candidates {
            let path = Path::new(candidate);
            if path.exists() {
                return Self::load_from_path(path);
            }
        }

        Ok(Self::default())
    }

    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}
