use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;
use triage_core::PollPolicy;
use triage_core::client::DEFAULT_API_VERSION;
use triage_core::credential::mask_secret;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageConfig {
    /// Agents endpoint of the project, e.g. https://<resource>.services.ai.azure.com/api/projects/<project>
    #[serde(alias = "ProjectEndpoint")]
    pub project_endpoint: String,
    /// Model deployment every agent runs on
    #[serde(alias = "ModelDeploymentName")]
    pub model_deployment_name: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub polling: PollingConfig,
}

fn default_api_version() -> String {
    DEFAULT_API_VERSION.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Tokens from `az account get-access-token`
    #[default]
    AzureCli,
    /// A bearer token from `auth.token`
    Token,
}

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub method: AuthMethod,
    #[serde(default)]
    pub token: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("method", &self.method)
            .field("token", &mask_secret(&self.token))
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Unset waits for the run indefinitely
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_interval_ms() -> u64 {
    500
}

fn default_max_interval_ms() -> u64 {
    5_000
}

fn default_backoff_factor() -> f64 {
    1.0
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_interval_ms: default_max_interval_ms(),
            backoff_factor: default_backoff_factor(),
            timeout_secs: None,
        }
    }
}

impl PollingConfig {
    pub fn to_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(self.interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms.max(self.interval_ms)),
            backoff_factor: self.backoff_factor,
            timeout: self.timeout_secs.map(Duration::from_secs),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".triage")
}

impl TriageConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        // The file may hold a bearer token
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Ok(metadata) = std::fs::metadata(&path) {
                let mode = metadata.permissions().mode();
                if mode & 0o077 != 0 {
                    bail!(
                        "Config file {:?} has overly permissive permissions ({:o}). \
                         It may contain secrets. Fix with: chmod 600 {:?}",
                        path,
                        mode & 0o777,
                        path
                    );
                }
            }
        }

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `triage init` first.",
                path.display()
            )
        })?;

        Self::parse(&content, &path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        // Expand environment variables before parsing
        let expanded = expand_env_vars(content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config
            .validate()
            .with_context(|| format!("Invalid config at {}", path.display()))?;

        if config.auth.method == AuthMethod::Token
            && !config.auth.token.is_empty()
            && !content.contains("${")
        {
            warn!(
                "Bearer token is hardcoded in config file. For security, use environment variables: token = \"${{TRIAGE_API_TOKEN}}\""
            );
        }

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.project_endpoint.trim().is_empty() {
            bail!("project_endpoint is required");
        }
        let url = url::Url::parse(&self.project_endpoint)
            .with_context(|| format!("project_endpoint '{}' is not a URL", self.project_endpoint))?;
        if !matches!(url.scheme(), "http" | "https") {
            bail!("project_endpoint must use http or https");
        }
        if self.model_deployment_name.trim().is_empty() {
            bail!("model_deployment_name is required");
        }
        if self.auth.method == AuthMethod::Token && self.auth.token.trim().is_empty() {
            bail!("auth.token is required when auth.method = \"token\"");
        }
        if self.polling.interval_ms == 0 {
            bail!("polling.interval_ms must be greater than zero");
        }
        if !self.polling.backoff_factor.is_finite() || self.polling.backoff_factor < 1.0 {
            bail!("polling.backoff_factor must be a finite number of at least 1.0");
        }
        Ok(())
    }

    /// Copy safe to print: secrets masked
    pub fn redacted(&self) -> Self {
        let mut cfg = self.clone();
        if !cfg.auth.token.is_empty() {
            cfg.auth.token = mask_secret(&cfg.auth.token);
        }
        cfg
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &[
    "TRIAGE_API_TOKEN",
    "PROJECT_ENDPOINT",
    "AZURE_AI_PROJECT_ENDPOINT",
    "MODEL_DEPLOYMENT_NAME",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        if let Some(start) = result[pos..].find("${") {
            let abs_start = pos + start;
            if let Some(end) = result[abs_start..].find('}') {
                let var_name = result[abs_start + 2..abs_start + end].to_string();

                let value = if ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
                    std::env::var(&var_name).unwrap_or_default()
                } else {
                    warn!(
                        "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                        var_name
                    );
                    // Leave the ${VAR} unexpanded so it's obvious
                    pos = abs_start + end + 1;
                    continue;
                };

                let value_len = value.len();
                result = format!(
                    "{}{}{}",
                    &result[..abs_start],
                    value,
                    &result[abs_start + end + 1..]
                );
                pos = abs_start + value_len; // Skip past the expanded value
            } else {
                break;
            }
        } else {
            break;
        }
    }
    result
}
