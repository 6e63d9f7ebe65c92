use std::path::Path;

use serde::Deserialize;

/// Environment variable holding the Task Store service credential.
pub const SERVICE_KEY_ENV: &str = "FACTORY_SERVICE_KEY";

/// Environment variable holding an agent's submission API key.
pub const AGENT_KEY_ENV: &str = "AGENT_API_KEY";

/// Environment variable overriding `store.base_url`.
pub const STORE_URL_ENV: &str = "FACTORY_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub submit: SubmitConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Base URL of the hosted Task Store (REST + RPC surface).
    #[serde(default = "default_store_url")]
    pub base_url: String,
    /// HTTP request timeout for store calls, in seconds.
    #[serde(default = "default_store_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_store_url() -> String {
    "https://rdsmdywbdiskxknluiym.supabase.co".to_string()
}

fn default_store_timeout_secs() -> u64 {
    30
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: default_store_url(),
            timeout_secs: default_store_timeout_secs(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DaemonConfig {
    /// Milliseconds between poll cycles.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    5000
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentsConfig {
    /// Directory holding one subdirectory per agent (state.json lives there).
    #[serde(default = "default_agents_dir")]
    pub dir: String,
}

fn default_agents_dir() -> String {
    "agents".to_string()
}

impl Default for AgentsConfig {
    fn default() -> Self {
        Self {
            dir: default_agents_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunnerConfig {
    /// The external CLI agent executable.
    #[serde(default = "default_runner_command")]
    pub command: String,
    /// Fixed arguments placed before the prompt.
    #[serde(default)]
    pub args: Vec<String>,
    /// Wall-clock budget for one run, in seconds. 0 waits indefinitely.
    #[serde(default)]
    pub timeout_secs: u64,
    /// Cap on captured output handed back to the caller.
    #[serde(default = "default_max_output_chars")]
    pub max_output_chars: usize,
}

fn default_runner_command() -> String {
    "claude".to_string()
}

fn default_max_output_chars() -> usize {
    100_000
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            command: default_runner_command(),
            args: Vec::new(),
            timeout_secs: 0,
            max_output_chars: default_max_output_chars(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SubmitConfig {
    /// Submission endpoint. Relative paths are resolved against
    /// `store.base_url`.
    #[serde(default = "default_submit_endpoint")]
    pub endpoint: String,
}

fn default_submit_endpoint() -> String {
    "/functions/v1/agent-submit".to_string()
}

impl Default for SubmitConfig {
    fn default() -> Self {
        Self {
            endpoint: default_submit_endpoint(),
        }
    }
}

impl AppConfig {
    /// Load config from a TOML file. A missing file yields the defaults;
    /// a present-but-invalid file is a fatal configuration error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let raw = std::fs::read_to_string(path)
                .map_err(|e| anyhow::anyhow!("Failed to read {}: {}", path.display(), e))?;
            toml::from_str(&raw)
                .map_err(|e| anyhow::anyhow!("Failed to parse {}: {}", path.display(), e))?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Environment wins over file config for the store URL so one daemon
    /// binary can be pointed at a staging store without editing files.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(STORE_URL_ENV) {
            if !url.trim().is_empty() {
                self.store.base_url = url.trim().trim_end_matches('/').to_string();
            }
        }
    }

    /// Resolve the full submission endpoint URL.
    pub fn submit_url(&self) -> String {
        if self.submit.endpoint.starts_with("http://") || self.submit.endpoint.starts_with("https://")
        {
            self.submit.endpoint.clone()
        } else {
            format!(
                "{}/{}",
                self.store.base_url.trim_end_matches('/'),
                self.submit.endpoint.trim_start_matches('/')
            )
        }
    }
}

/// Fetch the Task Store service credential from the environment.
/// Absence is fatal for the daemon: it cannot claim or complete anything
/// without it.
pub fn require_service_key() -> anyhow::Result<String> {
    match std::env::var(SERVICE_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => anyhow::bail!(
            "{} environment variable is required. Set it with: export {}=your-service-key",
            SERVICE_KEY_ENV,
            SERVICE_KEY_ENV
        ),
    }
}

/// Fetch the agent submission key from the environment.
pub fn require_agent_key() -> anyhow::Result<String> {
    match std::env::var(AGENT_KEY_ENV) {
        Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
        _ => anyhow::bail!(
            "{} environment variable is required for submissions. Set it with: export {}=your-agent-key",
            AGENT_KEY_ENV,
            AGENT_KEY_ENV
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_original_daemon() {
        let config = AppConfig::default();
        assert_eq!(config.daemon.poll_interval_ms, 5000);
        assert_eq!(config.agents.dir, "agents");
        assert_eq!(config.runner.command, "claude");
        assert_eq!(config.runner.timeout_secs, 0);
    }

    #[test]
    fn parses_partial_toml_with_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [daemon]
            poll_interval_ms = 250

            [runner]
            command = "gemini"
            args = ["-p"]
            timeout_secs = 600
            "#,
        )
        .unwrap();
        assert_eq!(config.daemon.poll_interval_ms, 250);
        assert_eq!(config.runner.command, "gemini");
        assert_eq!(config.runner.args, vec!["-p".to_string()]);
        assert_eq!(config.runner.timeout_secs, 600);
        // Untouched sections keep their defaults
        assert_eq!(config.agents.dir, "agents");
        assert_eq!(config.store.timeout_secs, 30);
    }

    #[test]
    fn submit_url_resolves_relative_endpoint() {
        let mut config = AppConfig::default();
        config.store.base_url = "https://store.example.com".into();
        config.submit.endpoint = "/functions/v1/agent-submit".into();
        assert_eq!(
            config.submit_url(),
            "https://store.example.com/functions/v1/agent-submit"
        );

        config.submit.endpoint = "https://edge.example.com/agent-submit".into();
        assert_eq!(config.submit_url(), "https://edge.example.com/agent-submit");
    }
}
