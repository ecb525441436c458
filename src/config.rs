use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level relay configuration, loaded from `config.yaml`.
///
/// Every section is optional; a missing file yields `RelayConfig::default()`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub login: LoginConfig,
}

/// Settings for the remote chat endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub default_model: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound for a single HTTP exchange, including a full streamed reply.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_model: default_model(),
            user_agent: default_user_agent(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Settings for the interactive login helper process.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoginConfig {
    #[serde(default = "default_login_command")]
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_login_timeout_secs")]
    pub timeout_secs: u64,
    /// Appends `--no-sandbox --disable-gpu` to the helper invocation.
    #[serde(default = "default_disable_sandbox")]
    pub disable_sandbox: bool,
}

impl Default for LoginConfig {
    fn default() -> Self {
        Self {
            command: default_login_command(),
            args: Vec::new(),
            login_url: default_login_url(),
            timeout_secs: default_login_timeout_secs(),
            disable_sandbox: default_disable_sandbox(),
        }
    }
}

impl LoginConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_base_url() -> String {
    "https://claude.ai".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36".to_string()
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_login_command() -> String {
    "chat-relay-login".to_string()
}

fn default_login_url() -> String {
    "https://claude.ai/login".to_string()
}

fn default_login_timeout_secs() -> u64 {
    300
}

fn default_disable_sandbox() -> bool {
    true
}

impl RelayConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config at `path`, falling back to defaults when the file is absent.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    fn validate(&self) -> Result<()> {
        if self.api.base_url.trim().is_empty() {
            anyhow::bail!("api.base_url must not be empty");
        }
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            anyhow::bail!(
                "api.base_url must be an http(s) URL, got '{}'",
                self.api.base_url
            );
        }
        if self.login.command.trim().is_empty() {
            anyhow::bail!("login.command must not be empty");
        }
        if self.login.timeout_secs == 0 {
            anyhow::bail!("login.timeout_secs must be greater than zero");
        }
        if self.api.request_timeout_secs == 0 {
            anyhow::bail!("api.request_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = RelayConfig::default();
        assert_eq!(config.api.base_url, "https://claude.ai");
        assert_eq!(config.login.timeout(), Duration::from_secs(300));
        assert!(config.login.disable_sandbox);
        assert!(config.login.args.is_empty());
    }

    #[test]
    fn test_default_config_validates() {
        assert!(RelayConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
login:
  command: "node"
  args: ["login.js"]
  timeout_secs: 60
"#;
        let config: RelayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.login.command, "node");
        assert_eq!(config.login.args, vec!["login.js".to_string()]);
        assert_eq!(config.login.timeout(), Duration::from_secs(60));
        assert_eq!(config.login.login_url, "https://claude.ai/login");
        assert_eq!(config.api.default_model, default_model());
    }

    #[test]
    fn test_validation_rejects_bad_base_url() {
        let yaml = r#"
api:
  base_url: "claude.ai"
"#;
        let config: RelayConfig = serde_yaml::from_str(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("http(s) URL"));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let mut config = RelayConfig::default();
        config.login.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let config = RelayConfig::load_or_default(&temp_dir.path().join("config.yaml")).unwrap();
        assert_eq!(config.login.command, default_login_command());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "api:\n  base_url: \"http://127.0.0.1:8080\"\n").unwrap();

        let config = RelayConfig::load(&path).unwrap();
        assert_eq!(config.api.base_url, "http://127.0.0.1:8080");
    }

    #[test]
    fn test_load_reports_parse_errors_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        std::fs::write(&path, "api: [not, a, map").unwrap();

        let err = RelayConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.yaml"));
    }
}
