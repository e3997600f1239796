use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::ironic::{ApiVersion, ClientOptions, RetryPolicy};
use crate::workflow::{PowerSettings, WorkflowSettings};

const CONFIG_FILE: &str = "ironic-provision.toml";
const ENV_PREFIX: &str = "IRONIC_PROVISION";

/// Main configuration structure for ironic-provision
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProvisionConfig {
    /// Ironic endpoint and transport settings
    pub ironic: IronicConfig,
    /// Poll and retry timing for provisioning runs
    pub workflow: WorkflowConfig,
    /// Power state change budget
    pub power: PowerConfig,
    /// Logging settings
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IronicConfig {
    /// Base URL of the Ironic API, without the `/v1` suffix
    pub endpoint: String,
    /// Microversion sent with every request
    pub microversion: String,
    /// Keystone token (can be set via OS_AUTH_TOKEN)
    pub auth_token: Option<String>,
    pub request_timeout_seconds: u64,
    /// Rate limiting settings
    pub rate_limit: RateLimitConfig,
    /// Tool used to master config drive ISOs for old microversions
    pub iso_tool: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RateLimitConfig {
    pub requests_per_second: u32,
    /// Burst capacity
    pub burst_capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WorkflowConfig {
    pub poll_interval_seconds: u64,
    /// Poll interval once a deploy has been requested
    pub deploy_poll_interval_seconds: u64,
    /// Give up on a run after this long; unset means wait indefinitely
    pub deadline_seconds: Option<u64>,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Attempts per state-change request while Ironic answers 409
    pub max_attempts: u32,
    pub base_delay_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PowerConfig {
    pub timeout_seconds: u64,
    pub check_interval_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json_logs: bool,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            ironic: IronicConfig {
                endpoint: "http://localhost:6385".to_string(),
                microversion: "1.56".to_string(),
                auth_token: None, // Read from OS_AUTH_TOKEN when unset
                request_timeout_seconds: 30,
                rate_limit: RateLimitConfig {
                    requests_per_second: 10,
                    burst_capacity: 20,
                },
                iso_tool: "genisoimage".to_string(),
            },
            workflow: WorkflowConfig {
                poll_interval_seconds: 5,
                deploy_poll_interval_seconds: 30,
                deadline_seconds: None,
                retry: RetryConfig {
                    max_attempts: 5,
                    base_delay_seconds: 5,
                },
            },
            power: PowerConfig {
                timeout_seconds: 300,
                check_interval_seconds: 5,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                json_logs: false,
            },
        }
    }
}

impl ProvisionConfig {
    /// Load configuration from multiple sources with precedence:
    /// 1. Default values
    /// 2. Configuration file (ironic-provision.toml, or `path` when given)
    /// 3. Environment variables (prefixed with IRONIC_PROVISION_, `__` between sections)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).required(true));
            }
            None if Path::new(CONFIG_FILE).exists() => {
                builder = builder.add_source(File::with_name(CONFIG_FILE));
            }
            None => {}
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let mut config: ProvisionConfig = builder
            .build()
            .context("Failed to read configuration sources")?
            .try_deserialize()
            .context("Invalid configuration")?;

        if config.ironic.auth_token.is_none() {
            config.ironic.auth_token = std::env::var("OS_AUTH_TOKEN").ok();
        }

        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    /// Reject values that would make a run spin against the API.
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("workflow.poll_interval_seconds", self.workflow.poll_interval_seconds),
            (
                "workflow.deploy_poll_interval_seconds",
                self.workflow.deploy_poll_interval_seconds,
            ),
            ("power.timeout_seconds", self.power.timeout_seconds),
            ("power.check_interval_seconds", self.power.check_interval_seconds),
            ("ironic.request_timeout_seconds", self.ironic.request_timeout_seconds),
        ];
        for (key, value) in positive {
            ensure!(value > 0, "{key} must be greater than zero");
        }
        ensure!(
            self.workflow.retry.max_attempts > 0,
            "workflow.retry.max_attempts must be at least 1"
        );
        Ok(())
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_toml()?)?;
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Load .env file if it exists
    pub fn load_env_file() -> Result<()> {
        if Path::new(".env").exists() {
            dotenvy::dotenv()?;
            tracing::info!("Loaded environment variables from .env file");
        }
        Ok(())
    }

    pub fn api_version(&self) -> Result<ApiVersion> {
        self.ironic
            .microversion
            .parse()
            .with_context(|| format!("ironic.microversion = '{}'", self.ironic.microversion))
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            auth_token: self.ironic.auth_token.clone(),
            request_timeout: Duration::from_secs(self.ironic.request_timeout_seconds),
            requests_per_second: self.ironic.rate_limit.requests_per_second,
            burst_capacity: self.ironic.rate_limit.burst_capacity,
        }
    }

    pub fn workflow_settings(&self) -> WorkflowSettings {
        WorkflowSettings {
            poll_interval: Duration::from_secs(self.workflow.poll_interval_seconds),
            deploy_poll_interval: Duration::from_secs(self.workflow.deploy_poll_interval_seconds),
            retry: RetryPolicy::new(
                self.workflow.retry.max_attempts,
                Duration::from_secs(self.workflow.retry.base_delay_seconds),
            ),
            power: PowerSettings {
                timeout: Duration::from_secs(self.power.timeout_seconds),
                check_interval: Duration::from_secs(self.power.check_interval_seconds),
            },
        }
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.workflow.deadline_seconds.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_workflow_defaults() {
        let config = ProvisionConfig::default();
        assert_eq!(config.workflow_settings(), WorkflowSettings::default());
        assert_eq!(config.api_version().unwrap(), ApiVersion::new(1, 56));
        assert_eq!(config.deadline(), None);
    }

    #[test]
    fn test_file_overrides_keep_other_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[ironic]
endpoint = "https://ironic.example.com:6385"
microversion = "1.46"

[workflow]
deadline_seconds = 3600

[workflow.retry]
max_attempts = 3
"#
        )
        .unwrap();

        let config = ProvisionConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.ironic.endpoint, "https://ironic.example.com:6385");
        assert_eq!(config.api_version().unwrap(), ApiVersion::new(1, 46));
        assert_eq!(config.deadline(), Some(Duration::from_secs(3600)));
        assert_eq!(config.workflow.retry.max_attempts, 3);
        assert_eq!(config.workflow.retry.base_delay_seconds, 5);
        assert_eq!(config.power.timeout_seconds, 300);
    }

    #[test]
    fn test_zero_intervals_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[power]\ncheck_interval_seconds = 0").unwrap();

        let err = ProvisionConfig::load(Some(file.path())).unwrap_err();
        assert!(format!("{err:#}").contains("power.check_interval_seconds"), "{err:#}");

        let mut config = ProvisionConfig::default();
        config.workflow.poll_interval_seconds = 0;
        assert!(config.validate().is_err());
        config.workflow.poll_interval_seconds = 5;
        config.workflow.retry.max_attempts = 0;
        assert!(config.validate().is_err());
        assert!(ProvisionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = ProvisionConfig::default();
        let text = config.to_toml().unwrap();
        let parsed: ProvisionConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_bad_microversion_is_reported() {
        let mut config = ProvisionConfig::default();
        config.ironic.microversion = "latest".to_string();
        let err = config.api_version().unwrap_err();
        assert!(format!("{err:#}").contains("latest"));
    }
}
