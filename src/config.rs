use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::trace;

use crate::pipeline::ProbeKind;

pub const DISCORD_WEBHOOK_URL: &str = "DISCORD_WEBHOOK_URL";
pub const MANIFEST_WEBHOOK_URL: &str = "MANIFEST_WEBHOOK_URL";
pub const WEBHOOK_URL: &str = "WEBHOOK_URL";
pub const AQW_LOGIN_USER: &str = "AQW_LOGIN_USER";
pub const AQW_LOGIN_PASS: &str = "AQW_LOGIN_PASS";
pub const AQW_LOGIN_URL: &str = "AQW_LOGIN_URL";
pub const MANIFEST_URL: &str = "MANIFEST_URL";
pub const STATUS_API_URL: &str = "STATUS_API_URL";
pub const HTTP_TIMEOUT_SECS: &str = "POLLWATCH_HTTP_TIMEOUT_SECS";

const DEFAULT_LOGIN_URL: &str = "https://game.aq.com/game/api/login/now";
const DEFAULT_MANIFEST_URL: &str = "https://discord.com/api/updates/distributions/app/manifests/latest?channel=canary&platform=win&arch=x86";
const DEFAULT_STATUS_API_URL: &str = "https://discordstatus.com/api/v2";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required configuration `{0}` is not set")]
    Missing(&'static str),

    #[error("invalid value for `{var}`: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("invalid latency target file {path}: {reason}")]
    Targets { path: String, reason: String },
}

/// Static login used by the population source.
#[derive(Clone)]
pub struct Credentials {
    pub user: String,
    pub pass: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("pass", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Endpoints {
    pub login_url: String,
    pub manifest_url: String,
    pub status_api_url: String,
}

/// Process configuration, resolved once at start-up and passed to every probe.
#[derive(Clone)]
pub struct Config {
    pub webhook_url: Option<String>,
    pub manifest_webhook_url: Option<String>,
    pub endpoints: Endpoints,
    pub http_timeout: Duration,
    login_user: Option<String>,
    login_pass: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("webhook_url", &self.webhook_url.as_ref().map(|_| "<set>"))
            .field(
                "manifest_webhook_url",
                &self.manifest_webhook_url.as_ref().map(|_| "<set>"),
            )
            .field("endpoints", &self.endpoints)
            .field("http_timeout", &self.http_timeout)
            .field("login_user", &self.login_user)
            .field("login_pass", &self.login_pass.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let http_timeout = match get(HTTP_TIMEOUT_SECS) {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                    var: HTTP_TIMEOUT_SECS,
                    reason: e.to_string(),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        var: HTTP_TIMEOUT_SECS,
                        reason: "timeout must be at least one second".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        };

        let config = Config {
            webhook_url: get(DISCORD_WEBHOOK_URL),
            manifest_webhook_url: get(MANIFEST_WEBHOOK_URL).or_else(|| get(WEBHOOK_URL)),
            endpoints: Endpoints {
                login_url: get(AQW_LOGIN_URL).unwrap_or_else(|| DEFAULT_LOGIN_URL.to_string()),
                manifest_url: get(MANIFEST_URL)
                    .unwrap_or_else(|| DEFAULT_MANIFEST_URL.to_string()),
                status_api_url: get(STATUS_API_URL)
                    .unwrap_or_else(|| DEFAULT_STATUS_API_URL.to_string()),
            },
            http_timeout,
            login_user: get(AQW_LOGIN_USER),
            login_pass: get(AQW_LOGIN_PASS),
        };

        trace!("resolved config: {config:?}");
        Ok(config)
    }

    /// Credentials for the login API; required by the population probe.
    pub fn credentials(&self) -> Result<Credentials, ConfigError> {
        let user = self
            .login_user
            .clone()
            .ok_or(ConfigError::Missing(AQW_LOGIN_USER))?;
        let pass = self
            .login_pass
            .clone()
            .ok_or(ConfigError::Missing(AQW_LOGIN_PASS))?;
        Ok(Credentials { user, pass })
    }

    pub fn webhook_for(&self, probe: ProbeKind) -> Option<&str> {
        match probe {
            ProbeKind::Manifest => self
                .manifest_webhook_url
                .as_deref()
                .or(self.webhook_url.as_deref()),
            _ => self.webhook_url.as_deref(),
        }
    }

    pub fn http_client(&self) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder().timeout(self.http_timeout).build()
    }
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct LatencyTargets {
    pub targets: Vec<TargetConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct TargetConfig {
    pub name: String,
    pub address: String,
    #[serde(default = "crate::util::get_default_game_port")]
    pub port: u16,
}

impl LatencyTargets {
    fn validate(&self) -> Result<(), String> {
        if self.targets.is_empty() {
            return Err("no targets configured".to_string());
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.name.trim().is_empty() {
                return Err("target with an empty name".to_string());
            }
            if target.address.trim().is_empty() {
                return Err(format!("target `{}` has an empty address", target.name));
            }
            if !seen.insert(target.name.as_str()) {
                return Err(format!("target `{}` is listed twice", target.name));
            }
        }

        Ok(())
    }
}

pub fn read_targets_file(path: &Path) -> Result<LatencyTargets, ConfigError> {
    let to_error = |reason: String| ConfigError::Targets {
        path: path.display().to_string(),
        reason,
    };

    let file_content = std::fs::read_to_string(path).map_err(|e| to_error(e.to_string()))?;
    let targets: LatencyTargets =
        serde_json::from_str(&file_content).map_err(|e| to_error(e.to_string()))?;
    targets.validate().map_err(to_error)?;

    trace!("loaded latency targets: {targets:?}");
    Ok(targets)
}
