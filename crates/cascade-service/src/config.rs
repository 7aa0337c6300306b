//! Service configuration: one TOML file plus environment overrides.
//!
//! ```toml
//! [provider]
//! url = "https://llm.internal/v1/route"
//!
//! [router.timeouts]
//! tier3_ms = 2500
//!
//! [notifications]
//! min_severity = "warning"
//!
//! [[tenants]]
//! tenant_id = "acme"
//! monthly_budget = "50"
//!
//! [[tenants.scenarios]]
//! id = "hold"
//! trigger_phrases = ["hold", "one moment"]
//! quick_reply = "Take your time."
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use cascade::config::TenantsFile;
use cascade::escalation::HttpProviderConfig;
use cascade::events::Severity;

pub const ENV_PROVIDER_URL: &str = "CASCADE_PROVIDER_URL";
pub const ENV_PROVIDER_API_KEY: &str = "CASCADE_PROVIDER_API_KEY";
pub const ENV_PROVIDER_MODEL: &str = "CASCADE_PROVIDER_MODEL";
pub const ENV_TIER3_TIMEOUT_MS: &str = "CASCADE_TIER3_TIMEOUT_MS";

#[derive(Debug, thiserror::Error)]
pub enum ServiceConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("invalid value for {var}: {value}")]
    BadEnv { var: &'static str, value: String },
}

pub type ServiceConfigResult<T> = Result<T, ServiceConfigError>;

/// Which router notifications reach the log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub min_severity: Severity,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            min_severity: Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub provider: HttpProviderConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(flatten)]
    pub routing: TenantsFile,
}

impl ServiceConfig {
    /// Read, apply process environment overrides, validate.
    pub fn load(path: &Path) -> ServiceConfigResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ServiceConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::from_toml(&text)?;
        config.apply_overrides(|var| std::env::var(var).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> ServiceConfigResult<Self> {
        toml::from_str(text).map_err(|e| ServiceConfigError::Invalid(e.to_string()))
    }

    /// Apply `CASCADE_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> ServiceConfigResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_PROVIDER_URL) {
            self.provider.url = url;
        }
        if let Some(key) = lookup(ENV_PROVIDER_API_KEY) {
            self.provider.api_key = Some(key);
        }
        if let Some(model) = lookup(ENV_PROVIDER_MODEL) {
            self.provider.model = Some(model);
        }
        if let Some(raw) = lookup(ENV_TIER3_TIMEOUT_MS) {
            let ms = raw.trim().parse::<u64>().map_err(|_| ServiceConfigError::BadEnv {
                var: ENV_TIER3_TIMEOUT_MS,
                value: raw.clone(),
            })?;
            self.routing.router.timeouts.tier3_ms = ms;
        }
        Ok(())
    }

    pub fn validate(&self) -> ServiceConfigResult<()> {
        if self.provider.url.trim().is_empty() {
            return Err(ServiceConfigError::Invalid("provider.url must not be empty".into()));
        }
        self.routing
            .validate()
            .map_err(|e| ServiceConfigError::Invalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[provider]
url = "http://llm:9000/route"
model = "small"

[router.timeouts]
tier3_ms = 2500

[[tenants]]
tenant_id = "acme"
tier1_threshold = 0.85

[[tenants.scenarios]]
id = "hold"
trigger_phrases = ["hold"]
quick_reply = "Take your time."
"#;

    #[test]
    fn test_parses_provider_router_and_tenants() {
        let config = ServiceConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.provider.url, "http://llm:9000/route");
        assert_eq!(config.routing.router.timeouts.tier3_ms, 2500);
        assert_eq!(config.routing.tenants.len(), 1);
        assert_eq!(config.routing.tenants[0].config.tier1_threshold, 0.85);
        assert_eq!(config.routing.tenants[0].scenarios.len(), 1);
        assert_eq!(config.notifications.min_severity, Severity::Warning);
        config.validate().unwrap();
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = ServiceConfig::from_toml(SAMPLE).unwrap();
        let env: HashMap<&str, &str> = [
            (ENV_PROVIDER_URL, "http://other/route"),
            (ENV_PROVIDER_API_KEY, "secret"),
            (ENV_TIER3_TIMEOUT_MS, "900"),
        ]
        .into_iter()
        .collect();
        config
            .apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.provider.url, "http://other/route");
        assert_eq!(config.provider.api_key.as_deref(), Some("secret"));
        assert_eq!(config.provider.model.as_deref(), Some("small"));
        assert_eq!(config.routing.router.timeouts.tier3_ms, 900);
    }

    #[test]
    fn test_bad_timeout_override_is_rejected() {
        let mut config = ServiceConfig::default();
        let err = config
            .apply_overrides(|k| (k == ENV_TIER3_TIMEOUT_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ServiceConfigError::BadEnv { .. }));
    }
}
