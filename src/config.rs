//! Configuration management for Ratekeeper.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{RatekeeperError, Result};
use crate::ratelimit::{
    FixedWindowSettings, LeakyBucketSettings, LimiterSettings, LimiterSpec,
    SlidingWindowSettings, TokenBucketSettings,
};

/// Prefix for environment overrides, e.g. `RATEKEEPER__SERVER__BIND_ADDR`.
const ENV_PREFIX: &str = "RATEKEEPER";

/// Main configuration for the Ratekeeper service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Limiters exposed by the dispatcher
    #[serde(default = "default_limiters")]
    pub limiters: Vec<LimiterSpec>,
}

impl Default for RatekeeperConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            limiters: default_limiters(),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

/// One limiter of each kind, as served by the demo front end.
fn default_limiters() -> Vec<LimiterSpec> {
    vec![
        LimiterSpec::new(
            "token_bucket",
            LimiterSettings::TokenBucket(
                TokenBucketSettings::default().with_burst(5).with_rate(5.0),
            ),
        ),
        LimiterSpec::new(
            "leaky_bucket",
            LimiterSettings::LeakyBucket(
                LeakyBucketSettings::default().with_capacity(10).with_rate(2.0),
            ),
        ),
        LimiterSpec::new(
            "fixed_window",
            LimiterSettings::FixedWindow(
                FixedWindowSettings::default()
                    .with_capacity(10)
                    .with_window(Duration::from_secs(5)),
            ),
        ),
        LimiterSpec::new(
            "sliding_window",
            LimiterSettings::SlidingWindow(
                SlidingWindowSettings::default()
                    .with_window(Duration::from_secs(5))
                    .with_rate(2.0),
            ),
        ),
    ]
}

impl RatekeeperConfig {
    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: RatekeeperConfig = serde_yaml::from_str(yaml)
            .map_err(|e| RatekeeperError::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file layered under
    /// `RATEKEEPER__*` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder
                .add_source(::config::File::from(path).format(::config::FileFormat::Yaml));
        }

        let config: RatekeeperConfig = builder
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check limiter names and settings without building anything.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for spec in &self.limiters {
            if spec.name.is_empty() || spec.name.contains('/') {
                return Err(RatekeeperError::Config(format!(
                    "Invalid limiter name {:?}",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(RatekeeperError::DuplicateLimiter(spec.name.clone()));
            }
            spec.settings.validate()?;
        }
        Ok(())
    }
}
