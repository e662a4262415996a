//! Configuration loading for the Reelhouse client.
//!
//! Connection fields are required. The `identity`, `cache` and `policy`
//! tables are optional and fall back to the standard values.

use crate::identity::DEFAULT_SESSION_TTL;
use reelhouse_cache::gc::DEFAULT_GC_INTERVAL;
use reelhouse_cache::policy::{DEFAULT_RETENTION, DEFAULT_RETRY_DELAY};
use reelhouse_cache::{GcConfig, PolicyTable, Resource};
use reelhouse_core::{ConfigError, ReelResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the config file when `--config` is absent.
pub const CONFIG_ENV_VAR: &str = "REELHOUSE_CONFIG";

/// Upper bound for per-resource retry overrides.
const MAX_RETRY_COUNT: u32 = 10;

#[derive(Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    pub gateway_url: String,
    pub request_timeout_ms: u64,
    pub credential_path: PathBuf,
    /// Bearer token presented to the gateway, if it requires one.
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Per-resource overrides keyed by resource name, e.g. `channelVideos`.
    #[serde(default)]
    pub policy: BTreeMap<String, PolicyOverride>,
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("gateway_url", &self.gateway_url)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("credential_path", &self.credential_path)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("identity", &self.identity)
            .field("cache", &self.cache)
            .field("policy", &self.policy)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Lifetime of delegations issued at login.
    pub session_ttl_ms: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            session_ttl_ms: DEFAULT_SESSION_TTL.as_millis() as u64,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfig {
    pub gc_interval_ms: u64,
    /// How long unsubscribed entries are kept.
    pub retention_ms: u64,
    /// Fixed delay between read retries.
    pub retry_delay_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            gc_interval_ms: DEFAULT_GC_INTERVAL.as_millis() as u64,
            retention_ms: DEFAULT_RETENTION.as_millis() as u64,
            retry_delay_ms: DEFAULT_RETRY_DELAY.as_millis() as u64,
        }
    }
}

/// Partial policy for one resource; absent fields keep the standard value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverride {
    pub revalidate_on_mount: Option<bool>,
    pub retry_count: Option<u32>,
    pub stale_time_ms: Option<u64>,
}

fn invalid(field: impl Into<String>, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.into(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

impl ClientConfig {
    /// Configuration for `gateway_url` with every other field at its standard value.
    pub fn for_gateway(gateway_url: impl Into<String>) -> Self {
        Self {
            gateway_url: gateway_url.into(),
            request_timeout_ms: 30_000,
            credential_path: PathBuf::from("reelhouse/identity.json"),
            api_key: None,
            identity: IdentityConfig::default(),
            cache: CacheConfig::default(),
            policy: BTreeMap::new(),
        }
    }

    /// Load from the file named by `--config` or `REELHOUSE_CONFIG`.
    pub fn load() -> ReelResult<Self> {
        let path = config_path_from_args().or_else(config_path_from_env);
        let path = path.ok_or_else(|| ConfigError::MissingRequired {
            field: format!("config path (use --config or {CONFIG_ENV_VAR})"),
        })?;
        let config = Self::from_path(&path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> ReelResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> ReelResult<Self> {
        let config: ClientConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> ReelResult<()> {
        let url = self.gateway_url.trim();
        if url.is_empty() {
            return Err(invalid("gateway_url", url, "must not be empty").into());
        }
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(invalid("gateway_url", url, "must start with http:// or https://").into());
        }
        if self.request_timeout_ms == 0 {
            return Err(invalid("request_timeout_ms", 0, "must be > 0").into());
        }
        if self.credential_path.as_os_str().is_empty() {
            return Err(invalid("credential_path", "", "must not be empty").into());
        }
        if let Some(key) = &self.api_key {
            if key.trim().is_empty() {
                return Err(invalid("api_key", "", "must not be blank when present").into());
            }
        }
        if self.identity.session_ttl_ms == 0 {
            return Err(invalid("identity.session_ttl_ms", 0, "must be > 0").into());
        }
        if self.cache.gc_interval_ms == 0 {
            return Err(invalid("cache.gc_interval_ms", 0, "must be > 0").into());
        }
        if self.cache.retention_ms == 0 {
            return Err(invalid("cache.retention_ms", 0, "must be > 0").into());
        }
        for (name, overrides) in &self.policy {
            if Resource::from_name(name).is_none() {
                return Err(ConfigError::UnknownResource { name: name.clone() }.into());
            }
            if let Some(retries) = overrides.retry_count {
                if retries > MAX_RETRY_COUNT {
                    return Err(invalid(
                        format!("policy.{name}.retry_count"),
                        retries,
                        "must be <= 10",
                    )
                    .into());
                }
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_millis(self.identity.session_ttl_ms)
    }

    pub fn gc_config(&self) -> GcConfig {
        GcConfig::default().with_interval(Duration::from_millis(self.cache.gc_interval_ms))
    }

    /// The standard policy table with this config's cache settings and
    /// per-resource overrides applied.
    pub fn policy_table(&self) -> ReelResult<PolicyTable> {
        let mut table = PolicyTable::standard()
            .with_retry_delay(Duration::from_millis(self.cache.retry_delay_ms))
            .with_retention(Duration::from_millis(self.cache.retention_ms));

        for (name, overrides) in &self.policy {
            let resource = Resource::from_name(name)
                .ok_or_else(|| ConfigError::UnknownResource { name: name.clone() })?;
            let overrides = overrides.clone();
            table = table.update(resource, move |mut policy| {
                if let Some(revalidate) = overrides.revalidate_on_mount {
                    policy.revalidate_on_mount = revalidate;
                }
                if let Some(retries) = overrides.retry_count {
                    policy.retry_count = retries;
                }
                if let Some(stale_ms) = overrides.stale_time_ms {
                    policy.stale_time = Some(Duration::from_millis(stale_ms));
                }
                policy
            });
        }
        Ok(table)
    }
}

fn config_path_from_env() -> Option<PathBuf> {
    std::env::var(CONFIG_ENV_VAR).ok().map(PathBuf::from)
}

fn config_path_from_args() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}
