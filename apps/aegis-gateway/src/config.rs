//! Gateway configuration loaded from environment variables.
//!
//! Everything is read once at startup into an immutable [`GatewayConfig`]
//! that is handed to each component's constructor.

use std::collections::HashMap;
use std::env;
use std::str::FromStr;
use std::time::Duration;

use aegis_core::domain::{ModelRecord, Principal, RateLimitPolicy};
use aegis_infra::{DatabaseConfig, FailureMode, OpenAiConfig};

use crate::middleware::ClientKeySource;
use crate::router::STANDARD_ROUTE_IDS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} is required")]
    Missing { var: &'static str },

    #[error("invalid {var}={value:?}: {reason}")]
    Invalid {
        var: String,
        value: String,
        reason: String,
    },
}

impl ConfigError {
    fn invalid(var: impl Into<String>, value: &str, reason: impl ToString) -> Self {
        Self::Invalid {
            var: var.into(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Gateway configuration.
#[derive(Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// How long in-flight requests may drain after shutdown starts.
    pub shutdown_grace: Duration,
    pub rate_limit: RateLimitSettings,
    pub store: StoreSettings,
    pub database: Option<DatabaseConfig>,
    pub auth: AuthSettings,
    pub upstream: OpenAiConfig,
    pub usage: UsageSettings,
    /// Seed for the in-memory model catalog.
    pub catalog: Vec<ModelRecord>,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Applied to every route without an explicit entry. `None` means unlimited.
    pub default_policy: Option<RateLimitPolicy>,
    pub route_policies: HashMap<String, Option<RateLimitPolicy>>,
    pub failure_mode: FailureMode,
    pub key_source: ClientKeySource,
    pub key_prefix: String,
}

impl RateLimitSettings {
    pub fn policy_for(&self, route_id: &str) -> Option<RateLimitPolicy> {
        match self.route_policies.get(route_id) {
            Some(policy) => *policy,
            None => self.default_policy,
        }
    }
}

/// Shared counter store settings.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    /// Unset means the per-process in-memory store.
    pub redis_url: Option<String>,
    #[cfg_attr(not(feature = "redis"), allow(dead_code))]
    pub connect_timeout: Duration,
    pub fallback_to_memory: bool,
}

#[derive(Clone)]
pub enum AuthSettings {
    ApiKeys(Vec<(String, Principal)>),
    Jwt { secret: String, issuer: String },
}

impl AuthSettings {
    pub fn mode(&self) -> &'static str {
        match self {
            AuthSettings::ApiKeys(_) => "api_key",
            AuthSettings::Jwt { .. } => "jwt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct UsageSettings {
    pub enabled: bool,
    pub timeout: Duration,
}

impl GatewayConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`, which returns the raw value of a variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(&lookup);

        let database = vars.get("DATABASE_URL").map(|url| -> Result<_, ConfigError> {
            Ok(DatabaseConfig {
                url,
                max_connections: vars.parse_or("DB_MAX_CONNECTIONS", 20)?,
                min_connections: vars.parse_or("DB_MIN_CONNECTIONS", 2)?,
            })
        });

        let upstream_timeout: u64 = vars.parse_or("UPSTREAM_TIMEOUT_SECS", 60)?;

        Ok(Self {
            host: vars.get("HOST").unwrap_or_else(|| "127.0.0.1".to_string()),
            port: vars.parse_or("PORT", 8080)?,
            shutdown_grace: Duration::from_secs(vars.parse_or("SHUTDOWN_GRACE_SECS", 30)?),
            rate_limit: Self::rate_limit(&vars)?,
            store: StoreSettings {
                redis_url: vars.get("REDIS_URL"),
                connect_timeout: Duration::from_secs(
                    vars.parse_or("REDIS_CONNECT_TIMEOUT_SECS", 5)?,
                ),
                fallback_to_memory: vars.flag("REDIS_FALLBACK_TO_MEMORY", true)?,
            },
            database: database.transpose()?,
            auth: Self::auth(&vars)?,
            upstream: OpenAiConfig {
                base_url: vars
                    .get("OPENAI_BASE_URL")
                    .unwrap_or_else(|| "https://api.openai.com".to_string()),
                api_key: vars.get("OPENAI_API_KEY"),
                timeout: Duration::from_secs(upstream_timeout),
            },
            usage: UsageSettings {
                enabled: vars.flag("USAGE_LOGGING_ENABLED", false)?,
                timeout: Duration::from_millis(vars.parse_or("USAGE_RECORD_TIMEOUT_MS", 2000)?),
            },
            catalog: match vars.get("MODEL_CATALOG") {
                Some(raw) => parse_catalog(&raw)?,
                None => Vec::new(),
            },
        })
    }

    fn rate_limit(vars: &Vars<'_>) -> Result<RateLimitSettings, ConfigError> {
        let default_policy = match vars.get("RATE_LIMIT_DEFAULT") {
            Some(raw) => parse_policy("RATE_LIMIT_DEFAULT", &raw)?,
            None => RateLimitPolicy::new(60, Duration::from_secs(60), 1).ok(),
        };

        let mut route_policies = HashMap::new();
        for route_id in STANDARD_ROUTE_IDS {
            let var = format!("RATE_LIMIT_{}", route_id.to_ascii_uppercase());
            if let Some(raw) = vars.get(&var) {
                route_policies.insert(route_id.to_string(), parse_policy(&var, &raw)?);
            }
        }

        Ok(RateLimitSettings {
            default_policy,
            route_policies,
            failure_mode: vars.parse_or("RATE_LIMIT_FAILURE_MODE", FailureMode::Open)?,
            key_source: vars.parse_or("RATE_LIMIT_KEY", ClientKeySource::Principal)?,
            key_prefix: vars
                .get("RATE_LIMIT_KEY_PREFIX")
                .unwrap_or_else(|| "ratelimit".to_string()),
        })
    }

    fn auth(vars: &Vars<'_>) -> Result<AuthSettings, ConfigError> {
        let mode = vars.get("AUTH_MODE").unwrap_or_else(|| "api_key".to_string());

        match mode.to_ascii_lowercase().as_str() {
            "api_key" => Ok(AuthSettings::ApiKeys(match vars.get("GATEWAY_API_KEYS") {
                Some(raw) => parse_api_keys(&raw)?,
                None => Vec::new(),
            })),
            "jwt" => Ok(AuthSettings::Jwt {
                secret: vars
                    .get("JWT_SECRET")
                    .ok_or(ConfigError::Missing { var: "JWT_SECRET" })?,
                issuer: vars
                    .get("JWT_ISSUER")
                    .unwrap_or_else(|| "aegis-gateway".to_string()),
            }),
            _ => Err(ConfigError::invalid(
                "AUTH_MODE",
                &mode,
                "expected api_key or jwt",
            )),
        }
    }
}

/// Lookup wrapper; blank values count as unset.
struct Vars<'a>(&'a dyn Fn(&str) -> Option<String>);

impl Vars<'_> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: ToString,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, &raw, e)),
            None => Ok(default),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            Some(raw) => match raw.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::invalid(key, &raw, "expected true or false")),
            },
            None => Ok(default),
        }
    }
}

/// `max,window_secs,window_count` or `off`.
fn parse_policy(var: &str, raw: &str) -> Result<Option<RateLimitPolicy>, ConfigError> {
    if raw.eq_ignore_ascii_case("off") {
        return Ok(None);
    }

    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [max, window, count] = parts.as_slice() else {
        return Err(ConfigError::invalid(
            var,
            raw,
            "expected max,window_secs,window_count or off",
        ));
    };

    let number = |part: &str| -> Result<u64, ConfigError> {
        part.parse().map_err(|e| ConfigError::invalid(var, raw, e))
    };
    let max = u32::try_from(number(max)?).map_err(|e| ConfigError::invalid(var, raw, e))?;
    let count = u32::try_from(number(count)?).map_err(|e| ConfigError::invalid(var, raw, e))?;

    RateLimitPolicy::new(max, Duration::from_secs(number(window)?), count)
        .map(Some)
        .map_err(|e| ConfigError::invalid(var, raw, e))
}

/// `key=principal,key=principal`.
fn parse_api_keys(raw: &str) -> Result<Vec<(String, Principal)>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.split_once('=') {
            Some((key, principal)) if !key.trim().is_empty() && !principal.trim().is_empty() => {
                Ok((key.trim().to_string(), Principal::new(principal.trim())))
            }
            // don't echo the key back into logs
            _ => Err(ConfigError::invalid(
                "GATEWAY_API_KEYS",
                "<redacted>",
                "expected key=principal pairs",
            )),
        })
        .collect()
}

/// `name:provider,name:provider`. The provider is everything after the last colon.
fn parse_catalog(raw: &str) -> Result<Vec<ModelRecord>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| match entry.rsplit_once(':') {
            Some((name, provider)) if !name.is_empty() && !provider.is_empty() => {
                Ok(ModelRecord::new(name, provider))
            }
            _ => Err(ConfigError::invalid(
                "MODEL_CATALOG",
                entry,
                "expected name:provider",
            )),
        })
        .collect()
}
