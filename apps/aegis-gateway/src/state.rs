//! Application state - built once at startup and shared across all workers.

use std::sync::Arc;

use anyhow::Context;

use aegis_core::ports::{Authenticator, CounterStore, ModelBackend, ModelCatalog, UsageRepository};
use aegis_infra::{
    ApiKeyAuthenticator, InMemoryCounterStore, InMemoryModelCatalog, InMemoryUsageRepository,
    OpenAiBackend, WindowedRateLimiter,
};

#[cfg(feature = "jwt")]
use aegis_infra::{JwtAuthenticator, JwtConfig};
#[cfg(feature = "postgres")]
use aegis_infra::{DatabaseConnections, PostgresModelCatalog, PostgresUsageRepository};
#[cfg(feature = "redis")]
use aegis_infra::{RedisConfig, RedisCounterStore};

use crate::config::{AuthSettings, GatewayConfig, StoreSettings};
use crate::middleware::Guards;
use crate::usage::UsageRecorder;

/// State handlers read through `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn ModelBackend>,
    pub recorder: Arc<UsageRecorder>,
}

impl AppState {
    pub fn new(backend: Arc<dyn ModelBackend>, recorder: UsageRecorder) -> Self {
        Self {
            backend,
            recorder: Arc::new(recorder),
        }
    }

    /// Build the application state and route guards from configuration.
    pub async fn build(config: &GatewayConfig) -> anyhow::Result<(Self, Guards)> {
        let store = counter_store(&config.store).await?;
        let limiter = WindowedRateLimiter::new(store)
            .with_failure_mode(config.rate_limit.failure_mode)
            .with_key_prefix(config.rate_limit.key_prefix.clone());

        let guards = Guards {
            authenticator: authenticator(&config.auth)?,
            limiter: Arc::new(limiter),
            key_source: config.rate_limit.key_source,
        };

        let backend = OpenAiBackend::new(config.upstream.clone())
            .context("failed to build upstream HTTP client")?;

        let (catalog, repo) = usage_store(config).await;
        let recorder = UsageRecorder::new(config.usage.enabled, catalog, repo)
            .with_timeout(config.usage.timeout);

        tracing::info!(
            upstream = %config.upstream.base_url,
            auth_mode = config.auth.mode(),
            failure_mode = %config.rate_limit.failure_mode,
            key_source = %config.rate_limit.key_source,
            usage_logging = config.usage.enabled,
            "Application state initialized"
        );

        Ok((Self::new(Arc::new(backend), recorder), guards))
    }
}

/// One shared store client for every route's limiter.
async fn counter_store(settings: &StoreSettings) -> anyhow::Result<Arc<dyn CounterStore>> {
    let Some(url) = &settings.redis_url else {
        tracing::warn!("REDIS_URL not set. Rate limit counters are per-process (in-memory).");
        return Ok(Arc::new(InMemoryCounterStore::new()));
    };

    #[cfg(feature = "redis")]
    {
        let config = RedisConfig {
            url: url.clone(),
            connect_timeout: settings.connect_timeout,
            fallback_to_memory: settings.fallback_to_memory,
        };

        match RedisCounterStore::new(&config).await {
            Ok(store) => Ok(Arc::new(store)),
            Err(e) if config.fallback_to_memory => {
                tracing::error!(
                    "Failed to connect to Redis: {}. Using in-memory counters.",
                    e
                );
                Ok(Arc::new(InMemoryCounterStore::new()))
            }
            Err(e) => Err(e).context("failed to connect to the Redis counter store"),
        }
    }

    #[cfg(not(feature = "redis"))]
    {
        if !settings.fallback_to_memory {
            anyhow::bail!("REDIS_URL is set but the gateway was built without the redis feature");
        }
        tracing::warn!(url = %url, "Built without redis feature - using in-memory counters");
        Ok(Arc::new(InMemoryCounterStore::new()))
    }
}

fn authenticator(settings: &AuthSettings) -> anyhow::Result<Arc<dyn Authenticator>> {
    match settings {
        AuthSettings::ApiKeys(keys) => Ok(Arc::new(ApiKeyAuthenticator::new(keys.clone()))),

        #[cfg(feature = "jwt")]
        AuthSettings::Jwt { secret, issuer } => Ok(Arc::new(JwtAuthenticator::new(JwtConfig {
            secret: secret.clone(),
            issuer: issuer.clone(),
        }))),

        #[cfg(not(feature = "jwt"))]
        AuthSettings::Jwt { .. } => {
            anyhow::bail!("AUTH_MODE=jwt but the gateway was built without the jwt feature")
        }
    }
}

async fn usage_store(config: &GatewayConfig) -> (Arc<dyn ModelCatalog>, Arc<dyn UsageRepository>) {
    let in_memory = || -> (Arc<dyn ModelCatalog>, Arc<dyn UsageRepository>) {
        (
            Arc::new(InMemoryModelCatalog::new(config.catalog.clone())),
            Arc::new(InMemoryUsageRepository::new()),
        )
    };

    let Some(db_config) = &config.database else {
        if config.usage.enabled {
            tracing::warn!("DATABASE_URL not set. Only the most recent usage records are kept, in memory.");
        }
        return in_memory();
    };

    #[cfg(feature = "postgres")]
    {
        match DatabaseConnections::init(db_config).await {
            Ok(connections) => (
                Arc::new(PostgresModelCatalog::new(connections.main.clone())),
                Arc::new(PostgresUsageRepository::new(connections.main)),
            ),
            Err(e) => {
                tracing::error!(
                    "Failed to connect to database: {}. Using in-memory fallback.",
                    e
                );
                in_memory()
            }
        }
    }

    #[cfg(not(feature = "postgres"))]
    {
        let _ = db_config;
        tracing::info!("Running without postgres feature - using in-memory usage store");
        in_memory()
    }
}
