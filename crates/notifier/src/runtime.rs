//! Composition root: builds a ready-to-use dispatcher from configuration.
//!
//! Opens the delivery-ledger database, runs migrations, and registers a
//! transport for every channel with an endpoint configured in the
//! environment. Permission and preference lookups stay injected — they
//! belong to the surrounding platform, not to this crate.

use std::sync::Arc;

use herald_common::config::AppConfig;
use herald_common::db::create_pool;
use herald_engine::dispatcher::{ChannelDispatcher, DispatchPolicy};
use herald_engine::postgres::PgLedger;
use herald_engine::traits::{ChannelTransport, PermissionOracle, PreferenceStore};

use crate::{EmailTransport, InAppTransport, PushTransport};

/// Instantiate a transport for each channel whose endpoint is configured.
///
/// Channels without an endpoint are simply not registered; the dispatcher
/// reports their triples as terminal failures until one is added.
pub fn transports_from_config(config: &AppConfig) -> Vec<Arc<dyn ChannelTransport>> {
    let mut transports: Vec<Arc<dyn ChannelTransport>> = Vec::new();

    if let (Some(api_url), Some(api_key), Some(from)) = (
        &config.email_api_url,
        &config.email_api_key,
        &config.email_from,
    ) {
        transports.push(Arc::new(EmailTransport::new(
            api_url.clone(),
            api_key.clone(),
            from.clone(),
        )));
    }
    if let Some(gateway_url) = &config.push_gateway_url {
        transports.push(Arc::new(PushTransport::new(gateway_url.clone())));
    }
    if let Some(feed_url) = &config.in_app_feed_url {
        transports.push(Arc::new(InAppTransport::new(feed_url.clone())));
    }

    tracing::info!(transports = transports.len(), "Channel transports configured");
    transports
}

/// Build a dispatcher backed by the PostgreSQL ledger and the configured
/// transports. Runs pending migrations on the way up.
pub async fn build_dispatcher(
    config: &AppConfig,
    permissions: Arc<dyn PermissionOracle>,
    preferences: Arc<dyn PreferenceStore>,
) -> anyhow::Result<ChannelDispatcher> {
    let pool = create_pool(&config.database_url, config.db_max_connections).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    let ledger = Arc::new(PgLedger::new(pool));
    Ok(ChannelDispatcher::new(
        ledger,
        permissions,
        preferences,
        transports_from_config(config),
        DispatchPolicy::from_config(config),
    ))
}
