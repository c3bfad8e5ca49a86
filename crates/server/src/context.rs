//! Application context - dependency injection container

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use busysync_common::SecretCipher;
use busysync_core::{
    ConnectionRegistry, FanoutSubscriber, MessageBroker, StatusBroadcaster, SyncCoordinator,
    SyncService, SyncSettings, TokenRefresher,
};
use busysync_domain::{Config, ProviderKind};
use busysync_infra::realtime::RealtimeState;
use busysync_infra::{
    connect_broker, DbManager, HttpClient, ProviderDestinationFactory, RateLimiterRegistry,
    RefreshTokenClient, SqliteDestinationRepository, SqliteEventRepository,
    SqliteSyncStatusRepository, SyncScheduler, SyncSchedulerConfig, SyncServiceRunner,
};
use tokio::task::JoinHandle;
use tracing::info;

/// Application context - holds all services and dependencies
pub struct AppContext {
    pub config: Config,
    pub registry: Arc<ConnectionRegistry>,
    pub realtime: RealtimeState,
    pub scheduler: Option<SyncScheduler>,
    fanout: JoinHandle<()>,
}

impl AppContext {
    /// Wire repositories, providers and the realtime layer from `config`.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let db = Arc::new(
            DbManager::new(&config.database.path, config.database.pool_size)
                .context("failed to open database")?,
        );
        db.run_migrations().context("failed to run migrations")?;
        info!(path = %config.database.path, "Database ready");

        let destinations = Arc::new(SqliteDestinationRepository::new(db.clone()));
        let events = Arc::new(SqliteEventRepository::new(db.clone()));
        let statuses = Arc::new(SqliteSyncStatusRepository::new(db));

        let broker = connect_broker(&config.realtime.broker)
            .await
            .context("failed to connect status broker")?;
        let registry = Arc::new(ConnectionRegistry::new());
        let subscription = broker.subscribe().await.context("failed to subscribe to broker")?;
        let fanout = FanoutSubscriber::new(registry.clone()).spawn(subscription);

        let http = HttpClient::builder()
            .max_rate_limit_retries(config.rate_limit.max_retries)
            .build()
            .context("failed to build HTTP client")?;
        let tokens = Arc::new(
            TokenRefresher::new(destinations.clone(), config.tokens.refresh_buffer_secs)
                .with_client(
                    ProviderKind::Google,
                    Arc::new(RefreshTokenClient::google(&config.oauth.google, http.clone())),
                )
                .with_client(
                    ProviderKind::Microsoft,
                    Arc::new(RefreshTokenClient::microsoft(&config.oauth.microsoft, http.clone())),
                ),
        );

        let cipher = config
            .security
            .secret_key
            .as_deref()
            .map(SecretCipher::from_base64_key)
            .transpose()
            .context("invalid security.secret_key")?
            .map(Arc::new);
        if cipher.is_none() {
            tracing::warn!("No secret key configured, CalDAV destinations cannot be synced");
        }

        let limiters = Arc::new(
            RateLimiterRegistry::new(&config.rate_limit).context("invalid rate limit config")?,
        );
        let factory = ProviderDestinationFactory::new(http, limiters, tokens, cipher)
            .with_oauth_config(&config.oauth);

        let sync_service = Arc::new(SyncService::new(
            Arc::new(SyncCoordinator::new()),
            destinations,
            Arc::new(factory),
            events,
            statuses,
            Arc::new(StatusBroadcaster::new(broker)),
            SyncSettings::from(&config.sync),
        ));

        let scheduler = config.sync.enabled.then(|| {
            SyncScheduler::new(
                SyncSchedulerConfig::from(&config.sync),
                Arc::new(SyncServiceRunner::new(sync_service.clone())),
            )
        });

        let realtime = RealtimeState::new(
            registry.clone(),
            Duration::from_secs(config.realtime.ping_interval_secs),
        );

        Ok(Self { config, registry, realtime, scheduler, fanout })
    }

    /// Start the scheduler when sync is enabled.
    pub async fn start(&mut self) -> anyhow::Result<()> {
        if let Some(scheduler) = self.scheduler.as_mut() {
            scheduler.start().await.context("failed to start sync scheduler")?;
        }
        Ok(())
    }

    /// Close live sockets, then stop the scheduler and the fan-out task.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.realtime.shutdown.cancel();
        self.registry.shutdown();

        if let Some(scheduler) = self.scheduler.as_mut() {
            if scheduler.is_running() {
                scheduler.stop().await.context("failed to stop sync scheduler")?;
            }
        }

        self.fanout.abort();
        info!("Shutdown complete");
        Ok(())
    }
}
