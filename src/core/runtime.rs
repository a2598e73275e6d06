//! Component wiring and lifecycle.
//!
//! The runtime builds the service graph from configuration: clock → shared
//! cache → fragment repository → fragment store → intake, reservation, and
//! telemetry services. The transport layer drives the services through the
//! handles exposed here; the runtime itself only owns startup, shutdown, and
//! the journal location.

use crate::cache::{
    ConsumptionCounter, InMemoryKeyValueStore, KeyValueStore, ReservationCache, TelemetryService,
};
use crate::core::config::Config;
use crate::core::time::{SharedClock, SystemClock};
use crate::intake::ChunkIntakeService;
use crate::reservation::{
    NoSlaves, ReservationBroadcaster, ReservationPolicy, ReservationService,
};
use crate::store::{FragmentRepository, FragmentStoreService};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// File name of the fragment journal inside the storage directory.
const FRAGMENT_JOURNAL: &str = "fragments.journal";

/// Castor runtime holding all service handles.
pub struct Runtime {
    config: Arc<Config>,
    repository: Arc<FragmentRepository>,
    fragments: Arc<FragmentStoreService>,
    intake: Arc<ChunkIntakeService>,
    reservations: Arc<ReservationService>,
    telemetry: Arc<TelemetryService>,
    running: AtomicBool,
}

impl Runtime {
    /// Build a runtime with the default collaborators: system clock, an
    /// in-process cache, no slaves, and a journal under the configured
    /// storage directory.
    pub fn new(config: Config) -> Result<Self> {
        let clock: SharedClock = Arc::new(SystemClock);
        let cache: Arc<dyn KeyValueStore> = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
        let journal_path = PathBuf::from(&config.paths.storage_dir).join(FRAGMENT_JOURNAL);
        let repository = FragmentRepository::open(&journal_path)
            .context("failed to open fragment repository")?;
        Self::assemble(config, clock, cache, Arc::new(repository), Arc::new(NoSlaves))
    }

    /// Build a runtime with explicit collaborators.
    ///
    /// This is how the transport layer injects the deployment's shared cache
    /// cluster and its inter-VCP broadcaster, and how tests inject a manual
    /// clock or an in-memory repository.
    pub fn assemble(
        config: Config,
        clock: SharedClock,
        cache: Arc<dyn KeyValueStore>,
        repository: Arc<FragmentRepository>,
        broadcaster: Arc<dyn ReservationBroadcaster>,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let fragments = Arc::new(FragmentStoreService::new(repository.clone()));
        let reservation_cache = Arc::new(ReservationCache::new(
            cache.clone(),
            &config.cache.reservation_store,
        ));
        let consumption = Arc::new(ConsumptionCounter::new(
            cache,
            &config.cache.consumption_store_prefix,
            config.telemetry.interval_ms,
            config.telemetry.ttl_ms,
        ));
        let reservations = Arc::new(ReservationService::new(
            fragments.clone(),
            reservation_cache,
            consumption.clone(),
            broadcaster,
            clock.clone(),
            ReservationPolicy::from_config(&config),
        ));
        let telemetry = Arc::new(TelemetryService::new(
            consumption,
            fragments.clone(),
            clock,
            config.telemetry.interval_ms,
        ));
        let intake = Arc::new(ChunkIntakeService::new(fragments.clone()));

        Ok(Self {
            config: Arc::new(config),
            repository,
            fragments,
            intake,
            reservations,
            telemetry,
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Arc<FragmentRepository> {
        &self.repository
    }

    pub fn fragments(&self) -> &Arc<FragmentStoreService> {
        &self.fragments
    }

    pub fn intake(&self) -> &Arc<ChunkIntakeService> {
        &self.intake
    }

    pub fn reservations(&self) -> &Arc<ReservationService> {
        &self.reservations
    }

    pub fn telemetry(&self) -> &Arc<TelemetryService> {
        &self.telemetry
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Mark the runtime started.
    pub fn start(&self) {
        self.running.store(true, Ordering::Release);
        tracing::info!(
            master = self.config.service.master,
            slaves = self.config.service.slave_uris.len(),
            storage_dir = %self.config.paths.storage_dir,
            "Castor runtime started"
        );
    }

    /// Mark the runtime stopped.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Release);
        tracing::info!("Castor runtime stopped");
    }

    /// Run until interrupted.
    pub async fn run(&self) -> Result<()> {
        self.start();
        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for shutdown signal")?;
        tracing::warn!("shutdown signal received (SIGINT)");
        self.stop();
        Ok(())
    }
}
