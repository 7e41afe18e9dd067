use super::manifest::ServiceManifest;
use super::{ConfigGenerator, content_digest};
use crate::config_cli::Config;
use crate::models::Watcher;

use anyhow::{Context, Result, bail};
use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::{signal, sync::Mutex, time::MissedTickBehavior};
use tracing::{error, info, warn};

type Generators = Arc<Mutex<Vec<Box<dyn ConfigGenerator>>>>;

/// Drives the generators: `update_config` when the manifest changes (and
/// every `resync_ticks` ticks), `tick` on every interval.
///
/// Generator sections are read once at startup; later manifest edits only
/// change the services.
pub struct SyncService {
    config: Config,
    generators: Generators,
    watchers: Arc<Vec<Watcher>>,
    manifest_digest: String,
    ready: Arc<AtomicBool>,
}

impl SyncService {
    pub fn new(config: Config) -> Result<Self> {
        let (manifest, manifest_digest) =
            ServiceManifest::load(&config.config).context("Failed to load service manifest")?;
        let generators = manifest
            .build_generators()
            .context("Invalid generator configuration")?;
        let watchers = manifest.watchers(&generators);

        Ok(Self {
            config,
            generators: Arc::new(Mutex::new(generators)),
            watchers: Arc::new(watchers),
            manifest_digest,
            ready: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flipped once the first reconciliation succeeded
    pub fn ready_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.ready)
    }

    /// Runs until Ctrl-C
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = signal::ctrl_c().await {
                error!("Unable to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs until `shutdown` resolves. The future is polled across cycles,
    /// so a signal that arrives mid-cycle stops the loop once it finishes.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<()> {
        tokio::pin!(shutdown);

        self.update_all().await.context("Initial sync failed")?;
        self.ready.store(true, Ordering::Relaxed);
        info!(
            "Service initialized with {} generators and {} services",
            self.generators.lock().await.len(),
            self.watchers.len()
        );

        let mut interval = tokio::time::interval(Duration::from_millis(self.config.tick_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        let mut ticks: u64 = 0;
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    ticks += 1;
                    if let Err(e) = self.cycle(ticks).await {
                        error!("Sync cycle failed: {:#}", e);
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    return Ok(());
                }
            }
        }
    }

    async fn cycle(&mut self, ticks: u64) -> Result<()> {
        self.tick_all().await?;

        let changed = match self.reload_manifest().await {
            Ok(changed) => changed,
            Err(e) => {
                warn!("Keeping previous services: {:#}", e);
                false
            }
        };
        let resync = self.config.resync_ticks > 0 && ticks % self.config.resync_ticks == 0;

        if changed || resync {
            self.update_all().await?;
        }
        Ok(())
    }

    /// Re-reads the manifest; returns whether the services changed
    async fn reload_manifest(&mut self) -> Result<bool> {
        let content = tokio::fs::read_to_string(&self.config.config)
            .await
            .with_context(|| format!("Failed to read {}", self.config.config.display()))?;
        let digest = content_digest(&content);
        if digest == self.manifest_digest {
            return Ok(false);
        }
        // A broken manifest is reported once, not on every tick
        self.manifest_digest = digest;

        let manifest = ServiceManifest::parse(&content)?;
        let watchers = {
            let generators = self.generators.lock().await;
            manifest.watchers(&generators)
        };
        info!(services = watchers.len(), "Service manifest changed");
        self.watchers = Arc::new(watchers);
        Ok(true)
    }

    async fn update_all(&self) -> Result<()> {
        let generators = Arc::clone(&self.generators);
        let watchers = Arc::clone(&self.watchers);

        tokio::task::spawn_blocking(move || {
            let mut generators = generators.blocking_lock();
            let mut failed = Vec::new();
            for generator in generators.iter_mut() {
                if let Err(e) = generator.update_config(&watchers) {
                    error!(generator = generator.name(), "Failed to update config: {}", e);
                    failed.push(generator.name());
                }
            }
            if !failed.is_empty() {
                bail!("Config update failed for {:?}", failed);
            }
            Ok(())
        })
        .await?
    }

    async fn tick_all(&self) -> Result<()> {
        let generators = Arc::clone(&self.generators);
        let watchers = Arc::clone(&self.watchers);

        tokio::task::spawn_blocking(move || {
            for generator in generators.blocking_lock().iter_mut() {
                generator.tick(&watchers);
            }
        })
        .await?;
        Ok(())
    }
}
