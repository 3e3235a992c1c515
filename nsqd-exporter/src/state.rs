use crate::collector::CollectorMap;
use crate::config::ExporterConfig;
use crate::fetcher::{HttpFetcher, SharedFetcher};
use crate::health::HealthTracker;
use crate::probe::{Prober, TimeoutPolicy};
use std::sync::Arc;

/// État unique partagé par les handlers Axum
#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<ExporterConfig>,
    pub prober: Prober,
    pub health: HealthTracker,
}

impl AppState {
    /// État de production : fetch HTTP réel vers les nsqd
    pub fn new(cfg: ExporterConfig) -> Result<Self, prometheus::Error> {
        let fetcher: SharedFetcher = Arc::new(HttpFetcher::new(cfg.stats_path.clone()));
        Self::with_fetcher(cfg, fetcher)
    }

    pub fn with_fetcher(cfg: ExporterConfig, fetcher: SharedFetcher) -> Result<Self, prometheus::Error> {
        let health = HealthTracker::new()?;
        let collectors = CollectorMap::new(cfg.target_idle_ttl(), cfg.max_targets);
        let prober = Prober::new(
            fetcher,
            collectors,
            health.clone(),
            cfg.eviction,
            TimeoutPolicy::from_config(&cfg),
        );
        Ok(Self {
            cfg: Arc::new(cfg),
            prober,
            health,
        })
    }
}
