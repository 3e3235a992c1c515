/**
 * COLLECTORS - État possédé par cible (topologie + registre de métriques)
 *
 * RÔLE : Remplace l'état global partagé entre probes. Chaque cible nsqd a son
 * `TargetCollector`, créé au premier probe et protégé par son propre verrou.
 *
 * CONCURRENCE :
 * - la map cible -> collector est sous `parking_lot::Mutex` (sections courtes,
 *   jamais tenue pendant un await)
 * - chaque collector est sous `tokio::sync::Mutex`, tenu pendant fetch +
 *   réconciliation + encodage : deux probes d'une même cible sont sérialisés,
 *   deux cibles différentes ne partagent rien
 *
 * ÉVICTION : les cibles inactives depuis plus de `idle_ttl` sont oubliées, et au
 * delà de `max_targets` la moins récemment sondée part en premier.
 */

use crate::config::EvictionPolicy;
use crate::models::Snapshot;
use crate::reconciler::{reconcile, ReconcileReport};
use crate::registry::{MetricRegistry, RegistryError};
use crate::topology::Topology;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

pub struct TargetCollector {
    target: String,
    pub topology: Topology,
    pub metrics: MetricRegistry,
    last_probe: Option<OffsetDateTime>,
    last_success: Option<bool>,
    last_report: Option<ReconcileReport>,
}

/// Vue JSON d'un collector pour `GET /targets`
#[derive(Debug, Serialize)]
pub struct TargetView {
    pub target: String,
    pub last_probe: Option<String>,
    pub last_success: Option<bool>,
    pub topics: usize,
    pub channels: usize,
    pub series: usize,
    pub last_reset: bool,
    pub probing: bool,
}

impl TargetCollector {
    pub fn new(target: impl Into<String>) -> Result<Self, RegistryError> {
        Ok(Self {
            target: target.into(),
            topology: Topology::default(),
            metrics: MetricRegistry::new()?,
            last_probe: None,
            last_success: None,
            last_report: None,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Applique un snapshot récupéré avec succès
    pub fn apply(&mut self, snapshot: &Snapshot, policy: EvictionPolicy) -> ReconcileReport {
        let report = reconcile(snapshot, &mut self.topology, &mut self.metrics, policy);
        self.last_report = Some(report.clone());
        report
    }

    /// Horodate le probe; un échec ne touche ni la topologie ni les séries
    pub fn record_probe(&mut self, success: bool) {
        self.last_probe = Some(OffsetDateTime::now_utc());
        self.last_success = Some(success);
    }

    pub fn last_success(&self) -> Option<bool> {
        self.last_success
    }

    pub fn view(&self) -> TargetView {
        TargetView {
            target: self.target.clone(),
            last_probe: self.last_probe.and_then(|t| t.format(&Rfc3339).ok()),
            last_success: self.last_success,
            topics: self.topology.topics.len(),
            channels: self.topology.channels.len(),
            series: self.metrics.series_count(),
            last_reset: self.last_report.as_ref().map(|r| r.reset).unwrap_or(false),
            probing: false,
        }
    }
}

pub type SharedCollector = Arc<tokio::sync::Mutex<TargetCollector>>;

struct Entry {
    collector: SharedCollector,
    last_used: Instant,
}

impl Entry {
    /// Un probe détient encore le collector : l'oublier créerait un second
    /// état pour la même cible
    fn is_busy(&self) -> bool {
        Arc::strong_count(&self.collector) > 1 || self.collector.try_lock().is_err()
    }
}

#[derive(Clone)]
pub struct CollectorMap {
    entries: Arc<Mutex<HashMap<String, Entry>>>,
    idle_ttl: Duration,
    max_targets: usize,
}

impl CollectorMap {
    pub fn new(idle_ttl: Duration, max_targets: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            idle_ttl,
            max_targets: max_targets.max(1),
        }
    }

    /// Collector de la cible, créé au premier probe
    pub fn checkout(&self, target: &str) -> Result<SharedCollector, RegistryError> {
        self.checkout_at(target, Instant::now())
    }

    fn checkout_at(&self, target: &str, now: Instant) -> Result<SharedCollector, RegistryError> {
        let mut entries = self.entries.lock();
        let idle_ttl = self.idle_ttl;

        let before = entries.len();
        entries.retain(|key, entry| {
            key == target || entry.is_busy() || now.duration_since(entry.last_used) <= idle_ttl
        });
        let expired = before - entries.len();
        if expired > 0 {
            tracing::info!("[collectors] dropped {expired} idle target(s)");
        }

        let collector = match entries.get_mut(target) {
            Some(entry) => {
                entry.last_used = now;
                entry.collector.clone()
            }
            None => {
                tracing::debug!("[collectors] new target {target}");
                let collector = Arc::new(tokio::sync::Mutex::new(TargetCollector::new(target)?));
                entries.insert(
                    target.to_string(),
                    Entry {
                        collector: collector.clone(),
                        last_used: now,
                    },
                );
                collector
            }
        };

        while entries.len() > self.max_targets {
            let oldest = entries
                .iter()
                .filter(|(key, entry)| key.as_str() != target && !entry.is_busy())
                .min_by_key(|(_, entry)| entry.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    tracing::info!("[collectors] evicting least recently probed target {key}");
                    entries.remove(&key);
                }
                None => break,
            }
        }

        Ok(collector)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, target: &str) -> bool {
        self.entries.lock().contains_key(target)
    }

    /// Vues de toutes les cibles; une cible en cours de probe n'est pas attendue
    pub fn views(&self) -> Vec<TargetView> {
        let handles: Vec<(String, SharedCollector)> = self
            .entries
            .lock()
            .iter()
            .map(|(key, entry)| (key.clone(), entry.collector.clone()))
            .collect();

        let mut views: Vec<TargetView> = handles
            .into_iter()
            .map(|(key, collector)| match collector.try_lock() {
                Ok(guard) => guard.view(),
                Err(_) => TargetView {
                    target: key,
                    last_probe: None,
                    last_success: None,
                    topics: 0,
                    channels: 0,
                    series: 0,
                    last_reset: false,
                    probing: true,
                },
            })
            .collect();
        views.sort_by(|a, b| a.target.cmp(&b.target));
        views
    }
}
