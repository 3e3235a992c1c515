/**
 * PROBE ORCHESTRATOR - Un cycle fetch + réconciliation par requête `/stats`
 *
 * RÔLE : Point d'entrée métier d'un probe. Calcule le budget de temps,
 * récupère le collector de la cible, lance le fetch sous deadline, réconcilie
 * si le fetch a réussi, puis encode méta-séries + séries de la cible.
 *
 * FONCTIONNEMENT :
 * - deadline = (hint du header ou défaut 120s) - offset 0.5s, plancher configurable
 * - registre de requête : `scrape_success` (0/1) et `scrape_duration_seconds`
 * - échec de fetch ou deadline dépassée => `scrape_success 0`, séries de la
 *   cible laissées intactes (périmées mais pas fausses)
 * - la réponse est toujours une exposition valide, succès ou non
 */

use crate::collector::{CollectorMap, TargetCollector};
use crate::config::{EvictionPolicy, ExporterConfig};
use crate::error::ProbeError;
use crate::fetcher::{normalize_target, FetchError, SharedFetcher};
use crate::health::HealthTracker;
use crate::reconciler::ReconcileReport;
use crate::registry::encode_families;
use prometheus::{Gauge, Opts, Registry};
use std::time::{Duration, Instant};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, error, info_span, Instrument};
use uuid::Uuid;

/// Header de budget de temps envoyé par l'appelant
pub const TIMEOUT_HEADER: &str = "X-Probe-Timeout-Seconds";
/// Header standard de Prometheus, accepté en repli
pub const PROMETHEUS_TIMEOUT_HEADER: &str = "X-Prometheus-Scrape-Timeout-Seconds";
/// Plafond du budget d'un probe (24h); un hint au-delà est ramené ici
pub const MAX_DEADLINE_SECS: f64 = 86_400.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    pub default_secs: f64,
    pub offset_secs: f64,
    pub min_secs: f64,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_config(&ExporterConfig::default())
    }
}

impl TimeoutPolicy {
    pub fn from_config(cfg: &ExporterConfig) -> Self {
        Self {
            default_secs: cfg.default_timeout_secs,
            offset_secs: cfg.timeout_offset_secs,
            min_secs: cfg.min_timeout_secs,
        }
    }

    /// Budget du probe à partir du hint brut (valeur du header)
    pub fn deadline(&self, hint: Option<&str>) -> Result<Duration, ProbeError> {
        let mut seconds = match hint.map(str::trim).filter(|h| !h.is_empty()) {
            Some(raw) => {
                let parsed: f64 = raw
                    .parse()
                    .map_err(|e| ProbeError::InvalidTimeout(format!("{raw:?}: {e}")))?;
                if !parsed.is_finite() {
                    return Err(ProbeError::InvalidTimeout(format!("{raw:?} is not finite")));
                }
                parsed
            }
            None => 0.0,
        };
        if seconds <= 0.0 {
            seconds = self.default_secs;
        }

        let budget = (seconds - self.offset_secs)
            .max(self.min_secs)
            .clamp(0.0, MAX_DEADLINE_SECS);
        Duration::try_from_secs_f64(budget)
            .map_err(|e| ProbeError::InvalidTimeout(format!("{budget}s: {e}")))
    }
}

/// Pourquoi un probe a échoué côté cible
#[derive(Debug, thiserror::Error)]
pub enum ProbeFailure {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),
}

#[derive(Debug)]
pub struct ProbeOutcome {
    pub target: String,
    pub success: bool,
    pub duration: Duration,
    pub report: Option<ReconcileReport>,
    pub failure: Option<String>,
    /// Exposition texte : méta-séries + séries de la cible
    pub body: String,
}

#[derive(Clone)]
pub struct Prober {
    fetcher: SharedFetcher,
    collectors: CollectorMap,
    health: HealthTracker,
    policy: EvictionPolicy,
    timeouts: TimeoutPolicy,
}

impl Prober {
    pub fn new(
        fetcher: SharedFetcher,
        collectors: CollectorMap,
        health: HealthTracker,
        policy: EvictionPolicy,
        timeouts: TimeoutPolicy,
    ) -> Self {
        Self {
            fetcher,
            collectors,
            health,
            policy,
            timeouts,
        }
    }

    pub fn timeouts(&self) -> &TimeoutPolicy {
        &self.timeouts
    }

    pub fn collectors(&self) -> &CollectorMap {
        &self.collectors
    }

    /// Exécute un probe complet contre `raw_target`
    pub async fn probe(&self, raw_target: &str, deadline: Duration) -> Result<ProbeOutcome, ProbeError> {
        let target = normalize_target(raw_target);
        let span = info_span!("probe", target = %target, probe_id = %Uuid::new_v4());
        self.run(target, deadline).instrument(span).await
    }

    async fn run(&self, target: String, deadline: Duration) -> Result<ProbeOutcome, ProbeError> {
        let registry = Registry::new();
        let success_gauge = Gauge::with_opts(Opts::new(
            "scrape_success",
            "Displays whether or not the scrape to nsqd-stats was a success",
        ))?;
        let duration_gauge = Gauge::with_opts(Opts::new(
            "scrape_duration_seconds",
            "Returns how long the scrape to nsqd-stats took to complete in seconds",
        ))?;
        registry.register(Box::new(success_gauge.clone()))?;
        registry.register(Box::new(duration_gauge.clone()))?;

        let collector = self.collectors.checkout(&target)?;
        self.health.set_tracked_targets(self.collectors.len());

        debug!("Getting nsqd stats (deadline {deadline:?})");
        let start = Instant::now();
        let attempt = tokio::time::timeout(deadline, async {
            let guard = collector.clone().lock_owned().await;
            let fetched = self.fetcher.fetch(&target).await;
            (guard, fetched)
        })
        .await;

        let (guard, result): (Option<OwnedMutexGuard<TargetCollector>>, Result<ReconcileReport, ProbeFailure>) =
            match attempt {
                Ok((mut guard, Ok(snapshot))) => {
                    let report = guard.apply(&snapshot, self.policy);
                    (Some(guard), Ok(report))
                }
                Ok((guard, Err(e))) => (Some(guard), Err(e.into())),
                // le fetch en vol est annulé par le drop; un probe concurrent peut encore tenir le verrou
                Err(_) => (
                    collector.clone().try_lock_owned().ok(),
                    Err(ProbeFailure::DeadlineExceeded(deadline)),
                ),
            };
        let duration = start.elapsed();
        let success = result.is_ok();

        duration_gauge.set(duration.as_secs_f64());
        success_gauge.set(if success { 1.0 } else { 0.0 });
        self.health.record_probe(success);

        let mut families = registry.gather();
        let mut guard = guard;
        if let Some(collector) = guard.as_mut() {
            collector.record_probe(success);
            families.extend(collector.metrics.gather());
        }
        drop(guard);
        let body = encode_families(&families)?;

        let (report, failure) = match result {
            Ok(report) => {
                debug!("Stats collected: {} series written", report.written);
                (Some(report), None)
            }
            Err(e) => {
                error!("Failed to get stats from {target}: {e}");
                (None, Some(e.to_string()))
            }
        };

        Ok(ProbeOutcome {
            target,
            success,
            duration,
            report,
            failure,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::SnapshotFetcher;
    use crate::models::{ChannelSnapshot, ClientSnapshot, Snapshot, TopicSnapshot};
    use futures::future::BoxFuture;
    use futures::FutureExt;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Réponses scriptées par cible; une cible absente ne répond jamais
    #[derive(Default)]
    struct ScriptedFetcher {
        answers: Mutex<HashMap<String, Result<Snapshot, String>>>,
    }

    impl ScriptedFetcher {
        fn answer(&self, target: &str, answer: Result<Snapshot, String>) {
            self.answers
                .lock()
                .insert(normalize_target(target), answer);
        }

        /// La cible ne répond plus
        fn silence(&self, target: &str) {
            self.answers.lock().remove(&normalize_target(target));
        }
    }

    impl SnapshotFetcher for ScriptedFetcher {
        fn fetch<'a>(&'a self, target: &'a str) -> BoxFuture<'a, Result<Snapshot, FetchError>> {
            let answer = self.answers.lock().get(target).cloned();
            async move {
                match answer {
                    Some(Ok(snapshot)) => Ok(snapshot),
                    Some(Err(msg)) => Err(FetchError::Other(msg)),
                    None => std::future::pending().await,
                }
            }
            .boxed()
        }
    }

    /// Chaque fetch attend un permis; compte les fetchs simultanés
    struct GatedFetcher {
        gate: tokio::sync::Semaphore,
        calls: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl GatedFetcher {
        fn closed() -> Self {
            Self {
                gate: tokio::sync::Semaphore::new(0),
                calls: AtomicUsize::new(0),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    impl SnapshotFetcher for GatedFetcher {
        fn fetch<'a>(&'a self, _target: &'a str) -> BoxFuture<'a, Result<Snapshot, FetchError>> {
            async move {
                let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                self.max_in_flight.fetch_max(now, Ordering::SeqCst);
                let permit = self.gate.acquire().await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
                Ok(orders(call as u64))
            }
            .boxed()
        }
    }

    fn orders(depth: u64) -> Snapshot {
        Snapshot {
            health: "OK".into(),
            start_time: 1_700_000_000,
            version: "1.2.3".into(),
            topics: vec![TopicSnapshot {
                name: "orders".into(),
                depth,
                channels: vec![ChannelSnapshot {
                    name: "ship".into(),
                    depth,
                    in_flight_count: 1,
                    message_count: 100,
                    clients: vec![ClientSnapshot::default(); 2],
                    ..Default::default()
                }],
                ..Default::default()
            }],
        }
    }

    fn prober(fetcher: SharedFetcher) -> Prober {
        Prober::new(
            fetcher,
            CollectorMap::new(Duration::from_secs(60), 16),
            HealthTracker::new().unwrap(),
            EvictionPolicy::Reset,
            TimeoutPolicy::default(),
        )
    }

    #[test]
    fn test_deadline_from_hint() {
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.deadline(None).unwrap(), Duration::from_secs_f64(119.5));
        assert_eq!(policy.deadline(Some("10")).unwrap(), Duration::from_secs_f64(9.5));
        assert_eq!(policy.deadline(Some("0")).unwrap(), Duration::from_secs_f64(119.5));
        assert_eq!(policy.deadline(Some("")).unwrap(), Duration::from_secs_f64(119.5));
        // plancher
        assert_eq!(policy.deadline(Some("0.2")).unwrap(), Duration::from_secs_f64(0.1));
    }

    #[test]
    fn test_deadline_rejects_garbage() {
        let policy = TimeoutPolicy::default();
        assert!(matches!(policy.deadline(Some("ten")), Err(ProbeError::InvalidTimeout(_))));
        assert!(matches!(policy.deadline(Some("inf")), Err(ProbeError::InvalidTimeout(_))));
    }

    #[test]
    fn test_huge_deadline_is_capped() {
        let cap = Duration::from_secs_f64(MAX_DEADLINE_SECS);
        let policy = TimeoutPolicy::default();
        assert_eq!(policy.deadline(Some("1e20")).unwrap(), cap);
        assert_eq!(policy.deadline(Some("1.7e308")).unwrap(), cap);

        let from_config = TimeoutPolicy {
            default_secs: 1e300,
            ..TimeoutPolicy::default()
        };
        assert_eq!(from_config.deadline(None).unwrap(), cap);
    }

    #[tokio::test]
    async fn test_successful_probe_exposes_target_series() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.answer("nsqd:4151", Ok(orders(5)));
        let prober = prober(fetcher);

        let outcome = prober.probe("nsqd:4151", Duration::from_secs(5)).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.body.contains("scrape_success 1"));
        assert!(outcome.body.contains("scrape_duration_seconds"));
        assert!(outcome
            .body
            .contains(r#"nsqd_info{health="OK",start_time="1700000000",version="1.2.3"} 1"#));
        assert!(outcome
            .body
            .contains(r#"nsqd_depth{channel="ship",paused="false",topic="orders",type="channel"} 5"#));
        assert!(outcome
            .body
            .contains(r#"nsqd_channel_count{paused="false",topic="orders",type="topic"} 1"#));
        assert_eq!(outcome.report.unwrap().written, 12);
    }

    #[tokio::test]
    async fn test_fetch_failure_keeps_previous_series() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.answer("nsqd:4151", Ok(orders(5)));
        let prober = prober(fetcher.clone());
        prober.probe("nsqd:4151", Duration::from_secs(5)).await.unwrap();

        fetcher.answer("nsqd:4151", Err("connection refused".into()));
        let outcome = prober.probe("nsqd:4151", Duration::from_secs(5)).await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.failure.unwrap().contains("connection refused"));
        assert!(outcome.body.contains("scrape_success 0"));
        assert!(outcome
            .body
            .contains(r#"nsqd_depth{channel="",paused="false",topic="orders",type="topic"} 5"#));
    }

    #[tokio::test]
    async fn test_deadline_exceeded_is_a_failed_probe() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let prober = prober(fetcher);

        let outcome = prober
            .probe("silent:4151", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.failure.unwrap().contains("deadline"));
        assert!(outcome.body.contains("scrape_success 0"));
        assert!(!outcome.body.contains("nsqd_depth"));
    }

    #[tokio::test]
    async fn test_deadline_exceeded_keeps_previous_series() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.answer("nsqd:4151", Ok(orders(5)));
        let prober = prober(fetcher.clone());
        assert!(prober.probe("nsqd:4151", Duration::from_secs(5)).await.unwrap().success);

        fetcher.silence("nsqd:4151");
        let outcome = prober
            .probe("nsqd:4151", Duration::from_millis(50))
            .await
            .unwrap();

        assert!(!outcome.success);
        assert!(outcome.failure.unwrap().contains("deadline"));
        assert!(outcome.body.contains("scrape_success 0"));
        assert!(outcome
            .body
            .contains(r#"nsqd_depth{channel="ship",paused="false",topic="orders",type="channel"} 5"#));
    }

    #[tokio::test]
    async fn test_same_target_probes_are_serialized() {
        let fetcher = Arc::new(GatedFetcher::closed());
        let prober = prober(fetcher.clone());

        let first = {
            let prober = prober.clone();
            tokio::spawn(async move { prober.probe("same:4151", Duration::from_secs(5)).await })
        };
        while fetcher.calls.load(Ordering::SeqCst) < 1 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let second = {
            let prober = prober.clone();
            tokio::spawn(async move { prober.probe("same:4151", Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        // le second probe attend le verrou de la cible, pas le fetch
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);

        fetcher.gate.add_permits(1);
        let first = first.await.unwrap().unwrap();
        let second = second.await.unwrap().unwrap();

        assert!(first.success && second.success);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert_eq!(fetcher.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(prober.collectors().len(), 1);
        assert!(second
            .body
            .contains(r#"nsqd_depth{channel="ship",paused="false",topic="orders",type="channel"} 2"#));
    }

    #[tokio::test]
    async fn test_concurrent_targets_do_not_mix() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        let mut x = orders(1);
        x.topics[0].name = "x-topic".into();
        let mut y = orders(2);
        y.topics[0].name = "y-topic".into();
        fetcher.answer("x:4151", Ok(x));
        fetcher.answer("y:4151", Ok(y));
        let prober = prober(fetcher);

        let (px, py) = tokio::join!(
            prober.probe("x:4151", Duration::from_secs(5)),
            prober.probe("y:4151", Duration::from_secs(5)),
        );
        let (px, py) = (px.unwrap(), py.unwrap());

        assert!(px.body.contains("x-topic") && !px.body.contains("y-topic"));
        assert!(py.body.contains("y-topic") && !py.body.contains("x-topic"));
        assert_eq!(prober.collectors().len(), 2);
    }

    #[tokio::test]
    async fn test_probe_counts_in_health() {
        let fetcher = Arc::new(ScriptedFetcher::default());
        fetcher.answer("ok:1", Ok(orders(1)));
        fetcher.answer("ko:1", Err("boom".into()));
        let prober = prober(fetcher);

        prober.probe("ok:1", Duration::from_secs(5)).await.unwrap();
        prober.probe("ko:1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(prober.health.probes(crate::health::OUTCOME_SUCCESS), 1);
        assert_eq!(prober.health.probes(crate::health::OUTCOME_FAILURE), 1);
    }
}
