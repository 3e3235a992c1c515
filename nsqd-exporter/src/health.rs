use crate::registry::{encode_families, RegistryError};
use prometheus::{Gauge, GaugeVec, IntCounterVec, IntGauge, Opts, Registry};
use serde::Serialize;
use std::time::Instant;
use sysinfo::System;

/// Namespace des métriques propres au process (servies sur `/metrics`)
pub const SELF_NAMESPACE: &str = "nsqd_exporter";

pub const OUTCOME_SUCCESS: &str = "success";
pub const OUTCOME_FAILURE: &str = "failure";

#[derive(Debug, Serialize)]
pub struct ExporterHealth {
    pub uptime_seconds: u64,
    pub targets_tracked: u64,
    pub probes_success: u64,
    pub probes_failure: u64,
    pub memory_usage_mb: Option<f64>,
}

/// Registre des méta-métriques du process, indépendant de toute cible
#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    registry: Registry,
    probes: IntCounterVec,
    tracked_targets: IntGauge,
    uptime: Gauge,
    resident_memory: Gauge,
}

impl HealthTracker {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let build_info = GaugeVec::new(
            Opts::new("build_info", "nsqd-exporter build info").namespace(SELF_NAMESPACE),
            &["version"],
        )?;
        let probes = IntCounterVec::new(
            Opts::new("probes_total", "Probes handled on /stats, by outcome").namespace(SELF_NAMESPACE),
            &["outcome"],
        )?;
        let tracked_targets = IntGauge::with_opts(
            Opts::new("tracked_targets", "Targets with a live collector").namespace(SELF_NAMESPACE),
        )?;
        let uptime = Gauge::with_opts(
            Opts::new("uptime_seconds", "Exporter uptime in seconds").namespace(SELF_NAMESPACE),
        )?;
        let resident_memory = Gauge::with_opts(
            Opts::new("resident_memory_mb", "Resident memory of the exporter in MB")
                .namespace(SELF_NAMESPACE),
        )?;

        registry.register(Box::new(build_info.clone()))?;
        registry.register(Box::new(probes.clone()))?;
        registry.register(Box::new(tracked_targets.clone()))?;
        registry.register(Box::new(uptime.clone()))?;
        registry.register(Box::new(resident_memory.clone()))?;

        build_info
            .with_label_values(&[env!("CARGO_PKG_VERSION")])
            .set(1.0);
        // les deux séries existent dès le démarrage, même à zéro
        probes.with_label_values(&[OUTCOME_SUCCESS]);
        probes.with_label_values(&[OUTCOME_FAILURE]);

        Ok(Self {
            start_time: Instant::now(),
            registry,
            probes,
            tracked_targets,
            uptime,
            resident_memory,
        })
    }

    pub fn record_probe(&self, success: bool) {
        let outcome = if success { OUTCOME_SUCCESS } else { OUTCOME_FAILURE };
        self.probes.with_label_values(&[outcome]).inc();
    }

    pub fn set_tracked_targets(&self, count: usize) {
        self.tracked_targets.set(count as i64);
    }

    pub fn probes(&self, outcome: &str) -> u64 {
        self.probes.with_label_values(&[outcome]).get()
    }

    pub fn get_health(&self) -> ExporterHealth {
        ExporterHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            targets_tracked: self.tracked_targets.get().max(0) as u64,
            probes_success: self.probes(OUTCOME_SUCCESS),
            probes_failure: self.probes(OUTCOME_FAILURE),
            memory_usage_mb: get_memory_usage_mb(),
        }
    }

    /// Exposition texte pour `GET /metrics`
    pub fn encode(&self) -> Result<String, RegistryError> {
        self.uptime.set(self.start_time.elapsed().as_secs_f64());
        if let Some(mb) = get_memory_usage_mb() {
            self.resident_memory.set(mb);
        }
        encode_families(&self.registry.gather())
    }
}

/// RSS du process courant en MB, `None` si la plateforme ne l'expose pas
fn get_memory_usage_mb() -> Option<f64> {
    let pid = sysinfo::get_current_pid().ok()?;
    let mut sys = System::new();
    if !sys.refresh_process(pid) {
        return None;
    }
    sys.process(pid)
        .map(|p| p.memory() as f64 / (1024.0 * 1024.0)) // octets -> MB
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_counters() {
        let health = HealthTracker::new().unwrap();
        health.record_probe(true);
        health.record_probe(false);
        health.record_probe(false);

        assert_eq!(health.probes(OUTCOME_SUCCESS), 1);
        assert_eq!(health.probes(OUTCOME_FAILURE), 2);
        let view = health.get_health();
        assert_eq!(view.probes_failure, 2);
    }

    #[test]
    fn test_encode_exposes_build_info() {
        let health = HealthTracker::new().unwrap();
        health.set_tracked_targets(3);
        let text = health.encode().unwrap();

        assert!(text.contains(&format!(
            "nsqd_exporter_build_info{{version=\"{}\"}} 1",
            env!("CARGO_PKG_VERSION")
        )));
        assert!(text.contains("nsqd_exporter_tracked_targets 3"));
        assert!(text.contains("nsqd_exporter_probes_total{outcome=\"failure\"} 0"));
        assert!(!text.contains("nsqd_depth"));
    }

    #[test]
    fn test_memory_usage_of_current_process() {
        let mb = get_memory_usage_mb().unwrap();
        assert!(mb > 0.0);

        let text = HealthTracker::new().unwrap().encode().unwrap();
        assert!(text.contains("nsqd_exporter_resident_memory_mb"));
        assert!(HealthTracker::new().unwrap().get_health().memory_usage_mb.is_some());
    }
}
