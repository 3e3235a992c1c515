/**
 * RECONCILER - Snapshot nsqd -> état des gauges d'une cible
 *
 * RÔLE : Cœur de l'exporter. Compare la topologie du snapshot à celle de la
 * réconciliation précédente, invalide les séries mortes, puis écrit toutes les
 * valeurs impliquées par le snapshot.
 *
 * FONCTIONNEMENT :
 * 1. topologie observée = topics + paires (topic, channel) du snapshot
 * 2. disparition détectée => invalidation selon `EvictionPolicy`
 *    (reset complet par défaut)
 * 3. la topologie connue est remplacée, qu'il y ait eu invalidation ou non
 * 4. écriture : info, puis par topic (depth, backend_depth, channel_count),
 *    puis par channel (depth, backend_depth, compteurs, client_count)
 *
 * Les compteurs u64 sont convertis en f64 : exacts jusqu'à 2^53, largement
 * au-dessus des profondeurs de queue réalistes.
 *
 * Un tuple de labels écrit deux fois dans le même cycle (topic dupliqué dans
 * un snapshot malformé) est loggé et ignoré; le reste du snapshot est écrit.
 */

use crate::config::EvictionPolicy;
use crate::labels::{Metric, TYPE_CHANNEL, TYPE_TOPIC};
use crate::models::{paused_label, Snapshot};
use crate::registry::{LabelTuple, MetricRegistry};
use crate::topology::{detect_removal, ChannelKey, Removals, Topology};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Bilan d'un cycle de réconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    /// Le registre entier a été vidé avant écriture
    pub reset: bool,
    /// Séries retirées par l'éviction précise ou le sweep
    pub evicted: usize,
    /// Séries écrites
    pub written: usize,
    /// Séries ignorées (doublon ou rejet du registre)
    pub skipped: usize,
}

pub fn reconcile(
    snapshot: &Snapshot,
    topology: &mut Topology,
    metrics: &mut MetricRegistry,
    policy: EvictionPolicy,
) -> ReconcileReport {
    let observed = Topology::from_snapshot(snapshot);
    let mut report = ReconcileReport::default();

    let topics_gone = detect_removal(&topology.topics, &observed.topics);
    let channels_gone = detect_removal(&topology.channels, &observed.channels);
    if topics_gone {
        warn!("[reconcile] at least one known topic vanished from nsqd stats");
    }
    if channels_gone {
        warn!("[reconcile] at least one known channel vanished from nsqd stats");
    }

    match policy {
        EvictionPolicy::Reset if topics_gone || channels_gone => {
            metrics.reset();
            report.reset = true;
        }
        EvictionPolicy::Precise if topics_gone || channels_gone => {
            let removals = topology.removals(&observed);
            report.evicted = evict_vanished(metrics, &removals);
        }
        _ => {}
    }

    *topology = observed;

    let mut writer = CycleWriter::new(metrics);
    write_snapshot(&mut writer, snapshot);
    let CycleWriter {
        seen,
        written,
        skipped,
        ..
    } = writer;
    report.written = written;
    report.skipped = skipped;

    if policy == EvictionPolicy::Sweep {
        report.evicted = metrics.retain(|metric, tuple| {
            seen.get(&metric).map(|set| set.contains(tuple)).unwrap_or(false)
        });
    }

    debug!(
        "[reconcile] topics={} channels={} written={} skipped={} evicted={} reset={}",
        snapshot.topics.len(),
        snapshot.channel_count(),
        report.written,
        report.skipped,
        report.evicted,
        report.reset
    );
    report
}

fn write_snapshot(writer: &mut CycleWriter<'_>, snapshot: &Snapshot) {
    let start_time = snapshot.start_time.to_string();
    writer.write(
        Metric::Info,
        &[
            snapshot.health.as_str(),
            start_time.as_str(),
            snapshot.version.as_str(),
        ],
        1.0,
    );

    for topic in &snapshot.topics {
        let paused = paused_label(topic.paused);
        let topic_labels = [TYPE_TOPIC, topic.name.as_str(), paused, ""];
        writer.write(Metric::Depth, &topic_labels, topic.depth as f64);
        writer.write(Metric::BackendDepth, &topic_labels, topic.backend_depth as f64);
        writer.write(
            Metric::ChannelCount,
            &topic_labels[..3],
            topic.channels.len() as f64,
        );

        for channel in &topic.channels {
            let paused = paused_label(channel.paused);
            let labels = [TYPE_CHANNEL, topic.name.as_str(), paused, channel.name.as_str()];
            let values = [
                (Metric::Depth, channel.depth),
                (Metric::BackendDepth, channel.backend_depth),
                (Metric::InFlightCount, channel.in_flight_count),
                (Metric::TimeoutCount, channel.timeout_count),
                (Metric::RequeueCount, channel.requeue_count),
                (Metric::DeferredCount, channel.deferred_count),
                (Metric::MessageCount, channel.message_count),
                (Metric::ClientCount, channel.clients.len() as u64),
            ];
            for (metric, value) in values {
                writer.write(metric, &labels, value as f64);
            }
        }
    }
}

/// Retire les séries dont le label `topic` ou la paire (`topic`, `channel`)
/// désigne un nom disparu
fn evict_vanished(metrics: &mut MetricRegistry, removals: &Removals) -> usize {
    metrics.retain(|metric, tuple| {
        let Some(topic_idx) = metric.label_index("topic") else {
            return true;
        };
        let topic = &tuple[topic_idx];
        if removals.topics.contains(topic) {
            return false;
        }
        match metric.label_index("channel") {
            Some(idx) if !tuple[idx].is_empty() => {
                !removals
                    .channels
                    .contains(&ChannelKey::new(topic.as_str(), tuple[idx].as_str()))
            }
            _ => true,
        }
    })
}

/// Écritures d'un cycle, avec détection des tuples dupliqués
struct CycleWriter<'a> {
    metrics: &'a mut MetricRegistry,
    seen: HashMap<Metric, HashSet<LabelTuple>>,
    written: usize,
    skipped: usize,
}

impl<'a> CycleWriter<'a> {
    fn new(metrics: &'a mut MetricRegistry) -> Self {
        Self {
            metrics,
            seen: HashMap::new(),
            written: 0,
            skipped: 0,
        }
    }

    fn write(&mut self, metric: Metric, labels: &[&str], value: f64) {
        let tuple: LabelTuple = labels.iter().map(|l| l.to_string()).collect();
        if !self.seen.entry(metric).or_default().insert(tuple) {
            warn!("[reconcile] duplicate series {metric}{labels:?} in snapshot, skipped");
            self.skipped += 1;
            return;
        }
        match self.metrics.set(metric, labels, value) {
            Ok(()) => self.written += 1,
            Err(e) => {
                warn!("[reconcile] cannot write {metric}{labels:?}: {e}");
                self.skipped += 1;
            }
        }
    }
}
