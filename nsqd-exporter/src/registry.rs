/**
 * METRIC REGISTRY - Ensemble des séries vivantes d'une cible
 *
 * RÔLE : Un `prometheus::Registry` par cible, une `GaugeVec` par ligne de la
 * table des labels, plus un index des tuples de labels écrits.
 *
 * FONCTIONNEMENT :
 * - `set` = upsert idempotent : même tuple => même série, valeur écrasée
 * - l'index permet de compter, lister et évincer les séries sans passer par
 *   le protobuf de `gather()` (qui trie les labels par nom)
 * - `reset` vide toutes les GaugeVec et l'index d'un coup
 */

use crate::labels::{Metric, NAMESPACE};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, Registry, TextEncoder};
use std::collections::{BTreeMap, BTreeSet};

/// Valeurs de labels dans l'ordre du schéma de la métrique
pub type LabelTuple = Vec<String>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("metric {metric} expects {expected} label values, got {got}")]
    Arity {
        metric: Metric,
        expected: usize,
        got: usize,
    },
    #[error("metric {0} is not registered")]
    Unregistered(Metric),
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
    #[error("exposition is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

pub struct MetricRegistry {
    registry: Registry,
    gauges: BTreeMap<Metric, GaugeVec>,
    series: BTreeMap<Metric, BTreeSet<LabelTuple>>,
}

impl MetricRegistry {
    /// Instancie toutes les GaugeVec de la table des labels dans un registre neuf
    pub fn new() -> Result<Self, RegistryError> {
        let registry = Registry::new();
        let mut gauges = BTreeMap::new();

        for metric in Metric::ALL {
            let opts = Opts::new(metric.name(), metric.help()).namespace(NAMESPACE);
            let gauge = GaugeVec::new(opts, metric.labels())?;
            registry.register(Box::new(gauge.clone()))?;
            gauges.insert(metric, gauge);
        }

        Ok(Self {
            registry,
            gauges,
            series: BTreeMap::new(),
        })
    }

    /// Écrit la valeur d'une série (création si absente)
    pub fn set(&mut self, metric: Metric, labels: &[&str], value: f64) -> Result<(), RegistryError> {
        let expected = metric.labels().len();
        if labels.len() != expected {
            return Err(RegistryError::Arity {
                metric,
                expected,
                got: labels.len(),
            });
        }

        self.gauge(metric)?
            .get_metric_with_label_values(labels)?
            .set(value);
        self.series
            .entry(metric)
            .or_default()
            .insert(labels.iter().map(|l| l.to_string()).collect());
        Ok(())
    }

    /// Valeur courante d'une série, `None` si elle n'existe pas
    pub fn get(&self, metric: Metric, labels: &[&str]) -> Option<f64> {
        let tuple: LabelTuple = labels.iter().map(|l| l.to_string()).collect();
        if !self.contains(metric, &tuple) {
            return None;
        }
        let gauge = self.gauges.get(&metric)?;
        gauge.get_metric_with_label_values(labels).ok().map(|g| g.get())
    }

    pub fn contains(&self, metric: Metric, tuple: &LabelTuple) -> bool {
        self.series
            .get(&metric)
            .map(|set| set.contains(tuple))
            .unwrap_or(false)
    }

    /// Supprime une série; `false` si elle n'existait pas
    pub fn remove(&mut self, metric: Metric, tuple: &LabelTuple) -> bool {
        let known = self
            .series
            .get_mut(&metric)
            .map(|set| set.remove(tuple))
            .unwrap_or(false);
        if !known {
            return false;
        }
        if let Some(gauge) = self.gauges.get(&metric) {
            let values: Vec<&str> = tuple.iter().map(String::as_str).collect();
            if let Err(e) = gauge.remove_label_values(&values) {
                tracing::warn!("[registry] failed to remove {metric}{tuple:?}: {e}");
            }
        }
        true
    }

    /// Garde uniquement les séries pour lesquelles `keep` renvoie true.
    /// Retourne le nombre de séries supprimées.
    pub fn retain<F>(&mut self, mut keep: F) -> usize
    where
        F: FnMut(Metric, &LabelTuple) -> bool,
    {
        let doomed: Vec<(Metric, LabelTuple)> = self
            .series
            .iter()
            .flat_map(|(metric, set)| set.iter().map(move |tuple| (*metric, tuple)))
            .filter(|(metric, tuple)| !keep(*metric, tuple))
            .map(|(metric, tuple)| (metric, tuple.clone()))
            .collect();

        for (metric, tuple) in &doomed {
            self.remove(*metric, tuple);
        }
        doomed.len()
    }

    /// Vide toutes les séries de toutes les métriques
    pub fn reset(&mut self) {
        for gauge in self.gauges.values() {
            gauge.reset();
        }
        self.series.clear();
    }

    pub fn series(&self, metric: Metric) -> impl Iterator<Item = &LabelTuple> {
        self.series.get(&metric).into_iter().flat_map(|set| set.iter())
    }

    pub fn series_count(&self) -> usize {
        self.series.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.series_count() == 0
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    pub fn encode(&self) -> Result<String, RegistryError> {
        encode_families(&self.gather())
    }

    fn gauge(&self, metric: Metric) -> Result<&GaugeVec, RegistryError> {
        self.gauges
            .get(&metric)
            .ok_or(RegistryError::Unregistered(metric))
    }
}

/// Encode des familles au format texte Prometheus
pub fn encode_families(families: &[MetricFamily]) -> Result<String, RegistryError> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}
