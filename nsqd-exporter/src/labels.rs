/**
 * LABEL MODEL - Table statique des métriques exportées par cible
 *
 * RÔLE : Nom, namespace, aide et schéma de labels (ordonné) de chaque gauge.
 * Aucune logique : le registre et le réconciliateur lisent cette table.
 *
 * | Métrique               | Labels                          |
 * |------------------------|---------------------------------|
 * | info                   | health, start_time, version     |
 * | depth, backend_depth   | type, topic, paused, channel    |
 * | channel_count          | type, topic, paused             |
 * | compteurs de channel   | type, topic, paused, channel    |
 */

/// Préfixe de toutes les métriques par cible (`nsqd_depth`, `nsqd_info`...)
pub const NAMESPACE: &str = "nsqd";

pub const INFO_LABELS: &[&str] = &["health", "start_time", "version"];
pub const COMMON_LABELS: &[&str] = &["type", "topic", "paused", "channel"];
pub const TOPIC_LABELS: &[&str] = &["type", "topic", "paused"];

/// Valeurs du label `type`
pub const TYPE_TOPIC: &str = "topic";
pub const TYPE_CHANNEL: &str = "channel";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Metric {
    Info,
    Depth,
    BackendDepth,
    ChannelCount,
    InFlightCount,
    TimeoutCount,
    RequeueCount,
    DeferredCount,
    MessageCount,
    ClientCount,
}

impl Metric {
    pub const ALL: [Metric; 10] = [
        Metric::Info,
        Metric::Depth,
        Metric::BackendDepth,
        Metric::ChannelCount,
        Metric::InFlightCount,
        Metric::TimeoutCount,
        Metric::RequeueCount,
        Metric::DeferredCount,
        Metric::MessageCount,
        Metric::ClientCount,
    ];

    /// Nom sans namespace
    pub fn name(self) -> &'static str {
        match self {
            Metric::Info => "info",
            Metric::Depth => "depth",
            Metric::BackendDepth => "backend_depth",
            Metric::ChannelCount => "channel_count",
            Metric::InFlightCount => "in_flight_count",
            Metric::TimeoutCount => "timeout_count_total",
            Metric::RequeueCount => "requeue_count_total",
            Metric::DeferredCount => "deferred_count_total",
            Metric::MessageCount => "message_count_total",
            Metric::ClientCount => "client_count",
        }
    }

    pub fn help(self) -> &'static str {
        match self {
            Metric::Info => "nsqd info",
            Metric::Depth => "Queue depth",
            Metric::BackendDepth => "Queue backend depth",
            Metric::ChannelCount => "Number of channels",
            Metric::InFlightCount => "In flight count",
            Metric::TimeoutCount => "Timeout count",
            Metric::RequeueCount => "Requeue count",
            Metric::DeferredCount => "Deferred count",
            Metric::MessageCount => "Total message count",
            Metric::ClientCount => "Number of clients",
        }
    }

    pub fn labels(self) -> &'static [&'static str] {
        match self {
            Metric::Info => INFO_LABELS,
            Metric::ChannelCount => TOPIC_LABELS,
            _ => COMMON_LABELS,
        }
    }

    /// Nom complet tel qu'il apparaît dans l'exposition (`nsqd_depth`)
    pub fn full_name(self) -> String {
        format!("{}_{}", NAMESPACE, self.name())
    }

    /// Position d'un label dans le schéma de la métrique
    pub fn label_index(self, label: &str) -> Option<usize> {
        self.labels().iter().position(|l| *l == label)
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
