/**
 * MODELS - Snapshot nsqd tel que renvoyé par `GET /stats?format=json`
 *
 * RÔLE : Désérialisation du document JSON d'un nsqd en structures typées.
 *
 * FORMATS ACCEPTÉS :
 * - nsqd >= 1.0 : document "nu" `{"version", "health", "start_time", "topics": [...]}`
 * - nsqd 0.3.x  : enveloppe `{"status_code": 200, "status_txt": "OK", "data": {...}}`
 *
 * Les noms suivent le JSON nsqd (`topic_name`, `channel_name`, `in_flight_count`...)
 * avec des alias courts (`name`, `in_flight`...) pour les fixtures de test.
 */

use serde::Deserialize;

/// Lecture ponctuelle de l'état interne d'un nsqd
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub health: String,
    #[serde(default)]
    pub start_time: i64,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub topics: Vec<TopicSnapshot>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TopicSnapshot {
    #[serde(rename = "topic_name", alias = "name")]
    pub name: String,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub depth: u64,
    #[serde(default)]
    pub backend_depth: u64,
    #[serde(default)]
    pub channels: Vec<ChannelSnapshot>,
}

/// Un channel est identifié par le couple (topic, channel), jamais par son nom seul
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ChannelSnapshot {
    #[serde(rename = "channel_name", alias = "name")]
    pub name: String,
    #[serde(default)]
    pub paused: bool,
    #[serde(default)]
    pub depth: u64,
    #[serde(default)]
    pub backend_depth: u64,
    #[serde(default, rename = "in_flight_count", alias = "in_flight")]
    pub in_flight_count: u64,
    #[serde(default, rename = "timeout_count", alias = "timeout")]
    pub timeout_count: u64,
    #[serde(default, rename = "requeue_count", alias = "requeue")]
    pub requeue_count: u64,
    #[serde(default, rename = "deferred_count", alias = "deferred")]
    pub deferred_count: u64,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub clients: Vec<ClientSnapshot>,
}

/// Consommateur connecté à un channel; seul le nombre de clients est exporté
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientSnapshot {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default)]
    pub remote_address: String,
}

/// Les deux formes de réponse connues de nsqd
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum StatsEnvelope {
    Wrapped { data: Snapshot },
    Bare(Snapshot),
}

impl Snapshot {
    /// Parse le corps de réponse d'un nsqd, enveloppé ou non
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: StatsEnvelope = serde_json::from_slice(body)?;
        Ok(match envelope {
            StatsEnvelope::Wrapped { data } => data,
            StatsEnvelope::Bare(snapshot) => snapshot,
        })
    }

    pub fn channel_count(&self) -> usize {
        self.topics.iter().map(|t| t.channels.len()).sum()
    }
}

/// Représentation des booléens dans les labels (`"true"` / `"false"`)
pub fn paused_label(paused: bool) -> &'static str {
    if paused {
        "true"
    } else {
        "false"
    }
}
