/*!
Builders de snapshots nsqd

Produit des documents JSON identiques à ceux d'un nsqd (`topic_name`,
`channel_name`, `in_flight_count`...), nus ou dans l'enveloppe 0.3.x.
*/

use serde_json::{json, Value};

#[derive(Debug, Clone)]
struct TopicDoc {
    name: String,
    paused: bool,
    depth: u64,
    channels: Vec<Value>,
}

/// Construction fluide d'un document `/stats?format=json`
#[derive(Debug, Clone)]
pub struct SnapshotBuilder {
    version: String,
    wrapped: bool,
    start_time: i64,
    topics: Vec<TopicDoc>,
}

impl Default for SnapshotBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.2.1".to_string(),
            wrapped: false,
            start_time: chrono::Utc::now().timestamp(),
            topics: Vec::new(),
        }
    }

    /// Scénario de référence: topic `orders` (depth 5) avec channel `ship` (depth 5, 2 clients)
    pub fn orders() -> Self {
        Self::new()
            .topic("orders", 5)
            .channel("orders", "ship", 5, 2)
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Enveloppe `{"status_code": 200, "status_txt": "OK", "data": ...}` (nsqd 0.3.x)
    pub fn wrapped(mut self) -> Self {
        self.wrapped = true;
        self
    }

    /// Ajoute (ou met à jour) un topic sans channel
    pub fn topic(mut self, name: &str, depth: u64) -> Self {
        self.topic_mut(name).depth = depth;
        self
    }

    pub fn paused_topic(mut self, name: &str) -> Self {
        self.topic_mut(name).paused = true;
        self
    }

    /// Ajoute un channel au topic (créé si absent); in_flight=1, message_count=100
    pub fn channel(self, topic: &str, channel: &str, depth: u64, clients: usize) -> Self {
        self.channel_doc(topic, channel_doc(channel, depth, clients, false))
    }

    pub fn paused_channel(self, topic: &str, channel: &str, depth: u64) -> Self {
        self.channel_doc(topic, channel_doc(channel, depth, 0, true))
    }

    /// Channel au format brut, pour les cas que les raccourcis ne couvrent pas
    pub fn channel_doc(mut self, topic: &str, doc: Value) -> Self {
        self.topic_mut(topic).channels.push(doc);
        self
    }

    pub fn build(&self) -> Value {
        let topics: Vec<Value> = self
            .topics
            .iter()
            .map(|t| {
                json!({
                    "topic_name": t.name,
                    "paused": t.paused,
                    "depth": t.depth,
                    "backend_depth": 0,
                    "message_count": 100,
                    "channels": t.channels,
                })
            })
            .collect();

        let data = json!({
            "version": self.version,
            "health": "OK",
            "start_time": self.start_time,
            "topics": topics,
        });

        if self.wrapped {
            json!({ "status_code": 200, "status_txt": "OK", "data": data })
        } else {
            data
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.build().to_string().into_bytes()
    }

    fn topic_mut(&mut self, name: &str) -> &mut TopicDoc {
        let index = match self.topics.iter().position(|t| t.name == name) {
            Some(i) => i,
            None => {
                self.topics.push(TopicDoc {
                    name: name.to_string(),
                    paused: false,
                    depth: 0,
                    channels: Vec::new(),
                });
                self.topics.len() - 1
            }
        };
        &mut self.topics[index]
    }
}

fn channel_doc(name: &str, depth: u64, clients: usize, paused: bool) -> Value {
    let clients: Vec<Value> = (0..clients)
        .map(|i| {
            json!({
                "client_id": format!("consumer-{i}"),
                "hostname": format!("worker-{i}.local"),
                "remote_address": format!("10.0.0.{}:4150", i + 1),
            })
        })
        .collect();

    json!({
        "channel_name": name,
        "paused": paused,
        "depth": depth,
        "backend_depth": 0,
        "in_flight_count": 1,
        "deferred_count": 0,
        "message_count": 100,
        "requeue_count": 0,
        "timeout_count": 0,
        "clients": clients,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_document() {
        let doc = SnapshotBuilder::orders().build();
        assert_eq!(doc["topics"][0]["topic_name"], "orders");
        assert_eq!(doc["topics"][0]["depth"], 5);
        assert_eq!(doc["topics"][0]["channels"][0]["channel_name"], "ship");
        assert_eq!(doc["topics"][0]["channels"][0]["clients"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_channels_attach_to_existing_topic() {
        let doc = SnapshotBuilder::new()
            .topic("a", 1)
            .channel("a", "x", 0, 0)
            .channel("a", "y", 0, 0)
            .channel("b", "x", 0, 0)
            .build();

        let topics = doc["topics"].as_array().unwrap();
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0]["channels"].as_array().unwrap().len(), 2);
        assert_eq!(topics[1]["topic_name"], "b");
    }

    #[test]
    fn test_wrapped_envelope() {
        let doc = SnapshotBuilder::orders().wrapped().build();
        assert_eq!(doc["status_code"], 200);
        assert_eq!(doc["data"]["topics"][0]["topic_name"], "orders");
    }
}
