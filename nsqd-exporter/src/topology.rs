/**
 * TOPOLOGY TRACKER - Topics et channels vus à la dernière réconciliation
 *
 * RÔLE : Détecter les disparitions (topic supprimé, channel renommé...) pour
 * invalider les séries mortes. L'apparition d'un nom ne déclenche rien.
 *
 * Un channel est identifié par la paire (topic, channel) : le même nom de
 * channel peut exister sous plusieurs topics.
 */

use crate::models::Snapshot;
use std::collections::BTreeSet;

/// Identité composite d'un channel
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    pub topic: String,
    pub channel: String,
}

impl ChannelKey {
    pub fn new(topic: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            channel: channel.into(),
        }
    }
}

/// Noms observés sur une cible à un instant donné
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    pub topics: BTreeSet<String>,
    pub channels: BTreeSet<ChannelKey>,
}

/// Ce qui a disparu entre deux topologies
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Removals {
    pub topics: BTreeSet<String>,
    pub channels: BTreeSet<ChannelKey>,
}

impl Removals {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.channels.is_empty()
    }
}

impl Topology {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut topology = Topology::default();
        for topic in &snapshot.topics {
            topology.topics.insert(topic.name.clone());
            for channel in &topic.channels {
                topology
                    .channels
                    .insert(ChannelKey::new(&topic.name, &channel.name));
            }
        }
        topology
    }

    /// Noms connus de `self` absents de `observed`
    pub fn removals(&self, observed: &Topology) -> Removals {
        Removals {
            topics: self.topics.difference(&observed.topics).cloned().collect(),
            channels: self
                .channels
                .difference(&observed.channels)
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty() && self.channels.is_empty()
    }
}

/// Vrai ssi un nom de `known` est absent de `observed`
pub fn detect_removal<T: Ord>(known: &BTreeSet<T>, observed: &BTreeSet<T>) -> bool {
    known.iter().any(|name| !observed.contains(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChannelSnapshot, TopicSnapshot};

    fn names(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_detect_removal_is_one_directional() {
        assert!(!detect_removal(&names(&[]), &names(&["a"])));
        assert!(!detect_removal(&names(&["a"]), &names(&["a", "b"])));
        assert!(detect_removal(&names(&["a", "b"]), &names(&["a"])));
        assert!(detect_removal(&names(&["a"]), &names(&[])));
        assert!(!detect_removal(&names(&["a", "b"]), &names(&["b", "a"])));
    }

    #[test]
    fn test_channel_key_does_not_collide() {
        // "ab"+"c" et "a"+"bc" donnent la même chaîne concaténée
        let known: BTreeSet<_> = [ChannelKey::new("ab", "c")].into_iter().collect();
        let observed: BTreeSet<_> = [ChannelKey::new("a", "bc")].into_iter().collect();
        assert!(detect_removal(&known, &observed));
    }

    #[test]
    fn test_from_snapshot_and_removals() {
        let snapshot = Snapshot {
            topics: vec![
                TopicSnapshot {
                    name: "orders".into(),
                    channels: vec![
                        ChannelSnapshot { name: "ship".into(), ..Default::default() },
                        ChannelSnapshot { name: "bill".into(), ..Default::default() },
                    ],
                    ..Default::default()
                },
                TopicSnapshot {
                    name: "events".into(),
                    channels: vec![ChannelSnapshot { name: "ship".into(), ..Default::default() }],
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let before = Topology::from_snapshot(&snapshot);
        assert_eq!(before.topics.len(), 2);
        assert_eq!(before.channels.len(), 3);

        let mut shrunk = snapshot.clone();
        shrunk.topics[0].channels.remove(1);
        let after = Topology::from_snapshot(&shrunk);

        let removals = before.removals(&after);
        assert!(removals.topics.is_empty());
        assert_eq!(
            removals.channels.into_iter().collect::<Vec<_>>(),
            vec![ChannelKey::new("orders", "bill")]
        );
        assert!(after.removals(&before).is_empty());
    }
}
