//! Registration store.
//!
//! Each discovery node keeps the registrants whose topics it owns. The store
//! belongs to the node's event loop, so it needs no interior locking.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use chordcast_core::config::CapacityConfig;
use chordcast_core::message::{RegistrantInfo, Role, Tally};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrantRecord {
    pub info: RegistrantInfo,
    pub role: Role,
    pub topics: BTreeSet<String>,
}

impl RegistrantRecord {
    pub fn new(role: Role, info: RegistrantInfo, topics: impl IntoIterator<Item = String>) -> Self {
        Self {
            info,
            role,
            topics: topics.into_iter().collect(),
        }
    }

    /// At least one topic in common.
    pub fn matches_any(&self, topics: &[String]) -> bool {
        topics.iter().any(|t| self.topics.contains(t))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("Max {} already reached on this node", role_plural(.0))]
    Capacity(Role, usize),
}

fn role_plural(role: &Role) -> &'static str {
    match role {
        Role::Publisher => "publishers",
        Role::Subscriber => "subscribers",
        Role::Broker => "brokers",
    }
}

#[derive(Debug, Default)]
pub struct RegistrationStore {
    publishers: BTreeMap<String, RegistrantRecord>,
    subscribers: BTreeMap<String, RegistrantRecord>,
    brokers: BTreeMap<String, RegistrantRecord>,
    capacity: CapacityConfig,
    revision: u64,
}

impl RegistrationStore {
    pub fn new(capacity: CapacityConfig) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn table(&self, role: Role) -> &BTreeMap<String, RegistrantRecord> {
        match role {
            Role::Publisher => &self.publishers,
            Role::Subscriber => &self.subscribers,
            Role::Broker => &self.brokers,
        }
    }

    fn limit(&self, role: Role) -> usize {
        match role {
            Role::Publisher => self.capacity.max_publishers,
            Role::Subscriber => self.capacity.max_subscribers,
            Role::Broker => self.capacity.max_brokers,
        }
    }

    /// Add a registrant, or merge topics into an existing one with the same
    /// id. Capacity only applies to ids not seen before.
    pub fn register(&mut self, record: RegistrantRecord) -> Result<(), RegistrationError> {
        let role = record.role;
        let limit = self.limit(role);
        let table = match role {
            Role::Publisher => &mut self.publishers,
            Role::Subscriber => &mut self.subscribers,
            Role::Broker => &mut self.brokers,
        };

        match table.get_mut(&record.info.id) {
            Some(existing) => {
                existing.topics.extend(record.topics);
                existing.info = record.info;
            }
            None => {
                if limit != 0 && table.len() >= limit {
                    return Err(RegistrationError::Capacity(role, limit));
                }
                table.insert(record.info.id.clone(), record);
            }
        }
        self.revision += 1;
        Ok(())
    }

    pub fn count(&self, role: Role) -> usize {
        self.table(role).len()
    }

    pub fn get(&self, role: Role, id: &str) -> Option<&RegistrantRecord> {
        self.table(role).get(id)
    }

    /// Local quorum check against this node's own tables.
    pub fn is_ready(&self, expected_publishers: usize, expected_subscribers: usize) -> bool {
        self.publishers.len() >= expected_publishers && self.subscribers.len() >= expected_subscribers
    }

    /// Bumped by every accepted registration.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Publishers sharing at least one topic with `topics`.
    pub fn publishers_for_topics(&self, topics: &[String]) -> Vec<RegistrantInfo> {
        self.publishers
            .values()
            .filter(|r| r.matches_any(topics))
            .map(|r| r.info.clone())
            .collect()
    }

    /// This node's contribution to a readiness census.
    pub fn tally(&self) -> Tally {
        Tally {
            publishers: self
                .publishers
                .iter()
                .map(|(id, r)| (id.clone(), r.info.clone()))
                .collect(),
            subscribers: self.subscribers.keys().cloned().collect(),
            brokers: self
                .brokers
                .iter()
                .map(|(id, r)| (id.clone(), r.info.clone()))
                .collect(),
        }
    }

    /// Every record, publishers first.
    pub fn records(&self) -> Vec<RegistrantRecord> {
        self.publishers
            .values()
            .chain(self.subscribers.values())
            .chain(self.brokers.values())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(role: Role, id: &str, topics: &[&str]) -> RegistrantRecord {
        RegistrantRecord::new(
            role,
            RegistrantInfo {
                id: id.into(),
                address: "10.0.0.9".into(),
                port: 7000,
            },
            topics.iter().map(|t| t.to_string()),
        )
    }

    fn names(topics: &[&str]) -> Vec<String> {
        topics.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn repeated_registration_is_idempotent_and_merges_topics() {
        let mut store = RegistrationStore::default();
        store.register(record(Role::Publisher, "pub1", &["A"])).unwrap();
        store.register(record(Role::Publisher, "pub1", &["A"])).unwrap();
        assert_eq!(store.count(Role::Publisher), 1);

        store.register(record(Role::Publisher, "pub1", &["B"])).unwrap();
        let rec = store.get(Role::Publisher, "pub1").unwrap();
        assert_eq!(rec.topics.len(), 2);
        assert_eq!(store.count(Role::Publisher), 1);
    }

    #[test]
    fn lookup_requires_a_common_topic() {
        let mut store = RegistrationStore::default();
        store.register(record(Role::Publisher, "pub1", &["A", "B"])).unwrap();
        assert_eq!(store.publishers_for_topics(&names(&["B", "C"])).len(), 1);
        assert!(store.publishers_for_topics(&names(&["C", "D"])).is_empty());
        assert!(store.publishers_for_topics(&[]).is_empty());
    }

    #[test]
    fn readiness_tracks_expected_counts() {
        let mut store = RegistrationStore::default();
        store.register(record(Role::Publisher, "pub1", &["A"])).unwrap();
        assert!(!store.is_ready(2, 1));
        store.register(record(Role::Publisher, "pub2", &["A"])).unwrap();
        assert!(!store.is_ready(2, 1));
        store.register(record(Role::Subscriber, "sub1", &["A"])).unwrap();
        assert!(store.is_ready(2, 1));
    }

    #[test]
    fn capacity_rejects_new_ids_only() {
        let mut store = RegistrationStore::new(CapacityConfig {
            max_publishers: 1,
            ..CapacityConfig::default()
        });
        store.register(record(Role::Publisher, "pub1", &["A"])).unwrap();
        let err = store
            .register(record(Role::Publisher, "pub2", &["A"]))
            .unwrap_err();
        assert_eq!(err, RegistrationError::Capacity(Role::Publisher, 1));
        assert_eq!(err.to_string(), "Max publishers already reached on this node");
        assert_eq!(store.revision(), 1);

        // The existing registrant can still add topics.
        store.register(record(Role::Publisher, "pub1", &["B"])).unwrap();
        assert_eq!(store.revision(), 2);
        // Other roles are unaffected.
        store.register(record(Role::Subscriber, "sub1", &["A"])).unwrap();
    }

    #[test]
    fn roles_are_kept_apart() {
        let mut store = RegistrationStore::default();
        store.register(record(Role::Publisher, "x", &["A"])).unwrap();
        store.register(record(Role::Broker, "b", &[])).unwrap();
        assert_eq!(store.count(Role::Publisher), 1);
        assert_eq!(store.count(Role::Broker), 1);
        assert_eq!(store.count(Role::Subscriber), 0);

        let tally = store.tally();
        assert!(tally.publishers.contains_key("x"));
        assert!(tally.brokers.contains_key("b"));
        assert_eq!(store.records().len(), 2);
    }
}
