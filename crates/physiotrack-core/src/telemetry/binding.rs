use serde::{Deserialize, Serialize};

use crate::storage::TopicConfig;

/// The three per-device topics derived from a device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTopics {
    pub data: String,
    pub command: String,
    pub start: String,
}

impl DeviceTopics {
    pub fn derive(prefixes: &TopicConfig, device_id: &str) -> Self {
        Self {
            data: format!("{}/{device_id}", prefixes.data),
            command: format!("{}/{device_id}", prefixes.command),
            start: format!("{}/{device_id}", prefixes.start),
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.data, &self.command, &self.start]
    }
}

/// Subscription changes produced by [`DeviceBinding::rebind`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconcile {
    pub unsubscribe: Vec<String>,
    pub subscribe: Vec<String>,
}

/// Which device the link is listening to, and on which topics.
#[derive(Debug, Clone, Default)]
pub struct DeviceBinding {
    device_id: Option<String>,
    topics: Option<DeviceTopics>,
}

impl DeviceBinding {
    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn topics(&self) -> Option<&DeviceTopics> {
        self.topics.as_ref()
    }

    pub fn is_bound(&self) -> bool {
        self.topics.is_some()
    }

    /// Point the binding at `device_id`.
    ///
    /// Returns `None` when already bound to that device. Otherwise the old
    /// topics (if any) are listed for unsubscription and the new ones for
    /// subscription; the binding switches over before the caller applies them.
    pub fn rebind(&mut self, device_id: &str, prefixes: &TopicConfig) -> Option<Reconcile> {
        if self.device_id.as_deref() == Some(device_id) {
            return None;
        }

        let next = DeviceTopics::derive(prefixes, device_id);
        let unsubscribe = self
            .topics
            .take()
            .map(|old| old.all().iter().map(|t| t.to_string()).collect())
            .unwrap_or_default();
        let subscribe = next.all().iter().map(|t| t.to_string()).collect();

        self.device_id = Some(device_id.to_string());
        self.topics = Some(next);

        Some(Reconcile {
            unsubscribe,
            subscribe,
        })
    }

    /// Topics to restore after a fresh broker session.
    pub fn resubscribe(&self) -> Vec<String> {
        self.topics
            .as_ref()
            .map(|t| t.all().iter().map(|s| s.to_string()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefixes() -> TopicConfig {
        TopicConfig {
            data: "pt/data".into(),
            command: "pt/cmd".into(),
            start: "pt/start".into(),
            pair: "pt/pair".into(),
            device: "pt/device".into(),
        }
    }

    #[test]
    fn first_bind_only_subscribes() {
        let mut binding = DeviceBinding::default();
        let plan = binding.rebind("A", &prefixes()).unwrap();
        assert!(plan.unsubscribe.is_empty());
        assert_eq!(plan.subscribe, vec!["pt/data/A", "pt/cmd/A", "pt/start/A"]);
        assert_eq!(binding.device_id(), Some("A"));
    }

    #[test]
    fn same_device_is_a_no_op() {
        let mut binding = DeviceBinding::default();
        binding.rebind("A", &prefixes());
        assert_eq!(binding.rebind("A", &prefixes()), None);
    }

    #[test]
    fn switching_device_swaps_all_three_topics() {
        let mut binding = DeviceBinding::default();
        binding.rebind("A", &prefixes());
        let plan = binding.rebind("B", &prefixes()).unwrap();
        assert_eq!(plan.unsubscribe, vec!["pt/data/A", "pt/cmd/A", "pt/start/A"]);
        assert_eq!(plan.subscribe, vec!["pt/data/B", "pt/cmd/B", "pt/start/B"]);
        assert_eq!(binding.topics().unwrap().start, "pt/start/B");
    }
}
