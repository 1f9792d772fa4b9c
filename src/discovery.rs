//! Home Assistant MQTT discovery.
//!
//! Six sensors are announced per device: live power, total consumption and
//! active tariff, for electricity and gas.

use crate::extract::{CadenceKind, Category};
use crate::publisher::Publisher;
use crate::session::DeviceIdentity;
use serde_derive::Serialize;
use tracing::{debug, info, warn};

pub const DISCOVERY_PREFIX: &str = "homeassistant";
const MANUFACTURER: &str = "Geo";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveryDescriptor {
    pub cadence: CadenceKind,
    pub category: Category,
    pub unit: &'static str,
    pub icon: &'static str,
    pub device_class: &'static str,
    pub state_class: Option<&'static str>,
}

pub const DESCRIPTORS: [DiscoveryDescriptor; 6] = [
    DiscoveryDescriptor {
        cadence: CadenceKind::Live,
        category: Category::Electricity,
        unit: "W",
        icon: "mdi:flash",
        device_class: "power",
        state_class: Some("measurement"),
    },
    DiscoveryDescriptor {
        cadence: CadenceKind::Live,
        category: Category::Gas,
        unit: "W",
        icon: "mdi:fire",
        device_class: "power",
        state_class: Some("measurement"),
    },
    DiscoveryDescriptor {
        cadence: CadenceKind::TotalConsumption,
        category: Category::Electricity,
        unit: "kWh",
        icon: "mdi:flash",
        device_class: "energy",
        state_class: Some("total_increasing"),
    },
    DiscoveryDescriptor {
        cadence: CadenceKind::TotalConsumption,
        category: Category::Gas,
        unit: "kWh",
        icon: "mdi:fire",
        device_class: "energy",
        state_class: Some("total_increasing"),
    },
    // HA rejects a measurement state class on monetary sensors
    DiscoveryDescriptor {
        cadence: CadenceKind::ActiveTariff,
        category: Category::Electricity,
        unit: "GBP/kWh",
        icon: "mdi:currency-gbp",
        device_class: "monetary",
        state_class: None,
    },
    DiscoveryDescriptor {
        cadence: CadenceKind::ActiveTariff,
        category: Category::Gas,
        unit: "GBP/kWh",
        icon: "mdi:currency-gbp",
        device_class: "monetary",
        state_class: None,
    },
];

/// `<root>/<device>/<cadence>/<category>`
pub fn state_topic(
    topic_root: &str,
    device_id: &str,
    cadence: CadenceKind,
    category: Category,
) -> String {
    format!("{topic_root}/{device_id}/{cadence}/{category}")
}

pub fn config_topic(device_id: &str, cadence: CadenceKind, category: Category) -> String {
    format!("{DISCOVERY_PREFIX}/sensor/{device_id}/{cadence}{category}/config")
}

#[derive(Debug, Serialize)]
struct SensorConfig<'a> {
    name: String,
    unique_id: String,
    object_id: String,
    state_topic: String,
    unit_of_measurement: &'a str,
    device_class: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    state_class: Option<&'a str>,
    icon: &'a str,
    device: DeviceBlock<'a>,
}

#[derive(Debug, Serialize)]
struct DeviceBlock<'a> {
    identifiers: Vec<&'a str>,
    name: &'a str,
    manufacturer: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

impl DiscoveryDescriptor {
    /// JSON discovery payload for this sensor on `device`.
    pub fn payload(&self, device: &DeviceIdentity, topic_root: &str) -> serde_json::Value {
        let object_id = format!("{}_{}{}", device.device_id, self.cadence, self.category);
        let config = SensorConfig {
            name: format!("{} {} {}", device.device_name, self.category, self.label()),
            unique_id: format!("geohome2mqtt_{object_id}"),
            object_id,
            state_topic: state_topic(topic_root, &device.device_id, self.cadence, self.category),
            unit_of_measurement: self.unit,
            device_class: self.device_class,
            state_class: self.state_class,
            icon: self.icon,
            device: DeviceBlock {
                identifiers: vec![device.device_id.as_str()],
                name: &device.device_name,
                manufacturer: MANUFACTURER,
                model: device.device_type.as_deref(),
            },
        };
        serde_json::to_value(config).unwrap_or_default()
    }

    fn label(&self) -> &'static str {
        match self.cadence {
            CadenceKind::Live => "Power",
            CadenceKind::TotalConsumption => "Total Consumption",
            CadenceKind::ActiveTariff => "Tariff",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub enabled: bool,
    /// Announce once per process. When false, announce every aggregate cycle.
    pub persist: bool,
}

pub struct DiscoveryAnnouncer {
    settings: DiscoverySettings,
    topic_root: String,
}

impl DiscoveryAnnouncer {
    pub fn new(settings: DiscoverySettings, topic_root: &str) -> Self {
        Self {
            settings,
            topic_root: topic_root.to_string(),
        }
    }

    pub fn needs_announce(&self, discovery_sent: bool) -> bool {
        self.settings.enabled && (!discovery_sent || !self.settings.persist)
    }

    /// Publishes all descriptors when required and returns how many went out.
    ///
    /// `discovery_sent` is set once at least one descriptor was published.
    pub async fn announce_if_needed<P: Publisher + ?Sized>(
        &self,
        discovery_sent: &mut bool,
        device: &DeviceIdentity,
        publisher: &P,
    ) -> usize {
        if !self.needs_announce(*discovery_sent) {
            return 0;
        }

        let mut published = 0;
        for descriptor in &DESCRIPTORS {
            let topic = config_topic(&device.device_id, descriptor.cadence, descriptor.category);
            let payload = descriptor.payload(device, &self.topic_root).to_string();
            match publisher.publish(&topic, payload.as_bytes(), true).await {
                Ok(()) => {
                    debug!("Published discovery config to {topic}");
                    published += 1;
                }
                Err(e) => warn!("Discovery publish to {topic} failed: {e}"),
            }
        }

        if published > 0 {
            *discovery_sent = true;
        }
        info!(
            "Announced {published}/{} discovery descriptors for {}",
            DESCRIPTORS.len(),
            device.device_id
        );
        published
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::recording::RecordingPublisher;
    use std::collections::HashSet;

    fn device() -> DeviceIdentity {
        DeviceIdentity {
            device_id: "sys-1".into(),
            device_name: "Home".into(),
            device_type: Some("TRIO_II".into()),
        }
    }

    fn announcer(persist: bool) -> DiscoveryAnnouncer {
        DiscoveryAnnouncer::new(
            DiscoverySettings {
                enabled: true,
                persist,
            },
            "geohome2mqtt",
        )
    }

    #[test]
    fn test_table_covers_every_pair_once() {
        let pairs: HashSet<_> = DESCRIPTORS.iter().map(|d| (d.cadence, d.category)).collect();
        assert_eq!(pairs.len(), 6);
    }

    #[test]
    fn test_topics() {
        assert_eq!(
            config_topic("sys-1", CadenceKind::TotalConsumption, Category::Gas),
            "homeassistant/sensor/sys-1/totalConsumptionGas/config"
        );
        assert_eq!(
            state_topic("geohome2mqtt", "sys-1", CadenceKind::Live, Category::Electricity),
            "geohome2mqtt/sys-1/live/Electricity"
        );
    }

    #[test]
    fn test_payload() {
        let payload = DESCRIPTORS[3].payload(&device(), "geohome2mqtt");

        assert_eq!(payload["state_topic"], "geohome2mqtt/sys-1/totalConsumption/Gas");
        assert_eq!(payload["unit_of_measurement"], "kWh");
        assert_eq!(payload["device_class"], "energy");
        assert_eq!(payload["state_class"], "total_increasing");
        assert_eq!(payload["icon"], "mdi:fire");
        assert_eq!(payload["unique_id"], "geohome2mqtt_sys-1_totalConsumptionGas");
        assert_eq!(payload["device"]["identifiers"][0], "sys-1");
        assert_eq!(payload["device"]["model"], "TRIO_II");
    }

    #[test]
    fn test_tariff_payload_has_no_state_class() {
        let payload = DESCRIPTORS[4].payload(&device(), "geohome2mqtt");
        assert!(payload.get("state_class").is_none());
        assert_eq!(payload["device_class"], "monetary");
    }

    #[tokio::test]
    async fn test_announces_once_when_persisting() {
        let publisher = RecordingPublisher::default();
        let announcer = announcer(true);
        let mut sent = false;

        assert_eq!(announcer.announce_if_needed(&mut sent, &device(), &publisher).await, 6);
        assert!(sent);
        assert_eq!(announcer.announce_if_needed(&mut sent, &device(), &publisher).await, 0);

        let messages = publisher.take();
        assert_eq!(messages.len(), 6);
        assert!(messages.iter().all(|m| m.retain));
        assert!(messages
            .iter()
            .all(|m| m.topic.starts_with("homeassistant/sensor/sys-1/")));
    }

    #[tokio::test]
    async fn test_reannounces_without_persistence() {
        let publisher = RecordingPublisher::default();
        let announcer = announcer(false);
        let mut sent = false;

        assert_eq!(announcer.announce_if_needed(&mut sent, &device(), &publisher).await, 6);
        assert_eq!(announcer.announce_if_needed(&mut sent, &device(), &publisher).await, 6);
        assert_eq!(publisher.take().len(), 12);
    }

    #[tokio::test]
    async fn test_disabled_publishes_nothing() {
        let publisher = RecordingPublisher::default();
        let announcer = DiscoveryAnnouncer::new(
            DiscoverySettings {
                enabled: false,
                persist: true,
            },
            "geohome2mqtt",
        );
        let mut sent = false;

        assert_eq!(announcer.announce_if_needed(&mut sent, &device(), &publisher).await, 0);
        assert!(!sent);
        assert!(publisher.take().is_empty());
    }

    #[tokio::test]
    async fn test_total_failure_leaves_flag_unset() {
        let publisher = RecordingPublisher::default();
        *publisher.failing.lock().unwrap() = DESCRIPTORS
            .iter()
            .map(|d| config_topic("sys-1", d.cadence, d.category))
            .collect();
        let announcer = announcer(true);
        let mut sent = false;

        assert_eq!(announcer.announce_if_needed(&mut sent, &device(), &publisher).await, 0);
        assert!(!sent);

        // Next cycle tries again once the broker accepts messages
        publisher.failing.lock().unwrap().clear();
        assert_eq!(announcer.announce_if_needed(&mut sent, &device(), &publisher).await, 6);
        assert!(sent);
    }
}
