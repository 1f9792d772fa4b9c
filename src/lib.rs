//! Geo Home to MQTT bridge
//!
//! Polls the Geo cloud API for live power and periodic consumption/tariff
//! data of one smart meter and republishes each value as its own MQTT
//! message, optionally announcing the sensors to Home Assistant.

pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod geohome_api;
pub mod publisher;
pub mod scheduler;
pub mod session;
pub mod units;

// Re-export commonly used types for easier access
pub use config::Config;
pub use geohome_api::{GeoApi, GeoHomeClient};
pub use publisher::{MqttPublisher, Publisher};
pub use scheduler::{PollState, RefreshScheduler, SchedulerSettings};
pub use session::SessionManager;
