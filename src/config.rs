//! Settings loaded from environment variables at startup.

use crate::error::ConfigError;
use crate::geohome_api::DEFAULT_BASE_URL;
use crate::units::{DEFAULT_CALORIFIC_VALUE, DEFAULT_TARIFF_SCALE};
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const USERNAME_ENV_VAR: &str = "GEOHOME_USERNAME";
pub const PASSWORD_ENV_VAR: &str = "GEOHOME_PASSWORD";
pub const API_URL_ENV_VAR: &str = "GEOHOME_API_URL";
pub const MQTT_BROKER_ENV_VAR: &str = "MQTT_BROKER";
pub const MQTT_PORT_ENV_VAR: &str = "MQTT_PORT";
pub const MQTT_USERNAME_ENV_VAR: &str = "MQTT_USERNAME";
pub const MQTT_PASSWORD_ENV_VAR: &str = "MQTT_PASSWORD";
pub const MQTT_CLIENT_ID_ENV_VAR: &str = "MQTT_CLIENT_ID";
pub const MQTT_TOPIC_ENV_VAR: &str = "MQTT_TOPIC";
pub const DISCOVERY_ENV_VAR: &str = "HA_DISCOVERY";
pub const DISCOVERY_PERSIST_ENV_VAR: &str = "HA_DISCOVERY_PERSIST";
pub const CALORIFIC_VALUE_ENV_VAR: &str = "GAS_CALORIFIC_VALUE";
pub const TARIFF_SCALE_ENV_VAR: &str = "TARIFF_SCALE";
pub const LIVE_POLL_ENV_VAR: &str = "LIVE_POLL_SECONDS";
pub const PERIODIC_POLL_ENV_VAR: &str = "PERIODIC_POLL_SECONDS";
pub const AUTH_POLL_ENV_VAR: &str = "AUTH_POLL_SECONDS";

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_TOPIC_ROOT: &str = "geohome2mqtt";
pub const DEFAULT_CLIENT_ID: &str = "geohome2mqtt";
pub const DEFAULT_LIVE_POLL: Duration = Duration::from_secs(30);
pub const DEFAULT_PERIODIC_POLL: Duration = Duration::from_secs(30 * 60);
pub const DEFAULT_AUTH_POLL: Duration = Duration::from_secs(11 * 60 * 60);

#[derive(Debug, Clone, PartialEq)]
pub struct MqttSettings {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub username: String,
    pub password: String,
    pub api_url: String,
    pub mqtt: MqttSettings,
    pub topic_root: String,
    pub discovery: bool,
    pub discovery_persist: bool,
    pub calorific_value: f64,
    pub tariff_scale: f64,
    pub live_interval: Duration,
    pub aggregate_interval: Duration,
    pub auth_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any name -> value lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| optional(name).ok_or(ConfigError::Missing(name));

        let username = required(USERNAME_ENV_VAR)?;
        let password = required(PASSWORD_ENV_VAR)?;
        let host = required(MQTT_BROKER_ENV_VAR)?;

        let credentials = match (
            optional(MQTT_USERNAME_ENV_VAR),
            optional(MQTT_PASSWORD_ENV_VAR),
        ) {
            (Some(user), Some(pass)) => Some((user, pass)),
            _ => None,
        };

        Ok(Self {
            username,
            password,
            api_url: optional(API_URL_ENV_VAR).unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            mqtt: MqttSettings {
                host,
                port: parse_or(MQTT_PORT_ENV_VAR, optional(MQTT_PORT_ENV_VAR), DEFAULT_MQTT_PORT)?,
                client_id: optional(MQTT_CLIENT_ID_ENV_VAR)
                    .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
                credentials,
            },
            topic_root: optional(MQTT_TOPIC_ENV_VAR)
                .map(|t| t.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_TOPIC_ROOT.to_string()),
            discovery: parse_bool_safe(optional(DISCOVERY_ENV_VAR), false),
            discovery_persist: parse_bool_safe(optional(DISCOVERY_PERSIST_ENV_VAR), true),
            calorific_value: parse_positive(
                CALORIFIC_VALUE_ENV_VAR,
                optional(CALORIFIC_VALUE_ENV_VAR),
                DEFAULT_CALORIFIC_VALUE,
            )?,
            tariff_scale: parse_positive(
                TARIFF_SCALE_ENV_VAR,
                optional(TARIFF_SCALE_ENV_VAR),
                DEFAULT_TARIFF_SCALE,
            )?,
            live_interval: parse_seconds(
                LIVE_POLL_ENV_VAR,
                optional(LIVE_POLL_ENV_VAR),
                DEFAULT_LIVE_POLL,
            )?,
            aggregate_interval: parse_seconds(
                PERIODIC_POLL_ENV_VAR,
                optional(PERIODIC_POLL_ENV_VAR),
                DEFAULT_PERIODIC_POLL,
            )?,
            auth_interval: parse_seconds(
                AUTH_POLL_ENV_VAR,
                optional(AUTH_POLL_ENV_VAR),
                DEFAULT_AUTH_POLL,
            )?,
        })
    }
}

/// Parses a boolean case-insensitively, falling back to `default` when unset
/// or unparsable.
fn parse_bool_safe(val: Option<String>, default: bool) -> bool {
    val.and_then(|v| v.trim().to_ascii_lowercase().parse().ok())
        .unwrap_or(default)
}

fn parse_or<T: FromStr>(
    var: &'static str,
    val: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match val {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|_| ConfigError::Invalid { var, value: v }),
    }
}

fn parse_positive(var: &'static str, val: Option<String>, default: f64) -> Result<f64, ConfigError> {
    let parsed = parse_or(var, val, default)?;
    if parsed.is_finite() && parsed > 0.0 {
        Ok(parsed)
    } else {
        Err(ConfigError::Invalid {
            var,
            value: parsed.to_string(),
        })
    }
}

fn parse_seconds(
    var: &'static str,
    val: Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match parse_or::<u64>(var, val, default.as_secs())? {
        0 => Err(ConfigError::Invalid {
            var,
            value: "0".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}
