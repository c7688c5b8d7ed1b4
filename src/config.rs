use crate::converters::DEFAULT_IDENTIFY_TIMEOUT_SECS;
use crate::device::{CHANNEL_ENDPOINT_ID, CoordinatorEndpoint, DeviceOptions, StaticOptions};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Parse `.env` content into key/value pairs.
///
/// Values may contain spaces without quoting; surrounding quotes are removed.
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let value = value.trim();
            let value = value
                .strip_prefix('"')
                .and_then(|v| v.strip_suffix('"'))
                .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
                .unwrap_or(value);
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Load environment variables from a `.env` file in the working directory.
/// Variables already set in the environment take precedence.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var(&key).is_err() {
            // SAFETY: called at startup before the async runtime spawns threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub device: DeviceConfig,
    pub coordinator: CoordinatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttConfig {
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic prefix, zigbee2mqtt style.
    pub base_topic: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub friendly_name: String,
    pub disable_default_response: bool,
    pub manufacturer_code: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub identify_timeout_secs: u16,
}

impl DeviceConfig {
    /// Options resolver for the channel endpoint.
    pub fn options(&self) -> StaticOptions {
        let options = DeviceOptions {
            disable_default_response: self.disable_default_response,
            manufacturer_code: self.manufacturer_code,
            timeout_ms: self.timeout_ms,
        };
        StaticOptions::new(options.clone()).with_endpoint(CHANNEL_ENDPOINT_ID, options)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    pub ieee_address: u64,
    pub endpoint_id: u8,
}

impl CoordinatorConfig {
    pub fn endpoint(&self) -> CoordinatorEndpoint {
        CoordinatorEndpoint {
            ieee_address: self.ieee_address,
            endpoint_id: self.endpoint_id,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mqtt: MqttConfig {
                broker_host: "localhost".to_string(),
                broker_port: 1883,
                client_id: "usb-switch-bridge".to_string(),
                username: None,
                password: None,
                base_topic: "zigbee2mqtt".to_string(),
            },
            device: DeviceConfig {
                friendly_name: "usb-switch".to_string(),
                disable_default_response: false,
                manufacturer_code: None,
                timeout_ms: None,
                identify_timeout_secs: DEFAULT_IDENTIFY_TIMEOUT_SECS,
            },
            coordinator: CoordinatorConfig {
                ieee_address: 0,
                endpoint_id: 1,
            },
        }
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer.
fn parse_int<T>(raw: &str) -> Option<T>
where
    T: TryFrom<u64>,
{
    let raw = raw.trim();
    let value = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok()?,
        None => raw.parse::<u64>().ok()?,
    };
    T::try_from(value).ok()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from defaults overlaid with `lookup(VAR)`.
    /// Unparseable values keep the default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        // MQTT configuration
        if let Some(host) = lookup("MQTT_BROKER_HOST") {
            config.mqtt.broker_host = host;
        }
        if let Some(port) = lookup("MQTT_BROKER_PORT").and_then(|p| parse_int(&p)) {
            config.mqtt.broker_port = port;
        }
        if let Some(client_id) = lookup("MQTT_CLIENT_ID") {
            config.mqtt.client_id = client_id;
        }
        if let Some(username) = lookup("MQTT_USERNAME") {
            config.mqtt.username = Some(username);
        }
        if let Some(password) = lookup("MQTT_PASSWORD") {
            config.mqtt.password = Some(password);
        }
        if let Some(base_topic) = lookup("Z2M_BASE_TOPIC") {
            config.mqtt.base_topic = base_topic.trim_end_matches('/').to_string();
        }

        // Device configuration
        if let Some(name) = lookup("DEVICE_FRIENDLY_NAME") {
            config.device.friendly_name = name;
        }
        if let Some(disable) = lookup("DEVICE_DISABLE_DEFAULT_RESPONSE").and_then(|v| parse_bool(&v))
        {
            config.device.disable_default_response = disable;
        }
        if let Some(code) = lookup("DEVICE_MANUFACTURER_CODE").and_then(|v| parse_int(&v)) {
            config.device.manufacturer_code = Some(code);
        }
        if let Some(timeout) = lookup("DEVICE_TIMEOUT_MS").and_then(|v| parse_int(&v)) {
            config.device.timeout_ms = Some(timeout);
        }
        if let Some(secs) = lookup("IDENTIFY_TIMEOUT_SECS").and_then(|v| parse_int(&v)) {
            config.device.identify_timeout_secs = secs;
        }

        // Coordinator configuration
        if let Some(ieee) = lookup("COORDINATOR_IEEE").and_then(|v| parse_int(&v)) {
            config.coordinator.ieee_address = ieee;
        }
        if let Some(endpoint) = lookup("COORDINATOR_ENDPOINT").and_then(|v| parse_int(&v)) {
            config.coordinator.endpoint_id = endpoint;
        }

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::OptionsResolver;
    use crate::input::simulation::SimulatedEndpoint;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.mqtt.base_topic, "zigbee2mqtt");
        assert_eq!(config.device.identify_timeout_secs, 3);
        assert_eq!(config.coordinator.endpoint_id, 1);
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("MQTT_BROKER_HOST", "10.0.0.2"),
            ("MQTT_BROKER_PORT", "1884"),
            ("Z2M_BASE_TOPIC", "z2m/"),
            ("DEVICE_FRIENDLY_NAME", "desk-usb"),
            ("DEVICE_DISABLE_DEFAULT_RESPONSE", "true"),
            ("DEVICE_MANUFACTURER_CODE", "0x1234"),
            ("COORDINATOR_IEEE", "0x00124b0001020304"),
        ]));
        assert_eq!(config.mqtt.broker_host, "10.0.0.2");
        assert_eq!(config.mqtt.broker_port, 1884);
        assert_eq!(config.mqtt.base_topic, "z2m");
        assert_eq!(config.device.friendly_name, "desk-usb");
        assert!(config.device.disable_default_response);
        assert_eq!(config.device.manufacturer_code, Some(0x1234));
        assert_eq!(
            config.coordinator.endpoint().ieee_address,
            0x00124b0001020304
        );
    }

    #[test]
    fn test_invalid_values_keep_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("MQTT_BROKER_PORT", "not-a-port"),
            ("COORDINATOR_ENDPOINT", "300"),
            ("DEVICE_DISABLE_DEFAULT_RESPONSE", "maybe"),
        ]));
        assert_eq!(config.mqtt.broker_port, 1883);
        assert_eq!(config.coordinator.endpoint_id, 1);
        assert!(!config.device.disable_default_response);
    }

    #[test]
    fn test_device_options_resolve_for_channel_endpoint() {
        let config = Config::from_lookup(lookup(&[("DEVICE_TIMEOUT_MS", "2500")]));
        let resolver = config.device.options();
        let options = resolver.resolve(&SimulatedEndpoint::new(CHANNEL_ENDPOINT_ID));
        assert_eq!(options.timeout_ms, Some(2500));
    }

    #[test]
    fn test_parse_dotenv() {
        let content = r#"
# broker
MQTT_BROKER_HOST = 10.0.0.2
DEVICE_FRIENDLY_NAME="Desk USB switch"
MQTT_PASSWORD='se=cret'
not a pair
"#;
        assert_eq!(
            parse_dotenv(content),
            vec![
                ("MQTT_BROKER_HOST".to_string(), "10.0.0.2".to_string()),
                (
                    "DEVICE_FRIENDLY_NAME".to_string(),
                    "Desk USB switch".to_string()
                ),
                ("MQTT_PASSWORD".to_string(), "se=cret".to_string()),
            ]
        );
    }
}
