//! Per-device request options attached to writes and commands.

use super::endpoint::DeviceEndpoint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Options passed through to the transport with a write or command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOptions {
    /// Ask the device not to send a ZCL default response (no ack).
    #[serde(default)]
    pub disable_default_response: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Source of the options currently configured for a device endpoint.
pub trait OptionsResolver: Send + Sync {
    fn resolve(&self, endpoint: &dyn DeviceEndpoint) -> DeviceOptions;
}

/// Fixed options with optional per-endpoint overrides.
#[derive(Debug, Clone, Default)]
pub struct StaticOptions {
    default: DeviceOptions,
    per_endpoint: BTreeMap<u8, DeviceOptions>,
}

impl StaticOptions {
    pub fn new(default: DeviceOptions) -> Self {
        Self {
            default,
            per_endpoint: BTreeMap::new(),
        }
    }

    /// Override the options used for one endpoint id.
    pub fn with_endpoint(mut self, endpoint_id: u8, options: DeviceOptions) -> Self {
        self.per_endpoint.insert(endpoint_id, options);
        self
    }
}

impl OptionsResolver for StaticOptions {
    fn resolve(&self, endpoint: &dyn DeviceEndpoint) -> DeviceOptions {
        self.per_endpoint
            .get(&endpoint.id())
            .unwrap_or(&self.default)
            .clone()
    }
}
