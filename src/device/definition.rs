//! Static declaration of the KONQI USB switch for the host registry.
//!
//! Holds the model identifiers, the exposed properties, the converters in
//! both directions and the commissioning entry point.

use super::configure;
use super::endpoint::{AttributeReport, CoordinatorEndpoint, DeviceEndpoint};
use crate::converters::{
    CHANNEL_KEY, CHANNEL_VALUES, ConvertContext, FromZigbee, IDENTIFY_KEY, IdentifyOutput,
    MultistateChannelInput, MultistateChannelOutput, OnOffInput, OnOffOutput, STATE_KEY,
    SetResult, State, ToZigbee,
};
use crate::error::{ConverterError, Result};
use log::{debug, warn};
use serde::Serialize;
use serde_json::Value;

pub const ZIGBEE_MODEL: &str = "zigbee-usb-switch";
pub const MODEL: &str = "zigbee-usb-switch";
pub const VENDOR: &str = "KONQI";
pub const DESCRIPTION: &str = "konqi's homebrew usb-switch extension";

/// Access flags of an exposed property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Access(u8);

impl Access {
    /// Published in state.
    pub const STATE: Access = Access(0b001);
    /// Settable.
    pub const SET: Access = Access(0b010);
    /// Readable on demand.
    pub const GET: Access = Access(0b100);
    pub const ALL: Access = Access(0b111);

    pub fn contains(self, other: Access) -> bool {
        self.0 & other.0 == other.0
    }
}

/// Property exposed to the automation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Expose {
    Enum {
        name: &'static str,
        property: &'static str,
        access: Access,
        values: Vec<&'static str>,
    },
    Binary {
        name: &'static str,
        property: &'static str,
        access: Access,
        value_on: &'static str,
        value_off: &'static str,
        value_toggle: &'static str,
    },
}

impl Expose {
    pub fn property(&self) -> &'static str {
        match self {
            Expose::Enum { property, .. } | Expose::Binary { property, .. } => property,
        }
    }

    pub fn access(&self) -> Access {
        match self {
            Expose::Enum { access, .. } | Expose::Binary { access, .. } => *access,
        }
    }
}

pub struct Definition {
    pub zigbee_model: &'static [&'static str],
    pub model: &'static str,
    pub vendor: &'static str,
    pub description: &'static str,
    pub exposes: Vec<Expose>,
    from_zigbee: Vec<Box<dyn FromZigbee>>,
    to_zigbee: Vec<Box<dyn ToZigbee>>,
}

impl Definition {
    /// Definition for the USB switch. `identify_timeout_secs` is sent with identify.
    pub fn usb_switch(identify_timeout_secs: u16) -> Self {
        Self {
            zigbee_model: &[ZIGBEE_MODEL],
            model: MODEL,
            vendor: VENDOR,
            description: DESCRIPTION,
            exposes: vec![
                Expose::Enum {
                    name: CHANNEL_KEY,
                    property: CHANNEL_KEY,
                    access: Access::ALL,
                    values: CHANNEL_VALUES.to_vec(),
                },
                Expose::Binary {
                    name: STATE_KEY,
                    property: STATE_KEY,
                    access: Access::ALL,
                    value_on: "ON",
                    value_off: "OFF",
                    value_toggle: "TOGGLE",
                },
                Expose::Enum {
                    name: IDENTIFY_KEY,
                    property: IDENTIFY_KEY,
                    access: Access::SET,
                    values: vec![IDENTIFY_KEY],
                },
            ],
            from_zigbee: vec![Box::new(MultistateChannelInput), Box::new(OnOffInput)],
            to_zigbee: vec![
                Box::new(MultistateChannelOutput),
                Box::new(OnOffOutput),
                Box::new(IdentifyOutput::new(identify_timeout_secs)),
            ],
        }
    }

    /// True if a device announcing `model_id` is handled by this definition.
    pub fn matches_model(&self, model_id: &str) -> bool {
        self.zigbee_model.iter().any(|model| *model == model_id)
    }

    pub fn expose(&self, property: &str) -> Option<&Expose> {
        self.exposes.iter().find(|e| e.property() == property)
    }

    /// Translate an incoming frame.
    ///
    /// Frames that fail to decode are dropped with a warning; the next frame
    /// is processed normally. Returns `None` if nothing was produced.
    pub fn process_report(&self, report: &AttributeReport) -> Option<State> {
        let cluster = report.cluster_id()?;
        let mut merged = State::new();

        for converter in self
            .from_zigbee
            .iter()
            .filter(|c| c.cluster() == cluster && c.message_types().contains(&report.kind))
        {
            match converter.convert(report) {
                Ok(Some(state)) => merged.merge(state),
                Ok(None) => {}
                Err(e) => {
                    warn!("[Converter] Dropping {:?} from {}: {}", report.kind, cluster, e);
                }
            }
        }

        if merged.is_empty() {
            None
        } else {
            debug!("[Converter] {} -> {:?}", cluster, merged);
            Some(merged)
        }
    }

    fn to_zigbee_for(&self, key: &str) -> Result<&(dyn ToZigbee + 'static)> {
        self.to_zigbee
            .iter()
            .find(|c| c.keys().iter().any(|k| *k == key))
            .map(|c| &**c)
            .ok_or_else(|| ConverterError::UnknownKey(key.to_string()))
    }

    /// Route a set of `key` to its converter.
    pub async fn convert_set(
        &self,
        ctx: &ConvertContext<'_>,
        key: &str,
        value: &Value,
    ) -> Result<Option<SetResult>> {
        self.to_zigbee_for(key)?.convert_set(ctx, key, value).await
    }

    /// Route a get of `key` to its converter.
    pub async fn convert_get(&self, ctx: &ConvertContext<'_>, key: &str) -> Result<()> {
        self.to_zigbee_for(key)?.convert_get(ctx, key).await
    }

    /// Commissioning entry point. `endpoint` should be the channel endpoint
    /// ([`configure::CHANNEL_ENDPOINT_ID`]).
    ///
    /// The channel register is commissioned first; the on/off switch only
    /// once that has succeeded.
    pub async fn configure(
        &self,
        endpoint: &dyn DeviceEndpoint,
        coordinator: &CoordinatorEndpoint,
    ) -> Result<()> {
        configure::configure(endpoint, coordinator).await?;
        configure::configure_on_off(endpoint, coordinator).await
    }
}
