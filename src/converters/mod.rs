//! Converters between device attribute frames and semantic state.
//!
//! `FromZigbee` converters turn attribute reports into [`State`];
//! `ToZigbee` converters turn semantic commands into device writes, reads
//! and cluster commands. Both are stateless.

mod channel;
mod identify;
mod on_off;

pub use channel::{
    CHANNEL_KEY, CHANNEL_VALUES, CHANNELS, ChannelMap, MultistateChannelInput,
    MultistateChannelOutput, decode_channel, encode_channel,
};
pub use identify::{DEFAULT_IDENTIFY_TIMEOUT_SECS, IDENTIFY_KEY, IdentifyOutput};
pub use on_off::{OnOffInput, OnOffOutput, STATE_KEY};

use crate::clusters::ClusterId;
use crate::device::{AttributeReport, DeviceEndpoint, MessageType, OptionsResolver};
use crate::error::{ConverterError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Semantic state: property name to value, e.g. `{"channel": "ch_1"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(BTreeMap<String, String>);

impl State {
    pub fn new() -> Self {
        Self::default()
    }

    /// State holding a single property.
    pub fn with(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut state = Self::new();
        state.insert(key, value);
        state
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` into `self`, later values win.
    pub fn merge(&mut self, other: State) {
        self.0.extend(other.0);
    }
}

/// Result of a successful set: `{"state": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetResult {
    pub state: State,
}

/// Borrowed collaborators for one outbound conversion.
#[derive(Clone, Copy)]
pub struct ConvertContext<'a> {
    pub endpoint: &'a dyn DeviceEndpoint,
    pub options: &'a dyn OptionsResolver,
}

impl<'a> ConvertContext<'a> {
    pub fn new(endpoint: &'a dyn DeviceEndpoint, options: &'a dyn OptionsResolver) -> Self {
        Self { endpoint, options }
    }
}

/// Attribute frame to semantic state.
pub trait FromZigbee: Send + Sync {
    fn cluster(&self) -> ClusterId;

    /// Frame types this converter accepts.
    fn message_types(&self) -> &'static [MessageType] {
        &[MessageType::ReadResponse, MessageType::AttributeReport]
    }

    /// Convert a frame. Frames for another cluster yield `Ok(None)`.
    fn convert(&self, report: &AttributeReport) -> Result<Option<State>>;
}

/// Semantic command to device request.
#[async_trait]
pub trait ToZigbee: Send + Sync {
    /// Property keys handled by this converter.
    fn keys(&self) -> &'static [&'static str];

    /// Validate and send `value` for `key`. Returns the optimistic state, if any.
    async fn convert_set(
        &self,
        ctx: &ConvertContext<'_>,
        key: &str,
        value: &Value,
    ) -> Result<Option<SetResult>>;

    /// Request a refresh of `key`. The value arrives later as a read response.
    async fn convert_get(&self, ctx: &ConvertContext<'_>, key: &str) -> Result<()>;
}

/// Borrow `value` as a string or fail with an `InvalidType` error.
pub(crate) fn assert_string<'v>(value: &'v Value, key: &str) -> Result<&'v str> {
    value.as_str().ok_or_else(|| ConverterError::InvalidType {
        key: key.to_string(),
        expected: "string",
        got: json_type_name(value).to_string(),
    })
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
