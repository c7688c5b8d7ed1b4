//! USB channel selection, carried in the multistate value `presentValue`.

use super::{ConvertContext, FromZigbee, SetResult, State, ToZigbee, assert_string};
use crate::clusters::{ClusterId, multistate_value};
use crate::device::{AttributeData, AttributeReport};
use crate::error::{ConverterError, Result};
use async_trait::async_trait;
use log::debug;
use serde_json::Value;

pub const CHANNEL_KEY: &str = "channel";

/// Channel names in register order: `presentValue` 0 is `ch_1`.
pub const CHANNEL_VALUES: [&str; 2] = ["ch_1", "ch_2"];

pub const CHANNELS: ChannelMap<2> = ChannelMap::new(CHANNEL_VALUES);

/// Fixed bidirectional map between names and their position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMap<const N: usize> {
    names: [&'static str; N],
}

impl<const N: usize> ChannelMap<N> {
    /// Names must be unique.
    pub const fn new(names: [&'static str; N]) -> Self {
        Self { names }
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }

    pub fn names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn decode(&self, code: i64) -> Option<&'static str> {
        usize::try_from(code)
            .ok()
            .and_then(|index| self.names.get(index))
            .copied()
    }

    pub fn encode(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| *candidate == name)
    }
}

/// Register value to channel name.
pub fn decode_channel(present_value: i64) -> Result<&'static str> {
    CHANNELS
        .decode(present_value)
        .ok_or_else(|| ConverterError::Decode {
            cluster: ClusterId::MultistateValue,
            attribute: multistate_value::PRESENT_VALUE,
            reason: format!("value {} outside 0..{}", present_value, CHANNELS.len()),
        })
}

/// Channel name to register value.
pub fn encode_channel(name: &str) -> Result<usize> {
    CHANNELS
        .encode(name)
        .ok_or_else(|| ConverterError::InvalidValue {
            key: CHANNEL_KEY.to_string(),
            value: name.to_string(),
            allowed: CHANNELS.names().join(", "),
        })
}

/// Multistate value reports to `{"channel": ...}`.
pub struct MultistateChannelInput;

impl FromZigbee for MultistateChannelInput {
    fn cluster(&self) -> ClusterId {
        ClusterId::MultistateValue
    }

    fn convert(&self, report: &AttributeReport) -> Result<Option<State>> {
        if report.cluster_id() != Some(ClusterId::MultistateValue) {
            return Ok(None);
        }

        let present_value = report
            .attribute(multistate_value::PRESENT_VALUE)
            .ok_or_else(|| ConverterError::Decode {
                cluster: ClusterId::MultistateValue,
                attribute: multistate_value::PRESENT_VALUE,
                reason: "attribute missing from frame".to_string(),
            })?;

        let channel = decode_channel(present_value)?;
        Ok(Some(State::with(CHANNEL_KEY, channel)))
    }
}

/// `channel` set/get to multistate value write/read.
pub struct MultistateChannelOutput;

#[async_trait]
impl ToZigbee for MultistateChannelOutput {
    fn keys(&self) -> &'static [&'static str] {
        &[CHANNEL_KEY]
    }

    async fn convert_set(
        &self,
        ctx: &ConvertContext<'_>,
        key: &str,
        value: &Value,
    ) -> Result<Option<SetResult>> {
        let channel = assert_string(value, key)?;
        let index = encode_channel(channel)?;

        let options = ctx.options.resolve(ctx.endpoint);
        let attributes = AttributeData::from([(
            multistate_value::PRESENT_VALUE.to_string(),
            index as i64,
        )]);
        ctx.endpoint
            .write(ClusterId::MultistateValue, attributes, &options)
            .await?;

        debug!(
            "[Converter] Wrote presentValue={} ({}) to endpoint {}",
            index,
            channel,
            ctx.endpoint.id()
        );

        Ok(Some(SetResult {
            state: State::with(CHANNEL_KEY, channel),
        }))
    }

    async fn convert_get(&self, ctx: &ConvertContext<'_>, _key: &str) -> Result<()> {
        ctx.endpoint
            .read(
                ClusterId::MultistateValue,
                &[multistate_value::PRESENT_VALUE],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceOptions, MessageType, StaticOptions};
    use crate::error::TransportError;
    use crate::input::simulation::{EndpointCall, Operation, SimulatedEndpoint};
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    fn report(cluster: &str, present_value: i64) -> AttributeReport {
        AttributeReport {
            cluster: cluster.to_string(),
            kind: MessageType::AttributeReport,
            data: AttributeData::from([("presentValue".to_string(), present_value)]),
        }
    }

    #[test]
    fn test_decode_encode_every_channel() {
        for (index, name) in CHANNEL_VALUES.iter().enumerate() {
            assert_eq!(decode_channel(index as i64).unwrap(), *name);
            assert_eq!(encode_channel(name).unwrap(), index);
        }
    }

    #[test]
    fn test_channel_names_unique() {
        for (index, name) in CHANNELS.names().iter().enumerate() {
            assert_eq!(CHANNELS.encode(name), Some(index));
        }
    }

    #[test]
    fn test_decode_out_of_range() {
        for value in [-1, 2, 255, i64::MAX] {
            let err = decode_channel(value).unwrap_err();
            assert!(matches!(err, ConverterError::Decode { .. }));
        }
    }

    #[test]
    fn test_encode_unknown_name() {
        let err = encode_channel("ch_3").unwrap_err();
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Invalid value for 'channel': ch_3 (allowed: ch_1, ch_2)"
        );
    }

    #[test]
    fn test_report_decodes_to_channel() {
        let state = MultistateChannelInput
            .convert(&report("genMultistateValue", 0))
            .unwrap();
        assert_eq!(state, Some(State::with("channel", "ch_1")));
    }

    #[test]
    fn test_read_response_handled_like_report() {
        let mut frame = report("genMultistateValue", 1);
        frame.kind = MessageType::ReadResponse;
        let state = MultistateChannelInput.convert(&frame).unwrap();
        assert_eq!(state, Some(State::with("channel", "ch_2")));
    }

    #[test]
    fn test_other_cluster_ignored() {
        let state = MultistateChannelInput
            .convert(&report("genAnalogInput", 0))
            .unwrap();
        assert_eq!(state, None);
    }

    #[test]
    fn test_out_of_range_report_is_decode_error() {
        let result = MultistateChannelInput.convert(&report("genMultistateValue", 7));
        assert!(matches!(result, Err(ConverterError::Decode { .. })));
    }

    #[test]
    fn test_missing_present_value_is_decode_error() {
        let frame = AttributeReport::new(
            ClusterId::MultistateValue,
            MessageType::AttributeReport,
            AttributeData::new(),
        );
        assert!(matches!(
            MultistateChannelInput.convert(&frame),
            Err(ConverterError::Decode { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_writes_index_with_options() {
        let endpoint = SimulatedEndpoint::new(10);
        let options = DeviceOptions {
            disable_default_response: true,
            manufacturer_code: None,
            timeout_ms: Some(1500),
        };
        let resolver = StaticOptions::new(options.clone());
        let ctx = ConvertContext::new(&endpoint, &resolver);

        let result = MultistateChannelOutput
            .convert_set(&ctx, "channel", &json!("ch_2"))
            .await
            .unwrap();

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"state": {"channel": "ch_2"}})
        );
        assert_eq!(
            endpoint.calls(),
            vec![EndpointCall::Write {
                cluster: ClusterId::MultistateValue,
                attributes: AttributeData::from([("presentValue".to_string(), 1)]),
                options,
            }]
        );
    }

    #[tokio::test]
    async fn test_invalid_set_performs_no_write() {
        let endpoint = SimulatedEndpoint::new(10);
        let resolver = StaticOptions::default();
        let ctx = ConvertContext::new(&endpoint, &resolver);

        for value in [json!("ch_9"), json!(1), json!(null), json!(["ch_1"])] {
            let err = assert_err!(
                MultistateChannelOutput
                    .convert_set(&ctx, "channel", &value)
                    .await
            );
            assert!(err.is_validation(), "{value} should fail validation");
        }
        assert!(endpoint.calls().is_empty());
    }

    #[tokio::test]
    async fn test_set_transport_failure_propagates() {
        let endpoint = SimulatedEndpoint::new(10);
        endpoint.fail(Operation::Write, TransportError::Timeout(3000));
        let resolver = StaticOptions::default();
        let ctx = ConvertContext::new(&endpoint, &resolver);

        let err = assert_err!(
            MultistateChannelOutput
                .convert_set(&ctx, "channel", &json!("ch_1"))
                .await
        );
        assert!(matches!(
            err,
            ConverterError::Transport(TransportError::Timeout(3000))
        ));
        assert_eq!(endpoint.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_get_transport_failure_propagates() {
        let endpoint = SimulatedEndpoint::new(10);
        endpoint.fail(Operation::Read, TransportError::Timeout(3000));
        let resolver = StaticOptions::default();
        let ctx = ConvertContext::new(&endpoint, &resolver);

        let err = assert_err!(MultistateChannelOutput.convert_get(&ctx, "channel").await);
        assert!(matches!(
            err,
            ConverterError::Transport(TransportError::Timeout(3000))
        ));
    }

    #[tokio::test]
    async fn test_get_issues_read() {
        let endpoint = SimulatedEndpoint::new(10);
        let resolver = StaticOptions::default();
        let ctx = ConvertContext::new(&endpoint, &resolver);

        assert_ok!(MultistateChannelOutput.convert_get(&ctx, "channel").await);
        assert_eq!(
            endpoint.calls(),
            vec![EndpointCall::Read {
                cluster: ClusterId::MultistateValue,
                attributes: vec!["presentValue".to_string()],
            }]
        );
    }
}
