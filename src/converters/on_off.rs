//! On/Off switch state (`genOnOff`), without power-on behaviour.

use super::{ConvertContext, FromZigbee, SetResult, State, ToZigbee, assert_string};
use crate::clusters::{ClusterId, on_off};
use crate::device::{AttributeData, AttributeReport};
use crate::error::{ConverterError, Result};
use async_trait::async_trait;
use serde_json::Value;

pub const STATE_KEY: &str = "state";

const VALUE_ON: &str = "ON";
const VALUE_OFF: &str = "OFF";
const VALUE_TOGGLE: &str = "TOGGLE";

/// `onOff` attribute to `{"state": "ON" | "OFF"}`.
pub struct OnOffInput;

impl FromZigbee for OnOffInput {
    fn cluster(&self) -> ClusterId {
        ClusterId::OnOff
    }

    fn convert(&self, report: &AttributeReport) -> Result<Option<State>> {
        if report.cluster_id() != Some(ClusterId::OnOff) {
            return Ok(None);
        }

        // Reports for other attributes of the cluster carry no state.
        let Some(raw) = report.attribute(on_off::ON_OFF) else {
            return Ok(None);
        };

        let value = match raw {
            0 => VALUE_OFF,
            1 => VALUE_ON,
            other => {
                return Err(ConverterError::Decode {
                    cluster: ClusterId::OnOff,
                    attribute: on_off::ON_OFF,
                    reason: format!("{} is not a boolean", other),
                });
            }
        };
        Ok(Some(State::with(STATE_KEY, value)))
    }
}

/// `state` set/get to on/off/toggle commands and `onOff` reads.
pub struct OnOffOutput;

#[async_trait]
impl ToZigbee for OnOffOutput {
    fn keys(&self) -> &'static [&'static str] {
        &[STATE_KEY]
    }

    async fn convert_set(
        &self,
        ctx: &ConvertContext<'_>,
        key: &str,
        value: &Value,
    ) -> Result<Option<SetResult>> {
        let requested = assert_string(value, key)?.to_uppercase();
        let (command, state) = match requested.as_str() {
            VALUE_ON => (on_off::CMD_ON, Some(VALUE_ON)),
            VALUE_OFF => (on_off::CMD_OFF, Some(VALUE_OFF)),
            // The resulting state is only known once the device reports it.
            VALUE_TOGGLE => (on_off::CMD_TOGGLE, None),
            _ => {
                return Err(ConverterError::InvalidValue {
                    key: key.to_string(),
                    value: requested,
                    allowed: [VALUE_ON, VALUE_OFF, VALUE_TOGGLE].join(", "),
                });
            }
        };

        let options = ctx.options.resolve(ctx.endpoint);
        ctx.endpoint
            .command(ClusterId::OnOff, command, AttributeData::new(), &options)
            .await?;

        Ok(state.map(|value| SetResult {
            state: State::with(STATE_KEY, value),
        }))
    }

    async fn convert_get(&self, ctx: &ConvertContext<'_>, _key: &str) -> Result<()> {
        ctx.endpoint.read(ClusterId::OnOff, &[on_off::ON_OFF]).await?;
        Ok(())
    }
}
