//! Identify trigger (`genIdentify`). Set-only.

use super::{ConvertContext, SetResult, ToZigbee};
use crate::clusters::{ClusterId, identify};
use crate::device::AttributeData;
use crate::error::{ConverterError, Result};
use async_trait::async_trait;
use log::info;
use serde_json::Value;

pub const IDENTIFY_KEY: &str = "identify";

pub const DEFAULT_IDENTIFY_TIMEOUT_SECS: u16 = 3;

pub struct IdentifyOutput {
    timeout_secs: u16,
}

impl IdentifyOutput {
    pub fn new(timeout_secs: u16) -> Self {
        Self { timeout_secs }
    }
}

impl Default for IdentifyOutput {
    fn default() -> Self {
        Self::new(DEFAULT_IDENTIFY_TIMEOUT_SECS)
    }
}

#[async_trait]
impl ToZigbee for IdentifyOutput {
    fn keys(&self) -> &'static [&'static str] {
        &[IDENTIFY_KEY]
    }

    async fn convert_set(
        &self,
        ctx: &ConvertContext<'_>,
        _key: &str,
        _value: &Value,
    ) -> Result<Option<SetResult>> {
        let options = ctx.options.resolve(ctx.endpoint);
        let payload = AttributeData::from([(
            identify::FIELD_IDENTIFY_TIME.to_string(),
            i64::from(self.timeout_secs),
        )]);
        ctx.endpoint
            .command(ClusterId::Identify, identify::CMD_IDENTIFY, payload, &options)
            .await?;

        info!(
            "[Converter] Endpoint {} identifying for {}s",
            ctx.endpoint.id(),
            self.timeout_secs
        );
        Ok(None)
    }

    async fn convert_get(&self, _ctx: &ConvertContext<'_>, key: &str) -> Result<()> {
        Err(ConverterError::UnsupportedOperation {
            key: key.to_string(),
            operation: "get",
        })
    }
}
