//! Commissioning: bind the multistate value cluster to the coordinator and
//! install its reporting policy, so channel changes arrive without polling.
//!
//! Both steps are idempotent on the device. A failed run is recovered by
//! running the whole sequence again. The on/off switch gets the same pair
//! of steps through [`configure_on_off`].

use super::endpoint::{CoordinatorEndpoint, DeviceEndpoint, ReportingPolicy};
use crate::clusters::{ClusterId, multistate_value, on_off};
use crate::error::{CommissioningStep, ConverterError, Result, TransportError};
use log::{error, info, warn};

/// Endpoint on the switch that carries the channel register.
pub const CHANNEL_ENDPOINT_ID: u8 = 10;

/// Report as soon as the value changes.
pub const MIN_REPORT_INTERVAL_SECS: u16 = 0;
/// Re-report at least hourly as a liveness heartbeat.
pub const MAX_REPORT_INTERVAL_SECS: u16 = 3600;
/// Every step of the discrete channel register is reportable.
pub const REPORTABLE_CHANGE: i64 = 1;

/// Reporting policy installed for `presentValue`.
pub fn present_value_reporting() -> ReportingPolicy {
    ReportingPolicy {
        attribute: multistate_value::PRESENT_VALUE.to_string(),
        minimum_report_interval: MIN_REPORT_INTERVAL_SECS,
        maximum_report_interval: MAX_REPORT_INTERVAL_SECS,
        reportable_change: REPORTABLE_CHANGE,
    }
}

/// Reporting policy installed for `onOff`.
pub fn on_off_reporting() -> ReportingPolicy {
    ReportingPolicy {
        attribute: on_off::ON_OFF.to_string(),
        minimum_report_interval: MIN_REPORT_INTERVAL_SECS,
        maximum_report_interval: MAX_REPORT_INTERVAL_SECS,
        reportable_change: REPORTABLE_CHANGE,
    }
}

/// Progress of a commissioning run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommissioningState {
    #[default]
    NotStarted,
    Bound,
    Configured,
    Failed,
}

impl CommissioningState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            CommissioningState::Configured | CommissioningState::Failed
        )
    }
}

/// Runs bind then configure-reporting, strictly in that order.
#[derive(Debug, Default)]
pub struct ConfigurationSequencer {
    state: CommissioningState,
}

impl ConfigurationSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> CommissioningState {
        self.state
    }

    /// Run the full sequence. Always starts from the first step.
    pub async fn run(
        &mut self,
        endpoint: &dyn DeviceEndpoint,
        coordinator: &CoordinatorEndpoint,
    ) -> Result<()> {
        self.state = CommissioningState::NotStarted;

        if endpoint.id() != CHANNEL_ENDPOINT_ID {
            warn!(
                "[Configure] Commissioning endpoint {}, channel register lives on endpoint {}",
                endpoint.id(),
                CHANNEL_ENDPOINT_ID
            );
        }

        info!(
            "[Configure] Binding {} on endpoint {} to coordinator {}",
            ClusterId::MultistateValue,
            endpoint.id(),
            coordinator
        );
        if let Err(source) = endpoint.bind(ClusterId::MultistateValue, coordinator).await {
            return Err(self.fail(CommissioningStep::Bind, source));
        }
        self.state = CommissioningState::Bound;

        let policy = present_value_reporting();
        info!(
            "[Configure] Configuring reporting for {} (min {}s, max {}s, change {})",
            policy.attribute,
            policy.minimum_report_interval,
            policy.maximum_report_interval,
            policy.reportable_change
        );
        if let Err(source) = endpoint
            .configure_reporting(ClusterId::MultistateValue, &policy)
            .await
        {
            return Err(self.fail(CommissioningStep::ConfigureReporting, source));
        }
        self.state = CommissioningState::Configured;

        info!("[Configure] Endpoint {} configured", endpoint.id());
        Ok(())
    }

    fn fail(&mut self, step: CommissioningStep, source: TransportError) -> ConverterError {
        self.state = CommissioningState::Failed;
        step_failed(step, source)
    }
}

/// Commissioning entry point, invoked once per pairing or reset.
pub async fn configure(
    endpoint: &dyn DeviceEndpoint,
    coordinator: &CoordinatorEndpoint,
) -> Result<()> {
    ConfigurationSequencer::new().run(endpoint, coordinator).await
}

/// Bind `genOnOff` and install its reporting policy, so switch changes are
/// reported like channel changes.
pub async fn configure_on_off(
    endpoint: &dyn DeviceEndpoint,
    coordinator: &CoordinatorEndpoint,
) -> Result<()> {
    info!(
        "[Configure] Binding {} on endpoint {} to coordinator {}",
        ClusterId::OnOff,
        endpoint.id(),
        coordinator
    );
    endpoint
        .bind(ClusterId::OnOff, coordinator)
        .await
        .map_err(|source| step_failed(CommissioningStep::Bind, source))?;

    endpoint
        .configure_reporting(ClusterId::OnOff, &on_off_reporting())
        .await
        .map_err(|source| step_failed(CommissioningStep::ConfigureReporting, source))?;

    info!("[Configure] {} reporting configured", ClusterId::OnOff);
    Ok(())
}

fn step_failed(step: CommissioningStep, source: TransportError) -> ConverterError {
    error!("[Configure] {} failed: {}", step, source);
    ConverterError::Commissioning { step, source }
}
