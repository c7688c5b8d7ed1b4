//! In-memory stand-in for the USB switch's channel endpoint.
//!
//! Keeps the ZCL registers of endpoint 10, honours bindings and reporting
//! configuration the way the firmware does, and records every request so
//! tests can assert on ordering and payloads.

use crate::clusters::{ClusterId, identify, multistate_value, on_off, status};
use crate::converters::CHANNELS;
use crate::device::{
    AttributeData, AttributeReport, CoordinatorEndpoint, DeviceEndpoint, DeviceOptions,
    MessageType, ReportingPolicy,
};
use crate::error::TransportError;
use async_trait::async_trait;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc;

/// Device operation kinds, used for fault injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Read,
    Write,
    Command,
    Bind,
    ConfigureReporting,
}

/// A request received by the simulated endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointCall {
    Read {
        cluster: ClusterId,
        attributes: Vec<String>,
    },
    Write {
        cluster: ClusterId,
        attributes: AttributeData,
        options: DeviceOptions,
    },
    Command {
        cluster: ClusterId,
        command: String,
        payload: AttributeData,
        options: DeviceOptions,
    },
    Bind {
        cluster: ClusterId,
        target: CoordinatorEndpoint,
    },
    ConfigureReporting {
        cluster: ClusterId,
        policy: ReportingPolicy,
    },
}

type AttributeKey = (ClusterId, String);

struct Registers {
    attributes: HashMap<AttributeKey, i64>,
    bindings: Vec<(ClusterId, CoordinatorEndpoint)>,
    reporting: HashMap<AttributeKey, ReportingPolicy>,
    last_reported: HashMap<AttributeKey, i64>,
    calls: Vec<EndpointCall>,
    faults: HashMap<Operation, TransportError>,
}

impl Registers {
    fn new() -> Self {
        let attributes = HashMap::from([
            (
                key(ClusterId::MultistateValue, multistate_value::PRESENT_VALUE),
                0,
            ),
            (
                key(ClusterId::MultistateValue, multistate_value::NUMBER_OF_STATES),
                CHANNELS.len() as i64,
            ),
            (key(ClusterId::OnOff, on_off::ON_OFF), 0),
            (key(ClusterId::Identify, identify::IDENTIFY_TIME), 0),
        ]);

        Self {
            attributes,
            bindings: Vec::new(),
            reporting: HashMap::new(),
            last_reported: HashMap::new(),
            calls: Vec::new(),
            faults: HashMap::new(),
        }
    }

    fn check_fault(&self, operation: Operation) -> Result<(), TransportError> {
        match self.faults.get(&operation) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn is_bound(&self, cluster: ClusterId) -> bool {
        self.bindings.iter().any(|(bound, _)| *bound == cluster)
    }

    /// Validate a write against the register's constraints.
    fn check_write(&self, cluster: ClusterId, attribute: &str, value: i64) -> Result<(), u8> {
        if !self.attributes.contains_key(&key(cluster, attribute)) {
            return Err(status::UNSUPPORTED_ATTRIBUTE);
        }
        if cluster == ClusterId::MultistateValue && attribute == multistate_value::PRESENT_VALUE {
            let states = self
                .attributes
                .get(&key(cluster, multistate_value::NUMBER_OF_STATES))
                .copied()
                .unwrap_or(0);
            if !(0..states).contains(&value) {
                return Err(status::INVALID_VALUE);
            }
        }
        if cluster == ClusterId::OnOff
            && attribute == on_off::ON_OFF
            && !(0..=1).contains(&value)
        {
            return Err(status::INVALID_VALUE);
        }
        Ok(())
    }

    /// Store a value and decide whether it must be reported.
    fn update(&mut self, cluster: ClusterId, attribute: &str, value: i64) -> Option<(String, i64)> {
        let attr_key = key(cluster, attribute);
        self.attributes.insert(attr_key.clone(), value);

        if !self.is_bound(cluster) {
            return None;
        }
        let policy = self.reporting.get(&attr_key)?;
        let due = match self.last_reported.get(&attr_key) {
            Some(last) => value.abs_diff(*last) >= policy.reportable_change.unsigned_abs(),
            None => true,
        };
        if !due {
            return None;
        }
        self.last_reported.insert(attr_key, value);
        Some((attribute.to_string(), value))
    }
}

fn key(cluster: ClusterId, attribute: &str) -> AttributeKey {
    (cluster, attribute.to_string())
}

/// Simulated channel endpoint of the USB switch.
pub struct SimulatedEndpoint {
    id: u8,
    registers: Mutex<Registers>,
    reports: Option<mpsc::Sender<AttributeReport>>,
}

impl SimulatedEndpoint {
    /// Create an endpoint with factory-default registers and no bindings.
    pub fn new(id: u8) -> Self {
        Self {
            id,
            registers: Mutex::new(Registers::new()),
            reports: None,
        }
    }

    /// Deliver read responses and attribute reports to `tx`.
    pub fn with_report_channel(mut self, tx: mpsc::Sender<AttributeReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Make every subsequent `operation` fail with `err`.
    pub fn fail(&self, operation: Operation, err: TransportError) {
        self.registers.lock().faults.insert(operation, err);
    }

    pub fn clear_faults(&self) {
        self.registers.lock().faults.clear();
    }

    /// All requests received so far, in order.
    pub fn calls(&self) -> Vec<EndpointCall> {
        self.registers.lock().calls.clone()
    }

    pub fn bindings(&self) -> Vec<(ClusterId, CoordinatorEndpoint)> {
        self.registers.lock().bindings.clone()
    }

    pub fn reporting_policy(&self, cluster: ClusterId, attribute: &str) -> Option<ReportingPolicy> {
        self.registers
            .lock()
            .reporting
            .get(&key(cluster, attribute))
            .cloned()
    }

    pub fn attribute(&self, cluster: ClusterId, attribute: &str) -> Option<i64> {
        self.registers
            .lock()
            .attributes
            .get(&key(cluster, attribute))
            .copied()
    }

    /// Select a channel with the physical buttons. Reported if configured.
    pub fn select_channel_locally(&self, index: usize) {
        let Some(name) = CHANNELS.decode(index as i64) else {
            warn!("[Sim] No channel at index {}", index);
            return;
        };
        info!("[Sim] Channel button pressed, switching to {}", name);

        let report = self.registers.lock().update(
            ClusterId::MultistateValue,
            multistate_value::PRESENT_VALUE,
            index as i64,
        );
        if let Some((attribute, value)) = report {
            self.emit(ClusterId::MultistateValue, MessageType::AttributeReport, [(attribute, value)]);
        }
    }

    /// Switch to the next channel, wrapping around.
    pub fn cycle_channel(&self) -> usize {
        let current = self
            .attribute(ClusterId::MultistateValue, multistate_value::PRESENT_VALUE)
            .unwrap_or(0);
        let next = (current as usize + 1) % CHANNELS.len();
        self.select_channel_locally(next);
        next
    }

    fn emit(
        &self,
        cluster: ClusterId,
        kind: MessageType,
        data: impl IntoIterator<Item = (String, i64)>,
    ) {
        let Some(tx) = &self.reports else {
            return;
        };
        let report = AttributeReport::new(cluster, kind, data.into_iter().collect());
        debug!("[Sim] Emitting {:?}", report);
        if let Err(e) = tx.try_send(report) {
            warn!("[Sim] Dropping report: {}", e);
        }
    }
}

#[async_trait]
impl DeviceEndpoint for SimulatedEndpoint {
    fn id(&self) -> u8 {
        self.id
    }

    async fn read(
        &self,
        cluster: ClusterId,
        attributes: &[&str],
    ) -> Result<AttributeData, TransportError> {
        let data = {
            let mut registers = self.registers.lock();
            registers.calls.push(EndpointCall::Read {
                cluster,
                attributes: attributes.iter().map(|a| a.to_string()).collect(),
            });
            registers.check_fault(Operation::Read)?;

            let mut data = AttributeData::new();
            for attribute in attributes {
                let value = registers
                    .attributes
                    .get(&key(cluster, attribute))
                    .copied()
                    .ok_or(TransportError::Rejected {
                        cluster,
                        status: status::UNSUPPORTED_ATTRIBUTE,
                    })?;
                data.insert(attribute.to_string(), value);
            }
            data
        };

        self.emit(cluster, MessageType::ReadResponse, data.clone());
        Ok(data)
    }

    async fn write(
        &self,
        cluster: ClusterId,
        attributes: AttributeData,
        options: &DeviceOptions,
    ) -> Result<(), TransportError> {
        let reports = {
            let mut registers = self.registers.lock();
            registers.calls.push(EndpointCall::Write {
                cluster,
                attributes: attributes.clone(),
                options: options.clone(),
            });
            registers.check_fault(Operation::Write)?;

            // ZCL write is all-or-nothing for our purposes.
            for (attribute, value) in &attributes {
                registers
                    .check_write(cluster, attribute, *value)
                    .map_err(|status| TransportError::Rejected { cluster, status })?;
            }
            attributes
                .iter()
                .filter_map(|(attribute, value)| registers.update(cluster, attribute, *value))
                .collect::<Vec<_>>()
        };

        if !reports.is_empty() {
            self.emit(cluster, MessageType::AttributeReport, reports);
        }
        Ok(())
    }

    async fn command(
        &self,
        cluster: ClusterId,
        command: &str,
        payload: AttributeData,
        options: &DeviceOptions,
    ) -> Result<(), TransportError> {
        let reports = {
            let mut registers = self.registers.lock();
            registers.calls.push(EndpointCall::Command {
                cluster,
                command: command.to_string(),
                payload: payload.clone(),
                options: options.clone(),
            });
            registers.check_fault(Operation::Command)?;

            let current = registers
                .attributes
                .get(&key(ClusterId::OnOff, on_off::ON_OFF))
                .copied()
                .unwrap_or(0);
            let (attribute, value) = match (cluster, command) {
                (ClusterId::OnOff, on_off::CMD_ON) => (on_off::ON_OFF, 1),
                (ClusterId::OnOff, on_off::CMD_OFF) => (on_off::ON_OFF, 0),
                (ClusterId::OnOff, on_off::CMD_TOGGLE) => (on_off::ON_OFF, i64::from(current == 0)),
                (ClusterId::Identify, identify::CMD_IDENTIFY) => {
                    let seconds = payload
                        .get(identify::FIELD_IDENTIFY_TIME)
                        .copied()
                        .unwrap_or(0);
                    info!("[Sim] Identifying for {}s", seconds);
                    (identify::IDENTIFY_TIME, seconds)
                }
                _ => {
                    return Err(TransportError::Rejected {
                        cluster,
                        status: status::UNSUP_CLUSTER_COMMAND,
                    });
                }
            };
            registers.update(cluster, attribute, value)
        };

        if let Some(report) = reports {
            self.emit(cluster, MessageType::AttributeReport, [report]);
        }
        Ok(())
    }

    async fn bind(
        &self,
        cluster: ClusterId,
        target: &CoordinatorEndpoint,
    ) -> Result<(), TransportError> {
        let mut registers = self.registers.lock();
        registers.calls.push(EndpointCall::Bind {
            cluster,
            target: *target,
        });
        registers.check_fault(Operation::Bind)?;

        if !registers.bindings.contains(&(cluster, *target)) {
            registers.bindings.push((cluster, *target));
            debug!("[Sim] Bound {} to {}", cluster, target);
        }
        Ok(())
    }

    async fn configure_reporting(
        &self,
        cluster: ClusterId,
        policy: &ReportingPolicy,
    ) -> Result<(), TransportError> {
        let mut registers = self.registers.lock();
        registers.calls.push(EndpointCall::ConfigureReporting {
            cluster,
            policy: policy.clone(),
        });
        registers.check_fault(Operation::ConfigureReporting)?;

        let attr_key = key(cluster, &policy.attribute);
        if !registers.attributes.contains_key(&attr_key) {
            return Err(TransportError::Rejected {
                cluster,
                status: status::UNSUPPORTED_ATTRIBUTE,
            });
        }
        registers.reporting.insert(attr_key, policy.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{configure, present_value_reporting};

    const COORDINATOR: CoordinatorEndpoint = CoordinatorEndpoint {
        ieee_address: 0x00124b0001020304,
        endpoint_id: 1,
    };

    fn present_value(value: i64) -> AttributeData {
        AttributeData::from([("presentValue".to_string(), value)])
    }

    #[tokio::test]
    async fn test_no_reports_before_commissioning() {
        let (tx, mut rx) = mpsc::channel(8);
        let endpoint = SimulatedEndpoint::new(10).with_report_channel(tx);

        endpoint.select_channel_locally(1);
        assert!(rx.try_recv().is_err());
        assert_eq!(
            endpoint.attribute(ClusterId::MultistateValue, "presentValue"),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_reports_after_commissioning() {
        let (tx, mut rx) = mpsc::channel(8);
        let endpoint = SimulatedEndpoint::new(10).with_report_channel(tx);
        configure(&endpoint, &COORDINATOR).await.unwrap();

        endpoint.select_channel_locally(1);
        let report = rx.try_recv().unwrap();
        assert_eq!(report.kind, MessageType::AttributeReport);
        assert_eq!(report.cluster_id(), Some(ClusterId::MultistateValue));
        assert_eq!(report.attribute("presentValue"), Some(1));

        // Same value again is below the reportable change.
        endpoint.select_channel_locally(1);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_read_answers_with_read_response() {
        let (tx, mut rx) = mpsc::channel(8);
        let endpoint = SimulatedEndpoint::new(10).with_report_channel(tx);

        let data = endpoint
            .read(ClusterId::MultistateValue, &["presentValue"])
            .await
            .unwrap();
        assert_eq!(data, present_value(0));
        assert_eq!(rx.try_recv().unwrap().kind, MessageType::ReadResponse);
    }

    #[tokio::test]
    async fn test_write_out_of_range_rejected() {
        let endpoint = SimulatedEndpoint::new(10);
        let err = endpoint
            .write(
                ClusterId::MultistateValue,
                present_value(2),
                &DeviceOptions::default(),
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TransportError::Rejected {
                cluster: ClusterId::MultistateValue,
                status: 0x87,
            }
        );
        assert_eq!(
            endpoint.attribute(ClusterId::MultistateValue, "presentValue"),
            Some(0)
        );
    }

    #[tokio::test]
    async fn test_unknown_command_rejected() {
        let endpoint = SimulatedEndpoint::new(10);
        let result = endpoint
            .command(
                ClusterId::OnOff,
                "offWithEffect",
                AttributeData::new(),
                &DeviceOptions::default(),
            )
            .await;
        assert!(matches!(
            result,
            Err(TransportError::Rejected { status: 0x81, .. })
        ));
    }

    #[tokio::test]
    async fn test_reporting_for_unknown_attribute_rejected() {
        let endpoint = SimulatedEndpoint::new(10);
        let mut policy = present_value_reporting();
        policy.attribute = "outOfService".to_string();
        assert!(
            endpoint
                .configure_reporting(ClusterId::MultistateValue, &policy)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_write_on_off_outside_boolean_rejected() {
        let endpoint = SimulatedEndpoint::new(10);
        for value in [2, -1, i64::MIN, i64::MAX] {
            let err = endpoint
                .write(
                    ClusterId::OnOff,
                    AttributeData::from([("onOff".to_string(), value)]),
                    &DeviceOptions::default(),
                )
                .await
                .unwrap_err();
            assert_eq!(
                err,
                TransportError::Rejected {
                    cluster: ClusterId::OnOff,
                    status: 0x87,
                }
            );
        }
        assert_eq!(endpoint.attribute(ClusterId::OnOff, "onOff"), Some(0));

        endpoint
            .command(
                ClusterId::OnOff,
                "toggle",
                AttributeData::new(),
                &DeviceOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(endpoint.attribute(ClusterId::OnOff, "onOff"), Some(1));
    }

    #[tokio::test]
    async fn test_large_jumps_do_not_overflow_reportable_change() {
        let (tx, mut rx) = mpsc::channel(8);
        let endpoint = SimulatedEndpoint::new(10).with_report_channel(tx);
        endpoint.bind(ClusterId::Identify, &COORDINATOR).await.unwrap();
        endpoint
            .configure_reporting(
                ClusterId::Identify,
                &ReportingPolicy {
                    attribute: "identifyTime".to_string(),
                    minimum_report_interval: 0,
                    maximum_report_interval: 3600,
                    reportable_change: 1,
                },
            )
            .await
            .unwrap();

        for seconds in [i64::MIN, i64::MAX] {
            endpoint
                .command(
                    ClusterId::Identify,
                    "identify",
                    AttributeData::from([("identifytime".to_string(), seconds)]),
                    &DeviceOptions::default(),
                )
                .await
                .unwrap();
            assert_eq!(rx.try_recv().unwrap().attribute("identifyTime"), Some(seconds));
        }
    }

    #[test]
    fn test_cycle_channel_wraps() {
        let endpoint = SimulatedEndpoint::new(10);
        assert_eq!(endpoint.cycle_channel(), 1);
        assert_eq!(endpoint.cycle_channel(), 0);
    }
}
