//! Device endpoint abstraction and the frames exchanged with it.
//!
//! The transport owns the real endpoint; converters only borrow a
//! `&dyn DeviceEndpoint` for the duration of one operation.

use super::options::DeviceOptions;
use crate::clusters::ClusterId;
use crate::error::TransportError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Attribute name to raw integer value.
pub type AttributeData = BTreeMap<String, i64>;

/// What triggered an incoming attribute frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MessageType {
    /// Answer to a read we issued.
    ReadResponse,
    /// Unsolicited report driven by the device's reporting configuration.
    AttributeReport,
}

/// Incoming attribute frame, e.g.
/// `{"cluster": "genMultistateValue", "type": "attributeReport", "data": {"presentValue": 1}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeReport {
    /// Cluster name as sent by the transport. May name a cluster we don't know.
    pub cluster: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    #[serde(default)]
    pub data: AttributeData,
}

impl AttributeReport {
    pub fn new(cluster: ClusterId, kind: MessageType, data: AttributeData) -> Self {
        Self {
            cluster: cluster.to_string(),
            kind,
            data,
        }
    }

    /// Resolve the cluster name, `None` if it is not one we handle.
    pub fn cluster_id(&self) -> Option<ClusterId> {
        ClusterId::from_str(&self.cluster).ok()
    }

    pub fn attribute(&self, name: &str) -> Option<i64> {
        self.data.get(name).copied()
    }
}

/// Reporting configuration installed on a device attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingPolicy {
    pub attribute: String,
    /// Seconds. 0 means no floor.
    pub minimum_report_interval: u16,
    /// Seconds. The device re-reports at least this often.
    pub maximum_report_interval: u16,
    pub reportable_change: i64,
}

/// Endpoint on the coordinator that receives bound reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CoordinatorEndpoint {
    pub ieee_address: u64,
    pub endpoint_id: u8,
}

impl fmt::Display for CoordinatorEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}/{}", self.ieee_address, self.endpoint_id)
    }
}

/// One addressable unit of a paired device.
///
/// All operations are request/response exchanges with the device and may fail
/// with a [`TransportError`]. Implementations decide timeouts and retries.
#[async_trait]
pub trait DeviceEndpoint: Send + Sync {
    /// Endpoint number on the device.
    fn id(&self) -> u8;

    async fn read(
        &self,
        cluster: ClusterId,
        attributes: &[&str],
    ) -> Result<AttributeData, TransportError>;

    async fn write(
        &self,
        cluster: ClusterId,
        attributes: AttributeData,
        options: &DeviceOptions,
    ) -> Result<(), TransportError>;

    async fn command(
        &self,
        cluster: ClusterId,
        command: &str,
        payload: AttributeData,
        options: &DeviceOptions,
    ) -> Result<(), TransportError>;

    async fn bind(
        &self,
        cluster: ClusterId,
        target: &CoordinatorEndpoint,
    ) -> Result<(), TransportError>;

    async fn configure_reporting(
        &self,
        cluster: ClusterId,
        policy: &ReportingPolicy,
    ) -> Result<(), TransportError>;
}
