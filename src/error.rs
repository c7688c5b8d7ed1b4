use crate::clusters::ClusterId;
use std::fmt;
use thiserror::Error as ThisError;

/// Failure reported by the transport carrying an exchange with the device.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Device did not respond within {0} ms")]
    Timeout(u64),

    #[error("Device endpoint {0} is not reachable")]
    Disconnected(u8),

    #[error("Device rejected request on {cluster} (status 0x{status:02X})")]
    Rejected { cluster: ClusterId, status: u8 },

    #[error("Operation not supported by endpoint: {0}")]
    Unsupported(String),
}

/// Step of the commissioning sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommissioningStep {
    Bind,
    ConfigureReporting,
}

impl fmt::Display for CommissioningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommissioningStep::Bind => write!(f, "bind"),
            CommissioningStep::ConfigureReporting => write!(f, "configure reporting"),
        }
    }
}

#[derive(ThisError, Debug)]
pub enum ConverterError {
    #[error("Failed to decode {attribute} on {cluster}: {reason}")]
    Decode {
        cluster: ClusterId,
        attribute: &'static str,
        reason: String,
    },

    #[error("Invalid type for '{key}': expected {expected}, got {got}")]
    InvalidType {
        key: String,
        expected: &'static str,
        got: String,
    },

    #[error("Invalid value for '{key}': {value} (allowed: {allowed})")]
    InvalidValue {
        key: String,
        value: String,
        allowed: String,
    },

    #[error("No converter handles key '{0}'")]
    UnknownKey(String),

    #[error("'{key}' does not support {operation}")]
    UnsupportedOperation {
        key: String,
        operation: &'static str,
    },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Commissioning failed at {step}: {source}")]
    Commissioning {
        step: CommissioningStep,
        #[source]
        source: TransportError,
    },

    #[error(transparent)]
    Mqtt(#[from] rumqttc::ClientError),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

impl ConverterError {
    /// True for errors raised while validating caller input, before any device I/O.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ConverterError::InvalidType { .. } | ConverterError::InvalidValue { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, ConverterError>;
