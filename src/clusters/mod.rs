//! ZCL cluster identifiers, attribute names and commands used by the USB switch.
//!
//! Cluster names follow the zigbee2mqtt naming (`genMultistateValue`, ...)
//! since that is how attribute reports identify their cluster.

use strum::{AsRefStr, Display, EnumString};

/// Clusters exposed on the switch endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
pub enum ClusterId {
    #[strum(serialize = "genIdentify")]
    Identify,
    #[strum(serialize = "genOnOff")]
    OnOff,
    #[strum(serialize = "genMultistateValue")]
    MultistateValue,
}

impl ClusterId {
    /// Numeric ZCL cluster id.
    pub const fn id(self) -> u16 {
        match self {
            ClusterId::Identify => 0x0003,
            ClusterId::OnOff => 0x0006,
            ClusterId::MultistateValue => 0x0012,
        }
    }
}

/// Multistate Value (0x0012) attributes.
pub mod multistate_value {
    pub const PRESENT_VALUE: &str = "presentValue";
    pub const NUMBER_OF_STATES: &str = "numberOfStates";
}

/// On/Off (0x0006) attribute and commands.
pub mod on_off {
    pub const ON_OFF: &str = "onOff";
    pub const CMD_OFF: &str = "off";
    pub const CMD_ON: &str = "on";
    pub const CMD_TOGGLE: &str = "toggle";
}

/// Identify (0x0003) attribute and command.
pub mod identify {
    pub const IDENTIFY_TIME: &str = "identifyTime";
    pub const CMD_IDENTIFY: &str = "identify";
    /// Payload field of the identify command, in seconds.
    pub const FIELD_IDENTIFY_TIME: &str = "identifytime";
}

/// ZCL status codes surfaced by devices when rejecting a request.
pub mod status {
    pub const UNSUP_CLUSTER_COMMAND: u8 = 0x81;
    pub const UNSUPPORTED_ATTRIBUTE: u8 = 0x86;
    pub const INVALID_VALUE: u8 = 0x87;
}
