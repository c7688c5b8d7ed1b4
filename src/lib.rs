//! Zigbee converter for the KONQI homebrew USB switch.
//!
//! Translates the switch's multistate value register into a named `channel`
//! state and back, and commissions the device so channel changes are
//! reported without polling.

pub mod clusters;
pub mod config;
pub mod converters;
pub mod device;
pub mod error;
pub mod input;
