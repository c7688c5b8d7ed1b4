//! Sources feeding the converters.
//!
//! - `mqtt`: set/get commands from the automation layer, state publishing
//! - `simulation`: in-memory USB switch standing in for the Zigbee transport

pub mod mqtt;
pub mod simulation;
