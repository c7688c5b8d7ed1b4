//! MQTT front end for the automation layer.
//!
//! Publishes translated device state and accepts set/get commands on
//! zigbee2mqtt-style topics.

mod client;
mod integration;

pub use client::{MqttClient, MqttMessage};
pub use integration::{MqttIntegration, Request};
