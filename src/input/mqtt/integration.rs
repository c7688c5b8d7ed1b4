//! MQTT integration: exposes the USB switch to the automation layer using
//! zigbee2mqtt-style topics.
//!
//! - `<base>/<name>` carries published state
//! - `<base>/<name>/set` takes `{"channel": "ch_2"}`, `<base>/<name>/set/channel` a bare value
//! - `<base>/<name>/get` takes `{"channel": ""}`, `<base>/<name>/get/channel` anything

use super::client::{MqttClient, MqttMessage};
use crate::config::MqttConfig;
use crate::converters::{ConvertContext, State};
use crate::device::{AttributeReport, Definition, DeviceEndpoint, OptionsResolver};
use crate::error::Result;
use log::{debug, info, warn};
use rumqttc::{AsyncClient, QoS};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Command topic kinds. The key is set when it is part of the topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Set(Option<String>),
    Get(Option<String>),
}

/// Bridges one device between MQTT and its converters.
pub struct MqttIntegration {
    config: MqttConfig,
    friendly_name: String,
    definition: Arc<Definition>,
    endpoint: Arc<dyn DeviceEndpoint>,
    options: Arc<dyn OptionsResolver>,
    reports: Option<mpsc::Receiver<AttributeReport>>,
}

impl MqttIntegration {
    pub fn new(
        config: MqttConfig,
        friendly_name: impl Into<String>,
        definition: Arc<Definition>,
        endpoint: Arc<dyn DeviceEndpoint>,
        options: Arc<dyn OptionsResolver>,
    ) -> Self {
        Self {
            config,
            friendly_name: friendly_name.into(),
            definition,
            endpoint,
            options,
            reports: None,
        }
    }

    /// Attribute frames from the transport to translate and publish.
    pub fn with_reports(mut self, rx: mpsc::Receiver<AttributeReport>) -> Self {
        self.reports = Some(rx);
        self
    }

    pub fn state_topic(&self) -> String {
        format!("{}/{}", self.config.base_topic, self.friendly_name)
    }

    fn subscribe_topics(&self) -> Vec<String> {
        let state_topic = self.state_topic();
        vec![
            format!("{}/set", state_topic),
            format!("{}/set/+", state_topic),
            format!("{}/get", state_topic),
            format!("{}/get/+", state_topic),
        ]
    }

    /// Classify a command topic, `None` if it isn't one of ours.
    pub fn route(&self, topic: &str) -> Option<Request> {
        let rest = topic
            .strip_prefix(self.state_topic().as_str())?
            .strip_prefix('/')?;
        match rest.split_once('/') {
            None if rest == "set" => Some(Request::Set(None)),
            None if rest == "get" => Some(Request::Get(None)),
            Some(("set", key)) => Some(Request::Set(Some(key.to_string()))),
            Some(("get", key)) => Some(Request::Get(Some(key.to_string()))),
            _ => None,
        }
    }

    /// Run a set or get request. Returns the state to publish, if any.
    ///
    /// Failures of individual keys are logged and don't stop the other keys.
    pub async fn handle_request(&self, request: Request, payload: &str) -> Option<State> {
        let ctx = ConvertContext::new(self.endpoint.as_ref(), self.options.as_ref());

        match request {
            Request::Set(key) => {
                let entries = match parse_payload(key, payload) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!("[MQTT] Ignoring set for {}: {}", self.friendly_name, e);
                        return None;
                    }
                };

                let mut state = State::new();
                for (key, value) in entries {
                    match self.definition.convert_set(&ctx, &key, &value).await {
                        Ok(Some(result)) => state.merge(result.state),
                        Ok(None) => {}
                        Err(e) => warn!("[MQTT] Set {} on {} failed: {}", key, self.friendly_name, e),
                    }
                }
                (!state.is_empty()).then_some(state)
            }
            Request::Get(key) => {
                let entries = match parse_payload(key, payload) {
                    Ok(entries) => entries,
                    Err(e) => {
                        warn!("[MQTT] Ignoring get for {}: {}", self.friendly_name, e);
                        return None;
                    }
                };

                for (key, _) in entries {
                    if let Err(e) = self.definition.convert_get(&ctx, &key).await {
                        warn!("[MQTT] Get {} on {} failed: {}", key, self.friendly_name, e);
                    }
                }
                None
            }
        }
    }

    /// Start the integration in a background task.
    ///
    /// Returns a JoinHandle that can be used to abort the task on shutdown.
    pub fn start(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(mut self) {
        info!(
            "[MQTT] Connecting to {}:{}",
            self.config.broker_host, self.config.broker_port
        );

        let mqtt_client = MqttClient::new(&self.config);
        let client = mqtt_client.client();

        let (msg_tx, mut msg_rx) = mpsc::channel::<MqttMessage>(64);
        let (connected_tx, connected_rx) = oneshot::channel();

        let mqtt_loop = tokio::spawn(async move {
            mqtt_client.run(msg_tx, Some(connected_tx)).await;
        });

        match tokio::time::timeout(Duration::from_secs(10), connected_rx).await {
            Ok(Ok(())) => {
                info!("[MQTT] Connection established, subscribing to topics");
            }
            Ok(Err(_)) => {
                warn!("[MQTT] Connection signal channel dropped");
                return;
            }
            Err(_) => {
                warn!("[MQTT] Connection timeout after 10 seconds");
                mqtt_loop.abort();
                return;
            }
        }

        for topic in self.subscribe_topics() {
            if let Err(e) = client.subscribe(&topic, QoS::AtLeastOnce).await {
                warn!("[MQTT] Failed to subscribe to {}: {:?}", topic, e);
            }
        }

        // Ask the device for its current state; answers arrive as read responses.
        self.handle_request(Request::Get(None), r#"{"channel": "", "state": ""}"#)
            .await;

        info!("[MQTT] Integration started for {}", self.friendly_name);

        let mut reports = self.reports.take();
        let state_topic = self.state_topic();
        loop {
            tokio::select! {
                msg = msg_rx.recv() => {
                    let Some(msg) = msg else {
                        break;
                    };
                    let Some(request) = self.route(&msg.topic) else {
                        debug!("[MQTT] Ignoring message on {}", msg.topic);
                        continue;
                    };
                    if let Some(state) = self.handle_request(request, &msg.payload).await
                        && let Err(e) = publish_state(&client, &state_topic, &state).await
                    {
                        warn!("[MQTT] Failed to publish state: {}", e);
                    }
                }
                Some(report) = next_report(&mut reports) => {
                    if let Some(state) = self.definition.process_report(&report)
                        && let Err(e) = publish_state(&client, &state_topic, &state).await
                    {
                        warn!("[MQTT] Failed to publish state: {}", e);
                    }
                }
            }
        }

        mqtt_loop.abort();
    }
}

/// Entries of a command payload. A key from the topic takes the whole
/// payload as its value; bare strings need no JSON quoting.
fn parse_payload(key: Option<String>, payload: &str) -> Result<Vec<(String, Value)>> {
    match key {
        Some(key) => {
            let value = serde_json::from_str(payload)
                .unwrap_or_else(|_| Value::String(payload.trim().to_string()));
            Ok(vec![(key, value)])
        }
        None => {
            let entries: serde_json::Map<String, Value> = serde_json::from_str(payload)?;
            Ok(entries.into_iter().collect())
        }
    }
}

async fn next_report(
    reports: &mut Option<mpsc::Receiver<AttributeReport>>,
) -> Option<AttributeReport> {
    match reports {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn publish_state(client: &AsyncClient, topic: &str, state: &State) -> Result<()> {
    let payload = serde_json::to_string(state)?;
    debug!("[MQTT] Publishing to {}: {}", topic, payload);
    client
        .publish(topic, QoS::AtLeastOnce, false, payload.into_bytes())
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clusters::ClusterId;
    use crate::config::Config;
    use crate::converters::DEFAULT_IDENTIFY_TIMEOUT_SECS;
    use crate::device::{MessageType, StaticOptions};
    use crate::input::simulation::{EndpointCall, SimulatedEndpoint};

    fn integration(endpoint: Arc<SimulatedEndpoint>) -> MqttIntegration {
        MqttIntegration::new(
            Config::default().mqtt,
            "desk-usb",
            Arc::new(Definition::usb_switch(DEFAULT_IDENTIFY_TIMEOUT_SECS)),
            endpoint,
            Arc::new(StaticOptions::default()),
        )
    }

    #[test]
    fn test_route() {
        let integration = integration(Arc::new(SimulatedEndpoint::new(10)));
        assert_eq!(integration.state_topic(), "zigbee2mqtt/desk-usb");
        assert_eq!(
            integration.route("zigbee2mqtt/desk-usb/set"),
            Some(Request::Set(None))
        );
        assert_eq!(
            integration.route("zigbee2mqtt/desk-usb/get/channel"),
            Some(Request::Get(Some("channel".to_string())))
        );
        assert_eq!(integration.route("zigbee2mqtt/desk-usb"), None);
        assert_eq!(integration.route("zigbee2mqtt/desk-usb-2/set"), None);
        assert_eq!(integration.route("zigbee2mqtt/other/set"), None);
    }

    #[tokio::test]
    async fn test_set_publishes_optimistic_state() {
        let endpoint = Arc::new(SimulatedEndpoint::new(10));
        let integration = integration(endpoint.clone());

        let state = integration
            .handle_request(Request::Set(None), r#"{"channel": "ch_2", "state": "ON"}"#)
            .await
            .unwrap();
        assert_eq!(state.get("channel"), Some("ch_2"));
        assert_eq!(state.get("state"), Some("ON"));
        assert_eq!(
            endpoint.attribute(ClusterId::MultistateValue, "presentValue"),
            Some(1)
        );
    }

    #[tokio::test]
    async fn test_set_with_key_topic_accepts_bare_value() {
        let endpoint = Arc::new(SimulatedEndpoint::new(10));
        let integration = integration(endpoint.clone());

        let state = integration
            .handle_request(Request::Set(Some("channel".to_string())), "ch_2")
            .await;
        assert_eq!(state, Some(State::with("channel", "ch_2")));
    }

    #[tokio::test]
    async fn test_invalid_set_skips_write_but_keeps_other_keys() {
        let endpoint = Arc::new(SimulatedEndpoint::new(10));
        let integration = integration(endpoint.clone());

        let state = integration
            .handle_request(Request::Set(None), r#"{"channel": "ch_7", "state": "OFF"}"#)
            .await;
        assert_eq!(state, Some(State::with("state", "OFF")));
        assert!(
            !endpoint
                .calls()
                .iter()
                .any(|call| matches!(call, EndpointCall::Write { .. }))
        );
    }

    #[tokio::test]
    async fn test_malformed_payload_ignored() {
        let endpoint = Arc::new(SimulatedEndpoint::new(10));
        let integration = integration(endpoint.clone());

        assert_eq!(
            integration
                .handle_request(Request::Set(None), "ch_2")
                .await,
            None
        );
        assert!(endpoint.calls().is_empty());
    }

    #[tokio::test]
    async fn test_get_result_arrives_as_read_response() {
        let (tx, mut rx) = mpsc::channel(8);
        let endpoint = Arc::new(SimulatedEndpoint::new(10).with_report_channel(tx));
        endpoint.select_channel_locally(1);
        let integration = integration(endpoint.clone());

        let state = integration
            .handle_request(Request::Get(None), r#"{"channel": ""}"#)
            .await;
        assert_eq!(state, None);

        let report = rx.recv().await.unwrap();
        assert_eq!(report.kind, MessageType::ReadResponse);
        assert_eq!(
            integration.definition.process_report(&report),
            Some(State::with("channel", "ch_2"))
        );
    }
}
