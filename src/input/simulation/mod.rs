//! Simulated USB switch for development and testing.
//!
//! Provides an in-memory device endpoint and a task that presses the
//! channel button periodically, like a user switching the USB hub by hand.

mod endpoint;

pub use endpoint::{EndpointCall, Operation, SimulatedEndpoint};

use log::info;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};

/// Spawn a task that cycles the channel every `period`.
///
/// # Returns
///
/// A `JoinHandle` that can be used to abort the simulation task.
pub fn run_button_simulation(endpoint: Arc<SimulatedEndpoint>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = interval(period);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            let channel = endpoint.cycle_channel();
            info!("[Sim] Channel button cycled to index {}", channel);
        }
    })
}
