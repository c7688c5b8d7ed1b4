//! The paired USB switch: endpoint abstraction, request options,
//! commissioning and the static device definition.

pub mod configure;
pub mod definition;
mod endpoint;
mod options;

pub use configure::{
    CHANNEL_ENDPOINT_ID, CommissioningState, ConfigurationSequencer, configure,
    configure_on_off, on_off_reporting, present_value_reporting,
};
pub use definition::{Access, Definition, Expose};
pub use endpoint::{
    AttributeData, AttributeReport, CoordinatorEndpoint, DeviceEndpoint, MessageType,
    ReportingPolicy,
};
pub use options::{DeviceOptions, OptionsResolver, StaticOptions};
