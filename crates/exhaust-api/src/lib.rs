// exhaust-api: Async Rust client for the relay modules behind the exhaust fans

pub mod client;
pub mod command;
pub mod error;
pub mod transport;

pub use client::DeviceClient;
pub use command::{DeviceCommand, PowerState, pulse_time_values};
pub use error::Error;
pub use transport::TransportConfig;
