//! Shell building blocks for the flight-controller debug console.
//!
//! - `config`: serde-backed runtime settings for every shell command
//! - `controllers`: I2C bus sessions, the barometer sequencer and gyro streaming
//! - `parameters`: the shared parameter store and its shell gateway
//! - `shell`: the command table and dispatcher tying it all together

pub mod config;
pub mod controllers;
pub mod parameters;
pub mod shell;

pub use config::ShellConfig;
pub use controllers::baro::{run_sampling_session, CalibratedReading, SampleError};
pub use parameters::{list_parameters, set_parameter, GatewayError, SharedParameters};
pub use shell::{Shell, ShellCommand};
