//! Module Exports
//!
//! Hardware-facing controllers used by the shell commands.
//!
//! - `i2c`: bus transport contract and scoped bus sessions
//! - `baro`: two-phase barometer sampling sequencer
//! - `gyro`: streaming of the latest gyro sample

/// Module for owning the shared I2C bus.
pub mod i2c;
pub mod baro;
pub mod gyro;

pub use baro::{Barometer, Channel, Oversampling};
pub use gyro::{shared_gyro, GyroSample, SharedGyro};
pub use i2c::{BusConfig, BusSession, BusTransport, ErrorFlags};
