//! Runtime settings for the debug shell.
//!
//! Every field has a default matching the board's stock behaviour, so a
//! partial JSON document (or none at all) yields a usable configuration.

use serde::{Deserialize, Serialize};

use crate::utils::controllers::{baro::Oversampling, i2c::BusConfig};

/// Top-level shell configuration.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ShellConfig {
    pub bus: BusConfig,
    pub baro: BaroConfig,
    pub gyro: GyroConfig,
}

/// Settings for the `baro` sampling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaroConfig {
    /// Number of temperature/pressure iterations per session.
    pub iterations: u32,
    pub oversampling: Oversampling,
    /// 7-bit I2C address of the barometer.
    pub address: u8,
    /// Delay after a successful probe before the first conversion (ms).
    pub settle_ms: u32,
    /// Delay after each emitted reading (ms).
    pub inter_sample_ms: u32,
}

impl Default for BaroConfig {
    fn default() -> Self {
        Self {
            iterations: 50,
            oversampling: Oversampling::Osr4096,
            address: 0x77,
            settle_ms: 100,
            inter_sample_ms: 100,
        }
    }
}

/// Settings for the `gyro` streaming command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GyroConfig {
    pub samples: u32,
    pub period_ms: u32,
}

impl Default for GyroConfig {
    fn default() -> Self {
        Self {
            samples: 100,
            period_ms: 10,
        }
    }
}
