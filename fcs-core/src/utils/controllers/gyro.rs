//! Gyro streaming for the `gyro` shell command.
//!
//! The IMU thread publishes its latest rate sample into a [`SharedGyro`]; the
//! shell copies it out under the lock and prints it in milli-units.

use core::{cell::Cell, fmt};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};
use embedded_hal::delay::DelayNs;

use crate::utils::config::GyroConfig;

/// Latest angular rates, one per axis.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GyroSample {
    pub rate: [f32; 3],
}

impl GyroSample {
    /// Rates scaled by 1000 and truncated toward zero.
    pub fn milli_rates(&self) -> [i32; 3] {
        self.rate.map(|r| (1000.0 * r) as i32)
    }
}

/// Gyro sample shared between the IMU thread and the shell.
pub type SharedGyro = Mutex<CriticalSectionRawMutex, Cell<GyroSample>>;

/// A shared sample reading zero on every axis, usable in a `static`.
pub const fn shared_gyro() -> SharedGyro {
    Mutex::new(Cell::new(GyroSample { rate: [0.0; 3] }))
}

/// Overwrite the shared sample.
pub fn publish(
    shared: &SharedGyro,
    sample: GyroSample,
) {
    shared.lock(|cell| cell.set(sample));
}

/// Print `config.samples` lines of `gyro <x> <y> <z>`, one every `config.period_ms`.
pub fn stream_gyro<D, W>(
    shared: &SharedGyro,
    delay: &mut D,
    config: &GyroConfig,
    out: &mut W,
) -> fmt::Result
where
    D: DelayNs,
    W: fmt::Write,
{
    for _ in 0..config.samples {
        let [gx, gy, gz] = shared.lock(Cell::get).milli_rates();
        writeln!(out, "gyro {gx} {gy} {gz}")?;
        delay.delay_ms(config.period_ms);
    }
    Ok(())
}
