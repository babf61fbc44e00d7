//! I2C bus ownership for the debug shell.
//!
//! The physical bus is shared with the flight threads, so every shell command
//! that talks to a device opens a [`BusSession`]: the transport is started,
//! the bus is acquired, and both are undone when the session is dropped.

use core::{fmt, ops::BitOr};

use embedded_hal::i2c::I2c;
use serde::{Deserialize, Serialize};

/// Duty cycle policy of the bus clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DutyCycle {
    /// Standard mode, tlow/thigh = 2.
    Standard2,
    /// Fast mode, tlow/thigh = 2.
    Fast2,
    /// Fast mode, tlow/thigh = 16/9.
    Fast16By9,
}

/// Clock configuration handed to [`BusTransport::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Bus clock in Hz.
    pub clock_speed: u32,
    pub duty_cycle: DutyCycle,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            clock_speed: 400_000,
            duty_cycle: DutyCycle::Fast2,
        }
    }
}

/// Diagnostic error bits latched by the bus peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ErrorFlags(pub u32);

impl ErrorFlags {
    pub const NONE: Self = Self(0x00);
    pub const BUS_ERROR: Self = Self(0x01);
    pub const ARBITRATION_LOST: Self = Self(0x02);
    pub const ACK_FAILURE: Self = Self(0x04);
    pub const OVERRUN: Self = Self(0x08);
    pub const PEC_FAILURE: Self = Self(0x10);
    pub const TIMEOUT: Self = Self(0x20);
    pub const SMB_ALERT: Self = Self(0x40);

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub const fn contains(
        self,
        other: Self,
    ) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for ErrorFlags {
    type Output = Self;

    fn bitor(
        self,
        rhs: Self,
    ) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl fmt::Display for ErrorFlags {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Platform bus driver as seen by the shell.
///
/// `acquire` may block the calling thread until no other session owns the
/// bus. Callers should go through [`BusSession`] rather than pairing
/// `acquire`/`release` by hand.
pub trait BusTransport {
    /// Device-facing handle used for transactions while the bus is held.
    type Bus: I2c;
    type Error: fmt::Debug;

    fn start(
        &mut self,
        config: &BusConfig,
    ) -> Result<(), Self::Error>;
    fn stop(&mut self);
    fn acquire(&mut self);
    fn release(&mut self);
    fn bus(&mut self) -> &mut Self::Bus;
    /// Error bits latched since the transport was started.
    fn error_flags(&mut self) -> ErrorFlags;
}

/// Exclusive, scoped ownership of a started and acquired bus.
///
/// Dropping the session releases the bus and stops the transport, so every
/// early return in a command handler tears the bus down exactly once.
pub struct BusSession<'a, T: BusTransport> {
    transport: &'a mut T,
}

impl<'a, T: BusTransport> BusSession<'a, T> {
    /// Start the transport with `config` and take the bus.
    ///
    /// A transport that fails to start is not acquired and needs no teardown.
    pub fn open(
        transport: &'a mut T,
        config: &BusConfig,
    ) -> Result<Self, T::Error> {
        transport.start(config)?;
        transport.acquire();
        tracing::debug!(
            clock_speed = config.clock_speed,
            duty_cycle = ?config.duty_cycle,
            "i2c bus acquired"
        );
        Ok(Self { transport })
    }

    pub fn bus(&mut self) -> &mut T::Bus {
        self.transport.bus()
    }

    pub fn error_flags(&mut self) -> ErrorFlags {
        self.transport.error_flags()
    }
}

impl<T: BusTransport> Drop for BusSession<'_, T> {
    fn drop(&mut self) {
        self.transport.release();
        self.transport.stop();
        tracing::debug!("i2c bus released");
    }
}
