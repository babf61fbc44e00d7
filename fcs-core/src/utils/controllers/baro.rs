//! Barometer sampling sequencer.
//!
//! The sensor cannot convert pressure and temperature at once. Each channel is
//! a separate conversion whose latency depends on the oversampling rate and is
//! reported by the driver when the conversion is started, so every iteration
//! runs two ordered phases: request, wait the reported time, read back.
//!
//! A session holds the bus for its whole run. Refused conversion requests are
//! transient; the iteration is skipped and counted in [`SessionStats`].

use core::{
    fmt,
    sync::atomic::{AtomicBool, Ordering},
};

use embedded_hal::{
    delay::DelayNs,
    i2c::{ErrorType, I2c},
};
use serde::{Deserialize, Serialize};

use crate::utils::{
    config::BaroConfig,
    controllers::i2c::{BusConfig, BusSession, BusTransport, ErrorFlags},
};

/// Measurement channel of a single conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Temperature,
    Pressure,
}

/// Oversampling rate of a conversion.
///
/// Serialized as the plain ratio (`256` .. `4096`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub enum Oversampling {
    Osr256,
    Osr512,
    Osr1024,
    Osr2048,
    Osr4096,
}

impl Oversampling {
    pub const fn ratio(self) -> u16 {
        match self {
            Oversampling::Osr256 => 256,
            Oversampling::Osr512 => 512,
            Oversampling::Osr1024 => 1024,
            Oversampling::Osr2048 => 2048,
            Oversampling::Osr4096 => 4096,
        }
    }

    /// Worst-case conversion time from the sensor datasheet, in microseconds.
    pub const fn max_conversion_us(self) -> u32 {
        match self {
            Oversampling::Osr256 => 600,
            Oversampling::Osr512 => 1_170,
            Oversampling::Osr1024 => 2_280,
            Oversampling::Osr2048 => 4_540,
            Oversampling::Osr4096 => 9_040,
        }
    }
}

impl From<Oversampling> for u16 {
    fn from(osr: Oversampling) -> Self {
        osr.ratio()
    }
}

/// Rejected oversampling ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unsupported oversampling ratio {0}")]
pub struct InvalidOversampling(pub u16);

impl TryFrom<u16> for Oversampling {
    type Error = InvalidOversampling;

    fn try_from(ratio: u16) -> Result<Self, Self::Error> {
        match ratio {
            256 => Ok(Oversampling::Osr256),
            512 => Ok(Oversampling::Osr512),
            1024 => Ok(Oversampling::Osr1024),
            2048 => Ok(Oversampling::Osr2048),
            4096 => Ok(Oversampling::Osr4096),
            other => Err(InvalidOversampling(other)),
        }
    }
}

/// Compensated pressure/temperature pair in sensor-native units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibratedReading {
    pub pressure: u32,
    pub temperature: i32,
}

impl fmt::Display for CalibratedReading {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "pressure: {}, temperature: {}",
            self.pressure, self.temperature
        )
    }
}

/// The sensor would not start a conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("conversion request refused")]
pub struct ConversionRefused;

/// Register-level barometer driver.
///
/// Implementations own the command encoding and the calibration math; the
/// sequencer only drives the conversion protocol.
pub trait Barometer<I2C: I2c> {
    /// Reset the device at `address` and load its calibration PROM.
    ///
    /// Later conversions talk to the same address. On failure returns the
    /// driver's diagnostic code.
    fn init(
        &mut self,
        bus: &mut I2C,
        address: u8,
    ) -> Result<(), i32>;

    /// Start a conversion and return how long it needs, in microseconds.
    fn start_conversion(
        &mut self,
        bus: &mut I2C,
        channel: Channel,
        oversampling: Oversampling,
    ) -> Result<u32, ConversionRefused>;

    /// Read the raw result of the last started conversion.
    fn read_conversion(
        &mut self,
        bus: &mut I2C,
    ) -> Result<u32, <I2C as ErrorType>::Error>;

    fn compute_reading(
        &self,
        raw_pressure: u32,
        raw_temperature: u32,
    ) -> CalibratedReading;
}

/// Errors surfaced by a sampling session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SampleError {
    /// The bus transport could not be configured. Fatal, nothing was acquired.
    #[error("bus init failed")]
    TransportInit,
    /// The barometer did not answer its probe. Fatal, the bus was released.
    #[error("device init failed: {code}, {flags}")]
    DeviceInit { code: i32, flags: ErrorFlags },
    /// Reading back a finished conversion failed. The session continues.
    #[error("reading {channel:?} conversion failed")]
    Read { channel: Channel },
}

/// Per-session counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    /// Iterations started, including skipped ones.
    pub iterations: u32,
    pub emitted: u32,
    /// Iterations abandoned because a conversion request was refused.
    pub skipped: u32,
    pub read_errors: u32,
}

/// Round a conversion time in microseconds up to whole milliseconds.
pub const fn conversion_wait_ms(wait_us: u32) -> u32 {
    wait_us.div_ceil(1000)
}

/// Open a sampling session on `transport`.
///
/// Starts the transport with `bus_config`, acquires the bus, probes the
/// barometer and waits the settle delay. The returned iterator runs up to
/// `config.iterations` conversion pairs lazily and tears the bus down when
/// dropped. Probe failures release the bus before returning.
pub fn run_sampling_session<'a, T, B, D>(
    transport: &'a mut T,
    barometer: &'a mut B,
    delay: &'a mut D,
    bus_config: &BusConfig,
    config: &BaroConfig,
) -> Result<Samples<'a, T, B, D>, SampleError>
where
    T: BusTransport,
    B: Barometer<T::Bus>,
    D: DelayNs,
{
    let mut session = BusSession::open(transport, bus_config).map_err(|error| {
        tracing::error!(?error, "i2c transport failed to start");
        SampleError::TransportInit
    })?;

    if let Err(code) = barometer.init(session.bus(), config.address) {
        let flags = session.error_flags();
        tracing::error!(code, %flags, address = config.address, "barometer probe failed");
        return Err(SampleError::DeviceInit { code, flags });
    }

    tracing::info!(
        iterations = config.iterations,
        osr = config.oversampling.ratio(),
        "barometer sampling started"
    );
    delay.delay_ms(config.settle_ms);

    Ok(Samples {
        session,
        barometer,
        delay,
        oversampling: config.oversampling,
        inter_sample_ms: config.inter_sample_ms,
        remaining: config.iterations,
        rest_pending: false,
        cancel: None,
        stats: SessionStats::default(),
    })
}

/// Lazy sequence of readings from an open sampling session.
///
/// Not restartable: the bus is released once the iterator is exhausted or
/// dropped.
pub struct Samples<'a, T, B, D>
where
    T: BusTransport,
    B: Barometer<T::Bus>,
    D: DelayNs,
{
    session: BusSession<'a, T>,
    barometer: &'a mut B,
    delay: &'a mut D,
    oversampling: Oversampling,
    inter_sample_ms: u32,
    remaining: u32,
    rest_pending: bool,
    cancel: Option<&'a AtomicBool>,
    stats: SessionStats,
}

impl<'a, T, B, D> Samples<'a, T, B, D>
where
    T: BusTransport,
    B: Barometer<T::Bus>,
    D: DelayNs,
{
    /// Stop at the next iteration boundary once `flag` is set.
    ///
    /// An in-flight conversion wait is never interrupted; the pending rest
    /// after the last reading is skipped.
    pub fn with_cancel(
        mut self,
        flag: &'a AtomicBool,
    ) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    /// One request/wait/read phase. `Ok(None)` when the request was refused.
    fn convert(
        &mut self,
        channel: Channel,
    ) -> Result<Option<u32>, SampleError> {
        let wait_us =
            match self
                .barometer
                .start_conversion(self.session.bus(), channel, self.oversampling)
            {
                Ok(wait_us) => wait_us,
                Err(ConversionRefused) => {
                    tracing::debug!(?channel, "conversion refused, skipping iteration");
                    return Ok(None);
                }
            };

        self.delay.delay_ms(conversion_wait_ms(wait_us));

        match self.barometer.read_conversion(self.session.bus()) {
            Ok(raw) => Ok(Some(raw)),
            Err(error) => {
                tracing::warn!(?channel, ?error, "conversion read failed");
                Err(SampleError::Read { channel })
            }
        }
    }

    /// Temperature then pressure. `Ok(None)` when either phase was refused.
    fn sample(&mut self) -> Result<Option<CalibratedReading>, SampleError> {
        let Some(raw_temperature) = self.convert(Channel::Temperature)? else {
            return Ok(None);
        };
        let Some(raw_pressure) = self.convert(Channel::Pressure)? else {
            return Ok(None);
        };
        Ok(Some(
            self.barometer
                .compute_reading(raw_pressure, raw_temperature),
        ))
    }
}

impl<T, B, D> Iterator for Samples<'_, T, B, D>
where
    T: BusTransport,
    B: Barometer<T::Bus>,
    D: DelayNs,
{
    type Item = Result<CalibratedReading, SampleError>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 {
            if self.cancelled() {
                tracing::info!(remaining = self.remaining, "barometer sampling cancelled");
                self.remaining = 0;
                self.rest_pending = false;
                return None;
            }
            if core::mem::take(&mut self.rest_pending) {
                self.delay.delay_ms(self.inter_sample_ms);
            }

            self.remaining -= 1;
            self.stats.iterations += 1;

            match self.sample() {
                Ok(Some(reading)) => {
                    self.stats.emitted += 1;
                    self.rest_pending = true;
                    return Some(Ok(reading));
                }
                Ok(None) => self.stats.skipped += 1,
                Err(error) => {
                    self.stats.read_errors += 1;
                    self.rest_pending = true;
                    return Some(Err(error));
                }
            }
        }
        // the last reading still gets its rest before the bus is released
        if core::mem::take(&mut self.rest_pending) {
            self.delay.delay_ms(self.inter_sample_ms);
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining as usize))
    }
}

impl<T, B, D> Drop for Samples<'_, T, B, D>
where
    T: BusTransport,
    B: Barometer<T::Bus>,
    D: DelayNs,
{
    fn drop(&mut self) {
        let SessionStats {
            iterations,
            emitted,
            skipped,
            read_errors,
        } = self.stats;
        tracing::info!(iterations, emitted, skipped, read_errors, "barometer sampling finished");
    }
}
