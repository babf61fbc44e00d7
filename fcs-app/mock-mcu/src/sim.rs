//! Simulated board hardware for running the shell on a host.
//!
//! - [`SimTransport`]: an I2C peripheral whose bus is arbitrated between
//!   threads by a [`BusArbiter`]
//! - [`SimI2c`]: the wire, with an MS5611-like barometer model attached
//! - [`SimBarometer`]: driver speaking that model's command set
//! - [`spawn_imu`]: a thread sampling the IMU over the same bus

use std::{
    fmt,
    num::NonZeroU32,
    sync::{Arc, Condvar, Mutex, PoisonError},
    thread,
    time::{Duration, Instant},
};

use embedded_hal::i2c::{ErrorKind, ErrorType, I2c, NoAcknowledgeSource, Operation};
use fcs_core::utils::controllers::{
    baro::{Barometer, CalibratedReading, Channel, ConversionRefused, Oversampling},
    gyro::{publish, GyroSample, SharedGyro},
    i2c::{BusConfig, BusTransport, ErrorFlags},
};
use tracing::{debug, trace};

const CMD_RESET: u8 = 0x1E;
const CMD_ADC_READ: u8 = 0x00;
const CMD_CONVERT_PRESSURE: u8 = 0x40;
const CMD_CONVERT_TEMPERATURE: u8 = 0x50;

/// Raw counts the model reports at 20.00 degC and 1013.25 mbar.
const RAW_TEMPERATURE_REF: u32 = 8_077_636;
const RAW_PRESSURE_REF: u32 = 9_085_466;

/// Blocking, process-wide ownership of one simulated bus.
#[derive(Default)]
pub struct BusArbiter {
    held: Mutex<bool>,
    freed: Condvar,
}

impl BusArbiter {
    pub fn lock(&self) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        while *held {
            held = self
                .freed
                .wait(held)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *held = true;
    }

    pub fn unlock(&self) {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner) = false;
        self.freed.notify_one();
    }

    #[cfg(test)]
    fn is_held(&self) -> bool {
        *self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// MS5611-like device model living on the simulated wire.
#[derive(Debug, Default)]
struct BaroModel {
    adc: u32,
    conversions: u32,
}

impl BaroModel {
    fn command(
        &mut self,
        cmd: u8,
    ) -> Result<(), ErrorKind> {
        // drift so consecutive readings differ
        let drift = self.conversions % 64;
        match cmd & 0xF0 {
            _ if cmd == CMD_RESET => self.adc = 0,
            CMD_CONVERT_TEMPERATURE => {
                self.conversions += 1;
                self.adc = RAW_TEMPERATURE_REF + drift * 40;
            }
            CMD_CONVERT_PRESSURE => {
                self.conversions += 1;
                self.adc = RAW_PRESSURE_REF - drift * 90;
            }
            _ => return Err(ErrorKind::Other),
        }
        Ok(())
    }

    fn read(
        &self,
        cmd: u8,
        buf: &mut [u8],
    ) -> Result<(), ErrorKind> {
        if cmd != CMD_ADC_READ || buf.len() != 3 {
            return Err(ErrorKind::Other);
        }
        buf.copy_from_slice(&self.adc.to_be_bytes()[1..]);
        Ok(())
    }
}

/// The simulated wire. Only the barometer answers; every other address NAKs.
pub struct SimI2c {
    baro_address: Option<u8>,
    model: BaroModel,
    errors: ErrorFlags,
}

impl SimI2c {
    /// A bus with the barometer at `baro_address`, or no device at all.
    pub fn new(baro_address: Option<u8>) -> Self {
        Self {
            baro_address,
            model: BaroModel::default(),
            errors: ErrorFlags::NONE,
        }
    }
}

impl ErrorType for SimI2c {
    type Error = ErrorKind;
}

impl I2c for SimI2c {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if self.baro_address != Some(address) {
            self.errors = self.errors | ErrorFlags::ACK_FAILURE;
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }

        let mut last_cmd = None;
        for op in operations.iter_mut() {
            match op {
                Operation::Write(bytes) => {
                    trace!(address, ?bytes, "i2c write");
                    if let [cmd] = bytes {
                        last_cmd = Some(*cmd);
                    }
                }
                Operation::Read(buf) => {
                    let cmd = last_cmd.take().ok_or(ErrorKind::Other)?;
                    return self.model.read(cmd, buf);
                }
            }
        }
        match last_cmd {
            Some(cmd) => self.model.command(cmd),
            None => Ok(()),
        }
    }
}

/// I2C peripheral of the simulated board.
pub struct SimTransport {
    arbiter: Arc<BusArbiter>,
    bus: SimI2c,
    running: Option<BusConfig>,
    held: bool,
}

impl SimTransport {
    pub fn new(
        arbiter: Arc<BusArbiter>,
        bus: SimI2c,
    ) -> Self {
        Self {
            arbiter,
            bus,
            running: None,
            held: false,
        }
    }
}

/// The simulated peripheral only clocks standard (100 kHz) and fast (400 kHz) mode.
#[derive(Debug)]
pub struct UnsupportedClock(pub u32);

impl fmt::Display for UnsupportedClock {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "unsupported i2c clock {} Hz", self.0)
    }
}

impl BusTransport for SimTransport {
    type Bus = SimI2c;
    type Error = UnsupportedClock;

    fn start(
        &mut self,
        config: &BusConfig,
    ) -> Result<(), Self::Error> {
        if config.clock_speed > 400_000 {
            let error = UnsupportedClock(config.clock_speed);
            debug!(%error, "i2c peripheral not started");
            return Err(error);
        }
        self.bus.errors = ErrorFlags::NONE;
        self.running = Some(*config);
        debug!(?config, "i2c peripheral started");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(config) = self.running.take() {
            debug!(clock_speed = config.clock_speed, "i2c peripheral stopped");
        }
    }

    fn acquire(&mut self) {
        let waited = Instant::now();
        self.arbiter.lock();
        self.held = true;
        trace!(waited_us = waited.elapsed().as_micros() as u64, "bus acquired");
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.held) {
            self.arbiter.unlock();
        }
    }

    fn bus(&mut self) -> &mut Self::Bus {
        &mut self.bus
    }

    fn error_flags(&mut self) -> ErrorFlags {
        self.bus.errors
    }
}

/// Conversion command byte for `channel` at `oversampling`.
fn convert_command(
    channel: Channel,
    oversampling: Oversampling,
) -> u8 {
    let base = match channel {
        Channel::Temperature => CMD_CONVERT_TEMPERATURE,
        Channel::Pressure => CMD_CONVERT_PRESSURE,
    };
    let step = (oversampling.ratio() / 256).trailing_zeros() as u8 * 2;
    base | step
}

/// Driver for the simulated barometer.
pub struct SimBarometer {
    /// Set by `init`.
    address: Option<u8>,
    refuse_every: Option<NonZeroU32>,
    requests: u32,
}

impl SimBarometer {
    pub fn new(refuse_every: Option<NonZeroU32>) -> Self {
        Self {
            address: None,
            refuse_every,
            requests: 0,
        }
    }
}

impl Barometer<SimI2c> for SimBarometer {
    fn init(
        &mut self,
        bus: &mut SimI2c,
        address: u8,
    ) -> Result<(), i32> {
        self.address = Some(address);
        bus.write(address, &[CMD_RESET]).map_err(|_| -1)
    }

    fn start_conversion(
        &mut self,
        bus: &mut SimI2c,
        channel: Channel,
        oversampling: Oversampling,
    ) -> Result<u32, ConversionRefused> {
        let address = self.address.ok_or(ConversionRefused)?;
        self.requests += 1;
        if self
            .refuse_every
            .is_some_and(|n| self.requests % n.get() == 0)
        {
            return Err(ConversionRefused);
        }

        bus.write(address, &[convert_command(channel, oversampling)])
            .map_err(|_| ConversionRefused)?;
        Ok(oversampling.max_conversion_us())
    }

    fn read_conversion(
        &mut self,
        bus: &mut SimI2c,
    ) -> Result<u32, ErrorKind> {
        let address = self.address.ok_or(ErrorKind::Other)?;
        let mut buf = [0u8; 3];
        bus.write_read(address, &[CMD_ADC_READ], &mut buf)?;
        Ok(u32::from_be_bytes([0, buf[0], buf[1], buf[2]]))
    }

    fn compute_reading(
        &self,
        raw_pressure: u32,
        raw_temperature: u32,
    ) -> CalibratedReading {
        // Linear stand-in for the PROM compensation: Pa and centi-degC.
        let temperature = 2000 + (raw_temperature as i32 - RAW_TEMPERATURE_REF as i32) / 40;
        let pressure = 101_325 - (RAW_PRESSURE_REF.saturating_sub(raw_pressure) / 90);
        CalibratedReading {
            pressure,
            temperature,
        }
    }
}

/// Publish a slowly rotating gyro sample every `period` until the process exits.
///
/// Each sample takes the bus, so a running `baro` session stalls the IMU.
pub fn spawn_imu(
    gyro: &'static SharedGyro,
    arbiter: Arc<BusArbiter>,
    period: Duration,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let start = Instant::now();
        loop {
            arbiter.lock();
            let t = start.elapsed().as_secs_f32();
            arbiter.unlock();
            publish(
                gyro,
                GyroSample {
                    rate: [0.2 * t.sin(), 0.2 * t.cos(), 0.01],
                },
            );
            thread::sleep(period);
        }
    })
}
