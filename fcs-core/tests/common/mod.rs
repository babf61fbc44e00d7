//! Recording mocks shared by the integration tests.
#![allow(dead_code)]

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use embedded_hal::{delay::DelayNs, i2c::I2c};
use embedded_hal_mock::eh1::i2c::{Mock as I2cMock, Transaction as I2cTrans};
use fcs_core::utils::controllers::{
    baro::{Barometer, CalibratedReading, Channel, ConversionRefused, Oversampling},
    i2c::{BusConfig, BusTransport, ErrorFlags},
};

/// I2C address the mock barometer answers on.
pub const BARO_ADDRESS: u8 = 0x77;
/// Reset command issued by the mock probe.
pub const CMD_RESET: u8 = 0x1E;
/// ADC read command.
pub const CMD_ADC_READ: u8 = 0x00;

/// Everything the mocks observe, in call order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
    Acquire,
    Release,
    Init,
    Convert(Channel),
    Refused(Channel),
    Read,
    Delay(u32),
}

pub type Log = Rc<RefCell<Vec<Event>>>;

pub fn new_log() -> Log {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn count(
    log: &Log,
    event: Event,
) -> usize {
    log.borrow().iter().filter(|&&e| e == event).count()
}

/// Delays recorded in call order, in milliseconds.
pub fn delays(log: &Log) -> Vec<u32> {
    log.borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Delay(ms) => Some(*ms),
            _ => None,
        })
        .collect()
}

/// Conversion command byte for `channel` at `osr`.
pub fn convert_cmd(
    channel: Channel,
    osr: Oversampling,
) -> u8 {
    let base = match channel {
        Channel::Pressure => 0x40,
        Channel::Temperature => 0x50,
    };
    let step = match osr {
        Oversampling::Osr256 => 0x00,
        Oversampling::Osr512 => 0x02,
        Oversampling::Osr1024 => 0x04,
        Oversampling::Osr2048 => 0x06,
        Oversampling::Osr4096 => 0x08,
    };
    base | step
}

pub fn reset() -> I2cTrans {
    reset_at(BARO_ADDRESS)
}

pub fn reset_at(address: u8) -> I2cTrans {
    I2cTrans::write(address, vec![CMD_RESET])
}

pub fn convert(
    channel: Channel,
    osr: Oversampling,
) -> I2cTrans {
    convert_at(BARO_ADDRESS, channel, osr)
}

pub fn convert_at(
    address: u8,
    channel: Channel,
    osr: Oversampling,
) -> I2cTrans {
    I2cTrans::write(address, vec![convert_cmd(channel, osr)])
}

/// ADC read returning `raw` as a 24-bit big-endian value.
pub fn adc_read(raw: u32) -> I2cTrans {
    adc_read_at(BARO_ADDRESS, raw)
}

pub fn adc_read_at(
    address: u8,
    raw: u32,
) -> I2cTrans {
    let bytes = raw.to_be_bytes();
    I2cTrans::write_read(address, vec![CMD_ADC_READ], bytes[1..].to_vec())
}

/// Transport over an `embedded-hal-mock` bus that logs its lifecycle.
pub struct MockTransport {
    pub bus: I2cMock,
    pub log: Log,
    pub fail_start: bool,
    pub flags: ErrorFlags,
    pub last_config: Option<BusConfig>,
    pub held: bool,
}

impl MockTransport {
    pub fn new(
        expectations: &[I2cTrans],
        log: &Log,
    ) -> Self {
        Self {
            bus: I2cMock::new(expectations),
            log: log.clone(),
            fail_start: false,
            flags: ErrorFlags::NONE,
            last_config: None,
            held: false,
        }
    }

    /// Check every expected transaction was consumed.
    pub fn done(&self) {
        self.bus.clone().done();
    }
}

impl BusTransport for MockTransport {
    type Bus = I2cMock;
    type Error = &'static str;

    fn start(
        &mut self,
        config: &BusConfig,
    ) -> Result<(), Self::Error> {
        if self.fail_start {
            return Err("peripheral clock unavailable");
        }
        self.last_config = Some(*config);
        self.log.borrow_mut().push(Event::Start);
        Ok(())
    }

    fn stop(&mut self) {
        self.log.borrow_mut().push(Event::Stop);
    }

    fn acquire(&mut self) {
        assert!(!self.held, "bus acquired twice");
        self.held = true;
        self.log.borrow_mut().push(Event::Acquire);
    }

    fn release(&mut self) {
        assert!(self.held, "bus released without being held");
        self.held = false;
        self.log.borrow_mut().push(Event::Release);
    }

    fn bus(&mut self) -> &mut Self::Bus {
        assert!(self.held, "bus used without being held");
        &mut self.bus
    }

    fn error_flags(&mut self) -> ErrorFlags {
        self.flags
    }
}

/// Barometer that speaks a minimal command set and replays scripted
/// conversion times.
pub struct MockBarometer {
    pub log: Log,
    /// Address handed over by the last `init`.
    pub address: Option<u8>,
    /// Answers to successive conversion requests; empty means 9040 us.
    pub waits: VecDeque<Result<u32, ConversionRefused>>,
}

impl MockBarometer {
    pub fn new(log: &Log) -> Self {
        Self {
            log: log.clone(),
            address: None,
            waits: VecDeque::new(),
        }
    }

    pub fn with_waits(
        log: &Log,
        waits: impl IntoIterator<Item = Result<u32, ConversionRefused>>,
    ) -> Self {
        Self {
            log: log.clone(),
            address: None,
            waits: waits.into_iter().collect(),
        }
    }

    fn address(&self) -> u8 {
        self.address.expect("barometer used before init")
    }
}

impl<I2C: I2c> Barometer<I2C> for MockBarometer {
    fn init(
        &mut self,
        bus: &mut I2C,
        address: u8,
    ) -> Result<(), i32> {
        self.log.borrow_mut().push(Event::Init);
        self.address = Some(address);
        bus.write(address, &[CMD_RESET]).map_err(|_| -2)
    }

    fn start_conversion(
        &mut self,
        bus: &mut I2C,
        channel: Channel,
        oversampling: Oversampling,
    ) -> Result<u32, ConversionRefused> {
        let wait = self.waits.pop_front().unwrap_or(Ok(9040));
        match wait {
            Ok(_) => {
                self.log.borrow_mut().push(Event::Convert(channel));
                bus.write(self.address(), &[convert_cmd(channel, oversampling)])
                    .map_err(|_| ConversionRefused)?;
            }
            Err(_) => self.log.borrow_mut().push(Event::Refused(channel)),
        }
        wait
    }

    fn read_conversion(
        &mut self,
        bus: &mut I2C,
    ) -> Result<u32, I2C::Error> {
        self.log.borrow_mut().push(Event::Read);
        let mut buf = [0u8; 3];
        bus.write_read(self.address(), &[CMD_ADC_READ], &mut buf)?;
        Ok(u32::from_be_bytes([0, buf[0], buf[1], buf[2]]))
    }

    fn compute_reading(
        &self,
        raw_pressure: u32,
        raw_temperature: u32,
    ) -> CalibratedReading {
        CalibratedReading {
            pressure: raw_pressure / 10,
            temperature: raw_temperature as i32 - 8_000_000,
        }
    }
}

/// Delay that records requested milliseconds instead of sleeping.
pub struct RecordingDelay {
    pub log: Log,
}

impl RecordingDelay {
    pub fn new(log: &Log) -> Self {
        Self { log: log.clone() }
    }
}

impl DelayNs for RecordingDelay {
    fn delay_ns(
        &mut self,
        ns: u32,
    ) {
        self.log
            .borrow_mut()
            .push(Event::Delay(ns.div_ceil(1_000_000)));
    }

    fn delay_ms(
        &mut self,
        ms: u32,
    ) {
        self.log.borrow_mut().push(Event::Delay(ms));
    }
}
