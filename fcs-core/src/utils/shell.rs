//! Debug shell command table and dispatcher.
//!
//! Every handler runs to completion on the calling thread and renders its
//! outcome, including failures, as text on the output sink. Nothing a user
//! types can fault the caller.

use core::{fmt, sync::atomic::AtomicBool};

use embedded_hal::delay::DelayNs;
use heapless::Vec;
use serde::{Deserialize, Serialize};

use crate::utils::{
    config::ShellConfig,
    controllers::{
        baro::{run_sampling_session, Barometer, SampleError},
        gyro::{stream_gyro, SharedGyro},
        i2c::BusTransport,
    },
    parameters::{list_parameters, set_parameter, ParameterStore},
};

/// Most arguments a single shell line may carry.
pub const MAX_ARGS: usize = 4;

/// Commands served by this shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShellCommand {
    /// Run a barometer sampling session.
    Baro,
    /// Stream the latest gyro sample.
    Gyro,
    /// Dump every parameter.
    ParameterList,
    /// Write one scalar parameter.
    ParameterSet,
}

impl ShellCommand {
    pub const ALL: [ShellCommand; 4] = [
        ShellCommand::Baro,
        ShellCommand::Gyro,
        ShellCommand::ParameterList,
        ShellCommand::ParameterSet,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            ShellCommand::Baro => "baro",
            ShellCommand::Gyro => "gyro",
            ShellCommand::ParameterList => "parameter_list",
            ShellCommand::ParameterSet => "parameter_set",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.name() == name)
    }

    pub const fn usage(self) -> &'static str {
        match self {
            ShellCommand::Baro => "usage: baro",
            ShellCommand::Gyro => "usage: gyro",
            ShellCommand::ParameterList => "usage: parameter_list",
            ShellCommand::ParameterSet => "usage: parameter_set name value",
        }
    }
}

/// A shell line carried more than [`MAX_ARGS`] arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("too many arguments")]
pub struct TooManyArgs;

/// Split a line into its command word and arguments on whitespace.
///
/// Returns `Ok(None)` for a blank line.
pub fn split_line(line: &str) -> Result<Option<(&str, Vec<&str, MAX_ARGS>)>, TooManyArgs> {
    let mut words = line.split_whitespace();
    let Some(name) = words.next() else {
        return Ok(None);
    };
    let mut args = Vec::new();
    for word in words {
        args.push(word).map_err(|_| TooManyArgs)?;
    }
    Ok(Some((name, args)))
}

/// Hardware and state the shell commands operate on.
///
/// The parameter store and gyro sample are borrowed: they are shared with the
/// rest of the firmware and outlive any one shell.
pub struct Shell<'a, T, B, D, S> {
    transport: T,
    barometer: B,
    delay: D,
    parameters: &'a S,
    gyro: &'a SharedGyro,
    config: ShellConfig,
    cancel: Option<&'a AtomicBool>,
}

impl<'a, T, B, D, S> Shell<'a, T, B, D, S>
where
    T: BusTransport,
    B: Barometer<T::Bus>,
    D: DelayNs,
    S: ParameterStore,
{
    pub fn new(
        transport: T,
        barometer: B,
        delay: D,
        parameters: &'a S,
        gyro: &'a SharedGyro,
        config: ShellConfig,
    ) -> Self {
        Self {
            transport,
            barometer,
            delay,
            parameters,
            gyro,
            config,
            cancel: None,
        }
    }

    /// Let `flag` stop a running `baro` session at its next iteration.
    pub fn with_cancel(
        mut self,
        flag: &'a AtomicBool,
    ) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Parse and run one line; unknown commands are echoed back as `<name>?`.
    pub fn execute_line<W: fmt::Write>(
        &mut self,
        line: &str,
        out: &mut W,
    ) -> fmt::Result {
        let (name, args) = match split_line(line) {
            Ok(Some(parsed)) => parsed,
            Ok(None) => return Ok(()),
            Err(error) => return writeln!(out, "{error}"),
        };
        match ShellCommand::from_name(name) {
            Some(command) => self.execute(command, &args, out),
            None => writeln!(out, "{name}?"),
        }
    }

    /// Run `command` with `args`, rendering its outcome on `out`.
    pub fn execute<W: fmt::Write>(
        &mut self,
        command: ShellCommand,
        args: &[&str],
        out: &mut W,
    ) -> fmt::Result {
        tracing::debug!(command = command.name(), ?args, "shell command");
        match command {
            ShellCommand::Baro | ShellCommand::Gyro | ShellCommand::ParameterList
                if !args.is_empty() =>
            {
                writeln!(out, "{}", command.usage())
            }
            ShellCommand::Baro => self.cmd_baro(out),
            ShellCommand::Gyro => stream_gyro(self.gyro, &mut self.delay, &self.config.gyro, out),
            ShellCommand::ParameterList => list_parameters(self.parameters, out),
            ShellCommand::ParameterSet => match set_parameter(self.parameters, args) {
                Ok(()) => Ok(()),
                Err(error) => writeln!(out, "{error}"),
            },
        }
    }

    fn cmd_baro<W: fmt::Write>(
        &mut self,
        out: &mut W,
    ) -> fmt::Result {
        writeln!(out, "ms5611 init")?;

        let samples = match run_sampling_session(
            &mut self.transport,
            &mut self.barometer,
            &mut self.delay,
            &self.config.bus,
            &self.config.baro,
        ) {
            Ok(samples) => samples,
            Err(SampleError::DeviceInit { code, flags }) => {
                return writeln!(out, "ms5611 init failed: {code}, {flags}");
            }
            Err(error) => return writeln!(out, "{error}"),
        };
        writeln!(out, "ms5611 init succeeded")?;

        let samples = match self.cancel {
            Some(flag) => samples.with_cancel(flag),
            None => samples,
        };
        for sample in samples {
            match sample {
                Ok(reading) => writeln!(out, "{reading}")?,
                Err(error) => tracing::warn!(%error, "barometer sample dropped"),
            }
        }
        Ok(())
    }
}
