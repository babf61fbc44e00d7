mod sim;

use std::{
    fmt,
    io::{self, BufRead, Write},
    num::NonZeroU32,
    path::PathBuf,
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use clap::Parser;
use embedded_hal_mock::eh1::delay::StdSleep;
use fcs_core::utils::{
    controllers::gyro::{shared_gyro, SharedGyro},
    parameters::{ParameterValue, SharedParameters},
    Shell, ShellCommand, ShellConfig,
};
use sim::{BusArbiter, SimBarometer, SimI2c, SimTransport};
use static_cell::StaticCell;
use tracing::info;

#[derive(Parser)]
#[clap(version = "1.0")]
struct Opts
{
    /// JSON shell configuration; missing fields keep their defaults
    #[clap(long)]
    config: Option<PathBuf>,
    /// override the number of barometer iterations per `baro`
    #[clap(long)]
    iterations: Option<u32>,
    /// refuse every Nth conversion request
    #[clap(long)]
    refuse_every: Option<NonZeroU32>,
    /// leave the barometer off the bus
    #[clap(long)]
    no_baro: bool,
    /// run these shell lines and exit instead of reading stdin
    #[clap(short, long)]
    command: Vec<String>,
}

/// Shell output straight to stdout, flushed per write so readings stream.
struct Console(io::Stdout);

impl fmt::Write for Console {
    fn write_str(
        &mut self,
        s: &str,
    ) -> fmt::Result {
        let mut out = self.0.lock();
        out.write_all(s.as_bytes())
            .and_then(|()| out.flush())
            .map_err(|_| fmt::Error)
    }
}

fn load_config(opts: &Opts) -> anyhow::Result<ShellConfig> {
    let mut config = match &opts.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?
        }
        None => ShellConfig::default(),
    };
    if let Some(iterations) = opts.iterations {
        config.baro.iterations = iterations;
    }
    Ok(config)
}

fn seed_parameters(store: &SharedParameters) -> anyhow::Result<()> {
    let entries = [
        ("/attitude/kp", ParameterValue::Scalar(0.35)),
        ("/attitude/ki", ParameterValue::Scalar(0.02)),
        ("/imu/rate_hz", ParameterValue::Integer(1000)),
        ("/logging/enabled", ParameterValue::Boolean(true)),
        ("/board/name", ParameterValue::String("mock-mcu".into())),
        ("/mag/offset", ParameterValue::Vector(vec![0.0, 0.0, 0.0])),
    ];
    for (name, value) in entries {
        store.declare(name, value)?;
    }
    Ok(())
}

static PARAMETERS: StaticCell<SharedParameters> = StaticCell::new();
static GYRO: StaticCell<SharedGyro> = StaticCell::new();

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let opts: Opts = Opts::parse();
    let config = load_config(&opts)?;

    let parameters: &'static SharedParameters = PARAMETERS.init(SharedParameters::new());
    seed_parameters(parameters)?;
    let gyro: &'static SharedGyro = GYRO.init(shared_gyro());

    let arbiter = Arc::new(BusArbiter::default());
    sim::spawn_imu(gyro, Arc::clone(&arbiter), Duration::from_millis(5));

    let baro_address = (!opts.no_baro).then_some(config.baro.address);
    let transport = SimTransport::new(arbiter, SimI2c::new(baro_address));
    let barometer = SimBarometer::new(opts.refuse_every);
    let mut shell = Shell::new(transport, barometer, StdSleep::new(), parameters, gyro, config);
    let mut console = Console(io::stdout());

    if !opts.command.is_empty() {
        for line in &opts.command {
            shell.execute_line(line, &mut console)?;
        }
        return Ok(());
    }

    let names: Vec<_> = ShellCommand::ALL.iter().map(|c| c.name()).collect();
    info!(commands = ?names, "shell ready");
    let stdin = io::stdin();
    loop {
        print!("ch> ");
        io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        match line.trim() {
            "exit" => break,
            "help" => println!("commands: {}", names.join(" ")),
            line => shell.execute_line(line, &mut console)?,
        }
    }
    Ok(())
}
