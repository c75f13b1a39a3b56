//! CLI entry point for the OB1 driver.
//!
//! Starts a driver for the port described in the configuration file, runs
//! one command against it and shuts it down (zeroing every channel).
//!
//! # Usage
//!
//! ```bash
//! ob1-driver --mock status
//! ob1-driver --config config/ob1.toml set --channel 0 --mbar 250
//! ob1-driver sensor --channel 1 --sensor-type 4
//! ob1-driver monitor --interval-ms 500 --count 20
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use elveflow_ob1::config::{Ob1Config, DEFAULT_CONFIG_PATH};
use elveflow_ob1::sdk::{MockSdk, Ob1Sdk};
use elveflow_ob1::{logging, Ob1Driver, Ob1Param, ParamValue};

#[derive(Parser)]
#[command(name = "ob1-driver")]
#[command(about = "Drive an Elveflow OB1 pressure/flow controller", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Use the in-process simulator instead of the vendor SDK
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone, Copy)]
enum Commands {
    /// Print the driver status report
    Status,

    /// Command a channel pressure and read it back
    Set {
        /// Logical channel (0-based)
        #[arg(long)]
        channel: usize,
        /// Pressure in mbar
        #[arg(long)]
        mbar: f64,
    },

    /// Attach a flow sensor to a channel (type 0 detaches)
    Sensor {
        #[arg(long)]
        channel: usize,
        /// Vendor sensor type code
        #[arg(long)]
        sensor_type: i32,
    },

    /// Poll pressures (and flows where a sensor is attached)
    Monitor {
        #[arg(long, default_value = "1000")]
        interval_ms: u64,
        /// Stop after this many samples; runs until Ctrl-C otherwise
        #[arg(long)]
        count: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Ob1Config::load_from(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    logging::init_from_config(&config)?;

    if cli.mock {
        return run(MockSdk::new(), config, cli.command).await;
    }

    #[cfg(feature = "hardware")]
    {
        run(elveflow_ob1::sdk::VendorSdk::new(), config, cli.command).await
    }
    #[cfg(not(feature = "hardware"))]
    {
        anyhow::bail!("built without the `hardware` feature; pass --mock to use the simulator")
    }
}

/// Run a blocking driver call off the async runtime.
async fn blocking<S, T, F>(driver: &Arc<Ob1Driver<S>>, f: F) -> Result<T>
where
    S: Ob1Sdk + 'static,
    T: Send + 'static,
    F: FnOnce(&Ob1Driver<S>) -> elveflow_ob1::Result<T> + Send + 'static,
{
    let driver = Arc::clone(driver);
    Ok(tokio::task::spawn_blocking(move || f(&driver)).await??)
}

async fn run<S: Ob1Sdk + 'static>(sdk: S, config: Ob1Config, command: Commands) -> Result<()> {
    let port = config.port;
    let driver = Arc::new(tokio::task::spawn_blocking(move || Ob1Driver::start(sdk, &port)).await??);
    if let Some(err) = driver.startup_error() {
        warn!(port = driver.port(), error = %err, "driver started with errors");
    }

    let outcome = execute(&driver, command).await;

    blocking(&driver, Ob1Driver::shutdown).await?;
    outcome
}

async fn execute<S: Ob1Sdk + 'static>(driver: &Arc<Ob1Driver<S>>, command: Commands) -> Result<()> {
    match command {
        Commands::Status => {
            let report = blocking(driver, |d| Ok(d.report(1))).await?;
            print!("{}", report);
        }
        Commands::Set { channel, mbar } => {
            let set_key = driver.key_for(Ob1Param::SetPressure.name())?;
            let read_key = driver.key_for(Ob1Param::ReadPressure.name())?;
            if let Ok((lo, hi)) = driver.bounds(set_key, channel) {
                if !(lo..=hi).contains(&mbar) {
                    warn!(channel, mbar, lo, hi, "setpoint outside regulator range");
                }
            }
            blocking(driver, move |d| d.write_float64(set_key, channel, mbar)).await?;
            let read = blocking(driver, move |d| d.read_float64(read_key, channel)).await?;
            println!("channel {}: set {:.3} mbar, read {:.3} mbar", channel, mbar, read);
        }
        Commands::Sensor {
            channel,
            sensor_type,
        } => {
            let key = driver.key_for(Ob1Param::SensorType.name())?;
            blocking(driver, move |d| d.write_int32(key, channel, sensor_type)).await?;
            println!("channel {}: sensor type {}", channel, sensor_type);
        }
        Commands::Monitor { interval_ms, count } => {
            monitor(driver, Duration::from_millis(interval_ms), count).await?;
        }
    }
    Ok(())
}

async fn monitor<S: Ob1Sdk + 'static>(
    driver: &Arc<Ob1Driver<S>>,
    interval: Duration,
    count: Option<u64>,
) -> Result<()> {
    let pressure = driver.key_for(Ob1Param::ReadPressure.name())?;
    let flow = driver.key_for(Ob1Param::ReadFlow.name())?;
    let sensor = driver.key_for(Ob1Param::SensorType.name())?;
    let mut ticker = tokio::time::interval(interval);
    let mut samples = 0u64;

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }

        for channel in 0..driver.channel_count() {
            let mbar = blocking(driver, move |d| d.read_float64(pressure, channel)).await;
            let has_sensor = matches!(
                driver.cached(sensor, channel).map(|u| u.value),
                Ok(ParamValue::Int32(code)) if code != 0
            );
            let flow = if has_sensor {
                Some(blocking(driver, move |d| d.read_float64(flow, channel)).await)
            } else {
                None
            };
            match (mbar, flow) {
                (Ok(mbar), Some(Ok(flow))) => {
                    println!("[{}] channel {}: {:.3} mbar, flow {:.3}", samples, channel, mbar, flow)
                }
                (Ok(mbar), _) => println!("[{}] channel {}: {:.3} mbar", samples, channel, mbar),
                (Err(err), _) => println!("[{}] channel {}: {}", samples, channel, err),
            }
        }

        samples += 1;
        if count.is_some_and(|limit| samples >= limit) {
            break;
        }
    }
    Ok(())
}
