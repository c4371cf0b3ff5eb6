//! SmartLocker kiosk: headless entry point.

mod console;
mod logging;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use smartlocker_hardware::gpio::SimulatedActuator;
use smartlocker_hardware::mock::MockFingerprintSensor;
use smartlocker_hardware::{AnyActuator, AnyFingerprintSensor};
use smartlocker_kiosk::{
    AccessCoordinator, ActuatorDriver, KioskComponents, KioskConfig, KioskEvent, LogFormat,
    SensorDriver,
};
use smartlocker_network::FaceServiceClient;
use smartlocker_storage::{CredentialStore, Database};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(name = "smartlocker", version, about = "SmartLocker access-control kiosk")]
struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// flags and env vars override them.
    #[arg(long, short, env = "SMARTLOCKER_CONFIG")]
    config: Option<PathBuf>,

    /// Credential database file.
    #[arg(long, env = "SMARTLOCKER_DATABASE")]
    database: Option<String>,

    /// Fingerprint sensor driver.
    #[arg(long, value_enum, env = "SMARTLOCKER_SENSOR")]
    sensor: Option<SensorArg>,

    /// Never touch GPIO; log lock activity instead.
    #[arg(long, env = "SMARTLOCKER_SIMULATED_LOCK")]
    simulated_lock: bool,

    /// Face service base URL. Enables face recognition.
    #[arg(long, env = "SMARTLOCKER_FACE_URL")]
    face_url: Option<String>,

    /// Bearer token for face registration and training.
    #[arg(long, env = "SMARTLOCKER_FACE_TOKEN", hide_env_values = true)]
    face_token: Option<String>,

    /// Log filter, e.g. "info" or "debug,sqlx=warn".
    #[arg(long, env = "SMARTLOCKER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit JSON logs.
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the kiosk console (default).
    Run,

    /// Print the effective configuration as TOML and exit.
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum SensorArg {
    None,
    Mock,
}

impl From<SensorArg> for SensorDriver {
    fn from(arg: SensorArg) -> Self {
        match arg {
            SensorArg::None => Self::None,
            SensorArg::Mock => Self::Mock,
        }
    }
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<KioskConfig> {
        let mut config = match &self.config {
            Some(path) => KioskConfig::from_toml_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => KioskConfig::default(),
        };

        if let Some(database) = &self.database {
            config.storage.database_path = database.clone();
        }
        if let Some(sensor) = self.sensor {
            config.sensor.driver = sensor.into();
        }
        if self.simulated_lock {
            config.actuator.driver = ActuatorDriver::Simulated;
        }
        if let Some(url) = &self.face_url {
            config.face.enabled = true;
            config.face.base_url = url.clone();
        }
        if let Some(token) = &self.face_token {
            config.face.admin_token = Some(token.clone());
        }
        if let Some(level) = &self.log_level {
            config.logging.level = level.clone();
        }
        if self.json_logs {
            config.logging.format = LogFormat::Json;
        }

        config.validate()?;
        Ok(config)
    }
}

async fn print_events(mut events: mpsc::Receiver<KioskEvent>) {
    while let Some(event) = events.recv().await {
        println!("* {event}");
    }
}

async fn run(config: KioskConfig) -> anyhow::Result<()> {
    let db = Database::new(config.database_config())
        .await
        .with_context(|| format!("opening {}", config.storage.database_path))?;
    let store = CredentialStore::new(db, config.hashing_config()).await?;

    let (sensor, mock_sensor) = match config.sensor.driver {
        SensorDriver::None => (None, None),
        SensorDriver::Mock => {
            let (sensor, handle) = MockFingerprintSensor::with_capacity(config.sensor.capacity);
            (Some(AnyFingerprintSensor::Mock(sensor)), Some(handle))
        }
    };
    let actuator = match config.actuator.driver {
        ActuatorDriver::Gpio => {
            AnyActuator::gpio_or_simulated(config.actuator.pin, &config.actuator.sysfs_root).await
        }
        ActuatorDriver::Simulated => AnyActuator::Simulated(SimulatedActuator::new()),
    };
    let face = config
        .face_config()
        .map(FaceServiceClient::new)
        .transpose()
        .context("configuring face service")?;

    let components = KioskComponents {
        sensor,
        actuator,
        store: store.clone(),
        face,
    };
    let (kiosk, events) = AccessCoordinator::start(components, config.coordinator_settings()).await?;
    let printer = tokio::spawn(print_events(events));

    let result = console::run(&kiosk, mock_sensor).await;

    kiosk.shutdown().await;
    printer.abort();
    store.database().close().await;
    info!("SmartLocker stopped");
    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    logging::init_logging(config.logging.format, &config.logging.level)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            info!(
                version = smartlocker_core::VERSION,
                sensor = ?config.sensor.driver,
                actuator = ?config.actuator.driver,
                face = config.face.enabled,
                "Starting SmartLocker"
            );
            run(config).await
        }
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}
