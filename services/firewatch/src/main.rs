//! Firewatch CLI
//!
//! Runs the telemetry dashboard, or manages devices and users on the backend.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use firewatch::api::{
    flame_detections, ApiClient, DeviceRegistration, DeviceUpdate, HistoryRange, User,
};
use firewatch::io::ReqwestHttpClient;
use firewatch::{load_config, Config, FirewatchError};
use tracing::Level;

#[derive(Parser)]
#[command(name = "firewatch")]
#[command(about = "Fire detector telemetry dashboard and device management")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Dashboard port (overrides config file)
    #[arg(long)]
    dashboard_port: Option<u16>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Subscribe to telemetry and serve the dashboard (default)
    Serve,
    /// Log in to the backend and print the bearer token
    Login {
        email: String,
        /// Falls back to $FIREWATCH_API_PASSWORD
        #[arg(long)]
        password: Option<String>,
    },
    /// Manage registered devices
    #[command(subcommand)]
    Devices(DevicesCommand),
    /// Manage user accounts
    #[command(subcommand)]
    Users(UsersCommand),
    /// Fetch stored telemetry for a device
    History {
        mac_address: String,
        #[arg(long, value_enum)]
        range: Option<HistoryRange>,
        /// Only rows where a flame was detected
        #[arg(long)]
        flame_only: bool,
        /// Write CSV to this file instead of printing JSON
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum DevicesCommand {
    List {
        /// Only devices assigned to this fire brigade account
        #[arg(long)]
        damkar: Option<String>,
    },
    Register {
        mac_address: String,
        #[arg(allow_hyphen_values = true)]
        latitude: f64,
        #[arg(allow_hyphen_values = true)]
        longitude: f64,
        email_damkar: String,
        email_user: String,
    },
    Update {
        mac_address: String,
        #[arg(allow_hyphen_values = true)]
        latitude: f64,
        #[arg(allow_hyphen_values = true)]
        longitude: f64,
        email_damkar: String,
        #[arg(long)]
        email_user: Option<String>,
    },
    Delete {
        mac_address: String,
    },
}

#[derive(Subcommand)]
enum UsersCommand {
    List,
    Register {
        username: String,
        email: String,
        lokasi: String,
    },
    Update {
        /// Email the account is currently registered under
        current_email: String,
        username: String,
        email: String,
        lokasi: String,
    },
    Delete {
        email: String,
    },
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), FirewatchError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn dispatch(config: Config, command: Command) -> Result<(), FirewatchError> {
    let api = ApiClient::new(&config.api, Arc::new(ReqwestHttpClient::default()));

    match command {
        Command::Serve => {
            tracing::info!("Starting firewatch service");
            tracing::debug!(
                "Broker: {}, topic: {}, persistence: {}",
                config.broker.url,
                config.broker.topic,
                config.persistence.enabled
            );
            firewatch::run(config).await?;
        }
        Command::Login { email, password } => {
            let password = password
                .or_else(|| std::env::var("FIREWATCH_API_PASSWORD").ok())
                .ok_or_else(|| {
                    FirewatchError::InvalidInput(
                        "password required (--password or $FIREWATCH_API_PASSWORD)".to_string(),
                    )
                })?;
            let login = api.login(&email, &password).await?;
            println!("{}", login.token);
        }
        Command::Devices(DevicesCommand::List { damkar }) => {
            let devices = match damkar {
                Some(email) => api.devices_for_damkar(&email).await?,
                None => api.list_devices().await?,
            };
            print_json(&devices)?;
        }
        Command::Devices(DevicesCommand::Register {
            mac_address,
            latitude,
            longitude,
            email_damkar,
            email_user,
        }) => {
            api.register_device(&DeviceRegistration {
                mac_address,
                latitude,
                longitude,
                email_damkar,
                email_user,
            })
            .await?;
        }
        Command::Devices(DevicesCommand::Update {
            mac_address,
            latitude,
            longitude,
            email_damkar,
            email_user,
        }) => {
            let update = DeviceUpdate {
                latitude,
                longitude,
                email_damkar,
                email_user,
            };
            api.update_device(&mac_address, &update).await?;
        }
        Command::Devices(DevicesCommand::Delete { mac_address }) => {
            api.delete_device(&mac_address).await?;
        }
        Command::Users(UsersCommand::List) => print_json(&api.list_users().await?)?,
        Command::Users(UsersCommand::Register {
            username,
            email,
            lokasi,
        }) => {
            api.register_user(&User {
                username,
                email,
                lokasi,
            })
            .await?;
        }
        Command::Users(UsersCommand::Update {
            current_email,
            username,
            email,
            lokasi,
        }) => {
            let user = User {
                username,
                email,
                lokasi,
            };
            api.update_user(&current_email, &user).await?;
        }
        Command::Users(UsersCommand::Delete { email }) => api.delete_user(&email).await?,
        Command::History {
            mac_address,
            range,
            flame_only,
            csv,
        } => {
            let mut records = api.sensor_history(&mac_address, range).await?;
            if flame_only {
                records = flame_detections(&records);
            }
            match csv {
                Some(path) => firewatch::export::write_history_csv(&path, &records)?,
                None => print_json(&records)?,
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    tracing::debug!(
        "Parsed command line arguments: config={:?}, dashboard_port={:?}, log_level={:?}",
        args.config,
        args.dashboard_port,
        args.log_level
    );

    let mut config = if let Some(config_path) = &args.config {
        tracing::debug!("Loading configuration from {:?}", config_path);
        load_config(config_path)?
    } else {
        tracing::debug!("Using default configuration");
        Config::default()
    };

    config.resolve_secrets()?;

    if let Some(dashboard_port) = args.dashboard_port {
        config.dashboard.port = dashboard_port;
    }

    dispatch(config, args.command.unwrap_or(Command::Serve)).await?;

    Ok(())
}
