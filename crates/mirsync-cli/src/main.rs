//! mirsync - live one-way directory mirroring
//!
//! Keeps destination directories, local or on an SFTP server, in step with
//! watched local directories as they change.

mod display;
mod json_output;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{Confirm, Password};
use mirsync_config::{
    Configuration, ConfigurationManager, Connection, FileConfigurationStore, MemorySecretStore,
    SecretStore, Settings, SettingsLoader, SftpAuthentication, SftpConnection,
};
use mirsync_engine::{ErrorHandler, OrchestratorOptions, SyncItem, SyncOrchestrator};
use mirsync_types::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// mirsync - live one-way directory mirroring
#[derive(Parser)]
#[command(
    name = "mirsync",
    version = env!("CARGO_PKG_VERSION"),
    about = "Mirror local directories to local or SFTP destinations as they change",
    long_about = "mirsync watches local directories and replays every create, remove and\n\
                  rename onto a destination directory, on this machine or on a remote host\n\
                  reached over SFTP."
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Quiet mode - minimal output
    #[arg(short, long)]
    quiet: bool,

    /// Verbose mode - detailed output
    #[arg(short, long)]
    verbose: bool,

    /// Settings file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Configuration store path, overriding the settings
    #[arg(long)]
    store: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a new sync configuration
    Add {
        #[command(subcommand)]
        destination: AddCommand,
    },
    /// List stored configurations
    List {
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Delete a stored configuration and its stored password
    Remove {
        /// Configuration id
        id: Uuid,
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Start every stored configuration and sync until interrupted
    Run,
    /// Show engine settings
    Settings {
        /// Show the defaults instead of the effective settings
        #[arg(long)]
        default: bool,
        /// Write the shown settings to a file (format from the extension)
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum AddCommand {
    /// Mirror into another local directory
    Local {
        /// Display name
        #[arg(long)]
        name: String,
        /// Watched directory
        source: PathBuf,
        /// Destination directory
        destination: PathBuf,
    },
    /// Mirror into a directory on an SFTP server
    Sftp {
        /// Display name
        #[arg(long)]
        name: String,
        /// Watched directory
        source: PathBuf,
        /// Remote destination directory
        destination: String,
        /// Server name
        #[arg(long)]
        host: String,
        /// Server port
        #[arg(long)]
        port: Option<u16>,
        /// Account name
        #[arg(long)]
        user: String,
        /// Private key file; without it a password is prompted
        #[arg(long)]
        key: Option<PathBuf>,
        /// Accepted server key fingerprint (repeatable)
        #[arg(long = "fingerprint")]
        fingerprints: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.config {
        Some(path) => SettingsLoader::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => SettingsLoader::load_default().context("Failed to load settings")?,
    };

    init_logging(&cli, &settings)?;
    info!("mirsync v{} starting", env!("CARGO_PKG_VERSION"));

    let store_path = cli.store.clone().unwrap_or_else(|| settings.store.path.clone());
    let secrets: Arc<dyn SecretStore> = Arc::new(MemorySecretStore::new());

    match cli.command {
        Commands::Add { destination } => add_command(destination, &store_path, secrets, cli.quiet),
        Commands::List { json } => list_command(&store_path, secrets, json),
        Commands::Remove { id, yes } => remove_command(id, yes, &store_path, secrets),
        Commands::Run => run_command(&settings, &store_path, secrets, cli.quiet).await,
        Commands::Settings { default, save } => settings_command(&settings, default, save),
    }
}

fn init_logging(cli: &Cli, settings: &Settings) -> Result<()> {
    use tracing_subscriber::{fmt, EnvFilter};

    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        settings.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Invalid log filter")?;

    let builder = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false);

    if settings.logging.json_format {
        builder.json().init();
    } else {
        builder.init();
    }

    Ok(())
}

fn manager(store_path: &Path, secrets: Arc<dyn SecretStore>) -> Result<ConfigurationManager> {
    let store = Arc::new(FileConfigurationStore::new(store_path));
    ConfigurationManager::new(store, secrets)
        .with_context(|| format!("Failed to open configuration store {}", store_path.display()))
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    std::fs::canonicalize(&path).with_context(|| format!("{} is not accessible", path.display()))
}

fn add_command(command: AddCommand, store_path: &Path, secrets: Arc<dyn SecretStore>, quiet: bool) -> Result<()> {
    let configuration = match command {
        AddCommand::Local {
            name,
            source,
            destination,
        } => Configuration::new(
            name,
            Connection::local(absolute(source)?),
            Connection::local(absolute(destination)?),
        ),
        AddCommand::Sftp {
            name,
            source,
            destination,
            host,
            port,
            user,
            key,
            fingerprints,
        } => {
            let mut sftp = match key {
                Some(key) => SftpConnection::with_key(destination, host, port, user, absolute(key)?),
                None => {
                    let password = Password::new()
                        .with_prompt(format!("Password for {user}@{host}"))
                        .interact()?;
                    SftpConnection::with_password(destination, host, port, user, password, secrets.as_ref())?
                }
            };
            if !fingerprints.is_empty() {
                sftp.set_fingerprints(Some(fingerprints));
            }
            Configuration::new(name, Connection::local(absolute(source)?), Connection::Sftp(sftp))
        }
    };

    let mut manager = manager(store_path, secrets)?;
    manager.add(&configuration)?;

    if !quiet {
        println!(
            "{} Added {} ({})",
            style("✓").green().bold(),
            style(&configuration.name).bold(),
            style(configuration.id()).dim()
        );
        if let Connection::Sftp(sftp) = &configuration.destination {
            if sftp.password().is_some() {
                println!(
                    "  {}",
                    style("Passwords are not written to disk; `mirsync run` asks again").dim()
                );
            }
        }
    }
    Ok(())
}

fn list_command(store_path: &Path, secrets: Arc<dyn SecretStore>, json: bool) -> Result<()> {
    let manager = manager(store_path, secrets)?;
    if json {
        let listing = json_output::ConfigurationListJson::new(manager.configurations());
        println!("{}", serde_json::to_string_pretty(&listing)?);
    } else {
        display::display_configurations(manager.configurations());
    }
    Ok(())
}

fn remove_command(id: Uuid, yes: bool, store_path: &Path, secrets: Arc<dyn SecretStore>) -> Result<()> {
    let mut manager = manager(store_path, secrets)?;
    let Some(configuration) = manager.configuration(id) else {
        bail!("No configuration with id {id}");
    };

    let confirmed = yes
        || Confirm::new()
            .with_prompt(format!("Remove {}?", configuration.name))
            .default(false)
            .interact()?;
    if !confirmed {
        return Ok(());
    }

    manager.remove(id)?;
    println!("{} Removed {}", style("✓").green().bold(), style(id).dim());
    Ok(())
}

/// Ask for every password the secret store could not provide
fn prompt_missing_passwords(configurations: &mut [Configuration], secrets: &dyn SecretStore) -> Result<()> {
    for configuration in configurations {
        for connection in [&mut configuration.source, &mut configuration.destination] {
            let Connection::Sftp(sftp) = connection else {
                continue;
            };
            if sftp.password() != Some("") {
                continue;
            }
            let value = Password::new()
                .with_prompt(format!("Password for {}@{}", sftp.user(), sftp.host()))
                .interact()?;
            sftp.set_authentication(SftpAuthentication::Password { value }, secrets)?;
        }
    }
    Ok(())
}

async fn run_command(
    settings: &Settings,
    store_path: &Path,
    secrets: Arc<dyn SecretStore>,
    quiet: bool,
) -> Result<()> {
    let manager = manager(store_path, Arc::clone(&secrets))?;
    let mut configurations = manager.configurations().to_vec();
    if configurations.is_empty() {
        bail!("Nothing to sync; add a configuration first");
    }
    prompt_missing_passwords(&mut configurations, secrets.as_ref())?;

    let on_error: ErrorHandler = Arc::new(|item: &SyncItem, error: &Error| {
        display::display_item_error(item, error);
    });
    let orchestrator = SyncOrchestrator::with_configurations(
        configurations,
        OrchestratorOptions::from(&settings.engine),
        on_error,
    )
    .await?;

    if !quiet {
        for item in orchestrator.items() {
            display::display_item_status(&item);
            let mut status = item.subscribe_status();
            tokio::spawn(async move {
                while status.changed().await.is_ok() {
                    display::display_item_status(&item);
                }
            });
        }
        println!("{} Syncing, press Ctrl-C to stop", style("⟲").blue().bold());
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Cannot listen for Ctrl-C: {}", e);
    }

    orchestrator.shutdown().await;
    if !quiet {
        println!("{} Stopped", style("✓").green());
    }
    Ok(())
}

fn settings_command(settings: &Settings, default: bool, save: Option<PathBuf>) -> Result<()> {
    let shown = if default {
        Settings::default()
    } else {
        settings.clone()
    };

    if let Some(path) = save {
        SettingsLoader::save_to_file(&shown, &path)?;
        println!(
            "{} Settings written to {}",
            style("✓").green().bold(),
            style(path.display()).cyan()
        );
        return Ok(());
    }

    let title = if default { "Default settings:" } else { "Current settings:" };
    println!("{} {}", style("⚙").blue().bold(), title);
    print!("{}", serde_yaml::to_string(&shown)?);
    Ok(())
}
