//! sealcal CLI - encrypted personal calendar in the terminal.
//!
//! Every invocation runs one full session: log in, unlock, load the
//! encrypted collection, apply the command, save and log out. The server
//! session is closed on every exit path once login has succeeded.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;
use zeroize::Zeroizing;

use sealcal_common::{Event, EventCollection, EventId, NewEvent};
use sealcal_storage::{EventStore, HttpStore, LocalStore, SessionGateway};
use sealcal_sync::{SaveQueue, SaveStatus, SyncConfig, SyncController};

const ACCOUNT_PASSWORD_VAR: &str = "SEALCAL_ACCOUNT_PASSWORD";
const PASSWORD_VAR: &str = "SEALCAL_PASSWORD";

#[derive(Parser)]
#[command(name = "sealcal")]
#[command(about = "sealcal - Encrypted personal calendar")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Configuration file (default: <config dir>/sealcal/config.json).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Calendar server URL, overriding the configuration.
    #[arg(short, long, conflicts_with = "local")]
    server: Option<String>,

    /// Keep the calendar in a local file instead of on a server.
    #[arg(short, long)]
    local: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all events.
    List,

    /// List events from today on, soonest first.
    Upcoming,

    /// Add an event.
    Add {
        /// Event title.
        #[arg(short, long)]
        title: String,

        /// Date as YYYY-MM-DD.
        #[arg(short, long)]
        date: NaiveDate,

        /// Time as HH:MM.
        #[arg(long, value_parser = parse_time)]
        time: Option<NaiveTime>,

        /// Free-form description.
        #[arg(long)]
        description: Option<String>,
    },

    /// Remove an event by id.
    Remove {
        /// Event id as shown by `list`.
        #[arg(short, long)]
        id: String,
    },

    /// List events on one date.
    On {
        /// Date as YYYY-MM-DD.
        #[arg(short, long)]
        date: NaiveDate,
    },
}

impl Commands {
    fn mutates(&self) -> bool {
        matches!(self, Commands::Add { .. } | Commands::Remove { .. })
    }
}

/// Where the envelope lives, and how to reach its session boundary.
struct Backend {
    store: Arc<dyn EventStore>,
    gateway: Option<Arc<dyn SessionGateway>>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install logger: {}", e);
    }

    if let Err(err) = run(cli).await {
        match err.downcast_ref::<sealcal_common::Error>() {
            Some(e) => eprintln!("{}", e.user_message()),
            None => eprintln!("Error: {:#}", err),
        }
        debug!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref(), cli.server)?;
    let backend = open_backend(&config, cli.local.as_deref())?;
    let sync: Arc<SyncController> = Arc::new(SyncController::new(backend.store.clone()));
    let gateway = backend.gateway.as_deref();

    if let Some(gateway) = gateway {
        let account = secret(ACCOUNT_PASSWORD_VAR, "Account password: ")?;
        sync.login(gateway, &account)
            .await
            .context("Failed to log in")?;
    }

    logged_in(&sync, gateway, async {
        let password = secret(PASSWORD_VAR, "Encryption password: ")?;
        sync.unlock(&password).await?;
        drop(password);
        session(&sync, &config, cli.command).await
    })
    .await
}

/// Run `work`, then drop local secrets and close the server session
/// whatever the outcome.
async fn logged_in<F>(
    sync: &SyncController,
    gateway: Option<&dyn SessionGateway>,
    work: F,
) -> Result<()>
where
    F: Future<Output = Result<()>>,
{
    let result = work.await;

    match gateway {
        Some(gateway) => {
            if let Err(e) = sync.logout(gateway).await {
                debug!("Server logout failed: {}", e);
            }
        }
        None => sync.clear().await,
    }

    result
}

/// Load, apply the command, and save through the queue if anything changed.
async fn session(sync: &Arc<SyncController>, config: &SyncConfig, command: Commands) -> Result<()> {
    let mut events = sync.load().await?;
    debug!("Loaded {} events", events.len());

    let mutates = command.mutates();
    match command {
        Commands::List => cmd_list(&events),
        Commands::Upcoming => print_events(&events.upcoming(Local::now().date_naive())),
        Commands::On { date } => print_events(&events.on_date(date)),
        Commands::Add {
            title,
            date,
            time,
            description,
        } => cmd_add(&mut events, title, date, time, description)?,
        Commands::Remove { id } => cmd_remove(&mut events, &id)?,
    }

    if mutates {
        save(sync, config, events).await?;
    }
    Ok(())
}

async fn save(sync: &Arc<SyncController>, config: &SyncConfig, events: EventCollection) -> Result<()> {
    let (queue, task) = SaveQueue::spawn(sync.clone(), config);
    queue.collection_changed(events).await?;
    let status = queue.flush().await?;
    queue.shutdown().await?;
    task.await.context("Save queue task failed")?;

    match status {
        SaveStatus::Saved => {
            info!("Calendar saved");
            Ok(())
        }
        SaveStatus::Failed(message) => anyhow::bail!(message),
        other => anyhow::bail!("Save did not complete ({:?})", other),
    }
}

fn cmd_list(events: &EventCollection) {
    let mut all: Vec<&Event> = events.iter().collect();
    all.sort_by(|a, b| (a.date, a.time).cmp(&(b.date, b.time)));
    print_events(&all);
}

fn cmd_add(
    events: &mut EventCollection,
    title: String,
    date: NaiveDate,
    time: Option<NaiveTime>,
    description: Option<String>,
) -> Result<()> {
    let mut new = NewEvent::new(title, date);
    if let Some(time) = time {
        new = new.with_time(time);
    }
    if let Some(description) = description {
        new = new.with_description(description);
    }

    let id = events.add(new).context("Invalid event")?;
    println!("Added event {}", id);
    Ok(())
}

fn cmd_remove(events: &mut EventCollection, id: &str) -> Result<()> {
    let id = EventId::new(id).context("Invalid event id")?;
    if !events.remove(&id) {
        anyhow::bail!("No event with id {}", id);
    }
    println!("Removed event {}", id);
    Ok(())
}

fn print_events(events: &[&Event]) {
    if events.is_empty() {
        println!("No events.");
        return;
    }

    for event in events {
        let time = event
            .time
            .map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".to_string());
        println!("{} {}  {}  [{}]", event.date, time, event.title, event.id);
        if let Some(description) = &event.description {
            println!("    {}", description);
        }
    }
}

fn load_config(path: Option<&Path>, server: Option<String>) -> Result<SyncConfig> {
    let default_path = dirs::config_dir().map(|dir| dir.join("sealcal").join("config.json"));

    let mut config = match (path, default_path) {
        (Some(path), _) => SyncConfig::load(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        (None, Some(path)) if path.exists() => SyncConfig::load(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?,
        _ => SyncConfig::default(),
    };

    if let Some(server) = server {
        config.server_url = server;
    }
    Ok(config)
}

fn open_backend(config: &SyncConfig, local: Option<&Path>) -> Result<Backend> {
    if let Some(path) = local {
        info!("Using local calendar at {}", path.display());
        let store = LocalStore::new(path).context("Failed to open local calendar")?;
        return Ok(Backend {
            store: Arc::new(store),
            gateway: None,
        });
    }

    info!("Using calendar server {}", config.server_url);
    let http = Arc::new(
        HttpStore::new(&config.server_url, config.request_timeout)
            .context("Failed to set up server connection")?,
    );
    Ok(Backend {
        store: http.clone(),
        gateway: Some(http),
    })
}

/// Read a secret from the environment, or prompt for it.
fn secret(var: &str, prompt: &str) -> Result<Zeroizing<String>> {
    if let Ok(value) = std::env::var(var) {
        debug!("Using password from {}", var);
        return Ok(Zeroizing::new(value));
    }
    let value = rpassword::prompt_password(prompt).context("Failed to read password")?;
    Ok(Zeroizing::new(value))
}

fn parse_time(s: &str) -> std::result::Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M").map_err(|_| format!("expected HH:MM, got {:?}", s))
}
