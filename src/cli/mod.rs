use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use once_cell::sync::OnceCell;
use time::Date;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppConfig, ConfigLoader, CONFIG_ENV, DATA_ENV};
use crate::expiry::{Clock, FixedClock, SystemClock};
use crate::model::parse_date;
use crate::storage::{self, ItemRepository};

pub mod commands;

use self::commands::{AddArgs, EditArgs, IdArgs, ListArgs, RemindArgs, SearchArgs};

#[derive(Parser, Debug)]
#[command(
    name = "larder",
    version,
    about = "Keep track of perishables and when they expire"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Override the config file location (takes precedence over LARDER_CONFIG)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the data directory (takes precedence over LARDER_DATA)
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Minimum log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Evaluate expiry as of this date (YYYY-MM-DD) instead of today
    #[arg(long, value_parser = parse_date_arg)]
    pub today: Option<Date>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Record a new item
    Add(AddArgs),
    /// Change fields of an existing item
    Edit(EditArgs),
    /// Delete an item
    Remove(IdArgs),
    /// Print every field of one item
    Show(IdArgs),
    /// List items with their expiry status (default)
    List(ListArgs),
    /// Case-insensitive substring search over name, category and note
    Search(SearchArgs),
    /// Print the categories currently in use
    Categories,
    /// Show items that are expiring soon or already expired
    Remind(RemindArgs),
}

/// What every command runs against.
#[derive(Clone)]
pub struct Session {
    pub config: Arc<AppConfig>,
    pub repo: Arc<dyn ItemRepository>,
    pub clock: Arc<dyn Clock>,
}

impl Session {
    pub fn today(&self) -> Date {
        self.clock.today()
    }
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    if let Some(path) = &cli.config {
        env::set_var(CONFIG_ENV, path);
    }
    if let Some(path) = &cli.data_dir {
        env::set_var(DATA_ENV, path);
    }

    let loader = ConfigLoader::discover()?;
    loader.paths().ensure_directories()?;
    let paths = loader.paths().clone();
    init_tracing(&cli.log_level)
        .with_context(|| format!("initialising logging at level {}", cli.log_level))?;
    let config = loader.load_or_init()?;
    let repo = storage::init(&paths, &config.storage)?;
    let clock: Arc<dyn Clock> = match cli.today {
        Some(date) => Arc::new(FixedClock(date)),
        None => Arc::new(SystemClock),
    };

    let session = Session {
        config: Arc::new(config),
        repo,
        clock,
    };
    let command = cli
        .command
        .unwrap_or_else(|| Commands::List(ListArgs::default()));
    match command {
        Commands::Add(args) => commands::add_item(&session, args),
        Commands::Edit(args) => commands::edit_item(&session, args),
        Commands::Remove(args) => commands::remove_item(&session, args),
        Commands::Show(args) => commands::show_item(&session, args),
        Commands::List(args) => commands::list_items(&session, args),
        Commands::Search(args) => commands::search_items(&session, args),
        Commands::Categories => commands::list_categories(&session),
        Commands::Remind(args) => commands::remind(&session, args),
    }
}

pub(crate) fn parse_date_arg(raw: &str) -> Result<Date, String> {
    parse_date(raw).map_err(|err| err.to_string())
}

fn init_tracing(level: &str) -> Result<()> {
    static INIT: OnceCell<()> = OnceCell::new();
    INIT.get_or_try_init(|| {
        let env_filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));
        fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
        Ok(())
    })
    .map(|_| ())
}
