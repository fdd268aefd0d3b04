use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{builder::ArgAction, Parser, Subcommand};
use console::{style, Emoji};
use harvester::{
  config::{HarvestConfig, Settings},
  database::Database,
  harvest::Harvester,
};
use harvesterd::{api, errors::HarvesterdError, harvest_into, scheduler, today};
use tracing::{debug, trace};
use tracing_appender::rolling;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static BOOKS: Emoji<'_, '_> = Emoji("📚 ", "");
static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "");
static SATELLITE: Emoji<'_, '_> = Emoji("📡 ", "");
static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
static CLOCK: Emoji<'_, '_> = Emoji("⏰ ", "");
static WARNING: Emoji<'_, '_> = Emoji("⚠️  ", "");
static SUCCESS: Emoji<'_, '_> = Emoji("✨ ", "");

#[derive(Parser)]
#[command(author, version, about = "Daemon, CLI and HTTP API for the OAI-PMH harvester")]
struct Cli {
  /// Verbose mode (-v, -vv, -vvv)
  #[arg(
        short,
        long,
        action = ArgAction::Count,
        global = true,
        help = "Increase logging verbosity"
    )]
  verbose: u8,

  /// Path to the record store, overriding STORE_PATH
  #[arg(long, short, global = true)]
  database: Option<PathBuf>,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Initialize a new record store
  Init {
    /// Path where the store should be created
    #[arg(long, short)]
    path: Option<PathBuf>,
  },
  /// Run exactly one harvest cycle
  Harvest {
    /// Set to harvest instead of the configured ARXSET
    #[arg(long, short)]
    set:   Option<String>,
    /// Harvest records up to this date (YYYY-MM-DD), today by default
    #[arg(long, short)]
    until: Option<NaiveDate>,
  },
  /// Serve the HTTP API
  Serve {
    /// Address to listen on, overriding APP_HOST and APP_PORT
    #[arg(long, short)]
    bind: Option<String>,
  },
  /// Harvest now and then once per ARXCHECKTIMEMINUTES until Ctrl-C
  Watch {
    /// Also write daily-rotated log files to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
  },
}

/// Setup logging with the specified verbosity level, optionally also into rotating files
fn setup_logging(verbosity: u8, log_dir: Option<&Path>) -> Result<(), HarvesterdError> {
  let filter = match verbosity {
    0 => "warn",
    1 => "info",
    2 => "debug",
    _ => "trace",
  };

  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

  let stdout_layer = tracing_subscriber::fmt::layer()
    .with_file(true)
    .with_line_number(true)
    .with_thread_ids(true)
    .with_target(true);

  let file_layer = match log_dir {
    Some(log_dir) => {
      std::fs::create_dir_all(log_dir)?;
      let file_appender = rolling::RollingFileAppender::builder()
        .rotation(rolling::Rotation::DAILY)
        .filename_prefix("harvesterd")
        .filename_suffix("log")
        .build(log_dir)?;

      Some(
        tracing_subscriber::fmt::layer()
          .with_writer(file_appender)
          .with_ansi(false)
          .with_thread_ids(true)
          .with_target(true)
          .with_file(true)
          .with_line_number(true),
      )
    },
    None => None,
  };

  tracing_subscriber::registry().with(filter).with(stdout_layer).with(file_layer).init();
  Ok(())
}

/// Resolves the store location: command line first, then STORE_PATH, then the default.
fn resolve_store(cli_path: Option<PathBuf>, settings: &Settings) -> PathBuf {
  let path = cli_path.unwrap_or_else(|| harvesterd::store_path(settings));
  trace!("Using record store at: {}", path.display());
  path
}

#[tokio::main]
async fn main() -> Result<(), HarvesterdError> {
  let cli = Cli::parse();
  let log_dir = match &cli.command {
    Commands::Watch { log_dir } => log_dir.as_deref(),
    _ => None,
  };
  setup_logging(cli.verbose, log_dir)?;

  let settings = Settings::load();
  debug!("Loaded settings: {}", harvesterd::describe_settings(&settings));

  match cli.command {
    Commands::Init { path } => {
      let path = match path.or(cli.database) {
        Some(path) => path,
        None => {
          let default_path = harvesterd::store_path(&settings);
          println!(
            "{} Using record store path: {}",
            style(BOOKS).cyan(),
            style(default_path.display()).yellow()
          );
          default_path
        },
      };

      if path.exists() {
        println!(
          "{} Record store already exists at: {}",
          style(WARNING).yellow(),
          style(path.display()).yellow()
        );
      } else {
        println!(
          "{} Initializing record store at: {}",
          style(ROCKET).cyan(),
          style(path.display()).yellow()
        );
      }

      let db = Database::open(&path).await?;
      let count = db.count_documents().await?;
      db.close().await?;

      println!(
        "{} Record store ready with {} articles",
        style(SUCCESS).green(),
        style(count).yellow()
      );
      Ok(())
    },

    Commands::Harvest { set, until } => {
      let harvester = Harvester::new(HarvestConfig::from_settings(&settings)?);
      let path = resolve_store(cli.database, &settings);
      let until = until.unwrap_or_else(today);
      let set_name = set.as_deref().unwrap_or(harvester.config().set()).to_string();

      println!(
        "{} Harvesting set {} until {} from {}",
        style(SATELLITE).cyan(),
        style(&set_name).yellow(),
        style(until).yellow(),
        style(harvester.config().host()).blue().underlined()
      );

      let summary = harvest_into(&harvester, &path, Some(until), set.as_deref()).await?;

      println!(
        "\n{} Stored {} of {} harvested records in {}",
        style(SAVE).green(),
        style(summary.inserted).yellow(),
        style(summary.harvested).yellow(),
        style(path.display()).yellow()
      );
      if summary.discarded > 0 {
        println!(
          "   {} {} records were discarded, run with -v for details",
          style(WARNING).yellow(),
          style(summary.discarded).yellow()
        );
      }
      Ok(())
    },

    Commands::Serve { bind } => {
      let harvester = Harvester::new(HarvestConfig::from_settings(&settings)?);
      let path = resolve_store(cli.database, &settings);
      let bind = match bind {
        Some(bind) => bind,
        None => harvesterd::bind_address(&settings)?,
      };

      println!(
        "{} Serving the HTTP API on {} (store: {})",
        style(ROCKET).cyan(),
        style(&bind).yellow(),
        style(path.display()).yellow()
      );

      api::serve(api::AppState::new(harvester, path), &bind).await
    },

    Commands::Watch { .. } => {
      let harvester = Harvester::new(HarvestConfig::from_settings(&settings)?);
      let path = resolve_store(cli.database, &settings);

      println!(
        "{} Harvesting set {} every {} minutes, press Ctrl-C to stop",
        style(CLOCK).cyan(),
        style(harvester.config().set()).yellow(),
        style(harvester.config().check_interval().as_secs() / 60).yellow()
      );

      let report = scheduler::watch(&harvester, &path, api::shutdown_signal()).await;

      println!(
        "\n{} Stopped after {} cycles ({} failed)",
        style(SUCCESS).green(),
        style(report.cycles).yellow(),
        style(report.failures).yellow()
      );
      Ok(())
    },
  }
}
