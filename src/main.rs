use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;
use tracing_subscriber::EnvFilter;

use recovery_attribution::store::RecordStore;
use recovery_attribution::{db, report, AnalysisConfig, AttributionEngine, CsvRecordStore, InMemoryRecordStore};

#[derive(Parser)]
#[command(name = "recovery-attribution")]
#[command(about = "Attributes recovery dips to sleep, exercise and nutrition", long_about = None)]
struct Cli {
    /// Read daily records from a CSV export instead of Postgres
    #[arg(long, global = true)]
    csv: Option<PathBuf>,
    /// JSON file with analysis threshold overrides
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    max_lag_days: Option<u32>,
    #[arg(long, global = true)]
    abnormal_z: Option<f64>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct WindowArgs {
    #[arg(long)]
    user: String,
    #[arg(long, default_value_t = 30, allow_negative_numbers = true)]
    window_days: i64,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Import daily records from a CSV file into Postgres
    Import {
        #[arg(long)]
        file: PathBuf,
    },
    /// List users with stored records
    Users,
    /// Print the attribution summary as JSON
    Summary(WindowArgs),
    /// Print the annotated day-by-day series as JSON
    Timeseries(WindowArgs),
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        window: WindowArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set when --csv is not given")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn resolve_config(
    path: Option<&Path>,
    max_lag_days: Option<u32>,
    abnormal_z: Option<f64>,
) -> anyhow::Result<AnalysisConfig> {
    let mut config = match path {
        Some(path) => AnalysisConfig::load(path)?,
        None => AnalysisConfig::default(),
    };
    if let Some(lag) = max_lag_days {
        config.max_lag_days = lag;
    }
    if let Some(z) = abnormal_z {
        config.abnormal_abs_z = z;
    }
    config.validate()?;
    Ok(config)
}

async fn open_store(csv: Option<&Path>, user_id: &str) -> anyhow::Result<Box<dyn RecordStore>> {
    if let Some(path) = csv {
        return Ok(Box::new(CsvRecordStore::from_path(path)?));
    }

    let pool = connect().await?;
    let records = db::fetch_records(&pool, user_id).await?;
    info!(user_id, records = records.len(), "loaded records from Postgres");

    let mut store = InMemoryRecordStore::new();
    if !records.is_empty() {
        store.insert(user_id, records);
    }
    Ok(Box::new(store))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        csv,
        config,
        max_lag_days,
        abnormal_z,
        command,
    } = Cli::parse();
    let config = resolve_config(config.as_deref(), max_lag_days, abnormal_z)?;

    match command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Import { file } => {
            let pool = connect().await?;
            let written = db::import_csv(&pool, &file).await?;
            println!("Imported {written} daily records from {}.", file.display());
        }
        Commands::Users => {
            let users: Vec<String> = match csv.as_deref() {
                Some(path) => CsvRecordStore::from_path(path)?
                    .user_ids()
                    .map(str::to_string)
                    .collect(),
                None => db::list_users(&connect().await?).await?,
            };
            if users.is_empty() {
                println!("No users found.");
            }
            for user in users {
                println!("{user}");
            }
        }
        Commands::Summary(args) => {
            let store = open_store(csv.as_deref(), &args.user).await?;
            let engine = AttributionEngine::new(store, config)?;
            let summary = engine.compute_summary(&args.user, args.window_days)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Timeseries(args) => {
            let store = open_store(csv.as_deref(), &args.user).await?;
            let engine = AttributionEngine::new(store, config)?;
            let timeseries = engine.compute_timeseries(&args.user, args.window_days)?;
            println!("{}", serde_json::to_string_pretty(&timeseries)?);
        }
        Commands::Report { window, out } => {
            let store = open_store(csv.as_deref(), &window.user).await?;
            let engine = AttributionEngine::new(store, config)?;
            let summary = engine.compute_summary(&window.user, window.window_days)?;
            let timeseries = engine.compute_timeseries(&window.user, window.window_days)?;
            let evidence = engine.compute_dip_evidence(&window.user, window.window_days)?;

            let report = report::build_report(&summary, &timeseries, &evidence, engine.config());
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
