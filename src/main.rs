//! Foresight: multi-tenant prediction pipeline
//!
//! CLI entry point: continuous pipeline loop, single-shot cycles, catalog
//! seeding, and a status summary.

use clap::{Parser, Subcommand};
use foresight::{
    catalog::{seed_system_analysts, seed_system_strategies},
    config::Config,
    detector::Signal,
    evaluator::Evaluation,
    pipeline::Pipeline,
    predictions::Prediction,
    storage::{Database, DocFilter},
    types::PredictionStatus,
};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "foresight")]
#[command(about = "Multi-tenant prediction pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, default_value = "foresight.toml")]
    config: String,

    /// Organization to operate on
    #[arg(short, long, default_value = "default")]
    org: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline loop continuously
    Run,
    /// Run exactly one pipeline cycle and exit
    Tick,
    /// Seed the system analysts and strategies for an org
    Seed,
    /// Show a pipeline summary for an org
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)?;

    match cli.command {
        Commands::Run => run_loop(config, &cli.org).await,
        Commands::Tick => run_once(config, &cli.org).await,
        Commands::Seed => seed(config, &cli.org).await,
        Commands::Status => show_status(config, &cli.org).await,
    }
}

async fn run_loop(config: Config, org: &str) -> anyhow::Result<()> {
    tracing::info!(org, "starting pipeline loop");
    let db = Database::connect(&config.database.url).await?;
    let interval = Duration::from_secs(config.scheduler.tick_interval_secs);
    let pipeline = Pipeline::new(db, config);

    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match pipeline.run_cycle(org).await {
            Ok(report) => {
                tracing::info!(
                    articles = report.articles_created,
                    signals = report.signals_created,
                    predictions = report.predictions_emitted,
                    "cycle finished"
                );
            }
            Err(e) => {
                // Next tick retries; every stage is idempotent.
                tracing::error!("cycle failed: {}", e);
            }
        }
    }
}

async fn run_once(config: Config, org: &str) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.url).await?;
    let pipeline = Pipeline::new(db, config);
    let report = pipeline.run_cycle(org).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn seed(config: Config, org: &str) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.url).await?;
    let catalog = foresight::catalog::CatalogStore::new(db);
    let analysts = seed_system_analysts(&catalog, org).await?;
    let strategies = seed_system_strategies(&catalog, org).await?;
    println!("seeded {} analysts, {} strategies", analysts, strategies);
    Ok(())
}

async fn show_status(config: Config, org: &str) -> anyhow::Result<()> {
    let db = Database::connect(&config.database.url).await?;

    let active = db
        .count::<Prediction>(
            org,
            &DocFilter::default()
                .status(PredictionStatus::Active.as_str())
                .test(false),
        )
        .await?;
    let resolved = db
        .count::<Prediction>(
            org,
            &DocFilter::default()
                .status(PredictionStatus::Resolved.as_str())
                .test(false),
        )
        .await?;
    let signals = db
        .count::<Signal>(org, &DocFilter::default().test(false))
        .await?;
    let evaluations: Vec<Evaluation> = db.list(org, &DocFilter::default().test(false)).await?;
    let accuracy = if evaluations.is_empty() {
        None
    } else {
        Some(
            evaluations.iter().filter(|e| e.direction_correct).count() as f64
                / evaluations.len() as f64,
        )
    };

    println!("org:                {}", org);
    println!("signals:            {}", signals);
    println!("active predictions: {}", active);
    println!("resolved:           {}", resolved);
    match accuracy {
        Some(a) => println!("direction accuracy: {:.1}%", a * 100.0),
        None => println!("direction accuracy: n/a"),
    }
    Ok(())
}
