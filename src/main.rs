use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::catalog::{CatalogEntry, FallbackPolicy, StandardsCatalog};
use crate::scoring::ScoringEngine;
use crate::slri::SlriAssessor;

mod catalog;
mod db;
mod input;
mod models;
mod normalize;
mod report;
mod scoring;
mod slri;
mod trends;
mod value;

#[derive(Parser)]
#[command(name = "envrisk")]
#[command(about = "Score environmental measurements against Moroccan reference standards", long_about = None)]
struct Cli {
    /// JSON standards catalog replacing the built-in one
    #[arg(long, global = true, env = "ENVRISK_CATALOG")]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy)]
struct ScoringArgs {
    /// Use parameter-specific wording ("Trop acide", ...) for out-of-range statuses
    #[arg(long, default_value_t = false)]
    domain_status: bool,

    /// Only use the primary and extended tables; unknown parameters stay unscored
    #[arg(long, default_value_t = false)]
    strict_standards: bool,
}

impl ScoringArgs {
    fn engine<'a>(&self, catalog: &'a StandardsCatalog) -> anyhow::Result<ScoringEngine<'a>> {
        let policy = if self.strict_standards {
            FallbackPolicy::Strict
        } else {
            FallbackPolicy::Permissive
        };
        Ok(ScoringEngine::new(catalog)?
            .with_policy(policy)
            .with_domain_status(self.domain_status))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Score extracted rows and write the augmented table
    Score {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out: Option<PathBuf>,
        /// Write JSON records with the intermediate results instead of CSV
        #[arg(long, default_value_t = false)]
        json: bool,
        #[command(flatten)]
        scoring: ScoringArgs,
    },
    /// Generate a markdown scoring summary
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
        /// Write the summary as JSON instead of markdown
        #[arg(long, default_value_t = false)]
        json: bool,
        #[command(flatten)]
        scoring: ScoringArgs,
    },
    /// Run an SLRI risk amplitude assessment across project phases
    Slri {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value = "slri.md")]
        out: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// List the active standards, or resolve one parameter name
    Catalog {
        parameter: Option<String>,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Create or upgrade the database schema
    InitDb,
    /// Score a file and store the run in the monitoring history
    Record {
        #[arg(long)]
        site: String,
        #[arg(long)]
        input: PathBuf,
        /// Measurement date, defaults to today
        #[arg(long)]
        recorded_on: Option<NaiveDate>,
        #[command(flatten)]
        scoring: ScoringArgs,
    },
    /// Per-parameter trends over the stored history of a site
    Trends {
        #[arg(long)]
        site: String,
        #[arg(long, default_value_t = 90)]
        since_days: i64,
        #[arg(long, default_value_t = trends::DEFAULT_STABLE_THRESHOLD)]
        stable_threshold: f64,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(err) = run().await {
        error!(error = %err, "command failed");
        for cause in err.chain().skip(1) {
            error!(cause = %cause, "caused by");
        }
        std::process::exit(1);
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let catalog = load_catalog(cli.catalog.as_deref())?;

    match cli.command {
        Commands::Score {
            input,
            out,
            json,
            scoring,
        } => {
            let engine = scoring.engine(&catalog)?;
            let scored = engine.score_all(&input::read_readings(&input)?);
            let writer = open_output(out.as_deref())?;
            if json {
                input::write_scored_json(writer, &scored)?;
            } else {
                input::write_scored_csv(writer, &scored)?;
            }
            if let Some(out) = out {
                println!("Scored {} rows into {}.", scored.len(), out.display());
            }
        }
        Commands::Report {
            input,
            out,
            json,
            scoring,
        } => {
            let engine = scoring.engine(&catalog)?;
            let scored = engine.score_all(&input::read_readings(&input)?);
            let content = if json {
                to_json(&report::summarize(&scored))?
            } else {
                report::build_scoring_report(&scored)
            };
            write_file(&out, &content)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Slri { input, out, json } => {
            let engine = ScoringEngine::new(&catalog)?;
            let rows = input::read_slri_rows(&input)?;
            let assessment = SlriAssessor::new(&engine).assess(&rows);
            let content = if json {
                to_json(&assessment)?
            } else {
                report::build_slri_report(&assessment)
            };
            write_file(&out, &content)?;
            println!(
                "SLRI assessment written to {} ({} major risks).",
                out.display(),
                assessment.major_risks.len()
            );
        }
        Commands::Catalog { parameter, json } => match parameter {
            Some(name) => print_resolved(&catalog, &name, json)?,
            None => print_catalog(&catalog, json)?,
        },
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Record {
            site,
            input,
            recorded_on,
            scoring,
        } => {
            let engine = scoring.engine(&catalog)?;
            let scored = engine.score_all(&input::read_readings(&input)?);
            let recorded_on = recorded_on.unwrap_or_else(|| Utc::now().date_naive());

            let pool = connect().await?;
            let run_id = db::record_run(
                &pool,
                &site,
                recorded_on,
                &input.display().to_string(),
                &scored,
            )
            .await?;
            println!(
                "Recorded {} readings for {site} on {recorded_on} (run {run_id}).",
                scored.len()
            );
        }
        Commands::Trends {
            site,
            since_days,
            stable_threshold,
            out,
        } => {
            let since_date = trends::cutoff_date(since_days);
            let pool = connect().await?;
            let observations = db::fetch_observations(&pool, &site, since_date).await?;
            let trends = trends::compute_trends(&observations, stable_threshold);
            let content = report::build_trend_report(&site, since_date, &trends);

            match out {
                Some(out) => {
                    write_file(&out, &content)?;
                    println!("Trend report written to {}.", out.display());
                }
                None => print!("{content}"),
            }
        }
    }

    Ok(())
}

fn load_catalog(path: Option<&Path>) -> anyhow::Result<StandardsCatalog> {
    match path {
        Some(path) => StandardsCatalog::from_json_file(path),
        None => StandardsCatalog::morocco().context("built-in standards catalog is invalid"),
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;
    info!("connected to Postgres");
    Ok(pool)
}

fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    match path {
        Some(path) => {
            let file = fs::File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Ok(Box::new(BufWriter::new(file)))
        }
        None => Ok(Box::new(io::stdout().lock())),
    }
}

fn write_file(path: &Path, content: &str) -> anyhow::Result<()> {
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

fn to_json<T: Serialize>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize JSON")
}

fn print_catalog(catalog: &StandardsCatalog, json: bool) -> anyhow::Result<()> {
    #[derive(Serialize)]
    struct CatalogView<'a> {
        primary: &'a [CatalogEntry],
        extended: &'a [CatalogEntry],
    }

    if json {
        println!(
            "{}",
            to_json(&CatalogView {
                primary: catalog.primary(),
                extended: catalog.extended(),
            })?
        );
        return Ok(());
    }

    for (title, entries) in [("Standards", catalog.primary()), ("Standards complémentaires", catalog.extended())] {
        println!("{title}:");
        for entry in entries {
            println!(
                "- {}: {} ({})",
                entry.name,
                entry.standard.interval_label(),
                entry.standard.category
            );
        }
    }
    Ok(())
}

fn print_resolved(catalog: &StandardsCatalog, name: &str, json: bool) -> anyhow::Result<()> {
    let engine = ScoringEngine::new(catalog)?;
    let canonical = engine.normalizer().normalize(name);

    match catalog.get(&canonical) {
        Some(standard) if json => println!(
            "{}",
            to_json(&CatalogEntry {
                name: canonical.clone(),
                standard: standard.clone(),
            })?
        ),
        Some(standard) => println!(
            "{name} -> {canonical}: {} ({})",
            standard.interval_label(),
            standard.category
        ),
        None => println!("{name}: no standard in the catalog."),
    }
    Ok(())
}
