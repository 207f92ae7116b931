use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

mod allocator;
mod churn;
mod config;
mod db;
mod error;
mod generator;
mod models;
mod overlap;
mod report;
mod snapshot;
mod source;
mod store;

use config::Campaign;
use db::PgUnitOfWork;
use generator::GenerateOptions;
use store::{AdmissionStore, MemoryStore, UnitOfWork};

#[derive(Parser)]
#[command(name = "admission-cutoff")]
#[command(about = "Admission passing score tracker across days of applicant intake", long_about = None)]
struct Cli {
    /// Campaign file (programs, capacities, days, overlap counts); the
    /// built-in four-program campaign is used when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Delete every applicant, application and passing score
    Reset,
    /// Generate per-program applicant lists from the overlap counts
    #[command(group(
        ArgGroup::new("days")
            .args(["day", "all"])
            .required(true)
            .multiple(false)
    ))]
    Generate {
        #[arg(long)]
        day: Option<String>,
        #[arg(long)]
        all: bool,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
        /// Do not top up consents on the last day
        #[arg(long)]
        skip_consent_fix: bool,
    },
    /// Load one day's lists and record its passing scores
    Load {
        #[arg(long)]
        day: String,
        #[arg(long, default_value = ".")]
        dir: PathBuf,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Show passing scores for the current data without recording them
    Cutoffs,
    /// Generate a markdown report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Export every applicant with their applications as CSV
    Overall {
        #[arg(long, default_value = "overall.csv")]
        out: PathBuf,
    },
    /// Generate and load every day in memory, without a database
    Simulate {
        #[arg(long)]
        dir: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        report: Option<PathBuf>,
    },
}

fn rng_from(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

fn generate(
    campaign: &Campaign,
    labels: &[String],
    out_dir: &Path,
    options: GenerateOptions,
    rng: &mut StdRng,
) -> anyhow::Result<()> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;

    for label in labels {
        let applicants = generator::generate_day(campaign, label, options, rng)?;
        let written = generator::write_day(campaign, label, &applicants, out_dir)?;
        println!(
            "Day {label}: {} applicants written to {} files in {}.",
            applicants.len(),
            written.len(),
            out_dir.display()
        );
    }
    Ok(())
}

async fn print_cutoffs<S: AdmissionStore>(store: &mut S, campaign: &Campaign) -> anyhow::Result<()> {
    println!("Current passing scores:");
    for (program, cutoff) in allocator::current_cutoffs(store, campaign).await? {
        println!("- {program}: {cutoff}");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let campaign = Campaign::load(cli.config.as_deref())
        .context("failed to load campaign configuration")?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Reset => {
            let pool = connect().await?;
            let mut work = PgUnitOfWork::begin(&pool).await?;
            work.clear().await?;
            work.commit().await?;
            println!("Admission data cleared.");
        }
        Commands::Generate {
            day,
            all,
            out_dir,
            seed,
            skip_consent_fix,
        } => {
            let labels: Vec<String> = match day {
                Some(day) if !all => vec![day],
                _ => campaign.days.iter().map(|day| day.label.clone()).collect(),
            };
            let options = GenerateOptions {
                consent_fix: !skip_consent_fix,
            };
            generate(&campaign, &labels, &out_dir, options, &mut rng_from(seed))?;
        }
        Commands::Load { day, dir, seed } => {
            let pool = connect().await?;
            let work = PgUnitOfWork::begin(&pool).await?;
            let outcome =
                snapshot::process_snapshot(work, &campaign, &day, &dir, &mut rng_from(seed))
                    .await
                    .with_context(|| format!("failed to load day {day}"))?;

            if let Some(churn) = outcome.churn {
                println!(
                    "Churn: {} applicants removed, {} updated, {} consents flipped.",
                    churn.deleted, churn.mutated, churn.consent_flips
                );
            }
            for (program, summary) in &outcome.ingested {
                println!(
                    "- {program}: {} records ({} new applicants)",
                    summary.records, summary.new_applicants
                );
            }
            for program in &outcome.skipped {
                println!("- {program}: no list for day {day}, skipped");
            }
            println!(
                "Passing scores for {} (day {} of {}):",
                outcome.snapshot.label,
                outcome.snapshot.ordinal + 1,
                campaign.days.len()
            );
            for score in &outcome.scores {
                println!("- {}: {}", score.program, score.cutoff);
            }
        }
        Commands::Cutoffs => {
            let pool = connect().await?;
            let mut work = PgUnitOfWork::begin(&pool).await?;
            print_cutoffs(&mut work, &campaign).await?;
        }
        Commands::Report { out } => {
            let pool = connect().await?;
            let mut work = PgUnitOfWork::begin(&pool).await?;
            let reports = report::collect(&mut work, &campaign).await?;
            let content = report::build_report(&campaign, chrono::Utc::now(), &reports);
            std::fs::write(&out, content)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Overall { out } => {
            let pool = connect().await?;
            let mut work = PgUnitOfWork::begin(&pool).await?;
            let overall = report::OverallList::collect(&mut work, &campaign).await?;
            overall.write_csv(&out)?;
            println!(
                "Wrote {} applicants to {}.",
                overall.applicants.len(),
                out.display()
            );
        }
        Commands::Simulate {
            dir,
            seed,
            report: report_out,
        } => {
            let dir = dir.unwrap_or_else(|| {
                std::env::temp_dir().join(format!("admission-simulation-{}", uuid::Uuid::new_v4()))
            });
            let mut rng = rng_from(seed);
            let labels: Vec<String> = campaign.days.iter().map(|day| day.label.clone()).collect();
            generate(&campaign, &labels, &dir, GenerateOptions::default(), &mut rng)?;

            let mut store = MemoryStore::new();
            for label in &labels {
                snapshot::process_snapshot(store.begin(), &campaign, label, &dir, &mut rng)
                    .await
                    .with_context(|| format!("failed to load day {label}"))?;
            }
            info!("simulation sources kept in {}", dir.display());

            let reports = report::collect(&mut store, &campaign).await?;
            println!("Passing scores by day:");
            print!("{}", report::passing_score_table(&campaign, &reports));
            print_cutoffs(&mut store, &campaign).await?;

            if let Some(out) = report_out {
                let content = report::build_report(&campaign, chrono::Utc::now(), &reports);
                std::fs::write(&out, content)?;
                println!("Report written to {}.", out.display());
            }
        }
    }

    Ok(())
}
