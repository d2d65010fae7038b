use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;

mod buckets;
mod completion;
mod db;
mod deltas;
mod models;
mod report;

use models::{CompletionMode, Granularity, OverallStats};

#[derive(Parser)]
#[command(name = "backoffice-analytics")]
#[command(about = "Back-office analytics toolkit for the learning platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import signup profiles from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Show headline stats, with deltas against a stored snapshot
    Stats {
        #[arg(long, default_value_t = 30)]
        active_days: i64,
        /// JSON file holding the previous snapshot; rewritten afterwards
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },
    /// Chart new-user signups per day or week
    Chart {
        #[arg(long, value_enum, default_value = "week")]
        period: Granularity,
        #[arg(long, default_value_t = 90)]
        window_days: i64,
        /// Keep only buckets starting on or after this date (YYYY-MM-DD)
        #[arg(long)]
        start: Option<NaiveDate>,
        /// Keep only buckets starting on or before this date (YYYY-MM-DD)
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Most recent points to draw
        #[arg(long, default_value_t = 30)]
        points: usize,
    },
    /// Completion rates across published courses
    Completion {
        #[arg(long, value_enum, default_value = "per-lesson")]
        mode: CompletionMode,
    },
    /// Search user profiles by name or email
    Users {
        term: String,
        #[arg(long, default_value_t = 50)]
        limit: i64,
    },
    /// Generate a markdown report
    Report {
        #[arg(long, value_enum, default_value = "week")]
        period: Granularity,
        #[arg(long, value_enum, default_value = "per-lesson")]
        mode: CompletionMode,
        #[arg(long, default_value_t = 90)]
        window_days: i64,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a Postgres instance")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let inserted = db::import_csv(&pool, &csv).await?;
            println!("Inserted {inserted} profiles from {}.", csv.display());
        }
        Commands::Stats { active_days, snapshot } => {
            let stats = db::overall_stats(&pool, active_days).await?;
            let previous = snapshot.as_deref().and_then(read_snapshot);
            let changes = deltas::compare_snapshots(&stats, previous.as_ref());

            println!("Key metrics (active window: {active_days} days):");
            for change in changes.iter() {
                println!("{}", report::format_stat_change(change));
            }

            if let Some(path) = snapshot {
                std::fs::write(&path, serde_json::to_string_pretty(&stats)?)?;
                println!("Snapshot written to {}.", path.display());
            }
        }
        Commands::Chart { period, window_days, start, end, points } => {
            let mut series = db::new_user_series(&pool, period, window_days).await?;
            if start.is_some() || end.is_some() {
                series.retain(|bucket| {
                    start.map_or(true, |s| bucket.period_start >= s)
                        && end.map_or(true, |e| bucket.period_start <= e)
                });
            }
            let annotated = deltas::annotate_deltas(&series);
            print!("{}", report::render_series(&annotated, period, points));
        }
        Commands::Completion { mode } => {
            let rates = db::course_completion_rates(&pool, mode).await?;
            if rates.is_empty() {
                println!("No completion data available.");
            } else {
                for course in rates.iter() {
                    println!(
                        "- {}: {}/{} completed ({:.2}%)",
                        course.course_title,
                        course.stat.completed_count,
                        course.stat.enrolled_count,
                        course.stat.completion_rate
                    );
                }
            }
        }
        Commands::Users { term, limit } => {
            let users = db::search_users(&pool, &term, limit).await?;
            if users.is_empty() {
                println!("No matching users.");
            } else {
                for user in users.iter() {
                    println!(
                        "- {} <{}> ({}) id={} joined {} last active {}",
                        user.full_name,
                        user.email,
                        user.role,
                        user.id,
                        user.created_at.date_naive(),
                        user.updated_at.date_naive()
                    );
                }
            }
        }
        Commands::Report { period, mode, window_days, out } => {
            let stats = db::overall_stats(&pool, 30).await?;
            let series = db::new_user_series(&pool, period, window_days).await?;
            let annotated = deltas::annotate_deltas(&series);
            let completions = db::course_completion_rates(&pool, mode).await?;

            let report = report::build_report(window_days, period, &stats, &annotated, &completions);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn read_snapshot(path: &Path) -> Option<OverallStats> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
