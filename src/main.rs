use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

mod cgpa;
mod client;
mod config;
mod discovery;
mod error;
mod models;
mod parser;
mod pipeline;
mod report;
mod retake;
mod retry;
mod roster;

use crate::client::ResultClient;
use crate::config::{Config, BASE_URL_ENV};
use crate::models::StudentReport;
use crate::parser::TranscriptParser;

#[derive(Parser)]
#[command(name = "transcript-cgpa")]
#[command(about = "Semester results and CGPA from the student result service or a pasted transcript", long_about = None)]
struct Cli {
    /// JSON config file; defaults are used for missing keys
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Result service base URL (overrides RESULT_SERVICE_URL)
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// List the semester catalog
    Semesters,
    /// Fetch results for one student and compute CGPA
    Fetch {
        #[arg(long)]
        student: String,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Fetch results for every student in a CSV roster, one at a time
    Batch {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
    },
    /// Compute CGPA from transcript text pasted into a file or stdin
    Manual {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long, value_enum, default_value_t = Format::Markdown)]
        format: Format,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = Config::load(cli.config.as_deref()).context("failed to load config")?;
    config.apply_overrides(std::env::var(BASE_URL_ENV).ok(), cli.base_url.clone());
    config.validate()?;

    match cli.command {
        Commands::Semesters => {
            let client = ResultClient::new(&config)?;
            let catalog = client
                .fetch_semester_list()
                .await
                .context("failed to load semester list")?;
            for semester in &catalog {
                println!("{}\t{}", semester.id, semester.name);
            }
        }
        Commands::Fetch {
            student,
            format,
            out,
        } => {
            let client = ResultClient::new(&config)?;
            let catalog = client
                .fetch_semester_list()
                .await
                .context("failed to load semester list")?;
            let fetched =
                pipeline::run_fetch_pipeline(&client, &catalog, &student, config.empty_run_limit)
                    .await?;
            tracing::info!(
                order = ?fetched.order,
                visited = fetched.visited,
                "Fetched results for {}",
                student
            );
            let rendered = render(&fetched.report, format)?;
            emit(&rendered, out.as_deref())?;
        }
        Commands::Batch {
            csv,
            out_dir,
            format,
        } => {
            let entries = roster::load_roster(&csv)
                .with_context(|| format!("failed to read roster {}", csv.display()))?;
            if entries.is_empty() {
                println!("No students found in {}.", csv.display());
                return Ok(());
            }

            let client = ResultClient::new(&config)?;
            let catalog = client
                .fetch_semester_list()
                .await
                .context("failed to load semester list")?;
            let results =
                pipeline::run_batch(&client, &catalog, entries, config.empty_run_limit).await;

            if let Some(dir) = &out_dir {
                std::fs::create_dir_all(dir)?;
                for entry in &results {
                    if let Ok(report) = &entry.outcome {
                        let file = dir.join(format!(
                            "{}.{}",
                            entry.roster.student_id,
                            extension(format)
                        ));
                        std::fs::write(&file, render(report, format)?)?;
                    }
                }
                println!("Reports written to {}.", dir.display());
            }
            print!("{}", report::build_batch_summary(&results));
        }
        Commands::Manual { input, format, out } => {
            let text = match &input {
                Some(path) => std::fs::read_to_string(path)
                    .with_context(|| format!("failed to read {}", path.display()))?,
                None => std::io::read_to_string(std::io::stdin())
                    .context("failed to read transcript from stdin")?,
            };

            let parser = TranscriptParser::new()?;
            let manual = pipeline::run_manual_pipeline(&parser, &text)?;
            let rendered = match format {
                Format::Json => render(&manual.report, format)?,
                Format::Markdown => format!(
                    "{}\n{}",
                    render(&manual.report, format)?,
                    report::build_parse_notes(&manual.parse)
                ),
            };
            emit(&rendered, out.as_deref())?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let directives = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(verbose, directives.as_deref()))
        .with_writer(std::io::stderr)
        .init();
}

/// `RUST_LOG` directives (or `info`), with `--verbose` forcing debug on top.
fn log_filter(verbose: bool, directives: Option<&str>) -> EnvFilter {
    let filter = directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"));
    if verbose {
        filter.add_directive(LevelFilter::DEBUG.into())
    } else {
        filter
    }
}

fn render(report: &StudentReport, format: Format) -> anyhow::Result<String> {
    Ok(match format {
        Format::Markdown => report::build_report(report, Utc::now().date_naive()),
        Format::Json => report::render_json(report)?,
    })
}

fn extension(format: Format) -> &'static str {
    match format {
        Format::Markdown => "md",
        Format::Json => "json",
    }
}

fn emit(rendered: &str, out: Option<&Path>) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!("Report written to {}.", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}
