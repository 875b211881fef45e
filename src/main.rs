//! # cva: CV Analyzer
//!
//! Accepts CV submissions (PDF or DOCX) with a target job description,
//! extracts their text and asks a local language model for a structured
//! career report. Analyses run in the background and are polled by id.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `cva init` | Create the SQLite database and run migrations |
//! | `cva serve` | Run the HTTP server and worker pool |
//! | `cva submit <file>` | Submit a document (`--wait` runs it inline) |
//! | `cva work` | Recovery sweep, then run every pending analysis |
//! | `cva status <uuid>` | Print `{status, report}` as JSON |
//!
//! ## Examples
//!
//! ```bash
//! cva init
//! cva submit ./resume.pdf --job-title "Backend Engineer" \
//!     --job-description "Build Rust services" --industry Software \
//!     --experience-level Senior --target-country Germany \
//!     --current-career-level Mid --wait
//! cva status 3f2c9a1e-...
//! cva serve
//! ```
//!
//! ## Configuration
//!
//! All commands read `--config` (default `./config/cva.toml`). Log
//! verbosity follows `RUST_LOG` and defaults to `info`; logs go to stderr
//! so JSON on stdout stays machine-readable.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cv_analyzer::commands::{self, SubmitArgs};
use cv_analyzer::{config, migrate, server};

#[derive(Parser)]
#[command(
    name = "cva",
    about = "CV Analyzer: background career reports from CVs and job descriptions",
    version
)]
struct Cli {
    /// Path to configuration file
    #[arg(long, global = true, default_value = "./config/cva.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema
    Init,

    /// Start the HTTP server and background workers
    Serve,

    /// Submit a CV for analysis
    Submit {
        /// PDF or DOCX document
        file: PathBuf,

        #[arg(long)]
        job_title: Option<String>,

        #[arg(long)]
        job_description: Option<String>,

        /// Company the candidate is applying to
        #[arg(long)]
        target_company: Option<String>,

        #[arg(long)]
        industry: Option<String>,

        #[arg(long)]
        experience_level: Option<String>,

        #[arg(long)]
        target_country: Option<String>,

        #[arg(long)]
        current_career_level: Option<String>,

        /// Candidate name
        #[arg(long)]
        name: Option<String>,

        /// Candidate email
        #[arg(long)]
        email: Option<String>,

        /// Analysis preference (repeatable)
        #[arg(long = "preference")]
        preferences: Vec<String>,

        /// Run the analysis in this process and print the result
        #[arg(long)]
        wait: bool,
    },

    /// Run every pending analysis, then exit
    Work,

    /// Show the status and report of an analysis
    Status {
        /// Analysis id returned by `submit`
        uuid: String,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
        Commands::Submit {
            file,
            job_title,
            job_description,
            target_company,
            industry,
            experience_level,
            target_country,
            current_career_level,
            name,
            email,
            preferences,
            wait,
        } => {
            let args = SubmitArgs {
                job_title,
                job_description,
                target_company,
                industry,
                experience_level,
                target_country,
                current_career_level,
                name,
                email,
                preferences,
            };
            commands::run_submit(&cfg, &file, args, wait).await?;
        }
        Commands::Work => {
            commands::run_work(&cfg).await?;
        }
        Commands::Status { uuid } => {
            commands::run_status(&cfg, &uuid).await?;
        }
    }

    Ok(())
}
