//! Implementations of the `cva submit`, `cva work` and `cva status` commands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::analysis::Analyzer;
use crate::config::Config;
use crate::error::AnalysisError;
use crate::submission::{DocumentUpload, Submission};
use crate::worker::{self, DeferredScheduler};

/// Fields for `cva submit`, besides the document path.
#[derive(Debug, Clone, Default)]
pub struct SubmitArgs {
    pub job_title: Option<String>,
    pub job_description: Option<String>,
    pub target_company: Option<String>,
    pub industry: Option<String>,
    pub experience_level: Option<String>,
    pub target_country: Option<String>,
    pub current_career_level: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub preferences: Vec<String>,
}

async fn analyzer(config: &Config) -> Result<Analyzer> {
    Analyzer::from_config(config, Arc::new(DeferredScheduler)).await
}

/// Submit a document. With `wait`, execute it in this process and print
/// the final status; otherwise print the new task id.
pub async fn run_submit(config: &Config, file: &Path, args: SubmitArgs, wait: bool) -> Result<()> {
    let bytes = std::fs::read(file)
        .with_context(|| format!("Failed to read document: {}", file.display()))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string();

    let submission = Submission {
        cv: Some(DocumentUpload { file_name, bytes }),
        job_title: args.job_title,
        job_description: args.job_description,
        target_company: args.target_company,
        industry: args.industry,
        experience_level: args.experience_level,
        analysis_preferences: args.preferences,
        target_country: args.target_country,
        current_career_level: args.current_career_level,
        name: args.name,
        email: args.email,
    };

    let analyzer = analyzer(config).await?;
    let task = match analyzer.submit(submission).await {
        Ok(task) => task,
        Err(AnalysisError::Validation(errors)) => {
            for field in errors.fields() {
                for message in errors.messages(field) {
                    eprintln!("  {}: {}", field, message);
                }
            }
            anyhow::bail!("submission rejected");
        }
        Err(e) => return Err(e.into()),
    };

    if !wait {
        let out = serde_json::json!({
            "uuid": task.id,
            "message": "Analysis queued; run `cva work` or `cva serve` to process it.",
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    worker::run_with_timeout(&analyzer, &task.id, config.worker.timeout()).await;
    let report = analyzer.status(&task.id).await?;
    let out = serde_json::json!({
        "uuid": task.id,
        "status": report.status,
        "report": report.report,
    });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

/// Recovery sweep, then execute every pending task.
pub async fn run_work(config: &Config) -> Result<()> {
    let analyzer = analyzer(config).await?;

    let recovered = analyzer.recover().await?;
    if recovered.interrupted > 0 {
        println!(
            "Marked {} interrupted analyses as failed.",
            recovered.interrupted
        );
    }

    let summary = worker::drain_pending(&analyzer, config.worker.timeout()).await?;
    println!(
        "Processed {} analyses: {} completed, {} failed, {} skipped.",
        summary.completed + summary.failed + summary.skipped,
        summary.completed,
        summary.failed,
        summary.skipped
    );
    Ok(())
}

/// Print `{status, report}` for a task.
pub async fn run_status(config: &Config, id: &str) -> Result<()> {
    let analyzer = analyzer(config).await?;
    let report = analyzer.status(id).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
