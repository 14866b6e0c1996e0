use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;

use spamcheck::config::PipelineConfig;
use spamcheck::pipeline::SpamPipeline;
use spamcheck::services::{FixtureServices, Services};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries only report lines
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let fixture_path: PathBuf = std::env::args_os().nth(1).map(PathBuf::from).unwrap_or_else(|| {
        eprintln!("Usage: spamcheck <fixture.json> < emails.txt");
        std::process::exit(2);
    });

    let config = PipelineConfig::from_env().context("invalid SPAMCHECK_* configuration")?;
    let backend = FixtureServices::from_path(&fixture_path)
        .with_context(|| format!("failed to load fixture {}", fixture_path.display()))?;

    let emails: Vec<String> = io::stdin()
        .lock()
        .lines()
        .map(|line| line.map(|l| l.trim().to_string()))
        .filter(|line| !matches!(line, Ok(l) if l.is_empty()))
        .collect::<Result<_, _>>()
        .context("failed to read emails from stdin")?;

    tracing::info!(
        emails = emails.len(),
        batch_size = config.batch_size,
        workers = config.classify_workers,
        on_error = %config.classify_error_policy,
        "Starting spam check"
    );

    let pipeline = SpamPipeline::new(Services::from_shared(Arc::new(backend)), config);
    let report = pipeline.run(emails).await?;

    let mut stdout = io::stdout().lock();
    for line in &report.lines {
        writeln!(stdout, "{line}")?;
    }
    stdout.flush()?;

    for error in &report.errors {
        tracing::warn!(error = %error, "Degraded result");
    }
    tracing::info!(
        run_id = %report.run_id,
        lines = report.lines.len(),
        errors = report.errors.len(),
        "Spam check complete"
    );

    Ok(())
}
