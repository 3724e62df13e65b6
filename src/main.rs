use std::io::IsTerminal;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use timeline_harvester::archive;
use timeline_harvester::collector::{self, TokioPacer};
use timeline_harvester::config::Config;
use timeline_harvester::export::{self, ExportSink, FileSink};
use timeline_harvester::operator::{NonInteractive, OperatorInput, StdinOperator};
use timeline_harvester::view::{ChromiumView, ReplayView};

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    init_tracing()?;

    info!("Starting timeline-harvester");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let mut options = config.harvest_options();
    if let Some(cutoff) = options.cutoff {
        info!(cutoff = %cutoff.to_rfc3339(), limit = options.stale_post_limit, "Date cutoff enabled");
    }

    let operator: Box<dyn OperatorInput> = if options.prompt_counts && std::io::stdin().is_terminal() {
        Box::new(StdinOperator)
    } else {
        Box::new(NonInteractive)
    };
    let pacer = TokioPacer;

    let outcome = if let Some(ref dir) = config.replay_dir {
        let mut view = ReplayView::from_dir(dir)
            .await
            .context("Failed to load replay")?;
        // Recorded frames do not need time to render.
        debug!("Replay mode: no scroll delay");
        options.scroll_delay = Duration::ZERO;
        collector::harvest(&mut view, &pacer, operator.as_ref(), options)
            .await
            .context("Harvest failed")?
    } else {
        let view_config = config.chromium_view_config()?;
        let mut view = ChromiumView::launch(view_config).await?;
        let result = collector::harvest(&mut view, &pacer, operator.as_ref(), options).await;
        view.close().await;
        result.context("Harvest failed")?
    };

    info!(
        account = %outcome.target,
        posts = outcome.posts.len(),
        cycles = outcome.cycles,
        termination = ?outcome.termination,
        "Collection complete"
    );

    let document = export::assemble(outcome);
    let file_name = export::export_file_name(&document.meta.target);
    let sink = FileSink::new(&config.output_dir);
    let path = sink
        .save(&file_name, &document)
        .await
        .context("Failed to save export")?;

    if config.merge_archive {
        let (archive_path, report) = archive::merge_into_dir(&config.output_dir, document)
            .await
            .context("Failed to update archive")?;
        info!(
            path = %archive_path.display(),
            added = report.added,
            total = report.total,
            "Archive merged"
        );
    }

    info!(path = %path.display(), "Done");
    Ok(())
}

fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,timeline_harvester=debug"));

    // Check if JSON logging is requested
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| matches!(v.to_lowercase().as_str(), "json" | "structured"))
        .unwrap_or(false);

    if use_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .try_init()
            .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {e}"))?;
    }

    Ok(())
}
