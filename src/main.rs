mod aggregate;
mod articles;
mod batch;
mod checkpoint;
mod cli;
mod config;
mod confirm;
mod context;
mod error;
mod hierarchy;
mod lifecycle;
mod pipeline;
mod planner;
mod report;
mod retrieve;
mod state_machine;
mod store;
mod tasks;
mod truncate;
mod ui;

use anyhow::{Context, Result, bail};
use clap::Parser;
use console::Style;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

use batch::BatchClient;
use checkpoint::CheckpointLog;
use cli::{Cli, Command};
use config::Config;
use confirm::{AutoConfirm, TerminalConfirm};
use context::PipelineContext;
use lifecycle::JobOutcome;
use tasks::TaskKind;
use truncate::RuleSplitter;

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .with_writer(std::io::stderr)
        .init();
}

/// Ctrl-C: nothing in flight is checkpointed. Exits instead of unwinding so a
/// prompt still blocked on stdin cannot hold the runtime open.
fn interrupted(what: &str) -> ! {
    warn!("interrupted: {what}");
    eprintln!("{} interrupted: {what}", Style::new().red().bold().apply_to("✗"));
    std::process::exit(130);
}

fn client(ctx: &PipelineContext) -> Result<BatchClient> {
    if ctx.config.api_key.is_empty() {
        bail!("no API key: set OPENAI_API_KEY or api_key in the config file");
    }
    BatchClient::with_base_url(ctx.config.api_key.clone(), ctx.config.base_url.clone())
        .context("building batch client")
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    let ctx = PipelineContext::new(config);
    let green = Style::new().green().bold();

    match cli.command {
        Command::Ingest { input, output } => {
            let output = output.unwrap_or_else(|| ctx.layout.scraped_corpus());
            let count = pipeline::ingest(&input, &output)
                .with_context(|| format!("ingesting {}", input.display()))?;
            println!("{} {count} articles ({})", green.apply_to("✓"), output.display());
        }

        Command::Abridge { input, output } => {
            let input = input.unwrap_or_else(|| ctx.layout.scraped_corpus());
            let output = output.unwrap_or_else(|| ctx.layout.abridged_corpus());
            let (before, after) = pipeline::abridge(&ctx, &input, &output, &RuleSplitter)
                .with_context(|| format!("abridging {}", input.display()))?;
            println!(
                "{} {before} articles -> {after} articles ({})",
                green.apply_to("✓"),
                output.display()
            );
        }

        Command::Submit {
            kind,
            start,
            resume,
            yes,
            skip_rows,
        } => {
            let kind = TaskKind::from(kind);
            let sourced = pipeline::source_items(&ctx, kind, skip_rows)
                .with_context(|| format!("preparing {kind} items"))?;
            let start = match (start, resume) {
                (Some(start), _) => start,
                (None, true) => CheckpointLog::new(ctx.layout.checkpoint_log(kind))
                    .resume_for(sourced.skip_rows)
                    .context("reading checkpoint log")?,
                (None, false) => 0,
            };
            let endpoint = client(&ctx)?;

            let run = async {
                if yes || !ctx.config.confirm {
                    pipeline::run_kind(&ctx, &endpoint, &AutoConfirm, &sourced, start, true).await
                } else {
                    let gate = TerminalConfirm::new();
                    pipeline::run_kind(&ctx, &endpoint, &gate, &sourced, start, true).await
                }
            };
            let summary = tokio::select! {
                summary = run => summary.with_context(|| format!("submitting {kind} from offset {start}"))?,
                _ = tokio::signal::ctrl_c() => {
                    interrupted(&format!("in-flight {kind} chunk was not checkpointed"))
                }
            };

            info!(?summary, "submit finished");
            println!(
                "{} {kind}: {} chunks, {} rows appended, {} lines skipped; next offset {} of {}{}",
                green.apply_to("✓"),
                summary.chunks_completed,
                summary.rows_appended,
                summary.lines_skipped,
                summary.next_offset,
                summary.total_items,
                if summary.declined { " (stopped at declined chunk)" } else { "" }
            );
        }

        Command::Retrieve { kind, batch_id } => {
            let kind = TaskKind::from(kind);
            let endpoint = client(&ctx)?;
            let outcome = tokio::select! {
                outcome = pipeline::retrieve_existing(&ctx, &endpoint, kind, &batch_id, true) => {
                    outcome.with_context(|| format!("retrieving batch {batch_id}"))?
                }
                _ = tokio::signal::ctrl_c() => interrupted(&format!("stopped waiting for {batch_id}")),
            };
            match outcome {
                JobOutcome::Completed(report) => {
                    ui::JobProgress::hidden().print_report(&report);
                }
                JobOutcome::Failed { reason, .. } => bail!("batch {batch_id} failed: {reason}"),
                JobOutcome::Cancelled(_) => bail!("batch {batch_id} was cancelled"),
                JobOutcome::Declined => {}
            }
        }

        Command::Aggregate => {
            let report = pipeline::aggregate(&ctx).context("aggregating results")?;
            println!(
                "{} {} publications, {} cities, {} states, {} categories",
                green.apply_to("✓"),
                report.publications.len(),
                report.cities.len(),
                report.states.len(),
                report.categories.len()
            );
            for (name, rating) in &report.publications {
                println!("  {name:<40} {rating:>7.2}");
            }
        }

        Command::Status => {
            for s in pipeline::status(&ctx).context("reading pipeline state")? {
                println!(
                    "{:<7} resume at {:>6}  {:>7} result rows",
                    s.kind.to_string(),
                    s.resume_offset,
                    s.rows
                );
            }
        }
    }

    Ok(())
}
