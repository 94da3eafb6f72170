use contract_onboarding::backfill::BackfillDispatcher;
use contract_onboarding::cli::{BatchArgs, Cli, Command, LayoutArgs};
use contract_onboarding::layout::resolve_layout;
use contract_onboarding::metadata::FileMetadataSource;
use contract_onboarding::onboard::{FailedEntry, OnboardConfig, Onboarder};
use contract_onboarding::output;
use contract_onboarding::source::{SolidityParser, SourceParser};
use contract_onboarding::store::InMemoryStore;

use clap::Parser;
use eyre::WrapErr;
use futures_util::future::join_all;
use serde_json::json;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Layout(args) => run_layout(args).await,
        Command::Batch(args) => run_batch(args).await,
    }
}

async fn run_layout(args: LayoutArgs) -> eyre::Result<()> {
    let source = tokio::fs::read_to_string(&args.source)
        .await
        .wrap_err_with(|| format!("reading {}", args.source.display()))?;
    let parsed = SolidityParser.parse(&source, args.contract.as_deref())?;
    let layout = resolve_layout(&parsed.variables, &parsed.catalog)?;

    if args.json {
        let doc = json!({ "contract": parsed.contract, "layout": layout });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        output::print_layout(&parsed.contract, &layout);
    }
    Ok(())
}

async fn run_batch(args: BatchArgs) -> eyre::Result<()> {
    let store = Arc::new(match &args.store {
        Some(path) => InMemoryStore::load(path)
            .await
            .wrap_err_with(|| format!("loading store {}", path.display()))?,
        None => InMemoryStore::new(),
    });
    let metadata = Arc::new(FileMetadataSource::new(&args.metadata_dir));

    let mut onboarder = Onboarder::new(metadata, store.clone())
        .with_config(OnboardConfig { api_key: args.api_key.clone() });
    if let Some(program) = args.backfill_program() {
        let dispatcher = BackfillDispatcher::new(program).with_args(args.backfill_args.clone());
        onboarder = onboarder.with_launcher(Arc::new(dispatcher));
    }

    let mut pending = args.addresses.clone();
    let mut accepted = Vec::new();
    let mut failed: Vec<FailedEntry> = Vec::new();
    let mut backfills = Vec::new();
    let mut round = 0;

    loop {
        let mut report = onboarder.onboard_batch(args.credential.as_deref(), &pending).await?;
        if !args.json {
            output::print_batch_report(&report, round);
        }
        if let Some(handle) = report.backfill.take() {
            if !args.json {
                output::print_backfill_dispatched(handle.ids());
            }
            backfills.push(handle);
        }

        let retry = if round < args.retries { report.retryable() } else { Vec::new() };
        let summary = report.summary();
        accepted.extend(summary.success);
        failed.extend(summary.fail.into_iter().filter(|f| !retry.contains(&f.address)));

        if retry.is_empty() {
            break;
        }
        round += 1;
        tracing::info!(round, count = retry.len(), "retrying transient failures");
        pending = retry;
    }

    if args.json {
        let doc = json!({ "success": accepted, "fail": failed });
        println!("{}", serde_json::to_string_pretty(&doc)?);
    } else {
        output::print_batch_totals(accepted.len(), failed.len());
    }

    if let Some(path) = &args.store {
        store.save(path).await.wrap_err_with(|| format!("saving store {}", path.display()))?;
        if !args.json {
            output::print_store_saved(path, store.contract_count().await);
        }
    }

    if backfills.is_empty() && !args.json {
        output::print_no_backfill("No backfill dispatched.");
    }
    for result in join_all(backfills).await {
        if !args.json {
            output::print_backfill_result(&result);
        }
        if let Err(e) = result {
            tracing::warn!(error = %e, "backfill did not complete");
        }
    }
    Ok(())
}
