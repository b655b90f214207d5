use std::process::ExitCode;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use records_sync::domain::RunOutcome;
use records_sync::infrastructure::{AppConfig, init_logging_with_config, log_system_info};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            // logging may not be up yet
            eprintln!("records-sync: {e:#}");
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let config = AppConfig::load().context("Failed to load configuration")?;
    let _guard = init_logging_with_config(&config.logging)?;
    log_system_info();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping at the next page boundary");
            on_signal.cancel();
        }
    });

    let report = records_sync::run_with_config(&config, cancel).await?;
    info!(
        "Run {} finished: {} ({} in snapshot, {} new, {} deleted, {} persisted)",
        report.context.run_id,
        report.outcome,
        report.context.records_available,
        report.context.new_records,
        report.context.deleted_records,
        report.context.persisted_records
    );
    match serde_json::to_string(&report.context) {
        Ok(summary) => info!(target: "records_sync::summary", "{}", summary),
        Err(e) => warn!("Could not serialize run summary: {}", e),
    }

    Ok(match report.outcome {
        RunOutcome::Failure(_) => ExitCode::FAILURE,
        _ => ExitCode::SUCCESS,
    })
}
