use std::time::Duration;

use anyhow::{Context, Result};
use colored::Colorize;
use relaygram_config::ResolvedConfig;
use relaygram_engine::{Replicator, RunOutcome, RunReport};
use relaygram_transport::BotApiTransport;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::config::{open_store, replicator_config};

/// Run one replication pass. Returns the process exit code.
pub async fn cmd_run(config: ResolvedConfig, deadline_secs: Option<u64>) -> Result<i32> {
    let store = open_store(&config)?;
    let transport = match &config.api_base {
        Some(base) => BotApiTransport::with_api_base(base, &config.bot_token),
        None => BotApiTransport::new(&config.bot_token),
    }
    .context("Failed to create Bot API client")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(signal_shutdown(
        shutdown_tx,
        deadline_secs.map(Duration::from_secs),
    ));

    let replicator =
        Replicator::new(transport, store, replicator_config(&config)).with_shutdown(shutdown_rx);
    let report = replicator.run().await;

    print_report(&report);
    Ok(report.exit_code())
}

/// Flip the shutdown flag on Ctrl-C or once the deadline passes.
async fn signal_shutdown(tx: watch::Sender<bool>, deadline: Option<Duration>) {
    let deadline = async {
        match deadline {
            Some(d) => tokio::time::sleep(d).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => match result {
            Ok(()) => info!("Received Ctrl-C, stopping"),
            Err(e) => {
                warn!(error = %e, "Failed to listen for Ctrl-C");
                return;
            }
        },
        _ = deadline => info!("Deadline reached, stopping"),
    }

    let _ = tx.send(true);
}

fn print_report(report: &RunReport) {
    let outcome = match report.outcome {
        RunOutcome::Completed => report.outcome.to_string().green().bold(),
        RunOutcome::CompletedWithErrors => report.outcome.to_string().yellow().bold(),
        RunOutcome::Aborted => report.outcome.to_string().red().bold(),
    };

    println!("\nReplication {}", outcome);
    if let Some(reason) = report.abort_reason {
        let error = report.error.as_deref().unwrap_or("");
        eprintln!("{}", format!("Aborted ({}): {}", reason, error).red());
    }

    println!("{:-<40}", "");
    println!(
        "{:<24} {} -> {}",
        "Checkpoint", report.checkpoint_before, report.checkpoint_after
    );
    println!("{:<24} {}", "Backlog messages", report.backlog_len);
    println!("{:<24} {}", "Already replicated", report.skipped_mapped);
    println!(
        "{:<24} {}/{}",
        "Units sent", report.units_sent, report.units_total
    );
    println!("{:<24} {}", "Messages sent", report.messages_sent);
    println!("{:<24} {}", "Rate-limit waits", report.rate_limit_waits);

    if report.units_failed > 0 {
        println!(
            "{:<24} {}",
            "Units failed",
            report.units_failed.to_string().yellow()
        );
        println!("Run 'relaygram failed list' for details.");
    }
    println!();
}
