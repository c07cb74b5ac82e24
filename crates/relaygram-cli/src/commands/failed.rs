//! Failed-unit command handlers.

use anyhow::Result;
use relaygram_config::ResolvedConfig;
use relaygram_state::StateStore;
use tracing::info;

use crate::config::open_store;

/// List recorded failures.
pub fn cmd_failed_list(config: ResolvedConfig, limit: usize) -> Result<()> {
    let store = open_store(&config)?;
    let failures = store.load_failures()?;

    if failures.is_empty() {
        println!("No failed units recorded.");
        return Ok(());
    }

    println!("\nFailed Units:");
    println!(
        "{:<24} {:<16} {:<18} {}",
        "Source IDs", "Group", "Failed", "Error"
    );
    println!("{:-<90}", "");

    for failure in failures.iter().take(limit) {
        let ids = failure
            .source_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");

        println!(
            "{:<24} {:<16} {:<18} {}",
            truncate(&ids, 24),
            truncate(failure.group_id.as_deref().unwrap_or("-"), 16),
            failure.failed_at.format("%Y-%m-%d %H:%M"),
            failure.error
        );
    }

    println!("\nTotal: {} entries", failures.len());
    if failures.len() > limit {
        println!("(showing first {} - use --limit to see more)", limit);
    }

    Ok(())
}

/// Drop all recorded failures.
pub fn cmd_failed_clear(config: ResolvedConfig) -> Result<()> {
    let store = open_store(&config)?;
    let cleared = store.clear_failures()?;

    info!(count = cleared, "Cleared failed units");
    println!("Cleared {} failed unit(s).", cleared);
    Ok(())
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
