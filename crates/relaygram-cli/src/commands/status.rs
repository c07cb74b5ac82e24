use anyhow::Result;
use colored::Colorize;
use relaygram_config::ResolvedConfig;
use relaygram_state::StateStore;

use crate::config::open_store;

pub fn cmd_status(config: ResolvedConfig) -> Result<()> {
    let store = open_store(&config)?;

    let checkpoint = store.load_checkpoint()?;
    let identity_map = store.load_identity_map()?;
    let failures = store.load_failures()?;

    if checkpoint.last_message_id == 0 && identity_map.is_empty() {
        println!("No replication state found. Run 'relaygram run' to start replicating.");
        return Ok(());
    }

    println!("\nReplication Status:");
    println!("{:-<40}", "");
    println!("{:<24} {}", "Source channel", config.source);
    println!("{:<24} {}", "Destination channel", config.destination);
    println!("{:<24} {}", "Checkpoint", checkpoint.last_message_id);
    println!("{:<24} {}", "Mapped messages", identity_map.len());
    if let Some(last) = identity_map.last_source_id() {
        println!("{:<24} {}", "Last mapped source id", last);
    }

    let failed = if failures.is_empty() {
        "0".normal()
    } else {
        failures.len().to_string().yellow()
    };
    println!("{:<24} {}", "Failed units", failed);
    println!("{:<24} {}", "State directory", store.dir().display());

    if checkpoint.last_message_id > 0 && identity_map.is_empty() && failures.is_empty() {
        println!(
            "\n{}",
            "Checkpoint is set but nothing is mapped; replies to older posts will not thread."
                .yellow()
        );
    }

    println!();
    Ok(())
}
