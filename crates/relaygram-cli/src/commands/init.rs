use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use colored::Colorize;
use tracing::info;

const CONFIG_TEMPLATE: &str = r#"# Relaygram configuration
# Secrets are loaded from .env file

[source]
# Channel to read from (bot must be an administrator)
channel_id = -1001234567890

[destination]
# Channel to replicate into (bot must be able to post)
channel_id = -1009876543210

[telegram]
bot_token = "${TELEGRAM_BOT_TOKEN}"
# api_base = "https://api.telegram.org"

[replication]
# Pause between consecutive sends
send_delay_ms = 1000
# Extra wait on top of every rate-limit signal
rate_limit_margin_ms = 1000
# Persist progress every N units; values above 1 may duplicate posts after a crash
checkpoint_every = 1

[state]
dir = ".relaygram"
"#;

const ENV_TEMPLATE: &str = r#"# Relaygram environment variables
# Copy this file to .env and fill in your values

# Bot token from @BotFather
TELEGRAM_BOT_TOKEN=

# Log level override, e.g. relaygram=debug
# RUST_LOG=
"#;

pub fn cmd_init(path: &Path) -> Result<()> {
    info!(path = %path.display(), "Initializing relaygram project");

    fs::create_dir_all(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    write_if_missing(&path.join("relaygram.toml"), CONFIG_TEMPLATE)?;
    write_if_missing(&path.join(".env.example"), ENV_TEMPLATE)?;

    println!("\n{}", "Relaygram initialized!".green().bold());
    println!("\nNext steps:");
    println!("  1. Copy .env.example to .env and set TELEGRAM_BOT_TOKEN");
    println!("  2. Set the source and destination channel ids in relaygram.toml");
    println!("  3. Run: relaygram run\n");

    Ok(())
}

/// Returns whether the file was created.
fn write_if_missing(path: &Path, content: &str) -> Result<bool> {
    if path.exists() {
        println!("{} already exists, skipping", path.display());
        return Ok(false);
    }

    fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Created {}", path.display());
    Ok(true)
}
