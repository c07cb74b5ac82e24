use std::path::PathBuf;
use std::time::Duration;

use relaygram_core::ChatId;

use crate::error::{ConfigError, ConfigResult};
use crate::project::ProjectConfig;

/// Configuration with placeholders resolved and invariants checked.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub source: ChatId,
    pub destination: ChatId,
    pub bot_token: String,
    pub api_base: Option<String>,
    pub send_delay: Duration,
    pub rate_limit_margin: Duration,
    pub checkpoint_every: usize,
    pub state_dir: PathBuf,
}

/// Validate a project configuration and resolve its environment references.
pub fn validate_project(config: &ProjectConfig) -> ConfigResult<ResolvedConfig> {
    validate_channels(config)?;
    validate_cadence(config)?;

    let bot_token = config.bot_token()?;
    if bot_token.trim().is_empty() {
        return Err(ConfigError::Empty {
            field: "telegram.bot_token".into(),
        });
    }

    let state_dir = config.state_dir()?;
    if state_dir.trim().is_empty() {
        return Err(ConfigError::Empty {
            field: "state.dir".into(),
        });
    }

    Ok(ResolvedConfig {
        source: config.source.channel_id,
        destination: config.destination.channel_id,
        bot_token,
        api_base: config.telegram.api_base.clone(),
        send_delay: Duration::from_millis(config.replication.send_delay_ms),
        rate_limit_margin: Duration::from_millis(config.replication.rate_limit_margin_ms),
        checkpoint_every: config.replication.checkpoint_every,
        state_dir: PathBuf::from(state_dir),
    })
}

fn validate_channels(config: &ProjectConfig) -> ConfigResult<()> {
    if config.source.channel_id == config.destination.channel_id {
        return Err(ConfigError::SameChannel(config.source.channel_id));
    }
    Ok(())
}

fn validate_cadence(config: &ProjectConfig) -> ConfigResult<()> {
    if config.replication.checkpoint_every == 0 {
        return Err(ConfigError::InvalidCheckpointCadence);
    }
    Ok(())
}
