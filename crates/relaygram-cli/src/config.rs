use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use relaygram_config::{validate_project, ProjectConfig, ResolvedConfig};
use relaygram_engine::ReplicatorConfig;
use relaygram_state::JsonStateStore;

/// Read, parse and validate relaygram.toml.
pub fn load_config(path: &Path) -> Result<ResolvedConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let project = ProjectConfig::parse(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    validate_project(&project).with_context(|| format!("Invalid config in {}", path.display()))
}

pub fn open_store(config: &ResolvedConfig) -> Result<JsonStateStore> {
    JsonStateStore::open(&config.state_dir).with_context(|| {
        format!(
            "Failed to open state directory {}",
            config.state_dir.display()
        )
    })
}

pub fn replicator_config(config: &ResolvedConfig) -> ReplicatorConfig {
    ReplicatorConfig {
        source: config.source,
        destination: config.destination,
        send_delay: config.send_delay,
        rate_limit_margin: config.rate_limit_margin,
        checkpoint_every: config.checkpoint_every,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("relaygram.toml");
        fs::write(
            &path,
            r#"
[source]
channel_id = -1001
[destination]
channel_id = -1002
[telegram]
bot_token = "123:abc"
[replication]
send_delay_ms = 500
"#,
        )
        .unwrap();

        let config = load_config(&path).unwrap();
        let replicator = replicator_config(&config);
        assert_eq!(replicator.source, -1001);
        assert_eq!(replicator.destination, -1002);
        assert_eq!(replicator.send_delay, Duration::from_millis(500));
    }

    #[test]
    fn test_missing_config_file() {
        let dir = TempDir::new().unwrap();
        let err = load_config(&dir.path().join("nope.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}
