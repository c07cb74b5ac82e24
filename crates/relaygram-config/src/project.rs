use serde::Deserialize;

use relaygram_core::ChatId;

use crate::error::{ConfigError, ConfigResult};

/// Project configuration as parsed from relaygram.toml.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    /// Channel messages are read from.
    pub source: ChannelConfig,
    /// Channel messages are replicated into.
    pub destination: ChannelConfig,
    /// Transport credentials.
    pub telegram: TelegramConfig,
    /// Pacing and persistence cadence.
    #[serde(default)]
    pub replication: ReplicationConfig,
    /// Where checkpoint and identity map live.
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    pub channel_id: ChatId,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    /// Bot token, usually `${TELEGRAM_BOT_TOKEN}`.
    pub bot_token: String,
    /// Override for the Bot API base URL.
    #[serde(default)]
    pub api_base: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplicationConfig {
    /// Pause between consecutive sends.
    #[serde(default = "default_send_delay_ms")]
    pub send_delay_ms: u64,
    /// Added on top of every transport-issued rate-limit wait.
    #[serde(default = "default_rate_limit_margin_ms")]
    pub rate_limit_margin_ms: u64,
    /// Persist checkpoint and identity map every N units.
    ///
    /// Anything above 1 means up to N-1 units may be sent again after a
    /// crash, producing duplicates at the destination.
    #[serde(default = "default_checkpoint_every")]
    pub checkpoint_every: usize,
}

fn default_send_delay_ms() -> u64 {
    1000
}

fn default_rate_limit_margin_ms() -> u64 {
    1000
}

fn default_checkpoint_every() -> usize {
    1
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            send_delay_ms: default_send_delay_ms(),
            rate_limit_margin_ms: default_rate_limit_margin_ms(),
            checkpoint_every: default_checkpoint_every(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: String,
}

fn default_state_dir() -> String {
    ".relaygram".to_string()
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

impl ProjectConfig {
    /// Parse a project config from a TOML string.
    pub fn parse(toml_str: &str) -> ConfigResult<Self> {
        let config: ProjectConfig = toml::from_str(toml_str)?;
        Ok(config)
    }

    /// Get the resolved bot token.
    pub fn bot_token(&self) -> ConfigResult<String> {
        resolve_env(&self.telegram.bot_token, "telegram.bot_token")
    }

    /// Get the resolved state directory.
    pub fn state_dir(&self) -> ConfigResult<String> {
        resolve_env(&self.state.dir, "state.dir")
    }
}

/// Resolve environment variables in a string.
/// Supports ${VAR_NAME} syntax; an unset variable is an error.
pub fn resolve_env(s: &str, field: &str) -> ConfigResult<String> {
    let mut result = String::with_capacity(s.len());
    let mut rest = s;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| ConfigError::UnterminatedPlaceholder {
                field: field.to_string(),
            })?;

        let name = &after[..end];
        let value = std::env::var(name).map_err(|_| ConfigError::MissingEnvVar {
            name: name.to_string(),
            field: field.to_string(),
        })?;
        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const MINIMAL: &str = r#"
[source]
channel_id = -1001

[destination]
channel_id = -1002

[telegram]
bot_token = "${RELAYGRAM_TEST_TOKEN}"
"#;

    #[test]
    fn test_parse_minimal_uses_defaults() {
        let config = ProjectConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.source.channel_id, -1001);
        assert_eq!(config.destination.channel_id, -1002);
        assert_eq!(config.replication.send_delay_ms, 1000);
        assert_eq!(config.replication.rate_limit_margin_ms, 1000);
        assert_eq!(config.replication.checkpoint_every, 1);
        assert_eq!(config.state.dir, ".relaygram");
        assert!(config.telegram.api_base.is_none());
    }

    #[test]
    fn test_parse_full() {
        let config = ProjectConfig::parse(
            r#"
[source]
channel_id = 1

[destination]
channel_id = 2

[telegram]
bot_token = "abc"
api_base = "http://localhost:8081"

[replication]
send_delay_ms = 250
rate_limit_margin_ms = 2000
checkpoint_every = 10

[state]
dir = "/var/lib/relaygram"
"#,
        )
        .unwrap();

        assert_eq!(config.replication.send_delay_ms, 250);
        assert_eq!(config.replication.checkpoint_every, 10);
        assert_eq!(config.state.dir, "/var/lib/relaygram");
        assert_eq!(config.bot_token().unwrap(), "abc");
    }

    #[test]
    fn test_parse_rejects_missing_section() {
        assert!(matches!(
            ProjectConfig::parse("[source]\nchannel_id = 1\n"),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    #[serial]
    fn test_resolve_env() {
        std::env::set_var("RELAYGRAM_TEST_VAR", "hello");

        assert_eq!(resolve_env("${RELAYGRAM_TEST_VAR}", "f").unwrap(), "hello");
        assert_eq!(
            resolve_env("prefix_${RELAYGRAM_TEST_VAR}_suffix", "f").unwrap(),
            "prefix_hello_suffix"
        );
        assert_eq!(resolve_env("no_vars", "f").unwrap(), "no_vars");

        std::env::remove_var("RELAYGRAM_TEST_VAR");
    }

    #[test]
    #[serial]
    fn test_resolve_env_errors() {
        std::env::remove_var("RELAYGRAM_SURELY_UNSET");

        match resolve_env("${RELAYGRAM_SURELY_UNSET}", "telegram.bot_token") {
            Err(ConfigError::MissingEnvVar { name, field }) => {
                assert_eq!(name, "RELAYGRAM_SURELY_UNSET");
                assert_eq!(field, "telegram.bot_token");
            }
            other => panic!("expected missing var, got {:?}", other),
        }

        assert!(matches!(
            resolve_env("${OPEN", "f"),
            Err(ConfigError::UnterminatedPlaceholder { .. })
        ));
    }

    #[test]
    #[serial]
    fn test_bot_token_from_env() {
        std::env::set_var("RELAYGRAM_TEST_TOKEN", "123:ABC");
        let config = ProjectConfig::parse(MINIMAL).unwrap();
        assert_eq!(config.bot_token().unwrap(), "123:ABC");
        std::env::remove_var("RELAYGRAM_TEST_TOKEN");
    }
}
