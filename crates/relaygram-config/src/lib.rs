mod error;
mod project;
mod validation;

pub use error::{ConfigError, ConfigResult};
pub use project::{
    resolve_env, ChannelConfig, ProjectConfig, ReplicationConfig, StateConfig, TelegramConfig,
};
pub use validation::{validate_project, ResolvedConfig};
