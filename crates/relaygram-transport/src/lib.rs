mod bot_api;
mod client;
mod error;
mod mock;

pub use bot_api::{BotApiTransport, DEFAULT_API_BASE};
pub use client::Transport;
pub use error::{SendError, SendResult, TransportError, TransportResult};
pub use mock::{MockTransport, SendKind, SentRecord};
