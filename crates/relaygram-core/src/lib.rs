pub mod aggregator;
pub mod error;
pub mod progress;
pub mod types;

pub use aggregator::{aggregate, Aggregator, MediaGroup, SendableUnit};
pub use error::{Error, Result};
pub use progress::Progress;
pub use types::{ChatId, GroupId, MediaKind, MediaRef, MessageId, Payload, SourceMessage};
