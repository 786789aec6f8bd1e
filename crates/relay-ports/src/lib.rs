//! Domain types and collaborator seams for the relay core.
//!
//! The core (transport, registry, dispatcher, workflows) depends only on the
//! traits here. Production wiring and tests choose the implementations:
//! - [`InMemoryChannelStore`] for channels, memberships and deauthorizations
//! - [`RecordingNotifier`], [`RecordingExecutor`], [`RecordingMessenger`] and
//!   [`RecordingMetrics`] for interaction assertions

mod error;
mod memory;
pub mod metrics;
mod ports;
mod recording;
mod types;

pub use error::{PortError, PortResult};
pub use memory::{ChannelRecord, ChannelSeed, InMemoryChannelStore, MemberRecord};
pub use metrics::{MetricEvent, MetricsSink, NullMetrics, RecordingMetrics};
pub use ports::{ChannelRepository, CommandExecutor, MaintainerNotifier, MembershipStore, Messenger};
pub use recording::{RecordingExecutor, RecordingMessenger, RecordingNotifier};
pub use types::{
    Channel, CommandResult, CommandStatus, Deauthorization, Dispatchable, MaintainerNotice,
    Member, Role, Sender, DEFAULT_LANGUAGE,
};
