//! Default collaborator implementations wired by the binary.

mod executor;
mod messenger;
mod metrics;
mod notifier;
mod store;

pub use executor::RelayExecutor;
pub use messenger::BroadcastMessenger;
pub use metrics::TracingMetrics;
pub use notifier::ThrottledNotifier;
pub use store::load_channel_store;
