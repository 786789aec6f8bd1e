//! Application wiring and lifecycle management.

mod init;
mod lifecycle;
mod state;
mod supervisor;

pub use init::run_relay;
pub use lifecycle::{check_status, stop_relay};
pub use state::RelayState;
