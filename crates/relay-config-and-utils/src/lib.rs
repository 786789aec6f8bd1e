//! Configuration, paths, errors and logging setup for the relay.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{Config, ResendConfig, TieringConfig, DEFAULT_LOG_LEVEL, DEFAULT_SOCKET_DIR};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
