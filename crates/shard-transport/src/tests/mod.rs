//! Socket-level tests for the shard transport.
//!
//! - `harness.rs`      - fake daemon and recording line handler
//! - `connect.rs`      - socket polling, connect and listener delivery
//! - `backpressure.rs` - pool leasing under contention and write failure
//! - `lifecycle.rs`    - stopping and restarting single shards

mod backpressure;
