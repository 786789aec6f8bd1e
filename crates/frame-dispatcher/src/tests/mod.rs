//! Scenario tests for the dispatcher.
//!
//! - `harness.rs`       - a dispatcher wired to in-memory and recording collaborators
//! - `rate_limit.rs`    - 413 handling and resends on the owning shard
//! - `relay.rs`         - message classification, empty and malformed frames
//! - `expiry.rs`        - disappearing-message timer reconciliation by role
//! - `safety_number.rs` - identity changes from notifications and send results
//! - `correlation.rs`   - responses, healthcheck echoes and listener isolation

mod relay;
