//! Protocol types for the line-delimited JSON daemon protocol.
//!
//! This crate provides:
//! - [`Frame`], the closed set of request and response kinds with typed payloads
//! - [`CorrelationKey`] rules mapping a response back to its request
//! - classification helpers (rate limits, identity failures, healthcheck echoes)
//! - [`ShardId`], the index of one daemon instance

mod correlation;
mod error;
mod frame;
mod shard;

pub use correlation::{
    healthcheck_body, is_rate_limit_message, new_request_id, parse_healthcheck_body,
    CallbackKind, CorrelationKey, HEALTHCHECK_PREFIX,
};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{
    AccountRequest, Address, Attachment, DataMessage, Frame, IdentityFailure, IncomingMessage,
    MessageFrame, SendRequest, SendResult, SendResultsFrame, SetExpirationRequest,
    TrustRequest, TrustedFingerprintData, TrustedFingerprintFrame, UnexpectedErrorData,
    UnexpectedErrorFrame, UntrustedIdentityData, UntrustedIdentityFrame, VerificationData,
    VerificationErrorData, VerificationErrorFrame, VerificationSucceededFrame, VerifyRequest,
    VersionData, VersionFrame,
};
pub use shard::ShardId;
