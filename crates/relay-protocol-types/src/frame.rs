//! Frame definitions.
//!
//! One JSON object per line, tagged by `type`. Requests are flat objects with
//! camelCase fields and an optional `id` the daemon echoes back; responses and
//! notifications carry their payload under `data`.

use crate::correlation::{
    is_rate_limit_message, parse_healthcheck_body, CallbackKind, CorrelationKey,
};
use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Correlation id used for version echoes that carry no id.
const VERSION_FALLBACK_ID: &str = "version";

/// A protocol address. The number is the relay's view of a member.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    pub number: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
}

impl Address {
    pub fn new(number: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            uuid: None,
        }
    }
}

/// Attachment metadata, inbound (`storedFilename`) or outbound (`filename`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stored_filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_note: Option<bool>,
}

impl Attachment {
    /// Outbound form of a received attachment: the daemon's stored file
    /// becomes the file to send.
    pub fn forwardable(&self) -> Attachment {
        Attachment {
            filename: self
                .stored_filename
                .clone()
                .or_else(|| self.filename.clone()),
            stored_filename: None,
            ..self.clone()
        }
    }
}

// =============================================================================
// Requests
// =============================================================================

/// Request addressed only by account: register, subscribe, unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    pub recipient_address: Address,
    #[serde(default)]
    pub message_body: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExpirationRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    pub recipient_address: Address,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub username: String,
    pub recipient_address: Address,
    pub fingerprint: String,
}

/// `version` is both a request (no data) and its response (with data).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<VersionData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionData {
    pub version: String,
}

// =============================================================================
// Responses and notifications
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFrame {
    pub data: IncomingMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IncomingMessage {
    /// Account (channel phone number) that received the message.
    pub username: String,
    pub source: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    /// Absent for receipts and typing indicators.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_message: Option<DataMessage>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default)]
    pub expires_in_seconds: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
}

impl IncomingMessage {
    /// Message text, empty when absent.
    pub fn body(&self) -> &str {
        self.data_message
            .as_ref()
            .and_then(|m| m.body.as_deref())
            .unwrap_or("")
    }

    pub fn attachments(&self) -> &[Attachment] {
        self.data_message
            .as_ref()
            .map(|m| m.attachments.as_slice())
            .unwrap_or(&[])
    }

    /// Disappearing-message timer carried by a data message.
    pub fn expires_in_seconds(&self) -> Option<u64> {
        self.data_message.as_ref().map(|m| m.expires_in_seconds)
    }

    /// Whether there is anything to relay: text or at least one attachment.
    pub fn has_content(&self) -> bool {
        !self.body().trim().is_empty() || !self.attachments().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnexpectedErrorFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data: UnexpectedErrorData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnexpectedErrorData {
    #[serde(default)]
    pub message: String,
    /// The request that failed, echoed verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
}

impl UnexpectedErrorData {
    /// The echoed request as a frame, when it is one this relay understands.
    pub fn request_frame(&self) -> Option<Frame> {
        self.request
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSucceededFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data: VerificationData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationData {
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationErrorFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data: VerificationErrorData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationErrorData {
    pub username: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedFingerprintFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data: TrustedFingerprintData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedFingerprintData {
    /// The trust request being acknowledged.
    pub request: TrustRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResultsFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub data: Vec<SendResult>,
}

/// Outcome of a send for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub address: Address,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network_failure: Option<bool>,
    /// New fingerprint of a recipient whose identity is no longer trusted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_failure: Option<String>,
}

/// A recipient whose safety number changed, as reported in send results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityFailure {
    pub address: Address,
    pub fingerprint: String,
}

impl SendResultsFrame {
    pub fn identity_failures(&self) -> Vec<IdentityFailure> {
        self.data
            .iter()
            .filter_map(|result| {
                result
                    .identity_failure
                    .as_ref()
                    .map(|fingerprint| IdentityFailure {
                        address: result.address.clone(),
                        fingerprint: fingerprint.clone(),
                    })
            })
            .collect()
    }

    pub fn all_succeeded(&self) -> bool {
        self.data.iter().all(|result| result.success.is_some())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedIdentityFrame {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub data: UntrustedIdentityData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UntrustedIdentityData {
    /// Channel account that observed the change.
    pub username: String,
    /// Member whose identity changed.
    pub number: String,
    pub fingerprint: String,
    /// Send that was refused because of the change, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<Value>,
}

impl UntrustedIdentityData {
    pub fn pending_message(&self) -> Option<Frame> {
        self.request
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

// =============================================================================
// Frame
// =============================================================================

/// Every frame kind exchanged with the daemon.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    // Requests
    Register(AccountRequest),
    Verify(VerifyRequest),
    Subscribe(AccountRequest),
    Unsubscribe(AccountRequest),
    Send(SendRequest),
    SetExpiration(SetExpirationRequest),
    Trust(TrustRequest),
    /// Request when `data` is absent, response otherwise.
    Version(VersionFrame),

    // Responses and notifications
    Message(MessageFrame),
    UnexpectedError(UnexpectedErrorFrame),
    VerificationSucceeded(VerificationSucceededFrame),
    VerificationError(VerificationErrorFrame),
    TrustedFingerprint(TrustedFingerprintFrame),
    SendResults(SendResultsFrame),
    UntrustedIdentity(UntrustedIdentityFrame),
}

impl Frame {
    /// Parse one protocol line.
    pub fn parse(line: &str) -> ProtocolResult<Self> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Err(ProtocolError::Malformed("empty line".to_string()));
        }
        Ok(serde_json::from_str(trimmed)?)
    }

    /// Serialize to a single-line JSON string (without the newline).
    pub fn to_json(&self) -> ProtocolResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Wire tag of this frame.
    pub fn type_name(&self) -> &'static str {
        match self {
            Frame::Register(_) => "register",
            Frame::Verify(_) => "verify",
            Frame::Subscribe(_) => "subscribe",
            Frame::Unsubscribe(_) => "unsubscribe",
            Frame::Send(_) => "send",
            Frame::SetExpiration(_) => "set_expiration",
            Frame::Trust(_) => "trust",
            Frame::Version(_) => "version",
            Frame::Message(_) => "message",
            Frame::UnexpectedError(_) => "unexpected_error",
            Frame::VerificationSucceeded(_) => "verification_succeeded",
            Frame::VerificationError(_) => "verification_error",
            Frame::TrustedFingerprint(_) => "trusted_fingerprint",
            Frame::SendResults(_) => "send_results",
            Frame::UntrustedIdentity(_) => "untrusted_identity",
        }
    }

    pub fn is_request(&self) -> bool {
        match self {
            Frame::Register(_)
            | Frame::Verify(_)
            | Frame::Subscribe(_)
            | Frame::Unsubscribe(_)
            | Frame::Send(_)
            | Frame::SetExpiration(_)
            | Frame::Trust(_) => true,
            Frame::Version(v) => v.data.is_none(),
            Frame::Message(_)
            | Frame::UnexpectedError(_)
            | Frame::VerificationSucceeded(_)
            | Frame::VerificationError(_)
            | Frame::TrustedFingerprint(_)
            | Frame::SendResults(_)
            | Frame::UntrustedIdentity(_) => false,
        }
    }

    /// Request id carried on the frame, if any.
    pub fn id(&self) -> Option<&str> {
        let id = match self {
            Frame::Register(r) | Frame::Subscribe(r) | Frame::Unsubscribe(r) => &r.id,
            Frame::Verify(r) => &r.id,
            Frame::Send(r) => &r.id,
            Frame::SetExpiration(r) => &r.id,
            Frame::Trust(r) => &r.id,
            Frame::Version(r) => &r.id,
            Frame::Message(_) => return None,
            Frame::UnexpectedError(r) => &r.id,
            Frame::VerificationSucceeded(r) => &r.id,
            Frame::VerificationError(r) => &r.id,
            Frame::TrustedFingerprint(r) => &r.id,
            Frame::SendResults(r) => &r.id,
            Frame::UntrustedIdentity(r) => &r.id,
        };
        id.as_deref()
    }

    /// Replace the request id. Message frames carry no id and are unchanged.
    pub fn with_id(mut self, new_id: impl Into<String>) -> Self {
        if let Some(slot) = self.id_slot() {
            *slot = Some(new_id.into());
        }
        self
    }

    fn id_slot(&mut self) -> Option<&mut Option<String>> {
        match self {
            Frame::Register(r) | Frame::Subscribe(r) | Frame::Unsubscribe(r) => Some(&mut r.id),
            Frame::Verify(r) => Some(&mut r.id),
            Frame::Send(r) => Some(&mut r.id),
            Frame::SetExpiration(r) => Some(&mut r.id),
            Frame::Trust(r) => Some(&mut r.id),
            Frame::Version(r) => Some(&mut r.id),
            Frame::Message(_) => None,
            Frame::UnexpectedError(r) => Some(&mut r.id),
            Frame::VerificationSucceeded(r) => Some(&mut r.id),
            Frame::VerificationError(r) => Some(&mut r.id),
            Frame::TrustedFingerprint(r) => Some(&mut r.id),
            Frame::SendResults(r) => Some(&mut r.id),
            Frame::UntrustedIdentity(r) => Some(&mut r.id),
        }
    }

    /// Channel account the frame belongs to, when the frame names one.
    pub fn username(&self) -> Option<&str> {
        match self {
            Frame::Register(r) | Frame::Subscribe(r) | Frame::Unsubscribe(r) => Some(&r.username),
            Frame::Verify(r) => Some(&r.username),
            Frame::Send(r) => Some(&r.username),
            Frame::SetExpiration(r) => Some(&r.username),
            Frame::Trust(r) => Some(&r.username),
            Frame::Message(m) => Some(&m.data.username),
            Frame::VerificationSucceeded(v) => Some(&v.data.username),
            Frame::VerificationError(v) => Some(&v.data.username),
            Frame::TrustedFingerprint(t) => Some(&t.data.request.username),
            Frame::UntrustedIdentity(u) => Some(&u.data.username),
            Frame::Version(_) | Frame::UnexpectedError(_) | Frame::SendResults(_) => None,
        }
    }

    /// Key of the outstanding request this frame answers, if it answers one.
    pub fn correlation_key(&self) -> Option<CorrelationKey> {
        match self {
            Frame::VerificationSucceeded(v) => Some(CorrelationKey::new(
                CallbackKind::Verify,
                v.data.username.clone(),
            )),
            Frame::VerificationError(v) => Some(CorrelationKey::new(
                CallbackKind::Verify,
                v.data.username.clone(),
            )),
            Frame::TrustedFingerprint(t) => Some(CorrelationKey::new(
                CallbackKind::Trust,
                t.data.request.fingerprint.clone(),
            )),
            Frame::SendResults(r) => r
                .id
                .as_ref()
                .map(|id| CorrelationKey::new(CallbackKind::Send, id.clone())),
            Frame::Version(v) if v.data.is_some() => Some(CorrelationKey::new(
                CallbackKind::Version,
                v.id.clone()
                    .unwrap_or_else(|| VERSION_FALLBACK_ID.to_string()),
            )),
            Frame::Message(m) => parse_healthcheck_body(m.data.body())
                .map(|id| CorrelationKey::new(CallbackKind::Healthcheck, id)),
            _ => None,
        }
    }

    /// Whether this is a daemon error reporting an upstream rate limit.
    pub fn is_rate_limit_error(&self) -> bool {
        matches!(self, Frame::UnexpectedError(e) if is_rate_limit_message(&e.data.message))
    }

    // -------------------------------------------------------------------------
    // Request constructors
    // -------------------------------------------------------------------------

    pub fn register(username: impl Into<String>) -> Self {
        Frame::Register(AccountRequest {
            id: None,
            username: username.into(),
        })
    }

    pub fn verify(username: impl Into<String>, code: impl Into<String>) -> Self {
        Frame::Verify(VerifyRequest {
            id: None,
            username: username.into(),
            code: code.into(),
        })
    }

    pub fn subscribe(username: impl Into<String>) -> Self {
        Frame::Subscribe(AccountRequest {
            id: None,
            username: username.into(),
        })
    }

    pub fn unsubscribe(username: impl Into<String>) -> Self {
        Frame::Unsubscribe(AccountRequest {
            id: None,
            username: username.into(),
        })
    }

    pub fn send(
        username: impl Into<String>,
        recipient: impl Into<String>,
        message_body: impl Into<String>,
        attachments: Vec<Attachment>,
    ) -> Self {
        Frame::Send(SendRequest {
            id: None,
            username: username.into(),
            recipient_address: Address::new(recipient),
            message_body: message_body.into(),
            attachments,
        })
    }

    pub fn set_expiration(
        username: impl Into<String>,
        recipient: impl Into<String>,
        expires_in_seconds: u64,
    ) -> Self {
        Frame::SetExpiration(SetExpirationRequest {
            id: None,
            username: username.into(),
            recipient_address: Address::new(recipient),
            expires_in_seconds,
        })
    }

    pub fn trust(
        username: impl Into<String>,
        recipient: impl Into<String>,
        fingerprint: impl Into<String>,
    ) -> Self {
        Frame::Trust(TrustRequest {
            id: None,
            username: username.into(),
            recipient_address: Address::new(recipient),
            fingerprint: fingerprint.into(),
        })
    }

    pub fn version_request() -> Self {
        Frame::Version(VersionFrame::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE_LIMIT_LINE: &str = r#"{"type":"unexpected_error","data":{"message":"Rate limit exceeded: 413","request":{"type":"send","username":"+1555","recipientAddress":{"number":"+1777"},"messageBody":"hi"}}}"#;

    #[test]
    fn test_parse_rate_limit_error_with_echoed_send() {
        let frame = Frame::parse(RATE_LIMIT_LINE).unwrap();
        assert!(frame.is_rate_limit_error());

        let Frame::UnexpectedError(error) = frame else {
            panic!("expected unexpected_error");
        };
        let request = error.data.request_frame().unwrap();
        assert_eq!(request, Frame::send("+1555", "+1777", "hi", vec![]));
        assert_eq!(request.username(), Some("+1555"));
    }

    #[test]
    fn test_generic_error_is_not_rate_limit() {
        let line = r#"{"type":"unexpected_error","data":{"message":"boom"}}"#;
        let frame = Frame::parse(line).unwrap();
        assert!(!frame.is_rate_limit_error());
        assert!(frame.correlation_key().is_none());
    }

    #[test]
    fn test_parse_failures() {
        assert!(Frame::parse("").is_err());
        assert!(Frame::parse("{\"type\":\"send\"").is_err());
        assert!(Frame::parse(r#"{"type":"listen_started","data":{}}"#).is_err());
        assert!(Frame::parse("not json").is_err());
    }

    #[test]
    fn test_send_request_wire_shape() {
        let frame = Frame::send("+1555", "+1777", "hello", vec![]).with_id("req-1");
        let json: Value = serde_json::to_value(&frame).unwrap();

        assert_eq!(json["type"], "send");
        assert_eq!(json["id"], "req-1");
        assert_eq!(json["username"], "+1555");
        assert_eq!(json["recipientAddress"]["number"], "+1777");
        assert_eq!(json["messageBody"], "hello");
        assert!(json.get("attachments").is_none());
    }

    #[test]
    fn test_set_expiration_wire_shape() {
        let json: Value =
            serde_json::to_value(Frame::set_expiration("+1555", "+1777", 60)).unwrap();
        assert_eq!(json["type"], "set_expiration");
        assert_eq!(json["expiresInSeconds"], 60);
        assert!(json.get("id").is_none());
    }

    #[test]
    fn test_version_request_and_response() {
        let request = Frame::version_request();
        assert!(request.is_request());
        assert_eq!(request.to_json().unwrap(), r#"{"type":"version"}"#);
        assert!(request.correlation_key().is_none());

        let response =
            Frame::parse(r#"{"type":"version","id":"v-1","data":{"version":"0.9.2"}}"#).unwrap();
        assert!(!response.is_request());
        assert_eq!(
            response.correlation_key(),
            Some(CorrelationKey::new(CallbackKind::Version, "v-1"))
        );
    }

    #[test]
    fn test_message_accessors() {
        let line = r#"{"type":"message","data":{"username":"+1555","source":{"number":"+1999"},"dataMessage":{"body":"hello","expiresInSeconds":30,"attachments":[{"storedFilename":"/tmp/a.jpg","contentType":"image/jpeg"}]}}}"#;
        let Frame::Message(message) = Frame::parse(line).unwrap() else {
            panic!("expected message");
        };

        assert_eq!(message.data.body(), "hello");
        assert_eq!(message.data.expires_in_seconds(), Some(30));
        assert_eq!(message.data.attachments().len(), 1);
        assert!(message.data.has_content());

        let forwarded = message.data.attachments()[0].forwardable();
        assert_eq!(forwarded.filename.as_deref(), Some("/tmp/a.jpg"));
        assert!(forwarded.stored_filename.is_none());
        assert_eq!(forwarded.content_type.as_deref(), Some("image/jpeg"));
    }

    #[test]
    fn test_empty_message_has_no_content() {
        let line = r#"{"type":"message","data":{"username":"+1555","source":{"number":"+1999"},"dataMessage":{"body":"","attachments":[]}}}"#;
        let Frame::Message(message) = Frame::parse(line).unwrap() else {
            panic!("expected message");
        };
        assert!(!message.data.has_content());
        assert_eq!(message.data.expires_in_seconds(), Some(0));
    }

    #[test]
    fn test_receipt_has_no_data_message() {
        let line = r#"{"type":"message","data":{"username":"+1555","source":{"number":"+1999"},"timestamp":1}}"#;
        let Frame::Message(message) = Frame::parse(line).unwrap() else {
            panic!("expected message");
        };
        assert!(!message.data.has_content());
        assert_eq!(message.data.expires_in_seconds(), None);
    }

    #[test]
    fn test_healthcheck_echo_correlates() {
        let line = r#"{"type":"message","data":{"username":"+1000","source":{"number":"+1000"},"dataMessage":{"body":"healthcheck hc-7"}}}"#;
        assert_eq!(
            Frame::parse(line).unwrap().correlation_key(),
            Some(CorrelationKey::new(CallbackKind::Healthcheck, "hc-7"))
        );
    }

    #[test]
    fn test_trusted_fingerprint_correlates_by_nested_fingerprint() {
        let line = r#"{"type":"trusted_fingerprint","data":{"request":{"type":"trust","fingerprint":"05 ab cd","username":"+1555","recipientAddress":{"number":"+1777"}}}}"#;
        let frame = Frame::parse(line).unwrap();
        assert_eq!(
            frame.correlation_key(),
            Some(CorrelationKey::new(CallbackKind::Trust, "05 ab cd"))
        );
        assert_eq!(frame.username(), Some("+1555"));
    }

    #[test]
    fn test_verification_frames_correlate_by_username() {
        let ok = Frame::parse(r#"{"type":"verification_succeeded","data":{"username":"+1555"}}"#)
            .unwrap();
        let err = Frame::parse(
            r#"{"type":"verification_error","data":{"username":"+1555","message":"bad code"}}"#,
        )
        .unwrap();
        let key = CorrelationKey::new(CallbackKind::Verify, "+1555");
        assert_eq!(ok.correlation_key(), Some(key.clone()));
        assert_eq!(err.correlation_key(), Some(key));
    }

    #[test]
    fn test_send_results_identity_failures() {
        let line = r#"{"type":"send_results","id":"s-1","data":[{"address":{"number":"+1777"},"success":{"unidentified":false}},{"address":{"number":"+1888"},"identityFailure":"05 ff"}]}"#;
        let frame = Frame::parse(line).unwrap();
        assert_eq!(
            frame.correlation_key(),
            Some(CorrelationKey::new(CallbackKind::Send, "s-1"))
        );

        let Frame::SendResults(results) = frame else {
            panic!("expected send_results");
        };
        assert!(!results.all_succeeded());
        assert_eq!(
            results.identity_failures(),
            vec![IdentityFailure {
                address: Address::new("+1888"),
                fingerprint: "05 ff".to_string(),
            }]
        );
    }

    #[test]
    fn test_untrusted_identity_pending_message() {
        let line = r#"{"type":"untrusted_identity","data":{"username":"+1555","number":"+1777","fingerprint":"05 aa","request":{"type":"send","username":"+1555","recipientAddress":{"number":"+1777"},"messageBody":"hi"}}}"#;
        let Frame::UntrustedIdentity(frame) = Frame::parse(line).unwrap() else {
            panic!("expected untrusted_identity");
        };
        assert_eq!(
            frame.data.pending_message(),
            Some(Frame::send("+1555", "+1777", "hi", vec![]))
        );
    }

    #[test]
    fn test_with_id_leaves_messages_untouched() {
        let line = r#"{"type":"message","data":{"username":"+1555","source":{"number":"+1999"}}}"#;
        let frame = Frame::parse(line).unwrap();
        assert_eq!(frame.clone().with_id("x"), frame);
        assert_eq!(Frame::trust("+1", "+2", "f").with_id("t").id(), Some("t"));
    }
}
