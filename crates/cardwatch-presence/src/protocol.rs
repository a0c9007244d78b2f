//! Wire protocol for the presence socket.
//!
//! Every frame in both directions is a JSON envelope
//! `{"event": <name>, "data": <payload>}` with camelCase payload keys.
//! Outbound events are strongly typed and serialize straight into that
//! shape. Inbound payloads come from a server we do not control, so they
//! are picked apart field by field with fallbacks instead of failing the
//! whole frame on one odd key.

use cardwatch_common::PresenceError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Event names
// ---------------------------------------------------------------------------

/// Event names used on the wire.
pub mod events {
    // client -> server
    pub const HANDSHAKE: &str = "handshake";
    pub const GET_ONLINE_USERS: &str = "get_online_users";
    pub const ACTIVITY_UPDATE: &str = "activity_update";
    pub const VIEWING: &str = "viewing";
    pub const TYPING_START: &str = "typing_start";
    pub const TYPING_STOP: &str = "typing_stop";
    pub const EDITING_START: &str = "editing_start";
    pub const EDITING_STOP: &str = "editing_stop";
    pub const JOIN_ROOM: &str = "join_room";
    pub const LEAVE_ROOM: &str = "leave_room";

    // server -> client
    pub const CONNECTED: &str = "connected";
    pub const ONLINE_USERS: &str = "online_users";
    pub const USER_ONLINE: &str = "user_online";
    pub const USER_OFFLINE: &str = "user_offline";
    pub const USER_ACTIVITY: &str = "user_activity";
    pub const TYPING_INDICATOR: &str = "typing_indicator";
    pub const VIEWING_INDICATOR: &str = "viewing_indicator";
    pub const EDITING_INDICATOR: &str = "editing_indicator";
    pub const NOTIFICATION: &str = "notification";
    pub const ALERT: &str = "alert";
    pub const ERROR: &str = "error";
}

/// Server-side fan-out scope for a resource type, e.g. `module_cardholder`.
pub fn module_room(resource: &str) -> String {
    format!("module_{resource}")
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

/// Untyped frame as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, PresenceError> {
        serde_json::from_slice(bytes)
            .map_err(|e| PresenceError::Protocol(format!("malformed frame: {e}")))
    }

    pub fn from_text(text: &str) -> Result<Self, PresenceError> {
        Self::from_slice(text.as_bytes())
    }

    pub fn to_json(&self) -> Result<String, PresenceError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Shared payload types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
}

/// A roster member. The roster is keyed by `user_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnlineUser {
    pub user_id: String,
    #[serde(default)]
    pub user: UserProfile,
}

/// One entry of the recent-activity feed. Immutable once stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEvent {
    pub user_id: String,
    pub resource: String,
    pub action: String,
    pub resource_id: String,
    #[serde(default)]
    pub details: Value,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl ActivityEvent {
    /// Content identity used for duplicate suppression; ignores details
    /// and timestamp.
    pub fn same_content(&self, other: &ActivityEvent) -> bool {
        self.user_id == other.user_id
            && self.resource == other.resource
            && self.action == other.action
            && self.resource_id == other.resource_id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingIndicator {
    pub resource: String,
    pub resource_id: String,
    pub user_id: String,
    pub is_typing: bool,
}

/// Payload of `viewing_indicator` and `editing_indicator`.
///
/// Anything beyond the keyed fields is carried through untouched in
/// `extra` so consumers can show e.g. the viewer's name.
#[derive(Debug, Clone, PartialEq)]
pub struct PresenceIndicator {
    pub resource: String,
    pub resource_id: String,
    pub user_id: String,
    pub is_editing: Option<bool>,
    pub extra: Map<String, Value>,
}

/// Payload of `notification` and `alert`. `id` and `timestamp` are
/// optional on the wire; the store fills them in.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationPayload {
    pub id: Option<String>,
    pub kind: Option<String>,
    pub title: String,
    pub message: String,
    pub priority: String,
    pub details: Value,
    pub timestamp: Option<i64>,
}

// ---------------------------------------------------------------------------
// Outbound (client -> server)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandshakeAuth {
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Handshake {
    pub auth: HandshakeAuth,
}

/// A `(resource, resourceId)` pair on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRef {
    pub resource: String,
    pub resource_id: String,
}

impl ResourceRef {
    pub fn new(resource: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            resource_id: resource_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityUpdate {
    pub resource: String,
    pub action: String,
    pub resource_id: String,
    #[serde(default)]
    pub details: Value,
}

/// Every frame a client may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum OutboundEvent {
    Handshake(Handshake),
    GetOnlineUsers,
    ActivityUpdate(ActivityUpdate),
    Viewing(ResourceRef),
    TypingStart(ResourceRef),
    TypingStop(ResourceRef),
    EditingStart(ResourceRef),
    EditingStop(ResourceRef),
    JoinRoom(String),
    LeaveRoom(String),
}

impl OutboundEvent {
    pub fn handshake(token: impl Into<String>) -> Self {
        Self::Handshake(Handshake {
            auth: HandshakeAuth {
                token: token.into(),
            },
        })
    }

    pub fn to_json(&self) -> Result<String, PresenceError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_text(text: &str) -> Result<Self, PresenceError> {
        serde_json::from_str(text)
            .map_err(|e| PresenceError::Protocol(format!("unknown client frame: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Inbound (server -> client)
// ---------------------------------------------------------------------------

/// Every server-pushed event the presence layer understands.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    /// Handshake ack. Triggers a roster refresh.
    Connected { user_id: Option<String> },
    /// Full roster replace.
    OnlineUsers(Vec<OnlineUser>),
    UserOnline(OnlineUser),
    UserOffline { user_id: String },
    UserActivity(ActivityEvent),
    Typing(TypingIndicator),
    Viewing(PresenceIndicator),
    Editing(PresenceIndicator),
    Notification(NotificationPayload),
    Alert(NotificationPayload),
    /// Application-level error reported by the server. Logged only.
    Error { message: String },
    /// An event name this client does not know.
    Unknown { event: String },
}

impl InboundEvent {
    /// Wire name of this event.
    pub fn name(&self) -> &str {
        match self {
            Self::Connected { .. } => events::CONNECTED,
            Self::OnlineUsers(_) => events::ONLINE_USERS,
            Self::UserOnline(_) => events::USER_ONLINE,
            Self::UserOffline { .. } => events::USER_OFFLINE,
            Self::UserActivity(_) => events::USER_ACTIVITY,
            Self::Typing(_) => events::TYPING_INDICATOR,
            Self::Viewing(_) => events::VIEWING_INDICATOR,
            Self::Editing(_) => events::EDITING_INDICATOR,
            Self::Notification(_) => events::NOTIFICATION,
            Self::Alert(_) => events::ALERT,
            Self::Error { .. } => events::ERROR,
            Self::Unknown { event } => event,
        }
    }

    /// Decode an envelope. `now_ms` stamps activity entries the server
    /// sent without a timestamp.
    ///
    /// Fails only when a field the event cannot exist without (a user id
    /// for roster and indicator events, a resource key for indicators) is
    /// missing under every fallback name.
    pub fn decode(envelope: Envelope, now_ms: i64) -> Result<Self, PresenceError> {
        let Envelope { event, data } = envelope;
        let event = match event.as_str() {
            events::CONNECTED => Self::Connected {
                user_id: pick_user_id(&data),
            },
            events::ONLINE_USERS => Self::OnlineUsers(decode_roster(&data)),
            events::USER_ONLINE => Self::UserOnline(decode_online_user(&data).ok_or_else(
                || missing(&event, "userId"),
            )?),
            events::USER_OFFLINE => Self::UserOffline {
                user_id: pick_user_id(&data).ok_or_else(|| missing(&event, "userId"))?,
            },
            events::USER_ACTIVITY => Self::UserActivity(ActivityEvent {
                user_id: pick_user_id(&data).unwrap_or_default(),
                resource: str_field(&data, "resource").unwrap_or_default(),
                action: str_field(&data, "action").unwrap_or_default(),
                resource_id: str_field(&data, "resourceId").unwrap_or_default(),
                details: data.get("details").cloned().unwrap_or(Value::Null),
                timestamp: data
                    .get("timestamp")
                    .and_then(parse_timestamp)
                    .unwrap_or(now_ms),
            }),
            events::TYPING_INDICATOR => {
                let (resource, resource_id, user_id) = keyed_fields(&event, &data)?;
                Self::Typing(TypingIndicator {
                    resource,
                    resource_id,
                    user_id,
                    is_typing: data
                        .get("isTyping")
                        .and_then(Value::as_bool)
                        .unwrap_or(false),
                })
            }
            events::VIEWING_INDICATOR => Self::Viewing(decode_indicator(&event, data)?),
            events::EDITING_INDICATOR => Self::Editing(decode_indicator(&event, data)?),
            events::NOTIFICATION => Self::Notification(decode_notification(&data)),
            events::ALERT => Self::Alert(decode_notification(&data)),
            events::ERROR => Self::Error {
                message: str_field(&data, "message")
                    .or_else(|| data.as_str().map(str::to_string))
                    .unwrap_or_else(|| data.to_string()),
            },
            _ => Self::Unknown { event },
        };
        Ok(event)
    }
}

// ---------------------------------------------------------------------------
// Field picking
// ---------------------------------------------------------------------------

fn missing(event: &str, field: &str) -> PresenceError {
    PresenceError::Protocol(format!("{event} without {field}"))
}

/// String-or-number field as a string. Empty strings count as absent.
fn str_field(data: &Value, key: &str) -> Option<String> {
    match data.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// `userId`, then `user.id`, then `user._id`.
pub(crate) fn pick_user_id(data: &Value) -> Option<String> {
    str_field(data, "userId").or_else(|| {
        let user = data.get("user")?;
        str_field(user, "id").or_else(|| str_field(user, "_id"))
    })
}

/// Epoch milliseconds, or an RFC 3339 string.
fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .ok()
            .or_else(|| s.parse().ok()),
        _ => None,
    }
}

fn decode_online_user(data: &Value) -> Option<OnlineUser> {
    let user_id = pick_user_id(data)?;
    let user = data
        .get("user")
        .and_then(|u| serde_json::from_value::<UserProfile>(u.clone()).ok())
        .unwrap_or_default();
    Some(OnlineUser { user_id, user })
}

/// Either a bare array or `{ "users": [...] }`. Entries without any user
/// id are skipped.
fn decode_roster(data: &Value) -> Vec<OnlineUser> {
    let list = data
        .as_array()
        .or_else(|| data.get("users").and_then(Value::as_array));
    list.map(|items| items.iter().filter_map(decode_online_user).collect())
        .unwrap_or_default()
}

fn keyed_fields(event: &str, data: &Value) -> Result<(String, String, String), PresenceError> {
    Ok((
        str_field(data, "resource").ok_or_else(|| missing(event, "resource"))?,
        str_field(data, "resourceId").ok_or_else(|| missing(event, "resourceId"))?,
        pick_user_id(data).ok_or_else(|| missing(event, "userId"))?,
    ))
}

fn decode_indicator(event: &str, data: Value) -> Result<PresenceIndicator, PresenceError> {
    let (resource, resource_id, user_id) = keyed_fields(event, &data)?;
    let is_editing = data.get("isEditing").and_then(Value::as_bool);
    let mut extra = match data {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for key in ["resource", "resourceId", "userId", "isEditing"] {
        extra.remove(key);
    }
    Ok(PresenceIndicator {
        resource,
        resource_id,
        user_id,
        is_editing,
        extra,
    })
}

fn decode_notification(data: &Value) -> NotificationPayload {
    NotificationPayload {
        id: str_field(data, "id"),
        kind: str_field(data, "type"),
        title: str_field(data, "title").unwrap_or_default(),
        message: str_field(data, "message").unwrap_or_default(),
        priority: str_field(data, "priority").unwrap_or_else(|| "normal".into()),
        details: data.get("details").cloned().unwrap_or(Value::Null),
        timestamp: data.get("timestamp").and_then(parse_timestamp),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(event: &str, data: Value) -> InboundEvent {
        InboundEvent::decode(Envelope::new(event, data), 1_000).unwrap()
    }

    #[test]
    fn outbound_serializes_as_envelope() {
        let ev = OutboundEvent::TypingStart(ResourceRef::new("cardholder", "123"));
        let json: Value = serde_json::from_str(&ev.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!({"event": "typing_start", "data": {"resource": "cardholder", "resourceId": "123"}})
        );
    }

    #[test]
    fn outbound_unit_and_room_variants() {
        let json: Value =
            serde_json::from_str(&OutboundEvent::GetOnlineUsers.to_json().unwrap()).unwrap();
        assert_eq!(json["event"], "get_online_users");

        let join = OutboundEvent::JoinRoom(module_room("cardholder"));
        let json: Value = serde_json::from_str(&join.to_json().unwrap()).unwrap();
        assert_eq!(json, json!({"event": "join_room", "data": "module_cardholder"}));
    }

    #[test]
    fn handshake_carries_token_under_auth() {
        let json: Value =
            serde_json::from_str(&OutboundEvent::handshake("tok").to_json().unwrap()).unwrap();
        assert_eq!(json, json!({"event": "handshake", "data": {"auth": {"token": "tok"}}}));
    }

    #[test]
    fn outbound_parses_back_from_text() {
        let text = r#"{"event":"activity_update","data":{"resource":"statement","action":"view","resourceId":"9"}}"#;
        match OutboundEvent::from_text(text).unwrap() {
            OutboundEvent::ActivityUpdate(update) => {
                assert_eq!(update.resource_id, "9");
                assert_eq!(update.details, Value::Null);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn user_id_fallback_chain() {
        assert_eq!(pick_user_id(&json!({"userId": "a"})).as_deref(), Some("a"));
        assert_eq!(
            pick_user_id(&json!({"user": {"id": "b"}})).as_deref(),
            Some("b")
        );
        assert_eq!(
            pick_user_id(&json!({"user": {"_id": "c"}})).as_deref(),
            Some("c")
        );
        assert_eq!(pick_user_id(&json!({"userId": 7})).as_deref(), Some("7"));
        assert_eq!(pick_user_id(&json!({"userId": ""})), None);
        assert_eq!(pick_user_id(&json!({})), None);
    }

    #[test]
    fn online_users_accepts_array_or_wrapped() {
        let bare = decode(
            "online_users",
            json!([{"userId": "u1", "user": {"name": "Ana"}}, {"nope": true}]),
        );
        let InboundEvent::OnlineUsers(users) = bare else {
            panic!("expected roster");
        };
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user.name, "Ana");

        let wrapped = decode("online_users", json!({"users": [{"user": {"_id": "u2"}}]}));
        assert_eq!(
            wrapped,
            InboundEvent::OnlineUsers(vec![OnlineUser {
                user_id: "u2".into(),
                user: UserProfile::default(),
            }])
        );
    }

    #[test]
    fn user_offline_without_id_is_rejected() {
        let err = InboundEvent::decode(Envelope::new("user_offline", json!({})), 0).unwrap_err();
        assert!(err.to_string().contains("userId"));
    }

    #[test]
    fn activity_without_timestamp_uses_receive_time() {
        let ev = decode(
            "user_activity",
            json!({"userId": "u1", "resource": "cardholder", "action": "update", "resourceId": "5"}),
        );
        let InboundEvent::UserActivity(activity) = ev else {
            panic!("expected activity");
        };
        assert_eq!(activity.timestamp, 1_000);
    }

    #[test]
    fn activity_accepts_rfc3339_timestamp() {
        let ev = decode(
            "user_activity",
            json!({"userId": "u1", "resource": "r", "action": "a", "resourceId": "1",
                   "timestamp": "1970-01-01T00:00:02Z"}),
        );
        let InboundEvent::UserActivity(activity) = ev else {
            panic!("expected activity");
        };
        assert_eq!(activity.timestamp, 2_000);
    }

    #[test]
    fn viewing_indicator_keeps_free_form_fields() {
        let ev = decode(
            "viewing_indicator",
            json!({"resource": "statement", "resourceId": "42", "userId": "u1", "userName": "Ana"}),
        );
        let InboundEvent::Viewing(ind) = ev else {
            panic!("expected viewing");
        };
        assert_eq!(ind.resource_id, "42");
        assert_eq!(ind.is_editing, None);
        assert_eq!(ind.extra.get("userName"), Some(&json!("Ana")));
        assert!(!ind.extra.contains_key("userId"));
    }

    #[test]
    fn editing_indicator_reads_flag() {
        let ev = decode(
            "editing_indicator",
            json!({"resource": "cardholder", "resourceId": 3, "userId": "u1", "isEditing": false}),
        );
        let InboundEvent::Editing(ind) = ev else {
            panic!("expected editing");
        };
        assert_eq!(ind.resource_id, "3");
        assert_eq!(ind.is_editing, Some(false));
    }

    #[test]
    fn typing_indicator_requires_resource() {
        let err = InboundEvent::decode(
            Envelope::new("typing_indicator", json!({"userId": "u1", "isTyping": true})),
            0,
        )
        .unwrap_err();
        assert!(err.to_string().contains("resource"));
    }

    #[test]
    fn notification_defaults() {
        let ev = decode("alert", json!({"title": "Limit", "message": "Card over limit"}));
        let InboundEvent::Alert(n) = ev else {
            panic!("expected alert");
        };
        assert_eq!(n.id, None);
        assert_eq!(n.priority, "normal");
        assert_eq!(n.timestamp, None);
    }

    #[test]
    fn error_event_message_forms() {
        assert_eq!(
            decode("error", json!({"message": "bad"})),
            InboundEvent::Error {
                message: "bad".into()
            }
        );
        assert_eq!(
            decode("error", json!("plain")),
            InboundEvent::Error {
                message: "plain".into()
            }
        );
    }

    #[test]
    fn unknown_events_are_kept_by_name() {
        let ev = decode("something_new", json!({}));
        assert_eq!(ev.name(), "something_new");
    }

    #[test]
    fn malformed_frame_is_protocol_error() {
        assert!(matches!(
            Envelope::from_text("not json"),
            Err(PresenceError::Protocol(_))
        ));
    }
}
