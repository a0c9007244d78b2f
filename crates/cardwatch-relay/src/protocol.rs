//! Relay-side view of the presence wire protocol.
//!
//! Client frames are parsed into [`ClientFrame`]; everything the relay
//! sends is an `{"event", "data"}` envelope built by the helpers below.

use serde::Deserialize;
use serde_json::{json, Value};

use crate::directory::DirectoryUser;

#[derive(Debug, Deserialize)]
pub struct HandshakeAuth {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct HandshakeData {
    pub auth: HandshakeAuth,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceData {
    pub resource: String,
    pub resource_id: String,
}

impl ResourceData {
    pub fn room(&self) -> String {
        format!("module_{}", self.resource)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityData {
    pub resource: String,
    pub action: String,
    pub resource_id: String,
    #[serde(default)]
    pub details: Value,
}

/// Every frame a client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    Handshake(HandshakeData),
    GetOnlineUsers,
    ActivityUpdate(ActivityData),
    Viewing(ResourceData),
    TypingStart(ResourceData),
    TypingStop(ResourceData),
    EditingStart(ResourceData),
    EditingStop(ResourceData),
    JoinRoom(String),
    LeaveRoom(String),
}

impl ClientFrame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

fn envelope(event: &str, data: Value) -> String {
    json!({ "event": event, "data": data }).to_string()
}

fn profile(user: &DirectoryUser) -> Value {
    json!({ "id": user.id, "name": user.name, "email": user.email, "role": user.role })
}

pub fn connected(user: &DirectoryUser) -> String {
    envelope("connected", json!({ "userId": user.id, "user": profile(user) }))
}

pub fn error(message: &str) -> String {
    envelope("error", json!({ "message": message }))
}

pub fn user_online(user: &DirectoryUser) -> String {
    envelope("user_online", json!({ "userId": user.id, "user": profile(user) }))
}

pub fn user_offline(user_id: &str) -> String {
    envelope("user_offline", json!({ "userId": user_id }))
}

pub fn online_users(users: &[DirectoryUser]) -> String {
    let list: Vec<Value> = users
        .iter()
        .map(|u| json!({ "userId": u.id, "user": profile(u) }))
        .collect();
    envelope("online_users", Value::Array(list))
}

pub fn user_activity(user: &DirectoryUser, activity: &ActivityData, timestamp_ms: i64) -> String {
    envelope(
        "user_activity",
        json!({
            "userId": user.id,
            "user": profile(user),
            "resource": activity.resource,
            "action": activity.action,
            "resourceId": activity.resource_id,
            "details": activity.details,
            "timestamp": timestamp_ms,
        }),
    )
}

pub fn typing_indicator(user: &DirectoryUser, target: &ResourceData, is_typing: bool) -> String {
    envelope(
        "typing_indicator",
        json!({
            "userId": user.id,
            "resource": target.resource,
            "resourceId": target.resource_id,
            "isTyping": is_typing,
        }),
    )
}

pub fn viewing_indicator(user: &DirectoryUser, target: &ResourceData, timestamp_ms: i64) -> String {
    envelope(
        "viewing_indicator",
        json!({
            "userId": user.id,
            "userName": user.name,
            "resource": target.resource,
            "resourceId": target.resource_id,
            "timestamp": timestamp_ms,
        }),
    )
}

pub fn editing_indicator(
    user: &DirectoryUser,
    target: &ResourceData,
    is_editing: bool,
    timestamp_ms: i64,
) -> String {
    envelope(
        "editing_indicator",
        json!({
            "userId": user.id,
            "userName": user.name,
            "resource": target.resource,
            "resourceId": target.resource_id,
            "isEditing": is_editing,
            "timestamp": timestamp_ms,
        }),
    )
}
