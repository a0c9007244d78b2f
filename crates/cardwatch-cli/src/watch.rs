//! `cardwatch watch`: a terminal view of the presence surface.

use std::sync::Arc;
use std::time::Duration;

use cardwatch_common::CardwatchError;
use cardwatch_presence::{
    AuthSession, ConnectionState, IndicatorEntry, PresenceClient, PresenceConfig, PresenceHandle,
    PresenceSnapshot, ResourceWatch, SystemClock,
};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, warn};

/// Re-render period, so viewers and editors age out on screen even when
/// nothing new arrives.
const REFRESH: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceView {
    pub resource: String,
    pub resource_id: String,
    pub viewers: Vec<IndicatorEntry>,
    pub editors: Vec<IndicatorEntry>,
    pub typing: Vec<String>,
}

/// One printed line.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchFrame {
    pub state: String,
    #[serde(flatten)]
    pub snapshot: PresenceSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceView>,
}

pub fn frame(handle: &PresenceHandle, page: Option<&ResourceWatch>) -> WatchFrame {
    WatchFrame {
        state: handle.connection_state().to_string(),
        snapshot: handle.snapshot(),
        resource: page.map(|page| ResourceView {
            resource: page.key().resource.clone(),
            resource_id: page.key().resource_id.clone(),
            viewers: page.other_viewers(),
            editors: page.other_editors(),
            typing: page.typing_users(),
        }),
    }
}

/// Print the frame if it differs from the last one printed.
fn render(handle: &PresenceHandle, page: Option<&ResourceWatch>, last: &mut String) {
    let line = serde_json::to_string(&frame(handle, page))
        .unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    if line != *last {
        println!("{line}");
        *last = line;
    }
}

pub async fn run(
    config: PresenceConfig,
    session: AuthSession,
    target: Option<(String, String)>,
) -> Result<(), CardwatchError> {
    let mut client = PresenceClient::new(config, Arc::new(SystemClock));
    let handle = client.handle();
    let (_auth, auth_rx) = watch::channel(Some(session));
    client.init(auth_rx);

    let page = target.map(|(resource, id)| handle.watch_resource(&resource, &id));
    let mut revision = handle.subscribe();
    let mut state = handle.subscribe_state();
    let mut refresh = tokio::time::interval(REFRESH);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let mut last = String::new();
    let mut outcome = Ok(());
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Interrupted, disconnecting");
                break;
            }
            changed = revision.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                info!(state = %current, "Presence connection state");
                if current == ConnectionState::Failed {
                    warn!("Presence connection failed; check the token and server URL");
                    outcome = Err(CardwatchError::Other("presence connection failed".into()));
                    break;
                }
            }
            _ = refresh.tick() => {}
        }
        render(&handle, page.as_ref(), &mut last);
    }

    drop(page);
    client.dispose().await;
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use cardwatch_presence::realtime::TransportConfig;

    fn offline_client() -> PresenceClient {
        let config = PresenceConfig {
            transport: TransportConfig {
                server_url: "ws://127.0.0.1:1/presence".into(),
                ..TransportConfig::default()
            },
            ..PresenceConfig::default()
        };
        PresenceClient::new(config, Arc::new(SystemClock))
    }

    #[test]
    fn frame_without_resource_omits_the_key() {
        let client = offline_client();
        let json = serde_json::to_value(frame(&client.handle(), None)).unwrap();
        assert_eq!(json["state"], "disconnected");
        assert_eq!(json["connected"], false);
        assert!(json.get("resource").is_none());
        assert!(json["onlineUsers"].is_array());
    }

    #[tokio::test]
    async fn frame_with_resource_lists_people() {
        let client = offline_client();
        let handle = client.handle();
        let page = handle.watch_resource("cardholder", "7");
        let json = serde_json::to_value(frame(&handle, Some(&page))).unwrap();
        assert_eq!(json["resource"]["resource"], "cardholder");
        assert_eq!(json["resource"]["resourceId"], "7");
        assert!(json["resource"]["viewers"].as_array().unwrap().is_empty());
    }

    #[test]
    fn render_skips_repeats() {
        let client = offline_client();
        let handle = client.handle();
        let mut last = String::new();
        render(&handle, None, &mut last);
        let first = last.clone();
        render(&handle, None, &mut last);
        assert_eq!(first, last);
    }
}
