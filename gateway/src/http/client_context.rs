use std::net::IpAddr;

use tracing::{debug, warn};

use crate::http::state::AppState;
use crate::identity::NetworkLocation;

fn location_key(ip: IpAddr) -> String {
    format!("client:{ip}:location")
}

/// Resolves where a client connects from, memoizing the answer in the cache store.
/// Cache failures are logged and fall through to a fresh lookup.
pub async fn client_location(state: &AppState, ip: IpAddr) -> NetworkLocation {
    let key = location_key(ip);

    match state.cache.get(&key).await {
        Ok(Some(bytes)) => {
            if let Ok(name) = String::from_utf8(bytes) {
                return NetworkLocation { ip, name };
            }
        }
        Ok(None) => {}
        Err(error) => warn!(%ip, %error, "client context read failed"),
    }

    let location = state.locator.locate(ip).await;
    if let Err(error) = state
        .cache
        .set(&key, location.name.as_bytes(), Some(state.client_context_ttl))
        .await
    {
        warn!(%ip, %error, "client context write failed");
    }

    location
}

/// Logs the client's location in the background without holding up the request.
/// At most one lookup per address runs at a time.
pub fn note_client(state: &AppState, ip: IpAddr) {
    let Ok(mut pending) = state.pending_lookups.lock() else {
        return;
    };
    if !pending.insert(ip) {
        return;
    }
    drop(pending);

    let state = state.clone();
    tokio::spawn(async move {
        let location = client_location(&state, ip).await;
        debug!(client = %location.ip, location = %location.name, "chat completion client");
        if let Ok(mut pending) = state.pending_lookups.lock() {
            pending.remove(&ip);
        }
    });
}
