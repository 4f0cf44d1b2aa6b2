//! Session endpoint resolution

/// Path of the notification socket on every host
pub const SOCKET_PATH: &str = "/socket/v1/connect";

/// Development host substituted for `localhost*` page hosts
pub const DEFAULT_DEV_HOST: &str = "localhost:8000";

/// Build the socket URL for the host the application is served from
///
/// Page hosts starting with `localhost` are replaced by `dev_host` and
/// use plain `ws://`; everything else goes over `wss://`.
pub fn resolve_endpoint(page_host: &str, dev_host: &str) -> String {
    if page_host.starts_with("localhost") {
        format!("ws://{}{}", dev_host, SOCKET_PATH)
    } else {
        format!("wss://{}{}", page_host, SOCKET_PATH)
    }
}

/// True for `ws://` and `wss://` URLs
pub fn is_socket_url(url: &str) -> bool {
    url.starts_with("ws://") || url.starts_with("wss://")
}
