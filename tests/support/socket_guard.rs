//! Skips wiremock tests where localhost sockets cannot be bound.

use std::net::TcpListener;

use wiremock::MockServer;

/// Fails instead of skipping when set to `1`, `true` or `yes`.
const REQUIRE_ENV: &str = "RESUMABLE_REQUIRE_SOCKET_TESTS";

/// Starts a mock server, or returns `None` when binding is impossible here.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }

    let required = std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"));
    assert!(!required, "cannot bind a localhost socket and {REQUIRE_ENV} is set");
    eprintln!("cannot bind a localhost socket; skipping wiremock test");
    None
}
