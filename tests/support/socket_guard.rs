//! Skips wiremock tests on hosts that cannot bind a loopback socket.
//!
//! Set `DASHCAM_REQUIRE_SOCKET_TESTS=1` (CI) to turn the skip into a failure.

use std::net::TcpListener;

use wiremock::MockServer;

const REQUIRE_ENV: &str = "DASHCAM_REQUIRE_SOCKET_TESTS";

fn sockets_required() -> bool {
    std::env::var(REQUIRE_ENV)
        .is_ok_and(|value| matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
}

/// Starts a mock device, or returns `None` after logging why the calling test
/// is skipped.
///
/// # Panics
///
/// Panics instead of skipping when `DASHCAM_REQUIRE_SOCKET_TESTS` is set.
pub async fn start_mock_server_or_skip() -> Option<MockServer> {
    if TcpListener::bind("127.0.0.1:0").is_ok() {
        return Some(MockServer::start().await);
    }

    let test = std::thread::current()
        .name()
        .unwrap_or("<unnamed>")
        .to_string();
    assert!(
        !sockets_required(),
        "{test}: cannot bind 127.0.0.1 for the mock device ({REQUIRE_ENV} is set)"
    );
    eprintln!(
        "{test}: skipped, cannot bind 127.0.0.1 for the mock device (set {REQUIRE_ENV}=1 to fail)"
    );
    None
}
