use std::{sync::OnceLock, time::Duration};

use tracing::{debug, warn};

/// Default timeout for a single platform API request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const USER_AGENT: &str = concat!("clip-relay/", env!("CARGO_PKG_VERSION"));

/// Install the aws-lc-rs crypto provider for rustls. Safe to call repeatedly.
///
/// Both reqwest and the chat WebSocket are built without a bundled provider,
/// so this must run before either opens a TLS connection.
pub fn install_rustls_provider() {
    static PROVIDER_INSTALLED: OnceLock<()> = OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}

/// Shared client for the Helix and YouTube Data APIs.
pub fn build_http_client(request_timeout: Duration) -> reqwest::Client {
    install_rustls_provider();

    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .connect_timeout(Duration::from_secs(10))
        .pool_idle_timeout(Duration::from_secs(90));

    if request_timeout > Duration::ZERO {
        builder = builder.timeout(request_timeout);
    }

    builder.build().unwrap_or_else(|error| {
        warn!(error = %error, "Failed to build configured HTTP client; using reqwest defaults");
        reqwest::Client::new()
    })
}
