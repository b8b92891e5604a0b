//! Ambient configuration defaults.
//!
//! Mirrors the stack crate's `core::NetworkConfig`/`InterfaceConfig`
//! pattern — a plain struct of named fields with a `Default` impl — used
//! here to centralize the timeouts, backlog, and poll intervals spec.md §5
//! names instead of scattering literals through the endpoint constructors.

use std::time::Duration;

/// Defaults for a newly constructed [`crate::tcp::TcpEndpoint`] or
/// [`crate::udp::UdpEndpoint`].
#[derive(Debug, Clone, Copy)]
pub struct EndpointConfig {
    /// `connect()` timeout; `None` blocks indefinitely.
    pub connect_timeout: Option<Duration>,
    /// `SO_RCVTIMEO`.
    pub read_timeout: Option<Duration>,
    /// `SO_SNDTIMEO`.
    pub write_timeout: Option<Duration>,
    /// Accept-loop `select()` poll granularity.
    pub accept_poll_interval: Duration,
    /// `read_loop`/`wait_message` poll granularity.
    pub read_loop_poll_interval: Duration,
    /// `tls_wait_for_accept` poll granularity.
    pub tls_accept_poll_interval: Duration,
    /// Default `listen()` backlog.
    pub listen_backlog: i32,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            accept_poll_interval: Duration::from_millis(100),
            read_loop_poll_interval: Duration::from_millis(200),
            tls_accept_poll_interval: Duration::from_millis(10),
            listen_backlog: 128,
        }
    }
}

/// The write-retry wait when a non-blocking write would block, per
/// spec.md §4.D.
pub const WRITE_RETRY_WAIT: Duration = Duration::from_millis(100);
