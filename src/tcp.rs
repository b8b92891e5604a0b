//! Blocking TCP endpoint: client `connect`, server `bind`/`listen`/accept
//! loop, timeout-bounded I/O, and TLS.
//!
//! Grounded on `examples/original_source/ppl7/src/internet/TCPSocket.cpp`.
//! The source's non-blocking-connect-plus-`select` timeout pattern is kept
//! (spec.md §9 design note) but delegated to `socket2::Socket::connect_timeout`,
//! which already performs it and restores the blocking flag on every exit
//! path — the source's own restoration bug (spec.md §9) has no analogue
//! here. The accept loop's `on_connect` virtual method becomes the injected
//! [`AcceptHandler`] (spec.md §9's "virtual callback → injected handler"
//! redesign).

use std::ffi::CString;
use std::io::{self, Read, Write};
use std::net::Shutdown;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use openssl::ssl::{ErrorCode, HandshakeError, SslStream};
use openssl::x509::X509VerifyResult;
use socket2::{Domain, Protocol, Socket, Type};

use crate::address::IpAddress;
use crate::config::{EndpointConfig, WRITE_RETRY_WAIT};
use crate::error::{os_error_to_exception, NetError, Result};
use crate::resolver::{get_host_by_name, AddressFamilyFilter};
use crate::sockaddr::SockAddress;
use crate::tls::{TlsContext, TlsHandle};
use crate::watch::{StopFlag, Watch};

/// Not re-exported by `openssl`; OpenSSL has carried this value since
/// verification-result codes were introduced.
const X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT: i32 = 18;

/// States of one endpoint, per spec.md §4.D.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Bound,
    Listening,
    Stopping,
    Connected,
}

enum Io {
    Plain(Socket),
    Tls(SslStream<Socket>),
}

impl Io {
    fn raw_fd(&self) -> RawFd {
        match self {
            Io::Plain(s) => s.as_raw_fd(),
            Io::Tls(s) => s.get_ref().as_raw_fd(),
        }
    }
}

/// What an [`AcceptHandler`] decides to do with a freshly accepted
/// connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptDecision {
    Accept,
    Reject,
}

/// The accept loop's injected connection handler (spec.md §9: a capability
/// object in place of the source's subclass override).
pub trait AcceptHandler {
    fn on_connect(&mut self, endpoint: TcpEndpoint, peer_host: &str, peer_port: u16) -> AcceptDecision;
}

impl<F> AcceptHandler for F
where
    F: FnMut(TcpEndpoint, &str, u16) -> AcceptDecision,
{
    fn on_connect(&mut self, endpoint: TcpEndpoint, peer_host: &str, peer_port: u16) -> AcceptDecision {
        self(endpoint, peer_host, peer_port)
    }
}

/// A blocking TCP client or server connection, optionally TLS-wrapped.
pub struct TcpEndpoint {
    io: Option<Io>,
    state: State,
    config: EndpointConfig,
    source: Option<(String, u16)>,
    stop: StopFlag,
    running: std::sync::Arc<std::sync::atomic::AtomicBool>,
    tls_handle: Option<TlsHandle>,
}

impl Default for TcpEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl TcpEndpoint {
    pub fn new() -> Self {
        Self::with_config(EndpointConfig::default())
    }

    pub fn with_config(config: EndpointConfig) -> Self {
        Self {
            io: None,
            state: State::Closed,
            config,
            source: None,
            stop: StopFlag::new(),
            running: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
            tls_handle: None,
        }
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn local_addr(&self) -> Result<SockAddress> {
        let io = self.io.as_ref().ok_or(NetError::NotConnected)?;
        let addr = self.raw_socket(io).local_addr().map_err(|e| os_error_to_exception(&e, "getsockname"))?;
        let std_addr = addr.as_socket().ok_or(NetError::InvalidSocket)?;
        Ok(SockAddress::from_std(std_addr))
    }

    /// A cheap, cloneable handle that a separate thread can use to request
    /// cancellation of this endpoint's accept loop or `read_loop`/
    /// `wait_message` call (spec.md §5's cooperative-cancellation model).
    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub fn set_source(&mut self, interface: &str, port: u16) {
        self.source = Some((interface.to_string(), port));
    }

    pub fn set_connect_timeout(&mut self, timeout: Option<Duration>) {
        self.config.connect_timeout = timeout;
    }

    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.config.read_timeout = timeout;
        if let Some(io) = &self.io {
            self.raw_socket(io).set_read_timeout(timeout).map_err(|e| os_error_to_exception(&e, "SO_RCVTIMEO"))?;
        }
        Ok(())
    }

    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.config.write_timeout = timeout;
        if let Some(io) = &self.io {
            self.raw_socket(io).set_write_timeout(timeout).map_err(|e| os_error_to_exception(&e, "SO_SNDTIMEO"))?;
        }
        Ok(())
    }

    pub fn set_blocking(&mut self, blocking: bool) -> Result<()> {
        let io = self.io.as_ref().ok_or(NetError::NotConnected)?;
        self.raw_socket(io)
            .set_nonblocking(!blocking)
            .map_err(|e| os_error_to_exception(&e, "set_nonblocking"))
    }

    fn raw_socket<'a>(&self, io: &'a Io) -> &'a Socket {
        match io {
            Io::Plain(s) => s,
            Io::Tls(s) => s.get_ref(),
        }
    }

    fn raw_fd(&self) -> Result<RawFd> {
        self.io.as_ref().map(Io::raw_fd).ok_or(NetError::NotConnected)
    }

    // -- Client role ------------------------------------------------------

    /// Resolves `host`, iterates address candidates, connecting to the
    /// first that succeeds; `port` is a decimal port number or a service
    /// name resolvable via the TCP services database.
    pub fn connect(&mut self, host: &str, port: &str) -> Result<()> {
        if self.state == State::Connected {
            return Err(NetError::SocketAlreadyConnected);
        }
        let port_num = resolve_service_port(port, "tcp")
            .ok_or_else(|| NetError::IllegalArgument(format!("unknown service '{port}'")))?;
        let candidates = get_host_by_name(host, AddressFamilyFilter::Unspec)?;
        if candidates.is_empty() {
            return Err(NetError::HostNotFound(host.to_string()));
        }

        let mut last_err = None;
        for addr in candidates {
            match self.try_connect_one(&addr, port_num) {
                Ok(socket) => {
                    self.io = Some(Io::Plain(socket));
                    self.state = State::Connected;
                    return Ok(());
                }
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or(NetError::ConnectionRefused))
    }

    fn try_connect_one(&self, addr: &IpAddress, port: u16) -> Result<Socket> {
        let std_addr = addr.to_std().ok_or_else(|| NetError::InvalidIpAddress(addr.to_string()))?;
        let domain = if std_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| NetError::CouldNotOpenSocket(e.to_string()))?;

        if let Some((iface, src_port)) = &self.source {
            let src_ip = IpAddress::parse(iface)?;
            let src_addr = SockAddress::new(src_ip, *src_port)?;
            socket.bind(src_addr.as_socket2()).map_err(|e| NetError::CouldNotBindToInterface(e.to_string()))?;
        }

        let peer = SockAddress::new(*addr, port)?;
        match self.config.connect_timeout {
            Some(timeout) => socket
                .connect_timeout(peer.as_socket2(), timeout)
                .map_err(|e| os_error_to_exception(&e, "connect"))?,
            None => socket.connect(peer.as_socket2()).map_err(|e| os_error_to_exception(&e, "connect"))?,
        }
        Ok(socket)
    }

    // -- Server role --------------------------------------------------------

    /// `host == "*"` or empty binds `0.0.0.0`. `SO_REUSEADDR` is always set.
    pub fn bind(&mut self, host: &str, port: u16) -> Result<()> {
        let host = if host.is_empty() || host == "*" { "0.0.0.0" } else { host };
        let addr = match IpAddress::parse(host) {
            Ok(addr) => addr,
            Err(_) => get_host_by_name(host, AddressFamilyFilter::Unspec)?
                .into_iter()
                .next()
                .ok_or_else(|| NetError::HostNotFound(host.to_string()))?,
        };
        let std_addr = addr.to_std().ok_or_else(|| NetError::InvalidIpAddress(addr.to_string()))?;
        let domain = if std_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))
            .map_err(|e| NetError::CouldNotOpenSocket(e.to_string()))?;
        socket.set_reuse_address(true).map_err(|e| os_error_to_exception(&e, "SO_REUSEADDR"))?;

        let bind_addr = SockAddress::new(addr, port)?;
        socket
            .bind(bind_addr.as_socket2())
            .map_err(|e| NetError::CouldNotBindToInterface(e.to_string()))?;

        self.io = Some(Io::Plain(socket));
        self.state = State::Bound;
        Ok(())
    }

    /// Starts the accept loop on the calling thread; blocks until
    /// `signal_stop`/`stop` is observed. See spec.md §4.D's state machine.
    pub fn listen(&mut self, backlog: i32, poll_interval: Duration, handler: &mut dyn AcceptHandler) -> Result<()> {
        {
            let io = self.io.as_ref().ok_or(NetError::InvalidSocket)?;
            let Io::Plain(socket) = io else { return Err(NetError::InvalidSocket) };
            socket.listen(backlog).map_err(|e| os_error_to_exception(&e, "listen"))?;
        }
        self.state = State::Listening;
        self.running.store(true, std::sync::atomic::Ordering::SeqCst);

        let result = self.accept_loop(poll_interval, handler);

        self.running.store(false, std::sync::atomic::Ordering::SeqCst);
        self.state = if self.stop.is_set() { State::Closed } else { State::Stopping };
        result
    }

    fn accept_loop(&mut self, poll_interval: Duration, handler: &mut dyn AcceptHandler) -> Result<()> {
        loop {
            if self.stop.should_stop() {
                return Ok(());
            }
            let listener_fd = self.raw_fd()?;
            if !wait_fd_readable(listener_fd, poll_interval)? {
                continue;
            }
            let Io::Plain(listener) = self.io.as_ref().unwrap() else { return Err(NetError::InvalidSocket) };
            let (conn, peer) = match listener.accept() {
                Ok(pair) => pair,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(os_error_to_exception(&e, "accept")),
            };
            let peer_addr = peer.as_socket().ok_or(NetError::InvalidSocket)?;
            let peer_host = peer_addr.ip().to_string();
            let peer_port = peer_addr.port();

            let new_endpoint = TcpEndpoint {
                io: Some(Io::Plain(conn)),
                state: State::Connected,
                config: self.config,
                source: None,
                stop: StopFlag::new(),
                running: std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false)),
                tls_handle: None,
            };
            // A rejected endpoint is simply dropped, closing its descriptor.
            let _ = handler.on_connect(new_endpoint, &peer_host, peer_port);
        }
    }

    pub fn signal_stop(&self) {
        self.stop.signal();
    }

    /// Sets the stop flag and busy-waits until the accept loop exits.
    pub fn stop(&self) {
        self.stop.signal();
        while self.running.load(std::sync::atomic::Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    // -- Blocking I/O with timeouts -----------------------------------------

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let io = self.io.as_mut().ok_or(NetError::NotConnected)?;
        let res = match io {
            Io::Plain(s) => s.read(buf),
            Io::Tls(s) => s.read(buf),
        };
        res.map_err(|e| os_error_to_exception(&e, "read"))
    }

    /// Writes every byte of `buf`, retrying after up to 100 ms of waiting
    /// for writability whenever the socket transiently reports would-block.
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        let mut offset = 0;
        while offset < buf.len() {
            let io = self.io.as_mut().ok_or(NetError::NotConnected)?;
            let res = match io {
                Io::Plain(s) => s.write(&buf[offset..]),
                Io::Tls(s) => s.write(&buf[offset..]),
            };
            match res {
                Ok(n) => offset += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    wait_fd_writable(self.raw_fd()?, WRITE_RETRY_WAIT)?;
                }
                Err(e) => return Err(os_error_to_exception(&e, "write")),
            }
        }
        Ok(())
    }

    /// Reads exactly `buf.len()` bytes, polling every 200 ms (by default;
    /// see [`EndpointConfig::read_loop_poll_interval`]).
    pub fn read_loop(&mut self, buf: &mut [u8], timeout: Option<Duration>, watch: &dyn Watch) -> Result<()> {
        let started = Instant::now();
        let mut filled = 0;
        let poll_interval = self.config.read_loop_poll_interval;
        while filled < buf.len() {
            if watch.should_stop() {
                return Err(NetError::OperationAborted);
            }
            if let Some(t) = timeout {
                if t > Duration::ZERO && started.elapsed() > t {
                    return Err(NetError::Timeout);
                }
            }
            if !wait_fd_readable(self.raw_fd()?, poll_interval)? {
                continue;
            }
            match self.read(&mut buf[filled..]) {
                Ok(0) => return Err(NetError::BrokenPipe),
                Ok(n) => filled += n,
                Err(NetError::OperationInterrupted) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Distinguishes "data available" from "peer closed" by peeking one
    /// byte; a zero-length peek means the peer has closed the connection.
    /// Peeks one byte with `MSG_PEEK|MSG_DONTWAIT` so this never blocks, even
    /// on a socket left in blocking mode — `socket2::Socket::peek` sets only
    /// `MSG_PEEK` and would otherwise hang against a silent, still-open peer.
    pub fn is_readable(&self) -> Result<bool> {
        let fd = self.raw_fd()?;
        let mut byte = 0u8;
        let rc = unsafe {
            libc::recv(fd, &mut byte as *mut u8 as *mut libc::c_void, 1, libc::MSG_PEEK | libc::MSG_DONTWAIT)
        };
        if rc > 0 {
            return Ok(true);
        }
        if rc == 0 {
            return Err(NetError::BrokenPipe);
        }
        let err = io::Error::last_os_error();
        match err.kind() {
            io::ErrorKind::WouldBlock => Ok(false),
            _ => Err(os_error_to_exception(&err, "recv")),
        }
    }

    // -- Disconnect vs shutdown ---------------------------------------------

    /// Closes the local descriptor only. Idempotent.
    pub fn disconnect(&mut self) -> Result<()> {
        self.tls_handle = None;
        self.io = None;
        self.state = State::Closed;
        Ok(())
    }

    /// Bidirectional shutdown, then close. Idempotent.
    pub fn shutdown(&mut self) -> Result<()> {
        if let Some(io) = &self.io {
            let _ = self.raw_socket(io).shutdown(Shutdown::Both);
        }
        self.disconnect()
    }

    // -- TLS ------------------------------------------------------------

    /// Client-side handshake. With a connect timeout configured, the
    /// handshake runs non-blocking, re-entering `poll` on `WANT_READ`/
    /// `WANT_WRITE` until it completes or the timeout elapses.
    pub fn tls_start(&mut self, ctx: &TlsContext) -> Result<()> {
        let socket = self.take_plain_socket()?;
        let mut handle = ctx.new_handle()?;
        let ssl = handle.take_ssl();

        let deadline = self.config.connect_timeout.map(|t| Instant::now() + t);
        if deadline.is_some() {
            socket.set_nonblocking(true).map_err(|e| os_error_to_exception(&e, "set_nonblocking"))?;
        }

        let stream = match drive_handshake(ssl.connect(socket), deadline, &self.stop, Duration::from_millis(100)) {
            Ok(stream) => stream,
            Err(e) => {
                self.tls_handle = None;
                return Err(e);
            }
        };

        if deadline.is_some() {
            stream.get_ref().set_nonblocking(false).map_err(|e| os_error_to_exception(&e, "set_nonblocking"))?;
        }
        self.io = Some(Io::Tls(stream));
        self.tls_handle = Some(handle);
        Ok(())
    }

    /// Server-side handshake; blocks (subject to the socket's own read/write
    /// timeouts) until it completes or fails.
    pub fn tls_accept(&mut self, ctx: &TlsContext) -> Result<()> {
        let socket = self.take_plain_socket()?;
        let mut handle = ctx.new_handle()?;
        let ssl = handle.take_ssl();

        let stream = match drive_handshake(ssl.accept(socket), None, &self.stop, Duration::from_millis(100)) {
            Ok(stream) => stream,
            Err(e) => {
                self.tls_handle = None;
                return Err(e);
            }
        };
        self.io = Some(Io::Tls(stream));
        self.tls_handle = Some(handle);
        Ok(())
    }

    /// Polls `tls_accept` in non-blocking mode every
    /// [`EndpointConfig::tls_accept_poll_interval`] until it succeeds, the
    /// stop flag is set (`OperationAborted`), or `timeout` elapses
    /// (`Timeout`).
    pub fn tls_wait_for_accept(&mut self, ctx: &TlsContext, timeout: Duration) -> Result<()> {
        let socket = self.take_plain_socket()?;
        socket.set_nonblocking(true).map_err(|e| os_error_to_exception(&e, "set_nonblocking"))?;
        let mut handle = ctx.new_handle()?;
        let ssl = handle.take_ssl();

        let deadline = Instant::now() + timeout;
        let stream = match drive_handshake(
            ssl.accept(socket),
            Some(deadline),
            &self.stop,
            self.config.tls_accept_poll_interval,
        ) {
            Ok(stream) => stream,
            Err(e) => {
                self.tls_handle = None;
                return Err(e);
            }
        };
        self.io = Some(Io::Tls(stream));
        self.tls_handle = Some(handle);
        Ok(())
    }

    fn take_plain_socket(&mut self) -> Result<Socket> {
        match self.io.take() {
            Some(Io::Plain(s)) => Ok(s),
            other @ Some(Io::Tls(_)) => {
                self.io = other;
                Err(NetError::SslConnectionFailed("TLS already active on this endpoint".into()))
            }
            None => Err(NetError::NotConnected),
        }
    }

    /// Verifies the peer CN against `expected_name` (case-insensitive) when
    /// non-empty, then the library's verification result;
    /// `DepthZeroSelfSignedCert` is accepted iff `accept_self_signed`.
    pub fn tls_check_certificate(&self, expected_name: &str, accept_self_signed: bool) -> Result<()> {
        let Some(Io::Tls(stream)) = &self.io else { return Err(NetError::SslNotStarted) };

        if !expected_name.is_empty() {
            let cert = stream
                .ssl()
                .peer_certificate()
                .ok_or_else(|| NetError::InvalidSslCertificate("peer presented no certificate".into()))?;
            let cn = cert
                .subject_name()
                .entries_by_nid(openssl::nid::Nid::COMMONNAME)
                .next()
                .and_then(|entry| entry.data().to_string().ok())
                .unwrap_or_default();
            if !cn.eq_ignore_ascii_case(expected_name) {
                return Err(NetError::InvalidSslCertificate(format!(
                    "certificate CN '{cn}' does not match expected '{expected_name}'"
                )));
            }
        }

        let verify = stream.ssl().verify_result();
        if verify == X509VerifyResult::OK {
            return Ok(());
        }
        if verify.as_raw() == X509_V_ERR_DEPTH_ZERO_SELF_SIGNED_CERT && accept_self_signed {
            return Ok(());
        }
        Err(NetError::InvalidSslCertificate(verify.error_string().to_string()))
    }

    /// Shuts down the TLS layer and returns the handle to its issuing
    /// context. Safe to call multiple times.
    pub fn tls_stop(&mut self) -> Result<()> {
        if let Some(Io::Tls(stream)) = self.io.take() {
            let socket = stream.get_ref().try_clone().map_err(|e| os_error_to_exception(&e, "try_clone"))?;
            let _ = socket.shutdown(Shutdown::Both);
            self.io = Some(Io::Plain(socket));
        }
        self.tls_handle = None;
        Ok(())
    }
}

/// Drives an OpenSSL handshake to completion, re-entering `poll` on
/// `WANT_READ`/`WANT_WRITE`. `deadline` is checked between poll iterations;
/// `None` blocks indefinitely (bounded only by the socket's own timeouts).
fn drive_handshake(
    mut attempt: std::result::Result<SslStream<Socket>, HandshakeError<Socket>>,
    deadline: Option<Instant>,
    stop: &StopFlag,
    poll_interval: Duration,
) -> Result<SslStream<Socket>> {
    loop {
        match attempt {
            Ok(stream) => return Ok(stream),
            Err(HandshakeError::WouldBlock(mid)) => {
                if stop.should_stop() {
                    return Err(NetError::OperationAborted);
                }
                if let Some(deadline) = deadline {
                    if Instant::now() >= deadline {
                        return Err(NetError::Timeout);
                    }
                }
                let want_write = mid.error().code() == ErrorCode::WANT_WRITE;
                wait_fd(mid.get_ref().as_raw_fd(), want_write, poll_interval)?;
                attempt = mid.handshake();
            }
            Err(HandshakeError::Failure(mid)) => {
                return Err(NetError::SslConnectionFailed(mid.error().to_string()))
            }
            Err(HandshakeError::SetupFailure(e)) => return Err(NetError::SslConnectionFailed(e.to_string())),
        }
    }
}

fn wait_fd(fd: RawFd, want_write: bool, timeout: Duration) -> Result<()> {
    let events = if want_write { libc::POLLOUT } else { libc::POLLIN };
    poll_fd(fd, events, timeout).map(|_| ())
}

fn wait_fd_readable(fd: RawFd, timeout: Duration) -> Result<bool> {
    poll_fd(fd, libc::POLLIN, timeout)
}

fn wait_fd_writable(fd: RawFd, timeout: Duration) -> Result<bool> {
    poll_fd(fd, libc::POLLOUT, timeout)
}

fn poll_fd(fd: RawFd, events: libc::c_short, timeout: Duration) -> Result<bool> {
    let mut pfd = libc::pollfd { fd, events, revents: 0 };
    let timeout_ms = timeout.as_millis().min(i32::MAX as u128) as i32;
    let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
    if rc < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(os_error_to_exception(&err, "poll"));
    }
    Ok(rc > 0 && (pfd.revents & events) != 0)
}

/// Resolves a port: numeric if `service` parses as one, otherwise a lookup
/// in the services database for `proto` (`"tcp"`/`"udp"`).
fn resolve_service_port(service: &str, proto: &str) -> Option<u16> {
    if let Ok(port) = service.parse::<u16>() {
        return Some(port);
    }
    let cservice = CString::new(service).ok()?;
    let cproto = CString::new(proto).ok()?;
    unsafe {
        let ent = libc::getservbyname(cservice.as_ptr(), cproto.as_ptr());
        if ent.is_null() {
            return None;
        }
        Some(u16::from_be((*ent).s_port as u16))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    /// `listen()`'s `listen(2)` syscall happens on the accept-loop thread,
    /// which may not have run yet by the time a freshly spawned test thread
    /// gets here; retry briefly rather than racing it.
    fn connect_with_retry(client: &mut TcpEndpoint, port: u16) {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if client.connect("127.0.0.1", &port.to_string()).is_ok() {
                return;
            }
            if Instant::now() > deadline {
                panic!("could not connect to test listener on port {port}");
            }
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn connect_refused_surfaces_connection_refused() {
        let mut client = TcpEndpoint::new();
        // Port 1 is reserved and almost never listened on; if this flakes in
        // a sandboxed CI with a firewall reshaping the errno, skip the
        // assertion on the concrete variant and only require an error.
        let result = client.connect("127.0.0.1", "1");
        assert!(result.is_err());
    }

    #[test]
    fn echo_round_trip() {
        let mut server = TcpEndpoint::new();
        server.bind("127.0.0.1", 0).unwrap();
        let local_port = server.local_addr().unwrap().port().unwrap();

        let stop = server.stop_flag();
        let handle = thread::spawn(move || {
            let mut handler = |mut endpoint: TcpEndpoint, _host: &str, _port: u16| {
                let mut buf = [0u8; 5];
                endpoint.read_loop(&mut buf, Some(Duration::from_secs(2)), &crate::watch::NeverStop).unwrap();
                endpoint.write(&buf).unwrap();
                AcceptDecision::Accept
            };
            server.listen(8, Duration::from_millis(20), &mut handler).unwrap();
        });

        let mut client = TcpEndpoint::new();
        connect_with_retry(&mut client, local_port);
        client.write(b"hello").unwrap();
        let mut buf = [0u8; 5];
        client.read_loop(&mut buf, Some(Duration::from_secs(2)), &crate::watch::NeverStop).unwrap();
        assert_eq!(&buf, b"hello");

        stop.signal();
        handle.join().unwrap();
    }

    #[test]
    fn cancellable_accept_exits_promptly() {
        let mut server = TcpEndpoint::new();
        server.bind("127.0.0.1", 0).unwrap();
        let stop = server.stop_flag();

        let handle = thread::spawn(move || {
            let mut handler = |endpoint: TcpEndpoint, _: &str, _: u16| {
                drop(endpoint);
                AcceptDecision::Reject
            };
            let started = Instant::now();
            server.listen(8, Duration::from_millis(100), &mut handler).unwrap();
            started.elapsed()
        });

        thread::sleep(Duration::from_millis(500));
        stop.signal();
        let elapsed = handle.join().unwrap();
        assert!(elapsed < Duration::from_millis(1200));
    }
}
