//! Blocking UDP endpoint.
//!
//! Grounded on `examples/original_source/ppl7/src/internet/UDPSocket.cpp`.
//! Mirrors `tcp::TcpEndpoint`'s bind/timeout surface but with datagram
//! semantics: no accept loop, no TLS (spec.md §4.E).

use std::net::Shutdown;

use socket2::{Domain, Protocol, Socket, Type};

use crate::address::IpAddress;
use crate::config::EndpointConfig;
use crate::error::{os_error_to_exception, NetError, Result};
use crate::resolver::{get_host_by_name, AddressFamilyFilter};
use crate::sockaddr::SockAddress;

pub struct UdpEndpoint {
    socket: Option<Socket>,
    config: EndpointConfig,
    connected: bool,
}

impl Default for UdpEndpoint {
    fn default() -> Self {
        Self::new()
    }
}

impl UdpEndpoint {
    pub fn new() -> Self {
        Self::with_config(EndpointConfig::default())
    }

    pub fn with_config(config: EndpointConfig) -> Self {
        Self { socket: None, config, connected: false }
    }

    pub fn local_addr(&self) -> Result<SockAddress> {
        let socket = self.socket.as_ref().ok_or(NetError::NotConnected)?;
        let addr = socket.local_addr().map_err(|e| os_error_to_exception(&e, "getsockname"))?;
        let std_addr = addr.as_socket().ok_or(NetError::InvalidSocket)?;
        Ok(SockAddress::from_std(std_addr))
    }

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
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| NetError::CouldNotOpenSocket(e.to_string()))?;
        socket.set_reuse_address(true).map_err(|e| os_error_to_exception(&e, "SO_REUSEADDR"))?;
        let bind_addr = SockAddress::new(addr, port)?;
        socket.bind(bind_addr.as_socket2()).map_err(|e| NetError::CouldNotBindToInterface(e.to_string()))?;
        self.socket = Some(socket);
        Ok(())
    }

    /// Associates a default peer; subsequent `write`/`read` use `send`/`recv`
    /// without explicit addressing.
    pub fn connect(&mut self, host: &str, port: &str) -> Result<()> {
        let port_num: u16 = port
            .parse()
            .map_err(|_| NetError::IllegalArgument(format!("invalid UDP port '{port}'")))?;
        let candidates = get_host_by_name(host, AddressFamilyFilter::Unspec)?;
        let addr = candidates.into_iter().next().ok_or_else(|| NetError::HostNotFound(host.to_string()))?;
        let std_addr = addr.to_std().ok_or_else(|| NetError::InvalidIpAddress(addr.to_string()))?;
        if self.socket.is_none() {
            let domain = if std_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
            self.socket =
                Some(Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(|e| NetError::CouldNotOpenSocket(e.to_string()))?);
        }
        let peer = SockAddress::new(addr, port_num)?;
        self.socket
            .as_ref()
            .unwrap()
            .connect(peer.as_socket2())
            .map_err(|e| os_error_to_exception(&e, "connect"))?;
        self.connected = true;
        Ok(())
    }

    pub fn set_read_timeout(&mut self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.config.read_timeout = timeout;
        if let Some(socket) = &self.socket {
            socket.set_read_timeout(timeout).map_err(|e| os_error_to_exception(&e, "SO_RCVTIMEO"))?;
        }
        Ok(())
    }

    pub fn set_write_timeout(&mut self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.config.write_timeout = timeout;
        if let Some(socket) = &self.socket {
            socket.set_write_timeout(timeout).map_err(|e| os_error_to_exception(&e, "SO_SNDTIMEO"))?;
        }
        Ok(())
    }

    /// Resolves `host` per-call and sends `buf` via `sendto`.
    pub fn send_to(&self, host: &str, port: u16, buf: &[u8]) -> Result<usize> {
        let socket = self.socket.as_ref().ok_or(NetError::NotConnected)?;
        let addr = get_host_by_name(host, AddressFamilyFilter::Unspec)?
            .into_iter()
            .next()
            .ok_or_else(|| NetError::HostNotFound(host.to_string()))?;
        let dest = SockAddress::new(addr, port)?;
        socket.send_to(buf, dest.as_socket2()).map_err(|e| os_error_to_exception(&e, "sendto"))
    }

    /// Fills `buf` and returns `(bytes_read, peer_host, peer_port)`.
    pub fn recv_from(&self, buf: &mut [u8]) -> Result<(usize, String, u16)> {
        let socket = self.socket.as_ref().ok_or(NetError::NotConnected)?;
        let uninit = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast::<std::mem::MaybeUninit<u8>>(), buf.len())
        };
        let (n, peer) = socket.recv_from(uninit).map_err(|e| os_error_to_exception(&e, "recvfrom"))?;
        let std_addr = peer.as_socket().ok_or(NetError::InvalidSocket)?;
        Ok((n, std_addr.ip().to_string(), std_addr.port()))
    }

    /// Valid only after `connect()`: sends via `send`, using the
    /// previously-associated default peer.
    pub fn write(&self, buf: &[u8]) -> Result<usize> {
        if !self.connected {
            return Err(NetError::NotConnected);
        }
        let socket = self.socket.as_ref().ok_or(NetError::NotConnected)?;
        socket.send(buf).map_err(|e| os_error_to_exception(&e, "send"))
    }

    /// Valid only after `connect()`: reads via `recv` from the
    /// previously-associated default peer.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        if !self.connected {
            return Err(NetError::NotConnected);
        }
        let socket = self.socket.as_ref().ok_or(NetError::NotConnected)?;
        let uninit = unsafe {
            std::slice::from_raw_parts_mut(buf.as_mut_ptr().cast::<std::mem::MaybeUninit<u8>>(), buf.len())
        };
        socket.recv(uninit).map_err(|e| os_error_to_exception(&e, "recv"))
    }

    pub fn close(&mut self) -> Result<()> {
        if let Some(socket) = self.socket.take() {
            let _ = socket.shutdown(Shutdown::Both);
        }
        self.connected = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn send_to_recv_from_round_trip() {
        let mut server = UdpEndpoint::new();
        server.bind("127.0.0.1", 0).unwrap();
        let local_port = server.local_addr().unwrap().port().unwrap();

        let mut client = UdpEndpoint::new();
        client.bind("127.0.0.1", 0).unwrap();
        client.send_to("127.0.0.1", local_port, b"ping").unwrap();

        let mut buf = [0u8; 4];
        let (n, host, _port) = server.recv_from(&mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&buf, b"ping");
        assert_eq!(host, "127.0.0.1");
    }

    #[test]
    fn connected_write_read_round_trip() {
        let mut server = UdpEndpoint::new();
        server.bind("127.0.0.1", 0).unwrap();
        let local_port = server.local_addr().unwrap().port().unwrap();

        let mut client = UdpEndpoint::new();
        client.bind("127.0.0.1", 0).unwrap();
        client.connect("127.0.0.1", &local_port.to_string()).unwrap();
        client.write(b"hello").unwrap();

        let mut buf = [0u8; 5];
        let (n, _host, _port) = server.recv_from(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf, b"hello");
    }
}
