//! `SockAddress`: an opaque socket-address buffer, built on `socket2::SockAddr`.
//!
//! Grounded on `examples/original_source/ppl7/src/internet/sockaddr.cpp`,
//! which hand-rolls the `sockaddr_in`/`sockaddr_in6` byte layout; this crate
//! reuses the `socket2` crate's `SockAddr` (already a teacher dependency)
//! instead of re-deriving that layout.

use std::net::SocketAddr as StdSocketAddr;

use socket2::SockAddr;

use crate::address::IpAddress;
use crate::error::{NetError, Result};

/// A socket address: an `IpAddress` plus a port, backed by the OS-sized
/// `sockaddr_in`/`sockaddr_in6` buffer.
#[derive(Debug, Clone)]
pub struct SockAddress {
    inner: SockAddr,
}

impl SockAddress {
    pub fn new(ip: IpAddress, port: u16) -> Result<Self> {
        let std_ip = ip
            .to_std()
            .ok_or_else(|| NetError::InvalidIpAddress("Unknown address family".to_string()))?;
        Ok(Self { inner: SockAddr::from(StdSocketAddr::new(std_ip, port)) })
    }

    pub fn from_std(addr: StdSocketAddr) -> Self {
        Self { inner: SockAddr::from(addr) }
    }

    pub fn as_socket2(&self) -> &SockAddr {
        &self.inner
    }

    /// Round-trips back to an [`IpAddress`] by reading the family field and
    /// unmarshaling accordingly.
    pub fn ip(&self) -> Result<IpAddress> {
        match self.inner.as_socket() {
            Some(std) => Ok(IpAddress::from_std(std.ip())),
            None => Err(NetError::InvalidIpAddress("non-inet sockaddr".to_string())),
        }
    }

    pub fn port(&self) -> Result<u16> {
        match self.inner.as_socket() {
            Some(std) => Ok(std.port()),
            None => Err(NetError::InvalidIpAddress("non-inet sockaddr".to_string())),
        }
    }

    pub fn to_std(&self) -> Option<StdSocketAddr> {
        self.inner.as_socket()
    }
}

impl From<StdSocketAddr> for SockAddress {
    fn from(addr: StdSocketAddr) -> Self {
        Self::from_std(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_v4() {
        let ip = IpAddress::parse("127.0.0.1").unwrap();
        let sock = SockAddress::new(ip, 8080).unwrap();
        assert_eq!(sock.ip().unwrap(), ip);
        assert_eq!(sock.port().unwrap(), 8080);
    }

    #[test]
    fn round_trip_v6() {
        let ip = IpAddress::parse("::1").unwrap();
        let sock = SockAddress::new(ip, 443).unwrap();
        assert_eq!(sock.ip().unwrap(), ip);
        assert_eq!(sock.port().unwrap(), 443);
    }
}
