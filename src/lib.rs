//! Blocking TCP/UDP networking core: addresses and CIDR networks, name
//! resolution, TLS-wrapped sockets, and a length-prefixed framed message
//! protocol.
//!
//! # Quick start
//!
//! ```no_run
//! use netcore::prelude::*;
//!
//! let mut client = TcpEndpoint::new();
//! client.connect("example.com", "80")?;
//! client.write(b"GET / HTTP/1.0\r\n\r\n")?;
//! # Ok::<(), NetError>(())
//! ```

pub mod address;
pub mod codec;
pub mod config;
pub mod error;
pub mod message;
pub mod prelude;
pub mod resolver;
pub mod sockaddr;
pub mod tcp;
pub mod tls;
pub mod udp;
pub mod watch;

pub use error::{NetError, Result};
