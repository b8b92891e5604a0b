//! Commonly used types, re-exported for `use netcore::prelude::*;`.

pub use crate::address::{Family, IpAddress, IpNetwork};
pub use crate::codec::{ace_to_idn, idn_to_ace, to_quoted_printable};
pub use crate::config::EndpointConfig;
pub use crate::error::{NetError, Result};
pub use crate::message::{send_message, wait_message, PayloadType, SendOptions, SocketMessage};
pub use crate::resolver::{get_host_by_addr, get_host_by_name, hostname, AddressFamilyFilter, DnsQueryClient, DnsRecordType};
pub use crate::sockaddr::SockAddress;
pub use crate::tcp::{AcceptDecision, AcceptHandler, TcpEndpoint};
pub use crate::tls::{TlsContext, TlsMethod};
pub use crate::udp::UdpEndpoint;
pub use crate::watch::{NeverStop, StopFlag, Watch};
