//! Address model: `IpAddress`, `IpNetwork`.
//!
//! Grounded on `examples/original_source/ppl7/src/internet/ipaddress.cpp`
//! and `ipnetwork.cpp`, reworked as owned value types with the stack
//! crate's (`core.rs`) `Display`/`FromStr`/`Default` conventions.

use std::cmp::Ordering;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::{NetError, Result};

/// Address family tag. `Unknown` exists only as the value of a
/// default-constructed [`IpAddress`]; it cannot be formatted, masked, or
/// compared except for equality against another `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    Unknown,
    V4,
    V6,
}

/// A tagged IPv4 or IPv6 address.
///
/// Internally a 16-byte buffer is always carried; for `V4` only the first 4
/// bytes are meaningful. This mirrors the source's fixed-size
/// `sockaddr`-adjacent representation while giving us a single type for
/// both families.
#[derive(Debug, Clone, Copy, Eq)]
pub struct IpAddress {
    family: Family,
    bytes: [u8; 16],
}

impl Default for IpAddress {
    fn default() -> Self {
        Self { family: Family::Unknown, bytes: [0; 16] }
    }
}

impl IpAddress {
    /// The all-`Unknown` address; cannot be serialized or masked.
    pub const fn unknown() -> Self {
        Self { family: Family::Unknown, bytes: [0; 16] }
    }

    pub fn v4(a: u8, b: u8, c: u8, d: u8) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&[a, b, c, d]);
        Self { family: Family::V4, bytes }
    }

    pub fn v6(octets: [u8; 16]) -> Self {
        Self { family: Family::V6, bytes: octets }
    }

    /// Parses a textual address. Presence of `:` selects IPv6 parsing,
    /// otherwise IPv4 — per spec.md §4.A.
    pub fn parse(s: &str) -> Result<Self> {
        if s.contains(':') {
            let addr: Ipv6Addr =
                s.parse().map_err(|_| NetError::InvalidIpAddress(s.to_string()))?;
            Ok(Self::v6(addr.octets()))
        } else {
            let addr: Ipv4Addr =
                s.parse().map_err(|_| NetError::InvalidIpAddress(s.to_string()))?;
            Ok(Self::from_raw_v4(addr.octets()))
        }
    }

    fn from_raw_v4(octets: [u8; 4]) -> Self {
        let mut bytes = [0u8; 16];
        bytes[..4].copy_from_slice(&octets);
        Self { family: Family::V4, bytes }
    }

    /// Builds an address from a family tag and raw bytes; `bytes.len()` must
    /// be `4` for V4 or `16` for V6.
    pub fn from_raw(family: Family, bytes: &[u8]) -> Result<Self> {
        match family {
            Family::V4 if bytes.len() == 4 => {
                let mut arr = [0u8; 4];
                arr.copy_from_slice(bytes);
                Ok(Self::from_raw_v4(arr))
            }
            Family::V6 if bytes.len() == 16 => {
                let mut arr = [0u8; 16];
                arr.copy_from_slice(bytes);
                Ok(Self::v6(arr))
            }
            Family::Unknown => Ok(Self::unknown()),
            _ => Err(NetError::IllegalArgument(format!(
                "from_raw: {} bytes is not valid for {:?}",
                bytes.len(),
                family
            ))),
        }
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn is_unknown(&self) -> bool {
        self.family == Family::Unknown
    }

    /// The address's significant bytes: 4 for V4, 16 for V6, empty for
    /// `Unknown`.
    pub fn octets(&self) -> &[u8] {
        match self.family {
            Family::Unknown => &[],
            Family::V4 => &self.bytes[..4],
            Family::V6 => &self.bytes[..16],
        }
    }

    fn family_bits(&self) -> Result<u8> {
        match self.family {
            Family::V4 => Ok(32),
            Family::V6 => Ok(128),
            Family::Unknown => Err(NetError::IllegalArgument(
                "cannot operate on an Unknown address".to_string(),
            )),
        }
    }

    /// Returns a new address whose low `family_bits - prefix_len` bits are
    /// zeroed.
    pub fn mask(&self, prefix_len: u8) -> Result<Self> {
        let bits = self.family_bits()?;
        if prefix_len > bits {
            return Err(NetError::InvalidNetmaskOrPrefixlen(format!(
                "prefix length {prefix_len} out of range for {bits}-bit family"
            )));
        }
        let mut out = *self;
        let n_bytes = (bits / 8) as usize;
        let mut remaining = prefix_len as usize;
        for byte in out.bytes[..n_bytes].iter_mut() {
            if remaining >= 8 {
                remaining -= 8;
            } else {
                let keep_mask: u8 = if remaining == 0 { 0 } else { !0u8 << (8 - remaining) };
                *byte &= keep_mask;
                remaining = 0;
            }
        }
        Ok(out)
    }

    /// An address whose significant bits are all 1s, used by the mask
    /// invariant test in spec.md §8.
    pub fn all_ones(family: Family) -> Self {
        match family {
            Family::V4 => Self::v4(255, 255, 255, 255),
            Family::V6 => Self::v6([0xff; 16]),
            Family::Unknown => Self::unknown(),
        }
    }

    pub fn is_loopback(&self) -> bool {
        match self.family {
            Family::V4 => self.bytes[0] == 127,
            Family::V6 => self.bytes == Ipv6Addr::LOCALHOST.octets(),
            Family::Unknown => false,
        }
    }

    pub fn is_link_local(&self) -> bool {
        match self.family {
            Family::V4 => self.bytes[0] == 169 && self.bytes[1] == 254,
            Family::V6 => self.bytes[0] == 0xfe && (self.bytes[1] & 0xc0) == 0x80,
            Family::Unknown => false,
        }
    }

    pub fn is_multicast(&self) -> bool {
        match self.family {
            Family::V4 => (224..=239).contains(&self.bytes[0]),
            Family::V6 => self.bytes[0] == 0xff,
            Family::Unknown => false,
        }
    }

    pub fn is_private(&self) -> bool {
        match self.family {
            Family::V4 => {
                let [a, b, ..] = self.bytes;
                a == 10 || (a == 172 && (16..=31).contains(&b)) || (a == 192 && b == 168)
            }
            Family::V6 => self.bytes[0] & 0xfe == 0xfc,
            Family::Unknown => false,
        }
    }

    pub fn to_std(&self) -> Option<std::net::IpAddr> {
        match self.family {
            Family::V4 => {
                let mut a = [0u8; 4];
                a.copy_from_slice(&self.bytes[..4]);
                Some(std::net::IpAddr::V4(Ipv4Addr::from(a)))
            }
            Family::V6 => Some(std::net::IpAddr::V6(Ipv6Addr::from(self.bytes))),
            Family::Unknown => None,
        }
    }

    pub fn from_std(addr: std::net::IpAddr) -> Self {
        match addr {
            std::net::IpAddr::V4(v4) => Self::from_raw_v4(v4.octets()),
            std::net::IpAddr::V6(v6) => Self::v6(v6.octets()),
        }
    }
}

impl PartialEq for IpAddress {
    fn eq(&self, other: &Self) -> bool {
        match (self.family, other.family) {
            (Family::Unknown, Family::Unknown) => true,
            (Family::Unknown, _) | (_, Family::Unknown) => false,
            (a, b) => a == b && self.octets() == other.octets(),
        }
    }
}

impl std::hash::Hash for IpAddress {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self.family {
            Family::Unknown => Family::Unknown.hash(state),
            family => {
                family.hash(state);
                self.octets().hash(state);
            }
        }
    }
}

impl PartialOrd for IpAddress {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IpAddress {
    /// Orders by family first (`V4 < V6`), then lexicographically over the
    /// address bytes. `Unknown` sorts before everything (arbitrary but
    /// total, since `Unknown` addresses are never expected to participate
    /// in ordered collections).
    fn cmp(&self, other: &Self) -> Ordering {
        fn family_rank(f: Family) -> u8 {
            match f {
                Family::Unknown => 0,
                Family::V4 => 1,
                Family::V6 => 2,
            }
        }
        family_rank(self.family)
            .cmp(&family_rank(other.family))
            .then_with(|| self.octets().cmp(other.octets()))
    }
}

impl fmt::Display for IpAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_std() {
            Some(addr) => write!(f, "{addr}"),
            None => write!(f, ""),
        }
    }
}

impl FromStr for IpAddress {
    type Err = NetError;
    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

/// The byte patterns a dotted/colon netmask's non-`0xff` byte may take,
/// per spec.md §4.A — a contiguous run of 1-bits.
const NETMASK_PARTIAL_BYTES: [u8; 8] =
    [0xfe, 0xfc, 0xf8, 0xf0, 0xe0, 0xc0, 0x80, 0x00];

/// Validates a dotted/colon netmask's contiguous-1s-then-0s bit pattern and
/// returns its prefix length.
fn mask_from_netmask(addr: &IpAddress) -> Result<u8> {
    let octets = addr.octets();
    let mut prefix = 0u8;
    let mut seen_partial = false;
    for &byte in octets {
        if seen_partial {
            if byte != 0 {
                return Err(NetError::InvalidNetmaskOrPrefixlen(addr.to_string()));
            }
            continue;
        }
        if byte == 0xff {
            prefix += 8;
            continue;
        }
        if let Some(ones) = NETMASK_PARTIAL_BYTES.iter().position(|&b| b == byte) {
            prefix += 7 - ones as u8;
            seen_partial = true;
        } else {
            return Err(NetError::InvalidNetmaskOrPrefixlen(addr.to_string()));
        }
    }
    Ok(prefix)
}

/// A `(base, prefix_len)` CIDR network. `base` is always canonicalized by
/// masking with `prefix_len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpNetwork {
    base: IpAddress,
    prefix_len: u8,
}

impl IpNetwork {
    pub fn new(base: IpAddress, prefix_len: u8) -> Result<Self> {
        let base = base.mask(prefix_len)?;
        Ok(Self { base, prefix_len })
    }

    /// Parses `"addr/mask"` where `mask` is either a decimal prefix length
    /// or a dotted/colon netmask.
    pub fn parse(s: &str) -> Result<Self> {
        let (addr_part, mask_part) = s
            .split_once('/')
            .ok_or_else(|| NetError::InvalidNetworkAddress(s.to_string()))?;
        let base = IpAddress::parse(addr_part)?;

        let prefix_len = if let Ok(n) = mask_part.parse::<u8>() {
            n
        } else {
            let netmask = IpAddress::parse(mask_part)
                .map_err(|_| NetError::InvalidNetmaskOrPrefixlen(mask_part.to_string()))?;
            mask_from_netmask(&netmask)?
        };

        Self::new(base, prefix_len)
    }

    pub fn base(&self) -> IpAddress {
        self.base
    }

    pub fn prefix_len(&self) -> u8 {
        self.prefix_len
    }

    pub fn first(&self) -> IpAddress {
        self.base
    }

    /// `base | ~netmask` — the last address in the network.
    pub fn last(&self) -> IpAddress {
        let bits = match self.base.family() {
            Family::V4 => 32u8,
            Family::V6 => 128u8,
            Family::Unknown => return self.base,
        };
        let n_bytes = (bits / 8) as usize;
        let mut bytes = [0u8; 16];
        bytes[..n_bytes].copy_from_slice(&self.base.octets()[..n_bytes]);

        let mut remaining = self.prefix_len as usize;
        for byte in bytes[..n_bytes].iter_mut() {
            if remaining >= 8 {
                remaining -= 8;
            } else {
                let host_mask: u8 = if remaining == 0 { 0xff } else { !(!0u8 << (8 - remaining)) };
                *byte |= host_mask;
                remaining = 0;
            }
        }
        IpAddress::from_raw(self.base.family(), &bytes[..n_bytes]).unwrap()
    }

    /// True iff `first <= addr <= last`.
    pub fn contains(&self, addr: &IpAddress) -> bool {
        self.first() <= *addr && *addr <= self.last()
    }
}

impl fmt::Display for IpNetwork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.prefix_len)
    }
}

impl PartialOrd for IpNetwork {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IpNetwork {
    /// Orders by `base`, with a longer (more specific) prefix sorting first
    /// on ties.
    fn cmp(&self, other: &Self) -> Ordering {
        self.base.cmp(&other.base).then_with(|| other.prefix_len.cmp(&self.prefix_len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_parse_and_format() {
        let addr = IpAddress::parse("192.168.1.10").unwrap();
        assert_eq!(addr.to_string(), "192.168.1.10");
        assert_eq!(addr.family(), Family::V4);
    }

    #[test]
    fn ipv6_canonicalization() {
        let addr = IpAddress::parse("2001:0db8:0000:0000:0000:0000:0000:0001").unwrap();
        assert_eq!(addr.to_string(), "2001:db8::1");
    }

    #[test]
    fn parse_round_trip() {
        for s in ["10.0.0.1", "255.255.255.255", "::1", "2001:db8::1", "fe80::1"] {
            let a = IpAddress::parse(s).unwrap();
            let b = IpAddress::parse(&a.to_string()).unwrap();
            assert_eq!(a, b);
        }
    }

    #[test]
    fn cidr_containment() {
        let net = IpNetwork::parse("10.0.0.0/24").unwrap();
        assert!(net.contains(&IpAddress::parse("10.0.0.255").unwrap()));
        assert!(!net.contains(&IpAddress::parse("10.0.1.0").unwrap()));
        assert_eq!(net.first(), IpAddress::parse("10.0.0.0").unwrap());
        assert_eq!(net.last(), IpAddress::parse("10.0.0.255").unwrap());
    }

    #[test]
    fn cidr_canonicalizes_base() {
        let net = IpNetwork::parse("192.168.1.5/24").unwrap();
        assert_eq!(net.base(), IpAddress::parse("192.168.1.0").unwrap());
    }

    #[test]
    fn netmask_form_cidr() {
        assert_eq!(IpNetwork::parse("10.0.0.0/255.255.255.128").unwrap().prefix_len(), 25);
    }

    #[test]
    fn netmask_validation_table() {
        let cases: &[(&str, Option<u8>)] = &[
            ("255.255.255.0", Some(24)),
            ("255.255.254.0", Some(23)),
            ("255.255.255.192", Some(26)),
            ("255.0.255.0", None),
            ("255.255.255.1", None),
        ];
        for (netmask, expected) in cases {
            let addr = IpAddress::parse(netmask).unwrap();
            let got = mask_from_netmask(&addr).ok();
            assert_eq!(got, *expected, "netmask {netmask}");
        }
    }

    #[test]
    fn mask_self_is_idempotent() {
        let net = IpNetwork::parse("172.16.0.0/20").unwrap();
        assert_eq!(net.first().mask(net.prefix_len()).unwrap(), net.first());
    }

    #[test]
    fn all_ones_mask_leading_bits() {
        for p in 0..=32u8 {
            let masked = IpAddress::all_ones(Family::V4).mask(p).unwrap();
            let leading = masked.octets().iter().map(|b| b.count_ones()).sum::<u32>();
            assert_eq!(leading, p as u32);
        }
    }

    #[test]
    fn unknown_address_equality_only() {
        let a = IpAddress::unknown();
        let b = IpAddress::unknown();
        assert_eq!(a, b);
        assert!(a.mask(0).is_err());
    }

    #[test]
    fn ordering_v4_before_v6() {
        let v4 = IpAddress::parse("255.255.255.255").unwrap();
        let v6 = IpAddress::parse("::1").unwrap();
        assert!(v4 < v6);
    }
}
