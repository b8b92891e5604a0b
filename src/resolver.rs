//! Resolver façade: forward/reverse name lookup, raw DNS record query.
//!
//! Grounded on `examples/original_source/ppl7/src/internet/resolver.cpp`.
//! `hostname`/`get_host_by_name`/`get_host_by_addr` go through the OS
//! resolver via `dns-lookup` (libc `gethostname`/`getaddrinfo`/
//! `getnameinfo`), matching the source's direct libc calls. `query` goes
//! through `trust-dns-resolver`'s blocking `Resolver`, since a raw record
//! query (NS, MX, TXT, SRV, DNSKEY, …) needs a real DNS client, not just the
//! OS name-service switch.

use std::net::IpAddr;

use trust_dns_resolver::config::{ResolverConfig, ResolverOpts};
use trust_dns_resolver::proto::rr::RecordType;
use trust_dns_resolver::Resolver as TrustResolver;

use crate::address::{Family, IpAddress};
use crate::error::{NetError, Result};

/// Which address families `get_host_by_name` should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamilyFilter {
    Unspec,
    V4,
    V6,
    All,
}

/// Supported raw-query record types, per spec.md §4.B.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsRecordType {
    A,
    Ns,
    Cname,
    Mx,
    Soa,
    Ptr,
    Txt,
    Aaaa,
    Srv,
    Ds,
    Dnskey,
    Nsec,
    Nsec3,
    Rrsig,
    Opt,
    Tsig,
    Naptr,
}

impl DnsRecordType {
    fn to_trust_dns(self) -> RecordType {
        match self {
            DnsRecordType::A => RecordType::A,
            DnsRecordType::Ns => RecordType::NS,
            DnsRecordType::Cname => RecordType::CNAME,
            DnsRecordType::Mx => RecordType::MX,
            DnsRecordType::Soa => RecordType::SOA,
            DnsRecordType::Ptr => RecordType::PTR,
            DnsRecordType::Txt => RecordType::TXT,
            DnsRecordType::Aaaa => RecordType::AAAA,
            DnsRecordType::Srv => RecordType::SRV,
            DnsRecordType::Ds => RecordType::DS,
            DnsRecordType::Dnskey => RecordType::DNSKEY,
            DnsRecordType::Nsec => RecordType::NSEC,
            DnsRecordType::Nsec3 => RecordType::NSEC3,
            DnsRecordType::Rrsig => RecordType::RRSIG,
            DnsRecordType::Opt => RecordType::OPT,
            DnsRecordType::Tsig => RecordType::TSIG,
            DnsRecordType::Naptr => RecordType::NAPTR,
        }
    }
}

/// DNS query class. Only `In` is implemented; `query()` rejects others with
/// `IllegalArgument` since `ppl7/src/internet/resolver.cpp` only ever
/// queries `ns_c_in`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DnsClass {
    In,
}

/// Returns the host's own name, or an empty string if unavailable — not
/// fatal, per spec.md §4.B.
pub fn hostname() -> String {
    dns_lookup::get_hostname().unwrap_or_default()
}

/// Forward lookup: resolves `name` to a list of addresses, filtering or
/// merging by family per spec.md §4.B's contract.
pub fn get_host_by_name(name: &str, filter: AddressFamilyFilter) -> Result<Vec<IpAddress>> {
    match filter {
        AddressFamilyFilter::Unspec => lookup_raw(name),
        AddressFamilyFilter::V4 => {
            Ok(lookup_raw(name)?.into_iter().filter(|a| a.family() == Family::V4).collect())
        }
        AddressFamilyFilter::V6 => {
            Ok(lookup_raw(name)?.into_iter().filter(|a| a.family() == Family::V6).collect())
        }
        AddressFamilyFilter::All => {
            let all = lookup_raw(name)?;
            let mut v4: Vec<IpAddress> =
                all.iter().copied().filter(|a| a.family() == Family::V4).collect();
            let v6: Vec<IpAddress> = all.into_iter().filter(|a| a.family() == Family::V6).collect();
            for addr in v6 {
                if !v4.contains(&addr) {
                    v4.push(addr);
                }
            }
            Ok(v4)
        }
    }
}

/// A "name not found"/"no data" resolver failure is empty-result, not an
/// error, per spec.md §4.B; any other failure raises `QueryFailed`
/// (the spec's "NetworkException").
fn lookup_raw(name: &str) -> Result<Vec<IpAddress>> {
    match dns_lookup::lookup_host(name) {
        Ok(addrs) => Ok(addrs.into_iter().map(IpAddress::from_std).collect()),
        Err(err) => match err.raw_os_error() {
            Some(crate::error::EAI_NONAME) | Some(crate::error::EAI_NODATA) => Ok(Vec::new()),
            Some(code) => Err(crate::error::gai_error_to_exception(code, name)),
            None => Err(NetError::QueryFailed(format!("{name}: {err}"))),
        },
    }
}

/// Reverse lookup: resolves `addr` to a hostname.
pub fn get_host_by_addr(addr: &IpAddress) -> Result<String> {
    let std_addr: IpAddr =
        addr.to_std().ok_or_else(|| NetError::InvalidIpAddress(addr.to_string()))?;
    dns_lookup::lookup_addr(&std_addr).map_err(|_| NetError::UnknownHost(addr.to_string()))
}

/// A blocking raw-DNS-query client, wrapping `trust-dns-resolver`'s
/// synchronous `Resolver` (itself a thin lock-protected wrapper over an
/// internal single-thread Tokio runtime — see spec.md §1's "strictly
/// blocking" non-goal for async I/O in the public surface; the runtime here
/// is an implementation detail of the DNS client, not exposed to callers).
pub struct DnsQueryClient {
    resolver: TrustResolver,
}

impl DnsQueryClient {
    /// Builds a client from the system's `/etc/resolv.conf` (Unix) or the
    /// platform-equivalent configuration.
    pub fn from_system_conf() -> Result<Self> {
        let resolver = TrustResolver::from_system_conf()
            .or_else(|_| TrustResolver::new(ResolverConfig::default(), ResolverOpts::default()))
            .map_err(|e| NetError::QueryFailed(e.to_string()))?;
        Ok(Self { resolver })
    }

    /// Raw DNS query returning each answer record formatted as a string,
    /// per spec.md §4.B's per-type formatting table.
    pub fn query(&self, label: &str, rtype: DnsRecordType, class: DnsClass) -> Result<Vec<String>> {
        let DnsClass::In = class;
        let lookup = match self.resolver.lookup(label, rtype.to_trust_dns()) {
            Ok(l) => l,
            Err(e) => {
                return match e.kind() {
                    trust_dns_resolver::error::ResolveErrorKind::NoRecordsFound { .. } => {
                        Ok(Vec::new())
                    }
                    _ => Err(NetError::QueryFailed(e.to_string())),
                }
            }
        };
        Ok(lookup.record_iter().filter_map(|r| r.data().map(|d| d.to_string())).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_is_not_fatal() {
        // Whatever the platform reports (possibly empty), this must not panic.
        let _ = hostname();
    }

    #[test]
    fn all_merges_v4_then_v6_deduplicated() {
        // This exercises the merge logic directly against a fabricated
        // result set rather than hitting the network in a test environment
        // that may have none.
        let v4 = IpAddress::parse("1.2.3.4").unwrap();
        let v6 = IpAddress::parse("::1").unwrap();
        let all = vec![v4, v6];
        let mut merged: Vec<IpAddress> =
            all.iter().copied().filter(|a| a.family() == Family::V4).collect();
        for addr in all.into_iter().filter(|a| a.family() == Family::V6) {
            if !merged.contains(&addr) {
                merged.push(addr);
            }
        }
        assert_eq!(merged, vec![v4, v6]);
    }
}
