//! CATNIP (Common Access Token Network IP) claim: IP address, CIDR prefix and ASN restrictions.
//!
//! Addresses and prefixes are carried as CBOR tag 52 (IPv4) or 54 (IPv6)
//! around either the raw address bytes or a `[prefix-length, address-bytes]`
//! pair. Bare integers are Autonomous System Numbers.

use crate::constants::cbor_tags;
use crate::error::Error;
use crate::header::CborValue;
use ipnetwork::IpNetwork;
use serde_json::Value;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// One network restriction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkEntry {
    /// Autonomous System Number
    Asn(u32),
    /// Single address
    Address(IpAddr),
    /// CIDR prefix
    Prefix(IpNetwork),
}

impl NetworkEntry {
    /// Classify a textual entry: bare decimal ASN, IP address or CIDR prefix
    pub fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        if !input.contains('.') && !input.contains(':') {
            if let Ok(asn) = input.parse::<u64>() {
                return u32::try_from(asn).ok().map(NetworkEntry::Asn);
            }
        }
        if let Ok(addr) = input.parse::<IpAddr>() {
            return Some(NetworkEntry::Address(addr));
        }
        if input.contains('/') {
            if let Ok(network) = input.parse::<IpNetwork>() {
                return Some(NetworkEntry::Prefix(network));
            }
        }
        None
    }

    fn to_cbor(&self) -> CborValue {
        match self {
            NetworkEntry::Asn(asn) => CborValue::Integer(*asn as i64),
            NetworkEntry::Address(addr) => {
                let (tag, bytes) = address_bytes(addr);
                CborValue::Tag(tag, Box::new(CborValue::Bytes(bytes)))
            }
            NetworkEntry::Prefix(network) => {
                let (tag, bytes) = address_bytes(&network.ip());
                CborValue::Tag(
                    tag,
                    Box::new(CborValue::Array(vec![
                        CborValue::Integer(network.prefix() as i64),
                        CborValue::Bytes(bytes),
                    ])),
                )
            }
        }
    }

    fn from_cbor(value: &CborValue) -> Option<Self> {
        match value {
            CborValue::Integer(asn) => u32::try_from(*asn).ok().map(NetworkEntry::Asn),
            CborValue::Tag(tag, inner) if *tag == cbor_tags::IPV4 || *tag == cbor_tags::IPV6 => {
                let width = if *tag == cbor_tags::IPV4 { 4 } else { 16 };
                match inner.as_ref() {
                    CborValue::Bytes(bytes) if bytes.len() == width => {
                        address_from_bytes(bytes, width).map(NetworkEntry::Address)
                    }
                    CborValue::Array(pair) if pair.len() == 2 => {
                        let prefix = u8::try_from(pair[0].as_i64()?).ok()?;
                        let addr = address_from_bytes(pair[1].as_bytes()?, width)?;
                        IpNetwork::new(addr, prefix).ok().map(NetworkEntry::Prefix)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

impl fmt::Display for NetworkEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkEntry::Asn(asn) => write!(f, "{asn}"),
            NetworkEntry::Address(addr) => write!(f, "{addr}"),
            NetworkEntry::Prefix(network) => write!(f, "{}/{}", network.ip(), network.prefix()),
        }
    }
}

fn address_bytes(addr: &IpAddr) -> (u64, Vec<u8>) {
    match addr {
        IpAddr::V4(v4) => (cbor_tags::IPV4, v4.octets().to_vec()),
        IpAddr::V6(v6) => (cbor_tags::IPV6, v6.octets().to_vec()),
    }
}

/// Accepts full-width or trimmed (trailing zero bytes removed) addresses
fn address_from_bytes(bytes: &[u8], width: usize) -> Option<IpAddr> {
    if bytes.len() > width {
        return None;
    }
    let mut padded = [0u8; 16];
    padded[..bytes.len()].copy_from_slice(bytes);
    if width == 4 {
        Some(IpAddr::V4(Ipv4Addr::new(
            padded[0], padded[1], padded[2], padded[3],
        )))
    } else {
        Some(IpAddr::V6(Ipv6Addr::from(padded)))
    }
}

/// A network matcher: ordered list of ASNs, addresses and prefixes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommonAccessTokenNetworkIp {
    entries: Vec<NetworkEntry>,
}

impl CommonAccessTokenNetworkIp {
    /// Creates an empty matcher
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from strings and numbers; entries that are neither a valid ASN,
    /// address nor CIDR prefix are dropped
    pub fn from_list(items: &[Value]) -> Self {
        let entries = items
            .iter()
            .filter_map(|item| {
                let entry = match item {
                    Value::String(s) => NetworkEntry::parse(s),
                    Value::Number(n) => n
                        .as_u64()
                        .and_then(|asn| u32::try_from(asn).ok())
                        .map(NetworkEntry::Asn),
                    _ => None,
                };
                if entry.is_none() {
                    debug!(entry = %item, "dropping invalid catnip entry");
                }
                entry
            })
            .collect();
        Self { entries }
    }

    /// Build from strings
    pub fn from_strs<S: AsRef<str>>(items: &[S]) -> Self {
        let values: Vec<Value> = items
            .iter()
            .map(|s| Value::String(s.as_ref().to_string()))
            .collect();
        Self::from_list(&values)
    }

    /// Build from the wire form; undecodable entries are dropped
    pub fn from_array(array: &CborValue) -> Result<Self, Error> {
        let items = match array {
            CborValue::Array(items) => items,
            other => {
                return Err(Error::InvalidClaimValue(format!(
                    "catnip must be an array, got {}",
                    other.type_name()
                )))
            }
        };
        let entries = items
            .iter()
            .filter_map(|item| {
                let entry = NetworkEntry::from_cbor(item);
                if entry.is_none() {
                    debug!(entry = ?item, "dropping undecodable catnip entry");
                }
                entry
            })
            .collect();
        Ok(Self { entries })
    }

    /// Canonical list form: ASNs as numbers, addresses and prefixes as strings
    pub fn to_list(&self) -> Vec<Value> {
        self.entries
            .iter()
            .map(|entry| match entry {
                NetworkEntry::Asn(asn) => Value::from(*asn),
                other => Value::String(other.to_string()),
            })
            .collect()
    }

    /// Wire form
    pub fn payload(&self) -> CborValue {
        CborValue::Array(self.entries.iter().map(NetworkEntry::to_cbor).collect())
    }

    /// Stored entries in order
    pub fn entries(&self) -> &[NetworkEntry] {
        &self.entries
    }

    /// Whether `candidate` equals a stored address or falls within a stored
    /// prefix of the same family. Unparseable candidates never match.
    pub fn ip_match(&self, candidate: &str) -> bool {
        let ip = match candidate.trim().parse::<IpAddr>() {
            Ok(ip) => ip,
            Err(_) => return false,
        };
        self.entries.iter().any(|entry| match entry {
            NetworkEntry::Address(addr) => *addr == ip,
            NetworkEntry::Prefix(network) => network.contains(ip),
            NetworkEntry::Asn(_) => false,
        })
    }

    /// Whether `candidate` equals a stored ASN
    pub fn asn_match(&self, candidate: u64) -> bool {
        self.entries
            .iter()
            .any(|entry| matches!(entry, NetworkEntry::Asn(asn) if u64::from(*asn) == candidate))
    }
}
