use super::ExtensionParseError;
use std::fmt;
use std::net;

const CONSTRUCTOR: &str = "ip";

/// An IPv4 or IPv6 address with a prefix length, i.e. a CIDR range.
///
/// A literal without a `/prefix` denotes the single address (full-length
/// prefix). Two values are equal when both the address and the prefix
/// length are equal, so `ip("10.0.0.1")` equals `ip("10.0.0.1/32")`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpAddr {
    addr: net::IpAddr,
    prefix: u8,
}

impl IpAddr {
    /// Parses the `ip("addr[/prefix]")` literal body.
    pub fn parse(literal: &str) -> Result<Self, ExtensionParseError> {
        let err = |reason: &str| ExtensionParseError::new(CONSTRUCTOR, literal, reason);

        let (addr_part, prefix_part) = match literal.split_once('/') {
            Some((a, p)) => (a, Some(p)),
            None => (literal, None),
        };

        let addr: net::IpAddr = addr_part
            .parse()
            .map_err(|_| err("not an IPv4 or IPv6 address"))?;
        let max = Self::full_prefix(&addr);

        let prefix = match prefix_part {
            None => max,
            Some(p) => {
                if p.is_empty() || p.len() > 3 || !p.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(err("prefix length must be digits"));
                }
                let p: u8 = p.parse().map_err(|_| err("prefix length out of range"))?;
                if p > max {
                    return Err(err("prefix length out of range"));
                }
                p
            }
        };

        Ok(Self { addr, prefix })
    }

    fn full_prefix(addr: &net::IpAddr) -> u8 {
        match addr {
            net::IpAddr::V4(_) => 32,
            net::IpAddr::V6(_) => 128,
        }
    }

    pub fn addr(&self) -> net::IpAddr {
        self.addr
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    pub fn is_ipv6(&self) -> bool {
        self.addr.is_ipv6()
    }

    pub fn is_loopback(&self) -> bool {
        self.addr.is_loopback()
    }

    pub fn is_multicast(&self) -> bool {
        self.addr.is_multicast()
    }

    /// True when every address of `self`'s range lies inside `other`'s
    /// range. Mixed v4/v6 operands are never in range of each other.
    pub fn is_in_range(&self, other: &Self) -> bool {
        match (self.addr, other.addr) {
            (net::IpAddr::V4(a), net::IpAddr::V4(b)) => {
                self.prefix >= other.prefix
                    && mask_v4(a, other.prefix) == mask_v4(b, other.prefix)
            }
            (net::IpAddr::V6(a), net::IpAddr::V6(b)) => {
                self.prefix >= other.prefix
                    && mask_v6(a, other.prefix) == mask_v6(b, other.prefix)
            }
            _ => false,
        }
    }
}

fn mask_v4(addr: net::Ipv4Addr, prefix: u8) -> u32 {
    let bits = u32::from(addr);
    if prefix == 0 { 0 } else { bits & (u32::MAX << (32 - prefix)) }
}

fn mask_v6(addr: net::Ipv6Addr, prefix: u8) -> u128 {
    let bits = u128::from(addr);
    if prefix == 0 { 0 } else { bits & (u128::MAX << (128 - prefix)) }
}

impl fmt::Display for IpAddr {
    /// Full-length prefixes are omitted, so single addresses print bare.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.prefix == Self::full_prefix(&self.addr) {
            write!(f, "{}", self.addr)
        } else {
            write!(f, "{}/{}", self.addr, self.prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_v4_and_v6() {
        let v4 = IpAddr::parse("192.168.0.1").unwrap();
        assert!(v4.is_ipv4() && !v4.is_ipv6());
        assert_eq!(v4.prefix(), 32);

        let v6 = IpAddr::parse("::1").unwrap();
        assert!(v6.is_ipv6());
        assert_eq!(v6.prefix(), 128);
    }

    #[test]
    fn parse_with_prefix() {
        let net = IpAddr::parse("10.0.0.0/8").unwrap();
        assert_eq!(net.prefix(), 8);
        assert_eq!(IpAddr::parse("2001:db8::/32").unwrap().prefix(), 32);
    }

    #[test]
    fn parse_rejects_malformed_literals() {
        for bad in ["", "10.0.0", "10.0.0.256", "10.0.0.1/33", "::1/129", "10.0.0.1/", "10.0.0.1/x", "banana"] {
            assert!(IpAddr::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn bare_address_equals_full_prefix_range() {
        assert_eq!(
            IpAddr::parse("10.0.0.1").unwrap(),
            IpAddr::parse("10.0.0.1/32").unwrap()
        );
    }

    #[test]
    fn loopback_and_multicast_classification() {
        assert!(IpAddr::parse("127.0.0.2").unwrap().is_loopback());
        assert!(IpAddr::parse("::1").unwrap().is_loopback());
        assert!(!IpAddr::parse("10.0.0.1").unwrap().is_loopback());
        assert!(IpAddr::parse("224.0.0.1").unwrap().is_multicast());
        assert!(IpAddr::parse("ff02::1").unwrap().is_multicast());
    }

    #[test]
    fn range_containment() {
        let host = IpAddr::parse("10.1.2.3").unwrap();
        let net = IpAddr::parse("10.0.0.0/8").unwrap();
        let other = IpAddr::parse("11.0.0.0/8").unwrap();
        assert!(host.is_in_range(&net));
        assert!(!host.is_in_range(&other));
        assert!(!net.is_in_range(&host));
        assert!(net.is_in_range(&net));

        let v6net = IpAddr::parse("2001:db8::/32").unwrap();
        assert!(IpAddr::parse("2001:db8::1").unwrap().is_in_range(&v6net));
        assert!(!host.is_in_range(&v6net));
    }

    #[test]
    fn zero_prefix_contains_everything_of_its_family() {
        let all = IpAddr::parse("0.0.0.0/0").unwrap();
        assert!(IpAddr::parse("255.255.255.255").unwrap().is_in_range(&all));
        assert!(!IpAddr::parse("::1").unwrap().is_in_range(&all));
    }

    #[test]
    fn display_parse_roundtrip() {
        for lit in ["10.0.0.1", "10.0.0.0/8", "::1", "2001:db8::/32", "0.0.0.0/0"] {
            let ip = IpAddr::parse(lit).unwrap();
            assert_eq!(IpAddr::parse(&ip.to_string()).unwrap(), ip, "roundtrip of {lit}");
        }
    }
}
