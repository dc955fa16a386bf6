//! Broadcast address resolution for the active network link.
//!
//! The host platform supplies the link's addresses through [`LinkProvider`];
//! this module turns the first IPv4 address and its prefix length into the
//! subnet broadcast address used for discovery.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};

use crate::error::ResolveError;

/// One address assigned to a link, with its CIDR prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkAddress {
    pub ip: IpAddr,
    pub prefix_len: u8,
}

/// Addresses of the active network link
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkProperties {
    pub addresses: Vec<LinkAddress>,
}

impl LinkProperties {
    /// First IPv4 address on the link together with its prefix length
    pub fn ipv4(&self) -> Option<(Ipv4Addr, u8)> {
        self.addresses.iter().find_map(|a| match a.ip {
            IpAddr::V4(v4) => Some((v4, a.prefix_len)),
            IpAddr::V6(_) => None,
        })
    }
}

/// Source of the active link's properties
///
/// Returns `None` when there is no active network.
pub trait LinkProvider: Send + Sync {
    fn active_link(&self) -> Option<LinkProperties>;
}

/// A fixed, configured link
#[derive(Debug, Clone, Default)]
pub struct StaticLink {
    link: Option<LinkProperties>,
}

impl StaticLink {
    /// A link with a single IPv4 address
    pub fn new(ip: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            link: Some(LinkProperties {
                addresses: vec![LinkAddress {
                    ip: IpAddr::V4(ip),
                    prefix_len,
                }],
            }),
        }
    }

    /// A provider that reports no active network
    pub fn offline() -> Self {
        Self { link: None }
    }

    /// A provider reporting arbitrary link properties
    pub fn from_properties(link: LinkProperties) -> Self {
        Self { link: Some(link) }
    }
}

impl LinkProvider for StaticLink {
    fn active_link(&self) -> Option<LinkProperties> {
        self.link.clone()
    }
}

/// The host's outbound interface
///
/// The local address is the one the OS picks for an outbound UDP socket (no
/// packets are sent). The prefix length is read from the netmask of the
/// interface that carries that address, unless overridden.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostLink {
    address: Option<Ipv4Addr>,
    prefix_override: Option<u8>,
}

impl HostLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this local address instead of the outbound one
    pub fn with_address(mut self, ip: Ipv4Addr) -> Self {
        self.address = Some(ip);
        self
    }

    /// Report `prefix_len` instead of the interface's netmask
    pub fn with_prefix_len(mut self, prefix_len: u8) -> Self {
        self.prefix_override = Some(prefix_len);
        self
    }

    fn detect_local_ip() -> Option<Ipv4Addr> {
        let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
        socket.connect("8.8.8.8:80").ok()?;
        match socket.local_addr().ok()?.ip() {
            IpAddr::V4(ip) => Some(ip),
            IpAddr::V6(_) => None,
        }
    }
}

impl LinkProvider for HostLink {
    fn active_link(&self) -> Option<LinkProperties> {
        let ip = match self.address {
            Some(ip) => ip,
            None => Self::detect_local_ip()?,
        };

        let Some(prefix_len) = self.prefix_override.or_else(|| interface_prefix_len(ip)) else {
            tracing::warn!(ip = %ip, "No interface netmask found for local address");
            return Some(LinkProperties::default());
        };

        Some(LinkProperties {
            addresses: vec![LinkAddress {
                ip: IpAddr::V4(ip),
                prefix_len,
            }],
        })
    }
}

/// Prefix length of the host interface address `ip`, from its netmask
pub fn interface_prefix_len(ip: Ipv4Addr) -> Option<u8> {
    let interfaces = match NetworkInterface::show() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::warn!(error = %e, "Unable to list network interfaces");
            return None;
        }
    };

    interfaces
        .iter()
        .flat_map(|iface| iface.addr.iter())
        .find_map(|addr| match addr {
            Addr::V4(v4) if v4.ip == ip => v4.netmask.map(|mask| u32::from(mask).count_ones() as u8),
            _ => None,
        })
}

/// Subnet mask with the high-order `prefix_len` bits set
pub fn prefix_to_mask(prefix_len: u8) -> Result<[u8; 4], ResolveError> {
    if prefix_len > 32 {
        return Err(ResolveError::AddressConstruction(format!(
            "prefix length {} exceeds 32",
            prefix_len
        )));
    }

    let mut mask = [0u8; 4];
    for bit in 0..prefix_len as usize {
        mask[bit / 8] |= 1 << (7 - (bit % 8));
    }
    Ok(mask)
}

/// Broadcast address of `ip`'s subnet: `ip | !mask`, byte by byte
pub fn broadcast_address(ip: Ipv4Addr, prefix_len: u8) -> Result<Ipv4Addr, ResolveError> {
    let mask = prefix_to_mask(prefix_len)?;
    let octets = ip.octets();

    let mut broadcast = [0u8; 4];
    for i in 0..4 {
        broadcast[i] = octets[i] | !mask[i];
    }
    Ok(Ipv4Addr::from(broadcast))
}

/// Resolve the broadcast address of the provider's active link
pub fn resolve_broadcast(provider: &dyn LinkProvider) -> Result<Ipv4Addr, ResolveError> {
    let link = provider.active_link().ok_or(ResolveError::NoNetwork)?;
    let (ip, prefix_len) = link.ipv4().ok_or(ResolveError::NoAddress)?;
    broadcast_address(ip, prefix_len)
}

/// Like [`resolve_broadcast`], but reports failure as `None`
///
/// Discovery cannot proceed without an address; callers fall back to
/// adding devices by address.
pub fn broadcast_or_none(provider: &dyn LinkProvider) -> Option<Ipv4Addr> {
    match resolve_broadcast(provider) {
        Ok(addr) => {
            tracing::debug!(broadcast = %addr, "Resolved broadcast address");
            Some(addr)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Unable to resolve broadcast address");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[rstest]
    #[case("192.168.1.42", 24, "192.168.1.255")]
    #[case("192.168.1.42", 0, "255.255.255.255")]
    #[case("192.168.1.42", 32, "192.168.1.42")]
    #[case("10.1.2.3", 8, "10.255.255.255")]
    #[case("172.16.5.9", 20, "172.16.15.255")]
    #[case("192.168.7.130", 25, "192.168.7.255")]
    fn test_broadcast_address(#[case] ip: &str, #[case] prefix: u8, #[case] expected: &str) {
        let ip: Ipv4Addr = ip.parse().unwrap();
        let expected: Ipv4Addr = expected.parse().unwrap();
        assert_eq!(broadcast_address(ip, prefix).unwrap(), expected);
    }

    #[test]
    fn test_prefix_to_mask() {
        assert_eq!(prefix_to_mask(0).unwrap(), [0, 0, 0, 0]);
        assert_eq!(prefix_to_mask(24).unwrap(), [255, 255, 255, 0]);
        assert_eq!(prefix_to_mask(21).unwrap(), [255, 255, 248, 0]);
        assert_eq!(prefix_to_mask(32).unwrap(), [255, 255, 255, 255]);
    }

    #[test]
    fn test_invalid_prefix() {
        let ip: Ipv4Addr = "192.168.1.42".parse().unwrap();
        assert!(matches!(
            broadcast_address(ip, 33),
            Err(ResolveError::AddressConstruction(_))
        ));
    }

    #[test]
    fn test_resolve_no_network() {
        assert_eq!(
            resolve_broadcast(&StaticLink::offline()),
            Err(ResolveError::NoNetwork)
        );
        assert_eq!(broadcast_or_none(&StaticLink::offline()), None);
    }

    #[test]
    fn test_resolve_no_ipv4_address() {
        let link = LinkProperties {
            addresses: vec![LinkAddress {
                ip: "fe80::1".parse().unwrap(),
                prefix_len: 64,
            }],
        };
        assert_eq!(
            resolve_broadcast(&StaticLink::from_properties(link)),
            Err(ResolveError::NoAddress)
        );
    }

    #[test]
    fn test_resolve_skips_ipv6_addresses() {
        let link = LinkProperties {
            addresses: vec![
                LinkAddress {
                    ip: "fe80::1".parse().unwrap(),
                    prefix_len: 64,
                },
                LinkAddress {
                    ip: "192.168.1.42".parse().unwrap(),
                    prefix_len: 24,
                },
            ],
        };
        assert_eq!(
            resolve_broadcast(&StaticLink::from_properties(link)),
            Ok("192.168.1.255".parse().unwrap())
        );
    }

    #[test]
    fn test_host_link_reads_loopback_prefix() {
        let link = HostLink::new().with_address(Ipv4Addr::LOCALHOST);
        assert_eq!(
            link.active_link().and_then(|l| l.ipv4()),
            Some((Ipv4Addr::LOCALHOST, 8))
        );
        assert_eq!(resolve_broadcast(&link), Ok(Ipv4Addr::new(127, 255, 255, 255)));
    }

    #[test]
    fn test_host_link_prefix_override() {
        let link = HostLink::new()
            .with_address(Ipv4Addr::LOCALHOST)
            .with_prefix_len(16);
        assert_eq!(resolve_broadcast(&link), Ok(Ipv4Addr::new(127, 0, 255, 255)));
    }

    #[test]
    fn test_host_link_unassigned_address() {
        // TEST-NET-1, never assigned to a host interface
        let link = HostLink::new().with_address(Ipv4Addr::new(192, 0, 2, 77));
        assert_eq!(resolve_broadcast(&link), Err(ResolveError::NoAddress));
    }

    proptest! {
        #[test]
        fn test_broadcast_matches_mask_formula(raw in any::<u32>(), prefix in 0u8..=32) {
            let ip = Ipv4Addr::from(raw);
            let mask: u32 = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix as u32) };
            let expected = Ipv4Addr::from(raw | !mask);
            prop_assert_eq!(broadcast_address(ip, prefix).unwrap(), expected);
        }
    }
}
