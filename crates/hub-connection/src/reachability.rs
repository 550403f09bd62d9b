//! Local network reachability.

use std::net::IpAddr;

/// Answers whether the hub could be reached directly on the LAN.
pub trait Reachability: Send + Sync {
    fn is_reachable_on_lan(&self) -> bool;
}

/// Reports the LAN reachable when a non-loopback, non-link-local IPv4
/// interface is up.
#[derive(Debug, Default, Clone, Copy)]
pub struct InterfaceReachability;

impl Reachability for InterfaceReachability {
    fn is_reachable_on_lan(&self) -> bool {
        if_addrs::get_if_addrs()
            .unwrap_or_default()
            .into_iter()
            .any(|iface| !iface.is_loopback() && is_lan_address(iface.ip()))
    }
}

fn is_lan_address(ip: IpAddr) -> bool {
    match ip {
        // Skip link-local (169.254.x.x)
        IpAddr::V4(ip) => !ip.is_loopback() && !ip.is_link_local() && !ip.is_unspecified(),
        IpAddr::V6(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn lan_addresses() {
        assert!(is_lan_address(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 20))));
        assert!(is_lan_address(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 5))));
        assert!(!is_lan_address(IpAddr::V4(Ipv4Addr::new(169, 254, 3, 4))));
        assert!(!is_lan_address(IpAddr::V4(Ipv4Addr::LOCALHOST)));
        assert!(!is_lan_address(IpAddr::V6(Ipv6Addr::LOCALHOST)));
    }

    #[test]
    fn probe_does_not_panic() {
        let _ = InterfaceReachability.is_reachable_on_lan();
    }
}
