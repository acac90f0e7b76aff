// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! SAP receive socket and interface discovery.
//!
//! The socket binds `0.0.0.0:<port>` with address reuse so several listeners
//! on one host (another media center, `sdpd`) can coexist, then joins every
//! configured group on every non-loopback IPv4 interface.

use crate::config::SapConfig;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddrV4, UdpSocket};

/// Build the bound, group-joined receive socket.
///
/// # Errors
/// Fails if the socket cannot be created or bound, or if no group could be
/// joined on any interface.
pub fn open_sap_socket(config: &SapConfig) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(all(unix, not(target_os = "solaris"), not(target_os = "illumos")))]
    socket.set_reuse_port(true)?;

    let bind = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, config.port);
    socket.bind(&bind.into())?;

    let socket: UdpSocket = socket.into();
    let joined = join_groups(&socket, &config.groups)?;
    if joined == 0 {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            "no SAP multicast group could be joined",
        ));
    }
    log::debug!(
        "[sap] bound {} and joined {} group membership(s)",
        bind,
        joined
    );
    Ok(socket)
}

/// Join each group on each interface. Returns the number of successful joins.
///
/// Per-interface failures are not fatal; an interface that cannot carry
/// multicast is skipped.
pub fn join_groups(socket: &UdpSocket, groups: &[Ipv4Addr]) -> io::Result<usize> {
    let mut interfaces = multicast_interfaces();
    if interfaces.is_empty() {
        log::debug!("[sap] no usable interfaces, joining on UNSPECIFIED");
        interfaces.push(Ipv4Addr::UNSPECIFIED);
    }

    let mut joined = 0;
    for iface in &interfaces {
        for group in groups {
            match socket.join_multicast_v4(group, iface) {
                Ok(()) => {
                    joined += 1;
                    log::debug!("[sap] join_multicast_v4({}) on {}", group, iface);
                }
                Err(e) if e.raw_os_error() == Some(98) => {
                    // EADDRINUSE: two addresses on the same NIC
                    joined += 1;
                    log::debug!("[sap] {} already joined on {}, skipping", group, iface);
                }
                Err(e) => {
                    log::debug!(
                        "[sap] join_multicast_v4({}) on {} failed (non-fatal): {}",
                        group,
                        iface,
                        e
                    );
                }
            }
        }
    }
    Ok(joined)
}

/// Non-loopback IPv4 addresses. `VFSNET_MULTICAST_IF` overrides discovery.
pub fn multicast_interfaces() -> Vec<Ipv4Addr> {
    if let Ok(var) = std::env::var("VFSNET_MULTICAST_IF") {
        if let Ok(addr) = var.parse::<Ipv4Addr>() {
            log::debug!("[sap] using VFSNET_MULTICAST_IF override: {}", addr);
            return vec![addr];
        }
    }

    let interfaces = match local_ip_address::list_afinet_netifas() {
        Ok(ifs) => ifs,
        Err(e) => {
            log::debug!("[sap] failed to list network interfaces: {}", e);
            return Vec::new();
        }
    };

    let mut addrs: Vec<Ipv4Addr> = interfaces
        .into_iter()
        .filter_map(|(_, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() => Some(v4),
            _ => None,
        })
        .collect();
    addrs.sort_unstable();
    addrs.dedup();
    addrs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discovered_interfaces_exclude_loopback() {
        for addr in multicast_interfaces() {
            assert!(!addr.is_loopback());
        }
    }

    #[test]
    fn test_join_with_no_groups_is_zero() {
        let socket = UdpSocket::bind("0.0.0.0:0").unwrap();
        assert_eq!(join_groups(&socket, &[]).unwrap(), 0);
    }
}
