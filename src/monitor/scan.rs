// SPDX-License-Identifier: MIT

//! Initial interface enumeration on startup: walk the address list
//! (as `getifaddrs` would), and for each interface index not yet
//! known, query its hardware address and MTU via ioctl on a throwaway
//! datagram socket, then insert its addresses.

use std::net::IpAddr as StdIpAddr;

use ifstructs::ifreq;
use nix::ifaddrs::getifaddrs;
use nix::net::if_::if_nametoindex;
use nix::sys::socket::{socket, AddressFamily as NixAddressFamily, SockFlag, SockType};
use nix::{ioctl_read_bad, unistd::close};

use crate::monitor::error::MonitorResult;
use crate::monitor::table::{AddressFamily, InterfaceTable, MAX_IFACES};

const SIOCGIFHWADDR: u64 = 0x8927;
const SIOCGIFMTU: u64 = 0x8921;

mod ioctl {
    use super::*;
    ioctl_read_bad!(siocgifhwaddr, SIOCGIFHWADDR, ifreq);
    ioctl_read_bad!(siocgifmtu, SIOCGIFMTU, ifreq);
}

fn query_hw_addr_and_mtu(name: &str) -> MonitorResult<(Option<String>, Option<u32>)> {
    let sfd = socket(NixAddressFamily::Inet, SockType::Datagram, SockFlag::empty(), None)?;

    let mut ifr = match ifreq::from_name(name) {
        Ok(ifr) => ifr,
        Err(_) => {
            let _ = close(sfd);
            return Ok((None, None));
        }
    };

    let hw_addr = unsafe {
        if ioctl::siocgifhwaddr(sfd, &mut ifr).is_ok() {
            let sa_data = ifr.ifr_ifru.ifr_hwaddr.sa_data;
            Some(format!(
                "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
                sa_data[0] as u8,
                sa_data[1] as u8,
                sa_data[2] as u8,
                sa_data[3] as u8,
                sa_data[4] as u8,
                sa_data[5] as u8,
            ))
        } else {
            None
        }
    };

    let mtu = unsafe {
        if ioctl::siocgifmtu(sfd, &mut ifr).is_ok() {
            Some(ifr.ifr_ifru.ifr_mtu as u32)
        } else {
            None
        }
    };

    let _ = close(sfd);
    Ok((hw_addr, mtu))
}

/// Enumerate every interface currently visible (post `setns`) and
/// populate `table`. Interface indices at or above [`MAX_IFACES`] are
/// logged and skipped, matching the original scan's capacity check.
pub fn scan_netns(table: &mut InterfaceTable) -> MonitorResult<()> {
    let addrs = getifaddrs()?;
    for ifaddr in addrs {
        let name = ifaddr.interface_name.clone();
        let idx = match if_nametoindex(name.as_str()) {
            Ok(idx) => idx as i32,
            Err(_) => continue,
        };
        if idx as usize >= MAX_IFACES {
            log::debug!("skipping interface {name} (index {idx} >= capacity {MAX_IFACES})");
            continue;
        }

        if table.get(idx).is_none() {
            let (hw_addr, mtu) = query_hw_addr_and_mtu(&name)?;
            table.add(idx, Some(name.clone()), hw_addr, mtu)?;
        }

        if let Some(address) = ifaddr.address {
            if let Some(text) = sockaddr_to_text(&address) {
                let family = if address.as_sockaddr_in().is_some() {
                    AddressFamily::Inet
                } else {
                    AddressFamily::Inet6
                };
                table.insert_ip(idx, &text, family)?;
            }
        }
    }
    Ok(())
}

fn sockaddr_to_text(addr: &nix::sys::socket::SockaddrStorage) -> Option<String> {
    if let Some(v4) = addr.as_sockaddr_in() {
        let ip: std::net::Ipv4Addr = v4.ip();
        return Some(StdIpAddr::V4(ip).to_string());
    }
    if let Some(v6) = addr.as_sockaddr_in6() {
        let ip: std::net::Ipv6Addr = v6.ip();
        return Some(StdIpAddr::V6(ip).to_string());
    }
    None
}
