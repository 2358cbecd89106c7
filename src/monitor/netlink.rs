// SPDX-License-Identifier: MIT

//! Routing-control socket setup and the burst decode/dispatch loop.
//! A single datagram can carry a sequence of typed messages; each is
//! walked in arrival order and turned into a table update plus an
//! external runtime invocation.

use netlink_packet_core::{NetlinkMessage, NetlinkPayload};
use netlink_packet_route::{
    address::nlas::Nla as AddrNla, link::nlas::Nla as LinkNla, route::nlas::Nla as RouteNla,
    AddressMessage, LinkMessage, RouteMessage, RtnlMessage,
};
use netlink_sys::{protocols::NETLINK_ROUTE, Socket, SocketAddr};

use crate::monitor::error::{MonitorError, MonitorResult};
use crate::monitor::runtime;
use crate::monitor::table::{link_fields_changed, AddressFamily, InterfaceTable};

const RTNLGRP_LINK: u32 = 1;
const RTNLGRP_IPV4_IFADDR: u32 = 5;
const RTNLGRP_IPV4_ROUTE: u32 = 7;

const RECV_BUF_LEN: usize = 8192;

/// Bind a raw routing-control socket subscribed to link, IPv4-address
/// and IPv4-route multicast groups.
pub fn open_routing_socket() -> MonitorResult<Socket> {
    let mut socket = Socket::new(NETLINK_ROUTE).map_err(MonitorError::from)?;
    socket.bind(&SocketAddr::new(0, 0)).map_err(MonitorError::from)?;
    socket.add_membership(RTNLGRP_LINK).map_err(MonitorError::from)?;
    socket.add_membership(RTNLGRP_IPV4_IFADDR).map_err(MonitorError::from)?;
    socket.add_membership(RTNLGRP_IPV4_ROUTE).map_err(MonitorError::from)?;
    Ok(socket)
}

/// Run the receive loop forever: one `recv` per iteration, decode the
/// burst of messages it contains, dispatch each. Transient socket
/// errors (`EWOULDBLOCK`/`EAGAIN`) are swallowed and retried
/// immediately, matching the original loop's treatment of them as
/// non-fatal.
pub async fn monitor_netns(
    mut socket: Socket,
    mut table: InterfaceTable,
    sandbox_id: String,
    runtime_path: String,
) -> MonitorResult<()> {
    let mut buf = vec![0u8; RECV_BUF_LEN];
    loop {
        let n = match socket.recv(&mut buf, 0) {
            Ok(n) => n,
            Err(e) if matches!(e.raw_os_error(), Some(libc::EWOULDBLOCK) | Some(libc::EAGAIN)) => {
                continue;
            }
            Err(e) => return Err(MonitorError::from(e)),
        };

        if let Err(e) = process_burst(&buf[..n], &mut table, &sandbox_id, &runtime_path).await {
            log::error!("netlink burst aborted: {e}");
        }
    }
}

async fn process_burst(
    mut buf: &[u8],
    table: &mut InterfaceTable,
    sandbox_id: &str,
    runtime_path: &str,
) -> MonitorResult<()> {
    while !buf.is_empty() {
        let msg = NetlinkMessage::<RtnlMessage>::deserialize(buf)
            .map_err(|e| MonitorError::Netlink(format!("malformed netlink message: {e}")))?;
        let consumed = msg.header.length as usize;
        if consumed == 0 || consumed > buf.len() {
            return Err(MonitorError::Netlink("malformed netlink message length".into()));
        }
        buf = &buf[consumed..];

        match msg.payload {
            NetlinkPayload::Done(_) => return Ok(()),
            NetlinkPayload::Error(e) => {
                return Err(MonitorError::Netlink(format!("netlink error message: {e:?}")));
            }
            NetlinkPayload::InnerMessage(inner) => {
                if let Err(e) = dispatch(inner, table, sandbox_id, runtime_path).await {
                    log::error!("could not handle netlink message: {e}");
                }
            }
            _ => {}
        }
    }
    Ok(())
}

async fn dispatch(
    msg: RtnlMessage,
    table: &mut InterfaceTable,
    sandbox_id: &str,
    runtime_path: &str,
) -> MonitorResult<()> {
    match msg {
        RtnlMessage::NewLink(link) => handle_link(link, table, sandbox_id, runtime_path).await,
        RtnlMessage::DelLink(link) => handle_del_link(link, table, runtime_path).await,
        RtnlMessage::NewAddress(addr) => handle_addr(addr, true, table, runtime_path).await,
        RtnlMessage::DelAddress(addr) => handle_addr(addr, false, table, runtime_path).await,
        RtnlMessage::NewRoute(route) => handle_route(route, true, runtime_path).await,
        RtnlMessage::DelRoute(route) => handle_route(route, false, runtime_path).await,
        _ => Ok(()),
    }
}

fn link_fields(msg: &LinkMessage) -> (Option<String>, Option<String>, Option<u32>) {
    let mut name = None;
    let mut hw_addr = None;
    let mut mtu = None;
    for nla in &msg.nlas {
        match nla {
            LinkNla::IfName(n) => name = Some(n.clone()),
            LinkNla::Address(bytes) => hw_addr = Some(mac_to_string(bytes)),
            LinkNla::Mtu(m) => mtu = Some(*m),
            _ => {}
        }
    }
    (name, hw_addr, mtu)
}

fn mac_to_string(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

/// `NEWLINK`: add-or-update the slot; emit `add-net-if` unless the
/// slot is already live and none of `(name, hw_addr, mtu)` changed by
/// string content (never by pointer identity).
async fn handle_link(
    link: LinkMessage,
    table: &mut InterfaceTable,
    sandbox_id: &str,
    runtime_path: &str,
) -> MonitorResult<()> {
    let idx = link.header.index as i32;
    let (name, hw_addr, mtu) = link_fields(&link);

    let unchanged = table
        .get(idx)
        .map(|existing| !link_fields_changed(existing, &name, &hw_addr, &mtu))
        .unwrap_or(false);

    if table.get(idx).is_some() {
        table.update(idx, name.clone(), hw_addr.clone(), mtu)?;
    } else {
        table.add(idx, name.clone(), hw_addr.clone(), mtu)?;
    }

    if unchanged {
        return Ok(());
    }

    if let (Some(name), Some(hw_addr), Some(mtu)) = (name, hw_addr, mtu) {
        let (verb, args) = runtime::add_net_if(sandbox_id, &name, &hw_addr, mtu);
        runtime::invoke(runtime_path, &verb, &args).await?;
    }
    Ok(())
}

async fn handle_del_link(link: LinkMessage, table: &mut InterfaceTable, runtime_path: &str) -> MonitorResult<()> {
    let idx = link.header.index as i32;
    let name = table.get(idx).and_then(|i| i.name.clone());
    table.delete(idx)?;
    if let Some(name) = name {
        let (verb, args) = runtime::del_net_if(&name);
        runtime::invoke(runtime_path, &verb, &args).await?;
    }
    Ok(())
}

fn addr_fields(msg: &AddressMessage) -> Option<(AddressFamily, String)> {
    let family = if msg.header.family as i32 == libc::AF_INET {
        AddressFamily::Inet
    } else {
        AddressFamily::Inet6
    };
    for nla in &msg.nlas {
        match nla {
            AddrNla::Address(bytes) | AddrNla::Local(bytes) => {
                return Some((family, bytes_to_ip_string(bytes, family)));
            }
            _ => {}
        }
    }
    None
}

fn bytes_to_ip_string(bytes: &[u8], family: AddressFamily) -> String {
    match family {
        AddressFamily::Inet if bytes.len() == 4 => {
            std::net::Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]).to_string()
        }
        AddressFamily::Inet6 if bytes.len() == 16 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(bytes);
            std::net::Ipv6Addr::from(octets).to_string()
        }
        _ => String::new(),
    }
}

/// `NEWADDR`/`DELADDR`: insert or remove the address from the slot's
/// list, then emit `upd-net-if` for the owning interface.
async fn handle_addr(
    addr: AddressMessage,
    is_new: bool,
    table: &mut InterfaceTable,
    runtime_path: &str,
) -> MonitorResult<()> {
    let idx = addr.header.index as i32;
    let Some((family, text)) = addr_fields(&addr) else { return Ok(()) };

    if is_new {
        table.insert_ip(idx, &text, family)?;
    } else {
        table.delete_ip(idx, &text)?;
    }

    if let Some(iface) = table.get(idx) {
        if let (Some(name), Some(hw_addr), Some(mtu)) = (&iface.name, &iface.hw_addr, iface.mtu) {
            let (verb, args) = runtime::upd_net_if(name, hw_addr, mtu);
            runtime::invoke(runtime_path, &verb, &args).await?;
        }
    }
    Ok(())
}

fn route_fields(msg: &RouteMessage) -> Option<(String, String, u8, String, String)> {
    // IPv4-only by design; IPv6 route parsing is explicitly out of scope.
    if msg.header.address_family as i32 != libc::AF_INET {
        return None;
    }
    let prefix = msg.header.destination_prefix_length;
    let mut dst = None;
    let mut gw = None;
    let mut src = None;
    let mut oif = None;
    for nla in &msg.nlas {
        match nla {
            RouteNla::Destination(b) => dst = Some(bytes_to_ip_string(b, AddressFamily::Inet)),
            RouteNla::Gateway(b) => gw = Some(bytes_to_ip_string(b, AddressFamily::Inet)),
            RouteNla::PrefSource(b) => src = Some(bytes_to_ip_string(b, AddressFamily::Inet)),
            RouteNla::Oif(idx) => oif = Some(*idx),
            _ => {}
        }
    }
    let dev = oif
        .and_then(|idx| nix::net::if_::if_indextoname(idx).ok())
        .unwrap_or_default();
    Some((src.unwrap_or_default(), dst.unwrap_or_default(), prefix, gw.unwrap_or_default(), dev))
}

async fn handle_route(route: RouteMessage, is_new: bool, runtime_path: &str) -> MonitorResult<()> {
    let Some((src, dst, prefix, gw, dev)) = route_fields(&route) else { return Ok(()) };
    let (verb, args) = if is_new {
        runtime::add_net_route(&src, &dst, prefix, &gw, &dev)
    } else {
        runtime::del_net_route(&src, &dst, prefix, &gw, &dev)
    };
    runtime::invoke(runtime_path, &verb, &args).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mac_to_string_formats_colon_separated_hex() {
        assert_eq!(mac_to_string(&[0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]), "aa:bb:cc:dd:ee:ff");
    }

    #[test]
    fn bytes_to_ip_string_handles_v4_and_v6() {
        assert_eq!(bytes_to_ip_string(&[10, 0, 0, 2], AddressFamily::Inet), "10.0.0.2");
        assert_eq!(bytes_to_ip_string(&[0u8; 16], AddressFamily::Inet6), "::");
    }
}
