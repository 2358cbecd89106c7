// SPDX-License-Identifier: MIT

//! In-memory model of the interfaces visible in the watched network
//! namespace: a fixed-capacity array indexed directly by kernel
//! interface index, each slot owning a small list of IP addresses.

use crate::monitor::error::{MonitorError, MonitorResult};

pub const MAX_IFACES: usize = 50;
pub const INIT_IF_IDX: i32 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressFamily {
    Inet,
    Inet6,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAddr {
    pub family: AddressFamily,
    pub addr: String,
}

#[derive(Debug, Clone)]
pub struct Interface {
    pub idx: i32,
    pub hw_addr: Option<String>,
    pub name: Option<String>,
    pub mtu: Option<u32>,
    pub addrs: Vec<IpAddr>,
}

impl Default for Interface {
    fn default() -> Self {
        Interface { idx: INIT_IF_IDX, hw_addr: None, name: None, mtu: None, addrs: Vec::new() }
    }
}

impl Interface {
    pub fn is_live(&self) -> bool {
        self.idx != INIT_IF_IDX
    }
}

/// Whether an incoming `NEWLINK` changed anything an observer would
/// care about. Computed by comparing `(name, hw_addr, mtu)` by string
/// content — never by pointer/reference identity.
pub fn link_fields_changed(existing: &Interface, name: &Option<String>, hw_addr: &Option<String>, mtu: &Option<u32>) -> bool {
    name.as_ref().is_some_and(|n| Some(n) != existing.name.as_ref())
        || hw_addr.as_ref().is_some_and(|h| Some(h) != existing.hw_addr.as_ref())
        || mtu.is_some_and(|m| Some(m) != existing.mtu)
}

pub struct InterfaceTable {
    slots: [Interface; MAX_IFACES],
}

impl InterfaceTable {
    pub fn new() -> Self {
        Self { slots: std::array::from_fn(|_| Interface::default()) }
    }

    pub fn get(&self, idx: i32) -> Option<&Interface> {
        let slot = self.slot_ref(idx).ok()?;
        if slot.is_live() {
            Some(slot)
        } else {
            None
        }
    }

    pub fn add(&mut self, idx: i32, name: Option<String>, hw_addr: Option<String>, mtu: Option<u32>) -> MonitorResult<()> {
        let slot = self.slot_mut(idx)?;
        *slot = Interface { idx, name, hw_addr, mtu, addrs: Vec::new() };
        Ok(())
    }

    pub fn update(&mut self, idx: i32, name: Option<String>, hw_addr: Option<String>, mtu: Option<u32>) -> MonitorResult<()> {
        let slot = self.slot_mut(idx)?;
        if slot.idx == INIT_IF_IDX {
            slot.idx = idx;
        }
        if let Some(n) = name {
            slot.name = Some(n);
        }
        if let Some(h) = hw_addr {
            slot.hw_addr = Some(h);
        }
        if let Some(m) = mtu {
            slot.mtu = Some(m);
        }
        Ok(())
    }

    pub fn delete(&mut self, idx: i32) -> MonitorResult<()> {
        let slot = self.slot_mut(idx)?;
        *slot = Interface::default();
        Ok(())
    }

    pub fn insert_ip(&mut self, idx: i32, addr: &str, family: AddressFamily) -> MonitorResult<()> {
        if idx < 0 {
            return Err(MonitorError::InvalidIndex(idx));
        }
        if addr.is_empty() {
            return Err(MonitorError::EmptyAddress);
        }
        let slot = self.slot_mut(idx)?;
        if slot.addrs.iter().any(|a| a.addr == addr) {
            return Ok(());
        }
        slot.addrs.push(IpAddr { family, addr: addr.to_string() });
        Ok(())
    }

    pub fn delete_ip(&mut self, idx: i32, addr: &str) -> MonitorResult<()> {
        if idx < 0 {
            return Err(MonitorError::InvalidIndex(idx));
        }
        let slot = self.slot_mut(idx)?;
        let pos = slot.addrs.iter().position(|a| a.addr == addr).ok_or(MonitorError::NotFound)?;
        slot.addrs.remove(pos);
        Ok(())
    }

    fn slot_ref(&self, idx: i32) -> MonitorResult<&Interface> {
        if idx < 0 || idx as usize >= MAX_IFACES {
            return Err(MonitorError::InvalidIndex(idx));
        }
        Ok(&self.slots[idx as usize])
    }

    fn slot_mut(&mut self, idx: i32) -> MonitorResult<&mut Interface> {
        if idx < 0 || idx as usize >= MAX_IFACES {
            return Err(MonitorError::InvalidIndex(idx));
        }
        Ok(&mut self.slots[idx as usize])
    }
}

impl Default for InterfaceTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_round_trips() {
        let mut table = InterfaceTable::new();
        table.add(7, Some("eth0".into()), Some("aa:bb:cc:dd:ee:ff".into()), Some(1500)).unwrap();
        let iface = table.get(7).unwrap();
        assert_eq!(iface.name.as_deref(), Some("eth0"));
        assert_eq!(iface.mtu, Some(1500));
    }

    #[test]
    fn delete_clears_slot() {
        let mut table = InterfaceTable::new();
        table.add(3, Some("lo".into()), None, Some(65536)).unwrap();
        table.delete(3).unwrap();
        assert!(table.get(3).is_none());
    }

    #[test]
    fn out_of_range_index_is_rejected_not_clamped() {
        let mut table = InterfaceTable::new();
        assert!(matches!(table.add(MAX_IFACES as i32, None, None, None), Err(MonitorError::InvalidIndex(_))));
        assert!(matches!(table.add(-1, None, None, None), Err(MonitorError::InvalidIndex(_))));
    }

    #[test]
    fn insert_ip_rejects_empty_address_and_negative_index() {
        let mut table = InterfaceTable::new();
        table.add(1, Some("eth0".into()), None, None).unwrap();
        assert!(matches!(table.insert_ip(1, "", AddressFamily::Inet), Err(MonitorError::EmptyAddress)));
        assert!(matches!(table.insert_ip(-1, "10.0.0.1", AddressFamily::Inet), Err(MonitorError::InvalidIndex(_))));
    }

    #[test]
    fn insert_ip_is_idempotent_no_duplicate_addresses() {
        let mut table = InterfaceTable::new();
        table.add(1, Some("eth0".into()), None, None).unwrap();
        table.insert_ip(1, "10.0.0.2", AddressFamily::Inet).unwrap();
        table.insert_ip(1, "10.0.0.2", AddressFamily::Inet).unwrap();
        assert_eq!(table.get(1).unwrap().addrs.len(), 1);
    }

    #[test]
    fn delete_ip_removes_matching_node_only() {
        let mut table = InterfaceTable::new();
        table.add(1, Some("eth0".into()), None, None).unwrap();
        table.insert_ip(1, "10.0.0.2", AddressFamily::Inet).unwrap();
        table.insert_ip(1, "10.0.0.3", AddressFamily::Inet).unwrap();
        table.delete_ip(1, "10.0.0.2").unwrap();
        let addrs = &table.get(1).unwrap().addrs;
        assert_eq!(addrs.len(), 1);
        assert_eq!(addrs[0].addr, "10.0.0.3");
    }

    #[test]
    fn delete_ip_not_found_is_reported() {
        let mut table = InterfaceTable::new();
        table.add(1, Some("eth0".into()), None, None).unwrap();
        assert!(matches!(table.delete_ip(1, "10.0.0.9"), Err(MonitorError::NotFound)));
    }

    #[test]
    fn link_fields_changed_compares_by_content_not_identity() {
        let mut existing = Interface::default();
        existing.idx = 7;
        existing.name = Some(String::from("eth0"));
        existing.hw_addr = Some(String::from("aa:bb:cc:dd:ee:ff"));
        existing.mtu = Some(1500);

        // A freshly allocated String with equal content must compare
        // as unchanged, not as a pointer-identity mismatch.
        let same_name = Some(format!("{}{}", "eth", "0"));
        assert!(!link_fields_changed(&existing, &same_name, &existing.hw_addr.clone(), &existing.mtu));

        let new_mtu = Some(9000);
        assert!(link_fields_changed(&existing, &existing.name.clone(), &existing.hw_addr.clone(), &new_mtu));
    }
}
