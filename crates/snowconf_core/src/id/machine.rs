//! Best-effort machine id derivation.
//!
//! The derived id is a uniqueness heuristic, not an allocation: two hosts
//! whose IPv4 addresses agree in the low 10 bits collide.

use super::generator::MAX_MACHINE_ID;
use log::{info, warn};
use rand::Rng;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

// Connecting a UDP socket only selects a route; nothing is sent.
const ROUTE_TARGET_ADDR: (Ipv4Addr, u16) = (Ipv4Addr::new(8, 8, 8, 8), 53);

/// Derives a machine id from the host's primary IPv4 address.
///
/// Falls back to a random id in range when no address can be resolved.
pub fn default_machine_id() -> u16 {
    match local_ipv4() {
        Some(addr) => {
            let machine_id = machine_id_from_ipv4(addr);
            info!(
                "event=machine_id_derived module=id status=ok source=ipv4 machine_id={}",
                machine_id
            );
            machine_id
        }
        None => {
            let machine_id = random_machine_id();
            warn!(
                "event=machine_id_derived module=id status=fallback source=random machine_id={}",
                machine_id
            );
            machine_id
        }
    }
}

/// Maps the last two octets of `addr` into the 10-bit machine id field.
pub fn machine_id_from_ipv4(addr: Ipv4Addr) -> u16 {
    let [_, _, third, fourth] = addr.octets();
    ((u16::from(third) << 8) + u16::from(fourth)) & MAX_MACHINE_ID
}

fn random_machine_id() -> u16 {
    rand::rng().random_range(0..=MAX_MACHINE_ID)
}

fn local_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect(ROUTE_TARGET_ADDR).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(addr) if !addr.is_unspecified() => Some(addr),
        _ => None,
    }
}
