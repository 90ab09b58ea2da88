//! Flow input contract (§3): the read-only description of a flow to plan.

use std::net::{Ipv4Addr, Ipv6Addr};

use serde::{Deserialize, Serialize};

use crate::error::{FlowError, Result};

/// Network-layer protocol tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum L3Protocol {
    Ipv4,
    Ipv6,
}

/// Transport/ICMP-family protocol tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum L4Protocol {
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
}

/// Microsecond-resolution wall-clock timestamp, modeled as whole seconds
/// plus a sub-second microsecond remainder so boundary draws (§4.5 step 8)
/// can split on each component independently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp {
    pub secs: i64,
    pub micros: u32,
}

impl Timestamp {
    pub fn new(secs: i64, micros: u32) -> Self {
        debug_assert!(micros < 1_000_000);
        Self { secs, micros }
    }

    pub fn as_f64(&self) -> f64 {
        self.secs as f64 + self.micros as f64 / 1_000_000.0
    }
}

/// Input description of a flow to be planned. Read-only to the core.
#[derive(Debug, Clone)]
pub struct FlowProfile {
    pub forward_packets: u32,
    pub reverse_packets: u32,
    pub forward_bytes: u64,
    pub reverse_bytes: u64,
    pub start: Timestamp,
    pub end: Timestamp,
    pub l3: L3Protocol,
    pub l4: L4Protocol,
    pub source_ip: Option<IpAddrEither>,
    pub dest_ip: Option<IpAddrEither>,
    pub source_port: Option<u16>,
    pub dest_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpAddrEither {
    V4(Ipv4Addr),
    V6(Ipv6Addr),
}

impl IpAddrEither {
    fn family(&self) -> L3Protocol {
        match self {
            IpAddrEither::V4(_) => L3Protocol::Ipv4,
            IpAddrEither::V6(_) => L3Protocol::Ipv6,
        }
    }

    pub fn as_v4(&self) -> Option<Ipv4Addr> {
        match self {
            IpAddrEither::V4(a) => Some(*a),
            IpAddrEither::V6(_) => None,
        }
    }

    pub fn as_v6(&self) -> Option<Ipv6Addr> {
        match self {
            IpAddrEither::V6(a) => Some(*a),
            IpAddrEither::V4(_) => None,
        }
    }
}

impl FlowProfile {
    /// Total packet/byte counts across both directions.
    pub fn total_packets(&self) -> u32 {
        self.forward_packets + self.reverse_packets
    }

    /// Checks the invariants the planner requires before it can run:
    /// ICMP/ICMPv6 must be paired with the matching IP family, `Ts <= Te`,
    /// and any supplied source address must match the profile's L3 family.
    pub fn validate(&self) -> Result<()> {
        match (self.l4, self.l3) {
            (L4Protocol::Icmp, L3Protocol::Ipv6) => {
                return Err(FlowError::ProtocolMismatch {
                    l4: "ICMP".into(),
                    l3: "IPv6".into(),
                })
            }
            (L4Protocol::Icmpv6, L3Protocol::Ipv4) => {
                return Err(FlowError::ProtocolMismatch {
                    l4: "ICMPv6".into(),
                    l3: "IPv4".into(),
                })
            }
            _ => {}
        }

        if self.start > self.end {
            return Err(FlowError::InvalidConfig(format!(
                "start timestamp {:?} is after end timestamp {:?}",
                self.start, self.end
            )));
        }

        if let Some(ip) = self.source_ip {
            if ip.family() != self.l3 {
                return Err(FlowError::InvalidConfig(
                    "source IP family does not match profile L3 protocol".into(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_profile() -> FlowProfile {
        FlowProfile {
            forward_packets: 1,
            reverse_packets: 1,
            forward_bytes: 100,
            reverse_bytes: 100,
            start: Timestamp::new(1, 0),
            end: Timestamp::new(2, 0),
            l3: L3Protocol::Ipv4,
            l4: L4Protocol::Tcp,
            source_ip: None,
            dest_ip: None,
            source_port: None,
            dest_port: None,
        }
    }

    #[test]
    fn icmp_over_ipv6_is_rejected() {
        let mut p = base_profile();
        p.l3 = L3Protocol::Ipv6;
        p.l4 = L4Protocol::Icmp;
        assert!(matches!(p.validate(), Err(FlowError::ProtocolMismatch { .. })));
    }

    #[test]
    fn icmpv6_over_ipv4_is_rejected() {
        let mut p = base_profile();
        p.l3 = L3Protocol::Ipv4;
        p.l4 = L4Protocol::Icmpv6;
        assert!(matches!(p.validate(), Err(FlowError::ProtocolMismatch { .. })));
    }

    #[test]
    fn well_formed_profile_validates() {
        assert!(base_profile().validate().is_ok());
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut p = base_profile();
        p.start = Timestamp::new(10, 0);
        p.end = Timestamp::new(5, 0);
        assert!(p.validate().is_err());
    }

    #[test]
    fn mismatched_source_ip_family_is_rejected() {
        let mut p = base_profile();
        p.source_ip = Some(IpAddrEither::V6(Ipv6Addr::LOCALHOST));
        assert!(p.validate().is_err());
    }
}
