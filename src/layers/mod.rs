//! Layer Stack (§4.3): the ordered set of protocol layers describing a
//! flow's packet structure, plus the shared context every layer's planning
//! and build hooks consult.
//!
//! The polymorphic `Layer` is a closed sum type rather than a trait object:
//! the hot build path (§4.6) never pays for dynamic dispatch, and a layer's
//! position in the stack is just its index, not a stored back-reference —
//! hooks take the owning flow's context as an explicit argument instead of
//! holding a pointer back to it, which sidesteps a self-referential struct
//! for the same "layer can see its siblings" effect.

pub mod ethernet;
pub mod icmp;
pub mod icmpv6;
pub mod ipv4;
pub mod ipv6;
pub mod mpls;
pub mod payload;
pub mod tcp;
pub mod udp;
pub mod vlan;

use crate::address::AddressGenerator;
use crate::config::{EncapsulationLayer, IpFamilyConfig};
use crate::error::Result;
use crate::plan::{LayerParams, PacketPlan};
use crate::profile::{FlowProfile, IpAddrEither, L4Protocol};

pub use ethernet::EthernetLayer;
pub use icmp::{IcmpEchoLayer, IcmpRandomLayer};
pub use icmpv6::{Icmpv6EchoLayer, Icmpv6RandomLayer};
pub use ipv4::Ipv4Layer;
pub use ipv6::Ipv6Layer;
pub use mpls::MplsLayer;
pub use payload::PayloadLayer;
pub use tcp::TcpLayer;
pub use udp::UdpLayer;
pub use vlan::VlanLayer;

/// A growable buffer the build pass writes layer bytes into. Tracks where
/// the L3 header starts and how many L3-and-above bytes the plan committed
/// to, so a layer can compute "everything downstream of me" (for length and
/// checksum fields) without needing to see the layers below it.
pub struct PacketBuffer {
    pub bytes: Vec<u8>,
    l3_start: usize,
    l3_total_len: usize,
}

impl PacketBuffer {
    pub fn new(l3_total_len: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(32 + l3_total_len),
            l3_start: 0,
            l3_total_len,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Call once the L2 (and any encapsulation) headers have been written.
    pub fn mark_l3_start(&mut self) {
        self.l3_start = self.bytes.len();
    }

    /// Bytes from `offset` to the end of the committed L3 region.
    pub fn remaining_from(&self, offset: usize) -> usize {
        (self.l3_start + self.l3_total_len).saturating_sub(offset)
    }

    pub fn l3_start(&self) -> usize {
        self.l3_start
    }

    pub fn l3_total_len(&self) -> usize {
        self.l3_total_len
    }
}

/// Context shared by every layer's hooks: the profile being planned, the
/// endpoint identities generated once per flow, and the per-family knobs
/// that apply to every packet.
pub struct FlowContext {
    pub profile: FlowProfile,
    pub initiator_mac: [u8; 6],
    pub responder_mac: [u8; 6],
    pub initiator_ip: IpAddrEither,
    pub responder_ip: IpAddrEither,
    pub initiator_port: u16,
    pub responder_port: u16,
    pub fragmentation: IpFamilyConfig,
}

impl FlowContext {
    pub fn new(profile: FlowProfile, fragmentation: IpFamilyConfig, addresses: &mut AddressGenerator) -> Self {
        let (initiator_ip, responder_ip) = match profile.l3 {
            crate::profile::L3Protocol::Ipv4 => {
                let src = profile.source_ip.unwrap_or_else(|| {
                    IpAddrEither::V4(std::net::Ipv4Addr::from(addresses.generate_ipv4()))
                });
                let dst = profile.dest_ip.unwrap_or_else(|| {
                    IpAddrEither::V4(std::net::Ipv4Addr::from(addresses.generate_ipv4()))
                });
                (src, dst)
            }
            crate::profile::L3Protocol::Ipv6 => {
                let src = profile.source_ip.unwrap_or_else(|| {
                    IpAddrEither::V6(std::net::Ipv6Addr::from(addresses.generate_ipv6()))
                });
                let dst = profile.dest_ip.unwrap_or_else(|| {
                    IpAddrEither::V6(std::net::Ipv6Addr::from(addresses.generate_ipv6()))
                });
                (src, dst)
            }
        };

        Self {
            initiator_mac: addresses.generate_mac(),
            responder_mac: addresses.generate_mac(),
            initiator_ip,
            responder_ip,
            initiator_port: profile.source_port.unwrap_or(49152),
            responder_port: profile.dest_port.unwrap_or(443),
            fragmentation,
            profile,
        }
    }
}

/// One protocol layer in the stack. Each variant carries the flow-wide
/// (not per-packet) configuration it needs; per-packet state lives in the
/// matching [`LayerParams`] variant.
pub enum Layer {
    Ethernet(EthernetLayer),
    Vlan(VlanLayer),
    Mpls(MplsLayer),
    Ipv4(Ipv4Layer),
    Ipv6(Ipv6Layer),
    Tcp(TcpLayer),
    Udp(UdpLayer),
    IcmpEcho(IcmpEchoLayer),
    IcmpRandom(IcmpRandomLayer),
    Icmpv6Echo(Icmpv6EchoLayer),
    Icmpv6Random(Icmpv6RandomLayer),
    Payload(PayloadLayer),
}

impl Layer {
    pub fn position(&self) -> usize {
        match self {
            Layer::Ethernet(l) => l.position,
            Layer::Vlan(l) => l.position,
            Layer::Mpls(l) => l.position,
            Layer::Ipv4(l) => l.position,
            Layer::Ipv6(l) => l.position,
            Layer::Tcp(l) => l.position,
            Layer::Udp(l) => l.position,
            Layer::IcmpEcho(l) => l.position,
            Layer::IcmpRandom(l) => l.position,
            Layer::Icmpv6Echo(l) => l.position,
            Layer::Icmpv6Random(l) => l.position,
            Layer::Payload(l) => l.position,
        }
    }

    /// First-pass planning: push this layer's param entry onto every plan,
    /// in stack order. ICMP variants may additionally pin a structural size
    /// and mark the plan finished.
    pub fn plan_flow(&self, ctx: &FlowContext, plans: &mut [PacketPlan]) {
        match self {
            Layer::Ethernet(l) => l.plan_flow(ctx, plans),
            Layer::Vlan(l) => l.plan_flow(ctx, plans),
            Layer::Mpls(l) => l.plan_flow(ctx, plans),
            Layer::Ipv4(l) => l.plan_flow(ctx, plans),
            Layer::Ipv6(l) => l.plan_flow(ctx, plans),
            Layer::Tcp(l) => l.plan_flow(ctx, plans),
            Layer::Udp(l) => l.plan_flow(ctx, plans),
            Layer::IcmpEcho(l) => l.plan_flow(ctx, plans),
            Layer::IcmpRandom(l) => l.plan_flow(ctx, plans),
            Layer::Icmpv6Echo(l) => l.plan_flow(ctx, plans),
            Layer::Icmpv6Random(l) => l.plan_flow(ctx, plans),
            Layer::Payload(l) => l.plan_flow(ctx, plans),
        }
    }

    /// Second planning pass, run once directions and sizes are decided.
    pub fn post_plan_flow(&self, ctx: &FlowContext, plans: &mut [PacketPlan]) {
        match self {
            Layer::Ethernet(l) => l.post_plan_flow(ctx, plans),
            Layer::Ipv4(l) => l.post_plan_flow(ctx, plans),
            Layer::Ipv6(l) => l.post_plan_flow(ctx, plans),
            Layer::Tcp(l) => l.post_plan_flow(ctx, plans),
            Layer::Udp(l) => l.post_plan_flow(ctx, plans),
            Layer::IcmpEcho(l) => l.post_plan_flow(ctx, plans),
            Layer::Icmpv6Echo(l) => l.post_plan_flow(ctx, plans),
            Layer::Payload(l) => l.post_plan_flow(ctx, plans),
            _ => {}
        }
    }

    /// Final planning hook, after every layer's `PostPlanFlow`. No core
    /// layer currently needs it; kept as a dispatch point so a future layer
    /// can hook in without touching the stack-walk logic.
    pub fn plan_extra(&self, _ctx: &FlowContext, _plans: &mut [PacketPlan]) {}

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        match self {
            Layer::Ethernet(l) => l.build(packet, params, plan),
            Layer::Vlan(l) => l.build(packet, params, plan),
            Layer::Mpls(l) => l.build(packet, params, plan),
            Layer::Ipv4(l) => l.build(packet, params, plan),
            Layer::Ipv6(l) => l.build(packet, params, plan),
            Layer::Tcp(l) => l.build(packet, params, plan),
            Layer::Udp(l) => l.build(packet, params, plan),
            Layer::IcmpEcho(l) => l.build(packet, params, plan),
            Layer::IcmpRandom(l) => l.build(packet, params, plan),
            Layer::Icmpv6Echo(l) => l.build(packet, params, plan),
            Layer::Icmpv6Random(l) => l.build(packet, params, plan),
            Layer::Payload(l) => l.build(packet, params, plan),
        }
    }

    pub fn post_build(&self, packet: &mut PacketBuffer, params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        match self {
            Layer::Tcp(l) => l.post_build(packet, params, plan),
            Layer::Udp(l) => l.post_build(packet, params, plan),
            Layer::IcmpEcho(l) => l.post_build(packet, params, plan),
            Layer::IcmpRandom(l) => l.post_build(packet, params, plan),
            Layer::Icmpv6Echo(l) => l.post_build(packet, params, plan),
            Layer::Icmpv6Random(l) => l.post_build(packet, params, plan),
            _ => Ok(()),
        }
    }
}

/// Given a list of encapsulation variants each with a probability, draw a
/// uniform real in `[0, Σp)` and return the index of the first variant
/// whose cumulative probability covers the draw. `None` for an empty list.
pub fn select_encapsulation(variants: &[crate::config::EncapsulationVariant]) -> Option<usize> {
    if variants.is_empty() {
        return None;
    }
    let total: f64 = variants.iter().map(|v| v.probability).sum();
    if total <= 0.0 {
        return None;
    }
    let draw = crate::rng::random_double(0.0, total);
    let chosen = select_encapsulation_for_draw(variants, draw);
    tracing::debug!(draw, chosen = ?chosen, "layer selection: encapsulation variant");
    chosen
}

fn select_encapsulation_for_draw(variants: &[crate::config::EncapsulationVariant], draw: f64) -> Option<usize> {
    let mut running = 0.0;
    for (i, v) in variants.iter().enumerate() {
        running += v.probability;
        if draw < running {
            return Some(i);
        }
    }
    Some(variants.len() - 1)
}

/// Scan a plan's already-built layer params for the IPv4 or IPv6 addresses
/// carried by its network layer. Lets a transport/ICMP layer compute a
/// pseudo-header checksum without holding a back-reference to its sibling.
pub fn ip_endpoints(plan: &PacketPlan) -> Option<(std::net::IpAddr, std::net::IpAddr)> {
    plan.params.iter().find_map(|p| match p {
        LayerParams::Ipv4 { src, dst, .. } => Some((std::net::IpAddr::V4(*src), std::net::IpAddr::V4(*dst))),
        LayerParams::Ipv6 { src, dst, .. } => Some((std::net::IpAddr::V6(*src), std::net::IpAddr::V6(*dst))),
        _ => None,
    })
}

/// `S_unreach` for the given L4 protocol: the fixed structural size of an
/// ICMP/ICMPv6 unreachable-style error packet's L3-and-above payload.
pub fn unreachable_size(l4: L4Protocol) -> usize {
    match l4 {
        L4Protocol::Icmp => crate::constants::icmp_unreach_size_v4(),
        L4Protocol::Icmpv6 => crate::constants::icmp_unreach_size_v6(),
        _ => 0,
    }
}

/// Encapsulation layer kind mapped onto a concrete encoded layer.
pub fn encapsulation_to_layer(layer: EncapsulationLayer, position: usize) -> Layer {
    match layer {
        EncapsulationLayer::Vlan { id } => Layer::Vlan(VlanLayer {
            position,
            id,
            next_ethertype: 0,
        }),
        EncapsulationLayer::Mpls { label } => Layer::Mpls(MplsLayer { position, label }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncapsulationVariant;

    #[test]
    fn empty_encapsulation_list_selects_nothing() {
        assert_eq!(select_encapsulation(&[]), None);
    }

    #[test]
    fn selects_by_cumulative_probability() {
        crate::rng::init(1);
        // Stub: force a draw at the 0.5 mark by using a single-shot RNG and
        // checking the invariant over many draws instead of a fixed value.
        let variants = vec![
            EncapsulationVariant {
                probability: 0.3,
                layers: vec![],
            },
            EncapsulationVariant {
                probability: 0.7,
                layers: vec![],
            },
        ];
        for _ in 0..200 {
            let idx = select_encapsulation(&variants);
            assert!(idx == Some(0) || idx == Some(1));
        }
    }

    #[test]
    fn a_draw_of_half_picks_the_second_of_a_03_07_split() {
        let variants = vec![
            EncapsulationVariant {
                probability: 0.3,
                layers: vec![],
            },
            EncapsulationVariant {
                probability: 0.7,
                layers: vec![],
            },
        ];
        assert_eq!(select_encapsulation_for_draw(&variants, 0.5), Some(1));
    }
}
