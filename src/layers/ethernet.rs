//! Ethernet layer (§4.3): always the first layer in every stack.

use pnet::packet::ethernet::{EtherTypes, MutableEthernetPacket};
use pnet::util::MacAddr;

use crate::constants::ETHERNET_HEADER_SIZE;
use crate::error::{FlowError, PacketOptionExt, Result};
use crate::plan::{Direction, LayerParams, PacketPlan};

use super::{FlowContext, PacketBuffer};

/// EtherType of the layer immediately following Ethernet: the first
/// encapsulation layer if present, otherwise the L3 protocol's own type.
pub struct EthernetLayer {
    pub position: usize,
    pub next_ethertype: u16,
}

impl EthernetLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Ethernet {
                src_mac: [0; 6],
                dst_mac: [0; 6],
            });
        }
    }

    pub fn post_plan_flow(&self, ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            let (src_mac, dst_mac) = match plan.direction {
                Direction::Forward => (ctx.initiator_mac, ctx.responder_mac),
                Direction::Reverse => (ctx.responder_mac, ctx.initiator_mac),
                Direction::Unknown => (ctx.initiator_mac, ctx.responder_mac),
            };
            plan.params[self.position] = LayerParams::Ethernet { src_mac, dst_mac };
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, _plan: &PacketPlan) -> Result<()> {
        let (src_mac, dst_mac) = match params {
            LayerParams::Ethernet { src_mac, dst_mac } => (*src_mac, *dst_mac),
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "ethernet",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        let mut buf = [0u8; ETHERNET_HEADER_SIZE];
        {
            let mut header = MutableEthernetPacket::new(&mut buf)
                .or_buffer_too_small("ethernet", "buffer too small for ethernet header")?;
            header.set_source(MacAddr::from(src_mac));
            header.set_destination(MacAddr::from(dst_mac));
            header.set_ethertype(ether_type_of(self.next_ethertype));
        }
        packet.push(&buf);
        Ok(())
    }
}

fn ether_type_of(value: u16) -> pnet::packet::ethernet::EtherType {
    match value {
        crate::constants::ETHERTYPE_VLAN => EtherTypes::Vlan,
        crate::constants::ETHERTYPE_MPLS_UNICAST => EtherTypes::Mpls,
        0x86DD => EtherTypes::Ipv6,
        _ => EtherTypes::Ipv4,
    }
}
