//! 802.1Q VLAN tag layer, inserted when an encapsulation variant picks it.

use pnet::packet::ethernet::EtherTypes;
use pnet::packet::vlan::MutableVlanPacket;

use crate::constants::VLAN_TAG_SIZE;
use crate::error::{FlowError, PacketOptionExt, Result};
use crate::plan::{LayerParams, PacketPlan};

use super::{FlowContext, PacketBuffer};

pub struct VlanLayer {
    pub position: usize,
    pub id: u16,
    pub next_ethertype: u16,
}

impl VlanLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Vlan { id: self.id });
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, _plan: &PacketPlan) -> Result<()> {
        let id = match params {
            LayerParams::Vlan { id } => *id,
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "vlan",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        let mut buf = [0u8; VLAN_TAG_SIZE];
        {
            let mut header =
                MutableVlanPacket::new(&mut buf).or_buffer_too_small("vlan", "buffer too small for vlan tag")?;
            header.set_vlan_identifier(id);
            header.set_priority_code_point(pnet::packet::vlan::ClassOfService::new(0));
            header.set_drop_eligible_indicator(0);
            header.set_ethertype(ether_type_of(self.next_ethertype));
        }
        packet.push(&buf);
        Ok(())
    }
}

fn ether_type_of(value: u16) -> pnet::packet::ethernet::EtherType {
    match value {
        crate::constants::ETHERTYPE_MPLS_UNICAST => EtherTypes::Mpls,
        0x86DD => EtherTypes::Ipv6,
        _ => EtherTypes::Ipv4,
    }
}
