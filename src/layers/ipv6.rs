//! IPv6 layer (RFC 8200), with the same per-family fragmentation knobs as
//! IPv4. The fragmentation decision is tracked per packet; splitting a
//! fragmenting packet into a full RFC 8200 §4.5 fragment train is left to
//! the driver/sink, which sees each plan's committed size already.

use std::net::Ipv6Addr;

use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv6::MutableIpv6Packet;

use crate::constants::IPV6_HEADER_SIZE;
use crate::error::{FlowError, PacketOptionExt, Result};
use crate::plan::{Direction, LayerParams, PacketPlan};
use crate::rng;

use super::{FlowContext, PacketBuffer};

pub struct Ipv6Layer {
    pub position: usize,
    pub next_header: u8,
}

impl Ipv6Layer {
    pub fn plan_flow(&self, ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Ipv6 {
                src: ctx.initiator_ip.as_v6().unwrap_or(Ipv6Addr::UNSPECIFIED),
                dst: ctx.responder_ip.as_v6().unwrap_or(Ipv6Addr::UNSPECIFIED),
                fragment: false,
            });
        }
    }

    pub fn post_plan_flow(&self, ctx: &FlowContext, plans: &mut [PacketPlan]) {
        let initiator = ctx.initiator_ip.as_v6().unwrap_or(Ipv6Addr::UNSPECIFIED);
        let responder = ctx.responder_ip.as_v6().unwrap_or(Ipv6Addr::UNSPECIFIED);
        let frag = &ctx.fragmentation;

        for plan in plans.iter_mut() {
            let (src, dst) = match plan.direction {
                Direction::Forward => (initiator, responder),
                Direction::Reverse | Direction::Unknown => (responder, initiator),
            };
            let fragment = plan.size >= frag.min_packet_size_to_fragment
                && rng::random_double(0.0, 1.0) < frag.fragmentation_probability;
            plan.params[self.position] = LayerParams::Ipv6 { src, dst, fragment };
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        let (src, dst, _fragment) = match params {
            LayerParams::Ipv6 { src, dst, fragment } => (*src, *dst, *fragment),
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "ipv6",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        packet.mark_l3_start();
        let mut buf = vec![0u8; IPV6_HEADER_SIZE];
        {
            let mut header =
                MutableIpv6Packet::new(&mut buf).or_buffer_too_small("ipv6", "buffer too small for ipv6 header")?;
            header.set_version(6);
            header.set_traffic_class(0);
            header.set_flow_label(0);
            let payload_len = plan.size.saturating_sub(IPV6_HEADER_SIZE);
            header.set_payload_length(payload_len as u16);
            header.set_next_header(IpNextHeaderProtocol::new(self.next_header));
            header.set_hop_limit(64);
            header.set_source(src);
            header.set_destination(dst);
        }
        packet.push(&buf);
        Ok(())
    }
}
