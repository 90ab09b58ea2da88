//! IPv4 layer (RFC 791), with per-family fragmentation knobs from config.

use std::net::Ipv4Addr;

use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::{checksum, Ipv4Flags, MutableIpv4Packet};

use crate::constants::IPV4_HEADER_SIZE;
use crate::error::{FlowError, PacketOptionExt, Result};
use crate::plan::{Direction, LayerParams, PacketPlan};
use crate::rng;

use super::{FlowContext, PacketBuffer};

pub struct Ipv4Layer {
    pub position: usize,
    pub protocol: u8,
}

impl Ipv4Layer {
    pub fn plan_flow(&self, ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Ipv4 {
                src: ctx.initiator_ip.as_v4().unwrap_or(Ipv4Addr::UNSPECIFIED),
                dst: ctx.responder_ip.as_v4().unwrap_or(Ipv4Addr::UNSPECIFIED),
                fragment: false,
            });
        }
    }

    pub fn post_plan_flow(&self, ctx: &FlowContext, plans: &mut [PacketPlan]) {
        let initiator = ctx.initiator_ip.as_v4().unwrap_or(Ipv4Addr::UNSPECIFIED);
        let responder = ctx.responder_ip.as_v4().unwrap_or(Ipv4Addr::UNSPECIFIED);
        let frag = &ctx.fragmentation;

        for plan in plans.iter_mut() {
            let (src, dst) = match plan.direction {
                Direction::Forward => (initiator, responder),
                Direction::Reverse | Direction::Unknown => (responder, initiator),
            };
            let fragment = plan.size >= frag.min_packet_size_to_fragment
                && rng::random_double(0.0, 1.0) < frag.fragmentation_probability;
            plan.params[self.position] = LayerParams::Ipv4 { src, dst, fragment };
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        let (src, dst, fragment) = match params {
            LayerParams::Ipv4 { src, dst, fragment } => (*src, *dst, *fragment),
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "ipv4",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        packet.mark_l3_start();
        let mut buf = vec![0u8; IPV4_HEADER_SIZE];
        {
            let mut header =
                MutableIpv4Packet::new(&mut buf).or_buffer_too_small("ipv4", "buffer too small for ipv4 header")?;
            header.set_version(4);
            header.set_header_length((IPV4_HEADER_SIZE / 4) as u8);
            header.set_total_length(plan.size as u16);
            header.set_ttl(64);
            header.set_next_level_protocol(IpNextHeaderProtocol::new(self.protocol));
            header.set_source(src);
            header.set_destination(dst);
            header.set_identification(rng::random_uint(0, u16::MAX as u64) as u16);
            if fragment {
                header.set_flags(Ipv4Flags::MoreFragments);
            } else {
                header.set_flags(Ipv4Flags::DontFragment);
            }
            header.set_fragment_offset(0);
            let csum = checksum(&header.to_immutable());
            header.set_checksum(csum);
        }
        packet.push(&buf);
        Ok(())
    }
}
