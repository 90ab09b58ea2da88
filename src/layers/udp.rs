//! UDP layer (RFC 768).

use pnet::packet::udp::{self, MutableUdpPacket};
use pnet::packet::Packet;

use crate::constants::UDP_HEADER_SIZE;
use crate::error::{FlowError, PacketOptionExt, Result};
use crate::plan::{Direction, LayerParams, PacketPlan};

use super::{ip_endpoints, FlowContext, PacketBuffer};

pub struct UdpLayer {
    pub position: usize,
}

impl UdpLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Udp {
                src_port: 0,
                dst_port: 0,
            });
        }
    }

    pub fn post_plan_flow(&self, ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            let (src_port, dst_port) = match plan.direction {
                Direction::Forward => (ctx.initiator_port, ctx.responder_port),
                Direction::Reverse | Direction::Unknown => (ctx.responder_port, ctx.initiator_port),
            };
            plan.params[self.position] = LayerParams::Udp { src_port, dst_port };
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        let (src_port, dst_port) = match params {
            LayerParams::Udp { src_port, dst_port } => (*src_port, *dst_port),
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "udp",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        let ip_header_len = match ip_endpoints(plan) {
            Some((std::net::IpAddr::V4(_), _)) => crate::constants::IPV4_HEADER_SIZE,
            Some((std::net::IpAddr::V6(_), _)) => crate::constants::IPV6_HEADER_SIZE,
            None => crate::constants::IPV4_HEADER_SIZE,
        };
        let udp_len = packet.l3_total_len().saturating_sub(ip_header_len);
        let mut buf = vec![0u8; UDP_HEADER_SIZE];
        {
            let mut header =
                MutableUdpPacket::new(&mut buf).or_buffer_too_small("udp", "buffer too small for udp header")?;
            header.set_source(src_port);
            header.set_destination(dst_port);
            header.set_length(udp_len.max(UDP_HEADER_SIZE) as u16);
            header.set_checksum(0);
        }
        packet.push(&buf);
        Ok(())
    }

    pub fn post_build(&self, packet: &mut PacketBuffer, _params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        let (src, dst) = ip_endpoints(plan).ok_or_else(|| FlowError::BuildFailed {
            layer: "udp",
            reason: "no IPv4/IPv6 sibling layer found for checksum pseudo-header".into(),
        })?;

        let ip_header_len = match src {
            std::net::IpAddr::V4(_) => crate::constants::IPV4_HEADER_SIZE,
            std::net::IpAddr::V6(_) => crate::constants::IPV6_HEADER_SIZE,
        };
        let udp_offset = packet.l3_start() + ip_header_len;
        let segment_end = packet.l3_start() + packet.l3_total_len();

        let checksum = {
            let segment = MutableUdpPacket::new(&mut packet.bytes[udp_offset..segment_end])
                .or_buffer_too_small("udp", "segment slice too small for checksum pass")?;
            match (src, dst) {
                (std::net::IpAddr::V4(s), std::net::IpAddr::V4(d)) => udp::ipv4_checksum(&segment.to_immutable(), &s, &d),
                (std::net::IpAddr::V6(s), std::net::IpAddr::V6(d)) => udp::ipv6_checksum(&segment.to_immutable(), &s, &d),
                _ => 0,
            }
        };

        let mut segment = MutableUdpPacket::new(&mut packet.bytes[udp_offset..segment_end])
            .or_buffer_too_small("udp", "segment slice too small for checksum write-back")?;
        segment.set_checksum(checksum);
        Ok(())
    }
}
