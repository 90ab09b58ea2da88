//! TCP layer (RFC 9293). Checksum is computed in `post_build`, once the
//! payload downstream has already been written into the shared buffer.

use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags};
use pnet::packet::Packet;

use crate::constants::TCP_HEADER_SIZE;
use crate::error::{FlowError, PacketOptionExt, Result};
use crate::plan::{Direction, LayerParams, PacketPlan};
use crate::rng;

use super::{ip_endpoints, FlowContext, PacketBuffer};

pub struct TcpLayer {
    pub position: usize,
}

impl TcpLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Tcp {
                src_port: 0,
                dst_port: 0,
                seq: 0,
                ack: 0,
            });
        }
    }

    pub fn post_plan_flow(&self, ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            let (src_port, dst_port) = match plan.direction {
                Direction::Forward => (ctx.initiator_port, ctx.responder_port),
                Direction::Reverse | Direction::Unknown => (ctx.responder_port, ctx.initiator_port),
            };
            plan.params[self.position] = LayerParams::Tcp {
                src_port,
                dst_port,
                seq: rng::random_uint(0, u32::MAX as u64) as u32,
                ack: rng::random_uint(0, u32::MAX as u64) as u32,
            };
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, _plan: &PacketPlan) -> Result<()> {
        let (src_port, dst_port, seq, ack) = match params {
            LayerParams::Tcp {
                src_port,
                dst_port,
                seq,
                ack,
            } => (*src_port, *dst_port, *seq, *ack),
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "tcp",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        let mut buf = vec![0u8; TCP_HEADER_SIZE];
        {
            let mut header =
                MutableTcpPacket::new(&mut buf).or_buffer_too_small("tcp", "buffer too small for tcp header")?;
            header.set_source(src_port);
            header.set_destination(dst_port);
            header.set_sequence(seq);
            header.set_acknowledgement(ack);
            header.set_data_offset((TCP_HEADER_SIZE / 4) as u8);
            header.set_flags(TcpFlags::ACK);
            header.set_window(64240);
            header.set_urgent_ptr(0);
        }
        packet.push(&buf);
        Ok(())
    }

    pub fn post_build(&self, packet: &mut PacketBuffer, _params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        let (src, dst) = ip_endpoints(plan).ok_or_else(|| FlowError::BuildFailed {
            layer: "tcp",
            reason: "no IPv4/IPv6 sibling layer found for checksum pseudo-header".into(),
        })?;

        let ip_header_len = match src {
            std::net::IpAddr::V4(_) => crate::constants::IPV4_HEADER_SIZE,
            std::net::IpAddr::V6(_) => crate::constants::IPV6_HEADER_SIZE,
        };
        let tcp_offset = packet.l3_start() + ip_header_len;
        let segment_end = packet.l3_start() + packet.l3_total_len();

        let checksum = {
            let mut segment = MutableTcpPacket::new(&mut packet.bytes[tcp_offset..segment_end])
                .or_buffer_too_small("tcp", "segment slice too small for checksum pass")?;
            match (src, dst) {
                (std::net::IpAddr::V4(s), std::net::IpAddr::V4(d)) => tcp::ipv4_checksum(&segment.to_immutable(), &s, &d),
                (std::net::IpAddr::V6(s), std::net::IpAddr::V6(d)) => tcp::ipv6_checksum(&segment.to_immutable(), &s, &d),
                _ => 0,
            }
        };

        let mut segment = MutableTcpPacket::new(&mut packet.bytes[tcp_offset..segment_end])
            .or_buffer_too_small("tcp", "segment slice too small for checksum write-back")?;
        segment.set_checksum(checksum);
        Ok(())
    }
}

