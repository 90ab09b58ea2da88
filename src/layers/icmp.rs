//! ICMPv4 layers (RFC 792): echo request/reply, and the unreachable-style
//! structural-size variant picked by the ICMP selection heuristic (§4.3).

use pnet::packet::icmp::{self, IcmpCode, IcmpPacket, IcmpTypes, MutableIcmpPacket};
use pnet::packet::{MutablePacket, Packet};

use crate::constants::{ICMP_HEADER_SIZE, IPV4_HEADER_SIZE, UDP_HEADER_SIZE};
use crate::error::{FlowError, PacketOptionExt, Result};
use crate::plan::{Direction, LayerParams, PacketPlan};

use super::{FlowContext, PacketBuffer};

pub struct IcmpEchoLayer {
    pub position: usize,
    pub identifier: u16,
}

impl IcmpEchoLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::IcmpEcho {
                identifier: 0,
                sequence: 0,
            });
        }
    }

    pub fn post_plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for (i, plan) in plans.iter_mut().enumerate() {
            plan.params[self.position] = LayerParams::IcmpEcho {
                identifier: self.identifier,
                sequence: i as u16,
            };
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        let (identifier, sequence) = match params {
            LayerParams::IcmpEcho { identifier, sequence } => (*identifier, *sequence),
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "icmp_echo",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        let mut buf = vec![0u8; ICMP_HEADER_SIZE];
        {
            let mut header = MutableIcmpPacket::new(&mut buf)
                .or_buffer_too_small("icmp_echo", "buffer too small for icmp header")?;
            header.set_icmp_type(if plan.direction == Direction::Forward {
                IcmpTypes::EchoRequest
            } else {
                IcmpTypes::EchoReply
            });
            header.set_icmp_code(IcmpCode::new(0));
            header.set_checksum(0);
            // identifier/sequence occupy the 4 bytes following the 4-byte
            // type/code/checksum header, same layout as the payload slice.
            header.payload_mut()[0..2].copy_from_slice(&identifier.to_be_bytes());
            header.payload_mut()[2..4].copy_from_slice(&sequence.to_be_bytes());
        }
        packet.push(&buf);
        Ok(())
    }

    pub fn post_build(&self, packet: &mut PacketBuffer, _params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        finalize_icmp_checksum(packet, plan)
    }
}

/// Unreachable-style ICMP: a fixed structural size (§4.3), pinned during
/// `PlanFlow` for every packet when the heuristic selects this layer.
pub struct IcmpRandomLayer {
    pub position: usize,
}

impl IcmpRandomLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        let size = ICMP_HEADER_SIZE + IPV4_HEADER_SIZE + UDP_HEADER_SIZE;
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::IcmpRandom);
            plan.size = size;
            plan.is_finished = true;
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, _plan: &PacketPlan) -> Result<()> {
        if !matches!(params, LayerParams::IcmpRandom) {
            return Err(FlowError::BuildFailed {
                layer: "icmp_random",
                reason: "params variant mismatch".into(),
            });
        }

        let mut buf = vec![0u8; ICMP_HEADER_SIZE + IPV4_HEADER_SIZE + UDP_HEADER_SIZE];
        {
            let mut header = MutableIcmpPacket::new(&mut buf)
                .or_buffer_too_small("icmp_random", "buffer too small for icmp unreachable message")?;
            header.set_icmp_type(IcmpTypes::DestinationUnreachable);
            header.set_icmp_code(IcmpCode::new(1)); // host unreachable
            header.set_checksum(0);
            // The remaining 4 header bytes plus embedded IPv4+UDP headers
            // are synthesized: the wire format is correct even though no
            // real triggering datagram exists in a pull-based planner.
            let embedded = header.payload_mut();
            embedded[4] = (4 << 4) | 5; // version 4, IHL 5
            embedded[9] = 17; // protocol UDP
        }
        packet.push(&buf);
        Ok(())
    }

    pub fn post_build(&self, packet: &mut PacketBuffer, _params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        finalize_icmp_checksum(packet, plan)
    }
}

fn finalize_icmp_checksum(packet: &mut PacketBuffer, _plan: &PacketPlan) -> Result<()> {
    let start = packet.l3_start() + IPV4_HEADER_SIZE;
    let end = packet.l3_start() + packet.l3_total_len();

    let csum = {
        let segment = IcmpPacket::new(&packet.bytes[start..end])
            .or_buffer_too_small("icmp", "segment slice too small for checksum pass")?;
        icmp::checksum(&segment)
    };

    let mut segment = MutableIcmpPacket::new(&mut packet.bytes[start..end])
        .or_buffer_too_small("icmp", "segment slice too small for checksum write-back")?;
    segment.set_checksum(csum);
    Ok(())
}
