//! ICMPv6 layers (RFC 4443): echo request/reply, and the unreachable-style
//! structural-size variant. Mirrors `icmp.rs`; kept separate because the
//! v6 unreachable message reserves 4 extra bytes and the checksum needs a
//! full IPv6 pseudo-header.

use pnet::packet::icmpv6::{self, Icmpv6Code, Icmpv6Packet, Icmpv6Type, MutableIcmpv6Packet};
use pnet::packet::{MutablePacket, Packet};

use crate::constants::{ICMPV6_HEADER_SIZE, ICMPV6_UNREACH_RESERVED, IPV6_HEADER_SIZE, UDP_HEADER_SIZE};
use crate::error::{FlowError, PacketOptionExt, Result};
use crate::plan::{Direction, LayerParams, PacketPlan};

use super::{ip_endpoints, FlowContext, PacketBuffer};

const ICMPV6_ECHO_REQUEST: u8 = 128;
const ICMPV6_ECHO_REPLY: u8 = 129;
const ICMPV6_DEST_UNREACHABLE: u8 = 1;

pub struct Icmpv6EchoLayer {
    pub position: usize,
    pub identifier: u16,
}

impl Icmpv6EchoLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Icmpv6Echo {
                identifier: 0,
                sequence: 0,
            });
        }
    }

    pub fn post_plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for (i, plan) in plans.iter_mut().enumerate() {
            plan.params[self.position] = LayerParams::Icmpv6Echo {
                identifier: self.identifier,
                sequence: i as u16,
            };
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        let (identifier, sequence) = match params {
            LayerParams::Icmpv6Echo { identifier, sequence } => (*identifier, *sequence),
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "icmpv6_echo",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        let mut buf = vec![0u8; ICMPV6_HEADER_SIZE];
        {
            let mut header = MutableIcmpv6Packet::new(&mut buf)
                .or_buffer_too_small("icmpv6_echo", "buffer too small for icmpv6 header")?;
            header.set_icmpv6_type(Icmpv6Type::new(if plan.direction == Direction::Forward {
                ICMPV6_ECHO_REQUEST
            } else {
                ICMPV6_ECHO_REPLY
            }));
            header.set_icmpv6_code(Icmpv6Code::new(0));
            header.set_checksum(0);
            header.payload_mut()[0..2].copy_from_slice(&identifier.to_be_bytes());
            header.payload_mut()[2..4].copy_from_slice(&sequence.to_be_bytes());
        }
        packet.push(&buf);
        Ok(())
    }

    pub fn post_build(&self, packet: &mut PacketBuffer, _params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        finalize_icmpv6_checksum(packet, plan)
    }
}

/// Unreachable-style ICMPv6: fixed structural size, pinned during
/// `PlanFlow`. The reference layout reserves 4 bytes after the 8-byte
/// type/code/checksum/unused header before the embedded IPv6+UDP headers.
pub struct Icmpv6RandomLayer {
    pub position: usize,
}

impl Icmpv6RandomLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        let size = ICMPV6_HEADER_SIZE + ICMPV6_UNREACH_RESERVED + IPV6_HEADER_SIZE + UDP_HEADER_SIZE;
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Icmpv6Random);
            plan.size = size;
            plan.is_finished = true;
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, _plan: &PacketPlan) -> Result<()> {
        if !matches!(params, LayerParams::Icmpv6Random) {
            return Err(FlowError::BuildFailed {
                layer: "icmpv6_random",
                reason: "params variant mismatch".into(),
            });
        }

        let total = ICMPV6_HEADER_SIZE + ICMPV6_UNREACH_RESERVED + IPV6_HEADER_SIZE + UDP_HEADER_SIZE;
        let mut buf = vec![0u8; total];
        {
            let mut header = MutableIcmpv6Packet::new(&mut buf)
                .or_buffer_too_small("icmpv6_random", "buffer too small for icmpv6 unreachable message")?;
            header.set_icmpv6_type(Icmpv6Type::new(ICMPV6_DEST_UNREACHABLE));
            header.set_icmpv6_code(Icmpv6Code::new(4)); // port unreachable
            header.set_checksum(0);
            let embedded = header.payload_mut();
            // embedded[0..4] is the reserved word; the synthesized IPv6
            // header starts at byte 4.
            embedded[4] = 0x60; // version 6
            embedded[10] = 17; // next header: UDP
        }
        packet.push(&buf);
        Ok(())
    }

    pub fn post_build(&self, packet: &mut PacketBuffer, _params: &LayerParams, plan: &PacketPlan) -> Result<()> {
        finalize_icmpv6_checksum(packet, plan)
    }
}

fn finalize_icmpv6_checksum(packet: &mut PacketBuffer, plan: &PacketPlan) -> Result<()> {
    let (src, dst) = ip_endpoints(plan).ok_or_else(|| FlowError::BuildFailed {
        layer: "icmpv6",
        reason: "no IPv6 sibling layer found for checksum pseudo-header".into(),
    })?;

    let start = packet.l3_start() + IPV6_HEADER_SIZE;
    let end = packet.l3_start() + packet.l3_total_len();

    let csum = {
        let segment = Icmpv6Packet::new(&packet.bytes[start..end])
            .or_buffer_too_small("icmpv6", "segment slice too small for checksum pass")?;
        match (src, dst) {
            (std::net::IpAddr::V6(s), std::net::IpAddr::V6(d)) => icmpv6::checksum(&segment, &s, &d),
            _ => 0,
        }
    };

    let mut segment = MutableIcmpv6Packet::new(&mut packet.bytes[start..end])
        .or_buffer_too_small("icmpv6", "segment slice too small for checksum write-back")?;
    segment.set_checksum(csum);
    Ok(())
}
