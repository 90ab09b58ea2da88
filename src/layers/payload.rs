//! Payload layer: fills whatever bytes remain after the transport header,
//! present only when L4 is TCP or UDP (§4.5 step 1).

use crate::error::{FlowError, Result};
use crate::plan::{LayerParams, PacketPlan};
use crate::rng;

use super::{FlowContext, PacketBuffer};

pub struct PayloadLayer {
    pub position: usize,
}

impl PayloadLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Payload { len: 0 });
        }
    }

    pub fn post_plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            let header_total: usize = plan
                .params
                .iter()
                .map(|p| match p {
                    LayerParams::Ipv4 { .. } => crate::constants::IPV4_HEADER_SIZE,
                    LayerParams::Ipv6 { .. } => crate::constants::IPV6_HEADER_SIZE,
                    LayerParams::Tcp { .. } => crate::constants::TCP_HEADER_SIZE,
                    LayerParams::Udp { .. } => crate::constants::UDP_HEADER_SIZE,
                    _ => 0,
                })
                .sum();
            let len = plan.size.saturating_sub(header_total);
            plan.params[self.position] = LayerParams::Payload { len };
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, _plan: &PacketPlan) -> Result<()> {
        let len = match params {
            LayerParams::Payload { len } => *len,
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "payload",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        let bytes: Vec<u8> = (0..len).map(|_| rng::random_uint(0, 255) as u8).collect();
        packet.push(&bytes);
        Ok(())
    }
}
