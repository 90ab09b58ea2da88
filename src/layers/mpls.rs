//! MPLS shim header. Hand-rolled: pnet has no MPLS packet type, so this
//! writes the 4-byte label/exp/S/TTL word directly per RFC 3032.

use crate::error::{FlowError, Result};
use crate::plan::{LayerParams, PacketPlan};

use super::{FlowContext, PacketBuffer};

pub struct MplsLayer {
    pub position: usize,
    pub label: u32,
}

impl MplsLayer {
    pub fn plan_flow(&self, _ctx: &FlowContext, plans: &mut [PacketPlan]) {
        for plan in plans.iter_mut() {
            plan.params.push(LayerParams::Mpls { label: self.label });
        }
    }

    pub fn build(&self, packet: &mut PacketBuffer, params: &LayerParams, _plan: &PacketPlan) -> Result<()> {
        let label = match params {
            LayerParams::Mpls { label } => *label,
            _ => {
                return Err(FlowError::BuildFailed {
                    layer: "mpls",
                    reason: "params variant mismatch".into(),
                })
            }
        };

        // 20 bits label | 3 bits exp | 1 bit bottom-of-stack | 8 bits TTL.
        // This shim is always the innermost label, so S=1.
        let word: u32 = ((label & 0x000F_FFFF) << 12) | (1 << 8) | 64;
        packet.push(&word.to_be_bytes());
        Ok(())
    }
}
