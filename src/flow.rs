//! Flow Planner (§4.5): owns a flow's layer stack and packet plans, and
//! drives the eight-step planning order end to end.

use std::collections::VecDeque;

use uuid::Uuid;

use crate::address::AddressGenerator;
use crate::config::Config;
use crate::constants::{ETHERTYPE_MPLS_UNICAST, ETHERTYPE_VLAN};
use crate::distributor::{IntervalInfo, PacketSizeDistributor};
use crate::error::{FlowError, Result};
use crate::layers::{
    encapsulation_to_layer, select_encapsulation, unreachable_size, EthernetLayer, FlowContext, IcmpEchoLayer,
    IcmpRandomLayer, Icmpv6EchoLayer, Icmpv6RandomLayer, Ipv4Layer, Ipv6Layer, Layer, PacketBuffer, PayloadLayer,
    TcpLayer, UdpLayer,
};
use crate::plan::{Direction, PacketPlan};
use crate::profile::{FlowProfile, L3Protocol, L4Protocol, Timestamp};
use crate::rng;

/// Default size distribution used when the driver doesn't supply its own:
/// a single wide interval spanning a typical Ethernet MTU range.
fn default_size_intervals() -> Vec<IntervalInfo> {
    vec![IntervalInfo::new(40.0, 1500.0, 1.0)]
}

/// A packet handed to the sink: bytes plus the metadata the PCAP writer
/// needs (§4.6, §6).
pub struct PacketExtra {
    pub bytes: Vec<u8>,
    pub direction: Direction,
    pub timestamp: Timestamp,
}

/// Owns one flow's layer stack and packet plans end to end.
pub struct Flow {
    pub id: Uuid,
    layers: Vec<Layer>,
    context: FlowContext,
    plans: VecDeque<PacketPlan>,
}

impl Flow {
    /// Builds the layer stack (§4.5 step 1) and allocates empty plans
    /// (step 2), but does not run the remaining planning steps; call
    /// [`Flow::plan`] for that.
    pub fn new(profile: FlowProfile, config: &Config, addresses: &mut AddressGenerator) -> Result<Self> {
        profile.validate()?;

        let fragmentation = match profile.l3 {
            L3Protocol::Ipv4 => config.ipv4.clone(),
            L3Protocol::Ipv6 => config.ipv6.clone(),
        };

        let mut layers = Vec::new();
        let mut next_ethertype = match profile.l3 {
            L3Protocol::Ipv4 => 0x0800,
            L3Protocol::Ipv6 => 0x86DD,
        };

        let encap_layers: Vec<Layer> = match select_encapsulation(&config.encapsulation) {
            Some(idx) => {
                let variant = &config.encapsulation[idx];
                variant
                    .layers
                    .iter()
                    .enumerate()
                    .map(|(i, l)| encapsulation_to_layer(*l, i + 1))
                    .collect()
            }
            None => Vec::new(),
        };

        if let Some(first) = encap_layers.first() {
            next_ethertype = match first {
                Layer::Vlan(_) => ETHERTYPE_VLAN,
                Layer::Mpls(_) => ETHERTYPE_MPLS_UNICAST,
                _ => next_ethertype,
            };
        }

        layers.push(Layer::Ethernet(EthernetLayer {
            position: 0,
            next_ethertype,
        }));

        // Re-number encapsulation layers by final position and chain their
        // next_ethertype to whatever follows (the next encap layer, or L3).
        let l3_ethertype = match profile.l3 {
            L3Protocol::Ipv4 => 0x0800u16,
            L3Protocol::Ipv6 => 0x86DD,
        };
        let mut position = layers.len();
        let num_encap_layers = encap_layers.len();
        for (i, layer) in encap_layers.into_iter().enumerate() {
            let is_last = i + 1 == num_encap_layers;
            let next = if is_last { l3_ethertype } else { ETHERTYPE_MPLS_UNICAST };
            layers.push(retag(layer, position, next));
            position += 1;
        }

        let l4_protocol_number: u8 = match profile.l4 {
            L4Protocol::Tcp => 6,
            L4Protocol::Udp => 17,
            L4Protocol::Icmp => 1,
            L4Protocol::Icmpv6 => 58,
        };

        match profile.l3 {
            L3Protocol::Ipv4 => layers.push(Layer::Ipv4(Ipv4Layer {
                position,
                protocol: l4_protocol_number,
            })),
            L3Protocol::Ipv6 => layers.push(Layer::Ipv6(Ipv6Layer {
                position,
                next_header: l4_protocol_number,
            })),
        }
        position += 1;

        match profile.l4 {
            L4Protocol::Tcp => layers.push(Layer::Tcp(TcpLayer { position })),
            L4Protocol::Udp => layers.push(Layer::Udp(UdpLayer { position })),
            L4Protocol::Icmp => {
                if use_unreachable_heuristic(&profile, L4Protocol::Icmp) {
                    layers.push(Layer::IcmpRandom(IcmpRandomLayer { position }));
                } else {
                    layers.push(Layer::IcmpEcho(IcmpEchoLayer {
                        position,
                        identifier: rng::random_uint(0, u16::MAX as u64) as u16,
                    }));
                }
            }
            L4Protocol::Icmpv6 => {
                if use_unreachable_heuristic(&profile, L4Protocol::Icmpv6) {
                    layers.push(Layer::Icmpv6Random(Icmpv6RandomLayer { position }));
                } else {
                    layers.push(Layer::Icmpv6Echo(Icmpv6EchoLayer {
                        position,
                        identifier: rng::random_uint(0, u16::MAX as u64) as u16,
                    }));
                }
            }
        }
        position += 1;

        if matches!(profile.l4, L4Protocol::Tcp | L4Protocol::Udp) {
            layers.push(Layer::Payload(PayloadLayer { position }));
        }

        let total_packets = profile.total_packets() as usize;
        let plans = (0..total_packets).map(|_| PacketPlan::new(profile.start)).collect();

        let context = FlowContext::new(profile, fragmentation, addresses);

        Ok(Self {
            id: Uuid::new_v4(),
            layers,
            context,
            plans,
        })
    }

    /// Runs planning steps 3 through 8. Idempotent in the sense that a
    /// second call simply re-plans from the freshly allocated state; the
    /// driver is expected to call this exactly once.
    pub fn plan(&mut self, size_intervals: Option<Vec<IntervalInfo>>) -> Result<()> {
        let intervals = size_intervals.unwrap_or_else(default_size_intervals);
        tracing::debug!(flow_id = %self.id, packets = self.plans.len(), "planning: starting PlanFlow");

        // Step 3: PlanFlow on every layer, in stack order.
        for layer in &self.layers {
            layer.plan_flow(&self.context, self.plans.make_contiguous());
        }

        // Step 4: direction assignment.
        tracing::debug!(flow_id = %self.id, "planning: assigning directions");
        self.assign_directions();

        // Step 5: size assignment via the Packet-Size Distributor.
        tracing::debug!(flow_id = %self.id, "planning: assigning sizes");
        self.assign_sizes(&intervals)?;

        // Step 6: PostPlanFlow on every layer, in stack order.
        tracing::debug!(flow_id = %self.id, "planning: starting PostPlanFlow");
        for layer in &self.layers {
            layer.post_plan_flow(&self.context, self.plans.make_contiguous());
        }

        // Step 7: PlanExtra on every layer, in stack order.
        for layer in &self.layers {
            layer.plan_extra(&self.context, self.plans.make_contiguous());
        }

        // Step 8: timestamp assignment.
        tracing::debug!(flow_id = %self.id, "planning: assigning timestamps");
        self.assign_timestamps();

        tracing::debug!(flow_id = %self.id, "planning: done");
        Ok(())
    }

    fn assign_directions(&mut self) {
        let profile = &self.context.profile;
        let pinned_fwd = self
            .plans
            .iter()
            .filter(|p| p.direction == Direction::Forward)
            .count();
        let pinned_rev = self
            .plans
            .iter()
            .filter(|p| p.direction == Direction::Reverse)
            .count();

        let available_fwd = (profile.forward_packets as usize).saturating_sub(pinned_fwd);
        let available_rev = (profile.reverse_packets as usize).saturating_sub(pinned_rev);

        let mut tokens: Vec<Direction> = Vec::with_capacity(available_fwd + available_rev);
        tokens.extend(std::iter::repeat(Direction::Forward).take(available_fwd));
        tokens.extend(std::iter::repeat(Direction::Reverse).take(available_rev));
        rng::shuffle_with_default_seed(&mut tokens);

        let mut tokens = tokens.into_iter();
        for plan in self.plans.iter_mut() {
            if plan.direction == Direction::Unknown {
                plan.direction = tokens.next().unwrap_or(Direction::Forward);
            }
        }
    }

    fn assign_sizes(&mut self, intervals: &[IntervalInfo]) -> Result<()> {
        let profile = &self.context.profile;
        let mut forward = PacketSizeDistributor::new(
            intervals.to_vec(),
            profile.forward_packets as usize,
            profile.forward_bytes as f64,
        );
        let mut reverse = PacketSizeDistributor::new(
            intervals.to_vec(),
            profile.reverse_packets as usize,
            profile.reverse_bytes as f64,
        );

        for plan in self.plans.iter() {
            if plan.is_finished {
                let distributor = match plan.direction {
                    Direction::Forward => &mut forward,
                    _ => &mut reverse,
                };
                distributor.get_value_exact(plan.size as f64);
            }
        }
        forward.plan_remaining();
        reverse.plan_remaining();

        for plan in self.plans.iter_mut() {
            if !plan.is_finished {
                let distributor = match plan.direction {
                    Direction::Forward => &mut forward,
                    _ => &mut reverse,
                };
                let drawn = distributor.get_value();
                plan.size = plan.size.max(drawn.round().max(0.0) as usize);
            }
        }

        Ok(())
    }

    fn assign_timestamps(&mut self) {
        let profile = &self.context.profile;
        let stamps = timestamps_for(self.plans.len(), profile.start, profile.end);
        for (plan, stamp) in self.plans.iter_mut().zip(stamps) {
            plan.timestamp = stamp;
        }
    }

    /// Pops the front plan, builds it, and returns the finished packet.
    /// Raises `NoMorePackets` once the plan list is drained.
    pub fn generate_next_packet(&mut self) -> Result<PacketExtra> {
        let plan = self.plans.pop_front().ok_or(FlowError::NoMorePackets)?;

        let mut packet = PacketBuffer::new(plan.size);
        for layer in &self.layers {
            let params = &plan.params[layer.position()];
            layer.build(&mut packet, params, &plan)?;
        }
        for layer in &self.layers {
            let params = &plan.params[layer.position()];
            layer.post_build(&mut packet, params, &plan)?;
        }

        Ok(PacketExtra {
            bytes: packet.bytes,
            direction: plan.direction,
            timestamp: plan.timestamp,
        })
    }

    pub fn has_next(&self) -> bool {
        !self.plans.is_empty()
    }
}

fn retag(layer: Layer, position: usize, next_ethertype: u16) -> Layer {
    match layer {
        Layer::Vlan(v) => Layer::Vlan(crate::layers::VlanLayer {
            position,
            id: v.id,
            next_ethertype,
        }),
        Layer::Mpls(m) => Layer::Mpls(crate::layers::MplsLayer { position, label: m.label }),
        other => other,
    }
}

/// ICMP selection heuristic (§4.3): pick the unreachable-style layer when
/// packet counts are small or skewed and the mean packet size is close to
/// the structural size; otherwise pick echo.
fn use_unreachable_heuristic(profile: &FlowProfile, l4: L4Protocol) -> bool {
    let pf = profile.forward_packets as f64;
    let pr = profile.reverse_packets as f64;
    let min_pr = pf.min(pr);
    let max_pr = pf.max(pr);
    let ratio_diff = if max_pr == 0.0 { 1.0 } else { 1.0 - min_pr / max_pr };

    let total_packets = profile.total_packets() as f64;
    let total_bytes = (profile.forward_bytes + profile.reverse_bytes) as f64;
    let bpp = if total_packets == 0.0 { 0.0 } else { total_bytes / total_packets };

    let s_unreach = unreachable_size(l4) as f64;
    let small_counts = profile.forward_packets <= 3 || profile.reverse_packets <= 3;

    let chosen = (small_counts && bpp <= 1.10 * s_unreach) || (ratio_diff > 0.2 && bpp <= 1.10 * s_unreach);
    tracing::debug!(
        ?l4,
        ratio_diff,
        bpp,
        s_unreach,
        chose_unreachable = chosen,
        "layer selection: icmp heuristic"
    );
    chosen
}

/// Timestamp-assignment step 8: `p <= 2` pins the endpoints directly;
/// otherwise every interior packet gets a boundary-aware draw and the whole
/// set is sorted, with `ts`/`te` pinned at the ends. Factored out of
/// [`Flow::assign_timestamps`] so it can be exercised without a full `Flow`.
fn timestamps_for(p: usize, ts: Timestamp, te: Timestamp) -> Vec<Timestamp> {
    if p <= 2 {
        return (0..p).map(|i| if i == 0 { ts } else { te }).collect();
    }

    let mut stamps: Vec<Timestamp> = Vec::with_capacity(p);
    for _ in 0..p - 2 {
        stamps.push(draw_boundary_timestamp(ts, te));
    }
    stamps.push(ts);
    stamps.push(te);
    stamps.sort();
    stamps
}

fn draw_boundary_timestamp(ts: Timestamp, te: Timestamp) -> Timestamp {
    let secs = rng::random_uint(ts.secs as u64, te.secs as u64) as i64;
    let micros = if secs == ts.secs {
        let hi = if ts.secs == te.secs { te.micros } else { 999_999 };
        rng::random_uint(ts.micros as u64, hi as u64) as u32
    } else if secs == te.secs {
        rng::random_uint(0, te.micros as u64) as u32
    } else {
        rng::random_uint(0, 999_999) as u32
    };
    Timestamp::new(secs, micros)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn two_or_fewer_packets_pin_the_endpoints_directly() {
        rng::init(1);
        let ts = Timestamp::new(5, 0);
        let te = Timestamp::new(9, 0);
        assert_eq!(timestamps_for(0, ts, te), vec![]);
        assert_eq!(timestamps_for(1, ts, te), vec![ts]);
        assert_eq!(timestamps_for(2, ts, te), vec![ts, te]);
    }

    proptest! {
        /// The timestamp-assignment ordering invariant: whatever `p`,
        /// `ts`, and `te` the profile supplies, the assigned stamps come
        /// out sorted and bounded by `[ts, te]`, with the endpoints
        /// themselves always present.
        #[test]
        fn timestamps_are_sorted_and_bounded(
            p in 2usize..100,
            span_secs in 0i64..10_000,
            seed in 1u32..u32::MAX,
        ) {
            rng::init(seed);
            let ts = Timestamp::new(1_000, 0);
            let te = Timestamp::new(1_000 + span_secs, 0);

            let stamps = timestamps_for(p, ts, te);
            prop_assert_eq!(stamps.len(), p);
            prop_assert_eq!(stamps[0], ts);
            prop_assert_eq!(*stamps.last().unwrap(), te);
            for pair in stamps.windows(2) {
                prop_assert!(pair[0] <= pair[1]);
            }
        }
    }
}
