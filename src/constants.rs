//! Wire-format size constants shared across layers.

pub const ETHERNET_HEADER_SIZE: usize = 14;
pub const VLAN_TAG_SIZE: usize = 4;
pub const MPLS_LABEL_SIZE: usize = 4;
pub const IPV4_HEADER_SIZE: usize = 20;
pub const IPV6_HEADER_SIZE: usize = 40;
pub const TCP_HEADER_SIZE: usize = 20;
pub const UDP_HEADER_SIZE: usize = 8;
pub const ICMP_HEADER_SIZE: usize = 8;
pub const ICMPV6_HEADER_SIZE: usize = 8;
pub const ICMPV6_UNREACH_RESERVED: usize = 4;

/// EtherType 0x8100 (802.1Q VLAN).
pub const ETHERTYPE_VLAN: u16 = 0x8100;
/// EtherType 0x8847 (MPLS unicast).
pub const ETHERTYPE_MPLS_UNICAST: u16 = 0x8847;
/// EtherType 0x8848 (MPLS multicast).
pub const ETHERTYPE_MPLS_MULTICAST: u16 = 0x8848;

/// Packet-size distributor's refinement attempt cap (§4.4).
pub const DISTRIBUTOR_MAX_ATTEMPTS: usize = 2000;
/// Width of the reservation window scanned by `GetValueExact` (§4.4).
pub const DISTRIBUTOR_EXACT_WINDOW: usize = 1000;
/// Relative-error threshold beyond which the distributor gives up and falls
/// back to the degenerate uniform fill (§4.4 step 4, §9 open question).
pub const DISTRIBUTOR_FALLBACK_THRESHOLD: f64 = 0.2;

/// Lehmer/MINSTD multiplier used by the address generators (§4.2).
pub const LEHMER_MULTIPLIER: u64 = 48_271;
/// Lehmer/MINSTD modulus (2^31 - 1, a Mersenne prime).
pub const LEHMER_MODULUS: u64 = 2_147_483_647;
/// Draws available from one Lehmer stream before it must reseed.
pub const LEHMER_PERIOD: u64 = LEHMER_MODULUS - 1;

/// S_unreach for IPv4: the fixed structural size of an ICMP unreachable-style
/// error packet's L3+ payload (ICMP header + embedded IPv4 header + embedded
/// UDP header).
pub const fn icmp_unreach_size_v4() -> usize {
    ICMP_HEADER_SIZE + IPV4_HEADER_SIZE + UDP_HEADER_SIZE
}

/// S_unreach for IPv6: ICMPv6 header + 4 reserved bytes + embedded IPv6
/// header + embedded UDP header.
pub const fn icmp_unreach_size_v6() -> usize {
    ICMPV6_HEADER_SIZE + ICMPV6_UNREACH_RESERVED + IPV6_HEADER_SIZE + UDP_HEADER_SIZE
}
