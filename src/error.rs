//! Centralized error handling for flowforge.
//!
//! Mirrors the taxonomy in the spec's error-handling design: each fatal
//! condition the planner can hit gets its own variant rather than a bag of
//! strings, so callers can match on *what* went wrong.

use std::fmt;

/// Crate-wide error type.
#[derive(Debug)]
pub enum FlowError {
    /// Profile names an L3 or L4 value the core does not implement.
    UnknownProtocol(String),
    /// ICMP paired with non-IPv4 L3, or ICMPv6 paired with non-IPv6 L3.
    ProtocolMismatch { l4: String, l3: String },
    /// Address generator seed outside `[1, 2^31-2]`.
    InvalidSeed(u32),
    /// Malformed configuration (unknown encapsulation variant, packet-size
    /// interval below the L2 header size, out-of-range probability, ...).
    InvalidConfig(String),
    /// `GenerateNextPacket` called after the flow's plan list was drained.
    NoMorePackets,
    /// A layer's `Build`/`PostBuild` hook failed to construct its header.
    BuildFailed { layer: &'static str, reason: String },
}

impl fmt::Display for FlowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlowError::UnknownProtocol(proto) => write!(f, "unknown protocol: {}", proto),
            FlowError::ProtocolMismatch { l4, l3 } => {
                write!(f, "{} is not valid over {}", l4, l3)
            }
            FlowError::InvalidSeed(seed) => {
                write!(f, "address generator seed {} is outside [1, 2^31-2]", seed)
            }
            FlowError::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
            FlowError::NoMorePackets => write!(f, "GenerateNextPacket called after drain"),
            FlowError::BuildFailed { layer, reason } => {
                write!(f, "failed to build {} layer: {}", layer, reason)
            }
        }
    }
}

impl std::error::Error for FlowError {}

/// Type alias for Results used throughout the crate.
pub type Result<T> = std::result::Result<T, FlowError>;

/// Raised when a `pnet` packet constructor rejects an undersized buffer.
/// Bridged into [`FlowError::BuildFailed`] via `From`, so a layer can use
/// `?` instead of writing the conversion out at every call site.
#[derive(Debug)]
pub struct BufferTooSmall {
    pub layer: &'static str,
    pub reason: &'static str,
}

impl From<BufferTooSmall> for FlowError {
    fn from(e: BufferTooSmall) -> Self {
        FlowError::BuildFailed {
            layer: e.layer,
            reason: e.reason.to_string(),
        }
    }
}

/// Turns the `Option<T>` a `pnet` `Mutable*Packet::new`/`*Packet::new` call
/// returns into a [`BufferTooSmall`], which converts into [`FlowError`] via
/// `?`.
pub trait PacketOptionExt<T> {
    fn or_buffer_too_small(self, layer: &'static str, reason: &'static str) -> std::result::Result<T, BufferTooSmall>;
}

impl<T> PacketOptionExt<T> for Option<T> {
    fn or_buffer_too_small(self, layer: &'static str, reason: &'static str) -> std::result::Result<T, BufferTooSmall> {
        self.ok_or(BufferTooSmall { layer, reason })
    }
}
