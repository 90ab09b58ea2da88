//! Deterministic synthetic network-flow packet planner and builder.
//!
//! Given a [`profile::FlowProfile`] (packet/byte counts per direction, a
//! time window, and protocol tags) and a [`config::Config`], [`flow::Flow`]
//! plans a byte-identical-on-replay sequence of packets satisfying the
//! profile's statistical constraints, then builds each one's wire bytes on
//! demand.
//!
//! Reproducibility rests on two independent seeded streams: the shared
//! [`rng`] instance everything except address generation draws from, and
//! each run's dedicated [`address::AddressGenerator`].

pub mod address;
pub mod config;
pub mod constants;
pub mod distributor;
pub mod error;
pub mod flow;
pub mod layers;
pub mod plan;
pub mod profile;
pub mod rng;

pub use config::Config;
pub use error::{FlowError, Result};
pub use flow::{Flow, PacketExtra};
pub use profile::FlowProfile;
