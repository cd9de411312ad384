//! Discrete-event simulation core for a small adhoc 802.11 link.
//!
//! Models a handful of fixed nodes with directional antennas exchanging
//! datagram traffic over a configurable-loss channel. It integrates:
//! - Scene loading and validation
//! - A virtual-time event scheduler
//! - Propagation and antenna-pattern delivery decisions
//! - A per-node MAC transmit state machine
//! - Traffic sources, sinks, and per-flow statistics
//!
//! ## Module Organization
//!
//! - `scheduler`: time-ordered event queue driving simulated time
//! - `signal_calculations`: path loss, antenna gain, and frame timings
//! - `scene`: configuration structures, loading, and validation
//! - `channel`: per-channel propagation model and delivery outcomes
//! - `mac`: per-node transmit state machine
//! - `traffic`: packet sources and delivery sinks
//! - `stats`: flow statistics and the end-of-run report
//! - `simulation`: the driver wiring everything together
//!
//! ## Public API
//!
//! The main entry points are [`scene::load_scene`] and
//! [`simulation::Simulation`]: load a scene, build a simulation from it,
//! call [`simulation::Simulation::run`], and print the returned reports.

pub mod channel;
pub mod mac;
pub mod scene;
pub mod scheduler;
mod signal_calculations;
pub mod simulation;
pub mod stats;
pub mod traffic;

pub use simulation::Simulation;
pub use stats::{FlowKey, FlowReport};
