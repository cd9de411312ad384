//! Scene loading, parsing, and validation logic.
//!
//! Contains all configuration structures for a simulation scene and the
//! functions for loading and validating them. Every component takes its
//! parameters from these explicit structs; there is no process-wide default
//! or attribute table. Validation happens at load time, before any simulated
//! time advances, and every error names the offending field.

use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;

use crate::signal_calculations::bit_rate_for_mode;

/// Error type for scene loading failures.
#[derive(Debug)]
pub enum SceneLoadError {
    FileReadError(String),
    ParseError(String),
    ValidationError(String),
}

impl std::fmt::Display for SceneLoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SceneLoadError::FileReadError(msg) => write!(f, "Failed to read file: {}", msg),
            SceneLoadError::ParseError(msg) => write!(f, "Failed to parse JSON: {}", msg),
            SceneLoadError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for SceneLoadError {}

/// Simple 2D point in meters.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Directional antenna configuration.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct AntennaConfig {
    /// Boresight bearing in degrees, counter-clockwise from the +x axis.
    pub orientation_degrees: f64,
    /// Full beamwidth in degrees; no reception outside +/- half of it.
    pub beamwidth_degrees: f64,
}

/// Physical-layer configuration shared by all nodes.
#[derive(Debug, Deserialize, Clone)]
pub struct PhyConfig {
    /// Constant-rate PHY mode name, e.g. "ErpOfdmRate54Mbps".
    pub phy_mode: String,
    /// Transmit power at the antenna port in dBm.
    pub tx_power_dbm: f64,
    /// Receiver sensitivity in dBm; weaker frames are dropped.
    #[serde(default = "default_rx_sensitivity")]
    pub rx_sensitivity_dbm: f64,
}

fn default_rx_sensitivity() -> f64 {
    -97.0
}

/// Propagation model selection, as a tagged enum so scenes pick exactly one.
#[derive(Debug, Deserialize, Clone)]
#[serde(tag = "model")]
pub enum PropagationConfig {
    /// Received power pinned to a fixed dBm value regardless of node
    /// positions and transmit power. The antenna pattern still applies.
    #[serde(rename = "fixed-rss")]
    FixedRss { rss_dbm: f64 },
    /// Log-distance path loss with optional log-normal shadowing.
    #[serde(rename = "log-distance")]
    LogDistance {
        /// Reference distance d0 in meters.
        reference_distance: f64,
        /// Path loss exponent (n). 2.0 for free space, 2.7-3.5 for urban.
        path_loss_exponent: f64,
        /// Path loss at the reference distance in dB.
        path_loss_at_reference_distance: f64,
        /// Standard deviation for log-normal shadowing in dB. 0 disables it
        /// and makes the model fully deterministic.
        #[serde(default)]
        shadowing_sigma: f64,
        /// Seed for the shadowing sampler, so runs are reproducible.
        #[serde(default)]
        shadowing_seed: u64,
    },
}

/// A node: identity, position, antenna, and the logical channel it sits on.
#[derive(Debug, Deserialize, Clone)]
pub struct NodeConfig {
    pub node_id: u32,
    pub position: Point,
    pub antenna: AntennaConfig,
    /// Logical channel number. Channels are opaque partition keys: nodes on
    /// different channels neither hear nor interfere with each other.
    #[serde(default = "default_channel")]
    pub channel: u8,
}

fn default_channel() -> u8 {
    1
}

/// One datagram stream between a source and a destination node.
#[derive(Debug, Deserialize, Clone)]
pub struct FlowConfig {
    pub source: u32,
    pub destination: u32,
    /// Application payload bytes per packet.
    pub packet_size: usize,
    /// Number of packets to send; omit for an unbounded source that runs
    /// until the simulation stops.
    #[serde(default)]
    pub num_packets: Option<u32>,
    /// Seconds between consecutive packets.
    pub interval: f64,
    /// Simulated time of the first packet.
    #[serde(default = "default_flow_start")]
    pub start_time: f64,
}

fn default_flow_start() -> f64 {
    1.0
}

/// Root structure representing the entire scene.
#[derive(Debug, Deserialize, Clone)]
pub struct Scene {
    /// Total simulated time in seconds.
    pub simulation_duration: f64,
    pub phy: PhyConfig,
    pub propagation: PropagationConfig,
    pub nodes: Vec<NodeConfig>,
    pub flows: Vec<FlowConfig>,
}

/// Load and parse a scene from a JSON file.
///
/// # Parameters
///
/// * `path` - Path to the scene JSON file
///
/// # Returns
///
/// Parsed and validated Scene or an error.
pub fn load_scene(path: &str) -> Result<Scene, SceneLoadError> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read file: {}", path))
        .map_err(|e| SceneLoadError::FileReadError(e.to_string()))?;

    let scene: Scene = serde_json::from_str(&data)
        .context("Invalid JSON format")
        .map_err(|e| SceneLoadError::ParseError(e.to_string()))?;

    validate_scene(&scene).map_err(SceneLoadError::ValidationError)?;

    Ok(scene)
}

/// Validate a scene configuration.
///
/// Returns `Ok(())` if validation passes, `Err(String)` naming the offending
/// field otherwise.
pub fn validate_scene(scene: &Scene) -> Result<(), String> {
    const MAX_NODES: usize = 10000;
    const MIN_TX_POWER: f64 = -50.0;
    const MAX_TX_POWER: f64 = 50.0;
    // Frames above this would need fragmentation, which is not modeled.
    const MAX_PACKET_SIZE: usize = 2200;

    if !(scene.simulation_duration.is_finite() && scene.simulation_duration > 0.0) {
        return Err(format!(
            "simulation_duration {} must be a positive number of seconds",
            scene.simulation_duration
        ));
    }

    if bit_rate_for_mode(&scene.phy.phy_mode).is_none() {
        return Err(format!("Unknown phy_mode \"{}\"", scene.phy.phy_mode));
    }
    if scene.phy.tx_power_dbm < MIN_TX_POWER || scene.phy.tx_power_dbm > MAX_TX_POWER {
        return Err(format!(
            "tx_power_dbm {} outside realistic range ({} to {} dBm)",
            scene.phy.tx_power_dbm, MIN_TX_POWER, MAX_TX_POWER
        ));
    }
    if !scene.phy.rx_sensitivity_dbm.is_finite() {
        return Err(format!(
            "rx_sensitivity_dbm {} must be finite",
            scene.phy.rx_sensitivity_dbm
        ));
    }

    match &scene.propagation {
        PropagationConfig::FixedRss { rss_dbm } => {
            if !rss_dbm.is_finite() {
                return Err(format!("fixed-rss rss_dbm {} must be finite", rss_dbm));
            }
        }
        PropagationConfig::LogDistance {
            reference_distance,
            path_loss_exponent,
            path_loss_at_reference_distance,
            shadowing_sigma,
            ..
        } => {
            if !(*reference_distance > 0.0) {
                return Err(format!(
                    "log-distance reference_distance {} must be positive",
                    reference_distance
                ));
            }
            if !(*path_loss_exponent > 0.0) {
                return Err(format!(
                    "log-distance path_loss_exponent {} must be positive",
                    path_loss_exponent
                ));
            }
            if !path_loss_at_reference_distance.is_finite() {
                return Err(format!(
                    "log-distance path_loss_at_reference_distance {} must be finite",
                    path_loss_at_reference_distance
                ));
            }
            if !(shadowing_sigma.is_finite() && *shadowing_sigma >= 0.0) {
                return Err(format!(
                    "log-distance shadowing_sigma {} must be finite and non-negative",
                    shadowing_sigma
                ));
            }
        }
    }

    if scene.nodes.is_empty() {
        return Err("Scene must contain at least one node".to_string());
    }
    if scene.nodes.len() > MAX_NODES {
        return Err(format!(
            "Node count {} exceeds maximum of {}",
            scene.nodes.len(),
            MAX_NODES
        ));
    }

    let mut node_ids = HashSet::new();
    for node in &scene.nodes {
        if !node_ids.insert(node.node_id) {
            return Err(format!("Duplicate node_id found: {}", node.node_id));
        }
        if !(node.position.x.is_finite() && node.position.y.is_finite()) {
            return Err(format!(
                "Node {} position ({}, {}) must be finite",
                node.node_id, node.position.x, node.position.y
            ));
        }
        if !node.antenna.orientation_degrees.is_finite() {
            return Err(format!(
                "Node {} antenna orientation_degrees {} must be finite",
                node.node_id, node.antenna.orientation_degrees
            ));
        }
        if !(node.antenna.beamwidth_degrees > 0.0 && node.antenna.beamwidth_degrees <= 360.0) {
            return Err(format!(
                "Node {} antenna beamwidth_degrees {} outside valid range (0, 360]",
                node.node_id, node.antenna.beamwidth_degrees
            ));
        }
    }

    for (idx, flow) in scene.flows.iter().enumerate() {
        if !node_ids.contains(&flow.source) {
            return Err(format!("Flow {} source {} is not a known node", idx, flow.source));
        }
        if !node_ids.contains(&flow.destination) {
            return Err(format!(
                "Flow {} destination {} is not a known node",
                idx, flow.destination
            ));
        }
        if flow.source == flow.destination {
            return Err(format!(
                "Flow {} source and destination are both node {}",
                idx, flow.source
            ));
        }
        if flow.packet_size == 0 || flow.packet_size > MAX_PACKET_SIZE {
            return Err(format!(
                "Flow {} packet_size {} outside valid range (1 to {} bytes)",
                idx, flow.packet_size, MAX_PACKET_SIZE
            ));
        }
        if !(flow.interval.is_finite() && flow.interval > 0.0) {
            return Err(format!(
                "Flow {} interval {} must be a positive number of seconds",
                idx, flow.interval
            ));
        }
        if !(flow.start_time.is_finite() && flow.start_time >= 0.0) {
            return Err(format!(
                "Flow {} start_time {} must be non-negative",
                idx, flow.start_time
            ));
        }
    }

    Ok(())
}
