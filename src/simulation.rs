//! Simulation driver: builds the runtime world from a validated scene and
//! dispatches events until the configured stop time.
//!
//! Data flow per packet: a traffic source firing asks the sender's MAC for a
//! transmission slot, the channel model decides the outcome at every
//! same-channel receiver, and successful frames arrive at their sinks one
//! airtime plus propagation delay later. Statistics accumulate in the flow
//! monitor and are read once at the end of the run.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info, warn};

use crate::channel::{ChannelModel, DeliveryOutcome, DropReason, RadioEndpoint};
use crate::mac::{MacError, MacLayer};
use crate::scene::{Scene, SceneLoadError, validate_scene};
use crate::scheduler::EventScheduler;
use crate::signal_calculations::{bit_rate_for_mode, distance, propagation_delay};
use crate::stats::{FlowKey, FlowMonitor, FlowReport, PacketDrop};
use crate::traffic::{Packet, PacketSink, TrafficSource};

enum SimEvent {
    /// A traffic source fires: emit one packet or close the flow.
    TrafficFire { flow: usize },
    /// A node's outstanding transmission ended.
    TxComplete { node: u32 },
    /// A node's interframe space elapsed.
    MacReady { node: u32 },
    /// A frame finished arriving at a receiver.
    Deliver {
        node: u32,
        packet: Packet,
        rss_dbm: f64,
        airtime: f64,
    },
}

struct SimNode {
    endpoint: RadioEndpoint,
    channel: u8,
    mac: MacLayer,
    sink: PacketSink,
    /// End of this node's own current transmission; the radio is deaf while
    /// it lasts.
    tx_until: f64,
    /// End of the reception window claimed by the frame currently arriving.
    /// Claimed when the frame goes on the air, so a later frame starting
    /// anywhere inside the window is lost and the earlier frame survives.
    rx_until: f64,
}

struct World {
    nodes: BTreeMap<u32, SimNode>,
    /// One isolated channel model per logical channel number in use.
    channels: HashMap<u8, ChannelModel>,
    sources: Vec<TrafficSource>,
    monitor: FlowMonitor,
    tx_power_dbm: f64,
}

/// A fully built simulation, ready to run once.
pub struct Simulation {
    world: World,
    scheduler: EventScheduler<SimEvent>,
    stop_time: f64,
}

impl Simulation {
    /// Build the runtime world from a scene. The scene is validated again
    /// here so a `Simulation` can never be constructed from a configuration
    /// that would fail at startup.
    pub fn from_scene(scene: &Scene) -> Result<Self, SceneLoadError> {
        validate_scene(scene).map_err(SceneLoadError::ValidationError)?;

        let bit_rate = bit_rate_for_mode(&scene.phy.phy_mode)
            .ok_or_else(|| SceneLoadError::ValidationError(format!(
                "Unknown phy_mode \"{}\"",
                scene.phy.phy_mode
            )))?;

        let mut nodes = BTreeMap::new();
        let mut channels = HashMap::new();
        for node in &scene.nodes {
            channels
                .entry(node.channel)
                .or_insert_with(|| ChannelModel::new(&scene.propagation, scene.phy.rx_sensitivity_dbm));
            nodes.insert(
                node.node_id,
                SimNode {
                    endpoint: RadioEndpoint {
                        position: node.position,
                        antenna: node.antenna,
                    },
                    channel: node.channel,
                    mac: MacLayer::new(bit_rate),
                    sink: PacketSink::new(node.node_id),
                    tx_until: 0.0,
                    rx_until: 0.0,
                },
            );
        }

        let mut scheduler = EventScheduler::new();
        let mut sources = Vec::with_capacity(scene.flows.len());
        let mut monitor = FlowMonitor::new();
        for (idx, flow) in scene.flows.iter().enumerate() {
            let key = FlowKey {
                src: flow.source,
                dst: flow.destination,
            };
            // Configured flows show up in the report even when they never
            // send a byte.
            monitor.register(key);
            let src_channel = nodes[&flow.source].channel;
            let dst_channel = nodes[&flow.destination].channel;
            if src_channel != dst_channel {
                warn!(
                    "flow {} endpoints sit on different channels ({} vs {}); nothing will be delivered",
                    key, src_channel, dst_channel
                );
            }
            sources.push(TrafficSource::new(
                key,
                flow.packet_size,
                flow.interval,
                flow.num_packets,
            ));
            scheduler
                .schedule(flow.start_time, SimEvent::TrafficFire { flow: idx })
                .map_err(|e| SceneLoadError::ValidationError(format!(
                    "Flow {} start_time: {}",
                    idx, e
                )))?;
        }

        info!(
            "scene ready: {} nodes, {} flows, {} channels, {:.1}s at {}",
            nodes.len(),
            sources.len(),
            channels.len(),
            scene.simulation_duration,
            scene.phy.phy_mode
        );

        Ok(Simulation {
            world: World {
                nodes,
                channels,
                sources,
                monitor,
                tx_power_dbm: scene.phy.tx_power_dbm,
            },
            scheduler,
            stop_time: scene.simulation_duration,
        })
    }

    /// Run to the configured stop time and return the per-flow reports.
    pub fn run(mut self) -> Vec<FlowReport> {
        let stop_time = self.stop_time;
        let world = &mut self.world;
        self.scheduler
            .run(stop_time, |scheduler, event| world.handle(scheduler, event));
        info!("simulation finished at t={:.3}s", self.scheduler.now());
        self.world.monitor.reports(stop_time)
    }
}

impl World {
    fn handle(&mut self, scheduler: &mut EventScheduler<SimEvent>, event: SimEvent) {
        match event {
            SimEvent::TrafficFire { flow } => self.traffic_fire(scheduler, flow),
            SimEvent::TxComplete { node } => self.tx_complete(scheduler, node),
            SimEvent::MacReady { node } => self.mac_ready(node),
            SimEvent::Deliver {
                node,
                packet,
                rss_dbm,
                airtime,
            } => self.deliver(scheduler, node, packet, rss_dbm, airtime),
        }
    }

    fn traffic_fire(&mut self, scheduler: &mut EventScheduler<SimEvent>, flow: usize) {
        let source = &mut self.sources[flow];
        let Some(packet) = source.fire() else {
            // Source closed; no reschedule, the flow is done.
            return;
        };
        let interval = source.interval();
        self.monitor
            .record_tx(packet.flow, packet.size as u64, scheduler.now());
        if scheduler
            .schedule(interval, SimEvent::TrafficFire { flow })
            .is_err()
        {
            warn!("flow {} could not reschedule its next firing", packet.flow);
        }
        self.transmit(scheduler, packet);
    }

    fn transmit(&mut self, scheduler: &mut EventScheduler<SimEvent>, packet: Packet) {
        let src = packet.flow.src;
        let Some(sender) = self.nodes.get_mut(&src) else {
            warn!("flow {} references missing sender node {}", packet.flow, src);
            return;
        };
        let airtime = match sender.mac.begin_transmit(packet.size) {
            Ok(airtime) => airtime,
            Err(MacError::DeviceBusy) => {
                // Upper-layer policy: a frame hitting a busy device is
                // dropped, not queued.
                debug!(
                    "flow {}: device busy at node {}, dropping packet #{}",
                    packet.flow, src, packet.seq
                );
                self.monitor.record_drop(packet.flow, PacketDrop::DeviceBusy);
                return;
            }
        };
        let now = scheduler.now();
        sender.tx_until = now + airtime;
        let sender_endpoint = sender.endpoint;
        let sender_channel = sender.channel;
        if scheduler
            .schedule(airtime, SimEvent::TxComplete { node: src })
            .is_err()
        {
            warn!("node {} could not schedule transmission completion", src);
        }

        let Some(channel) = self.channels.get_mut(&sender_channel) else {
            warn!("node {} sits on unknown channel {}", src, sender_channel);
            return;
        };

        // Broadcast medium: evaluate the frame at every other node on the
        // same channel. The flow's destination gets exactly one
        // delivery-or-drop decision out of this.
        let mut dst_decided = false;
        let mut deliveries = Vec::new();
        for (&node_id, node) in self.nodes.iter_mut() {
            if node_id == src || node.channel != sender_channel {
                continue;
            }
            match channel.delivery_outcome(&sender_endpoint, &node.endpoint, self.tx_power_dbm) {
                DeliveryOutcome::Delivered { rss_dbm } => {
                    let prop = propagation_delay(distance(
                        &sender_endpoint.position,
                        &node.endpoint.position,
                    ));
                    let arrival_start = now + prop;
                    if arrival_start < node.rx_until {
                        // An earlier frame already claims this radio; the
                        // later arrival is the one that is lost.
                        debug!(
                            "flow {}: frame #{} lost at node {} (overlapping an earlier reception)",
                            packet.flow, packet.seq, node_id
                        );
                        if node_id == packet.flow.dst {
                            self.monitor.record_drop(packet.flow, PacketDrop::Collision);
                            dst_decided = true;
                        }
                        continue;
                    }
                    node.rx_until = arrival_start + airtime;
                    deliveries.push((node_id, airtime + prop, rss_dbm));
                    if node_id == packet.flow.dst {
                        dst_decided = true;
                    }
                }
                DeliveryOutcome::Dropped(reason) => {
                    debug!(
                        "flow {}: frame #{} not received by node {}: {}",
                        packet.flow, packet.seq, node_id, reason
                    );
                    if node_id == packet.flow.dst {
                        self.monitor.record_drop(packet.flow, reason.into());
                        dst_decided = true;
                    }
                }
            }
        }
        if !dst_decided {
            // Destination unreachable on this channel (typically a
            // cross-channel flow); the packet is still accounted for.
            debug!(
                "flow {}: frame #{} never reached channel of node {}",
                packet.flow, packet.seq, packet.flow.dst
            );
            self.monitor
                .record_drop(packet.flow, DropReason::BelowThreshold.into());
        }
        for (node_id, delay, rss_dbm) in deliveries {
            if scheduler
                .schedule(
                    delay,
                    SimEvent::Deliver {
                        node: node_id,
                        packet: packet.clone(),
                        rss_dbm,
                        airtime,
                    },
                )
                .is_err()
            {
                warn!("node {} could not schedule frame delivery", node_id);
            }
        }
    }

    fn tx_complete(&mut self, scheduler: &mut EventScheduler<SimEvent>, node_id: u32) {
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        let ifs = node.mac.finish_transmit();
        if scheduler
            .schedule(ifs, SimEvent::MacReady { node: node_id })
            .is_err()
        {
            warn!("node {} could not schedule interframe space end", node_id);
        }
    }

    fn mac_ready(&mut self, node_id: u32) {
        if let Some(node) = self.nodes.get_mut(&node_id) {
            node.mac.backoff_elapsed();
        }
    }

    fn deliver(
        &mut self,
        scheduler: &mut EventScheduler<SimEvent>,
        node_id: u32,
        packet: Packet,
        rss_dbm: f64,
        airtime: f64,
    ) {
        let now = scheduler.now();
        let frame_start = now - airtime;
        let Some(node) = self.nodes.get_mut(&node_id) else {
            return;
        };
        // Half-duplex: a radio transmitting during any part of the frame
        // hears nothing of it.
        if node.tx_until > frame_start {
            debug!(
                "flow {}: frame #{} lost at node {} (receiver was transmitting)",
                packet.flow, packet.seq, node_id
            );
            if packet.flow.dst == node_id {
                self.monitor.record_drop(packet.flow, PacketDrop::Collision);
            }
            return;
        }
        debug!(
            "node {} frame #{} of flow {} arrived at {:.1} dBm",
            node_id, packet.seq, packet.flow, rss_dbm
        );
        if node.sink.accept(&packet, now) {
            self.monitor.record_rx(packet.flow, packet.size as u64);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::load_scene;

    fn two_node_scene(rss_dbm: f64, num_packets: u32) -> Scene {
        serde_json::from_value(serde_json::json!({
            "simulation_duration": 21.0,
            "phy": {
                "phy_mode": "ErpOfdmRate54Mbps",
                "tx_power_dbm": 16.0,
                "rx_sensitivity_dbm": -97.0
            },
            "propagation": { "model": "fixed-rss", "rss_dbm": rss_dbm },
            "nodes": [
                {
                    "node_id": 0,
                    "position": { "x": 0.0, "y": 0.0 },
                    "antenna": { "orientation_degrees": 0.0, "beamwidth_degrees": 60.0 }
                },
                {
                    "node_id": 1,
                    "position": { "x": 100.0, "y": 0.0 },
                    "antenna": { "orientation_degrees": 180.0, "beamwidth_degrees": 60.0 }
                }
            ],
            "flows": [
                {
                    "source": 1,
                    "destination": 0,
                    "packet_size": 1000,
                    "num_packets": num_packets,
                    "interval": 1.0,
                    "start_time": 1.0
                }
            ]
        }))
        .expect("scene should deserialize")
    }

    #[test]
    fn strong_fixed_rss_delivers_every_packet() {
        let scene = two_node_scene(-80.0, 20);
        let reports = Simulation::from_scene(&scene).unwrap().run();
        assert_eq!(reports.len(), 1);
        let report = &reports[0];
        assert_eq!(report.flow, FlowKey { src: 1, dst: 0 });
        assert_eq!(report.tx_bytes, 20000);
        assert_eq!(report.rx_bytes, 20000);
        assert!(report.loss_rate.unwrap().abs() < 1e-9);
        // 20000 bytes over the 20 s between first send and stop.
        assert!((report.throughput_kbps.unwrap() - 8.0).abs() < 1e-6);
    }

    #[test]
    fn weak_fixed_rss_loses_every_packet() {
        let scene = two_node_scene(-98.0, 20);
        let reports = Simulation::from_scene(&scene).unwrap().run();
        let report = &reports[0];
        assert_eq!(report.tx_bytes, 20000);
        assert_eq!(report.rx_bytes, 0);
        // Convention: everything transmitted and nothing received is loss
        // rate 1, not N/A.
        assert_eq!(report.loss_rate, Some(1.0));
    }

    #[test]
    fn zero_packet_flow_reports_na_loss() {
        let scene = two_node_scene(-80.0, 0);
        let reports = Simulation::from_scene(&scene).unwrap().run();
        // The source closes without transmitting; the flow still gets its
        // report block, with nothing to divide by.
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].tx_bytes, 0);
        assert_eq!(reports[0].loss_rate, None);
        assert_eq!(reports[0].throughput_kbps, None);
    }

    #[test]
    fn flow_stops_sending_at_simulation_end() {
        // 100 packets requested but only 20 intervals fit before t=21.
        let scene = two_node_scene(-80.0, 100);
        let reports = Simulation::from_scene(&scene).unwrap().run();
        let report = &reports[0];
        assert_eq!(report.tx_bytes, 20000);
        assert_eq!(report.rx_bytes, 20000);
    }

    #[test]
    fn cross_channel_flow_delivers_nothing() {
        let mut scene = two_node_scene(-80.0, 5);
        scene.nodes[1].channel = 3;
        let reports = Simulation::from_scene(&scene).unwrap().run();
        let report = &reports[0];
        assert_eq!(report.tx_bytes, 5000);
        assert_eq!(report.rx_bytes, 0);
        assert_eq!(report.loss_rate, Some(1.0));
    }

    #[test]
    fn misaligned_antennas_block_the_link() {
        let mut scene = two_node_scene(-80.0, 5);
        // Point the sender's beam away from the receiver.
        scene.nodes[1].antenna.orientation_degrees = 0.0;
        let reports = Simulation::from_scene(&scene).unwrap().run();
        assert_eq!(reports[0].rx_bytes, 0);
    }

    #[test]
    fn interval_shorter_than_airtime_trips_device_busy() {
        let mut scene = two_node_scene(-80.0, 50);
        // 1000-byte frames at 1 Mbit/s take ~8 ms; fire every 1 ms.
        scene.phy.phy_mode = "DsssRate1Mbps".to_string();
        scene.flows[0].interval = 0.001;
        let reports = Simulation::from_scene(&scene).unwrap().run();
        let report = &reports[0];
        assert_eq!(report.tx_bytes, 50000);
        assert!(report.rx_bytes < 50000);
        assert!(report.rx_bytes > 0);
        assert!(report.loss_rate.unwrap() > 0.0);
    }

    #[test]
    fn frame_overlapping_an_earlier_reception_is_the_one_lost() {
        // At 1 Mbit/s the 2000-byte frame from node 1 occupies node 0 for
        // about 16 ms starting at t=1.0. Node 2's short frame starts 5 ms
        // into that window and must lose, even though it finishes first.
        let scene: Scene = serde_json::from_value(serde_json::json!({
            "simulation_duration": 3.0,
            "phy": {
                "phy_mode": "DsssRate1Mbps",
                "tx_power_dbm": 16.0,
                "rx_sensitivity_dbm": -97.0
            },
            "propagation": { "model": "fixed-rss", "rss_dbm": -80.0 },
            "nodes": [
                {
                    "node_id": 0,
                    "position": { "x": 0.0, "y": 0.0 },
                    "antenna": { "orientation_degrees": 0.0, "beamwidth_degrees": 360.0 }
                },
                {
                    "node_id": 1,
                    "position": { "x": 100.0, "y": 0.0 },
                    "antenna": { "orientation_degrees": 0.0, "beamwidth_degrees": 360.0 }
                },
                {
                    "node_id": 2,
                    "position": { "x": 0.0, "y": 100.0 },
                    "antenna": { "orientation_degrees": 0.0, "beamwidth_degrees": 360.0 }
                }
            ],
            "flows": [
                {
                    "source": 1,
                    "destination": 0,
                    "packet_size": 2000,
                    "num_packets": 1,
                    "interval": 1.0,
                    "start_time": 1.0
                },
                {
                    "source": 2,
                    "destination": 0,
                    "packet_size": 100,
                    "num_packets": 1,
                    "interval": 1.0,
                    "start_time": 1.005
                }
            ]
        }))
        .expect("scene should deserialize");
        let reports = Simulation::from_scene(&scene).unwrap().run();
        assert_eq!(reports.len(), 2);
        let long = &reports[0];
        let short = &reports[1];
        assert_eq!(long.flow, FlowKey { src: 1, dst: 0 });
        assert_eq!(long.rx_bytes, 2000);
        assert_eq!(short.flow, FlowKey { src: 2, dst: 0 });
        assert_eq!(short.tx_bytes, 100);
        assert_eq!(short.rx_bytes, 0);
        assert_eq!(short.loss_rate, Some(1.0));
    }

    #[test]
    fn log_distance_link_delivers_within_range() {
        let mut scene = two_node_scene(0.0, 10);
        scene.propagation = serde_json::from_value(serde_json::json!({
            "model": "log-distance",
            "reference_distance": 120.0,
            "path_loss_exponent": 3.0,
            "path_loss_at_reference_distance": 46.7
        }))
        .unwrap();
        // 100 m is inside the reference distance: RSS = 16 - 46.7 dBm, well
        // above the -97 dBm sensitivity.
        let reports = Simulation::from_scene(&scene).unwrap().run();
        let report = &reports[0];
        assert_eq!(report.tx_bytes, 10000);
        assert_eq!(report.rx_bytes, 10000);
    }

    #[test]
    fn invalid_scene_is_rejected_before_running() {
        let mut scene = two_node_scene(-80.0, 5);
        scene.flows[0].destination = 99;
        assert!(matches!(
            Simulation::from_scene(&scene),
            Err(SceneLoadError::ValidationError(_))
        ));
    }

    #[test]
    fn loading_a_missing_scene_file_fails() {
        assert!(matches!(
            load_scene("/nonexistent/scene.json"),
            Err(SceneLoadError::FileReadError(_))
        ));
    }
}
