//! Traffic generation and the delivery sink.

use log::{debug, info, trace};

use crate::stats::FlowKey;

/// Application packet: an opaque payload of fixed size plus a sequence
/// number. Created by a [`TrafficSource`], consumed by a [`PacketSink`] or
/// dropped along the way.
#[derive(Debug, Clone)]
pub struct Packet {
    pub flow: FlowKey,
    pub seq: u64,
    pub size: usize,
}

enum TrafficMode {
    Bounded { remaining: u32 },
    Unbounded,
}

/// Emits one packet per firing at a fixed interval, either a bounded count
/// or until the simulation stops.
pub struct TrafficSource {
    flow: FlowKey,
    packet_size: usize,
    interval: f64,
    mode: TrafficMode,
    next_seq: u64,
    closed: bool,
}

impl TrafficSource {
    pub fn new(flow: FlowKey, packet_size: usize, interval: f64, num_packets: Option<u32>) -> Self {
        let mode = match num_packets {
            Some(count) => TrafficMode::Bounded { remaining: count },
            None => TrafficMode::Unbounded,
        };
        TrafficSource {
            flow,
            packet_size,
            interval,
            mode,
            next_seq: 0,
            closed: false,
        }
    }

    pub fn flow(&self) -> FlowKey {
        self.flow
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// One firing of the source: emit the next packet, or close the flow
    /// once the configured packet count is exhausted. A closed source never
    /// emits again.
    pub fn fire(&mut self) -> Option<Packet> {
        if self.closed {
            return None;
        }
        if let TrafficMode::Bounded { remaining } = &mut self.mode {
            if *remaining == 0 {
                self.closed = true;
                info!("flow {} closed after {} packets", self.flow, self.next_seq);
                return None;
            }
            *remaining -= 1;
        }
        let packet = Packet {
            flow: self.flow,
            seq: self.next_seq,
            size: self.packet_size,
        };
        self.next_seq += 1;
        debug!("flow {} emitting packet #{}", self.flow, packet.seq);
        Some(packet)
    }
}

/// Receiving endpoint at one node: classifies arrivals, accepting only
/// frames addressed to this node and counting what it keeps.
pub struct PacketSink {
    node_id: u32,
    received_packets: u64,
    received_bytes: u64,
}

impl PacketSink {
    pub fn new(node_id: u32) -> Self {
        PacketSink {
            node_id,
            received_packets: 0,
            received_bytes: 0,
        }
    }

    /// Returns true when the packet was addressed to this node and has been
    /// counted; overheard frames for other destinations are ignored.
    pub fn accept(&mut self, packet: &Packet, now: f64) -> bool {
        if packet.flow.dst != self.node_id {
            trace!(
                "node {} overheard packet #{} of flow {}",
                self.node_id, packet.seq, packet.flow
            );
            return false;
        }
        self.received_packets += 1;
        self.received_bytes += packet.size as u64;
        trace!(
            "node {} received packet #{} of flow {} at t={:.6}",
            self.node_id, packet.seq, packet.flow, now
        );
        true
    }

    pub fn received_packets(&self) -> u64 {
        self.received_packets
    }

    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::EventScheduler;

    const FLOW: FlowKey = FlowKey { src: 1, dst: 0 };

    #[test]
    fn bounded_source_emits_exact_count_then_closes() {
        let mut source = TrafficSource::new(FLOW, 1000, 1.0, Some(3));
        let seqs: Vec<u64> = std::iter::from_fn(|| source.fire()).map(|p| p.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
        assert!(source.is_closed());
        assert!(source.fire().is_none());
    }

    #[test]
    fn zero_packet_source_closes_on_first_firing() {
        let mut source = TrafficSource::new(FLOW, 1000, 1.0, Some(0));
        assert!(source.fire().is_none());
        assert!(source.is_closed());
    }

    #[test]
    fn unbounded_source_keeps_emitting() {
        let mut source = TrafficSource::new(FLOW, 100, 0.5, None);
        for expected in 0..1000u64 {
            assert_eq!(source.fire().unwrap().seq, expected);
        }
        assert!(!source.is_closed());
    }

    #[test]
    fn source_fires_at_start_plus_interval_multiples() {
        // Drive a bounded source the way the simulation does: one event per
        // firing, rescheduled one interval later while packets remain.
        let mut source = TrafficSource::new(FLOW, 1000, 1.0, Some(5));
        let mut scheduler = EventScheduler::new();
        scheduler.schedule(1.0, ()).unwrap();

        let mut send_times = Vec::new();
        scheduler.run(100.0, |sched, ()| {
            if source.fire().is_some() {
                send_times.push(sched.now());
                sched.schedule(source.interval(), ()).unwrap();
            }
        });
        assert_eq!(send_times, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(source.is_closed());
    }

    #[test]
    fn sink_accepts_only_its_own_traffic() {
        let mut sink = PacketSink::new(0);
        let mine = Packet {
            flow: FLOW,
            seq: 0,
            size: 1000,
        };
        let other = Packet {
            flow: FlowKey { src: 1, dst: 2 },
            seq: 0,
            size: 400,
        };
        assert!(sink.accept(&mine, 1.0));
        assert!(!sink.accept(&other, 1.5));
        assert!(sink.accept(&mine, 2.0));
        assert_eq!(sink.received_packets(), 2);
        assert_eq!(sink.received_bytes(), 2000);
    }
}
