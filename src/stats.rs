//! Per-flow statistics accumulation and the end-of-run report.

use std::collections::BTreeMap;
use std::fmt;

use crate::channel::DropReason;

/// Identity of a logical packet stream between a source and a destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FlowKey {
    pub src: u32,
    pub dst: u32,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.src, self.dst)
    }
}

/// How a packet was lost, across all layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketDrop {
    /// Channel-level rejection: too weak or outside the antenna beam.
    BelowThreshold,
    /// Frame overlap at the receiver.
    Collision,
    /// The sender's MAC was still busy with an earlier frame.
    DeviceBusy,
}

impl From<DropReason> for PacketDrop {
    fn from(reason: DropReason) -> Self {
        match reason {
            DropReason::BelowThreshold => PacketDrop::BelowThreshold,
            DropReason::Collision => PacketDrop::Collision,
        }
    }
}

/// Accumulator for one flow. Written by the traffic source (tx side) and the
/// packet sink (rx side); read once when the report is built.
#[derive(Debug, Default, Clone)]
pub struct FlowStats {
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    pub tx_packets: u64,
    pub rx_packets: u64,
    pub dropped_below_threshold: u64,
    pub dropped_collision: u64,
    pub dropped_device_busy: u64,
    /// Simulated time of the first transmission; throughput is measured from
    /// here to the end of the run.
    pub first_tx_time: Option<f64>,
}

/// Collects [`FlowStats`] keyed by (src, dst).
///
/// Iteration order is the key order, so reports come out deterministically.
pub struct FlowMonitor {
    flows: BTreeMap<FlowKey, FlowStats>,
}

impl FlowMonitor {
    pub fn new() -> Self {
        FlowMonitor {
            flows: BTreeMap::new(),
        }
    }

    /// Make `flow` appear in the reports even if it never carries traffic.
    pub fn register(&mut self, flow: FlowKey) {
        self.flows.entry(flow).or_default();
    }

    pub fn record_tx(&mut self, flow: FlowKey, bytes: u64, now: f64) {
        let stats = self.flows.entry(flow).or_default();
        stats.tx_bytes += bytes;
        stats.tx_packets += 1;
        if stats.first_tx_time.is_none() {
            stats.first_tx_time = Some(now);
        }
    }

    pub fn record_rx(&mut self, flow: FlowKey, bytes: u64) {
        let stats = self.flows.entry(flow).or_default();
        stats.rx_bytes += bytes;
        stats.rx_packets += 1;
    }

    pub fn record_drop(&mut self, flow: FlowKey, drop: PacketDrop) {
        let stats = self.flows.entry(flow).or_default();
        match drop {
            PacketDrop::BelowThreshold => stats.dropped_below_threshold += 1,
            PacketDrop::Collision => stats.dropped_collision += 1,
            PacketDrop::DeviceBusy => stats.dropped_device_busy += 1,
        }
    }

    pub fn stats(&self, flow: &FlowKey) -> Option<&FlowStats> {
        self.flows.get(flow)
    }

    /// Build the final per-flow reports, one per flow, in key order.
    pub fn reports(&self, stop_time: f64) -> Vec<FlowReport> {
        self.flows
            .iter()
            .map(|(flow, stats)| FlowReport::from_stats(*flow, stats, stop_time))
            .collect()
    }
}

impl Default for FlowMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// End-of-run summary for one flow.
#[derive(Debug, Clone)]
pub struct FlowReport {
    pub flow: FlowKey,
    pub tx_bytes: u64,
    pub rx_bytes: u64,
    /// `None` when no time elapsed between the first transmission and the
    /// end of the run.
    pub throughput_kbps: Option<f64>,
    /// 1 - rxBytes/txBytes; `None` when nothing was transmitted, so the
    /// ratio is undefined.
    pub loss_rate: Option<f64>,
}

impl FlowReport {
    fn from_stats(flow: FlowKey, stats: &FlowStats, stop_time: f64) -> Self {
        let elapsed = stats.first_tx_time.map(|start| stop_time - start);
        let throughput_kbps = match elapsed {
            Some(elapsed) if elapsed > 0.0 => Some((stats.rx_bytes * 8) as f64 / 1000.0 / elapsed),
            _ => None,
        };
        let loss_rate = if stats.tx_bytes == 0 {
            None
        } else {
            Some(1.0 - stats.rx_bytes as f64 / stats.tx_bytes as f64)
        };
        FlowReport {
            flow,
            tx_bytes: stats.tx_bytes,
            rx_bytes: stats.rx_bytes,
            throughput_kbps,
            loss_rate,
        }
    }
}

impl fmt::Display for FlowReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Flow               : {}", self.flow)?;
        writeln!(f, "Bytes transmitted  : {}", self.tx_bytes)?;
        writeln!(f, "Bytes received     : {}", self.rx_bytes)?;
        match self.throughput_kbps {
            Some(kbps) => writeln!(f, "Throughput         : {:.3} kbps", kbps)?,
            None => writeln!(f, "Throughput         : N/A")?,
        }
        match self.loss_rate {
            Some(rate) => write!(f, "Loss rate          : {:.3}", rate),
            None => write!(f, "Loss rate          : N/A"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FLOW: FlowKey = FlowKey { src: 1, dst: 0 };

    #[test]
    fn counters_accumulate_per_flow() {
        let mut monitor = FlowMonitor::new();
        monitor.record_tx(FLOW, 1000, 1.0);
        monitor.record_tx(FLOW, 1000, 2.0);
        monitor.record_rx(FLOW, 1000);
        monitor.record_drop(FLOW, PacketDrop::BelowThreshold);

        let stats = monitor.stats(&FLOW).unwrap();
        assert_eq!(stats.tx_bytes, 2000);
        assert_eq!(stats.tx_packets, 2);
        assert_eq!(stats.rx_bytes, 1000);
        assert_eq!(stats.rx_packets, 1);
        assert_eq!(stats.dropped_below_threshold, 1);
        assert_eq!(stats.first_tx_time, Some(1.0));
    }

    #[test]
    fn registered_flow_without_traffic_still_gets_a_report() {
        let mut monitor = FlowMonitor::new();
        monitor.register(FLOW);
        let reports = monitor.reports(21.0);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].tx_bytes, 0);
        assert_eq!(reports[0].loss_rate, None);
    }

    #[test]
    fn loss_rate_is_na_when_nothing_was_transmitted() {
        let mut monitor = FlowMonitor::new();
        monitor.record_rx(FLOW, 0);
        let reports = monitor.reports(21.0);
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].loss_rate, None);
        assert_eq!(reports[0].throughput_kbps, None);
        let rendered = reports[0].to_string();
        assert!(rendered.contains("Loss rate          : N/A"), "{}", rendered);
    }

    #[test]
    fn total_loss_reports_rate_one() {
        let mut monitor = FlowMonitor::new();
        monitor.record_tx(FLOW, 1000, 1.0);
        monitor.record_drop(FLOW, PacketDrop::BelowThreshold);
        let report = &monitor.reports(21.0)[0];
        assert_eq!(report.loss_rate, Some(1.0));
    }

    #[test]
    fn lossless_flow_computes_throughput_over_elapsed_time() {
        let mut monitor = FlowMonitor::new();
        for i in 0..20 {
            monitor.record_tx(FLOW, 1000, 1.0 + i as f64);
            monitor.record_rx(FLOW, 1000);
        }
        let report = &monitor.reports(21.0)[0];
        assert_eq!(report.tx_bytes, 20000);
        assert_eq!(report.rx_bytes, 20000);
        // 20000 bytes over the 20 s from first tx to the end of the run.
        assert!((report.throughput_kbps.unwrap() - 8.0).abs() < 1e-9);
        assert!((report.loss_rate.unwrap() - 0.0).abs() < 1e-9);
    }

    #[test]
    fn reports_come_out_in_flow_key_order() {
        let mut monitor = FlowMonitor::new();
        monitor.record_tx(FlowKey { src: 2, dst: 0 }, 100, 0.0);
        monitor.record_tx(FlowKey { src: 0, dst: 1 }, 100, 0.0);
        let reports = monitor.reports(10.0);
        assert_eq!(reports[0].flow, FlowKey { src: 0, dst: 1 });
        assert_eq!(reports[1].flow, FlowKey { src: 2, dst: 0 });
    }
}
