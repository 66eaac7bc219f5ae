//! TCP flow tracing.
//!
//! Frames are grouped per connection direction. A SYN seen after that
//! direction has carried a FIN starts a new flow, so reused port pairs are
//! reported separately.

use std::collections::HashMap;
use std::net::IpAddr;

use serde::Serialize;

use crate::reassembly::TcpBufId;

/// One traced TCP flow.
#[derive(Debug, Clone, Serialize)]
pub struct TraceFlow {
    pub id: TcpBufId,
    /// Frame numbers of the flow, in capture order.
    pub index: Vec<u64>,
    /// `<src>_<sport>-<dst>_<dport>-<n>`, `n` counting flows of the same direction.
    pub label: String,
    pub packets: u64,
    pub bytes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<f64>,
    pub fin: bool,
}

/// TCP packet summary as fed to [`FlowTracer::observe`].
#[derive(Debug, Clone, Copy)]
pub struct TracePacket {
    pub id: TcpBufId,
    pub frame: u64,
    pub syn: bool,
    pub fin: bool,
    pub payload_len: usize,
    pub timestamp: Option<f64>,
}

#[derive(Debug, Default)]
pub struct FlowTracer {
    flows: Vec<TraceFlow>,
    /// Index into `flows` of the current flow per direction.
    current: HashMap<TcpBufId, usize>,
    counts: HashMap<TcpBufId, usize>,
}

impl FlowTracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, packet: TracePacket) {
        let current = self
            .current
            .get(&packet.id)
            .copied()
            .filter(|&idx| !(packet.syn && self.flows[idx].fin));
        let idx = match current {
            Some(idx) => idx,
            None => self.start_flow(packet.id),
        };

        let flow = &mut self.flows[idx];
        flow.index.push(packet.frame);
        flow.packets += 1;
        flow.bytes += packet.payload_len as u64;
        if flow.first_seen.is_none() {
            flow.first_seen = packet.timestamp;
        }
        if packet.timestamp.is_some() {
            flow.last_seen = packet.timestamp;
        }
        flow.fin |= packet.fin;
    }

    pub fn flows(&self) -> &[TraceFlow] {
        &self.flows
    }

    pub fn into_flows(self) -> Vec<TraceFlow> {
        self.flows
    }

    fn start_flow(&mut self, id: TcpBufId) -> usize {
        let count = self.counts.entry(id).or_default();
        let label = format!(
            "{}-{}-{}",
            format_endpoint(id.src, id.src_port),
            format_endpoint(id.dst, id.dst_port),
            count
        );
        *count += 1;
        self.flows.push(TraceFlow {
            id,
            index: Vec::new(),
            label,
            packets: 0,
            bytes: 0,
            first_seen: None,
            last_seen: None,
            fin: false,
        });
        let idx = self.flows.len() - 1;
        self.current.insert(id, idx);
        idx
    }
}

fn format_endpoint(ip: IpAddr, port: u16) -> String {
    format!("{ip}_{port}")
}
