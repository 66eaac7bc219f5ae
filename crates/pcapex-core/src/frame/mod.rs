//! Decoded frames and their protocol chains.
//!
//! A [`Frame`] keeps the captured bytes next to the decoded layers. Layers that
//! take part in reassembly carry a [`Span`] into those bytes so the raw header
//! and payload can be handed to the reassembly engines without re-parsing.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use serde::Serialize;

mod decode;
pub mod error;

pub use decode::decode_frame;
pub use error::DecodeError;

/// Byte ranges of one layer inside [`Frame::data`].
///
/// Header bytes are `start..payload`, payload bytes are `payload..end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub payload: usize,
    pub end: usize,
}

/// Protocol tag of a decoded layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Protocol {
    Ethernet,
    Vlan,
    Loopback,
    Ipv4,
    Ipv6,
    Tcp,
    Udp,
    Icmpv4,
    Icmpv6,
    Raw,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Protocol::Ethernet => "Ethernet",
            Protocol::Vlan => "VLAN",
            Protocol::Loopback => "Loopback",
            Protocol::Ipv4 => "IPv4",
            Protocol::Ipv6 => "IPv6",
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmpv4 => "ICMP",
            Protocol::Icmpv6 => "ICMPv6",
            Protocol::Raw => "Raw",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EthernetLayer {
    pub src: String,
    pub dst: String,
    pub ether_type: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct VlanLayer {
    pub priority: u8,
    pub id: u16,
    pub ether_type: u16,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoopbackLayer {
    pub family: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ipv4Layer {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub identification: u16,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    /// Fragment offset in 8-octet units.
    pub fragment_offset: u16,
    /// Header length in bytes.
    pub header_len: usize,
    pub total_len: u16,
    pub ttl: u8,
    pub protocol: u8,
    #[serde(skip)]
    pub span: Span,
}

impl Ipv4Layer {
    pub fn fragment_offset_bytes(&self) -> usize {
        self.fragment_offset as usize * 8
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Ipv6FragmentLayer {
    pub next_header: u8,
    /// Fragment offset in 8-octet units.
    pub offset: u16,
    pub more_fragments: bool,
    pub identification: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Ipv6Layer {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub flow_label: u32,
    pub payload_len: u16,
    pub next_header: u8,
    pub hop_limit: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<Ipv6FragmentLayer>,
    /// For fragments, `payload` starts after the fragment header and
    /// `start..payload` still includes it; see [`Ipv6Layer::unfragmentable`].
    #[serde(skip)]
    pub span: Span,
    /// Bytes from the start of the IPv6 header to the fragment header.
    #[serde(skip)]
    pub unfragmentable_len: usize,
}

impl Ipv6Layer {
    /// Range of the headers that precede the fragment header.
    pub fn unfragmentable(&self) -> std::ops::Range<usize> {
        self.span.start..self.span.start + self.unfragmentable_len
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TcpLayer {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub syn: bool,
    pub fin: bool,
    pub rst: bool,
    pub psh: bool,
    pub ack_flag: bool,
    pub window: u16,
    pub header_len: usize,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct UdpLayer {
    pub src_port: u16,
    pub dst_port: u16,
    pub length: u16,
    #[serde(skip)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize)]
pub struct IcmpLayer {
    pub icmp_type: u8,
    pub code: u8,
}

#[derive(Debug, Clone, Serialize)]
pub struct RawLayer {
    pub length: usize,
}

/// One decoded protocol layer.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "protocol")]
pub enum Layer {
    Ethernet(EthernetLayer),
    Vlan(VlanLayer),
    Loopback(LoopbackLayer),
    Ipv4(Ipv4Layer),
    Ipv6(Ipv6Layer),
    Tcp(TcpLayer),
    Udp(UdpLayer),
    Icmpv4(IcmpLayer),
    Icmpv6(IcmpLayer),
    Raw(RawLayer),
}

impl Layer {
    pub fn protocol(&self) -> Protocol {
        match self {
            Layer::Ethernet(_) => Protocol::Ethernet,
            Layer::Vlan(_) => Protocol::Vlan,
            Layer::Loopback(_) => Protocol::Loopback,
            Layer::Ipv4(_) => Protocol::Ipv4,
            Layer::Ipv6(_) => Protocol::Ipv6,
            Layer::Tcp(_) => Protocol::Tcp,
            Layer::Udp(_) => Protocol::Udp,
            Layer::Icmpv4(_) => Protocol::Icmpv4,
            Layer::Icmpv6(_) => Protocol::Icmpv6,
            Layer::Raw(_) => Protocol::Raw,
        }
    }
}

/// Ordered layers of one frame, link layer first.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ProtoChain {
    layers: Vec<Layer>,
}

impl ProtoChain {
    pub fn new(layers: Vec<Layer>) -> Self {
        Self { layers }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn protocols(&self) -> impl Iterator<Item = Protocol> + '_ {
        self.layers.iter().map(Layer::protocol)
    }

    pub fn contains(&self, protocol: Protocol) -> bool {
        self.protocols().any(|p| p == protocol)
    }

    pub fn ipv4(&self) -> Option<&Ipv4Layer> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Ipv4(ipv4) => Some(ipv4),
            _ => None,
        })
    }

    pub fn ipv6(&self) -> Option<&Ipv6Layer> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Ipv6(ipv6) => Some(ipv6),
            _ => None,
        })
    }

    pub fn tcp(&self) -> Option<&TcpLayer> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Tcp(tcp) => Some(tcp),
            _ => None,
        })
    }

    pub fn udp(&self) -> Option<&UdpLayer> {
        self.layers.iter().find_map(|layer| match layer {
            Layer::Udp(udp) => Some(udp),
            _ => None,
        })
    }
}

impl fmt::Display for ProtoChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, protocol) in self.protocols().enumerate() {
            if idx > 0 {
                f.write_str(":")?;
            }
            write!(f, "{protocol}")?;
        }
        Ok(())
    }
}

/// Per-frame record metadata.
#[derive(Debug, Clone, Serialize)]
pub struct FrameInfo {
    /// Frame number, starting at 1.
    pub number: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_epoch: Option<f64>,
    /// RFC3339 rendering of `time_epoch`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    pub caplen: u32,
    pub origlen: u32,
    pub linktype: i32,
    pub interface: u32,
}

/// One decoded frame.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    pub info: FrameInfo,
    pub chain: ProtoChain,
    #[serde(skip)]
    pub data: Vec<u8>,
}

impl Frame {
    pub fn number(&self) -> u64 {
        self.info.number
    }

    pub fn header_bytes(&self, span: Span) -> &[u8] {
        self.data.get(span.start..span.payload).unwrap_or(&[])
    }

    pub fn payload_bytes(&self, span: Span) -> &[u8] {
        self.data.get(span.payload..span.end).unwrap_or(&[])
    }
}
