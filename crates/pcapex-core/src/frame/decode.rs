use etherparse::{
    Ipv6ExtensionSlice, LaxIpv4Slice, LaxIpv6Slice, LaxNetSlice, LaxSlicedPacket, TcpSlice,
    TransportSlice,
};
use pcap_parser::Linktype;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::debug;

use crate::source::PacketEvent;

use super::error::DecodeError;
use super::{
    EthernetLayer, Frame, FrameInfo, IcmpLayer, Ipv4Layer, Ipv6FragmentLayer, Ipv6Layer, Layer,
    LoopbackLayer, ProtoChain, RawLayer, Span, TcpLayer, UdpLayer, VlanLayer,
};

const ETHERNET_HEADER_LEN: usize = 14;
const ETHER_TYPE_RANGE: std::ops::Range<usize> = 12..14;
const VLAN_TAG_LEN: usize = 4;
const VLAN_ETHER_TYPES: [u16; 3] = [0x8100, 0x88a8, 0x9100];
const LOOPBACK_HEADER_LEN: usize = 4;

/// Decode one packet record into a frame.
///
/// Ethernet, raw IP and BSD loopback captures are decoded down to the
/// transport layer; any other linktype yields a single `Raw` layer. Records
/// cut short by the snapshot length decode as far as their bytes go, and
/// whatever cannot be sliced ends the chain with a `Raw` layer. Only a link
/// header shorter than its fixed size is an error.
pub fn decode_frame(number: u64, event: PacketEvent) -> Result<Frame, DecodeError> {
    let PacketEvent {
        ts,
        linktype,
        if_id,
        caplen,
        origlen,
        data,
    } = event;
    let layers = decode_layers(number, linktype, &data)?;

    Ok(Frame {
        info: FrameInfo {
            number,
            time_epoch: ts,
            time: ts_to_rfc3339(ts),
            caplen,
            origlen,
            linktype: linktype.0,
            interface: if_id,
        },
        chain: ProtoChain::new(layers),
        data,
    })
}

fn decode_layers(number: u64, linktype: Linktype, data: &[u8]) -> Result<Vec<Layer>, DecodeError> {
    let mut layers = Vec::new();

    let (sliced, link_end) = match linktype {
        Linktype::ETHERNET => {
            let link_end = push_ethernet_layers(number, data, &mut layers)?;
            let sliced = LaxSlicedPacket::from_ethernet(data).map_err(|e| slice_error(number, e))?;
            (Some(sliced), link_end)
        }
        Linktype::RAW | Linktype::IPV4 | Linktype::IPV6 => (lax_ip(number, data), 0),
        Linktype::NULL | Linktype::LOOP => {
            let family = loopback_family(number, data)?;
            layers.push(Layer::Loopback(LoopbackLayer { family }));
            let ip = data.get(LOOPBACK_HEADER_LEN..).unwrap_or(&[]);
            (lax_ip(number, ip), LOOPBACK_HEADER_LEN)
        }
        _ => (None, 0),
    };
    let raw = Layer::Raw(RawLayer {
        length: data.len().saturating_sub(link_end),
    });
    let Some(sliced) = sliced else {
        layers.push(raw);
        return Ok(layers);
    };
    if let Some((err, layer)) = &sliced.stop_err {
        debug!(frame = number, %layer, error = %err, "slicing stopped early");
    }

    match &sliced.net {
        Some(LaxNetSlice::Ipv4(ipv4)) => layers.push(Layer::Ipv4(ipv4_layer(data, ipv4))),
        Some(LaxNetSlice::Ipv6(ipv6)) => layers.push(Layer::Ipv6(ipv6_layer(data, ipv6))),
        None => {
            layers.push(raw);
            return Ok(layers);
        }
    }

    match &sliced.transport {
        Some(TransportSlice::Tcp(tcp)) => layers.push(Layer::Tcp(tcp_layer(data, tcp))),
        Some(TransportSlice::Udp(udp)) => {
            let payload = udp.payload();
            let start = offset_in(data, payload);
            layers.push(Layer::Udp(UdpLayer {
                src_port: udp.source_port(),
                dst_port: udp.destination_port(),
                length: udp.length(),
                span: Span {
                    start: start.saturating_sub(8),
                    payload: start,
                    end: start + payload.len(),
                },
            }));
        }
        Some(TransportSlice::Icmpv4(icmp)) => layers.push(Layer::Icmpv4(IcmpLayer {
            icmp_type: icmp.type_u8(),
            code: icmp.code_u8(),
        })),
        Some(TransportSlice::Icmpv6(icmp)) => layers.push(Layer::Icmpv6(IcmpLayer {
            icmp_type: icmp.type_u8(),
            code: icmp.code_u8(),
        })),
        _ => {}
    }

    Ok(layers)
}

/// Slice an IP packet; `None` when not even the IP header is readable.
fn lax_ip(number: u64, data: &[u8]) -> Option<LaxSlicedPacket<'_>> {
    match LaxSlicedPacket::from_ip(data) {
        Ok(sliced) => Some(sliced),
        Err(err) => {
            debug!(frame = number, error = %err, "not an IP packet");
            None
        }
    }
}

/// Push the Ethernet II header and any VLAN tags; returns where the network
/// layer starts.
fn push_ethernet_layers(
    number: u64,
    data: &[u8],
    layers: &mut Vec<Layer>,
) -> Result<usize, DecodeError> {
    require_link_len(number, data, ETHERNET_HEADER_LEN)?;
    let mut ether_type = read_u16_be(data, ETHER_TYPE_RANGE.start);
    layers.push(Layer::Ethernet(EthernetLayer {
        dst: format_mac(&data[0..6]),
        src: format_mac(&data[6..12]),
        ether_type,
    }));

    let mut offset = ETHERNET_HEADER_LEN;
    while VLAN_ETHER_TYPES.contains(&ether_type) {
        require_link_len(number, data, offset + VLAN_TAG_LEN)?;
        let tci = read_u16_be(data, offset);
        ether_type = read_u16_be(data, offset + 2);
        layers.push(Layer::Vlan(VlanLayer {
            priority: (tci >> 13) as u8,
            id: tci & 0x0fff,
            ether_type,
        }));
        offset += VLAN_TAG_LEN;
    }
    Ok(offset)
}

/// BSD loopback family, stored in the byte order of the capturing host.
fn loopback_family(number: u64, data: &[u8]) -> Result<u32, DecodeError> {
    require_link_len(number, data, LOOPBACK_HEADER_LEN)?;
    let bytes = [data[0], data[1], data[2], data[3]];
    if bytes[0] == 0 && bytes[1] == 0 {
        Ok(u32::from_be_bytes(bytes))
    } else {
        Ok(u32::from_le_bytes(bytes))
    }
}

fn ipv4_layer(data: &[u8], ipv4: &LaxIpv4Slice<'_>) -> Ipv4Layer {
    let header = ipv4.header();
    let start = offset_in(data, header.slice());
    let header_len = header.ihl() as usize * 4;
    let end = (start + header.total_len() as usize).min(data.len());

    Ipv4Layer {
        src: header.source_addr(),
        dst: header.destination_addr(),
        identification: header.identification(),
        dont_fragment: header.dont_fragment(),
        more_fragments: header.more_fragments(),
        fragment_offset: header.fragments_offset().value(),
        header_len,
        total_len: header.total_len(),
        ttl: header.ttl(),
        protocol: header.protocol().0,
        span: Span {
            start,
            payload: (start + header_len).min(end),
            end,
        },
    }
}

fn ipv6_layer(data: &[u8], ipv6: &LaxIpv6Slice<'_>) -> Ipv6Layer {
    let header = ipv6.header();
    let start = offset_in(data, header.slice());
    let payload_slice = ipv6.payload().payload;
    let end = offset_in(data, payload_slice) + payload_slice.len();

    let fragment = ipv6
        .extensions()
        .clone()
        .into_iter()
        .find_map(|ext| match ext {
            Ipv6ExtensionSlice::Fragment(frag) => Some(frag),
            _ => None,
        });
    let (payload, unfragmentable_len, fragment) = match fragment {
        Some(frag) => {
            let frag_start = offset_in(data, frag.slice());
            (
                (frag_start + frag.slice().len()).min(end),
                frag_start.saturating_sub(start),
                Some(Ipv6FragmentLayer {
                    next_header: frag.next_header().0,
                    offset: frag.fragment_offset().value(),
                    more_fragments: frag.more_fragments(),
                    identification: frag.identification(),
                }),
            )
        }
        None => (offset_in(data, payload_slice), header.slice().len(), None),
    };

    Ipv6Layer {
        src: header.source_addr(),
        dst: header.destination_addr(),
        flow_label: header.flow_label().value(),
        payload_len: header.payload_length(),
        next_header: header.next_header().0,
        hop_limit: header.hop_limit(),
        fragment,
        span: Span {
            start,
            payload,
            end,
        },
        unfragmentable_len,
    }
}

fn tcp_layer(data: &[u8], tcp: &TcpSlice<'_>) -> TcpLayer {
    let payload = tcp.payload();
    let payload_start = offset_in(data, payload);
    let header_len = tcp.data_offset() as usize * 4;

    TcpLayer {
        src_port: tcp.source_port(),
        dst_port: tcp.destination_port(),
        seq: tcp.sequence_number(),
        ack: tcp.acknowledgment_number(),
        syn: tcp.syn(),
        fin: tcp.fin(),
        rst: tcp.rst(),
        psh: tcp.psh(),
        ack_flag: tcp.ack(),
        window: tcp.window_size(),
        header_len,
        span: Span {
            start: payload_start.saturating_sub(header_len),
            payload: payload_start,
            end: payload_start + payload.len(),
        },
    }
}

/// Position of `part` inside `base`; `part` must be a sub-slice of `base`.
fn offset_in(base: &[u8], part: &[u8]) -> usize {
    (part.as_ptr() as usize)
        .saturating_sub(base.as_ptr() as usize)
        .min(base.len())
}

fn slice_error(number: u64, err: impl std::fmt::Display) -> DecodeError {
    DecodeError::Slice {
        frame: number,
        message: err.to_string(),
    }
}

fn require_link_len(number: u64, data: &[u8], needed: usize) -> Result<(), DecodeError> {
    if data.len() < needed {
        return Err(DecodeError::LinkTooShort {
            frame: number,
            needed,
            actual: data.len(),
        });
    }
    Ok(())
}

fn read_u16_be(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn format_mac(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

fn ts_to_rfc3339(ts: Option<f64>) -> Option<String> {
    let ts = ts?;
    let nanos = (ts * 1_000_000_000.0) as i128;
    OffsetDateTime::from_unix_timestamp_nanos(nanos)
        .ok()
        .and_then(|dt| dt.format(&Rfc3339).ok())
}
