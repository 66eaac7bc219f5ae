//! Reassembly descriptors built from decoded frames.

use std::net::IpAddr;

use crate::frame::Frame;
use crate::reassembly::{Ipv4BufId, Ipv4Fragment, Ipv6BufId, Ipv6Fragment, TcpBufId, TcpSegment};
use crate::trace::TracePacket;

/// IPv4 packets that may be fragmented (DF clear).
pub(crate) fn ipv4_fragment(frame: &Frame) -> Option<Ipv4Fragment> {
    let ipv4 = frame.chain.ipv4()?;
    if ipv4.dont_fragment {
        return None;
    }
    let header = frame.header_bytes(ipv4.span);
    Some(Ipv4Fragment {
        bufid: Ipv4BufId {
            src: ipv4.src,
            dst: ipv4.dst,
            id: ipv4.identification,
            proto: ipv4.protocol,
        },
        frame: frame.number(),
        offset: ipv4.fragment_offset_bytes(),
        header_len: ipv4.header_len,
        more_fragments: ipv4.more_fragments,
        total_len: ipv4.total_len as usize,
        header: header.to_vec(),
        payload: frame.payload_bytes(ipv4.span).to_vec(),
    })
}

/// IPv6 packets carrying a fragment header.
pub(crate) fn ipv6_fragment(frame: &Frame) -> Option<Ipv6Fragment> {
    let ipv6 = frame.chain.ipv6()?;
    let fragment = ipv6.fragment.as_ref()?;
    let header = frame.data.get(ipv6.unfragmentable()).unwrap_or(&[]);
    let payload = frame.payload_bytes(ipv6.span);
    Some(Ipv6Fragment {
        bufid: Ipv6BufId {
            src: ipv6.src,
            dst: ipv6.dst,
            label: ipv6.flow_label,
            next_header: fragment.next_header,
        },
        frame: frame.number(),
        offset: fragment.offset as usize * 8,
        header_len: ipv6.unfragmentable_len,
        more_fragments: fragment.more_fragments,
        total_len: ipv6.unfragmentable_len + payload.len(),
        header: header.to_vec(),
        payload: payload.to_vec(),
    })
}

fn tcp_bufid(frame: &Frame) -> Option<TcpBufId> {
    let tcp = frame.chain.tcp()?;
    let (src, dst) = if let Some(ipv4) = frame.chain.ipv4() {
        (IpAddr::V4(ipv4.src), IpAddr::V4(ipv4.dst))
    } else {
        let ipv6 = frame.chain.ipv6()?;
        (IpAddr::V6(ipv6.src), IpAddr::V6(ipv6.dst))
    };
    Some(TcpBufId {
        src,
        dst,
        src_port: tcp.src_port,
        dst_port: tcp.dst_port,
    })
}

pub(crate) fn tcp_segment(frame: &Frame) -> Option<TcpSegment> {
    let bufid = tcp_bufid(frame)?;
    let tcp = frame.chain.tcp()?;
    let payload = frame.payload_bytes(tcp.span);
    Some(TcpSegment {
        bufid,
        frame: frame.number(),
        ack: tcp.ack,
        seq: tcp.seq,
        syn: tcp.syn,
        fin: tcp.fin,
        payload: payload.to_vec(),
        first: tcp.seq,
        last: tcp.seq.wrapping_add(payload.len() as u32),
        len: payload.len(),
    })
}

pub(crate) fn trace_packet(frame: &Frame) -> Option<TracePacket> {
    let id = tcp_bufid(frame)?;
    let tcp = frame.chain.tcp()?;
    Some(TracePacket {
        id,
        frame: frame.number(),
        syn: tcp.syn,
        fin: tcp.fin,
        payload_len: tcp.span.end.saturating_sub(tcp.span.payload),
        timestamp: frame.info.time_epoch,
    })
}
