#![allow(dead_code)]

use std::cell::Cell;
use std::fs;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::rc::Rc;

use etherparse::PacketBuilder;

pub const LINKTYPE_ETHERNET: u32 = 1;
pub const LINKTYPE_RAW: u32 = 101;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_IPV6: u16 = 0x86dd;
const IPV6_FRAGMENT: u8 = 44;
pub const UDP_PROTO: u8 = 17;

const SRC_MAC: [u8; 6] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
const DST_MAC: [u8; 6] = [0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f];

/// Legacy little-endian microsecond PCAP; packet `i` is stamped `i + 1` seconds.
pub fn pcap_bytes(linktype: u32, packets: &[Vec<u8>]) -> Vec<u8> {
    let mut output = Vec::new();
    output.extend_from_slice(&0xa1b2_c3d4u32.to_le_bytes());
    output.extend_from_slice(&2u16.to_le_bytes());
    output.extend_from_slice(&4u16.to_le_bytes());
    output.extend_from_slice(&0i32.to_le_bytes());
    output.extend_from_slice(&0u32.to_le_bytes());
    output.extend_from_slice(&65535u32.to_le_bytes());
    output.extend_from_slice(&linktype.to_le_bytes());

    for (idx, data) in packets.iter().enumerate() {
        let len = data.len() as u32;
        output.extend_from_slice(&(idx as u32 + 1).to_le_bytes());
        output.extend_from_slice(&0u32.to_le_bytes());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(&len.to_le_bytes());
        output.extend_from_slice(data);
    }
    output
}

pub fn write_pcap(path: &Path, packets: &[Vec<u8>]) {
    fs::write(path, pcap_bytes(LINKTYPE_ETHERNET, packets)).expect("write capture");
}

/// Big-endian PCAPNG with one Ethernet interface and microsecond stamps.
pub fn pcapng_bytes(packets: &[(u64, Vec<u8>)]) -> Vec<u8> {
    let mut output = Vec::new();
    output.extend_from_slice(&pcapng_block(0x0A0D0D0A, &section_header_body()));
    output.extend_from_slice(&pcapng_block(1, &interface_desc_body()));
    for (ts_us, data) in packets {
        output.extend_from_slice(&pcapng_block(6, &enhanced_packet_body(*ts_us, data)));
    }
    output
}

fn pcapng_block(block_type: u32, body: &[u8]) -> Vec<u8> {
    let total_len = (8 + body.len() + 4) as u32;
    let mut block = Vec::with_capacity(total_len as usize);
    block.extend_from_slice(&block_type.to_be_bytes());
    block.extend_from_slice(&total_len.to_be_bytes());
    block.extend_from_slice(body);
    block.extend_from_slice(&total_len.to_be_bytes());
    block
}

fn section_header_body() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0x1A2B3C4Du32.to_be_bytes());
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&(-1i64).to_be_bytes());
    body
}

fn interface_desc_body() -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&1u16.to_be_bytes());
    body.extend_from_slice(&0u16.to_be_bytes());
    body.extend_from_slice(&65535u32.to_be_bytes());
    body
}

fn enhanced_packet_body(ts_us: u64, data: &[u8]) -> Vec<u8> {
    let ts_high = (ts_us >> 32) as u32;
    let ts_low = (ts_us & 0xFFFF_FFFF) as u32;
    let cap_len = data.len() as u32;
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_be_bytes());
    body.extend_from_slice(&ts_high.to_be_bytes());
    body.extend_from_slice(&ts_low.to_be_bytes());
    body.extend_from_slice(&cap_len.to_be_bytes());
    body.extend_from_slice(&cap_len.to_be_bytes());
    body.extend_from_slice(data);
    let pad_len = (4 - (data.len() % 4)) % 4;
    body.extend(std::iter::repeat_n(0u8, pad_len));
    body
}

pub fn udp_packet(src: [u8; 4], dst: [u8; 4], payload: &[u8]) -> Vec<u8> {
    let builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src, dst, 64)
        .udp(5000, 6000);
    let mut packet = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).expect("build udp packet");
    packet
}

/// Flags applied to [`tcp_packet`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpFlags {
    pub syn: bool,
    pub fin: bool,
}

pub const SYN: TcpFlags = TcpFlags {
    syn: true,
    fin: false,
};
pub const FIN: TcpFlags = TcpFlags {
    syn: false,
    fin: true,
};
pub const NONE: TcpFlags = TcpFlags {
    syn: false,
    fin: false,
};

pub fn tcp_packet(
    src: ([u8; 4], u16),
    dst: ([u8; 4], u16),
    seq: u32,
    flags: TcpFlags,
    payload: &[u8],
) -> Vec<u8> {
    let mut builder = PacketBuilder::ethernet2(SRC_MAC, DST_MAC)
        .ipv4(src.0, dst.0, 64)
        .tcp(src.1, dst.1, seq, 65535);
    if flags.syn {
        builder = builder.syn();
    }
    if flags.fin {
        builder = builder.fin();
    }
    let mut packet = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut packet, payload).expect("build tcp packet");
    packet
}

fn ethernet(ether_type: u16, body: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(14 + body.len());
    packet.extend_from_slice(&DST_MAC);
    packet.extend_from_slice(&SRC_MAC);
    packet.extend_from_slice(&ether_type.to_be_bytes());
    packet.extend_from_slice(body);
    packet
}

/// Ethernet-framed IPv4 fragment with DF clear; `offset` is in bytes.
pub fn ipv4_fragment(id: u16, offset: usize, more: bool, data: &[u8]) -> Vec<u8> {
    let total_len = 20u16 + data.len() as u16;
    let mut flags = (offset / 8) as u16;
    if more {
        flags |= 0x2000;
    }
    let mut header = [0u8; 20];
    header[0] = 0x45;
    header[2..4].copy_from_slice(&total_len.to_be_bytes());
    header[4..6].copy_from_slice(&id.to_be_bytes());
    header[6..8].copy_from_slice(&flags.to_be_bytes());
    header[8] = 64;
    header[9] = UDP_PROTO;
    header[12..16].copy_from_slice(&[192, 168, 0, 1]);
    header[16..20].copy_from_slice(&[192, 168, 0, 2]);
    let checksum = ipv4_checksum(&header);
    header[10..12].copy_from_slice(&checksum.to_be_bytes());

    let mut body = header.to_vec();
    body.extend_from_slice(data);
    ethernet(ETHERTYPE_IPV4, &body)
}

fn ipv4_checksum(header: &[u8; 20]) -> u16 {
    let mut sum = 0u32;
    for chunk in header.chunks(2) {
        let part = u16::from_be_bytes([chunk[0], chunk[1]]) as u32;
        sum = sum.wrapping_add(part);
    }
    while (sum >> 16) != 0 {
        sum = (sum & 0xFFFF) + (sum >> 16);
    }
    !(sum as u16)
}

/// Ethernet-framed IPv6 packet with a fragment header; `offset` is in bytes.
pub fn ipv6_fragment(id: u32, offset: usize, more: bool, data: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(48 + data.len());
    body.extend_from_slice(&[0x60, 0x00, 0x00, 0x00]);
    body.extend_from_slice(&(8u16 + data.len() as u16).to_be_bytes());
    body.push(IPV6_FRAGMENT);
    body.push(64);
    let mut src = [0u8; 16];
    src[0] = 0xfe;
    src[1] = 0x80;
    src[15] = 1;
    let mut dst = src;
    dst[15] = 2;
    body.extend_from_slice(&src);
    body.extend_from_slice(&dst);

    let mut offset_field = ((offset / 8) as u16) << 3;
    if more {
        offset_field |= 1;
    }
    body.push(UDP_PROTO);
    body.push(0);
    body.extend_from_slice(&offset_field.to_be_bytes());
    body.extend_from_slice(&id.to_be_bytes());
    body.extend_from_slice(data);
    ethernet(ETHERTYPE_IPV6, &body)
}

/// Ethernet frame too short to carry its header.
pub fn runt_frame() -> Vec<u8> {
    vec![0xff; 6]
}

/// In-memory capture handle that counts how often it is dropped.
pub struct CountingHandle {
    inner: Cursor<Vec<u8>>,
    drops: Rc<Cell<usize>>,
}

impl CountingHandle {
    pub fn new(bytes: Vec<u8>) -> (Self, Rc<Cell<usize>>) {
        let drops = Rc::new(Cell::new(0));
        let handle = Self {
            inner: Cursor::new(bytes),
            drops: Rc::clone(&drops),
        };
        (handle, drops)
    }
}

impl Read for CountingHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for CountingHandle {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl Drop for CountingHandle {
    fn drop(&mut self) {
        self.drops.set(self.drops.get() + 1);
    }
}
