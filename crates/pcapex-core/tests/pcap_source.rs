mod common;

use std::fs;
use std::io::Cursor;

use common::{pcap_bytes, pcapng_bytes, udp_packet, write_pcap};
use pcapex_core::{CaptureFormat, PacketSource, PcapFileSource, SourceError};
use tempfile::TempDir;

#[test]
fn pcap_source_reads_packets_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("input.pcap");
    write_pcap(
        &path,
        &[
            udp_packet([10, 0, 0, 1], [10, 0, 0, 2], b"a"),
            udp_packet([10, 0, 0, 1], [10, 0, 0, 2], b"b"),
        ],
    );
    let mut source = PcapFileSource::open(&path).unwrap();
    assert_eq!(source.header().format, CaptureFormat::Pcap);
    assert_eq!(source.header().snaplen, 65535);
    assert!(!source.header().nanosecond);

    let mut stamps = Vec::new();
    while let Some(event) = source.next_packet().unwrap() {
        assert_eq!(event.caplen, event.origlen);
        stamps.push(event.ts.unwrap());
    }
    assert_eq!(stamps, vec![1.0, 2.0]);
}

#[test]
fn pcapng_source_merges_section_and_interface() {
    let packet = udp_packet([10, 0, 0, 1], [10, 0, 0, 2], b"odd");
    let bytes = pcapng_bytes(&[(1_500_000, packet.clone()), (2_000_000, packet.clone())]);
    let mut source = PcapFileSource::new(Cursor::new(bytes)).unwrap();

    let header = source.header().clone();
    assert_eq!(header.format, CaptureFormat::PcapNg);
    assert_eq!(header.version(), (1, 0));
    assert_eq!(header.linktype(), pcap_parser::Linktype::ETHERNET);
    assert!(header.big_endian);

    let first = source.next_packet().unwrap().unwrap();
    assert_eq!(first.if_id, 0);
    assert_eq!(first.data, packet);
    assert!((first.ts.unwrap() - 1.5).abs() < 1e-9);
    assert!(source.next_packet().unwrap().is_some());
    assert!(source.next_packet().unwrap().is_none());
}

#[test]
fn pcap_source_rejects_truncated_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("truncated.pcapng");
    fs::write(&path, [0x0a, 0x0d, 0x0d]).unwrap();

    let err = match PcapFileSource::open(&path) {
        Ok(_) => panic!("expected truncated file to be rejected"),
        Err(err) => err,
    };
    assert!(matches!(err, SourceError::Io(_)));
}

#[test]
fn empty_capture_has_header_and_no_packets() {
    let bytes = pcap_bytes(common::LINKTYPE_RAW, &[]);
    let mut source = PcapFileSource::new(Cursor::new(bytes)).unwrap();
    assert_eq!(source.header().network, 101);
    assert!(source.next_packet().unwrap().is_none());
}

#[test]
fn unknown_magic_is_rejected() {
    let mut bytes = pcap_bytes(common::LINKTYPE_RAW, &[]);
    bytes[..4].copy_from_slice(b"GIF8");
    let err = match PcapFileSource::new(Cursor::new(bytes)) {
        Ok(_) => panic!("expected unknown magic to be rejected"),
        Err(err) => err,
    };
    assert!(matches!(err, SourceError::Pcap(message) if message.contains("not a PCAP")));
}

#[test]
fn little_endian_microsecond_magic_is_read() {
    let bytes = pcap_bytes(common::LINKTYPE_RAW, &[]);
    assert_eq!(&bytes[..4], &[0xd4, 0xc3, 0xb2, 0xa1]);
    let source = PcapFileSource::new(Cursor::new(bytes)).unwrap();
    assert!(!source.header().nanosecond);
    assert!(!source.header().big_endian);
}
