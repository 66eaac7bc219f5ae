use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use pcap_parser::{
    Block, LegacyPcapReader, Linktype, PcapBlockOwned, PcapNGReader, traits::PcapReaderIterator,
};

use crate::source::{CaptureFormat, Header, PacketEvent, PacketSource, SourceError};

use super::error::PcapSourceError;
use super::layout;
use super::reader::{
    is_pcapng_magic, legacy_magic_flags, legacy_ts_to_seconds, pcapng_ts_to_seconds,
    read_magic_and_rewind,
};

/// PCAP/PCAPNG packet source over any seekable byte stream.
///
/// The global header is parsed when the source is created; the handle is
/// released when the source is dropped.
pub struct PcapFileSource<R: Read = File> {
    header: Header,
    inner: PcapReader<R>,
}

enum PcapReader<R: Read> {
    Legacy {
        reader: LegacyPcapReader<R>,
        linktype: Linktype,
        nanosecond: bool,
    },
    Ng {
        reader: PcapNGReader<R>,
        interfaces: Vec<Interface>,
    },
}

#[derive(Debug, Clone, Copy)]
struct Interface {
    linktype: Linktype,
    tsresol: u8,
}

impl PcapFileSource<File> {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path).map_err(SourceError::from)?;
        Self::new(file)
    }
}

impl<R: Read + Seek> PcapFileSource<R> {
    pub fn new(reader: R) -> Result<Self, SourceError> {
        let (inner, header) = create_reader(reader).map_err(SourceError::from)?;
        Ok(Self { header, inner })
    }
}

impl<R: Read> PacketSource for PcapFileSource<R> {
    fn header(&self) -> &Header {
        &self.header
    }

    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError> {
        next_packet(&mut self.inner).map_err(SourceError::from)
    }
}

fn create_reader<R: Read + Seek>(reader: R) -> Result<(PcapReader<R>, Header), PcapSourceError> {
    let mut reader = reader;
    let magic = read_magic_and_rewind(&mut reader)?;

    if is_pcapng_magic(&magic) {
        let mut reader =
            PcapNGReader::new(layout::PCAP_READER_BUFFER_SIZE, reader).map_err(|e| {
                PcapSourceError::Pcap {
                    context: "pcapng reader init",
                    message: e.to_string(),
                }
            })?;
        let mut interfaces = Vec::new();
        let header = read_ng_header(&mut reader, &mut interfaces)?;
        Ok((PcapReader::Ng { reader, interfaces }, header))
    } else {
        let (nanosecond, big_endian) =
            legacy_magic_flags(&magic).ok_or(PcapSourceError::UnknownMagic(magic))?;
        let mut reader =
            LegacyPcapReader::new(layout::PCAP_READER_BUFFER_SIZE, reader).map_err(|e| {
                PcapSourceError::Pcap {
                    context: "pcap reader init",
                    message: e.to_string(),
                }
            })?;
        let header = read_legacy_header(&mut reader, nanosecond, big_endian)?;
        let linktype = header.linktype();
        Ok((
            PcapReader::Legacy {
                reader,
                linktype,
                nanosecond,
            },
            header,
        ))
    }
}

fn read_legacy_header<R: Read>(
    reader: &mut LegacyPcapReader<R>,
    nanosecond: bool,
    big_endian: bool,
) -> Result<Header, PcapSourceError> {
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let header = match block {
                    PcapBlockOwned::LegacyHeader(header) => Some(Header {
                        format: CaptureFormat::Pcap,
                        version_major: header.version_major,
                        version_minor: header.version_minor,
                        network: header.network.0,
                        snaplen: header.snaplen,
                        nanosecond,
                        big_endian,
                    }),
                    _ => None,
                };
                reader.consume(offset);
                if let Some(header) = header {
                    return Ok(header);
                }
            }
            Err(pcap_parser::PcapError::Eof) => return Err(PcapSourceError::MissingHeader),
            Err(pcap_parser::PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| PcapSourceError::Pcap {
                    context: "pcap header refill",
                    message: e.to_string(),
                })?;
            }
            Err(e) => {
                return Err(PcapSourceError::Pcap {
                    context: "pcap header",
                    message: e.to_string(),
                });
            }
        }
    }
}

/// Read blocks up to and including the first interface description.
///
/// A section without any interface is accepted (it cannot carry packets) and
/// reports an Ethernet linktype.
fn read_ng_header<R: Read>(
    reader: &mut PcapNGReader<R>,
    interfaces: &mut Vec<Interface>,
) -> Result<Header, PcapSourceError> {
    let mut section: Option<(u16, u16, bool)> = None;
    loop {
        match reader.next() {
            Ok((offset, block)) => {
                let mut header = None;
                match block {
                    PcapBlockOwned::NG(Block::SectionHeader(shb)) => {
                        section = Some((shb.major_version, shb.minor_version, shb.big_endian()));
                    }
                    PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                        interfaces.push(Interface {
                            linktype: intf.linktype,
                            tsresol: intf.if_tsresol,
                        });
                        header = section.map(|(major, minor, big_endian)| Header {
                            format: CaptureFormat::PcapNg,
                            version_major: major,
                            version_minor: minor,
                            network: intf.linktype.0,
                            snaplen: intf.snaplen,
                            nanosecond: intf.if_tsresol == 9,
                            big_endian,
                        });
                    }
                    _ => {}
                }
                reader.consume(offset);
                if let Some(header) = header {
                    return Ok(header);
                }
            }
            Err(pcap_parser::PcapError::Eof) => {
                return section
                    .map(|(major, minor, big_endian)| Header {
                        format: CaptureFormat::PcapNg,
                        version_major: major,
                        version_minor: minor,
                        network: Linktype::ETHERNET.0,
                        snaplen: 0,
                        nanosecond: false,
                        big_endian,
                    })
                    .ok_or(PcapSourceError::MissingHeader);
            }
            Err(pcap_parser::PcapError::Incomplete(_)) => {
                reader.refill().map_err(|e| PcapSourceError::Pcap {
                    context: "pcapng header refill",
                    message: e.to_string(),
                })?;
            }
            Err(e) => {
                return Err(PcapSourceError::Pcap {
                    context: "pcapng header",
                    message: e.to_string(),
                });
            }
        }
    }
}

fn next_packet<R: Read>(reader: &mut PcapReader<R>) -> Result<Option<PacketEvent>, PcapSourceError> {
    loop {
        match reader {
            PcapReader::Legacy {
                reader,
                linktype,
                nanosecond,
            } => match reader.next() {
                Ok((offset, block)) => {
                    let event = match block {
                        PcapBlockOwned::Legacy(packet) => Some(PacketEvent {
                            ts: Some(legacy_ts_to_seconds(
                                packet.ts_sec,
                                packet.ts_usec,
                                *nanosecond,
                            )),
                            linktype: *linktype,
                            if_id: 0,
                            caplen: packet.caplen,
                            origlen: packet.origlen,
                            data: packet.data.to_vec(),
                        }),
                        _ => None,
                    };
                    reader.consume(offset);
                    if event.is_some() {
                        return Ok(event);
                    }
                }
                Err(pcap_parser::PcapError::Eof) => return Ok(None),
                Err(pcap_parser::PcapError::Incomplete(_)) => {
                    reader.refill().map_err(|e| PcapSourceError::Pcap {
                        context: "pcap reader refill",
                        message: e.to_string(),
                    })?;
                }
                Err(e) => {
                    return Err(PcapSourceError::Pcap {
                        context: "pcap reader next",
                        message: e.to_string(),
                    });
                }
            },
            PcapReader::Ng { reader, interfaces } => match reader.next() {
                Ok((offset, block)) => {
                    let event = match block {
                        PcapBlockOwned::NG(Block::InterfaceDescription(intf)) => {
                            interfaces.push(Interface {
                                linktype: intf.linktype,
                                tsresol: intf.if_tsresol,
                            });
                            None
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(packet)) => {
                            let intf = interfaces.get(packet.if_id as usize).copied();
                            let tsresol = intf
                                .map(|intf| intf.tsresol)
                                .unwrap_or(layout::PCAPNG_DEFAULT_TSRESOL);
                            Some(PacketEvent {
                                ts: Some(pcapng_ts_to_seconds(
                                    packet.ts_high,
                                    packet.ts_low,
                                    tsresol,
                                )),
                                linktype: intf
                                    .map(|intf| intf.linktype)
                                    .unwrap_or(Linktype::ETHERNET),
                                if_id: packet.if_id,
                                caplen: packet.caplen,
                                origlen: packet.origlen,
                                data: unpadded(packet.data, packet.caplen).to_vec(),
                            })
                        }
                        _ => None,
                    };
                    reader.consume(offset);
                    if event.is_some() {
                        return Ok(event);
                    }
                }
                Err(pcap_parser::PcapError::Eof) => return Ok(None),
                Err(pcap_parser::PcapError::Incomplete(_)) => {
                    reader.refill().map_err(|e| PcapSourceError::Pcap {
                        context: "pcapng reader refill",
                        message: e.to_string(),
                    })?;
                }
                Err(e) => {
                    return Err(PcapSourceError::Pcap {
                        context: "pcapng reader next",
                        message: e.to_string(),
                    });
                }
            },
        }
    }
}

/// EPB data is padded to 32 bits; keep only the captured bytes.
fn unpadded(data: &[u8], caplen: u32) -> &[u8] {
    let len = (caplen as usize).min(data.len());
    &data[..len]
}
