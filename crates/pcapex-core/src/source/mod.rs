mod pcap;

pub use pcap::PcapFileSource;

use pcap_parser::Linktype;
use serde::Serialize;
use thiserror::Error;

/// Capture file container format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureFormat {
    Pcap,
    PcapNg,
}

/// Global header of a capture file, read once when the source is opened.
///
/// For PCAPNG inputs this merges the section header block with the first
/// interface description block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Header {
    pub format: CaptureFormat,
    pub version_major: u16,
    pub version_minor: u16,
    /// Raw data-link type (`LINKTYPE_*`) of the capture.
    pub network: i32,
    pub snaplen: u32,
    pub nanosecond: bool,
    pub big_endian: bool,
}

impl Header {
    /// Data-link type of the first (or only) interface.
    pub fn linktype(&self) -> Linktype {
        Linktype(self.network)
    }

    /// Format version as `(major, minor)`.
    pub fn version(&self) -> (u16, u16) {
        (self.version_major, self.version_minor)
    }
}

/// One packet record, still undecoded.
#[derive(Debug, Clone)]
pub struct PacketEvent {
    pub ts: Option<f64>,
    pub linktype: Linktype,
    pub if_id: u32,
    pub caplen: u32,
    pub origlen: u32,
    pub data: Vec<u8>,
}

/// Stream of packet records behind a global header.
///
/// `next_packet` returns `Ok(None)` at end of file.
pub trait PacketSource {
    fn header(&self) -> &Header;
    fn next_packet(&mut self) -> Result<Option<PacketEvent>, SourceError>;
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PCAP parse error: {0}")]
    Pcap(String),
}

impl From<pcap::error::PcapSourceError> for SourceError {
    fn from(value: pcap::error::PcapSourceError) -> Self {
        match value {
            pcap::error::PcapSourceError::Io(err) => SourceError::Io(err),
            pcap::error::PcapSourceError::Pcap { context, message } => {
                SourceError::Pcap(format!("{context}: {message}"))
            }
            pcap::error::PcapSourceError::MissingHeader => {
                SourceError::Pcap("global header: missing".to_string())
            }
            err @ pcap::error::PcapSourceError::UnknownMagic(_) => {
                SourceError::Pcap(err.to_string())
            }
        }
    }
}
