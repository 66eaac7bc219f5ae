use thiserror::Error;

#[derive(Debug, Error)]
pub enum PcapSourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("PCAP parse error ({context}): {message}")]
    Pcap {
        context: &'static str,
        message: String,
    },
    #[error("capture ended before the global header")]
    MissingHeader,
    #[error("not a PCAP or PCAPNG file (magic {0:02x?})")]
    UnknownMagic([u8; 4]),
}
