//! pcapex core library: frame extraction from PCAP/PCAPNG captures.
//!
//! The pipeline is: a packet `source` reads the global header and raw
//! records, `frame` decodes each record into a protocol chain, and the
//! `extract` layer records frames to an `output` sink while feeding the
//! `reassembly` engines and the `trace` flow tracer. All file I/O stays in
//! `source` and `output`.
//!
//! Invariants:
//! - Frame numbers start at 1 and strictly increase.
//! - The global header is read exactly once, before any frame.
//! - Reassembly engines are fed in a fixed order: IPv4, IPv6, TCP.
//! - A closed extractor never reads again; closing is idempotent.
//!
//! # Examples
//! ```no_run
//! use pcapex_core::{Extractor, ExtractorOptions};
//!
//! let options = ExtractorOptions {
//!     format: Some("json".to_string()),
//!     ip: true,
//!     ..ExtractorOptions::default()
//! };
//! let extraction = Extractor::run("capture.pcap", options)?;
//! println!("{} frames", extraction.length());
//! # Ok::<(), pcapex_core::ExtractError>(())
//! ```

mod extract;
pub mod frame;
pub mod output;
pub mod reassembly;
pub mod source;
pub mod trace;

pub use extract::{
    ExtractError, Extraction, Extractor, ExtractorOptions, HEADER_RECORD, ReassemblyView,
};
pub use frame::{DecodeError, Frame, FrameInfo, Layer, ProtoChain, Protocol, decode_frame};
pub use output::{OutputError, OutputFormat, OutputTarget, Sink};
pub use reassembly::{Datagram, Ipv4BufId, Ipv6BufId, Reassembly, TcpBufId};
pub use source::{CaptureFormat, Header, PacketEvent, PacketSource, PcapFileSource, SourceError};
pub use trace::{FlowTracer, TraceFlow};
