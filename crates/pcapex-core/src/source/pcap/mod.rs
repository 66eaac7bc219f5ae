//! PCAP/PCAPNG source implementation.
//!
//! This module provides a `PacketSource` backed by PCAP or PCAPNG files. It
//! handles file I/O and low-level parsing: the global header is read once when
//! the source is created, then raw packet records are emitted one by one for
//! the frame decoder.

pub mod error;
pub mod layout;
pub mod parser;
pub mod reader;

pub use parser::PcapFileSource;
