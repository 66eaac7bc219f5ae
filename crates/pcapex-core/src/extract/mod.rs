//! Capture extraction.
//!
//! An [`Extractor`] owns one capture handle. It reads the global header once
//! when created, then decodes frames one at a time, records them to the
//! output sink, feeds the enabled reassembly engines (IPv4, then IPv6, then
//! TCP) and the flow tracer.
//!
//! Three ways to consume a capture:
//! - pull: call [`Extractor::next_frame`] until it returns `Ok(None)`;
//! - iterate: `Extractor` is an [`Iterator`] of `Result<Frame, ExtractError>`;
//! - auto: [`Extractor::run`] reads everything and returns an [`Extraction`]
//!   holding only the results.
//!
//! The handle is released when the capture ends, on [`Extractor::close`], or
//! when the extractor is dropped. Reassembly engines are finished at that
//! point, so open buffers are emitted exactly once. A frame that fails to
//! decode is reported and skipped; the next call reads the following record.

use std::borrow::Cow;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use pcap_parser::Linktype;
use tracing::{debug, info, warn};

mod error;
mod feed;
mod options;

pub use error::ExtractError;
pub use options::ExtractorOptions;

use crate::frame::{Frame, ProtoChain, decode_frame};
use crate::output::{self, OutputTarget, ResolvedOutput, Sink};
use crate::reassembly::{
    Datagram, Ipv4BufId, Ipv4Reassembly, Ipv6BufId, Ipv6Reassembly, Reassembly, TcpBufId,
    TcpReassembly,
};
use crate::source::{Header, PacketSource, PcapFileSource};
use crate::trace::{FlowTracer, TraceFlow};

/// Record name of the global header.
pub const HEADER_RECORD: &str = "Global Header";

/// Reassembled datagrams per protocol; `None` when that engine is disabled.
///
/// Buffers still open follow the emitted datagrams, flagged
/// `completed: false`.
#[derive(Debug, Clone, Default)]
pub struct ReassemblyView<'a> {
    pub ipv4: Option<Cow<'a, [Datagram<Ipv4BufId>]>>,
    pub ipv6: Option<Cow<'a, [Datagram<Ipv6BufId>]>>,
    pub tcp: Option<Cow<'a, [Datagram<TcpBufId>]>>,
}

#[derive(Debug, Default)]
struct Engines {
    ipv4: Option<Ipv4Reassembly>,
    ipv6: Option<Ipv6Reassembly>,
    tcp: Option<TcpReassembly>,
}

impl Engines {
    fn new(options: &ExtractorOptions) -> Self {
        Self {
            ipv4: options
                .ipv4_enabled()
                .then(|| Ipv4Reassembly::new(options.strict)),
            ipv6: options
                .ipv6_enabled()
                .then(|| Ipv6Reassembly::new(options.strict)),
            tcp: options
                .tcp_enabled()
                .then(|| TcpReassembly::new(options.strict)),
        }
    }

    fn feed(&mut self, frame: &Frame) {
        if let Some(engine) = self.ipv4.as_mut() {
            if let Some(fragment) = feed::ipv4_fragment(frame) {
                engine.ingest(fragment);
            }
        }
        if let Some(engine) = self.ipv6.as_mut() {
            if let Some(fragment) = feed::ipv6_fragment(frame) {
                engine.ingest(fragment);
            }
        }
        if let Some(engine) = self.tcp.as_mut() {
            if let Some(segment) = feed::tcp_segment(frame) {
                engine.ingest(segment);
            }
        }
    }

    fn finish(&mut self) {
        if let Some(engine) = self.ipv4.as_mut() {
            engine.finish();
        }
        if let Some(engine) = self.ipv6.as_mut() {
            engine.finish();
        }
        if let Some(engine) = self.tcp.as_mut() {
            engine.finish();
        }
    }

    fn view(&self) -> ReassemblyView<'_> {
        ReassemblyView {
            ipv4: self.ipv4.as_ref().map(Reassembly::snapshot),
            ipv6: self.ipv6.as_ref().map(Reassembly::snapshot),
            tcp: self.tcp.as_ref().map(Reassembly::snapshot),
        }
    }
}

/// Frame-by-frame reader over one capture.
///
/// # Examples
/// ```no_run
/// use pcapex_core::{Extractor, ExtractorOptions};
///
/// let options = ExtractorOptions {
///     nofile: true,
///     tcp: true,
///     ..ExtractorOptions::default()
/// };
/// let mut extractor = Extractor::open("capture.pcap", options)?;
/// while let Some(frame) = extractor.next_frame()? {
///     println!("{}: {}", frame.number(), frame.chain);
/// }
/// let streams = extractor.reassembly().tcp.unwrap_or_default();
/// println!("{} TCP streams", streams.len());
/// # Ok::<(), pcapex_core::ExtractError>(())
/// ```
pub struct Extractor<S: PacketSource = PcapFileSource> {
    source: Option<S>,
    header: Header,
    options: ExtractorOptions,
    input: Option<PathBuf>,
    output: Option<ResolvedOutput>,
    sink: Option<Box<dyn Sink>>,
    length: u64,
    frames: Vec<Frame>,
    protocol: Option<ProtoChain>,
    engines: Engines,
    tracer: Option<FlowTracer>,
}

impl Extractor<PcapFileSource<File>> {
    /// Open a capture file for pull or iterator consumption.
    ///
    /// Input and output names are resolved first (see
    /// [`OutputTarget::resolve`]); the global header is read and recorded
    /// before this returns.
    ///
    /// # Errors
    /// `InputNotFound`, `FormatUnspecified` and `UnsupportedFormat` for
    /// naming problems, `Io`/`Source` when the file cannot be opened or has
    /// no valid global header.
    pub fn open(path: impl AsRef<Path>, options: ExtractorOptions) -> Result<Self, ExtractError> {
        let target = OutputTarget::resolve(options.names(path.as_ref()))?;
        let file = File::open(&target.input)?;
        let source = PcapFileSource::new(file)?;
        let sink = target
            .output
            .as_ref()
            .map(output::create_sink)
            .transpose()?;

        let mut extractor = Self::new(source, options, sink);
        extractor.input = Some(target.input);
        extractor.output = target.output;
        extractor.record_header()?;
        Ok(extractor)
    }

    /// Extract a whole capture and close it.
    ///
    /// The returned [`Extraction`] only exposes results; frames can no longer
    /// be pulled from it.
    ///
    /// ```compile_fail
    /// fn iterate(extraction: pcapex_core::Extraction) {
    ///     for _frame in extraction {}
    /// }
    /// ```
    ///
    /// ```compile_fail
    /// fn pull(mut extraction: pcapex_core::Extraction) {
    ///     let _ = extraction.next_frame();
    /// }
    /// ```
    pub fn run(
        path: impl AsRef<Path>,
        options: ExtractorOptions,
    ) -> Result<Extraction, ExtractError> {
        Self::open(path, options)?.drain()
    }
}

impl<R: Read + Seek> Extractor<PcapFileSource<R>> {
    /// Extract from an already open handle. No output is written.
    pub fn from_reader(reader: R, options: ExtractorOptions) -> Result<Self, ExtractError> {
        let source = PcapFileSource::new(reader)?;
        Self::from_source(source, options, None)
    }
}

impl<S: PacketSource> Extractor<S> {
    /// Extract from any packet source, recording to `sink` when given.
    pub fn from_source(
        source: S,
        options: ExtractorOptions,
        sink: Option<Box<dyn Sink>>,
    ) -> Result<Self, ExtractError> {
        let mut extractor = Self::new(source, options, sink);
        extractor.record_header()?;
        Ok(extractor)
    }

    fn new(source: S, options: ExtractorOptions, sink: Option<Box<dyn Sink>>) -> Self {
        let header = source.header().clone();
        Self {
            source: Some(source),
            header,
            engines: Engines::new(&options),
            tracer: options.trace.then(FlowTracer::new),
            options,
            input: None,
            output: None,
            sink,
            length: 0,
            frames: Vec::new(),
            protocol: None,
        }
    }

    fn record_header(&mut self) -> Result<(), ExtractError> {
        debug!(
            format = ?self.header.format,
            linktype = self.header.network,
            snaplen = self.header.snaplen,
            "global header read"
        );
        if let Some(sink) = self.sink.as_mut() {
            sink.record(HEADER_RECORD, &serde_json::to_value(&self.header)?)?;
        }
        Ok(())
    }

    /// Read the next frame.
    ///
    /// Returns `Ok(None)` once the capture is exhausted, closing the
    /// extractor; any call after that returns [`ExtractError::Closed`]. A
    /// decode error leaves the extractor open: the failed record still counts
    /// as a frame number and the next call moves on to the following record.
    pub fn next_frame(&mut self) -> Result<Option<Frame>, ExtractError> {
        match self.read_next_frame()? {
            Some(frame) => Ok(Some(frame)),
            None => {
                self.close()?;
                Ok(None)
            }
        }
    }

    fn read_next_frame(&mut self) -> Result<Option<Frame>, ExtractError> {
        let source = self.source.as_mut().ok_or(ExtractError::Closed)?;
        let Some(event) = source.next_packet()? else {
            return Ok(None);
        };
        let number = self.length + 1;
        self.length = number;
        let frame = decode_frame(number, event)?;

        debug!(
            frame = number,
            caplen = frame.info.caplen,
            protocols = %frame.chain,
            "frame decoded"
        );
        if self.options.verbose {
            info!(" - Frame {number:>3}: {}", frame.chain);
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.record(&format!("Frame {number}"), &serde_json::to_value(&frame)?)?;
        }

        self.protocol = Some(frame.chain.clone());
        self.engines.feed(&frame);
        if let Some(tracer) = self.tracer.as_mut() {
            if let Some(packet) = feed::trace_packet(&frame) {
                tracer.observe(packet);
            }
        }
        if self.options.store {
            self.frames.push(frame.clone());
        }
        Ok(Some(frame))
    }

    /// Release the capture handle, finish reassembly and the output.
    ///
    /// Idempotent: only the first call has any effect.
    pub fn close(&mut self) -> Result<(), ExtractError> {
        let Some(source) = self.source.take() else {
            return Ok(());
        };
        drop(source);
        self.engines.finish();
        debug!(frames = self.length, "extractor closed");
        if let Some(sink) = self.sink.as_mut() {
            sink.finish()?;
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.source.is_none()
    }

    /// Read all remaining frames, close, and keep only the results.
    pub fn drain(mut self) -> Result<Extraction, ExtractError> {
        while self.next_frame()?.is_some() {}
        Ok(Extraction {
            header: self.header.clone(),
            input: self.input.take(),
            output: self.output.take(),
            length: self.length,
            protocol: self.protocol.take(),
            frames: self
                .options
                .store
                .then(|| std::mem::take(&mut self.frames)),
            engines: std::mem::take(&mut self.engines),
            trace: self.tracer.take().map(FlowTracer::into_flows),
        })
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn linktype(&self) -> Linktype {
        self.header.linktype()
    }

    pub fn version(&self) -> (u16, u16) {
        self.header.version()
    }

    /// Number of records read so far, including any that failed to decode.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Protocol chain of the last frame read.
    pub fn protocol(&self) -> Option<&ProtoChain> {
        self.protocol.as_ref()
    }

    pub fn frames(&self) -> Result<&[Frame], ExtractError> {
        if !self.options.store {
            return Err(ExtractError::FramesNotStored);
        }
        Ok(&self.frames)
    }

    pub fn reassembly(&self) -> ReassemblyView<'_> {
        self.engines.view()
    }

    pub fn trace(&self) -> Result<&[TraceFlow], ExtractError> {
        self.tracer
            .as_ref()
            .map(FlowTracer::flows)
            .ok_or(ExtractError::TraceDisabled)
    }

    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    /// Output file or directory; `None` when nothing is written.
    pub fn output(&self) -> Option<&Path> {
        self.output.as_ref().map(|output| output.path.as_path())
    }

    pub fn format(&self) -> Option<&str> {
        self.output.as_ref().map(|output| output.format.as_str())
    }
}

impl<S: PacketSource> Iterator for Extractor<S> {
    type Item = Result<Frame, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.is_closed() {
            return None;
        }
        self.next_frame().transpose()
    }
}

impl<S: PacketSource> Drop for Extractor<S> {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close extractor");
        }
    }
}

impl<S: PacketSource> fmt::Debug for Extractor<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extractor")
            .field("header", &self.header)
            .field("options", &self.options)
            .field("length", &self.length)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Results of a completed extraction.
#[derive(Debug)]
pub struct Extraction {
    header: Header,
    input: Option<PathBuf>,
    output: Option<ResolvedOutput>,
    length: u64,
    protocol: Option<ProtoChain>,
    frames: Option<Vec<Frame>>,
    engines: Engines,
    trace: Option<Vec<TraceFlow>>,
}

impl Extraction {
    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn linktype(&self) -> Linktype {
        self.header.linktype()
    }

    pub fn version(&self) -> (u16, u16) {
        self.header.version()
    }

    pub fn length(&self) -> u64 {
        self.length
    }

    pub fn protocol(&self) -> Option<&ProtoChain> {
        self.protocol.as_ref()
    }

    pub fn frames(&self) -> Result<&[Frame], ExtractError> {
        self.frames
            .as_deref()
            .ok_or(ExtractError::FramesNotStored)
    }

    pub fn reassembly(&self) -> ReassemblyView<'_> {
        self.engines.view()
    }

    pub fn trace(&self) -> Result<&[TraceFlow], ExtractError> {
        self.trace.as_deref().ok_or(ExtractError::TraceDisabled)
    }

    pub fn input(&self) -> Option<&Path> {
        self.input.as_deref()
    }

    pub fn output(&self) -> Option<&Path> {
        self.output.as_ref().map(|output| output.path.as_path())
    }

    pub fn format(&self) -> Option<&str> {
        self.output.as_ref().map(|output| output.format.as_str())
    }
}
