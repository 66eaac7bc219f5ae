use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{BufId, Datagram, Reassembly, TcpBufId, assemble};

/// One TCP segment as fed to [`TcpReassembly`].
#[derive(Debug, Clone)]
pub struct TcpSegment {
    pub bufid: TcpBufId,
    pub frame: u64,
    pub ack: u32,
    pub seq: u32,
    pub syn: bool,
    pub fin: bool,
    pub payload: Vec<u8>,
    /// Sequence number of the first payload byte.
    pub first: u32,
    /// Sequence number just past the payload (wrapping).
    pub last: u32,
    pub len: usize,
}

impl TcpSegment {
    /// Sequence number of the first data byte; a SYN occupies one number.
    fn data_seq(&self) -> u32 {
        if self.syn {
            self.first.wrapping_add(1)
        } else {
            self.first
        }
    }
}

#[derive(Debug, Clone)]
struct TcpBuffer {
    isn: u32,
    /// Whether `isn` was taken from a SYN. Otherwise capture started
    /// mid-stream and an earlier segment may still move it back.
    from_syn: bool,
    index: Vec<u64>,
    segments: BTreeMap<usize, Vec<u8>>,
}

impl TcpBuffer {
    fn new(segment: &TcpSegment) -> Self {
        Self {
            isn: segment.data_seq(),
            from_syn: segment.syn,
            index: Vec::new(),
            segments: BTreeMap::new(),
        }
    }

    /// Move the origin to `isn`, shifting stored offsets. Data that would
    /// land before the new origin is discarded.
    fn rebase(&mut self, isn: u32) {
        let shift = i64::from(self.isn.wrapping_sub(isn) as i32);
        self.segments = std::mem::take(&mut self.segments)
            .into_iter()
            .filter_map(|(offset, data)| {
                let moved = offset as i64 + shift;
                (moved >= 0).then_some((moved as usize, data))
            })
            .collect();
        self.isn = isn;
    }

    fn insert(&mut self, segment: &TcpSegment) {
        if segment.syn && !self.from_syn {
            self.rebase(segment.data_seq());
            self.from_syn = true;
        }
        if segment.payload.is_empty() {
            return;
        }
        let seq = segment.data_seq();
        let relative = seq.wrapping_sub(self.isn) as i32;
        if relative < 0 {
            if self.from_syn {
                debug!(frame = segment.frame, "dropping segment before ISN");
                return;
            }
            self.rebase(seq);
        }
        let offset = seq.wrapping_sub(self.isn) as usize;
        let stored = self.segments.entry(offset).or_default();
        if segment.payload.len() > stored.len() {
            *stored = segment.payload.clone();
        }
    }

    fn into_datagram(self, id: TcpBufId, closed: bool, strict: bool) -> Datagram<TcpBufId> {
        let (payload, hole) = assemble(
            self.segments
                .iter()
                .map(|(offset, data)| (*offset, data.as_slice())),
            strict,
        );
        Datagram {
            id,
            index: self.index,
            header: None,
            payload,
            completed: closed && hole.is_none(),
        }
    }
}

/// TCP stream reassembly, one buffer per connection direction.
///
/// Offsets are relative to the ISN: the SYN sequence number plus one, or the
/// first sequence number seen when the handshake was not captured. A FIN
/// closes the buffer and emits the stream; it is `completed` only when no
/// bytes are missing. Retransmitted bytes are dropped. Streams with missing
/// bytes end at the first hole when `strict`.
#[derive(Debug)]
pub struct TcpReassembly {
    strict: bool,
    buffers: HashMap<TcpBufId, TcpBuffer>,
    datagrams: Vec<Datagram<TcpBufId>>,
}

impl TcpReassembly {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            buffers: HashMap::new(),
            datagrams: Vec::new(),
        }
    }

    pub fn strict(&self) -> bool {
        self.strict
    }

    pub fn pending(&self) -> usize {
        self.buffers.len()
    }
}

impl Reassembly for TcpReassembly {
    type Fragment = TcpSegment;
    type Id = TcpBufId;

    fn ingest(&mut self, segment: TcpSegment) {
        if !self.buffers.contains_key(&segment.bufid) && !segment.syn && segment.payload.is_empty()
        {
            return;
        }
        let buffer = self
            .buffers
            .entry(segment.bufid)
            .or_insert_with(|| TcpBuffer::new(&segment));
        buffer.index.push(segment.frame);
        buffer.insert(&segment);

        if segment.fin {
            if let Some(buffer) = self.buffers.remove(&segment.bufid) {
                let datagram = buffer.into_datagram(segment.bufid, true, self.strict);
                debug!(
                    protocol = TcpBufId::PROTOCOL,
                    id = ?datagram.id,
                    frames = datagram.index.len(),
                    bytes = datagram.payload.len(),
                    completed = datagram.completed,
                    "stream reassembled"
                );
                self.datagrams.push(datagram);
            }
        }
    }

    fn datagrams(&self) -> &[Datagram<TcpBufId>] {
        &self.datagrams
    }

    fn open_buffers(&self) -> Vec<Datagram<TcpBufId>> {
        let mut pending: Vec<_> = self.buffers.iter().collect();
        pending.sort_by_key(|(_, buffer)| buffer.index.first().copied());
        pending
            .into_iter()
            .map(|(id, buffer)| buffer.clone().into_datagram(*id, false, self.strict))
            .collect()
    }

    fn finish(&mut self) {
        let open = self.open_buffers();
        if !open.is_empty() {
            debug!(
                protocol = TcpBufId::PROTOCOL,
                buffers = open.len(),
                "emitting unfinished streams"
            );
        }
        self.buffers.clear();
        self.datagrams.extend(open);
    }
}
