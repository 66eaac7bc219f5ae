use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use super::{BufId, Datagram, Ipv4BufId, Ipv6BufId, Reassembly, assemble};

/// One IP fragment as fed to an [`IpReassembly`] engine.
#[derive(Debug, Clone)]
pub struct IpFragment<K> {
    pub bufid: K,
    /// Number of the frame carrying this fragment.
    pub frame: u64,
    /// Fragment offset in bytes.
    pub offset: usize,
    /// Length of `header` in bytes.
    pub header_len: usize,
    pub more_fragments: bool,
    /// Header plus fragment data, as announced by the packet.
    pub total_len: usize,
    pub header: Vec<u8>,
    pub payload: Vec<u8>,
}

pub type Ipv4Fragment = IpFragment<Ipv4BufId>;
pub type Ipv6Fragment = IpFragment<Ipv6BufId>;

pub type Ipv4Reassembly = IpReassembly<Ipv4BufId>;
pub type Ipv6Reassembly = IpReassembly<Ipv6BufId>;

#[derive(Debug, Clone, Default)]
struct IpBuffer {
    index: Vec<u64>,
    header: Option<Vec<u8>>,
    /// Payload length, known once the last fragment arrived.
    total: Option<usize>,
    fragments: BTreeMap<usize, Vec<u8>>,
}

impl IpBuffer {
    fn is_complete(&self) -> bool {
        let Some(total) = self.total else {
            return false;
        };
        if self.header.is_none() {
            return false;
        }
        let mut covered = 0usize;
        for (offset, data) in &self.fragments {
            if *offset > covered {
                return false;
            }
            covered = covered.max(offset + data.len());
        }
        covered >= total
    }

    fn into_datagram<K>(self, id: K, completed: bool, strict: bool) -> Datagram<K> {
        let (mut payload, _) = assemble(
            self.fragments
                .iter()
                .map(|(offset, data)| (*offset, data.as_slice())),
            strict,
        );
        if let Some(total) = self.total {
            payload.truncate(total);
        }
        Datagram {
            id,
            index: self.index,
            header: self.header,
            payload,
            completed,
        }
    }
}

/// IPv4/IPv6 fragment reassembly keyed by bufid.
///
/// A buffer completes when the last fragment (MF clear) has fixed the payload
/// length, the offset-0 fragment supplied the header, and the stored
/// fragments cover the payload without holes. Where fragments overlap, the
/// bytes of the lower offset win; a repeated offset keeps the longer data.
/// Incomplete buffers are cut at their first hole when `strict`.
#[derive(Debug)]
pub struct IpReassembly<K> {
    strict: bool,
    buffers: HashMap<K, IpBuffer>,
    datagrams: Vec<Datagram<K>>,
}

impl<K: BufId> IpReassembly<K> {
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

    /// Number of buffers still waiting for fragments.
    pub fn pending(&self) -> usize {
        self.buffers.len()
    }

    fn pending_by_first_frame(&self) -> Vec<(&K, &IpBuffer)> {
        let mut pending: Vec<_> = self.buffers.iter().collect();
        pending.sort_by_key(|(_, buffer)| buffer.index.first().copied());
        pending
    }
}

impl<K: BufId> Reassembly for IpReassembly<K> {
    type Fragment = IpFragment<K>;
    type Id = K;

    fn ingest(&mut self, fragment: IpFragment<K>) {
        let IpFragment {
            bufid,
            frame,
            offset,
            header_len,
            more_fragments,
            total_len,
            header,
            mut payload,
        } = fragment;
        payload.truncate(total_len.saturating_sub(header_len));

        let buffer = self.buffers.entry(bufid.clone()).or_default();
        buffer.index.push(frame);
        if offset == 0 && buffer.header.is_none() {
            buffer.header = Some(header);
        }
        if !more_fragments && buffer.total.is_none() {
            buffer.total = Some(offset + payload.len());
        }
        let stored = buffer.fragments.entry(offset).or_default();
        if payload.len() > stored.len() {
            *stored = payload;
        }

        if buffer.is_complete() {
            if let Some(buffer) = self.buffers.remove(&bufid) {
                let datagram = buffer.into_datagram(bufid, true, self.strict);
                debug!(
                    protocol = K::PROTOCOL,
                    id = ?datagram.id,
                    frames = datagram.index.len(),
                    bytes = datagram.payload.len(),
                    "datagram reassembled"
                );
                self.datagrams.push(datagram);
            }
        }
    }

    fn datagrams(&self) -> &[Datagram<K>] {
        &self.datagrams
    }

    fn open_buffers(&self) -> Vec<Datagram<K>> {
        self.pending_by_first_frame()
            .into_iter()
            .map(|(id, buffer)| buffer.clone().into_datagram(id.clone(), false, self.strict))
            .collect()
    }

    fn finish(&mut self) {
        let open = self.open_buffers();
        if !open.is_empty() {
            debug!(
                protocol = K::PROTOCOL,
                buffers = open.len(),
                "emitting incomplete datagrams"
            );
        }
        self.buffers.clear();
        self.datagrams.extend(open);
    }
}

#[cfg(test)]
mod tests {
    use super::{Ipv4Fragment, Ipv4Reassembly};
    use crate::reassembly::{Ipv4BufId, Reassembly};
    use std::net::Ipv4Addr;

    fn bufid(id: u16) -> Ipv4BufId {
        Ipv4BufId {
            src: Ipv4Addr::new(10, 0, 0, 1),
            dst: Ipv4Addr::new(10, 0, 0, 2),
            id,
            proto: 17,
        }
    }

    fn fragment(id: u16, frame: u64, offset: usize, more: bool, payload: &[u8]) -> Ipv4Fragment {
        Ipv4Fragment {
            bufid: bufid(id),
            frame,
            offset,
            header_len: 20,
            more_fragments: more,
            total_len: 20 + payload.len(),
            header: vec![0x45; 20],
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn reassembles_out_of_order_fragments() {
        let mut engine = Ipv4Reassembly::new(false);
        engine.ingest(fragment(1, 1, 16, false, b"CCCC"));
        engine.ingest(fragment(1, 2, 0, true, b"AAAAAAAA"));
        assert!(engine.datagrams().is_empty());
        engine.ingest(fragment(1, 3, 8, true, b"BBBBBBBB"));

        let datagrams = engine.datagrams();
        assert_eq!(datagrams.len(), 1);
        let datagram = &datagrams[0];
        assert!(datagram.completed);
        assert_eq!(datagram.index, vec![1, 2, 3]);
        assert_eq!(datagram.payload, b"AAAAAAAABBBBBBBBCCCC");
        assert_eq!(datagram.packet().len(), 40);
        assert_eq!(engine.pending(), 0);
    }

    #[test]
    fn unfragmented_packet_completes_immediately() {
        let mut engine = Ipv4Reassembly::new(false);
        engine.ingest(fragment(9, 1, 0, false, b"whole"));
        assert_eq!(engine.datagrams().len(), 1);
        assert_eq!(engine.datagrams()[0].payload, b"whole");
    }

    #[test]
    fn buffers_are_separated_by_bufid() {
        let mut engine = Ipv4Reassembly::new(false);
        engine.ingest(fragment(1, 1, 0, true, b"AAAAAAAA"));
        engine.ingest(fragment(2, 2, 8, false, b"ZZ"));
        assert!(engine.datagrams().is_empty());
        assert_eq!(engine.pending(), 2);
    }

    #[test]
    fn finish_emits_incomplete_buffers() {
        let mut engine = Ipv4Reassembly::new(false);
        engine.ingest(fragment(3, 4, 0, true, b"AAAAAAAA"));
        engine.ingest(fragment(3, 6, 16, false, b"CC"));
        engine.finish();

        let datagrams = engine.datagrams();
        assert_eq!(datagrams.len(), 1);
        assert!(!datagrams[0].completed);
        assert_eq!(datagrams[0].index, vec![4, 6]);
        assert_eq!(datagrams[0].payload, b"AAAAAAAACC");
        assert_eq!(engine.pending(), 0);
    }

    #[test]
    fn strict_cuts_incomplete_buffer_at_hole() {
        let mut engine = Ipv4Reassembly::new(true);
        engine.ingest(fragment(3, 4, 0, true, b"AAAAAAAA"));
        engine.ingest(fragment(3, 6, 16, false, b"CC"));
        engine.finish();

        let datagrams = engine.datagrams();
        assert_eq!(datagrams.len(), 1);
        assert!(!datagrams[0].completed);
        assert_eq!(datagrams[0].payload, b"AAAAAAAA");
    }

    #[test]
    fn snapshot_lists_open_buffers_after_emitted_ones() {
        let mut engine = Ipv4Reassembly::new(false);
        engine.ingest(fragment(2, 1, 8, false, b"late"));
        engine.ingest(fragment(1, 2, 0, false, b"whole"));

        let snapshot = engine.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot[0].completed);
        assert_eq!(snapshot[0].payload, b"whole");
        assert!(!snapshot[1].completed);
        assert_eq!(snapshot[1].index, vec![1]);
        assert_eq!(engine.datagrams().len(), 1);
        assert_eq!(engine.pending(), 1);
    }

    #[test]
    fn trailing_padding_is_cut_to_total_length() {
        let mut engine = Ipv4Reassembly::new(false);
        let mut padded = fragment(5, 1, 0, false, b"data");
        padded.payload.extend_from_slice(&[0, 0, 0]);
        engine.ingest(padded);
        assert_eq!(engine.datagrams()[0].payload, b"data");
    }
}
