//! Fragment and segment reassembly.
//!
//! Each engine accumulates descriptors keyed by a buffer identifier (bufid)
//! and emits a [`Datagram`] once every piece of a buffer has arrived. Engines
//! know nothing about frames or files; the extractor builds the descriptors
//! from decoded layers and feeds them in frame order.
//!
//! Buffers that never complete are not lost: [`Reassembly::snapshot`] lists
//! them after the emitted datagrams, and [`Reassembly::finish`] emits them,
//! both flagged `completed: false`. `strict` only decides what happens at a
//! hole: strict engines cut the data at the first missing byte, lenient ones
//! join the pieces on either side of it.

use std::borrow::Cow;
use std::fmt::Debug;
use std::hash::Hash;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use serde::Serialize;

mod ip;
mod tcp;

pub use ip::{IpFragment, IpReassembly, Ipv4Fragment, Ipv4Reassembly, Ipv6Fragment, Ipv6Reassembly};
pub use tcp::{TcpReassembly, TcpSegment};

/// Stateful reassembly engine.
pub trait Reassembly {
    type Fragment;
    type Id;

    /// Store one fragment or segment, completing its buffer if possible.
    fn ingest(&mut self, fragment: Self::Fragment);

    /// Datagrams (or streams) emitted so far, in completion order.
    fn datagrams(&self) -> &[Datagram<Self::Id>];

    /// Buffers still open, as incomplete datagrams ordered by first frame.
    fn open_buffers(&self) -> Vec<Datagram<Self::Id>>;

    /// Emit every open buffer as an incomplete datagram. Called once, at end
    /// of capture.
    fn finish(&mut self);

    /// Emitted datagrams followed by the open buffers.
    fn snapshot(&self) -> Cow<'_, [Datagram<Self::Id>]>
    where
        Self::Id: Clone,
    {
        let open = self.open_buffers();
        if open.is_empty() {
            return Cow::Borrowed(self.datagrams());
        }
        let mut all = self.datagrams().to_vec();
        all.extend(open);
        Cow::Owned(all)
    }
}

/// Key of an in-progress reassembly buffer.
pub trait BufId: Clone + Eq + Hash + Debug {
    const PROTOCOL: &'static str;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Ipv4BufId {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub id: u16,
    pub proto: u8,
}

impl BufId for Ipv4BufId {
    const PROTOCOL: &'static str = "IPv4";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Ipv6BufId {
    pub src: Ipv6Addr,
    pub dst: Ipv6Addr,
    pub label: u32,
    pub next_header: u8,
}

impl BufId for Ipv6BufId {
    const PROTOCOL: &'static str = "IPv6";
}

/// One direction of a TCP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TcpBufId {
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
}

impl BufId for TcpBufId {
    const PROTOCOL: &'static str = "TCP";
}

/// A reassembled IP datagram or TCP stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Datagram<K> {
    pub id: K,
    /// Numbers of the frames that contributed, in arrival order.
    pub index: Vec<u64>,
    /// Unfragmentable header, for IP datagrams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    /// `false` when pieces were missing or the buffer never closed.
    pub completed: bool,
}

impl<K> Datagram<K> {
    /// Header followed by payload.
    pub fn packet(&self) -> Vec<u8> {
        let mut packet = self.header.clone().unwrap_or_default();
        packet.extend_from_slice(&self.payload);
        packet
    }
}

/// Concatenate pieces sorted by offset, trimming overlaps (lower offsets win).
///
/// Returns the data and, when some bytes are missing, the length of the data
/// before the first hole. With `cut_at_hole` the data ends there.
pub(crate) fn assemble<'a, I>(pieces: I, cut_at_hole: bool) -> (Vec<u8>, Option<usize>)
where
    I: IntoIterator<Item = (usize, &'a [u8])>,
{
    let mut data = Vec::new();
    let mut covered = 0usize;
    let mut hole = None;
    for (offset, piece) in pieces {
        let end = offset + piece.len();
        if end <= covered {
            continue;
        }
        if offset > covered {
            hole.get_or_insert(data.len());
            if cut_at_hole {
                break;
            }
            covered = offset;
        }
        data.extend_from_slice(&piece[covered - offset..]);
        covered = end;
    }
    (data, hole)
}
