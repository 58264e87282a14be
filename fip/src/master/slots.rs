//! SlotTable - fixed-capacity arena of module connections.
//!
//! Freed indices go back on a min-heap free list, so a new connection always
//! takes the lowest free index. Dropping a slot closes its socket.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::io;
use std::pin::Pin;
use std::time::Duration;

use futures::StreamExt;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::bytes::Bytes;
use tokio_util::codec::FramedRead;

use crate::bridge::codec::{CodecError, FrameCodec};

pub type BoxedReader = Pin<Box<dyn AsyncRead + Send>>;
pub type BoxedWriter = Pin<Box<dyn AsyncWrite + Send>>;

/// A stalled peer holding a full socket buffer counts as lost after this.
const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

/// One connected module.
pub struct Slot {
    reader: FramedRead<BoxedReader, FrameCodec>,
    writer: BoxedWriter,
}

/// Outcome of a broadcast pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Slots that received the frame, ascending.
    pub delivered: Vec<usize>,
    /// Slots dropped because the write failed.
    pub evicted: Vec<usize>,
}

/// Result of waiting on one slot for a frame.
#[derive(Debug)]
pub enum SlotRead {
    Frame(Bytes),
    /// Nothing arrived in time.
    Empty,
    /// Peer closed the connection.
    Closed,
    Failed(io::Error),
}

pub struct SlotTable {
    slots: Vec<Option<Slot>>,
    free: BinaryHeap<Reverse<usize>>,
}

impl SlotTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| None).collect(),
            free: (0..capacity).map(Reverse).collect(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.free.is_empty()
    }

    pub fn contains(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    /// Occupied indices, ascending.
    pub fn indices(&self) -> Vec<usize> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|_| i))
            .collect()
    }

    /// Store a connection in the lowest free slot. Returns `None` when full.
    pub fn insert<R, W>(&mut self, reader: R, writer: W) -> Option<usize>
    where
        R: AsyncRead + Send + 'static,
        W: AsyncWrite + Send + 'static,
    {
        let Reverse(index) = self.free.pop()?;
        let reader: BoxedReader = Box::pin(reader);
        self.slots[index] = Some(Slot {
            reader: FramedRead::new(reader, FrameCodec::new()),
            writer: Box::pin(writer),
        });
        Some(index)
    }

    /// Close and free a slot. Returns whether it was occupied.
    pub fn remove(&mut self, index: usize) -> bool {
        match self.slots.get_mut(index).and_then(Option::take) {
            Some(slot) => {
                drop(slot);
                self.free.push(Reverse(index));
                true
            }
            None => false,
        }
    }

    /// Close every slot.
    pub fn clear(&mut self) {
        for index in self.indices() {
            self.remove(index);
        }
    }

    /// Write one frame to one slot, evicting it on failure.
    ///
    /// Returns whether the frame was delivered.
    pub async fn write_frame(&mut self, index: usize, frame: &[u8]) -> bool {
        let Some(Some(slot)) = self.slots.get_mut(index) else {
            return false;
        };

        let result = match tokio::time::timeout(WRITE_TIMEOUT, async {
            slot.writer.write_all(frame).await?;
            slot.writer.flush().await
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(io::Error::new(io::ErrorKind::TimedOut, "write timed out")),
        };

        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(slot = index, error = %e, "Write failed, dropping module connection");
                self.remove(index);
                false
            }
        }
    }

    /// Write one frame to every occupied slot in ascending index order.
    ///
    /// Slots freed during the pass are not refilled until the next accept.
    pub async fn broadcast_frame(&mut self, frame: &[u8]) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        for index in self.indices() {
            if self.write_frame(index, frame).await {
                report.delivered.push(index);
            } else {
                report.evicted.push(index);
            }
        }
        report
    }

    /// Wait up to `wait` for the next whole frame from a slot.
    pub async fn read_frame(&mut self, index: usize, wait: Duration) -> SlotRead {
        let Some(Some(slot)) = self.slots.get_mut(index) else {
            return SlotRead::Closed;
        };

        match tokio::time::timeout(wait, slot.reader.next()).await {
            Err(_) => SlotRead::Empty,
            Ok(None) => SlotRead::Closed,
            Ok(Some(Ok(frame))) => SlotRead::Frame(frame),
            Ok(Some(Err(CodecError::Io(e)))) => SlotRead::Failed(e),
            Ok(Some(Err(e))) => SlotRead::Failed(io::Error::other(e)),
        }
    }
}
