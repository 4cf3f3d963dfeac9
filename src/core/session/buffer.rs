//! Pre-handshake audio staging.

use std::collections::VecDeque;

use bytes::Bytes;
use parking_lot::Mutex;

use crate::core::live::{LiveResult, UpstreamWriter};

/// Chunks held while the upstream handshake is in flight.
pub const STAGING_CAPACITY: usize = 8;

/// Bounded FIFO of audio chunks that arrived before the session was ready.
///
/// When full, new chunks are discarded so the earliest speech survives.
#[derive(Debug)]
pub struct AudioStagingBuffer {
    chunks: VecDeque<Bytes>,
    capacity: usize,
    dropped: usize,
}

impl AudioStagingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            chunks: VecDeque::with_capacity(capacity),
            capacity,
            dropped: 0,
        }
    }

    /// Append `chunk` if there is room. Returns `false` when it was dropped.
    pub fn offer(&mut self, chunk: Bytes) -> bool {
        if self.chunks.len() >= self.capacity {
            self.dropped += 1;
            return false;
        }
        self.chunks.push_back(chunk);
        true
    }

    /// Remove and return every held chunk in arrival order.
    pub fn drain(&mut self) -> Vec<Bytes> {
        self.chunks.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Chunks discarded because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

impl Default for AudioStagingBuffer {
    fn default() -> Self {
        Self::new(STAGING_CAPACITY)
    }
}

/// What happened to a chunk handed to [`StagingGate::admit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Forwarded,
    Staged,
    Dropped,
}

struct GateState {
    ready: bool,
    buffer: AudioStagingBuffer,
}

/// The `ready` flag and the staging buffer behind one lock.
///
/// Opening the gate flips `ready` and flushes the backlog in the same
/// critical section, so a chunk admitted concurrently either lands in the
/// backlog before the flush or is forwarded after it. Nothing is left
/// behind or reordered.
pub struct StagingGate {
    state: Mutex<GateState>,
}

impl StagingGate {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(GateState {
                ready: false,
                buffer: AudioStagingBuffer::new(capacity),
            }),
        }
    }

    /// Forward `chunk` when ready, otherwise stage it.
    pub fn admit(&self, chunk: Bytes, upstream: &UpstreamWriter) -> LiveResult<Admission> {
        let mut state = self.state.lock();
        if state.ready {
            upstream.send_audio(&chunk)?;
            return Ok(Admission::Forwarded);
        }
        Ok(if state.buffer.offer(chunk) {
            Admission::Staged
        } else {
            Admission::Dropped
        })
    }

    /// Mark the session ready and flush the backlog upstream.
    ///
    /// Returns the number of flushed chunks, or `None` if the gate was
    /// already open.
    pub fn open(&self, upstream: &UpstreamWriter) -> LiveResult<Option<usize>> {
        let mut state = self.state.lock();
        if state.ready {
            return Ok(None);
        }
        state.ready = true;
        let backlog = state.buffer.drain();
        for chunk in &backlog {
            upstream.send_audio(chunk)?;
        }
        Ok(Some(backlog.len()))
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().ready
    }

    /// Chunks dropped while the gate was closed.
    pub fn dropped(&self) -> usize {
        self.state.lock().buffer.dropped()
    }
}

impl Default for StagingGate {
    fn default() -> Self {
        Self::new(STAGING_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transport::{Frame, Transport};
    use futures::StreamExt;

    fn chunk(n: u8) -> Bytes {
        Bytes::from(vec![n])
    }

    #[test]
    fn test_offer_tail_drops_when_full() {
        let mut buffer = AudioStagingBuffer::default();
        for n in 0..8 {
            assert!(buffer.offer(chunk(n)));
        }
        assert!(!buffer.offer(chunk(8)));
        assert!(!buffer.offer(chunk(9)));

        assert_eq!(buffer.len(), 8);
        assert_eq!(buffer.dropped(), 2);
        let drained = buffer.drain();
        assert_eq!(drained, (0..8).map(chunk).collect::<Vec<_>>());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_drain_empty_buffer() {
        let mut buffer = AudioStagingBuffer::new(2);
        assert!(buffer.drain().is_empty());
    }

    #[tokio::test]
    async fn test_gate_flushes_backlog_then_forwards() {
        let (local, mut remote) = Transport::in_memory_pair();
        let (writer, handle) = UpstreamWriter::spawn(local.sink);
        let gate = StagingGate::new(2);

        assert_eq!(gate.admit(chunk(1), &writer).unwrap(), Admission::Staged);
        assert_eq!(gate.admit(chunk(2), &writer).unwrap(), Admission::Staged);
        assert_eq!(gate.admit(chunk(3), &writer).unwrap(), Admission::Dropped);
        assert!(!gate.is_ready());

        assert_eq!(gate.open(&writer).unwrap(), Some(2));
        assert_eq!(gate.open(&writer).unwrap(), None);
        assert_eq!(gate.admit(chunk(4), &writer).unwrap(), Admission::Forwarded);
        assert_eq!(gate.dropped(), 1);

        writer.close();
        handle.await.unwrap();

        let mut payloads = Vec::new();
        while let Some(Ok(Frame::Text(text))) = remote.stream.next().await {
            let value: serde_json::Value = serde_json::from_str(&text).unwrap();
            payloads.push(value["realtimeInput"]["audio"]["data"].as_str().unwrap().to_string());
        }
        // base64 of [1], [2], [4]
        assert_eq!(payloads, vec!["AQ==", "Ag==", "BA=="]);
    }
}
