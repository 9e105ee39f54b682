//! Bounded message history
//!
//! The history buffer is an append-only log of delivered payloads, one per
//! line. When an append would push the log over its capacity, whole lines
//! are evicted from the front first. The buffer is replayed to newly joined
//! peers in fixed-size chunks.

use bytes::Bytes;
use tracing::trace;

use crate::core::{HISTORY_CAPACITY, HISTORY_CHUNK_SIZE};

const TERMINATOR: char = '\n';

/// Line-oriented log of payloads bounded by a byte capacity
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    /// Newline-terminated payload lines, oldest first
    contents: String,
    /// Byte size accounted for `contents`
    size: usize,
    /// Capacity in bytes
    capacity: usize,
    /// Maximum size of one snapshot chunk
    chunk_size: usize,
}

impl HistoryBuffer {
    /// Creates an empty buffer with the given capacity and the default chunk size
    pub fn new(capacity: usize) -> Self {
        Self::with_chunk_size(capacity, HISTORY_CHUNK_SIZE)
    }

    /// Creates an empty buffer with explicit capacity and chunk size
    pub fn with_chunk_size(capacity: usize, chunk_size: usize) -> Self {
        HistoryBuffer {
            contents: String::new(),
            size: 0,
            capacity,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Appends a payload as one line, evicting the oldest lines as needed.
    ///
    /// A line larger than the capacity evicts everything before it and is
    /// then appended anyway, so the capacity is exceeded until the next
    /// eviction.
    pub fn append(&mut self, payload: &str) {
        let line_size = payload.len() + TERMINATOR.len_utf8();

        while self.size + line_size > self.capacity && !self.contents.is_empty() {
            let Some(pos) = self.contents.find(TERMINATOR) else {
                break;
            };
            let removed = pos + 1;
            self.contents.drain(..removed);
            self.size -= removed;
            trace!(removed, "Evicted history line");
        }

        self.contents.push_str(payload);
        self.contents.push(TERMINATOR);
        self.size += line_size;
    }

    /// Splits the current contents into chunks of at most `chunk_size` bytes.
    ///
    /// Chunks cut at byte offsets, so a chunk may end mid-line (or mid
    /// character); concatenating all chunks restores the contents exactly.
    pub fn snapshot(&self) -> Vec<Bytes> {
        self.contents
            .as_bytes()
            .chunks(self.chunk_size)
            .map(Bytes::copy_from_slice)
            .collect()
    }

    /// Current size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty()
    }

    /// Stored lines without their terminators, oldest first
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.contents.lines()
    }

    /// Raw contents, every line newline-terminated
    pub fn contents(&self) -> &str {
        &self.contents
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}
