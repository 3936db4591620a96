//! Per-connection map from stream id to its reassembly buffer.
//!
//! An attached body is referenced from two directions: the envelope that
//! describes it claims the stream, and the `Stream` frames carrying it
//! complete the stream. Either may happen first. An entry is dropped once
//! both have happened; the claimant already holds its own handle.
//!
//! Completed bodies nobody has claimed yet are bounded by count and bytes.
//! Past either limit the oldest is ended and dropped.

use std::collections::{HashMap, VecDeque};

use tracing::warn;

use crate::protocol::StreamId;
use crate::stream::SubscribableStream;

/// Default cap on completed, unclaimed streams.
pub const DEFAULT_MAX_UNCLAIMED_STREAMS: usize = 256;

/// Default cap on bytes held by completed, unclaimed streams (64 MiB).
pub const DEFAULT_MAX_UNCLAIMED_BYTES: usize = 64 * 1024 * 1024;

struct Entry {
    stream: SubscribableStream,
    claimed: bool,
    completed: bool,
    /// Bytes buffered when the stream completed.
    size: usize,
}

impl Entry {
    fn new() -> Self {
        Self {
            stream: SubscribableStream::new(),
            claimed: false,
            completed: false,
            size: 0,
        }
    }

    fn is_unclaimed(&self) -> bool {
        self.completed && !self.claimed
    }
}

/// Registry of open streams, owned by the receive task.
pub struct StreamRegistry {
    entries: HashMap<StreamId, Entry>,
    /// Completed but unclaimed ids, oldest first.
    unclaimed: VecDeque<StreamId>,
    unclaimed_bytes: usize,
    max_unclaimed_streams: usize,
    max_unclaimed_bytes: usize,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::with_limits(DEFAULT_MAX_UNCLAIMED_STREAMS, DEFAULT_MAX_UNCLAIMED_BYTES)
    }
}

impl StreamRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty registry with custom limits on unclaimed streams.
    pub fn with_limits(max_streams: usize, max_bytes: usize) -> Self {
        Self {
            entries: HashMap::new(),
            unclaimed: VecDeque::new(),
            unclaimed_bytes: 0,
            max_unclaimed_streams: max_streams,
            max_unclaimed_bytes: max_bytes,
        }
    }

    /// Register a new stream.
    ///
    /// Returns `None` if `id` is already registered.
    pub fn create(&mut self, id: StreamId) -> Option<SubscribableStream> {
        if self.entries.contains_key(&id) {
            return None;
        }
        let entry = Entry::new();
        let stream = entry.stream.clone();
        self.entries.insert(id, entry);
        Some(stream)
    }

    /// Look up an open stream.
    pub fn get(&self, id: &StreamId) -> Option<SubscribableStream> {
        self.entries.get(id).map(|e| e.stream.clone())
    }

    /// Look up an open stream, registering it on first sight.
    pub fn get_or_create(&mut self, id: StreamId) -> SubscribableStream {
        self.entries
            .entry(id)
            .or_insert_with(Entry::new)
            .stream
            .clone()
    }

    /// Remove a stream without ending it.
    pub fn delete(&mut self, id: &StreamId) -> Option<SubscribableStream> {
        self.remove(id).map(|e| e.stream)
    }

    /// Hand the stream to the envelope that references it.
    pub fn claim(&mut self, id: StreamId) -> SubscribableStream {
        let entry = self.entries.entry(id).or_insert_with(Entry::new);
        let stream = entry.stream.clone();
        if entry.completed {
            self.remove(&id);
        } else {
            entry.claimed = true;
        }
        stream
    }

    /// Give up on a stream whose envelope was rejected.
    ///
    /// A completed stream is dropped now, one still arriving once its last
    /// frame is in. Unknown ids are ignored.
    pub fn release(&mut self, id: &StreamId) {
        if self.entries.contains_key(id) {
            drop(self.claim(*id));
        }
    }

    /// Record that the last frame of the stream arrived.
    pub fn mark_completed(&mut self, id: &StreamId) {
        let Some(entry) = self.entries.get_mut(id) else {
            return;
        };
        if entry.claimed {
            self.entries.remove(id);
            return;
        }
        if entry.completed {
            return;
        }

        entry.completed = true;
        entry.size = entry.stream.buffered();
        self.unclaimed_bytes += entry.size;
        self.unclaimed.push_back(*id);
        self.evict_unclaimed();
    }

    fn evict_unclaimed(&mut self) {
        while self.unclaimed.len() > self.max_unclaimed_streams
            || self.unclaimed_bytes > self.max_unclaimed_bytes
        {
            let Some(id) = self.unclaimed.pop_front() else {
                break;
            };
            if let Some(entry) = self.entries.remove(&id) {
                self.unclaimed_bytes -= entry.size;
                warn!(%id, bytes = entry.size, "no envelope claimed stream, dropping it");
                entry.stream.end();
            }
        }
    }

    /// Remove an entry and its unclaimed bookkeeping.
    fn remove(&mut self, id: &StreamId) -> Option<Entry> {
        let entry = self.entries.remove(id)?;
        if entry.is_unclaimed() {
            self.unclaimed.retain(|queued| queued != id);
            self.unclaimed_bytes -= entry.size;
        }
        Some(entry)
    }

    /// End and drop one stream.
    pub fn close(&mut self, id: &StreamId) {
        if let Some(entry) = self.remove(id) {
            entry.stream.end();
        }
    }

    /// End every stream and clear the registry.
    pub fn close_all(&mut self) {
        for (_, entry) in self.entries.drain() {
            entry.stream.end();
        }
        self.unclaimed.clear();
        self.unclaimed_bytes = 0;
    }

    /// Check if `id` is registered.
    pub fn contains(&self, id: &StreamId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of registered streams.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no stream is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of completed streams no envelope has claimed.
    pub fn unclaimed_count(&self) -> usize {
        self.unclaimed.len()
    }

    /// Bytes held by completed streams no envelope has claimed.
    pub fn unclaimed_bytes(&self) -> usize {
        self.unclaimed_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_rejects_duplicate() {
        let mut registry = StreamRegistry::new();
        let id = StreamId::new();

        assert!(registry.create(id).is_some());
        assert!(registry.create(id).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_get_or_create_returns_same_stream() {
        let mut registry = StreamRegistry::new();
        let id = StreamId::new();

        let a = registry.get_or_create(id);
        let b = registry.get_or_create(id);
        a.write(b"xy").unwrap();
        assert_eq!(b.buffered(), 2);
        assert!(registry.get(&id).is_some());
    }

    #[test]
    fn test_entry_dropped_after_claim_and_completion() {
        let mut registry = StreamRegistry::new();
        let id = StreamId::new();

        registry.get_or_create(id);
        registry.mark_completed(&id);
        assert!(registry.contains(&id));

        let _stream = registry.claim(id);
        assert!(!registry.contains(&id));
    }

    #[test]
    fn test_claim_before_completion() {
        let mut registry = StreamRegistry::new();
        let id = StreamId::new();

        let claimed = registry.claim(id);
        assert!(registry.contains(&id));

        registry.get_or_create(id).write(b"body").unwrap();
        registry.mark_completed(&id);

        assert!(registry.is_empty());
        assert_eq!(claimed.buffered(), 4);
    }

    #[test]
    fn test_unclaimed_streams_capped_by_count() {
        let mut registry = StreamRegistry::with_limits(2, usize::MAX);
        let ids: Vec<StreamId> = (0..3).map(|_| StreamId::new()).collect();
        let streams: Vec<_> = ids.iter().map(|&id| registry.get_or_create(id)).collect();

        for id in &ids {
            registry.mark_completed(id);
        }

        assert_eq!(registry.unclaimed_count(), 2);
        assert!(!registry.contains(&ids[0]));
        assert!(streams[0].is_ended());
        assert!(registry.contains(&ids[1]) && registry.contains(&ids[2]));
    }

    #[test]
    fn test_unclaimed_streams_capped_by_bytes() {
        let mut registry = StreamRegistry::with_limits(usize::MAX, 10);
        let old = StreamId::new();
        let new = StreamId::new();

        registry.get_or_create(old).write(&[0u8; 6]).unwrap();
        registry.mark_completed(&old);
        assert_eq!(registry.unclaimed_bytes(), 6);

        registry.get_or_create(new).write(&[0u8; 6]).unwrap();
        registry.mark_completed(&new);

        assert!(!registry.contains(&old));
        assert!(registry.contains(&new));
        assert_eq!(registry.unclaimed_bytes(), 6);
    }

    #[test]
    fn test_claim_clears_unclaimed_accounting() {
        let mut registry = StreamRegistry::new();
        let id = StreamId::new();

        registry.get_or_create(id).write(b"body").unwrap();
        registry.mark_completed(&id);
        assert_eq!(registry.unclaimed_count(), 1);

        let claimed = registry.claim(id);
        assert_eq!(claimed.buffered(), 4);
        assert_eq!(registry.unclaimed_count(), 0);
        assert_eq!(registry.unclaimed_bytes(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_release_drops_now_or_on_completion() {
        let mut registry = StreamRegistry::new();
        let done = StreamId::new();
        let arriving = StreamId::new();

        registry.get_or_create(done);
        registry.mark_completed(&done);
        registry.get_or_create(arriving);

        registry.release(&done);
        registry.release(&arriving);
        registry.release(&StreamId::new());

        assert!(!registry.contains(&done));
        assert!(registry.contains(&arriving));
        registry.mark_completed(&arriving);
        assert!(registry.is_empty());
        assert_eq!(registry.unclaimed_count(), 0);
    }

    #[test]
    fn test_close_all_ends_streams() {
        let mut registry = StreamRegistry::new();
        let streams: Vec<_> = (0..3).map(|_| registry.get_or_create(StreamId::new())).collect();

        registry.close_all();

        assert!(registry.is_empty());
        assert!(streams.iter().all(|s| s.is_ended()));
    }

    #[test]
    fn test_delete_and_close() {
        let mut registry = StreamRegistry::new();
        let a = StreamId::new();
        let b = StreamId::new();
        registry.create(a);
        let stream_b = registry.create(b).unwrap();

        assert!(registry.delete(&a).is_some());
        assert!(registry.delete(&a).is_none());

        registry.close(&b);
        assert!(stream_b.is_ended());
        assert!(registry.is_empty());
    }
}
