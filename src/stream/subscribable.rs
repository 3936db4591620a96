//! Append-only byte buffer with a single asynchronous reader.
//!
//! The producer side ([`SubscribableStream`]) is cheaply cloneable and never
//! blocks. The consumer side ([`StreamReader`]) is handed out once; its read
//! methods take `&mut self`, so two outstanding reads cannot exist.
//!
//! # Example
//!
//! ```ignore
//! use streamwire::stream::SubscribableStream;
//!
//! let stream = SubscribableStream::new();
//! let mut reader = stream.reader()?;
//!
//! stream.write(b"hello world")?;
//! stream.end();
//!
//! assert_eq!(&reader.read(5).await?[..], b"hello");
//! assert_eq!(&reader.read(100).await?[..], b" world");
//! ```

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::{Bytes, BytesMut};
use tokio::sync::Notify;

use crate::error::{Result, StreamingError};

#[derive(Default)]
struct State {
    buffer: BytesMut,
    ended: bool,
    reader_taken: bool,
    total_written: usize,
}

struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

/// Producer handle of an append-only byte stream.
#[derive(Clone)]
pub struct SubscribableStream {
    shared: Arc<Shared>,
}

impl SubscribableStream {
    /// Create an empty, open stream.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                notify: Notify::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // Every critical section leaves the state consistent.
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append bytes and wake the reader.
    ///
    /// # Errors
    ///
    /// `StreamClosed` once [`end`](Self::end) was called.
    pub fn write(&self, data: &[u8]) -> Result<()> {
        {
            let mut state = self.state();
            if state.ended {
                return Err(StreamingError::StreamClosed);
            }
            state.buffer.extend_from_slice(data);
            state.total_written += data.len();
        }
        self.shared.notify.notify_one();
        Ok(())
    }

    /// Mark the stream complete. Idempotent.
    ///
    /// An outstanding read resolves with whatever is buffered.
    pub fn end(&self) {
        self.state().ended = true;
        self.shared.notify.notify_one();
    }

    /// Check if the producer has finished.
    pub fn is_ended(&self) -> bool {
        self.state().ended
    }

    /// Total bytes ever written.
    pub fn total_written(&self) -> usize {
        self.state().total_written
    }

    /// Bytes written but not yet read.
    pub fn buffered(&self) -> usize {
        self.state().buffer.len()
    }

    /// Take the single reader of this stream.
    ///
    /// # Errors
    ///
    /// `ReaderTaken` if a reader was already handed out.
    pub fn reader(&self) -> Result<StreamReader> {
        let mut state = self.state();
        if state.reader_taken {
            return Err(StreamingError::ReaderTaken);
        }
        state.reader_taken = true;
        Ok(StreamReader {
            stream: self.clone(),
        })
    }
}

impl Default for SubscribableStream {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SubscribableStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("SubscribableStream")
            .field("buffered", &state.buffer.len())
            .field("total_written", &state.total_written)
            .field("ended", &state.ended)
            .finish()
    }
}

/// The one consumer of a [`SubscribableStream`].
#[derive(Debug)]
pub struct StreamReader {
    stream: SubscribableStream,
}

impl StreamReader {
    /// Read exactly `count` bytes, or fewer if the stream ends first.
    ///
    /// Returns an empty buffer once the stream is ended and drained.
    pub async fn read(&mut self, count: usize) -> Result<Bytes> {
        loop {
            {
                let mut state = self.stream.state();
                if state.buffer.len() >= count {
                    return Ok(state.buffer.split_to(count).freeze());
                }
                if state.ended {
                    let len = state.buffer.len();
                    return Ok(state.buffer.split_to(len).freeze());
                }
            }
            // notify_one stores a permit when nobody waits, so a write that
            // lands between the check above and this await is not lost.
            self.stream.shared.notify.notified().await;
        }
    }

    /// Wait for the producer to finish and return everything unread.
    pub async fn read_to_end(&mut self) -> Result<Bytes> {
        loop {
            {
                let mut state = self.stream.state();
                if state.ended {
                    let len = state.buffer.len();
                    return Ok(state.buffer.split_to(len).freeze());
                }
            }
            self.stream.shared.notify.notified().await;
        }
    }

    /// Take whatever is buffered right now without waiting.
    pub fn try_read_available(&mut self) -> Bytes {
        let mut state = self.stream.state();
        let len = state.buffer.len();
        state.buffer.split_to(len).freeze()
    }

    /// Check if the producer has finished.
    pub fn is_ended(&self) -> bool {
        self.stream.is_ended()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_read_waits_for_enough_bytes() {
        let stream = SubscribableStream::new();
        let mut reader = stream.reader().unwrap();

        let producer = stream.clone();
        let task = tokio::spawn(async move {
            producer.write(b"ab").unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.write(b"cd").unwrap();
        });

        let data = reader.read(4).await.unwrap();
        assert_eq!(&data[..], b"abcd");
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_end_resolves_partial_read() {
        let stream = SubscribableStream::new();
        let mut reader = stream.reader().unwrap();
        stream.write(b"abc").unwrap();

        let producer = stream.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            producer.end();
        });

        let data = reader.read(10).await.unwrap();
        assert_eq!(&data[..], b"abc");
        assert!(reader.read(10).await.unwrap().is_empty());
    }

    #[test]
    fn test_second_reader_fails_fast() {
        let stream = SubscribableStream::new();
        let _reader = stream.reader().unwrap();
        assert!(matches!(stream.reader(), Err(StreamingError::ReaderTaken)));
    }

    #[test]
    fn test_write_after_end_is_rejected() {
        let stream = SubscribableStream::new();
        stream.write(b"x").unwrap();
        stream.end();
        stream.end();

        assert!(stream.is_ended());
        assert!(matches!(stream.write(b"y"), Err(StreamingError::StreamClosed)));
        assert_eq!(stream.total_written(), 1);
    }

    #[tokio::test]
    async fn test_read_to_end() {
        let stream = SubscribableStream::new();
        let mut reader = stream.reader().unwrap();

        for chunk in [&b"one "[..], b"two ", b"three"] {
            stream.write(chunk).unwrap();
        }
        stream.end();

        assert_eq!(&reader.read_to_end().await.unwrap()[..], b"one two three");
    }

    #[test]
    fn test_try_read_available() {
        let stream = SubscribableStream::new();
        let mut reader = stream.reader().unwrap();

        assert!(reader.try_read_available().is_empty());
        stream.write(b"12345").unwrap();
        assert_eq!(stream.buffered(), 5);
        assert_eq!(&reader.try_read_available()[..], b"12345");
        assert_eq!(stream.buffered(), 0);
    }
}
