//! [`Transport`] over tokio read and write halves.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::Mutex;
use tracing::debug;

use super::Transport;
use crate::error::Result;

/// Transport over an `AsyncRead` half and an `AsyncWrite` half.
pub struct StreamTransport<R, W> {
    reader: Mutex<R>,
    writer: Mutex<W>,
    connected: AtomicBool,
}

impl<R, W> StreamTransport<R, W> {
    /// Wrap already split halves.
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: Mutex::new(reader),
            writer: Mutex::new(writer),
            connected: AtomicBool::new(true),
        }
    }
}

impl<S> StreamTransport<ReadHalf<S>, WriteHalf<S>>
where
    S: AsyncRead + AsyncWrite,
{
    /// Split a duplex stream and wrap both halves.
    pub fn from_stream(stream: S) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(reader, writer)
    }
}

#[async_trait]
impl<R, W> Transport for StreamTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&self, data: &[u8]) -> Result<usize> {
        if !self.is_connected() {
            return Ok(0);
        }
        let mut writer = self.writer.lock().await;
        let result: std::io::Result<()> = async {
            writer.write_all(data).await?;
            writer.flush().await
        }
        .await;
        if let Err(e) = result {
            self.connected.store(false, Ordering::Release);
            return Err(e.into());
        }
        Ok(data.len())
    }

    async fn receive(&self, max: usize) -> Result<Bytes> {
        if !self.is_connected() {
            return Ok(Bytes::new());
        }
        let mut buf = vec![0u8; max.max(1)];
        let n = match self.reader.lock().await.read(&mut buf).await {
            Ok(n) => n,
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                return Err(e.into());
            }
        };
        if n == 0 {
            debug!("stream transport reached EOF");
            self.connected.store(false, Ordering::Release);
        }
        buf.truncate(n);
        Ok(Bytes::from(buf))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn close(&self) {
        if self.connected.swap(false, Ordering::AcqRel) {
            let _ = self.writer.lock().await.shutdown().await;
        }
    }
}
