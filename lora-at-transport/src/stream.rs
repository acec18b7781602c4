//! Byte transport over any tokio stream

use crate::error::{LoraError, LoraResult};
use crate::transport::ByteTransport;
use async_trait::async_trait;
use bytes::{Buf, BytesMut};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const READ_CHUNK: usize = 256;

fn not_connected() -> LoraError {
    LoraError::Connection(std::io::Error::new(
        std::io::ErrorKind::NotConnected,
        "Stream not connected",
    ))
}

/// Buffered [`ByteTransport`] over an `AsyncRead + AsyncWrite` stream
///
/// Whatever the stream yields in one read is kept in a `BytesMut` and
/// handed out a byte at a time.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: Option<S>,
    read_buf: BytesMut,
    eof: bool,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: Some(stream),
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// A transport with no stream attached yet
    pub fn detached() -> Self {
        Self {
            stream: None,
            read_buf: BytesMut::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// Attach a freshly opened stream, dropping anything buffered
    pub fn attach(&mut self, stream: S) {
        self.stream = Some(stream);
        self.read_buf.clear();
        self.eof = false;
    }

    /// Whether the far end has signalled end of stream
    pub fn at_eof(&self) -> bool {
        self.eof
    }

    /// Detach and return the underlying stream
    pub fn into_inner(self) -> Option<S> {
        self.stream
    }
}

#[async_trait]
impl<S> ByteTransport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_byte(&mut self, timeout: Duration) -> LoraResult<Option<u8>> {
        if self.read_buf.has_remaining() {
            return Ok(Some(self.read_buf.get_u8()));
        }

        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        self.read_buf.reserve(READ_CHUNK);
        match tokio::time::timeout(timeout, stream.read_buf(&mut self.read_buf)).await {
            Err(_) => Ok(None),
            Ok(Ok(0)) => {
                if !self.eof {
                    log::debug!("transport reached end of stream");
                    self.eof = true;
                }
                // keep the caller's poll loop paced like a silent line
                tokio::time::sleep(timeout).await;
                Ok(None)
            }
            Ok(Ok(_)) => Ok(Some(self.read_buf.get_u8())),
            Ok(Err(e)) => Err(LoraError::Connection(e)),
        }
    }

    fn available(&self) -> usize {
        self.read_buf.remaining()
    }

    async fn write(&mut self, buf: &[u8]) -> LoraResult<usize> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.write(buf).await.map_err(LoraError::Connection)
    }

    async fn flush(&mut self) -> LoraResult<()> {
        let stream = self.stream.as_mut().ok_or_else(not_connected)?;
        stream.flush().await.map_err(LoraError::Connection)
    }

    fn is_closed(&self) -> bool {
        self.stream.is_none()
    }

    async fn close(&mut self) -> LoraResult<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                log::debug!("stream shutdown failed: {}", e);
            }
        }
        self.read_buf.clear();
        Ok(())
    }
}
