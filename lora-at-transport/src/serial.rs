//! Serial port transport implementation

use crate::error::{LoraError, LoraResult};
use crate::stream::StreamTransport;
use crate::transport::{ByteTransport, TransportLayer};
use async_trait::async_trait;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio_serial::SerialStream;

/// Baud rate both reference modems ship with
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Wrapper for SerialStream that implements Debug
pub struct DebugSerialStream(SerialStream);

impl fmt::Debug for DebugSerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStream").finish()
    }
}

impl Deref for DebugSerialStream {
    type Target = SerialStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DebugSerialStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl AsyncRead for DebugSerialStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_read(cx, buf)
    }
}

impl AsyncWrite for DebugSerialStream {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.0).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.0).poll_shutdown(cx)
    }
}

/// Serial port transport layer settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
    /// Bound on a single write
    pub write_timeout: Option<Duration>,
}

impl SerialSettings {
    /// Create new serial settings with default parameters (8N1, no flow control)
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self {
            port_name,
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
            write_timeout: Some(Duration::from_secs(5)),
        }
    }

    /// Create serial settings with a write timeout
    pub fn with_write_timeout(port_name: String, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            write_timeout: Some(timeout),
            ..Self::new(port_name, baud_rate)
        }
    }
}

/// Serial port transport layer implementation
#[derive(Debug)]
pub struct SerialTransport {
    inner: StreamTransport<DebugSerialStream>,
    settings: SerialSettings,
    closed: bool,
}

impl SerialTransport {
    /// Create a new serial transport layer
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            inner: StreamTransport::detached(),
            settings,
            closed: true,
        }
    }

    /// Create serial transport with port name and baud rate
    pub fn new_simple(port_name: String, baud_rate: u32) -> Self {
        Self::new(SerialSettings::new(port_name, baud_rate))
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&mut self) -> LoraResult<()> {
        if !self.closed {
            return Err(LoraError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control);

        let stream = SerialStream::open(&builder).map_err(|e| {
            LoraError::Connection(std::io::Error::other(format!(
                "Failed to open serial port {}: {}",
                self.settings.port_name, e
            )))
        })?;

        log::info!(
            "opened serial port {} at {} baud",
            self.settings.port_name,
            self.settings.baud_rate
        );
        self.inner.attach(DebugSerialStream(stream));
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl ByteTransport for SerialTransport {
    async fn read_byte(&mut self, timeout: Duration) -> LoraResult<Option<u8>> {
        match self.inner.read_byte(timeout).await {
            Err(e) => {
                self.closed = true;
                Err(e)
            }
            ok => ok,
        }
    }

    fn available(&self) -> usize {
        self.inner.available()
    }

    async fn write(&mut self, buf: &[u8]) -> LoraResult<usize> {
        if let Some(timeout) = self.settings.write_timeout {
            tokio::time::timeout(timeout, self.inner.write(buf))
                .await
                .map_err(|_| LoraError::Timeout)?
        } else {
            self.inner.write(buf).await
        }
    }

    async fn flush(&mut self) -> LoraResult<()> {
        self.inner.flush().await
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> LoraResult<()> {
        if let Err(e) = self.inner.flush().await {
            log::debug!("flush before close failed: {}", e);
        }
        self.inner.close().await?;
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_settings() {
        let settings = SerialSettings::new("/dev/ttyUSB0".to_string(), DEFAULT_BAUD_RATE);
        assert_eq!(settings.port_name, "/dev/ttyUSB0");
        assert_eq!(settings.baud_rate, 9600);
        assert_eq!(settings.data_bits, tokio_serial::DataBits::Eight);
        assert_eq!(settings.flow_control, tokio_serial::FlowControl::None);
    }

    #[tokio::test]
    async fn test_unopened_port_is_closed() {
        let mut transport = SerialTransport::new_simple("/dev/ttyUSB0".to_string(), 115200);
        assert!(transport.is_closed());
        assert_eq!(transport.available(), 0);
        assert!(transport.write(b"AT\r\n").await.is_err());
        assert!(transport.read_byte(Duration::from_millis(1)).await.is_err());
    }
}
