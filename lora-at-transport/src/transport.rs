//! Byte transport trait consumed by the protocol engine

use crate::error::{LoraError, LoraResult};
use async_trait::async_trait;
use std::time::Duration;

/// Byte-oriented, half-duplex channel to a modem
///
/// Reads are byte at a time with a bound on how long to wait, which is what
/// the response matcher needs to poll cooperatively.
#[async_trait]
pub trait ByteTransport: Send {
    /// Read one byte
    ///
    /// # Arguments
    ///
    /// * `timeout` - Upper bound on the wait when nothing is buffered
    ///
    /// # Returns
    ///
    /// `Ok(None)` if no byte arrived within `timeout`
    async fn read_byte(&mut self, timeout: Duration) -> LoraResult<Option<u8>>;

    /// Number of bytes that can be read without waiting
    fn available(&self) -> usize;

    /// Write data, returning the number of bytes accepted
    async fn write(&mut self, buf: &[u8]) -> LoraResult<usize>;

    /// Write all data
    async fn write_all(&mut self, buf: &[u8]) -> LoraResult<()> {
        let mut written = 0;
        while written < buf.len() {
            let n = self.write(&buf[written..]).await?;
            if n == 0 {
                return Err(LoraError::Connection(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "Failed to write all data",
                )));
            }
            written += n;
        }
        Ok(())
    }

    /// Flush any buffered data
    async fn flush(&mut self) -> LoraResult<()>;

    /// Check if the transport is closed
    fn is_closed(&self) -> bool;

    /// Close the transport
    async fn close(&mut self) -> LoraResult<()>;
}

/// Transport layer trait that extends ByteTransport
#[async_trait]
pub trait TransportLayer: ByteTransport {
    /// Open the physical layer connection
    async fn open(&mut self) -> LoraResult<()>;
}
