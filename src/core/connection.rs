use std::fmt;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::proto::codec::{Decoder, Encoder};
use crate::proto::frame::Frame;
use crate::proto::{Error, Result};

/// A framed connection to one node.
///
/// Wraps an underlying stream (plain TCP here, but any `AsyncRead +
/// AsyncWrite` works) and handles frame encoding and incremental decoding.
/// The decoder's buffer is the receive remainder: it persists across reads
/// so pipelined replies stay correctly framed.
pub struct Connection<S> {
    stream: S,
    decoder: Decoder,
    encoder: Encoder,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Creates a new connection with the given stream.
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            decoder: Decoder::new(),
            encoder: Encoder::new(),
            read_timeout: None,
            write_timeout: None,
        }
    }

    /// Configures read and write timeouts for this connection.
    pub fn with_timeouts(
        mut self,
        read_timeout: Option<Duration>,
        write_timeout: Option<Duration>,
    ) -> Self {
        self.read_timeout = read_timeout;
        self.write_timeout = write_timeout;
        self
    }

    /// Writes a single frame to the connection.
    pub async fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.encoder.encode(frame);
        self.flush_encoded().await
    }

    /// Writes a batch of frames with one flush.
    ///
    /// All frames are rendered into the encoder buffer and pushed with a
    /// single write, so a per-node pipeline costs one send regardless of
    /// batch size.
    pub async fn write_batch(&mut self, frames: &[Frame]) -> Result<()> {
        for frame in frames {
            self.encoder.encode(frame);
        }
        self.flush_encoded().await
    }

    async fn flush_encoded(&mut self) -> Result<()> {
        let data = self.encoder.take();
        match self.write_timeout {
            Some(duration) => {
                tokio::time::timeout(duration, self.stream.write_all(&data))
                    .await
                    .map_err(|_| Error::Io {
                        source: std::io::Error::new(std::io::ErrorKind::TimedOut, "write timeout"),
                    })??;
            }
            None => {
                self.stream.write_all(&data).await?;
            }
        }
        Ok(())
    }

    /// Reads one frame from the connection.
    ///
    /// Zero bytes from the socket while a frame is outstanding means the
    /// peer closed the stream; that surfaces as the canonical
    /// [`Error::ConnectionClosed`].
    pub async fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self
                .decoder
                .decode()
                .map_err(|message| Error::Protocol { message })?
            {
                return Ok(frame);
            }

            let mut buf = vec![0u8; 4096];
            let read_future = self.stream.read(&mut buf);

            let n = match self.read_timeout {
                Some(duration) => tokio::time::timeout(duration, read_future)
                    .await
                    .map_err(|_| Error::Io {
                        source: std::io::Error::new(std::io::ErrorKind::TimedOut, "read timeout"),
                    })??,
                None => read_future.await?,
            };

            if n == 0 {
                return Err(Error::ConnectionClosed);
            }
            self.decoder.append(&buf[..n]);
        }
    }
}

impl<S> fmt::Debug for Connection<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}
