//! Framed I/O over the controller's command channel.
//!
//! A [`Connection`] pairs a [`FrameReader`], which turns the incoming byte
//! stream into command lines, with a [`ResponseWriter`], which frames and
//! flushes responses. The two halves are independent so the reader can be
//! handed to another task while a response is being produced.

use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use protocol::{Line, LineCodec, ProtocolError, Response, Result, Terminator};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::net::TcpStream;

/// Initial capacity of the read buffer.
const READ_BUFFER_CAPACITY: usize = 1024;

/// Reads command lines and raw payload bytes from the channel.
#[derive(Debug)]
pub struct FrameReader<R> {
    inner: R,
    buf: BytesMut,
    codec: LineCodec,
    /// The last line ended with a bare CR; its LF may still arrive.
    pending_lf: bool,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Wrap a reader with the default line codec.
    pub fn new(inner: R) -> Self {
        Self::with_codec(inner, LineCodec::new())
    }

    /// Wrap a reader with a specific codec.
    pub fn with_codec(inner: R, codec: LineCodec) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_BUFFER_CAPACITY),
            codec,
            pending_lf: false,
        }
    }

    /// Read the next non-empty line.
    ///
    /// Returns `Ok(None)` when the peer closed the channel; an unterminated
    /// partial line at that point is dropped. A line over the codec's limit is
    /// discarded and reported as [`ProtocolError::FrameTooLarge`], after which
    /// reading may continue.
    ///
    /// Cancel safe: bytes already read stay buffered for the next call.
    pub async fn next_line(&mut self) -> Result<Option<Line>> {
        loop {
            if let Some((line, terminator)) = self.codec.decode_terminated(&mut self.buf)? {
                self.pending_lf = terminator == Terminator::Cr;
                return Ok(Some(line));
            }
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                if !self.buf.is_empty() {
                    tracing::debug!(bytes = self.buf.len(), "dropping unterminated input at EOF");
                    self.buf.clear();
                }
                return Ok(None);
            }
        }
    }

    /// Read exactly `len` raw bytes, serving buffered input first.
    ///
    /// When the preceding line ended with a bare CR, a single LF at the start
    /// of the payload is taken as the rest of that terminator and skipped.
    pub async fn read_exact_raw(&mut self, len: usize) -> Result<Bytes> {
        if std::mem::take(&mut self.pending_lf) && len > 0 {
            self.fill(1).await?;
            if self.buf[0] == b'\n' {
                self.buf.advance(1);
            }
        }
        self.fill(len).await?;
        Ok(self.buf.split_to(len).freeze())
    }

    async fn fill(&mut self, len: usize) -> Result<()> {
        while self.buf.len() < len {
            self.buf.reserve(len - self.buf.len());
            if self.inner.read_buf(&mut self.buf).await? == 0 {
                return Err(ProtocolError::ChannelClosed(format!(
                    "channel closed after {} of {} payload bytes",
                    self.buf.len(),
                    len
                )));
            }
        }
        Ok(())
    }

    /// Discard buffered input and anything that arrives until the channel has
    /// been quiet for `quiet`. Returns the number of bytes discarded.
    pub async fn drain(&mut self, quiet: Duration) -> usize {
        let mut discarded = self.buf.len();
        self.buf.clear();
        self.pending_lf = false;

        loop {
            match tokio::time::timeout(quiet, self.inner.read_buf(&mut self.buf)).await {
                Ok(Ok(0)) | Ok(Err(_)) | Err(_) => break,
                Ok(Ok(n)) => {
                    discarded += n;
                    self.buf.clear();
                }
            }
        }

        discarded
    }

    /// Bytes received but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

/// Writes framed responses to the channel.
#[derive(Debug)]
pub struct ResponseWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> ResponseWriter<W> {
    /// Wrap a writer.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    /// Write one response line and flush it.
    pub async fn send(&mut self, response: &Response) -> Result<()> {
        tracing::trace!(response = %response, "sending response");
        self.inner.write_all(&response.encode()).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

/// Both halves of a command channel.
#[derive(Debug)]
pub struct Connection<R, W> {
    /// Incoming lines and payload.
    pub reader: FrameReader<R>,
    /// Outgoing responses.
    pub writer: ResponseWriter<W>,
}

/// A connection over a TCP stream.
pub type TcpConnection = Connection<ReadHalf<TcpStream>, WriteHalf<TcpStream>>;

impl<R: AsyncRead + Unpin, W: AsyncWrite + Unpin> Connection<R, W> {
    /// Build a connection from separate read and write halves.
    pub fn new(read: R, write: W) -> Self {
        Self::from_parts(FrameReader::new(read), ResponseWriter::new(write))
    }

    /// Reassemble a connection from its framed halves.
    pub fn from_parts(reader: FrameReader<R>, writer: ResponseWriter<W>) -> Self {
        Self { reader, writer }
    }

    /// Take the connection apart.
    pub fn into_parts(self) -> (FrameReader<R>, ResponseWriter<W>) {
        (self.reader, self.writer)
    }
}

impl TcpConnection {
    /// Split an accepted stream into a connection.
    pub fn from_tcp(stream: TcpStream) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self::new(read_half, write_half)
    }
}
