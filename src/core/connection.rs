use std::fmt;
use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::core::command::Cmd;
use crate::proto::codec::{Decoder, Encoder};
use crate::proto::frame::Frame;
use crate::{Error, Result};

/// A RESP connection to a single node.
///
/// Writes are buffered: [`send`](Connection::send) only encodes, and
/// [`flush`](Connection::flush) pushes every buffered command in one write.
/// Replies are read back one at a time with [`read_frame`](Connection::read_frame),
/// which is exactly the write-then-read discipline of a pipelined batch.
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
    /// Creates a new connection with no timeouts configured.
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

    /// Buffers a command without touching the network.
    pub fn send(&mut self, cmd: &Cmd) {
        self.encoder.encode(&cmd.to_frame());
    }

    /// Writes every buffered command to the stream.
    pub async fn flush(&mut self) -> Result<()> {
        if self.encoder.is_empty() {
            return Ok(());
        }
        let data = self.encoder.take();
        let stream = &mut self.stream;
        with_timeout("write", self.write_timeout, async move {
            stream.write_all(&data).await?;
            stream.flush().await?;
            Ok(())
        })
        .await
    }

    /// Reads the next reply frame.
    ///
    /// Server error replies come back as [`Frame::Error`]; an `Err` always
    /// means the connection itself is no longer usable.
    pub async fn read_frame(&mut self) -> Result<Frame> {
        let Self {
            stream,
            decoder,
            read_timeout,
            ..
        } = self;
        with_timeout("read", *read_timeout, async move {
            loop {
                if let Some(frame) = decoder.decode()? {
                    return Ok(frame);
                }
                let mut buf = [0u8; 4096];
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    return Err(Error::Protocol {
                        message: "connection closed".to_string(),
                    });
                }
                decoder.append(&buf[..n]);
            }
        })
        .await
    }

    /// Sends one command and waits for its reply.
    pub async fn request(&mut self, cmd: &Cmd) -> Result<Frame> {
        self.send(cmd);
        self.flush().await?;
        self.read_frame().await
    }

    /// Shuts down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

async fn with_timeout<T, F>(operation: &'static str, limit: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| Error::Timeout {
                operation,
                elapsed_ms: limit.as_millis() as u64,
            })?,
        None => fut.await,
    }
}

impl<S> fmt::Debug for Connection<S>
where
    S: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("stream", &self.stream)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .finish()
    }
}
