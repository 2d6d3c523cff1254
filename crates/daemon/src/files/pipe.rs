//! Bounded in-memory byte pipe between a producer and a consumer.
//!
//! The pipe is a bounded channel of [`Bytes`] chunks. The write end
//! implements [`std::io::Write`] and blocks when the channel is full; the read
//! end implements [`std::io::Read`] and blocks when it is empty, or can be
//! turned into an async [`Stream`] for an HTTP body.
//!
//! End-of-stream and failure are distinct: [`PipeWriter::close`] flushes and
//! ends the stream cleanly, [`PipeWriter::fail`] delivers an error to the
//! reader after all bytes written before it. Dropping the reader makes every
//! further write fail with [`io::ErrorKind::BrokenPipe`].
//!
//! The blocking halves must not be used from inside an async task; use
//! [`PipeWriter::send`] and [`PipeReader::into_stream`] there instead.

use std::io::{self, Read, Write};

use bytes::{Buf, Bytes, BytesMut};
use futures_util::stream::{self, Stream, StreamExt};
use tokio::sync::mpsc;

/// Size of the chunks the writer accumulates before sending.
pub const CHUNK_SIZE: usize = 32 * 1024;

/// Default number of chunks buffered between producer and consumer.
pub const DEFAULT_CAPACITY: usize = 8;

type Chunk = io::Result<Bytes>;

/// Create a pipe that buffers at most `capacity` chunks.
pub fn pipe(capacity: usize) -> (PipeWriter, PipeReader) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        PipeWriter {
            tx,
            buf: BytesMut::new(),
        },
        PipeReader {
            rx,
            current: Bytes::new(),
            done: false,
        },
    )
}

fn broken_pipe() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "pipe reader dropped")
}

/// Write end of a [`pipe`].
///
/// Bytes are buffered into [`CHUNK_SIZE`] chunks. Buffered bytes are only
/// delivered by [`flush`](Write::flush), [`close`](Self::close) or a full
/// chunk; dropping the writer without closing it discards them.
#[derive(Debug)]
pub struct PipeWriter {
    tx: mpsc::Sender<Chunk>,
    buf: BytesMut,
}

impl PipeWriter {
    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let chunk = self.buf.split().freeze();
        self.tx.blocking_send(Ok(chunk)).map_err(|_| broken_pipe())
    }

    /// Flush buffered bytes and end the stream.
    pub fn close(mut self) -> io::Result<()> {
        self.send_buffered()
    }

    /// Deliver buffered bytes, then `err` as the reader's final result.
    ///
    /// A reader that has already gone away is not an error here.
    pub fn fail(mut self, err: io::Error) {
        if self.send_buffered().is_ok() {
            let _ = self.tx.blocking_send(Err(err));
        }
    }

    /// Send a chunk from async code, bypassing the internal buffer.
    pub async fn send(&mut self, chunk: Bytes) -> io::Result<()> {
        if chunk.is_empty() {
            return Ok(());
        }
        self.tx.send(Ok(chunk)).await.map_err(|_| broken_pipe())
    }

    /// Async counterpart of [`fail`](Self::fail).
    pub async fn fail_async(self, err: io::Error) {
        let _ = self.tx.send(Err(err)).await;
    }

    /// Whether the read end has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Write for PipeWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        if self.tx.is_closed() {
            return Err(broken_pipe());
        }

        let room = CHUNK_SIZE - self.buf.len();
        let n = data.len().min(room);
        self.buf.extend_from_slice(&data[..n]);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

/// Read end of a [`pipe`].
#[derive(Debug)]
pub struct PipeReader {
    rx: mpsc::Receiver<Chunk>,
    current: Bytes,
    done: bool,
}

impl PipeReader {
    /// Convert into an async stream of chunks.
    ///
    /// A producer failure is yielded as the final `Err` item.
    pub fn into_stream(self) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
        let PipeReader { rx, current, done } = self;
        let head = (!current.is_empty()).then_some(Ok(current));
        let rx = (!done).then_some(rx);

        stream::iter(head).chain(stream::unfold(rx, next_chunk))
    }
}

async fn next_chunk(
    rx: Option<mpsc::Receiver<Chunk>>,
) -> Option<(Chunk, Option<mpsc::Receiver<Chunk>>)> {
    let mut rx = rx?;
    match rx.recv().await? {
        Ok(chunk) => Some((Ok(chunk), Some(rx))),
        Err(e) => Some((Err(e), None)),
    }
}

impl Read for PipeReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        loop {
            if !self.current.is_empty() {
                let n = out.len().min(self.current.len());
                out[..n].copy_from_slice(&self.current[..n]);
                self.current.advance(n);
                return Ok(n);
            }
            if self.done {
                return Ok(0);
            }

            match self.rx.blocking_recv() {
                Some(Ok(chunk)) => self.current = chunk,
                Some(Err(e)) => {
                    self.done = true;
                    return Err(e);
                }
                None => {
                    self.done = true;
                    return Ok(0);
                }
            }
        }
    }
}
