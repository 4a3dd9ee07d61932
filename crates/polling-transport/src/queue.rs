//! A single-producer, single-consumer byte queue exposed as [`AsyncRead`] on the consumer side.
//!
//! Used for both halves of a polling session: the client conduit's inbound byte path, and the
//! server session's up/down queues. In every role exactly one task pushes bytes in and exactly
//! one task polls them out, so a bare mutex-guarded buffer plus a single stashed waker suffices.

use std::collections::VecDeque;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};

use parking_lot::Mutex;
use tokio::io::{AsyncRead, ReadBuf};

struct Inner {
    buf: VecDeque<u8>,
    closed: bool,
    waker: Option<Waker>,
}

/// Producer half: appends bytes and signals end-of-stream.
#[derive(Clone)]
pub struct QueueWriter {
    inner: Arc<Mutex<Inner>>,
}

/// Consumer half: implements [`AsyncRead`] by draining the shared buffer.
pub struct QueueReader {
    inner: Arc<Mutex<Inner>>,
}

pub fn byte_queue() -> (QueueWriter, QueueReader) {
    let inner = Arc::new(Mutex::new(Inner {
        buf: VecDeque::new(),
        closed: false,
        waker: None,
    }));

    (QueueWriter { inner: inner.clone() }, QueueReader { inner })
}

impl QueueWriter {
    /// Appends bytes and wakes a pending reader, if any. No-op on an empty slice.
    pub fn push(&self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }

        let mut inner = self.inner.lock();
        inner.buf.extend(bytes);
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }

    /// Marks the stream finished; a subsequent read drains anything buffered, then returns EOF.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        if let Some(waker) = inner.waker.take() {
            waker.wake();
        }
    }
}

impl AsyncRead for QueueReader {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        let mut inner = self.inner.lock();

        if inner.buf.is_empty() {
            if inner.closed {
                return Poll::Ready(Ok(()));
            }
            inner.waker = Some(cx.waker().clone());
            return Poll::Pending;
        }

        let n = buf.remaining().min(inner.buf.len());
        let (head, _) = inner.buf.as_slices();

        if head.len() >= n {
            buf.put_slice(&head[..n]);
        } else {
            let first = inner.buf.drain(..head.len().min(n)).collect::<Vec<_>>();
            buf.put_slice(&first);
            let remaining = n - first.len();
            if remaining > 0 {
                let rest = inner.buf.drain(..remaining).collect::<Vec<_>>();
                buf.put_slice(&rest);
            }
            return Poll::Ready(Ok(()));
        }

        inner.buf.drain(..n);
        Poll::Ready(Ok(()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt as _;

    #[tokio::test]
    async fn reads_back_pushed_bytes() {
        let (writer, mut reader) = byte_queue();
        writer.push(b"hello");
        writer.push(b" world");
        writer.close();

        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"hello world");
    }

    #[tokio::test]
    async fn read_pends_until_pushed() {
        let (writer, mut reader) = byte_queue();

        let read_task = tokio::spawn(async move {
            let mut buf = [0u8; 5];
            reader.read_exact(&mut buf).await.unwrap();
            buf
        });

        tokio::task::yield_now().await;
        writer.push(b"hello");

        assert_eq!(read_task.await.unwrap(), *b"hello");
    }
}
