//! File transfer pipeline.
//!
//! Read side: wraps a negotiated byte source into a [`FileStream`] that
//! holds the transfer slot until the stream reaches a terminal state.
//! Because the stream is pull-driven, the underlying source emits nothing
//! until the consumer polls - zero data can be lost between stream creation
//! and consumer attachment.
//!
//! Write side: pipes a caller-supplied input into a negotiated sink. Input
//! chunks arriving while the sink is still negotiating are captured into a
//! pending buffer and replayed once, in order, when the sink is ready; after
//! that, chunks flow pull-driven so the socket's backpressure reaches the
//! producer. This capture phase is also what lets `copy` respect the single
//! transfer slot: the read stream drains (releasing its slot) while the
//! write negotiation queues on it.

use crate::error::{map_missing, Result, VfsError};
use crate::session::Session;
use crate::transport::{ByteSink, ByteSource};
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::OwnedSemaphorePermit;
use tracing::debug;

/// Readable content stream handed to `readfile` callers.
///
/// Holds the session's transfer slot; the slot is released when the stream
/// ends, errors, or is dropped (dropping early is the cancellation
/// primitive).
pub struct FileStream {
    source: ByteSource,
    permit: Option<OwnedSemaphorePermit>,
}

impl FileStream {
    pub(crate) fn new(source: ByteSource, permit: OwnedSemaphorePermit) -> Self {
        Self {
            source,
            permit: Some(permit),
        }
    }

    /// Abandon the transfer and release the connection slot.
    pub fn destroy(self) {}
}

impl Stream for FileStream {
    type Item = std::io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        // Past the terminal state the source is dead; never poll it again.
        if self.permit.is_none() {
            return Poll::Ready(None);
        }
        match self.source.poll_next_unpin(cx) {
            Poll::Ready(None) => {
                // Terminal: free the slot without waiting for drop.
                self.permit.take();
                Poll::Ready(None)
            }
            Poll::Ready(Some(Err(e))) => {
                self.permit.take();
                Poll::Ready(Some(Err(e)))
            }
            other => other,
        }
    }
}

/// Writable sink for manual writes (`mkfile_stream`).
///
/// The transfer completes when [`FileSink::close`] succeeds; a failure there
/// is the transfer's one authoritative error. Dropping without closing
/// abandons the transfer and releases the slot.
pub struct FileSink {
    sink: ByteSink,
    _permit: OwnedSemaphorePermit,
}

impl FileSink {
    pub(crate) fn new(sink: ByteSink, permit: OwnedSemaphorePermit) -> Self {
        Self {
            sink,
            _permit: permit,
        }
    }

    /// Finish the transfer. Resolves once, with the save outcome.
    pub async fn close(mut self) -> Result<()> {
        self.sink.shutdown().await?;
        Ok(())
    }
}

impl AsyncWrite for FileSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.sink).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.sink).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.sink).poll_shutdown(cx)
    }
}

/// Pipe `source` into a newly negotiated write transfer for `path`,
/// returning the number of bytes written. `None` creates an empty file.
///
/// Failure from either side resolves this exactly once and drops the input,
/// which is the destroy path for destroyable sources.
pub(crate) async fn write_file(
    session: &Session,
    path: &str,
    source: Option<ByteSource>,
) -> Result<u64> {
    let mut open = std::pin::pin!(session.open_write(path));

    let Some(mut source) = source else {
        let transfer = open.await.map_err(|e| map_missing(e, path))?;
        let (mut sink, _permit) = transfer.into_parts();
        sink.shutdown().await?;
        return Ok(0);
    };

    // Negotiation phase: capture input chunks so no byte is lost to the race
    // between "producer starts" and "sink becomes ready". An input failure
    // here wins; an open failure here releases (drops) the input.
    let mut pending: Vec<Bytes> = Vec::new();
    let mut source_done = false;
    let transfer = loop {
        tokio::select! {
            res = &mut open => {
                break res.map_err(|e| map_missing(e, path))?;
            }
            chunk = source.next(), if !source_done => match chunk {
                Some(Ok(bytes)) => pending.push(bytes),
                Some(Err(e)) => return Err(VfsError::Io(e)),
                None => source_done = true,
            }
        }
    };
    let (mut sink, _permit) = transfer.into_parts();

    // Replay captured chunks once, in original order.
    let mut written = 0u64;
    if !pending.is_empty() {
        debug!(path, chunks = pending.len(), "replaying pending writes");
    }
    for bytes in pending.drain(..) {
        written += bytes.len() as u64;
        sink.write_all(&bytes).await?;
    }

    // Live phase: pull-driven, one chunk in flight.
    if !source_done {
        while let Some(chunk) = source.next().await {
            let bytes = chunk?;
            written += bytes.len() as u64;
            sink.write_all(&bytes).await?;
        }
    }
    drop(source);

    sink.shutdown().await?;
    Ok(written)
}
