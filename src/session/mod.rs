//! Transfer Session Facade.
//!
//! Owns the single underlying FTP session handle and the session's one
//! data-connection slot. Every transfer negotiation (read, write, listing)
//! goes through here and queues on the slot, so two transfers can never
//! interleave bytes on the session. Control-channel commands (delete, mkdir,
//! rename, ...) do not occupy the slot.

use crate::transport::{ByteSink, ByteSource, FtpTransport, RawEntry, TransportError, TransportResult};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// A negotiated transfer: the raw stream plus the slot permit.
///
/// The permit is held until the transfer is dropped; dropping early is how a
/// caller cancels a transfer and releases the connection slot.
pub struct Transfer<T> {
    pub(crate) io: T,
    pub(crate) permit: OwnedSemaphorePermit,
}

impl<T> Transfer<T> {
    pub(crate) fn into_parts(self) -> (T, OwnedSemaphorePermit) {
        (self.io, self.permit)
    }
}

/// Facade over the one session handle.
pub struct Session {
    transport: Mutex<Option<Arc<dyn FtpTransport>>>,
    slot: Arc<Semaphore>,
}

impl Session {
    pub fn new(transport: Arc<dyn FtpTransport>) -> Self {
        Self {
            transport: Mutex::new(Some(transport)),
            slot: Arc::new(Semaphore::new(1)),
        }
    }

    /// Current transport handle, or `Closed` after teardown.
    fn handle(&self) -> TransportResult<Arc<dyn FtpTransport>> {
        self.transport
            .lock()
            .expect("session lock poisoned")
            .clone()
            .ok_or(TransportError::Closed)
    }

    /// Wait for the transfer slot. Fails with `Closed` once the session has
    /// been torn down (the semaphore is closed in `destroy`).
    async fn acquire_slot(&self) -> TransportResult<OwnedSemaphorePermit> {
        self.slot
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::Closed)
    }

    /// Fetch and parse a directory listing. Occupies the slot only for the
    /// duration of the exchange (LIST rides the data connection too).
    pub async fn list(&self, path: &str) -> TransportResult<Vec<RawEntry>> {
        let transport = self.handle()?;
        let _permit = self.acquire_slot().await?;
        transport.list(path).await
    }

    /// Negotiate a read transfer. The returned [`Transfer`] holds the slot
    /// until it reaches a terminal state or is dropped.
    pub async fn open_read(&self, path: &str) -> TransportResult<Transfer<ByteSource>> {
        let transport = self.handle()?;
        let permit = self.acquire_slot().await?;
        debug!(path, "negotiating read transfer");
        let io = transport.open_read(path).await?;
        Ok(Transfer { io, permit })
    }

    /// Negotiate a write transfer. Same slot discipline as `open_read`.
    pub async fn open_write(&self, path: &str) -> TransportResult<Transfer<ByteSink>> {
        let transport = self.handle()?;
        let permit = self.acquire_slot().await?;
        debug!(path, "negotiating write transfer");
        let io = transport.open_write(path).await?;
        Ok(Transfer { io, permit })
    }

    pub async fn remove(&self, path: &str) -> TransportResult<()> {
        self.handle()?.delete(path).await
    }

    pub async fn make_dir(&self, path: &str) -> TransportResult<()> {
        self.handle()?.make_dir(path).await
    }

    pub async fn remove_dir(&self, path: &str) -> TransportResult<()> {
        self.handle()?.remove_dir(path).await
    }

    pub async fn rename(&self, from: &str, to: &str) -> TransportResult<()> {
        self.handle()?.rename(from, to).await
    }

    /// Tear the session down: quit the transport, null the handle, close the
    /// slot so queued transfer requests fail with `Closed`. Safe to call
    /// more than once.
    pub async fn destroy(&self) {
        let transport = self
            .transport
            .lock()
            .expect("session lock poisoned")
            .take();
        if let Some(transport) = transport {
            self.slot.close();
            if let Err(e) = transport.quit().await {
                debug!(error = %e, "quit failed during teardown");
            }
        }
    }
}
