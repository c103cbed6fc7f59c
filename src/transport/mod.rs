//! Transport seam: the interface this adapter needs from an FTP session
//! library.
//!
//! The adapter does not speak the wire protocol itself. A transport owns the
//! control connection, performs passive-connection setup, parses `LIST`
//! output into [`RawEntry`] records, and yields raw byte streams for `RETR`
//! ("get") and `STOR` ("put"). Everything above this trait treats those as
//! opaque sources and sinks.

use bytes::Bytes;
use futures::stream::BoxStream;
use std::pin::Pin;
use thiserror::Error;
use tokio::io::AsyncWrite;

/// Chunked byte source produced by a read transfer (or supplied by a caller
/// as write input).
pub type ByteSource = BoxStream<'static, std::io::Result<Bytes>>;

/// Byte sink produced by a write transfer.
pub type ByteSink = Pin<Box<dyn AsyncWrite + Send>>;

/// Kind of a listed entry, as parsed from the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One parsed line of a directory listing.
#[derive(Debug, Clone)]
pub struct RawEntry {
    /// Base name of the child.
    pub name: String,
    /// Size in bytes (0 for directories on most servers).
    pub size: u64,
    /// Modification time as a Unix timestamp, when the listing carried one.
    pub mtime: Option<i64>,
    /// File or directory.
    pub kind: EntryKind,
}

impl RawEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// Failures a transport can report.
///
/// Reply codes are carried verbatim; translation into filesystem-style
/// error kinds happens at the VFS operation boundary.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Server replied with a failure code.
    #[error("server reply {code}: {message}")]
    Reply { code: u16, message: String },

    /// Control or data socket I/O failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The session was torn down.
    #[error("transport closed")]
    Closed,
}

impl TransportError {
    pub fn reply(code: u16, message: impl Into<String>) -> Self {
        TransportError::Reply {
            code,
            message: message.into(),
        }
    }
}

pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Stateful, single-connection FTP session as seen by the adapter.
///
/// Implementations must be safe to call concurrently; the adapter's session
/// facade serializes data-transfer negotiation on top of this, so a
/// transport will never be asked to negotiate two transfers at once.
#[async_trait::async_trait]
pub trait FtpTransport: Send + Sync {
    /// List a directory (or a single file) into parsed entries, in
    /// server-native order.
    ///
    /// A missing path is an error (550-class reply), an empty directory is
    /// `Ok(vec![])`.
    async fn list(&self, path: &str) -> TransportResult<Vec<RawEntry>>;

    /// Negotiate a read transfer and return its byte source.
    async fn open_read(&self, path: &str) -> TransportResult<ByteSource>;

    /// Negotiate a write transfer and return its byte sink. Shutting the
    /// sink down completes the transfer.
    async fn open_write(&self, path: &str) -> TransportResult<ByteSink>;

    /// `DELE` - remove a file.
    async fn delete(&self, path: &str) -> TransportResult<()>;

    /// `MKD` - create a directory.
    async fn make_dir(&self, path: &str) -> TransportResult<()>;

    /// `RMD` - remove a directory.
    async fn remove_dir(&self, path: &str) -> TransportResult<()>;

    /// `RNFR`/`RNTO` - rename.
    async fn rename(&self, from: &str, to: &str) -> TransportResult<()>;

    /// Close the control connection. Called once, at adapter teardown.
    async fn quit(&self) -> TransportResult<()>;
}
