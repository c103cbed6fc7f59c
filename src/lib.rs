//! ftpvfs - FTP-backed virtual filesystem adapter.
//!
//! Exposes a remote FTP session through a uniform VFS contract: a fixed set
//! of operations (read, write, list, stat, rename, delete, mkdir/rmdir,
//! copy) returning metadata that may carry a lazy content stream. The core
//! of the crate is the streaming and flow-control layer reconciling three
//! concurrency models:
//!
//! - the session's single data-connection slot (one transfer at a time,
//!   negotiation strictly serialized),
//! - consumer-driven backpressure (pause/resume) on `readdir`/`readfile`
//!   streams,
//! - producer-driven backpressure of the transfer socket.
//!
//! The wire protocol itself lives behind the [`transport::FtpTransport`]
//! seam; this crate never touches a TCP socket.
//!
//! ```no_run
//! use ftpvfs::{Vfs, VfsConfig, ReadOptions};
//! use futures::StreamExt;
//! # use std::sync::Arc;
//! # async fn demo(transport: Arc<dyn ftpvfs::transport::FtpTransport>) -> ftpvfs::Result<()> {
//! let vfs = Vfs::new(transport, VfsConfig::default());
//! let read = vfs.readfile("/report.txt", ReadOptions::default()).await?;
//! if let Some(mut stream) = read.stream {
//!     while let Some(chunk) = stream.next().await {
//!         let chunk = chunk?;
//!         // consume chunk
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod etag;
pub mod events;
pub mod extension;
pub mod path;
pub mod session;
pub mod streaming;
pub mod transport;
pub mod vfs;

pub use error::{Result, VfsError};
pub use events::{EventBus, HandlerId};
pub use extension::{Capability, ExtensionSource};
pub use streaming::{DirStream, FileSink, FileStream, FlowControl};
pub use vfs::{
    DirRead, Entry, ExtendOptions, FileRead, Meta, MimeResolver, MkfileOptions, ReadOptions,
    ReaddirOptions, TargetOptions, Vfs, VfsConfig,
};
