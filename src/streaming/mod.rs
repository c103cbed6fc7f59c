//! Streaming and flow-control layer.
//!
//! Reconciles three mismatched concurrency models: the session's single
//! data-connection slot, consumer-driven backpressure on `readdir`/`readfile`
//! streams, and producer-driven backpressure of the transfer socket.

pub mod dirstream;
pub mod pipeline;

pub use dirstream::{DirStream, FlowControl};
pub use pipeline::{FileSink, FileStream};
