//! Lazy directory stream.
//!
//! Converts an eagerly-fetched, already-parsed listing into a pausable,
//! resumable sequence of [`Entry`] records. Flow state is an explicit
//! machine, not a boolean: `Idle -> Emitting <-> Paused -> Ended | Errored`,
//! with `destroy` as a terminal escape that suppresses the end signal.
//!
//! Emission is cooperative: each poll yields at most one entry, so a
//! `pause()` issued between polls always takes effect before the next entry
//! is delivered. No entry is dropped, duplicated, or reordered across
//! pause/resume cycles.

use crate::error::VfsError;
use crate::vfs::Entry;
use futures::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

#[derive(Debug)]
enum Flow {
    Idle,
    Emitting,
    Paused,
    Ended,
    Errored(Option<VfsError>),
    Destroyed,
}

struct Shared {
    entries: VecDeque<Entry>,
    flow: Flow,
    waker: Option<Waker>,
}

impl Shared {
    fn wake(&mut self) {
        if let Some(w) = self.waker.take() {
            w.wake();
        }
    }
}

/// Handle for controlling a [`DirStream`]'s flow from outside the consumer
/// task. All transitions are idempotent.
#[derive(Clone)]
pub struct FlowControl {
    shared: Arc<Mutex<Shared>>,
}

impl FlowControl {
    /// `Idle`/`Paused` -> `Emitting`. No-op in any other state.
    pub fn resume(&self) {
        let mut s = self.shared.lock().expect("dirstream lock poisoned");
        if matches!(s.flow, Flow::Idle | Flow::Paused) {
            s.flow = Flow::Emitting;
            s.wake();
        }
    }

    /// `Emitting` -> `Paused`. No-op in any other state.
    pub fn pause(&self) {
        let mut s = self.shared.lock().expect("dirstream lock poisoned");
        if matches!(s.flow, Flow::Emitting) {
            s.flow = Flow::Paused;
        }
    }

    /// Terminal: discard remaining entries and suppress the end signal.
    pub fn destroy(&self) {
        let mut s = self.shared.lock().expect("dirstream lock poisoned");
        if !matches!(s.flow, Flow::Ended | Flow::Destroyed) {
            s.flow = Flow::Destroyed;
            s.entries.clear();
            s.wake();
        }
    }

    /// Fail the stream: the next poll delivers the error, then the stream is
    /// terminal.
    pub fn fail(&self, err: VfsError) {
        let mut s = self.shared.lock().expect("dirstream lock poisoned");
        if !matches!(s.flow, Flow::Ended | Flow::Destroyed | Flow::Errored(_)) {
            s.flow = Flow::Errored(Some(err));
            s.entries.clear();
            s.wake();
        }
    }
}

/// Pausable push-sequence of directory entries.
///
/// Constructed `Idle`; the owner calls [`DirStream::resume`] (or hands out
/// the [`FlowControl`]) to start emission.
pub struct DirStream {
    shared: Arc<Mutex<Shared>>,
}

impl DirStream {
    pub fn new(entries: Vec<Entry>) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                entries: entries.into(),
                flow: Flow::Idle,
                waker: None,
            })),
        }
    }

    /// Cloneable flow-control handle.
    pub fn control(&self) -> FlowControl {
        FlowControl {
            shared: self.shared.clone(),
        }
    }

    pub fn resume(&self) {
        self.control().resume()
    }

    pub fn pause(&self) {
        self.control().pause()
    }

    pub fn destroy(&self) {
        self.control().destroy()
    }

    /// True once the end signal has been delivered.
    pub fn is_ended(&self) -> bool {
        matches!(
            self.shared.lock().expect("dirstream lock poisoned").flow,
            Flow::Ended
        )
    }
}

impl Stream for DirStream {
    type Item = Result<Entry, VfsError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut s = self.shared.lock().expect("dirstream lock poisoned");
        match s.flow {
            Flow::Idle | Flow::Paused => {
                s.waker = Some(cx.waker().clone());
                Poll::Pending
            }
            Flow::Emitting => match s.entries.pop_front() {
                Some(entry) => Poll::Ready(Some(Ok(entry))),
                None => {
                    s.flow = Flow::Ended;
                    Poll::Ready(None)
                }
            },
            Flow::Errored(ref mut err) => match err.take() {
                Some(e) => Poll::Ready(Some(Err(e))),
                None => Poll::Ready(None),
            },
            Flow::Ended | Flow::Destroyed => Poll::Ready(None),
        }
    }
}
