//! In-memory fake FTP transport for integration tests.
//!
//! Models a server-side tree keyed by normalized path, serves listings in
//! lexical order, and counts negotiations so tests can assert which
//! operations touched the backend.

use async_trait::async_trait;
use bytes::Bytes;
use ftpvfs::transport::{
    ByteSink, ByteSource, EntryKind, FtpTransport, RawEntry, TransportError, TransportResult,
};
use futures::StreamExt;
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tokio::io::AsyncWrite;
use tracing_subscriber::EnvFilter;

/// Install the test tracing subscriber. First call wins; the rest are no-ops
/// so every test can call this unconditionally. `RUST_LOG` selects the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Clone)]
enum Node {
    File { content: Vec<u8>, mtime: i64 },
    Dir,
}

#[derive(Default)]
struct Tree {
    nodes: BTreeMap<String, Node>,
    clock: i64,
}

impl Tree {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        1_600_000_000 + self.clock
    }
}

#[derive(Default)]
pub struct Counters {
    pub lists: AtomicUsize,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

pub struct FakeTransport {
    tree: Arc<Mutex<Tree>>,
    pub counters: Arc<Counters>,
}

fn parent_of(path: &str) -> Option<String> {
    if path == "/" {
        return None;
    }
    let idx = path.rfind('/').unwrap_or(0);
    Some(if idx == 0 { "/".to_string() } else { path[..idx].to_string() })
}

fn base_of(path: &str) -> String {
    path.rsplit('/').next().unwrap_or("").to_string()
}

fn missing(path: &str) -> TransportError {
    TransportError::reply(550, format!("{path}: No such file or directory"))
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            tree: Arc::new(Mutex::new(Tree::default())),
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn dir(self, path: &str) -> Self {
        self.tree
            .lock()
            .unwrap()
            .nodes
            .insert(path.to_string(), Node::Dir);
        self
    }

    pub fn file(self, path: &str, content: &[u8]) -> Self {
        {
            let mut tree = self.tree.lock().unwrap();
            let mtime = tree.tick();
            tree.nodes.insert(
                path.to_string(),
                Node::File {
                    content: content.to_vec(),
                    mtime,
                },
            );
        }
        self
    }

    pub fn content_of(&self, path: &str) -> Option<Vec<u8>> {
        match self.tree.lock().unwrap().nodes.get(path) {
            Some(Node::File { content, .. }) => Some(content.clone()),
            _ => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        path == "/" || self.tree.lock().unwrap().nodes.contains_key(path)
    }

    fn entry_for(path: &str, node: &Node) -> RawEntry {
        match node {
            Node::File { content, mtime } => RawEntry {
                name: base_of(path),
                size: content.len() as u64,
                mtime: Some(*mtime),
                kind: EntryKind::File,
            },
            Node::Dir => RawEntry {
                name: base_of(path),
                size: 0,
                mtime: None,
                kind: EntryKind::Dir,
            },
        }
    }
}

struct FakeSink {
    tree: Arc<Mutex<Tree>>,
    path: String,
    buf: Vec<u8>,
}

impl AsyncWrite for FakeSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        data: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        self.buf.extend_from_slice(data);
        Poll::Ready(Ok(data.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        let content = std::mem::take(&mut self.buf);
        let mut tree = self.tree.lock().unwrap();
        let mtime = tree.tick();
        let path = self.path.clone();
        tree.nodes.insert(path, Node::File { content, mtime });
        Poll::Ready(Ok(()))
    }
}

#[async_trait]
impl FtpTransport for FakeTransport {
    async fn list(&self, path: &str) -> TransportResult<Vec<RawEntry>> {
        self.counters.lists.fetch_add(1, Ordering::SeqCst);
        let tree = self.tree.lock().unwrap();
        if path == "/" || matches!(tree.nodes.get(path), Some(Node::Dir)) {
            let prefix = if path == "/" { String::new() } else { path.to_string() };
            let children = tree
                .nodes
                .iter()
                .filter(|(p, _)| {
                    p.strip_prefix(&prefix)
                        .and_then(|rest| rest.strip_prefix('/'))
                        .is_some_and(|rest| !rest.contains('/'))
                })
                .map(|(p, n)| Self::entry_for(p, n))
                .collect();
            return Ok(children);
        }
        match tree.nodes.get(path) {
            Some(node) => Ok(vec![Self::entry_for(path, node)]),
            None => Err(missing(path)),
        }
    }

    async fn open_read(&self, path: &str) -> TransportResult<ByteSource> {
        self.counters.reads.fetch_add(1, Ordering::SeqCst);
        let tree = self.tree.lock().unwrap();
        match tree.nodes.get(path) {
            Some(Node::File { content, .. }) => {
                let chunks: Vec<std::io::Result<Bytes>> = content
                    .chunks(8)
                    .map(|c| Ok(Bytes::copy_from_slice(c)))
                    .collect();
                Ok(futures::stream::iter(chunks).boxed())
            }
            Some(Node::Dir) => Err(TransportError::reply(550, "Not a plain file")),
            None => Err(missing(path)),
        }
    }

    async fn open_write(&self, path: &str) -> TransportResult<ByteSink> {
        self.counters.writes.fetch_add(1, Ordering::SeqCst);
        {
            let tree = self.tree.lock().unwrap();
            let parent = parent_of(path).ok_or_else(|| missing(path))?;
            if parent != "/" && !matches!(tree.nodes.get(&parent), Some(Node::Dir)) {
                return Err(missing(&parent));
            }
        }
        Ok(Box::pin(FakeSink {
            tree: self.tree.clone(),
            path: path.to_string(),
            buf: Vec::new(),
        }))
    }

    async fn delete(&self, path: &str) -> TransportResult<()> {
        let mut tree = self.tree.lock().unwrap();
        match tree.nodes.get(path) {
            Some(Node::File { .. }) => {
                tree.nodes.remove(path);
                Ok(())
            }
            _ => Err(missing(path)),
        }
    }

    async fn make_dir(&self, path: &str) -> TransportResult<()> {
        let mut tree = self.tree.lock().unwrap();
        if tree.nodes.contains_key(path) {
            return Err(TransportError::reply(550, "File exists"));
        }
        tree.nodes.insert(path.to_string(), Node::Dir);
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> TransportResult<()> {
        let mut tree = self.tree.lock().unwrap();
        match tree.nodes.get(path) {
            Some(Node::Dir) => {
                tree.nodes.remove(path);
                Ok(())
            }
            _ => Err(missing(path)),
        }
    }

    async fn rename(&self, from: &str, to: &str) -> TransportResult<()> {
        let mut tree = self.tree.lock().unwrap();
        match tree.nodes.remove(from) {
            Some(node) => {
                tree.nodes.insert(to.to_string(), node);
                Ok(())
            }
            None => Err(missing(from)),
        }
    }

    async fn quit(&self) -> TransportResult<()> {
        Ok(())
    }
}
