//! VFS operation set.
//!
//! Implements the uniform virtual-filesystem contract over the session
//! facade: each operation takes a path and an options bag, resolves to a
//! [`Meta`] (possibly carrying a lazy stream), and maps transport failures
//! into the [`VfsError`] taxonomy. This is the boundary past which no raw
//! backend reply code leaks.
//!
//! The operations themselves live on an inner core shared with the extension
//! sandbox, so registered scripts can drive the same code paths as native
//! callers.

use crate::error::{map_missing, map_protocol, Result, VfsError};
use crate::etag::calc_etag;
use crate::events::{EventBus, HandlerId};
use crate::extension::{dynamic_to_json, Capability, ExtensionRegistry, ExtensionSource};
use crate::path;
use crate::session::Session;
use crate::streaming::pipeline::write_file;
use crate::streaming::{DirStream, FileSink, FileStream};
use crate::transport::{ByteSource, FtpTransport, RawEntry, TransportError};
use futures::StreamExt;
use rhai::{Dynamic, Engine, EvalAltResult};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Resolves a MIME type from a file name. Inference itself is an external
/// collaborator; the adapter only threads the result through.
pub type MimeResolver = Arc<dyn Fn(&str) -> String + Send + Sync>;

const DIR_MIME: &str = "inode/directory";
const DEFAULT_MIME: &str = "application/octet-stream";

/// Metadata shape shared by every operation. Constructed fresh per call;
/// ownership transfers to the caller.
#[derive(Debug, Clone, Default)]
pub struct Meta {
    pub mime: String,
    pub size: u64,
    pub etag: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub not_modified: bool,
}

/// One directory child, in listing order.
#[derive(Debug, Clone)]
pub struct Entry {
    pub name: String,
    pub path: String,
    pub href: String,
    pub mime: String,
    pub size: u64,
    pub etag: String,
}

/// `readfile` result: metadata plus the content stream, absent when the
/// caller's validator matched.
pub struct FileRead {
    pub meta: Meta,
    pub stream: Option<FileStream>,
}

impl std::fmt::Debug for FileRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRead")
            .field("meta", &self.meta)
            .field("stream", &self.stream.as_ref().map(|_| "FileStream"))
            .finish()
    }
}

/// `readdir` result: metadata plus the entry stream, absent in head mode.
pub struct DirRead {
    pub meta: Meta,
    pub stream: Option<DirStream>,
}

impl std::fmt::Debug for DirRead {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirRead")
            .field("meta", &self.meta)
            .field("stream", &self.stream.as_ref().map(|_| "DirStream"))
            .finish()
    }
}

/// Options for `readfile`.
#[derive(Default)]
pub struct ReadOptions {
    /// Conditional read: a matching validator short-circuits the transfer.
    pub etag: Option<String>,
}

/// Options for `readdir`.
#[derive(Default)]
pub struct ReaddirOptions {
    /// Metadata only; no entry stream.
    pub head: bool,
}

/// Options for `mkfile`.
#[derive(Default)]
pub struct MkfileOptions {
    /// Content to write; `None` creates a zero-byte resource.
    pub source: Option<ByteSource>,
}

/// Options for `rename` and `copy`: exactly one of `from`/`to`, resolved
/// against the supplied path. `from` wins when both are present.
#[derive(Default, Clone)]
pub struct TargetOptions {
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Options for `extend`.
pub struct ExtendOptions {
    pub source: ExtensionSource,
    /// Allow replacing an existing registration.
    pub redefine: bool,
}

/// Adapter configuration.
#[derive(Default)]
pub struct VfsConfig {
    /// MIME inference collaborator; defaults to a constant resolver.
    pub mime: Option<MimeResolver>,
}

/// Session plus collaborators: the part of the adapter the operations need.
/// Shared between the public [`Vfs`] surface and the extension sandbox.
struct VfsCore {
    session: Session,
    mime: MimeResolver,
}

impl VfsCore {
    fn mime_for(&self, name: &str, is_dir: bool) -> String {
        if is_dir {
            DIR_MIME.to_string()
        } else {
            (self.mime)(name)
        }
    }

    /// Look a path up in its parent's listing. Root has no parent and is
    /// handled by the callers that allow it.
    async fn lookup(&self, path: &str) -> Result<(RawEntry, String)> {
        let normalized = path::normalize(path);
        let (parent, base) = path::split(&normalized)
            .ok_or_else(|| VfsError::InvalidArgument("root has no parent entry".into()))?;
        let entries = self
            .session
            .list(&parent)
            .await
            .map_err(|e| map_missing(e, &normalized))?;
        entries
            .into_iter()
            .find(|e| e.name == base)
            .map(|e| (e, normalized.clone()))
            .ok_or(VfsError::NotFound(normalized))
    }

    async fn stat(&self, p: &str) -> Result<Meta> {
        if path::is_root(p) {
            return Ok(Meta {
                mime: DIR_MIME.to_string(),
                size: 0,
                etag: None,
                name: Some("/".to_string()),
                path: Some("/".to_string()),
                not_modified: false,
            });
        }
        let (entry, normalized) = self.lookup(p).await?;
        Ok(Meta {
            mime: self.mime_for(&entry.name, entry.is_dir()),
            size: entry.size,
            etag: Some(calc_etag(&normalized, entry.mtime, entry.size)),
            name: Some(entry.name),
            path: Some(normalized),
            not_modified: false,
        })
    }

    async fn readdir(&self, p: &str, options: ReaddirOptions) -> Result<DirRead> {
        let normalized = path::normalize(p);
        let raw = self
            .session
            .list(&normalized)
            .await
            .map_err(|e| map_missing(e, &normalized))?;

        let meta = Meta {
            mime: DIR_MIME.to_string(),
            path: Some(normalized.clone()),
            ..Meta::default()
        };
        if options.head {
            return Ok(DirRead { meta, stream: None });
        }

        let entries = raw
            .into_iter()
            .map(|e| {
                let child = path::join(&normalized, &e.name);
                Entry {
                    href: "#".to_string(),
                    mime: self.mime_for(&e.name, e.is_dir()),
                    size: e.size,
                    etag: calc_etag(&child, e.mtime, e.size),
                    path: child,
                    name: e.name,
                }
            })
            .collect();

        let stream = DirStream::new(entries);
        stream.resume();
        Ok(DirRead {
            meta,
            stream: Some(stream),
        })
    }

    async fn readfile(&self, p: &str, options: ReadOptions) -> Result<FileRead> {
        let (entry, normalized) = self.lookup(p).await?;
        if entry.is_dir() {
            return Err(VfsError::IsADirectory(normalized));
        }

        let mut meta = Meta {
            mime: self.mime_for(&entry.name, false),
            size: entry.size,
            etag: Some(calc_etag(&normalized, entry.mtime, entry.size)),
            name: None,
            path: None,
            not_modified: false,
        };

        if options.etag.is_some() && options.etag == meta.etag {
            meta.not_modified = true;
            debug!(path = %normalized, "validator matched, skipping transfer");
            return Ok(FileRead { meta, stream: None });
        }

        let transfer = self
            .session
            .open_read(&normalized)
            .await
            .map_err(|e| map_missing(e, &normalized))?;
        let (io, permit) = transfer.into_parts();
        Ok(FileRead {
            meta,
            stream: Some(FileStream::new(io, permit)),
        })
    }

    async fn mkfile(&self, p: &str, source: Option<ByteSource>) -> Result<Meta> {
        let normalized = path::normalize(p);
        let written = write_file(&self.session, &normalized, source).await?;
        Ok(Meta {
            mime: self.mime_for(&normalized, false),
            size: written,
            path: Some(normalized),
            ..Meta::default()
        })
    }

    async fn mkfile_stream(&self, p: &str) -> Result<(Meta, FileSink)> {
        let normalized = path::normalize(p);
        let transfer = self
            .session
            .open_write(&normalized)
            .await
            .map_err(|e| map_missing(e, &normalized))?;
        let (io, permit) = transfer.into_parts();
        let meta = Meta {
            mime: self.mime_for(&normalized, false),
            path: Some(normalized),
            ..Meta::default()
        };
        Ok((meta, FileSink::new(io, permit)))
    }

    async fn mkdir(&self, p: &str) -> Result<()> {
        let normalized = path::normalize(p);
        match self.session.make_dir(&normalized).await {
            Ok(()) => Ok(()),
            Err(TransportError::Reply { code: 550, .. }) => {
                Err(VfsError::AlreadyExists(normalized))
            }
            Err(e) => Err(map_protocol(e)),
        }
    }

    async fn rmdir(&self, p: &str) -> Result<()> {
        let normalized = path::normalize(p);
        self.session
            .remove_dir(&normalized)
            .await
            .map_err(|e| map_missing(e, &normalized))
    }

    async fn rmfile(&self, p: &str) -> Result<()> {
        let normalized = path::normalize(p);
        self.session
            .remove(&normalized)
            .await
            .map_err(|e| map_missing(e, &normalized))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = path::normalize(from);
        let to = path::normalize(to);
        self.session
            .rename(&from, &to)
            .await
            .map_err(|e| map_missing(e, &from))
    }

    async fn copy(&self, from: &str, to: &str) -> Result<Meta> {
        let read = self.readfile(from, ReadOptions::default()).await?;
        let source: Option<ByteSource> = read.stream.map(|s| s.boxed());
        let written = write_file(&self.session, to, source).await?;
        Ok(Meta {
            mime: self.mime_for(to, false),
            size: written,
            path: Some(to.to_string()),
            ..Meta::default()
        })
    }
}

/// The FTP-backed VFS adapter.
pub struct Vfs {
    core: Arc<VfsCore>,
    extensions: ExtensionRegistry,
    events: Arc<EventBus>,
}

impl Vfs {
    pub fn new(transport: Arc<dyn FtpTransport>, config: VfsConfig) -> Self {
        Self {
            core: Arc::new(VfsCore {
                session: Session::new(transport),
                mime: config
                    .mime
                    .unwrap_or_else(|| Arc::new(|_: &str| DEFAULT_MIME.to_string())),
            }),
            extensions: ExtensionRegistry::new(),
            events: Arc::new(EventBus::new()),
        }
    }

    /// `stat` - metadata for a single path. The root is a constant success
    /// with no backend call.
    pub async fn stat(&self, p: &str) -> Result<Meta> {
        self.core.stat(p).await
    }

    /// `readdir` - stream a directory's entries with consumer-driven flow
    /// control. A missing directory is an error, never an empty success.
    pub async fn readdir(&self, p: &str, options: ReaddirOptions) -> Result<DirRead> {
        self.core.readdir(p, options).await
    }

    /// `readfile` - metadata plus a lazy content stream. Resolves metadata
    /// first so a matching validator never opens a transfer.
    pub async fn readfile(&self, p: &str, options: ReadOptions) -> Result<FileRead> {
        self.core.readfile(p, options).await
    }

    /// `mkfile` - write a file from the supplied source, or create a
    /// zero-byte resource when no source is given.
    pub async fn mkfile(&self, p: &str, options: MkfileOptions) -> Result<Meta> {
        self.core.mkfile(p, options.source).await
    }

    /// Open a write transfer for manual writing. The transfer completes when
    /// the returned sink is closed.
    pub async fn mkfile_stream(&self, p: &str) -> Result<(Meta, FileSink)> {
        self.core.mkfile_stream(p).await
    }

    /// `mkdir` - create a directory. An existing target (file or directory)
    /// is AlreadyExists.
    pub async fn mkdir(&self, p: &str) -> Result<()> {
        self.core.mkdir(p).await
    }

    /// `rmdir` - remove a directory.
    pub async fn rmdir(&self, p: &str) -> Result<()> {
        self.core.rmdir(p).await
    }

    /// `rmfile` - remove a file.
    pub async fn rmfile(&self, p: &str) -> Result<()> {
        self.core.rmfile(p).await
    }

    /// `rename` - move `from` to `to`, resolved from the options pair.
    pub async fn rename(&self, p: &str, options: TargetOptions) -> Result<()> {
        let (from, to) = resolve_pair(p, &options)?;
        self.core.rename(&from, &to).await
    }

    /// `copy` - read the source and write the destination using the exact
    /// stream the read produced; no re-stat, no second fetch. A missing
    /// `from`/`to` pair fails before any backend call.
    pub async fn copy(&self, p: &str, options: TargetOptions) -> Result<Meta> {
        let (from, to) = resolve_pair(p, &options)?;
        self.core.copy(&from, &to).await
    }

    // Operations the backend cannot honor.

    pub async fn resolve(&self, _p: &str) -> Result<Meta> {
        Err(VfsError::NotSupported("resolve"))
    }

    pub async fn connect(&self, _port: u16) -> Result<Meta> {
        Err(VfsError::NotSupported("connect"))
    }

    pub async fn spawn(&self, _executable: &str) -> Result<Meta> {
        Err(VfsError::NotSupported("spawn"))
    }

    pub async fn symlink(&self, _p: &str) -> Result<Meta> {
        Err(VfsError::NotSupported("symlink"))
    }

    pub async fn watch(&self, _p: &str) -> Result<Meta> {
        Err(VfsError::NotSupported("watch"))
    }

    pub async fn exec_file(&self, _p: &str) -> Result<Meta> {
        Err(VfsError::NotSupported("execFile"))
    }

    // Event bus surface.

    pub fn on<F>(&self, name: &str, handler: F) -> HandlerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.events.on(name, handler)
    }

    pub fn off(&self, name: &str, id: HandlerId) {
        self.events.off(name, id)
    }

    pub fn emit(&self, name: &str, value: &Value) {
        self.events.emit(name, value)
    }

    // Extension surface.

    /// `extend` - register a named capability from exactly one source. The
    /// script's sandbox gets `emit` plus a metadata/control slice of the
    /// operation set (`stat`, `readdir`, `mkdir`, `rmfile`, `rename`);
    /// transfer-stream operations stay host-side.
    pub async fn extend(&self, name: &str, options: ExtendOptions) -> Result<Arc<Capability>> {
        let core = self.core.clone();
        let events = self.events.clone();
        let rt = tokio::runtime::Handle::current();
        self.extensions
            .extend(name, options.source, options.redefine, move |engine| {
                inject_capabilities(engine, core, events, rt)
            })
            .await
    }

    /// `unextend` - drop a registration; absent names are a no-op.
    pub fn unextend(&self, name: &str) {
        self.extensions.unextend(name)
    }

    /// The `use` operation: fetch a registered capability by name.
    pub fn use_api(&self, name: &str) -> Result<Arc<Capability>> {
        self.extensions.get(name)
    }

    /// Tear the adapter down. Idempotent; all subsequent operations fail
    /// with `SessionClosed`.
    pub async fn destroy(&self) {
        self.core.session.destroy().await
    }
}

type ScriptResult<T> = std::result::Result<T, Box<EvalAltResult>>;

fn script_err(err: VfsError) -> Box<EvalAltResult> {
    err.to_string().into()
}

/// Install the host-function surface on a sandbox engine. Scripts run on the
/// blocking pool, so each bridge blocks its thread on the async operation
/// through the captured runtime handle.
fn inject_capabilities(
    engine: &mut Engine,
    core: Arc<VfsCore>,
    events: Arc<EventBus>,
    rt: tokio::runtime::Handle,
) {
    engine.register_fn("emit", move |name: &str, value: Dynamic| {
        events.emit(name, &dynamic_to_json(&value));
    });

    let (c, h) = (core.clone(), rt.clone());
    engine.register_fn("stat", move |path: &str| -> ScriptResult<rhai::Map> {
        let meta = h.block_on(c.stat(path)).map_err(script_err)?;
        Ok(meta_to_map(&meta))
    });

    let (c, h) = (core.clone(), rt.clone());
    engine.register_fn("readdir", move |path: &str| -> ScriptResult<rhai::Array> {
        let names = h
            .block_on(async {
                let read = c.readdir(path, ReaddirOptions::default()).await?;
                let mut names = Vec::new();
                if let Some(mut stream) = read.stream {
                    while let Some(item) = stream.next().await {
                        names.push(item?.name);
                    }
                }
                Ok::<_, VfsError>(names)
            })
            .map_err(script_err)?;
        Ok(names.into_iter().map(Dynamic::from).collect())
    });

    let (c, h) = (core.clone(), rt.clone());
    engine.register_fn("mkdir", move |path: &str| -> ScriptResult<()> {
        h.block_on(c.mkdir(path)).map_err(script_err)
    });

    let (c, h) = (core.clone(), rt.clone());
    engine.register_fn("rmfile", move |path: &str| -> ScriptResult<()> {
        h.block_on(c.rmfile(path)).map_err(script_err)
    });

    let (c, h) = (core, rt);
    engine.register_fn("rename", move |from: &str, to: &str| -> ScriptResult<()> {
        h.block_on(c.rename(from, to)).map_err(script_err)
    });
}

fn meta_to_map(meta: &Meta) -> rhai::Map {
    let mut map = rhai::Map::new();
    map.insert("mime".into(), meta.mime.clone().into());
    map.insert("size".into(), Dynamic::from(meta.size as i64));
    if let Some(etag) = &meta.etag {
        map.insert("etag".into(), etag.clone().into());
    }
    if let Some(name) = &meta.name {
        map.insert("name".into(), name.clone().into());
    }
    if let Some(path) = &meta.path {
        map.insert("path".into(), path.clone().into());
    }
    map
}

fn resolve_pair(p: &str, options: &TargetOptions) -> Result<(String, String)> {
    match (&options.from, &options.to) {
        (Some(from), _) => Ok((path::normalize(from), path::normalize(p))),
        (None, Some(to)) => Ok((path::normalize(p), path::normalize(to))),
        (None, None) => Err(VfsError::InvalidArgument(
            "must specify either options.from or options.to".into(),
        )),
    }
}
