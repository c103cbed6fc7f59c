//! Extension registry: hot-loadable capability modules.
//!
//! Extensions are rhai scripts evaluated in a sandboxed engine with hard
//! safety limits. The script's top-level runs once at registration; its
//! functions become the capability's exported surface, callable by name.
//! The sandbox sees nothing of the adapter beyond the host functions
//! explicitly injected through the registration setup hook (the adapter
//! injects `emit` plus a metadata/control slice of the VFS operations).
//!
//! Script execution is synchronous, so it runs on the blocking pool; host
//! functions bridge back into the async adapter with a runtime handle.

use crate::error::{Result, VfsError};
use crate::transport::ByteSource;
use futures::StreamExt;
use rhai::{Dynamic, Engine, EvalAltResult, Scope, AST};
use std::collections::hash_map::{Entry, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Where the extension code comes from. Exactly one by construction.
pub enum ExtensionSource {
    /// A local script file, read at registration time.
    File(PathBuf),
    /// Inline code text.
    Code(String),
    /// A byte stream consumed to UTF-8 text.
    Stream(ByteSource),
}

/// A registered capability: the compiled script plus its sandbox engine.
pub struct Capability {
    name: String,
    names: Vec<String>,
    engine: Arc<Engine>,
    ast: Arc<AST>,
}

impl std::fmt::Debug for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capability")
            .field("name", &self.name)
            .field("names", &self.names)
            .finish()
    }
}

impl Capability {
    /// The name this capability was registered under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Function names the script exports.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Call an exported function by name. Runs on the blocking pool since
    /// the script may re-enter the adapter through injected host functions.
    pub async fn call(&self, func: &str, args: Vec<Dynamic>) -> Result<Dynamic> {
        let engine = self.engine.clone();
        let ast = self.ast.clone();
        let cap = self.name.clone();
        let func = func.to_string();
        tokio::task::spawn_blocking(move || {
            let mut scope = Scope::new();
            engine
                .call_fn::<Dynamic>(&mut scope, &ast, &func, args)
                .map_err(|e| match *e {
                    EvalAltResult::ErrorFunctionNotFound(name, _) => VfsError::NotFound(name),
                    other => VfsError::InvalidArgument(format!("extension {cap}: {other}")),
                })
        })
        .await
        .map_err(|e| VfsError::Protocol(format!("extension call panicked: {e}")))?
    }
}

#[derive(Default)]
pub struct ExtensionRegistry {
    apis: Mutex<HashMap<String, Arc<Capability>>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability under `name`. Fails with AlreadyExists unless
    /// `redefine` is set. `setup` installs the host-function surface on the
    /// sandbox engine before the script compiles.
    ///
    /// The early existence check only fails fast before loading code; the
    /// authoritative decision is made under the lock at insert time, so two
    /// racing registrations of the same name cannot both succeed.
    pub async fn extend(
        &self,
        name: &str,
        source: ExtensionSource,
        redefine: bool,
        setup: impl FnOnce(&mut Engine),
    ) -> Result<Arc<Capability>> {
        if !redefine && self.apis.lock().expect("registry lock poisoned").contains_key(name) {
            return Err(already_exists(name));
        }

        let code = load_source(source).await?;
        let mut engine = sandbox_engine();
        setup(&mut engine);
        let engine = Arc::new(engine);
        let ast = Arc::new(
            engine
                .compile(&code)
                .map_err(|e| VfsError::InvalidArgument(format!("extension {name}: {e}")))?,
        );

        // Run the top level once so the script can initialize (and so bad
        // scripts fail at registration, not first use). Blocking pool: the
        // script may already call injected host functions here.
        {
            let engine = engine.clone();
            let ast = ast.clone();
            let name = name.to_string();
            tokio::task::spawn_blocking(move || {
                engine
                    .run_ast(&ast)
                    .map_err(|e| VfsError::InvalidArgument(format!("extension {name}: {e}")))
            })
            .await
            .map_err(|e| VfsError::Protocol(format!("extension init panicked: {e}")))??;
        }

        let names = ast
            .iter_functions()
            .map(|f| f.name.to_string())
            .collect::<Vec<_>>();
        debug!(name, exports = names.len(), "registered extension");

        let capability = Arc::new(Capability {
            name: name.to_string(),
            names,
            engine,
            ast,
        });

        let mut apis = self.apis.lock().expect("registry lock poisoned");
        match apis.entry(name.to_string()) {
            Entry::Occupied(_) if !redefine => Err(already_exists(name)),
            Entry::Occupied(mut slot) => {
                slot.insert(capability.clone());
                Ok(capability)
            }
            Entry::Vacant(slot) => {
                slot.insert(capability.clone());
                Ok(capability)
            }
        }
    }

    /// Remove a registration. No error if absent.
    pub fn unextend(&self, name: &str) {
        self.apis.lock().expect("registry lock poisoned").remove(name);
    }

    /// Fetch a registered capability.
    pub fn get(&self, name: &str) -> Result<Arc<Capability>> {
        self.apis
            .lock()
            .expect("registry lock poisoned")
            .get(name)
            .cloned()
            .ok_or_else(|| VfsError::NotFound(format!("no API extension named {name}")))
    }
}

fn already_exists(name: &str) -> VfsError {
    VfsError::AlreadyExists(format!("extension API already defined for {name}"))
}

async fn load_source(source: ExtensionSource) -> Result<String> {
    match source {
        ExtensionSource::Code(code) => Ok(code),
        ExtensionSource::File(path) => tokio::fs::read_to_string(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VfsError::NotFound(path.display().to_string())
            } else {
                VfsError::Io(e)
            }
        }),
        ExtensionSource::Stream(mut stream) => {
            let mut buf = Vec::new();
            while let Some(chunk) = stream.next().await {
                buf.extend_from_slice(&chunk?);
            }
            String::from_utf8(buf)
                .map_err(|_| VfsError::InvalidArgument("extension code is not valid UTF-8".into()))
        }
    }
}

/// Build the sandbox: hard limits on expression depth, operation count, and
/// collection sizes. The capability surface is installed by the caller's
/// setup hook.
fn sandbox_engine() -> Engine {
    let mut engine = Engine::new();
    engine.set_max_expr_depths(64, 64);
    engine.set_max_operations(100_000);
    engine.set_max_modules(0);
    engine.set_max_string_size(1_000_000);
    engine.set_max_array_size(10_000);
    engine.set_max_map_size(10_000);
    engine
}

/// Lossy conversion from a script value to a JSON event payload.
pub(crate) fn dynamic_to_json(value: &Dynamic) -> serde_json::Value {
    use serde_json::Value;
    if value.is_unit() {
        Value::Null
    } else if let Ok(b) = value.as_bool() {
        Value::Bool(b)
    } else if let Ok(i) = value.as_int() {
        Value::from(i)
    } else if let Ok(f) = value.as_float() {
        Value::from(f)
    } else {
        Value::String(value.to_string())
    }
}
