//! Process-wide server registry
//!
//! The registry is built once at startup (or on an explicit reload) and is
//! read-mostly afterwards. It is an explicit object shared through `Arc`
//! rather than global state.

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::{debug, info, warn};

use crate::descriptor::{AttributeFlags, ServerDescriptor};
use crate::device::{Device, DeviceStore};
use crate::error::StoreResult;
use crate::unique_id::prefixed_unique_id;

/// Checks whether a server's deployable artifact is installed
pub trait ArtifactCheck: Send + Sync {
    fn is_deployed(&self, descriptor: &ServerDescriptor) -> bool;
}

/// Treats every server as deployed
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysDeployed;

impl ArtifactCheck for AlwaysDeployed {
    fn is_deployed(&self, _descriptor: &ServerDescriptor) -> bool {
        true
    }
}

/// Looks for `{dir}/{name}.{extension}`
#[derive(Debug, Clone)]
pub struct DirectoryArtifactCheck {
    pub dir: PathBuf,
    pub extension: String,
}

impl DirectoryArtifactCheck {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }
}

impl ArtifactCheck for DirectoryArtifactCheck {
    fn is_deployed(&self, descriptor: &ServerDescriptor) -> bool {
        self.dir
            .join(format!("{}.{}", descriptor.name(), self.extension))
            .is_file()
    }
}

/// Where the registry runs. Web applications may install server artifacts
/// after startup, so missing artifacts are tolerated there.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeploymentContext {
    #[default]
    Standalone,
    WebApp,
}

type Initializer = Arc<dyn Fn(&ServerRegistry) + Send + Sync>;

#[derive(Default)]
struct Inner {
    order: Vec<String>,
    servers: HashMap<String, Arc<ServerDescriptor>>,
    missing: Vec<String>,
}

/// Registered server descriptors by name
pub struct ServerRegistry {
    inner: RwLock<Inner>,
    artifact_check: Arc<dyn ArtifactCheck>,
    context: DeploymentContext,
    initializer: Option<Initializer>,
    /// Held for the whole initializer run; the flag marks a run in
    /// progress on the holding thread
    init_lock: ReentrantMutex<Cell<bool>>,
    initialized: AtomicBool,
    bootstrapping: AtomicBool,
}

impl std::fmt::Debug for ServerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("ServerRegistry")
            .field("servers", &inner.order)
            .field("missing", &inner.missing)
            .field("context", &self.context)
            .finish()
    }
}

impl Default for ServerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(AlwaysDeployed), DeploymentContext::Standalone)
    }
}

impl ServerRegistry {
    pub fn new(artifact_check: Arc<dyn ArtifactCheck>, context: DeploymentContext) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            artifact_check,
            context,
            initializer: None,
            init_lock: ReentrantMutex::new(Cell::new(false)),
            initialized: AtomicBool::new(false),
            bootstrapping: AtomicBool::new(false),
        }
    }

    /// Attach the loader used when the registry is first touched without
    /// having been initialized explicitly
    pub fn with_initializer<F>(mut self, init: F) -> Self
    where
        F: Fn(&ServerRegistry) + Send + Sync + 'static,
    {
        self.initializer = Some(Arc::new(init));
        self
    }

    pub fn context(&self) -> DeploymentContext {
        self.context
    }

    // -------------------------------------------------------------------------
    // Initialization
    // -------------------------------------------------------------------------

    /// Run the initializer now, as part of normal startup. Idempotent.
    pub fn initialize(&self) {
        self.bootstrapping.store(true, Ordering::SeqCst);
        self.run_initializer();
        self.bootstrapping.store(false, Ordering::SeqCst);
    }

    /// Mark the registry as initialized without running the initializer,
    /// for callers that register descriptors themselves.
    pub fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::SeqCst);
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn ensure_initialized(&self) {
        if self.is_initialized() {
            return;
        }
        if !self.bootstrapping.load(Ordering::SeqCst) {
            warn!(
                backtrace = %Backtrace::force_capture(),
                "Server registry used before explicit initialization; initializing lazily"
            );
        }
        self.run_initializer();
    }

    /// Other threads block here until the first run has finished and then
    /// see a fully loaded registry. Calls made by the initializer itself
    /// return immediately.
    fn run_initializer(&self) {
        let running = self.init_lock.lock();
        if self.is_initialized() || running.get() {
            return;
        }
        running.set(true);
        if let Some(init) = self.initializer.clone() {
            init(self);
        }
        running.set(false);
        self.initialized.store(true, Ordering::SeqCst);
        info!(servers = self.inner.read().order.len(), "Server registry initialized");
    }

    // -------------------------------------------------------------------------
    // Registration
    // -------------------------------------------------------------------------

    /// Register a descriptor.
    ///
    /// Fails for unnamed or duplicate descriptors (the existing one is
    /// left untouched). A descriptor whose artifact is missing is skipped
    /// when standalone, and kept but recorded as missing in a web-app
    /// context.
    pub fn register(&self, descriptor: ServerDescriptor) -> bool {
        let name = descriptor.name().to_string();
        if name.is_empty() {
            warn!("Refusing to register server descriptor without a name");
            return false;
        }

        let mut inner = self.inner.write();
        if inner.servers.contains_key(&name) {
            warn!(server = %name, "Server already registered, ignoring duplicate");
            return false;
        }

        let deployed = descriptor.has_flag(AttributeFlags::JAR_OPTIONAL)
            || self.artifact_check.is_deployed(&descriptor);
        if !deployed {
            match self.context {
                DeploymentContext::Standalone => {
                    warn!(server = %name, "Server artifact not found, skipping registration");
                    return false;
                }
                DeploymentContext::WebApp => {
                    debug!(server = %name, "Server artifact not found, recording as missing");
                    inner.missing.push(name.clone());
                }
            }
        }

        info!(server = %name, "Registering server");
        inner.order.push(name.clone());
        inner.servers.insert(name, Arc::new(descriptor));
        true
    }

    /// Look up a server by name, warning on a miss
    pub fn get(&self, name: &str) -> Option<Arc<ServerDescriptor>> {
        self.ensure_initialized();
        let found = self.inner.read().servers.get(name).cloned();
        if found.is_none() {
            warn!(server = %name, "Server not found");
        }
        found
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ensure_initialized();
        self.inner.read().servers.contains_key(name)
    }

    /// Servers in registration order. Servers recorded as missing are
    /// included only when `include_undeployed` is set.
    pub fn list(&self, include_undeployed: bool) -> Vec<Arc<ServerDescriptor>> {
        self.ensure_initialized();
        let inner = self.inner.read();
        inner
            .order
            .iter()
            .filter(|name| include_undeployed || !inner.missing.contains(name))
            .filter_map(|name| inner.servers.get(name).cloned())
            .collect()
    }

    /// Names of servers whose artifact was missing at registration
    pub fn missing(&self) -> Vec<String> {
        self.inner.read().missing.clone()
    }

    pub fn is_deployed(&self, name: &str) -> bool {
        let inner = self.inner.read();
        inner.servers.contains_key(name) && !inner.missing.iter().any(|m| m == name)
    }

    /// True when the named server has a dispatch port or speaks SMS
    pub fn supports_command_dispatch(&self, name: &str) -> bool {
        self.get(name)
            .map(|dcs| dcs.supports_command_dispatch())
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.inner.read().order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().order.is_empty()
    }

    // -------------------------------------------------------------------------
    // Unique-ID lookups
    // -------------------------------------------------------------------------

    /// Find devices matching `unique_id` under any registered prefix.
    ///
    /// The unprefixed ID is tried first, then each server's prefixes in
    /// registration order; each candidate string is queried at most once.
    pub async fn lookup_unique_id(
        &self,
        store: &dyn DeviceStore,
        unique_id: &str,
    ) -> StoreResult<Vec<Device>> {
        let unique_id = unique_id.trim();
        if unique_id.is_empty() {
            return Ok(Vec::new());
        }

        let mut prefixes = vec![String::new()];
        for dcs in self.list(true) {
            prefixes.extend(dcs.unique_id_prefixes().iter().cloned());
        }

        let mut tried = HashSet::new();
        let mut found: Vec<Device> = Vec::new();
        for prefix in prefixes {
            let candidate = prefixed_unique_id(&prefix, unique_id);
            if !tried.insert(candidate.clone()) {
                continue;
            }
            if let Some(device) = store.load_by_unique_id(&candidate).await? {
                if !found.iter().any(|d| d.key() == device.key()) {
                    debug!(unique_id = %candidate, device = %device.key(), "Unique ID matched");
                    found.push(device);
                }
            }
        }
        Ok(found)
    }
}

/// Load the first active device (with an active account) found under any
/// of `prefixes` for a modem ID.
pub async fn load_device_by_prefixed_modem_id<S: AsRef<str>>(
    store: &dyn DeviceStore,
    prefixes: &[S],
    modem_id: &str,
) -> StoreResult<Option<Device>> {
    let modem_id = modem_id.trim();
    if modem_id.is_empty() {
        return Ok(None);
    }

    for prefix in prefixes {
        let candidate = prefixed_unique_id(prefix.as_ref(), modem_id);
        let Some(device) = store.load_by_unique_id(&candidate).await? else {
            continue;
        };
        if !device.active {
            warn!(device = %device.key(), "Device is inactive");
            return Ok(None);
        }
        let account_active = store
            .load_account(&device.account_id)
            .await?
            .map(|a| a.active)
            .unwrap_or(false);
        if !account_active {
            warn!(account = %device.account_id, "Account is missing or inactive");
            return Ok(None);
        }
        return Ok(Some(device));
    }
    Ok(None)
}
