//! Integration tests for DCS configuration loading and command dispatch
//!
//! These tests exercise the crates together: a TOML configuration tree is
//! written to a temp directory, loaded into a registry, and commands are
//! dispatched to a live loopback listener or a mock SMS gateway.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p dcs-tests
//! ```
//!
//! # Test Structure
//!
//! - `config_registry_test.rs` - Loader, includes, port conflicts and registry
//! - `dispatch_e2e_test.rs` - Socket and SMS dispatch against a loaded tree

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use dcs_config::{ConfigLoader, LoadReport, LoaderOptions};
use dcs_core::{MemoryDeviceStore, RuntimeProperties, ServerRegistry};
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;

/// A temp directory holding a DCS configuration tree and a device store
pub struct Fixture {
    dir: TempDir,
}

impl Fixture {
    pub fn new() -> Result<Self> {
        Ok(Self {
            dir: tempfile::tempdir().context("Failed to create temp dir")?,
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `content` to `name` (relative, parents created)
    pub fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.dir.path().join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }

    pub fn store(&self, name: &str) -> Result<Arc<MemoryDeviceStore>> {
        let path = self.dir.path().join(name);
        let store = MemoryDeviceStore::load(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        Ok(Arc::new(store))
    }
}

/// Load `path` into a fresh registry, returning the loader's report too
pub fn load_registry(
    path: &Path,
    runtime: RuntimeProperties,
    options: LoaderOptions,
) -> Result<(Arc<ServerRegistry>, LoadReport)> {
    let loaded = ConfigLoader::new(runtime, options)
        .load(path)
        .with_context(|| format!("Failed to load {}", path.display()))?;
    let registry = ServerRegistry::default();
    loaded.register_into(&registry);
    registry.mark_initialized();
    Ok((Arc::new(registry), loaded.report))
}

/// Loopback command server answering every request line with a fixed reply
pub struct CommandListener {
    port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    task: JoinHandle<()>,
}

impl CommandListener {
    pub async fn start(reply: &str) -> Result<Self> {
        Self::spawn(Some(format!("{}\n", reply))).await
    }

    /// A listener that reads each request and never answers
    pub async fn silent() -> Result<Self> {
        Self::spawn(None).await
    }

    async fn spawn(reply: Option<String>) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind command listener")?;
        let port = listener.local_addr()?.port();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let seen = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            // Unanswered connections stay open until the listener is dropped
            let mut held = Vec::new();
            while let Ok((stream, peer)) = listener.accept().await {
                debug!(%peer, "Command connection");
                let (read, mut write) = stream.into_split();
                let mut reader = BufReader::new(read);
                let mut line = String::new();
                if reader.read_line(&mut line).await.is_err() {
                    continue;
                }
                seen.lock().push(line.trim_end().to_string());
                match &reply {
                    Some(reply) => {
                        let _ = write.write_all(reply.as_bytes()).await;
                    }
                    None => held.push((reader, write)),
                }
            }
        });

        Ok(Self {
            port,
            requests,
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Request lines received so far, without the line terminator
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

impl Drop for CommandListener {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A loopback port with nothing listening on it
pub fn closed_port() -> Result<u16> {
    let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
    Ok(listener.local_addr()?.port())
}

/// Poll all futures concurrently and collect their outputs in order
pub async fn run_concurrently<F, T>(futures: impl IntoIterator<Item = F>) -> Vec<T>
where
    F: std::future::Future<Output = T>,
{
    futures::future::join_all(futures).await
}
