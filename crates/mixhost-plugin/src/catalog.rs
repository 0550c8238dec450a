//! Plugin discovery.
//!
//! Enumeration touches the filesystem and parses metadata, so it runs on a
//! dedicated discovery thread owned by a [`DiscoverySession`]. The result
//! is published as an immutable snapshot sorted by display name.

use crate::error::Result;
use crate::metadata::{PluginAbi, PluginDescriptor, PluginId};
use arc_swap::ArcSwap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Enumerates the installed plugins of one ABI.
pub trait PluginScanner: Send + Sync {
    fn abi(&self) -> PluginAbi;

    fn scan(&self) -> Result<Vec<PluginDescriptor>>;
}

/// Owner of one discovery run and its result.
pub struct DiscoverySession {
    scanners: Arc<Vec<Arc<dyn PluginScanner>>>,
    favorites: Arc<HashSet<PluginId>>,
    catalog: Arc<ArcSwap<Vec<PluginDescriptor>>>,
    discovered: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl DiscoverySession {
    /// Session without scanners; add them with [`scanner`](Self::scanner).
    pub fn new() -> Self {
        Self {
            scanners: Arc::new(Vec::new()),
            favorites: Arc::new(HashSet::new()),
            catalog: Arc::new(ArcSwap::from_pointee(Vec::new())),
            discovered: Arc::new(AtomicBool::new(false)),
            thread: None,
        }
    }

    /// Session scanning every ABI compiled in.
    pub fn native() -> Self {
        #[allow(unused_mut)]
        let mut session = Self::new();
        #[cfg(feature = "ladspa")]
        {
            session = session.scanner(crate::ladspa::LadspaScanner::from_env());
        }
        #[cfg(feature = "lv2")]
        {
            session = session.scanner(crate::lv2::Lv2Scanner::new());
        }
        session
    }

    pub fn scanner(mut self, scanner: impl PluginScanner + 'static) -> Self {
        let mut scanners: Vec<_> = self.scanners.iter().cloned().collect();
        scanners.push(Arc::new(scanner));
        self.scanners = Arc::new(scanners);
        self
    }

    /// Identifiers to flag as favorites in the catalog.
    pub fn favorites(mut self, ids: impl IntoIterator<Item = PluginId>) -> Self {
        self.favorites = Arc::new(ids.into_iter().collect());
        self
    }

    /// Start discovery in the background. Does nothing while a discovery
    /// thread is already running.
    pub fn spawn_discover_thread(&mut self) {
        if self.thread.is_some() {
            return;
        }
        let scanners = Arc::clone(&self.scanners);
        let favorites = Arc::clone(&self.favorites);
        let catalog = Arc::clone(&self.catalog);
        let discovered = Arc::clone(&self.discovered);

        let handle = thread::Builder::new()
            .name("plugin-discovery".to_string())
            .spawn(move || {
                catalog.store(Arc::new(discover(&scanners, &favorites)));
                discovered.store(true, Ordering::Release);
            })
            .expect("Failed to spawn plugin discovery thread");
        self.thread = Some(handle);
    }

    /// Wait for a running discovery. Safe to call when none is running.
    pub fn join_discover_thread(&mut self) {
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::error!("Plugin discovery thread panicked");
            }
        }
    }

    pub fn is_discovering(&self) -> bool {
        self.thread.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// The full catalog, sorted by name. Waits for a running discovery and
    /// discovers on the calling thread if none ever ran.
    pub fn get_all_plugins(&mut self) -> Arc<Vec<PluginDescriptor>> {
        self.join_discover_thread();
        if !self.discovered.load(Ordering::Acquire) {
            self.catalog
                .store(Arc::new(discover(&self.scanners, &self.favorites)));
            self.discovered.store(true, Ordering::Release);
        }
        self.catalog.load_full()
    }

    /// Current snapshot without waiting. Empty before the first discovery.
    pub fn plugins(&self) -> Arc<Vec<PluginDescriptor>> {
        self.catalog.load_full()
    }

    pub fn find(&self, id: &PluginId) -> Option<PluginDescriptor> {
        self.catalog.load().iter().find(|d| &d.id == id).cloned()
    }
}

impl Default for DiscoverySession {
    fn default() -> Self {
        Self::native()
    }
}

impl Drop for DiscoverySession {
    fn drop(&mut self) {
        self.join_discover_thread();
    }
}

fn discover(scanners: &[Arc<dyn PluginScanner>], favorites: &HashSet<PluginId>) -> Vec<PluginDescriptor> {
    let mut plugins = Vec::new();
    for scanner in scanners {
        match scanner.scan() {
            Ok(found) => {
                tracing::info!("Found {} {} plugins", found.len(), scanner.abi());
                plugins.extend(found);
            }
            Err(e) => tracing::warn!("{} discovery failed: {}", scanner.abi(), e),
        }
    }
    for plugin in &mut plugins {
        plugin.favorite = favorites.contains(&plugin.id);
    }
    plugins.sort_by(|a, b| a.name.cmp(&b.name));
    plugins
}
