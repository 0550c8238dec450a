//! Builder for configuring and constructing a `PluginHost`.

use crate::PluginHost;
use mixhost_plugin::{
    DiscoverySession, HostConfig, NativeResolver, PluginId, PluginResolver, PluginScanner,
};
use std::sync::Arc;

/// Scanners for every compiled-in plugin format are added automatically
/// unless [`scanner`](Self::scanner) is used, in which case only the given
/// scanners run.
///
/// # Example
///
/// ```ignore
/// use mixhost::prelude::*;
///
/// let mut host = PluginHost::builder()
///     .sample_rate(48000.0)
///     .block_size(256)
///     .channels(2)
///     .build();
///
/// let catalog = host.catalog();
/// let module = host.load(&catalog[0].id)?;
/// ```
pub struct PluginHostBuilder {
    config: HostConfig,
    scanners: Vec<Box<dyn FnOnce(DiscoverySession) -> DiscoverySession>>,
    favorites: Vec<PluginId>,
    resolver: Option<Arc<dyn PluginResolver>>,
    discover_on_build: bool,
}

impl Default for PluginHostBuilder {
    fn default() -> Self {
        Self {
            config: HostConfig::default(),
            scanners: Vec::new(),
            favorites: Vec::new(),
            resolver: None,
            discover_on_build: true,
        }
    }
}

impl PluginHostBuilder {
    /// Default: 48000
    pub fn sample_rate(mut self, rate: f64) -> Self {
        self.config = self.config.sample_rate(rate);
        self
    }

    /// Default: 1024
    pub fn block_size(mut self, frames: u32) -> Self {
        self.config = self.config.block_size(frames);
        self
    }

    /// Default: 2
    pub fn channels(mut self, channels: usize) -> Self {
        self.config = self.config.channels(channels);
        self
    }

    /// Replace the whole per-module configuration.
    pub fn config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    pub fn scanner(mut self, scanner: impl PluginScanner + 'static) -> Self {
        self.scanners.push(Box::new(move |session| session.scanner(scanner)));
        self
    }

    pub fn favorites(mut self, ids: impl IntoIterator<Item = PluginId>) -> Self {
        self.favorites.extend(ids);
        self
    }

    /// Default: the native LADSPA/LV2 resolver
    pub fn resolver(mut self, resolver: Arc<dyn PluginResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Start discovery in the background as soon as the host is built.
    /// Default: true
    pub fn discover_on_build(mut self, discover: bool) -> Self {
        self.discover_on_build = discover;
        self
    }

    pub fn build(self) -> PluginHost {
        let mut session = if self.scanners.is_empty() {
            DiscoverySession::native()
        } else {
            self.scanners
                .into_iter()
                .fold(DiscoverySession::new(), |session, add| add(session))
        };
        session = session.favorites(self.favorites);
        if self.discover_on_build {
            session.spawn_discover_thread();
        }

        let resolver = self.resolver.unwrap_or_else(|| Arc::new(NativeResolver));
        PluginHost::from_parts(session, resolver, self.config)
    }
}
