//! Entry point tying discovery and loading together.

use crate::{Error, Result};
use mixhost_plugin::{
    DiscoverySession, HostConfig, ModuleState, PluginDescriptor, PluginId, PluginModule,
    PluginResolver,
};
use std::sync::Arc;

/// One discovery session plus the configuration every module is loaded with.
pub struct PluginHost {
    session: DiscoverySession,
    resolver: Arc<dyn PluginResolver>,
    config: HostConfig,
}

impl PluginHost {
    /// Create a builder for configuring the host.
    pub fn builder() -> crate::PluginHostBuilder {
        crate::PluginHostBuilder::default()
    }

    pub(crate) fn from_parts(
        session: DiscoverySession,
        resolver: Arc<dyn PluginResolver>,
        config: HostConfig,
    ) -> Self {
        Self {
            session,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Full catalog sorted by name. Waits for discovery to finish.
    pub fn catalog(&mut self) -> Arc<Vec<PluginDescriptor>> {
        self.session.get_all_plugins()
    }

    /// Run discovery again, e.g. after plugins were installed.
    pub fn rescan(&mut self) -> Arc<Vec<PluginDescriptor>> {
        self.session.join_discover_thread();
        self.session.spawn_discover_thread();
        self.session.get_all_plugins()
    }

    pub fn find(&mut self, id: &PluginId) -> Option<PluginDescriptor> {
        self.catalog().iter().find(|d| &d.id == id).cloned()
    }

    /// Load a catalog entry with the host configuration.
    pub fn load(&mut self, id: &PluginId) -> Result<PluginModule> {
        let descriptor = self.find(id).ok_or_else(|| Error::NotFound(id.clone()))?;
        self.load_descriptor(&descriptor)
    }

    pub fn load_descriptor(&self, descriptor: &PluginDescriptor) -> Result<PluginModule> {
        Ok(PluginModule::load_with(
            descriptor,
            Arc::clone(&self.resolver),
            self.config,
        )?)
    }

    /// Load the plugin a saved strip refers to and apply its state.
    pub fn restore(&mut self, state: &ModuleState) -> Result<PluginModule> {
        let mut module = self.load(&state.plugin)?;
        module.restore_module_state(state);
        tracing::debug!(
            "Restored '{}' with {} saved controls",
            module.descriptor().name,
            state.controls.len()
        );
        Ok(module)
    }
}
