//! Plugin binary and instance traits.
//!
//! This module defines a unified interface for both plugin ABIs (LADSPA, LV2).
//! Native adapters live in [`crate::ladspa`] and [`crate::lv2`]; tests and
//! embedders can implement the traits directly.

use crate::error::{Result, WorkerError};
use crate::features::HostFeatures;
use crate::metadata::{PluginAbi, PluginDescriptor, PluginInfo};
use crate::state::StateProperty;
use crate::urid::UridTable;
use crate::worker::{WorkHandler, WorkScheduler};
use std::ffi::c_void;
use std::sync::Arc;

/// Per-block context handed to [`PluginInstance::run`].
#[derive(Default)]
pub struct RunContext<'a> {
    scheduler: Option<&'a WorkScheduler>,
}

impl<'a> RunContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scheduler(mut self, scheduler: &'a WorkScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Request deferred work from inside `run`. Never blocks.
    pub fn schedule_work(&self, data: &[u8]) -> std::result::Result<(), WorkerError> {
        match self.scheduler {
            Some(scheduler) => scheduler.schedule_work(data),
            None => Err(WorkerError::NoWorker),
        }
    }
}

/// A resolved plugin binary, ready to instantiate.
pub trait PluginBinary: Send + Sync {
    fn info(&self) -> &PluginInfo;

    /// Create one native instance. `features` must outlive it.
    fn instantiate(&self, sample_rate: f64, features: &HostFeatures) -> Result<Box<dyn PluginInstance>>;
}

/// One live native instance. Dropping it destroys the native handle.
pub trait PluginInstance: Send {
    /// # Safety
    /// `data` must stay valid, and sized for the current block length,
    /// until the port is connected again or the instance is dropped.
    unsafe fn connect_port(&mut self, port: u32, data: *mut c_void);

    fn activate(&mut self);

    fn run(&mut self, frames: u32, ctx: &mut RunContext<'_>);

    fn deactivate(&mut self);

    /// Deferred-work handler, when the plugin has one.
    fn worker(&self) -> Option<Arc<dyn WorkHandler>> {
        None
    }

    fn state(&mut self) -> Option<&mut dyn StateHandler> {
        None
    }

    fn options(&mut self) -> Option<&mut dyn OptionsHandler> {
        None
    }
}

/// Plugin state save/restore extension.
pub trait StateHandler {
    fn save(&mut self, urids: &UridTable) -> Result<Vec<StateProperty>>;

    fn restore(&mut self, urids: &UridTable, properties: &[StateProperty]) -> Result<()>;
}

/// Options extension: re-read block bounds and rate after a reconfigure.
pub trait OptionsHandler {
    fn set(&mut self, features: &HostFeatures) -> Result<()>;
}

/// Maps a catalog entry to its binary.
pub trait PluginResolver: Send + Sync {
    fn resolve(&self, descriptor: &PluginDescriptor) -> Result<Arc<dyn PluginBinary>>;
}

/// Resolves catalog entries against the installed native plugins.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeResolver;

impl PluginResolver for NativeResolver {
    fn resolve(&self, descriptor: &PluginDescriptor) -> Result<Arc<dyn PluginBinary>> {
        match descriptor.abi() {
            #[cfg(feature = "ladspa")]
            PluginAbi::Simple => Ok(Arc::new(crate::ladspa::LadspaBinary::resolve(descriptor)?)),
            #[cfg(not(feature = "ladspa"))]
            PluginAbi::Simple => Err(crate::PluginError::UnsupportedAbi("LADSPA", "ladspa")),

            #[cfg(feature = "lv2")]
            PluginAbi::Extensible => Ok(Arc::new(crate::lv2::Lv2Binary::resolve(descriptor)?)),
            #[cfg(not(feature = "lv2"))]
            PluginAbi::Extensible => Err(crate::PluginError::UnsupportedAbi("LV2", "lv2")),
        }
    }
}
