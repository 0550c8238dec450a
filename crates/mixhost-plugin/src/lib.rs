//! In-process plugin hosting for mixhost
//!
//! This crate loads LADSPA and LV2 plugins into a mixer strip and runs them
//! on the real-time audio thread.
//!
//! ## Pieces
//!
//! - **Discovery** - [`DiscoverySession`] enumerates installed plugins on a
//!   background thread and publishes a catalog sorted by name
//! - **Feature negotiation** - [`HostFeatures`] owns the URID table, block
//!   options and worker hooks offered to extensible plugins
//! - **Deferred work** - [`DeferredWork`] moves non-real-time jobs off the
//!   audio thread through fixed-size lock-free rings
//! - **UI events** - [`EventRouter`] / [`UiEndpoint`] carry control values
//!   and atoms between the UI thread and the plugin
//! - **Lifecycle** - [`PluginModule`] loads, connects, activates, processes,
//!   reconfigures and unloads a plugin
//!
//! ## Usage
//!
//! ```ignore
//! use mixhost_plugin::{DiscoverySession, HostConfig, PluginModule};
//!
//! let mut session = DiscoverySession::native();
//! session.spawn_discover_thread();
//! let catalog = session.get_all_plugins();
//!
//! let config = HostConfig::default().sample_rate(48000.0).block_size(256);
//! let mut module = PluginModule::load(&catalog[0], config)?;
//!
//! // audio thread
//! module.process(&inputs, &mut outputs, 256);
//! ```

pub mod error;
pub use error::{EventError, LoadStage, PluginError, Result, WorkerError};

mod config;
pub use config::{HostConfig, DEFAULT_ATOM_BUFFER_SIZE, DEFAULT_EVENT_RING_SIZE, DEFAULT_WORKER_RING_SIZE};

mod metadata;
pub use metadata::{
    ControlRange, PluginAbi, PluginDescriptor, PluginId, PluginInfo, PortDirection, PortInfo,
    PortKind,
};

mod preset;
pub use preset::{Preset, PresetList, PresetValue};

pub mod uri;

mod urid;
pub use urid::{well_known, Urid, UridTable};

#[doc(hidden)]
pub mod ffi;

mod ring;

mod features;
pub use features::{BlockOptions, HostFeatures};

mod worker;
pub use worker::{DeferredWork, Responder, WorkHandler, WorkScheduler, WorkerState};

pub mod atom;
pub use atom::{AtomBuffer, AtomRef, AtomUrids};

mod events;
pub use events::{event_channel, EventRouter, PluginEvent, UiEndpoint, UiEventSink, PROTOCOL_FLOAT};

mod instance;
pub use instance::{
    NativeResolver, OptionsHandler, PluginBinary, PluginInstance, PluginResolver, RunContext,
    StateHandler,
};

mod state;
pub use state::{ControlValue, ModuleState, StateProperty};

mod ports;
pub use ports::PortSet;

mod catalog;
pub use catalog::{DiscoverySession, PluginScanner};

mod module;
pub use module::{PluginModule, Reconfiguration, MAX_IMPULSE_FRAMES};

#[cfg(feature = "ladspa")]
mod ladspa;
#[cfg(feature = "ladspa")]
pub use ladspa::{LadspaBinary, LadspaScanner};

#[cfg(feature = "lv2")]
mod lv2;
#[cfg(feature = "lv2")]
pub use lv2::{Lv2Binary, Lv2Scanner};
