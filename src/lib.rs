//! # mixhost - Mixer Strip Plugin Hosting
//!
//! Loads LADSPA and LV2 effect plugins into mixer strips and runs them on a
//! real-time audio thread.
//!
//! ## Architecture
//!
//! mixhost is an umbrella crate over:
//! - **mixhost-plugin** - Discovery, feature negotiation, deferred work,
//!   UI event routing and the per-strip module lifecycle
//!
//! ## Quick Start
//!
//! ```ignore
//! use mixhost::prelude::*;
//!
//! let mut host = PluginHost::builder()
//!     .sample_rate(48000.0)
//!     .block_size(256)
//!     .build();
//!
//! let catalog = host.catalog();
//! let mut module = host.load(&catalog[0].id)?;
//!
//! // UI thread
//! let mut ui = module.take_ui_endpoint().unwrap();
//! ui.send_control(2, 0.5)?;
//!
//! // audio thread
//! module.process(&[&left, &right], &mut [&mut out_l, &mut out_r], 256);
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - LADSPA hosting
//! - `ladspa` - LADSPA discovery and loading
//! - `lv2` - LV2 discovery, presets, state, worker (needs lilv)
//! - `all-plugins` - Every plugin format

/// Re-export of mixhost-plugin for direct access
pub use mixhost_plugin as plugin;

pub use mixhost_plugin::{
    // Catalog
    DiscoverySession,
    PluginAbi,
    PluginDescriptor,
    PluginId,
    PluginInfo,
    PluginScanner,
    PortInfo,

    // Hosting
    HostConfig,
    ModuleState,
    PluginModule,
    PresetList,
    Reconfiguration,
    StateProperty,

    // UI side
    PluginEvent,
    UiEndpoint,
};

#[cfg(feature = "ladspa")]
pub use mixhost_plugin::LadspaScanner;

#[cfg(feature = "lv2")]
pub use mixhost_plugin::Lv2Scanner;

mod error;
pub use error::{Error, Result};

mod builder;
mod host;

pub use builder::PluginHostBuilder;
pub use host::PluginHost;

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::{PluginHost, PluginHostBuilder};

    pub use crate::{HostConfig, PluginDescriptor, PluginId, PluginModule, UiEndpoint};

    pub use crate::{Error, Result};
}
