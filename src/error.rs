//! Centralized error type for the mixhost umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Plugin: {0}")]
    Plugin(#[from] mixhost_plugin::PluginError),

    #[error("Worker: {0}")]
    Worker(#[from] mixhost_plugin::WorkerError),

    #[error("Event: {0}")]
    Event(#[from] mixhost_plugin::EventError),

    #[error("Plugin not in catalog: {0}")]
    NotFound(mixhost_plugin::PluginId),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
