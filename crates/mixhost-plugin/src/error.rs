//! Error types for plugin hosting

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Scanning,
    Opening,
    Descriptor,
    Negotiation,
    Instantiation,
    Connection,
    Activation,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Scanning => write!(f, "scanning"),
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::Descriptor => write!(f, "resolving descriptor"),
            LoadStage::Negotiation => write!(f, "negotiating features"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Connection => write!(f, "connecting ports"),
            LoadStage::Activation => write!(f, "activating"),
        }
    }
}

#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin unavailable: {id} failed at {stage} stage\n  Reason: {reason}")]
    LoadFailed {
        id: String,
        stage: LoadStage,
        reason: String,
    },

    #[error("Plugin {id} requires unsupported host feature {feature}")]
    MissingFeature { id: String, feature: String },

    #[error("Plugin {id} has {plugin_inputs} audio inputs, strip has {channels} channels")]
    ChannelMismatch {
        id: String,
        plugin_inputs: usize,
        channels: usize,
    },

    #[error("{0} support not compiled (enable the '{1}' feature)")]
    UnsupportedAbi(&'static str, &'static str),

    #[error("Invalid port index {0}")]
    InvalidPort(u32),

    #[error("Port {0} is not a control input")]
    NotControlInput(u32),

    #[error("No plugin loaded")]
    NotLoaded,

    #[error("Preset index {0} out of range")]
    InvalidPreset(usize),

    #[error("Plugin state error: {0}")]
    State(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PluginError {
    pub(crate) fn load(id: impl Into<String>, stage: LoadStage, reason: impl Into<String>) -> Self {
        PluginError::LoadFailed {
            id: id.into(),
            stage,
            reason: reason.into(),
        }
    }
}

/// Failures of the deferred-work rings. All of them are soft: the request
/// or response is dropped and the caller may retry on a later block.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerError {
    #[error("Worker ring full")]
    RingFull,

    #[error("Worker payload of {size} bytes exceeds limit of {limit}")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Plugin has no worker")]
    NoWorker,

    #[error("Worker is shutting down")]
    Exiting,

    #[error("Work lock held elsewhere")]
    Busy,

    #[error("Plugin work handler failed")]
    Unsupported,
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventError {
    #[error("Event ring full")]
    RingFull,

    #[error("Event of {size} bytes exceeds limit of {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Unknown port {0}")]
    UnknownPort(u32),
}

pub type Result<T> = std::result::Result<T, PluginError>;
