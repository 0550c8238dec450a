//! Plugin metadata: catalog entries and port layouts.

use crate::preset::Preset;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Which binary ABI a plugin speaks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PluginAbi {
    /// Fixed ordinal ports, audio and control only (LADSPA).
    Simple,
    /// URI-named extensions, event ports, host feature array (LV2).
    Extensible,
}

impl std::fmt::Display for PluginAbi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginAbi::Simple => write!(f, "LADSPA"),
            PluginAbi::Extensible => write!(f, "LV2"),
        }
    }
}

/// Stable plugin identifier: numeric for the simple ABI, a URI for the extensible one.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PluginId {
    Ladspa(u64),
    Lv2(String),
}

impl PluginId {
    pub fn abi(&self) -> PluginAbi {
        match self {
            PluginId::Ladspa(_) => PluginAbi::Simple,
            PluginId::Lv2(_) => PluginAbi::Extensible,
        }
    }
}

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginId::Ladspa(id) => write!(f, "{id}"),
            PluginId::Lv2(uri) => write!(f, "{uri}"),
        }
    }
}

impl FromStr for PluginId {
    type Err = std::num::ParseIntError;

    /// Numbers are LADSPA unique ids, anything else is an LV2 URI.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.chars().all(|c| c.is_ascii_digit()) {
            s.parse().map(PluginId::Ladspa)
        } else {
            Ok(PluginId::Lv2(s.to_string()))
        }
    }
}

/// Catalog entry produced by discovery. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PluginDescriptor {
    pub id: PluginId,

    /// Human-readable name
    pub name: String,

    pub author: String,

    pub category: String,

    pub audio_inputs: usize,

    pub audio_outputs: usize,

    pub favorite: bool,

    /// Shared library the plugin lives in, when known at scan time
    #[serde(default)]
    pub path: Option<PathBuf>,
}

impl PluginDescriptor {
    pub fn new(id: PluginId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            author: String::new(),
            category: "Unclassified".to_string(),
            audio_inputs: 0,
            audio_outputs: 0,
            favorite: false,
            path: None,
        }
    }

    pub fn abi(&self) -> PluginAbi {
        self.id.abi()
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn audio_io(mut self, inputs: usize, outputs: usize) -> Self {
        self.audio_inputs = inputs;
        self.audio_outputs = outputs;
        self
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn favorite(mut self, favorite: bool) -> Self {
        self.favorite = favorite;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortDirection {
    Input,
    Output,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortKind {
    Audio,
    Control,
    Event,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ControlRange {
    pub min: f32,
    pub max: f32,
    pub default: f32,
}

impl ControlRange {
    pub fn new(min: f32, max: f32, default: f32) -> Self {
        Self { min, max, default }
    }

    pub fn clamp(&self, value: f32) -> f32 {
        if value.is_nan() {
            return self.default;
        }
        value.clamp(self.min, self.max)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PortInfo {
    pub index: u32,
    pub symbol: String,
    pub name: String,
    pub direction: PortDirection,
    pub kind: PortKind,
    /// Control ports only
    pub range: Option<ControlRange>,
    /// Control output carrying the plugin's latency in frames
    pub reports_latency: bool,
}

impl PortInfo {
    pub fn new(index: u32, symbol: impl Into<String>, direction: PortDirection, kind: PortKind) -> Self {
        let symbol = symbol.into();
        Self {
            index,
            name: symbol.clone(),
            symbol,
            direction,
            kind,
            range: None,
            reports_latency: false,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn range(mut self, min: f32, max: f32, default: f32) -> Self {
        self.range = Some(ControlRange::new(min, max, default));
        self
    }

    pub fn latency(mut self) -> Self {
        self.reports_latency = true;
        self
    }

    pub fn is_audio_input(&self) -> bool {
        self.kind == PortKind::Audio && self.direction == PortDirection::Input
    }

    pub fn is_audio_output(&self) -> bool {
        self.kind == PortKind::Audio && self.direction == PortDirection::Output
    }

    pub fn is_control_input(&self) -> bool {
        self.kind == PortKind::Control && self.direction == PortDirection::Input
    }
}

/// Everything the host needs to know about a resolved plugin before instantiating it.
#[derive(Clone, Debug)]
pub struct PluginInfo {
    pub descriptor: PluginDescriptor,
    pub ports: Vec<PortInfo>,
    pub required_features: Vec<String>,
    pub optional_features: Vec<String>,
    pub extension_data: Vec<String>,
    pub presets: Vec<Preset>,
}

impl PluginInfo {
    pub fn new(descriptor: PluginDescriptor, ports: Vec<PortInfo>) -> Self {
        Self {
            descriptor,
            ports,
            required_features: Vec::new(),
            optional_features: Vec::new(),
            extension_data: Vec::new(),
            presets: Vec::new(),
        }
    }

    pub fn requires(&self, feature: &str) -> bool {
        self.required_features.iter().any(|f| f == feature)
    }

    /// Required or optional.
    pub fn supports(&self, feature: &str) -> bool {
        self.requires(feature) || self.optional_features.iter().any(|f| f == feature)
    }

    pub fn has_extension(&self, uri: &str) -> bool {
        self.extension_data.iter().any(|e| e == uri)
    }

    pub fn port(&self, index: u32) -> Option<&PortInfo> {
        self.ports.iter().find(|p| p.index == index)
    }

    pub fn port_by_symbol(&self, symbol: &str) -> Option<&PortInfo> {
        self.ports.iter().find(|p| p.symbol == symbol)
    }

    pub fn audio_inputs(&self) -> usize {
        self.ports.iter().filter(|p| p.is_audio_input()).count()
    }

    pub fn audio_outputs(&self) -> usize {
        self.ports.iter().filter(|p| p.is_audio_output()).count()
    }

    pub fn event_ports(&self) -> usize {
        self.ports.iter().filter(|p| p.kind == PortKind::Event).count()
    }
}
