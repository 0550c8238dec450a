//! Plugin presets.
//!
//! Presets come from the plugin's own metadata (LV2 `pset:Preset`
//! resources) and are applied through the same validated control-port
//! write used for live edits.

use crate::error::Result;
use crate::metadata::PluginInfo;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PresetValue {
    /// Port symbol the value is addressed to
    pub symbol: String,
    pub value: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preset {
    pub uri: String,
    pub label: String,
    pub values: Vec<PresetValue>,
}

impl Preset {
    pub fn new(uri: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            label: label.into(),
            values: Vec::new(),
        }
    }

    pub fn value(mut self, symbol: impl Into<String>, value: f32) -> Self {
        self.values.push(PresetValue {
            symbol: symbol.into(),
            value,
        });
        self
    }

    /// Write every value through `write`, returning how many ports accepted one.
    ///
    /// Values naming unknown ports, or ports that are not control inputs,
    /// are skipped.
    pub fn apply<F>(&self, info: &PluginInfo, mut write: F) -> usize
    where
        F: FnMut(u32, f32) -> Result<f32>,
    {
        let mut applied = 0;
        for PresetValue { symbol, value } in &self.values {
            let Some(port) = info.port_by_symbol(symbol) else {
                tracing::warn!("Preset {} names unknown port {}", self.label, symbol);
                continue;
            };
            match write(port.index, *value) {
                Ok(_) => applied += 1,
                Err(e) => tracing::warn!("Preset {}: {}", self.label, e),
            }
        }
        applied
    }
}

/// Presets of one plugin, ordered by label.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PresetList {
    presets: Vec<Preset>,
}

impl PresetList {
    pub fn new(mut presets: Vec<Preset>) -> Self {
        presets.sort_by(|a, b| a.label.cmp(&b.label));
        Self { presets }
    }

    pub fn get(&self, index: usize) -> Option<&Preset> {
        self.presets.get(index)
    }

    pub fn position(&self, uri: &str) -> Option<usize> {
        self.presets.iter().position(|p| p.uri == uri)
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.label.as_str())
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Preset> {
        self.presets.iter()
    }
}
