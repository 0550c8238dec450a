//! Persisted state of a plugin strip.
//!
//! The session layer stores a module as flat `:key value` entries;
//! [`ModuleState`] produces and consumes exactly those.

use crate::error::{PluginError, Result};
use crate::metadata::PluginId;
use serde::{Deserialize, Serialize};

const KEY_LADSPA_ID: &str = ":plugin_id";
const KEY_LV2_URI: &str = ":lv2_plugin_uri";
const KEY_BYPASS: &str = ":bypass";
const KEY_PRESET: &str = ":preset";
const KEY_CONTROL: &str = ":control";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlValue {
    pub symbol: String,
    pub value: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleState {
    pub plugin: PluginId,
    pub controls: Vec<ControlValue>,
    /// URI of the preset last applied
    #[serde(default)]
    pub preset: Option<String>,
    #[serde(default)]
    pub bypass: bool,
}

impl ModuleState {
    pub fn new(plugin: PluginId) -> Self {
        Self {
            plugin,
            controls: Vec::new(),
            preset: None,
            bypass: false,
        }
    }

    pub fn control(&self, symbol: &str) -> Option<f32> {
        self.controls
            .iter()
            .find(|c| c.symbol == symbol)
            .map(|c| c.value)
    }

    pub fn to_entries(&self) -> Vec<(String, String)> {
        let mut entries = Vec::with_capacity(self.controls.len() + 3);
        match &self.plugin {
            PluginId::Ladspa(id) => entries.push((KEY_LADSPA_ID.to_string(), id.to_string())),
            PluginId::Lv2(uri) => entries.push((KEY_LV2_URI.to_string(), uri.clone())),
        }
        entries.push((KEY_BYPASS.to_string(), u8::from(self.bypass).to_string()));
        if let Some(preset) = &self.preset {
            entries.push((KEY_PRESET.to_string(), preset.clone()));
        }
        for c in &self.controls {
            entries.push((KEY_CONTROL.to_string(), format!("{} {}", c.symbol, c.value)));
        }
        entries
    }

    /// Inverse of [`to_entries`](Self::to_entries). Unknown keys are ignored.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Result<Self>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut plugin = None;
        let mut state = ModuleState::new(PluginId::Ladspa(0));

        for (key, value) in entries {
            let value = value.as_ref();
            match key.as_ref() {
                KEY_LADSPA_ID => {
                    let id = value
                        .parse()
                        .map_err(|_| PluginError::State(format!("bad plugin id '{value}'")))?;
                    plugin = Some(PluginId::Ladspa(id));
                }
                KEY_LV2_URI => plugin = Some(PluginId::Lv2(value.to_string())),
                KEY_BYPASS => state.bypass = matches!(value, "1" | "true"),
                KEY_PRESET => state.preset = Some(value.to_string()),
                KEY_CONTROL => {
                    let (symbol, number) = value
                        .rsplit_once(' ')
                        .ok_or_else(|| PluginError::State(format!("bad control entry '{value}'")))?;
                    let number = number
                        .parse()
                        .map_err(|_| PluginError::State(format!("bad control value '{value}'")))?;
                    state.controls.push(ControlValue {
                        symbol: symbol.to_string(),
                        value: number,
                    });
                }
                other => tracing::debug!("Ignoring unknown state key {}", other),
            }
        }

        state.plugin = plugin.ok_or_else(|| PluginError::State("no plugin identifier".into()))?;
        Ok(state)
    }
}

/// One property saved through a plugin's state extension. Keys and types
/// are stored as URIs so they survive a fresh URID table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateProperty {
    pub key: String,
    pub type_: String,
    pub flags: u32,
    pub value: Vec<u8>,
}
