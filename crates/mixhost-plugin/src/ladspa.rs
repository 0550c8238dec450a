//! LADSPA adapter.
//!
//! Libraries are opened with `libloading` and enumerated through their
//! `ladspa_descriptor` entry point. Port metadata comes straight from the
//! descriptor's port tables and range hints.

use crate::catalog::PluginScanner;
use crate::error::{LoadStage, PluginError, Result};
use crate::features::HostFeatures;
use crate::ffi::*;
use crate::instance::{PluginBinary, PluginInstance, RunContext};
use crate::metadata::{PluginAbi, PluginDescriptor, PluginId, PluginInfo, PortDirection, PortInfo, PortKind};
use libloading::Library;
use std::ffi::{c_int, c_ulong, c_void, CStr};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Rate used to resolve sample-rate relative bounds in port metadata.
const NOMINAL_SAMPLE_RATE: f32 = 48000.0;

/// Scans `LADSPA_PATH`, or the standard locations when it is unset.
#[derive(Debug, Clone)]
pub struct LadspaScanner {
    paths: Vec<PathBuf>,
}

impl LadspaScanner {
    pub fn from_env() -> Self {
        let paths = match std::env::var("LADSPA_PATH") {
            Ok(value) if !value.is_empty() => parse_search_path(&value),
            _ => default_search_paths(),
        };
        Self { paths }
    }

    pub fn with_paths(paths: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            paths: paths.into_iter().collect(),
        }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    fn libraries(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        for dir in &self.paths {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if is_library_file(&path) {
                    found.push(path);
                }
            }
        }
        found.sort();
        found
    }

    /// Library that exports the plugin with this unique id.
    fn find_library(&self, unique_id: u64) -> Option<PathBuf> {
        self.libraries().into_iter().find(|path| {
            LadspaLibrary::open(path)
                .map(|lib| lib.descriptors().any(|d| unsafe { (*d).unique_id } as u64 == unique_id))
                .unwrap_or(false)
        })
    }
}

impl PluginScanner for LadspaScanner {
    fn abi(&self) -> PluginAbi {
        PluginAbi::Simple
    }

    fn scan(&self) -> Result<Vec<PluginDescriptor>> {
        let mut plugins = Vec::new();
        for path in self.libraries() {
            let lib = match LadspaLibrary::open(&path) {
                Ok(lib) => lib,
                Err(e) => {
                    tracing::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            for desc in lib.descriptors() {
                // SAFETY: descriptors stay valid while `lib` is loaded.
                let desc = unsafe { &*desc };
                plugins.push(describe(desc, &path));
            }
        }
        Ok(plugins)
    }
}

/// An opened LADSPA library and its descriptor entry point.
struct LadspaLibrary {
    _library: Library,
    entry: LadspaDescriptorFn,
}

impl LadspaLibrary {
    fn open(path: &Path) -> Result<Self> {
        let id = path.display().to_string();
        // SAFETY: loading a plugin library runs its initializers; that is
        // the contract of hosting native plugins.
        let library = unsafe { Library::new(path) }
            .map_err(|e| PluginError::load(&id, LoadStage::Opening, e.to_string()))?;
        // SAFETY: the symbol type matches the LADSPA entry point.
        let entry = unsafe {
            library
                .get::<LadspaDescriptorFn>(LADSPA_DESCRIPTOR_SYMBOL)
                .map(|symbol| *symbol)
        }
        .map_err(|e| PluginError::load(&id, LoadStage::Descriptor, e.to_string()))?;
        Ok(Self {
            _library: library,
            entry,
        })
    }

    fn descriptors(&self) -> impl Iterator<Item = *const LadspaDescriptor> + '_ {
        (0..)
            // SAFETY: the entry point returns null past the last index.
            .map(|index: c_ulong| unsafe { (self.entry)(index) })
            .take_while(|d| !d.is_null())
    }
}

/// A LADSPA plugin ready to instantiate.
pub struct LadspaBinary {
    info: PluginInfo,
    descriptor: *const LadspaDescriptor,
    library: Arc<LadspaLibrary>,
}

// SAFETY: the descriptor is immutable static data of a library kept loaded
// by `library`.
unsafe impl Send for LadspaBinary {}
unsafe impl Sync for LadspaBinary {}

impl LadspaBinary {
    /// Open the library behind a catalog entry. Entries without a path are
    /// looked up on the search path.
    pub fn resolve(descriptor: &PluginDescriptor) -> Result<Self> {
        let id = descriptor.id.to_string();
        let PluginId::Ladspa(unique_id) = descriptor.id else {
            return Err(PluginError::load(id, LoadStage::Descriptor, "not a LADSPA plugin id"));
        };
        let path = match &descriptor.path {
            Some(path) => path.clone(),
            None => LadspaScanner::from_env()
                .find_library(unique_id)
                .ok_or_else(|| PluginError::load(&id, LoadStage::Scanning, "no library exports this id"))?,
        };

        let library = Arc::new(LadspaLibrary::open(&path)?);
        let desc = library
            .descriptors()
            .find(|d| unsafe { (**d).unique_id } as u64 == unique_id)
            .ok_or_else(|| {
                PluginError::load(
                    &id,
                    LoadStage::Descriptor,
                    format!("{} does not export this id", path.display()),
                )
            })?;

        // SAFETY: checked non-null, valid while `library` is loaded.
        let info = unsafe { plugin_info(&*desc, &path) };
        tracing::debug!("Resolved LADSPA {} from {}", id, path.display());
        Ok(Self {
            info,
            descriptor: desc,
            library,
        })
    }
}

impl PluginBinary for LadspaBinary {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn instantiate(&self, sample_rate: f64, _features: &HostFeatures) -> Result<Box<dyn PluginInstance>> {
        let id = self.info.descriptor.id.to_string();
        // SAFETY: descriptor is valid while the library is loaded.
        let desc = unsafe { &*self.descriptor };
        let instantiate = desc
            .instantiate
            .ok_or_else(|| PluginError::load(&id, LoadStage::Instantiation, "no instantiate function"))?;
        if desc.connect_port.is_none() || desc.run.is_none() {
            return Err(PluginError::load(&id, LoadStage::Instantiation, "incomplete descriptor"));
        }

        // SAFETY: called as the ABI prescribes.
        let handle = unsafe { instantiate(self.descriptor, sample_rate as c_ulong) };
        if handle.is_null() {
            return Err(PluginError::load(&id, LoadStage::Instantiation, "instantiate returned null"));
        }
        Ok(Box::new(LadspaInstance {
            handle,
            descriptor: self.descriptor,
            _library: Arc::clone(&self.library),
        }))
    }
}

struct LadspaInstance {
    handle: LadspaHandle,
    descriptor: *const LadspaDescriptor,
    _library: Arc<LadspaLibrary>,
}

// SAFETY: LADSPA instances may move between threads; the host never calls
// into one concurrently.
unsafe impl Send for LadspaInstance {}

impl LadspaInstance {
    fn desc(&self) -> &LadspaDescriptor {
        // SAFETY: valid while `_library` is loaded.
        unsafe { &*self.descriptor }
    }
}

impl PluginInstance for LadspaInstance {
    unsafe fn connect_port(&mut self, port: u32, data: *mut c_void) {
        if let Some(connect) = self.desc().connect_port {
            connect(self.handle, port as c_ulong, data.cast());
        }
    }

    fn activate(&mut self) {
        if let Some(activate) = self.desc().activate {
            // SAFETY: live handle.
            unsafe { activate(self.handle) };
        }
    }

    fn run(&mut self, frames: u32, _ctx: &mut RunContext<'_>) {
        if let Some(run) = self.desc().run {
            // SAFETY: every port was connected to buffers of at least `frames` samples.
            unsafe { run(self.handle, frames as c_ulong) };
        }
    }

    fn deactivate(&mut self) {
        if let Some(deactivate) = self.desc().deactivate {
            // SAFETY: live handle.
            unsafe { deactivate(self.handle) };
        }
    }
}

impl Drop for LadspaInstance {
    fn drop(&mut self) {
        if let Some(cleanup) = self.desc().cleanup {
            // SAFETY: the handle is not used again.
            unsafe { cleanup(self.handle) };
        }
    }
}

// ============================================================================
// Metadata
// ============================================================================

fn describe(desc: &LadspaDescriptor, path: &Path) -> PluginDescriptor {
    // SAFETY: valid descriptor from a loaded library.
    let ports = unsafe { port_descriptors(desc) };
    let count = |mask: c_int| {
        ports
            .iter()
            .filter(|&&p| p & (LADSPA_PORT_AUDIO | mask) == LADSPA_PORT_AUDIO | mask)
            .count()
    };
    // SAFETY: as above.
    let (name, maker) = unsafe { (c_string(desc.name), c_string(desc.maker)) };
    PluginDescriptor::new(PluginId::Ladspa(desc.unique_id as u64), name)
        .author(maker)
        .audio_io(count(LADSPA_PORT_INPUT), count(LADSPA_PORT_OUTPUT))
        .path(path)
}

/// # Safety
/// `desc` must be a valid descriptor of a loaded library.
unsafe fn plugin_info(desc: &LadspaDescriptor, path: &Path) -> PluginInfo {
    let kinds = port_descriptors(desc);
    let n = kinds.len();
    let names: &[*const std::ffi::c_char] = if desc.port_names.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(desc.port_names, n)
    };
    let hints: &[LadspaPortRangeHint] = if desc.port_range_hints.is_null() {
        &[]
    } else {
        std::slice::from_raw_parts(desc.port_range_hints, n)
    };

    let ports = kinds
        .iter()
        .enumerate()
        .map(|(i, &kind)| {
            let name = names.get(i).map(|&p| c_string(p)).unwrap_or_default();
            let symbol = port_symbol(&name, i);
            let direction = if kind & LADSPA_PORT_OUTPUT != 0 {
                PortDirection::Output
            } else {
                PortDirection::Input
            };
            let mut port = if kind & LADSPA_PORT_CONTROL != 0 {
                let (min, max, default) = hints
                    .get(i)
                    .map(|h| control_range(h, NOMINAL_SAMPLE_RATE))
                    .unwrap_or((0.0, 1.0, 0.0));
                PortInfo::new(i as u32, symbol, direction, PortKind::Control).range(min, max, default)
            } else {
                PortInfo::new(i as u32, symbol, direction, PortKind::Audio)
            };
            if port.kind == PortKind::Control
                && direction == PortDirection::Output
                && name.trim().eq_ignore_ascii_case("latency")
            {
                port = port.latency();
            }
            port.name(name)
        })
        .collect();

    PluginInfo::new(describe(desc, path), ports)
}

unsafe fn port_descriptors(desc: &LadspaDescriptor) -> &[c_int] {
    if desc.port_descriptors.is_null() {
        return &[];
    }
    std::slice::from_raw_parts(desc.port_descriptors, desc.port_count as usize)
}

unsafe fn c_string(ptr: *const std::ffi::c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    CStr::from_ptr(ptr).to_string_lossy().into_owned()
}

/// Lowercase identifier derived from a port name; falls back to the index.
fn port_symbol(name: &str, index: usize) -> String {
    let symbol: String = name
        .trim()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if symbol.is_empty() || symbol.starts_with(|c: char| c.is_ascii_digit()) {
        format!("port{index}{}", if symbol.is_empty() { String::new() } else { format!("_{symbol}") })
    } else {
        symbol
    }
}

/// `(min, max, default)` of a control port from its range hint.
fn control_range(hint: &LadspaPortRangeHint, sample_rate: f32) -> (f32, f32, f32) {
    let flags = hint.hint_descriptor;
    let scale = if flags & LADSPA_HINT_SAMPLE_RATE != 0 { sample_rate } else { 1.0 };

    if flags & LADSPA_HINT_TOGGLED != 0 {
        let default = if flags & LADSPA_HINT_DEFAULT_MASK == LADSPA_HINT_DEFAULT_1 { 1.0 } else { 0.0 };
        return (0.0, 1.0, default);
    }

    let below = flags & LADSPA_HINT_BOUNDED_BELOW != 0;
    let above = flags & LADSPA_HINT_BOUNDED_ABOVE != 0;
    let lo = hint.lower_bound * scale;
    let hi = hint.upper_bound * scale;
    let min = if below { lo } else { f32::MIN };
    let max = if above { hi } else { f32::MAX };
    let log = flags & LADSPA_HINT_LOGARITHMIC != 0 && lo > 0.0 && hi > 0.0;

    let between = |weight_hi: f32| {
        if log {
            (lo.ln() * (1.0 - weight_hi) + hi.ln() * weight_hi).exp()
        } else {
            lo * (1.0 - weight_hi) + hi * weight_hi
        }
    };

    let mut default = match flags & LADSPA_HINT_DEFAULT_MASK {
        LADSPA_HINT_DEFAULT_MINIMUM => lo,
        LADSPA_HINT_DEFAULT_LOW => between(0.25),
        LADSPA_HINT_DEFAULT_MIDDLE => between(0.5),
        LADSPA_HINT_DEFAULT_HIGH => between(0.75),
        LADSPA_HINT_DEFAULT_MAXIMUM => hi,
        LADSPA_HINT_DEFAULT_0 => 0.0,
        LADSPA_HINT_DEFAULT_1 => 1.0,
        LADSPA_HINT_DEFAULT_100 => 100.0,
        LADSPA_HINT_DEFAULT_440 => 440.0,
        _ if below => lo,
        _ if above => hi.min(0.0),
        _ => 0.0,
    };
    if flags & LADSPA_HINT_INTEGER != 0 {
        default = default.round();
    }
    (min, max, default.clamp(min, max))
}

fn parse_search_path(value: &str) -> Vec<PathBuf> {
    value
        .split(':')
        .filter(|part| !part.is_empty())
        .map(PathBuf::from)
        .collect()
}

fn default_search_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("/usr/lib/ladspa"),
        PathBuf::from("/usr/local/lib/ladspa"),
        PathBuf::from(format!(
            "{}/.ladspa",
            std::env::var("HOME").unwrap_or_default()
        )),
    ]
}

fn is_library_file(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|s| s.to_str()) {
        matches!(ext, "so" | "dylib" | "dll")
    } else {
        false
    }
}
