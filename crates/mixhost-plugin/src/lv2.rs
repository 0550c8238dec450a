//! LV2 adapter.
//!
//! Metadata (ports, features, extension data, presets) is read from the
//! RDF world through `lilv`. The binary itself is opened with `libloading`
//! and instantiated against the host's own [`HostFeatures`], so the
//! feature array, URID table and worker hooks are exactly the ones the
//! rest of the host manages.

use crate::catalog::PluginScanner;
use crate::error::{LoadStage, PluginError, Result, WorkerError};
use crate::features::HostFeatures;
use crate::ffi::*;
use crate::instance::{OptionsHandler, PluginBinary, PluginInstance, RunContext, StateHandler};
use crate::metadata::{PluginAbi, PluginDescriptor, PluginId, PluginInfo, PortDirection, PortInfo, PortKind};
use crate::preset::Preset;
use crate::state::StateProperty;
use crate::uri;
use crate::urid::UridTable;
use crate::worker::{respond_callback, Responder, WorkHandler};
use libloading::Library;
use lilv::plugin::Plugin;
use lilv::World;
use std::ffi::{c_void, CStr, CString};
use std::path::PathBuf;
use std::sync::Arc;

const LV2_INPUT_PORT: &str = "http://lv2plug.in/ns/lv2core#InputPort";
const LV2_OUTPUT_PORT: &str = "http://lv2plug.in/ns/lv2core#OutputPort";
const LV2_AUDIO_PORT: &str = "http://lv2plug.in/ns/lv2core#AudioPort";
const LV2_PORT: &str = "http://lv2plug.in/ns/lv2core#port";
const LV2_SYMBOL: &str = "http://lv2plug.in/ns/lv2core#symbol";
const PRESETS_VALUE: &str = "http://lv2plug.in/ns/ext/presets#value";
const RDFS_LABEL: &str = "http://www.w3.org/2000/01/rdf-schema#label";

fn load_world() -> World {
    let world = World::new();
    world.load_all();
    world
}

/// Enumerates every plugin in the LV2 path.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lv2Scanner;

impl Lv2Scanner {
    pub fn new() -> Self {
        Self
    }
}

impl PluginScanner for Lv2Scanner {
    fn abi(&self) -> PluginAbi {
        PluginAbi::Extensible
    }

    fn scan(&self) -> Result<Vec<PluginDescriptor>> {
        let world = load_world();
        let nodes = PortClasses::new(&world);
        Ok(world
            .plugins()
            .iter()
            .filter(|plugin| plugin.verify())
            .filter_map(|plugin| describe(&plugin, &nodes))
            .collect())
    }
}

struct PortClasses {
    input: lilv::node::Node,
    output: lilv::node::Node,
    audio: lilv::node::Node,
    atom: lilv::node::Node,
    latency: lilv::node::Node,
}

impl PortClasses {
    fn new(world: &World) -> Self {
        Self {
            input: world.new_uri(LV2_INPUT_PORT),
            output: world.new_uri(LV2_OUTPUT_PORT),
            audio: world.new_uri(LV2_AUDIO_PORT),
            atom: world.new_uri(uri::ATOM_PORT),
            latency: world.new_uri(uri::LV2_REPORTS_LATENCY),
        }
    }
}

fn describe(plugin: &Plugin, nodes: &PortClasses) -> Option<PluginDescriptor> {
    let uri = plugin.uri().as_uri()?.to_string();
    let name = plugin.name().as_str().unwrap_or(&uri).to_string();
    let category = plugin.class().label().as_str().unwrap_or("Unclassified").to_string();
    let author = plugin
        .author_name()
        .and_then(|node| node.as_str().map(str::to_string))
        .unwrap_or_default();

    let (mut inputs, mut outputs) = (0, 0);
    for port in plugin.iter_ports() {
        if port.is_a(&nodes.audio) {
            if port.is_a(&nodes.input) {
                inputs += 1;
            } else if port.is_a(&nodes.output) {
                outputs += 1;
            }
        }
    }

    let mut desc = PluginDescriptor::new(PluginId::Lv2(uri), name)
        .author(author)
        .category(category)
        .audio_io(inputs, outputs);
    if let Some(path) = plugin.library_uri().and_then(|node| node.as_uri().and_then(file_uri_to_path)) {
        desc = desc.path(path);
    }
    Some(desc)
}

fn node_uris(nodes: lilv::nodes::Nodes) -> Vec<String> {
    nodes
        .iter()
        .filter_map(|node| {
            node.as_uri()
                .map(str::to_string)
                .or_else(|| node.as_str().map(str::to_string))
        })
        .collect()
}

fn ports(plugin: &Plugin, nodes: &PortClasses) -> Vec<PortInfo> {
    plugin
        .iter_ports()
        .map(|port| {
            let index = port.index() as u32;
            let symbol = port
                .symbol()
                .and_then(|node| node.as_str().map(str::to_string))
                .unwrap_or_else(|| format!("port{index}"));
            let direction = if port.is_a(&nodes.output) {
                PortDirection::Output
            } else {
                PortDirection::Input
            };
            let kind = if port.is_a(&nodes.audio) {
                PortKind::Audio
            } else if port.is_a(&nodes.atom) {
                PortKind::Event
            } else {
                PortKind::Control
            };

            let mut info = PortInfo::new(index, symbol, direction, kind);
            if let Some(name) = port.name().and_then(|node| node.as_str().map(str::to_string)) {
                info = info.name(name);
            }
            if kind == PortKind::Control {
                let range = port.range();
                let default = range.default.and_then(|n| n.as_float()).unwrap_or(0.0);
                let mut min = range.minimum.and_then(|n| n.as_float()).unwrap_or(0.0);
                let mut max = range.maximum.and_then(|n| n.as_float()).unwrap_or(1.0);
                if min >= max {
                    min = default - 1.0;
                    max = default + 1.0;
                }
                info = info.range(min, max, default.clamp(min, max));
                if direction == PortDirection::Output && port.has_property(&nodes.latency) {
                    info = info.latency();
                }
            }
            info
        })
        .collect()
}

fn presets(world: &World, plugin: &Plugin) -> Vec<Preset> {
    let preset_class = world.new_uri(uri::PRESETS_PRESET);
    let label = world.new_uri(RDFS_LABEL);
    let port = world.new_uri(LV2_PORT);
    let symbol = world.new_uri(LV2_SYMBOL);
    let value = world.new_uri(PRESETS_VALUE);

    let Some(related) = plugin.related(Some(&preset_class)) else {
        return Vec::new();
    };
    related
        .iter()
        .filter_map(|node| {
            let preset_uri = node.as_uri()?.to_string();
            let _ = world.load_resource(&node);
            let title = world
                .find_nodes(Some(&node), &label, None)
                .iter()
                .find_map(|n| n.as_str().map(str::to_string))
                .unwrap_or_else(|| preset_uri.clone());
            let mut preset = Preset::new(preset_uri, title);
            for binding in world.find_nodes(Some(&node), &port, None).iter() {
                let sym = world
                    .find_nodes(Some(&binding), &symbol, None)
                    .iter()
                    .find_map(|n| n.as_str().map(str::to_string));
                let val = world
                    .find_nodes(Some(&binding), &value, None)
                    .iter()
                    .find_map(|n| n.as_float());
                if let (Some(sym), Some(val)) = (sym, val) {
                    preset = preset.value(sym, val);
                }
            }
            Some(preset)
        })
        .collect()
}

/// An LV2 plugin with its library loaded.
pub struct Lv2Binary {
    info: PluginInfo,
    bundle_path: CString,
    descriptor: *const Lv2Descriptor,
    library: Arc<Library>,
}

// SAFETY: the descriptor is immutable data of a library kept loaded by `library`.
unsafe impl Send for Lv2Binary {}
unsafe impl Sync for Lv2Binary {}

impl Lv2Binary {
    pub fn resolve(descriptor: &PluginDescriptor) -> Result<Self> {
        let id = descriptor.id.to_string();
        let PluginId::Lv2(plugin_uri) = &descriptor.id else {
            return Err(PluginError::load(id, LoadStage::Descriptor, "not an LV2 plugin URI"));
        };

        let world = load_world();
        let nodes = PortClasses::new(&world);
        let plugin = world
            .plugins()
            .plugin(&world.new_uri(plugin_uri))
            .ok_or_else(|| PluginError::load(&id, LoadStage::Scanning, "not found in the LV2 path"))?;
        if !plugin.verify() {
            return Err(PluginError::load(&id, LoadStage::Scanning, "plugin data failed verification"));
        }

        let described = describe(&plugin, &nodes)
            .ok_or_else(|| PluginError::load(&id, LoadStage::Descriptor, "plugin has no URI"))?;
        let library_path = described
            .path
            .clone()
            .ok_or_else(|| PluginError::load(&id, LoadStage::Opening, "no library path"))?;
        let bundle = plugin
            .bundle_uri()
            .as_uri()
            .and_then(file_uri_to_path)
            .ok_or_else(|| PluginError::load(&id, LoadStage::Opening, "no bundle path"))?;

        let mut info = PluginInfo::new(described, ports(&plugin, &nodes));
        info.required_features = node_uris(plugin.required_features());
        info.optional_features = node_uris(plugin.optional_features());
        info.extension_data = [uri::WORKER_INTERFACE, uri::STATE_INTERFACE, uri::OPTIONS_INTERFACE]
            .into_iter()
            .filter(|ext| plugin.has_extension_data(&world.new_uri(ext)))
            .map(str::to_string)
            .collect();
        info.presets = presets(&world, &plugin);

        // SAFETY: loading a plugin library runs its initializers.
        let library = unsafe { Library::new(&library_path) }
            .map_err(|e| PluginError::load(&id, LoadStage::Opening, e.to_string()))?;
        // SAFETY: the symbol type matches the LV2 entry point.
        let entry = unsafe {
            library
                .get::<Lv2DescriptorFn>(LV2_DESCRIPTOR_SYMBOL)
                .map(|symbol| *symbol)
        }
        .map_err(|e| PluginError::load(&id, LoadStage::Descriptor, e.to_string()))?;

        let descriptor = (0..)
            // SAFETY: the entry point returns null past the last index.
            .map(|index: u32| unsafe { entry(index) })
            .take_while(|d| !d.is_null())
            .find(|d| unsafe { CStr::from_ptr((**d).uri) }.to_str() == Ok(plugin_uri.as_str()))
            .ok_or_else(|| {
                PluginError::load(&id, LoadStage::Descriptor, "library does not export this URI")
            })?;

        let mut bundle = bundle.into_os_string().into_string().unwrap_or_default();
        if !bundle.ends_with('/') {
            bundle.push('/');
        }
        tracing::debug!(
            "Resolved LV2 {} ({} ports, {} presets)",
            id,
            info.ports.len(),
            info.presets.len()
        );
        Ok(Self {
            info,
            bundle_path: CString::new(bundle).unwrap_or_default(),
            descriptor,
            library: Arc::new(library),
        })
    }
}

impl PluginBinary for Lv2Binary {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn instantiate(&self, sample_rate: f64, features: &HostFeatures) -> Result<Box<dyn PluginInstance>> {
        let id = self.info.descriptor.id.to_string();
        // SAFETY: valid while the library is loaded.
        let desc = unsafe { &*self.descriptor };
        let instantiate = desc
            .instantiate
            .ok_or_else(|| PluginError::load(&id, LoadStage::Instantiation, "no instantiate function"))?;

        // SAFETY: the feature array outlives the instance; the module keeps
        // both and drops the instance first.
        let handle = unsafe {
            instantiate(
                self.descriptor,
                sample_rate,
                self.bundle_path.as_ptr(),
                features.feature_ptrs(),
            )
        };
        if handle.is_null() {
            return Err(PluginError::load(&id, LoadStage::Instantiation, "instantiate returned null"));
        }

        let mut instance = Lv2Instance {
            handle,
            descriptor: self.descriptor,
            worker: None,
            state: None,
            options: None,
            _library: Arc::clone(&self.library),
        };
        if let Some(iface) = instance.extension::<Lv2WorkerInterface>(uri::WORKER_INTERFACE) {
            instance.worker = Some(Arc::new(Lv2Worker { handle, iface }));
        }
        if let Some(iface) = instance.extension::<Lv2StateInterface>(uri::STATE_INTERFACE) {
            instance.state = Some(Lv2State { handle, iface });
        }
        if let Some(iface) = instance.extension::<Lv2OptionsInterface>(uri::OPTIONS_INTERFACE) {
            instance.options = Some(Lv2Options { handle, iface });
        }
        Ok(Box::new(instance))
    }
}

struct Lv2Instance {
    handle: Lv2Handle,
    descriptor: *const Lv2Descriptor,
    worker: Option<Arc<Lv2Worker>>,
    state: Option<Lv2State>,
    options: Option<Lv2Options>,
    _library: Arc<Library>,
}

// SAFETY: the host serializes every call into one instance.
unsafe impl Send for Lv2Instance {}

impl Lv2Instance {
    fn desc(&self) -> &Lv2Descriptor {
        // SAFETY: valid while `_library` is loaded.
        unsafe { &*self.descriptor }
    }

    fn extension<T>(&self, uri: &str) -> Option<*const T> {
        let extension_data = self.desc().extension_data?;
        let uri = CString::new(uri).ok()?;
        // SAFETY: extension_data takes a NUL-terminated URI.
        let ptr = unsafe { extension_data(uri.as_ptr()) };
        (!ptr.is_null()).then_some(ptr.cast())
    }
}

impl PluginInstance for Lv2Instance {
    unsafe fn connect_port(&mut self, port: u32, data: *mut c_void) {
        if let Some(connect) = self.desc().connect_port {
            connect(self.handle, port, data);
        }
    }

    fn activate(&mut self) {
        if let Some(activate) = self.desc().activate {
            // SAFETY: live handle.
            unsafe { activate(self.handle) };
        }
    }

    fn run(&mut self, frames: u32, _ctx: &mut RunContext<'_>) {
        // Work requests arrive through the schedule feature, not the context.
        if let Some(run) = self.desc().run {
            // SAFETY: every port is connected to buffers of at least `frames` samples.
            unsafe { run(self.handle, frames) };
        }
    }

    fn deactivate(&mut self) {
        if let Some(deactivate) = self.desc().deactivate {
            // SAFETY: live handle.
            unsafe { deactivate(self.handle) };
        }
    }

    fn worker(&self) -> Option<Arc<dyn WorkHandler>> {
        self.worker.clone().map(|w| w as Arc<dyn WorkHandler>)
    }

    fn state(&mut self) -> Option<&mut dyn StateHandler> {
        self.state.as_mut().map(|s| s as &mut dyn StateHandler)
    }

    fn options(&mut self) -> Option<&mut dyn OptionsHandler> {
        self.options.as_mut().map(|o| o as &mut dyn OptionsHandler)
    }
}

impl Drop for Lv2Instance {
    fn drop(&mut self) {
        if let Some(cleanup) = self.desc().cleanup {
            // SAFETY: the handle is not used again.
            unsafe { cleanup(self.handle) };
        }
    }
}

// ============================================================================
// Extension adapters
// ============================================================================

struct Lv2Worker {
    handle: Lv2Handle,
    iface: *const Lv2WorkerInterface,
}

// SAFETY: work() is serialized by the work lock, the other two calls come
// from the audio thread only.
unsafe impl Send for Lv2Worker {}
unsafe impl Sync for Lv2Worker {}

fn worker_status(status: u32) -> std::result::Result<(), WorkerError> {
    match status {
        LV2_WORKER_SUCCESS => Ok(()),
        LV2_WORKER_ERR_NO_SPACE => Err(WorkerError::RingFull),
        _ => Err(WorkerError::Unsupported),
    }
}

impl WorkHandler for Lv2Worker {
    fn work(&self, respond: &mut Responder<'_>, data: &[u8]) -> std::result::Result<(), WorkerError> {
        // SAFETY: interface pointers stay valid for the instance's lifetime.
        let Some(work) = (unsafe { &*self.iface }).work else {
            return Err(WorkerError::Unsupported);
        };
        let status = unsafe {
            work(
                self.handle,
                respond_callback,
                respond.as_handle(),
                data.len() as u32,
                data.as_ptr().cast(),
            )
        };
        worker_status(status)
    }

    fn work_response(&self, data: &[u8]) -> std::result::Result<(), WorkerError> {
        let Some(work_response) = (unsafe { &*self.iface }).work_response else {
            return Err(WorkerError::Unsupported);
        };
        worker_status(unsafe { work_response(self.handle, data.len() as u32, data.as_ptr().cast()) })
    }

    fn end_run(&self) {
        if let Some(end_run) = (unsafe { &*self.iface }).end_run {
            unsafe { end_run(self.handle) };
        }
    }
}

struct Lv2State {
    handle: Lv2Handle,
    iface: *const Lv2StateInterface,
}

struct SaveContext<'a> {
    urids: &'a UridTable,
    properties: Vec<StateProperty>,
}

struct RestoreContext<'a> {
    urids: &'a UridTable,
    properties: &'a [StateProperty],
}

unsafe extern "C" fn store_property(
    handle: *mut c_void,
    key: u32,
    value: *const c_void,
    size: usize,
    type_: u32,
    flags: u32,
) -> u32 {
    if handle.is_null() || (value.is_null() && size > 0) {
        return LV2_STATE_ERR_UNKNOWN;
    }
    // SAFETY: handle is the SaveContext passed to save().
    let ctx = unsafe { &mut *(handle as *mut SaveContext<'_>) };
    let (Some(key), Some(type_)) = (ctx.urids.lookup(key), ctx.urids.lookup(type_)) else {
        return LV2_STATE_ERR_UNKNOWN;
    };
    let value = if size == 0 {
        Vec::new()
    } else {
        unsafe { std::slice::from_raw_parts(value as *const u8, size) }.to_vec()
    };
    ctx.properties.push(StateProperty {
        key: key.to_string(),
        type_: type_.to_string(),
        flags,
        value,
    });
    LV2_STATE_SUCCESS
}

unsafe extern "C" fn retrieve_property(
    handle: *mut c_void,
    key: u32,
    size: *mut usize,
    type_: *mut u32,
    flags: *mut u32,
) -> *const c_void {
    if handle.is_null() {
        return std::ptr::null();
    }
    // SAFETY: handle is the RestoreContext passed to restore().
    let ctx = unsafe { &*(handle as *const RestoreContext<'_>) };
    let Some(key) = ctx.urids.lookup(key) else {
        return std::ptr::null();
    };
    let Some(prop) = ctx.properties.iter().find(|p| *p.key == *key) else {
        return std::ptr::null();
    };
    unsafe {
        if !size.is_null() {
            *size = prop.value.len();
        }
        if !type_.is_null() {
            *type_ = ctx.urids.intern(&prop.type_);
        }
        if !flags.is_null() {
            *flags = prop.flags;
        }
    }
    prop.value.as_ptr().cast()
}

impl StateHandler for Lv2State {
    fn save(&mut self, urids: &UridTable) -> Result<Vec<StateProperty>> {
        let Some(save) = (unsafe { &*self.iface }).save else {
            return Ok(Vec::new());
        };
        let mut ctx = SaveContext {
            urids,
            properties: Vec::new(),
        };
        let features: [*const Lv2Feature; 1] = [std::ptr::null()];
        let status = unsafe {
            save(
                self.handle,
                store_property,
                (&mut ctx as *mut SaveContext<'_>).cast(),
                LV2_STATE_IS_POD | LV2_STATE_IS_PORTABLE,
                features.as_ptr(),
            )
        };
        if status != LV2_STATE_SUCCESS {
            return Err(PluginError::State(format!("save failed with status {status}")));
        }
        Ok(ctx.properties)
    }

    fn restore(&mut self, urids: &UridTable, properties: &[StateProperty]) -> Result<()> {
        let Some(restore) = (unsafe { &*self.iface }).restore else {
            return Err(PluginError::State("restore not implemented".into()));
        };
        let ctx = RestoreContext { urids, properties };
        let features: [*const Lv2Feature; 1] = [std::ptr::null()];
        let status = unsafe {
            restore(
                self.handle,
                retrieve_property,
                (&ctx as *const RestoreContext<'_>).cast_mut().cast(),
                0,
                features.as_ptr(),
            )
        };
        match status {
            LV2_STATE_SUCCESS => Ok(()),
            other => Err(PluginError::State(format!("restore failed with status {other}"))),
        }
    }
}

struct Lv2Options {
    handle: Lv2Handle,
    iface: *const Lv2OptionsInterface,
}

impl OptionsHandler for Lv2Options {
    fn set(&mut self, features: &HostFeatures) -> Result<()> {
        let Some(set) = (unsafe { &*self.iface }).set else {
            return Ok(());
        };
        match unsafe { set(self.handle, features.options_ptr()) } {
            0 => Ok(()),
            status => Err(PluginError::State(format!("options set failed with status {status}"))),
        }
    }
}

/// `file:///a%20b/x.so` to `/a b/x.so`. Other schemes are rejected.
fn file_uri_to_path(uri: &str) -> Option<PathBuf> {
    let rest = uri.strip_prefix("file://")?;
    let rest = rest.strip_prefix("localhost").unwrap_or(rest);
    let bytes = rest.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).ok().map(PathBuf::from)
}
