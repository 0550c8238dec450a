//! Test helpers and fixtures for mixhost integration tests
//!
//! Native plugins are replaced by [`MockPlugin`], an in-process binary
//! whose instances apply a gain, can schedule deferred work and keep a
//! shared [`CallLog`] of everything the host asked them to do. Ordering
//! assertions ("the response arrived before the next run") read the log.

#![allow(dead_code)]

use mixhost::plugin::uri;
use mixhost::plugin::{
    HostConfig, HostFeatures, LoadStage, OptionsHandler, PluginAbi, PluginBinary, PluginDescriptor,
    PluginError, PluginId, PluginInfo, PluginInstance, PluginModule, PluginResolver, PluginScanner,
    PortDirection, PortInfo, PortKind, Preset, Responder, RunContext, StateHandler, StateProperty,
    UridTable, WorkHandler, WorkerError,
};
use parking_lot::Mutex;
use std::ffi::c_void;
use std::sync::Arc;

/// Default test sample rate (matches common hardware)
pub const TEST_SAMPLE_RATE: f64 = 48000.0;

/// Block length used by most tests
pub const TEST_BLOCK_SIZE: u32 = 64;

/// State key written by [`MockPlugin::with_state`] instances.
pub const BLOB_KEY: &str = "urn:mixhost:test#blob";

// ==================== Call log ====================

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Instantiate { sample_rate: f64 },
    Activate,
    Deactivate,
    Run { frames: u32 },
    ScheduleFailed(WorkerError),
    Work(Vec<u8>),
    WorkResponse(Vec<u8>),
    EndRun,
    Options { max_block: i32 },
    Restore { properties: usize },
}

/// Shared, ordered record of the calls every instance of a plugin received.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    fn push(&self, call: Call) {
        self.0.lock().push(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().clone()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }

    pub fn count(&self, f: impl Fn(&Call) -> bool) -> usize {
        self.0.lock().iter().filter(|c| f(c)).count()
    }

    pub fn position(&self, f: impl Fn(&Call) -> bool) -> Option<usize> {
        self.0.lock().iter().position(f)
    }

    pub fn runs(&self) -> usize {
        self.count(|c| matches!(c, Call::Run { .. }))
    }
}

// ==================== Mock plugin ====================

/// Scriptable plugin binary.
///
/// Port layout for `channels` channels:
/// audio inputs `0..channels`, audio outputs `channels..2*channels`,
/// then a `gain` control input (0..4, default 1) and a `latency`
/// control output.
pub struct MockPlugin {
    info: PluginInfo,
    channels: usize,
    log: CallLog,
    schedule_on_first_run: Option<Vec<u8>>,
    latency: f32,
    blob: Arc<Mutex<Vec<u8>>>,
    instantiate_limit: Option<usize>,
}

impl MockPlugin {
    pub fn new(id: PluginId, name: &str, channels: usize) -> Self {
        let descriptor = PluginDescriptor::new(id, name)
            .author("mixhost tests")
            .category("Utilities")
            .audio_io(channels, channels);

        let mut ports = Vec::with_capacity(2 * channels + 2);
        for c in 0..channels {
            ports.push(PortInfo::new(c as u32, format!("in_{c}"), PortDirection::Input, PortKind::Audio));
        }
        for c in 0..channels {
            ports.push(PortInfo::new(
                (channels + c) as u32,
                format!("out_{c}"),
                PortDirection::Output,
                PortKind::Audio,
            ));
        }
        ports.push(
            PortInfo::new(gain_port(channels), "gain", PortDirection::Input, PortKind::Control)
                .name("Gain")
                .range(0.0, 4.0, 1.0),
        );
        ports.push(
            PortInfo::new(latency_port(channels), "latency", PortDirection::Output, PortKind::Control)
                .latency(),
        );

        Self {
            info: PluginInfo::new(descriptor, ports),
            channels,
            log: CallLog::default(),
            schedule_on_first_run: None,
            latency: 0.0,
            blob: Arc::new(Mutex::new(Vec::new())),
            instantiate_limit: None,
        }
    }

    pub fn with_worker(mut self) -> Self {
        self.info.extension_data.push(uri::WORKER_INTERFACE.to_string());
        self.info.required_features.push(uri::WORKER_SCHEDULE.to_string());
        self
    }

    pub fn with_state(mut self) -> Self {
        self.info.extension_data.push(uri::STATE_INTERFACE.to_string());
        self
    }

    pub fn thread_safe_restore(mut self) -> Self {
        self.info.optional_features.push(uri::STATE_THREAD_SAFE_RESTORE.to_string());
        self
    }

    /// Advertise `fixedBlockLength`, making reconfiguration in-place.
    pub fn fixed_block(mut self) -> Self {
        self.info.optional_features.push(uri::BUF_SIZE_FIXED_BLOCK_LENGTH.to_string());
        self.info.extension_data.push(uri::OPTIONS_INTERFACE.to_string());
        self
    }

    pub fn requires(mut self, feature: &str) -> Self {
        self.info.required_features.push(feature.to_string());
        self
    }

    pub fn preset(mut self, preset: Preset) -> Self {
        self.info.presets.push(preset);
        self
    }

    /// The first run of each instance schedules `data` as deferred work.
    pub fn schedule_on_first_run(mut self, data: &[u8]) -> Self {
        self.schedule_on_first_run = Some(data.to_vec());
        self
    }

    /// Value written to the latency output on every run.
    pub fn reports_latency(mut self, frames: u32) -> Self {
        self.latency = frames as f32;
        self
    }

    /// Instantiation fails once `count` instances have been created.
    pub fn fails_after(mut self, count: usize) -> Self {
        self.instantiate_limit = Some(count);
        self
    }

    pub fn descriptor(&self) -> PluginDescriptor {
        self.info.descriptor.clone()
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    /// Current contents of the state blob.
    pub fn blob(&self) -> Vec<u8> {
        self.blob.lock().clone()
    }

    pub fn set_blob(&self, data: &[u8]) {
        *self.blob.lock() = data.to_vec();
    }

    pub fn gain_port(&self) -> u32 {
        gain_port(self.channels)
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }
}

fn gain_port(channels: usize) -> u32 {
    (2 * channels) as u32
}

fn latency_port(channels: usize) -> u32 {
    (2 * channels + 1) as u32
}

impl PluginBinary for MockPlugin {
    fn info(&self) -> &PluginInfo {
        &self.info
    }

    fn instantiate(&self, sample_rate: f64, _features: &HostFeatures) -> mixhost::plugin::Result<Box<dyn PluginInstance>> {
        let created = self.log.count(|c| matches!(c, Call::Instantiate { .. }));
        if self.instantiate_limit.is_some_and(|limit| created >= limit) {
            return Err(PluginError::LoadFailed {
                id: self.info.descriptor.id.to_string(),
                stage: LoadStage::Instantiation,
                reason: "instantiate returned null".into(),
            });
        }
        self.log.push(Call::Instantiate { sample_rate });
        let worker = self
            .info
            .has_extension(uri::WORKER_INTERFACE)
            .then(|| Arc::new(MockWorker { log: self.log.clone() }));
        let state = self.info.has_extension(uri::STATE_INTERFACE).then(|| MockState {
            blob: Arc::clone(&self.blob),
            log: self.log.clone(),
        });
        let options = self
            .info
            .has_extension(uri::OPTIONS_INTERFACE)
            .then(|| MockOptions { log: self.log.clone() });

        Ok(Box::new(MockInstance {
            ports: vec![std::ptr::null_mut(); 2 * self.channels + 2],
            channels: self.channels,
            log: self.log.clone(),
            pending_work: self.schedule_on_first_run.clone(),
            latency: self.latency,
            worker,
            state,
            options,
        }))
    }
}

struct MockInstance {
    ports: Vec<*mut c_void>,
    channels: usize,
    log: CallLog,
    pending_work: Option<Vec<u8>>,
    latency: f32,
    worker: Option<Arc<MockWorker>>,
    state: Option<MockState>,
    options: Option<MockOptions>,
}

// SAFETY: the port pointers are only dereferenced by the thread running the instance.
unsafe impl Send for MockInstance {}

impl PluginInstance for MockInstance {
    unsafe fn connect_port(&mut self, port: u32, data: *mut c_void) {
        if let Some(slot) = self.ports.get_mut(port as usize) {
            *slot = data;
        }
    }

    fn activate(&mut self) {
        self.log.push(Call::Activate);
    }

    fn run(&mut self, frames: u32, ctx: &mut RunContext<'_>) {
        self.log.push(Call::Run { frames });
        if let Some(data) = self.pending_work.take() {
            if let Err(e) = ctx.schedule_work(&data) {
                self.log.push(Call::ScheduleFailed(e));
            }
        }

        let frames = frames as usize;
        let ch = self.channels;
        // SAFETY: the host connected every port to storage of at least `frames` samples.
        unsafe {
            let gain = *self.ports[gain_port(ch) as usize].cast::<f32>();
            for c in 0..ch {
                let input = std::slice::from_raw_parts(self.ports[c].cast::<f32>(), frames);
                let output = std::slice::from_raw_parts_mut(self.ports[ch + c].cast::<f32>(), frames);
                for (o, i) in output.iter_mut().zip(input) {
                    *o = i * gain;
                }
            }
            *self.ports[latency_port(ch) as usize].cast::<f32>() = self.latency;
        }
    }

    fn deactivate(&mut self) {
        self.log.push(Call::Deactivate);
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

/// Echoes every request back as its response.
struct MockWorker {
    log: CallLog,
}

impl WorkHandler for MockWorker {
    fn work(&self, respond: &mut Responder<'_>, data: &[u8]) -> Result<(), WorkerError> {
        self.log.push(Call::Work(data.to_vec()));
        respond.respond(data)
    }

    fn work_response(&self, data: &[u8]) -> Result<(), WorkerError> {
        self.log.push(Call::WorkResponse(data.to_vec()));
        Ok(())
    }

    fn end_run(&self) {
        self.log.push(Call::EndRun);
    }
}

struct MockState {
    blob: Arc<Mutex<Vec<u8>>>,
    log: CallLog,
}

impl StateHandler for MockState {
    fn save(&mut self, _urids: &UridTable) -> mixhost::plugin::Result<Vec<StateProperty>> {
        Ok(vec![StateProperty {
            key: BLOB_KEY.to_string(),
            type_: uri::ATOM_CHUNK.to_string(),
            flags: 0,
            value: self.blob.lock().clone(),
        }])
    }

    fn restore(&mut self, _urids: &UridTable, properties: &[StateProperty]) -> mixhost::plugin::Result<()> {
        self.log.push(Call::Restore {
            properties: properties.len(),
        });
        let blob = properties
            .iter()
            .find(|p| p.key == BLOB_KEY)
            .ok_or_else(|| PluginError::State("missing blob".into()))?;
        *self.blob.lock() = blob.value.clone();
        Ok(())
    }
}

struct MockOptions {
    log: CallLog,
}

impl OptionsHandler for MockOptions {
    fn set(&mut self, features: &HostFeatures) -> mixhost::plugin::Result<()> {
        self.log.push(Call::Options {
            max_block: features.max_block(),
        });
        Ok(())
    }
}

// ==================== Resolution and discovery ====================

/// Resolves descriptors to a fixed set of mock binaries.
#[derive(Clone, Default)]
pub struct MockResolver {
    plugins: Vec<Arc<MockPlugin>>,
}

impl MockResolver {
    pub fn new(plugins: impl IntoIterator<Item = Arc<MockPlugin>>) -> Self {
        Self {
            plugins: plugins.into_iter().collect(),
        }
    }
}

impl PluginResolver for MockResolver {
    fn resolve(&self, descriptor: &PluginDescriptor) -> mixhost::plugin::Result<Arc<dyn PluginBinary>> {
        self.plugins
            .iter()
            .find(|p| p.info.descriptor.id == descriptor.id)
            .map(|p| Arc::clone(p) as Arc<dyn PluginBinary>)
            .ok_or_else(|| PluginError::LoadFailed {
                id: descriptor.id.to_string(),
                stage: LoadStage::Descriptor,
                reason: "not registered with the mock resolver".into(),
            })
    }
}

/// Reports a fixed list of descriptors for one ABI.
pub struct MockScanner {
    abi: PluginAbi,
    plugins: Vec<PluginDescriptor>,
}

impl MockScanner {
    pub fn new(abi: PluginAbi, plugins: Vec<PluginDescriptor>) -> Self {
        Self { abi, plugins }
    }
}

impl PluginScanner for MockScanner {
    fn abi(&self) -> PluginAbi {
        self.abi
    }

    fn scan(&self) -> mixhost::plugin::Result<Vec<PluginDescriptor>> {
        Ok(self.plugins.clone())
    }
}

// ==================== Fixtures ====================

pub fn test_config(channels: usize) -> HostConfig {
    HostConfig::default()
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(TEST_BLOCK_SIZE)
        .channels(channels)
}

/// Load `plugin` into a strip of `config.channels` channels.
pub fn load(plugin: &Arc<MockPlugin>, config: HostConfig) -> PluginModule {
    PluginModule::load_with(
        &plugin.descriptor(),
        Arc::new(MockResolver::new([Arc::clone(plugin)])),
        config,
    )
    .expect("Failed to load mock plugin")
}

/// Run one block and return the output channels.
pub fn process_block(module: &mut PluginModule, inputs: &[Vec<f32>], frames: u32) -> Vec<Vec<f32>> {
    let refs: Vec<&[f32]> = inputs.iter().map(Vec::as_slice).collect();
    let mut outputs = vec![vec![0.0f32; frames as usize]; inputs.len()];
    {
        let mut outs: Vec<&mut [f32]> = outputs.iter_mut().map(Vec::as_mut_slice).collect();
        module.process(&refs, &mut outs, frames);
    }
    outputs
}

/// Generate a test signal: sine wave at given frequency for specified samples.
pub fn generate_sine(frequency: f64, sample_rate: f64, num_samples: usize) -> Vec<f32> {
    (0..num_samples)
        .map(|i| {
            let t = i as f64 / sample_rate;
            (2.0 * std::f64::consts::PI * frequency * t).sin() as f32
        })
        .collect()
}

/// Generate white noise (random samples in -1..1).
pub fn generate_noise(num_samples: usize, seed: u64) -> Vec<f32> {
    // Simple LCG for reproducible "random" noise
    let mut rng = seed;
    (0..num_samples)
        .map(|_| {
            rng = rng.wrapping_mul(6364136223846793005).wrapping_add(1);
            ((rng >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0
        })
        .collect()
}

/// Bit-exact comparison, so that -0.0 vs 0.0 or NaN payloads count.
pub fn bit_identical(a: &[f32], b: &[f32]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.to_bits() == y.to_bits())
}
