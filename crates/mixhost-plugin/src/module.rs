//! A plugin inserted into a mixer strip.
//!
//! [`PluginModule`] owns everything one loaded plugin needs: the native
//! instances, the URID table and negotiated features they were created
//! with, the deferred-work rings, the event router and the port buffers.
//!
//! Per block, [`PluginModule::process`]:
//! 1. applies the latency reported during the previous block
//! 2. delivers worker responses
//! 3. materializes queued UI events into control and event-input ports
//! 4. runs the native instances
//! 5. forwards event outputs and changed control outputs to the UI
//! 6. records the latency the plugin now reports, for the next block

use crate::atom::AtomUrids;
use crate::config::HostConfig;
use crate::error::{PluginError, Result};
use crate::events::{event_channel, EventRouter, UiEndpoint};
use crate::features::{BlockOptions, HostFeatures};
use crate::instance::{NativeResolver, PluginBinary, PluginInstance, PluginResolver, RunContext};
use crate::metadata::{PluginAbi, PluginDescriptor, PluginInfo};
use crate::ports::PortSet;
use crate::preset::PresetList;
use crate::state::{ControlValue, ModuleState, StateProperty};
use crate::uri;
use crate::urid::UridTable;
use crate::worker::{DeferredWork, WorkScheduler};
use std::sync::Arc;

/// Upper bound on the length of an [`impulse_response`](PluginModule::impulse_response).
pub const MAX_IMPULSE_FRAMES: usize = 1 << 20;

/// How a block-size or rate change is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconfiguration {
    /// Deactivate, update options and buffers, reconnect, reactivate.
    InPlace,
    /// Destroy the instances and load the plugin again.
    Reload,
}

pub struct PluginModule {
    // Field order is drop order: the worker stops before the instances go,
    // and the instances go before the structures they were created with.
    work: DeferredWork,
    instances: Vec<Box<dyn PluginInstance>>,
    scheduler: Option<WorkScheduler>,
    router: EventRouter,
    ui: Option<UiEndpoint>,
    ports: PortSet,
    features: HostFeatures,
    urids: Arc<UridTable>,
    atoms: AtomUrids,
    binary: Arc<dyn PluginBinary>,
    resolver: Arc<dyn PluginResolver>,
    descriptor: PluginDescriptor,
    config: HostConfig,
    presets: PresetList,
    current_preset: Option<String>,
    sent_outputs: Box<[f32]>,
    active: bool,
    bypass: bool,
    latency: u32,
    pending_latency: Option<u32>,
    safe_restore: bool,
}

impl PluginModule {
    /// Load an installed plugin. See [`load_with`](Self::load_with).
    pub fn load(descriptor: &PluginDescriptor, config: HostConfig) -> Result<Self> {
        Self::load_with(descriptor, Arc::new(NativeResolver), config)
    }

    /// Resolve, instantiate, connect and activate a plugin.
    ///
    /// Fails, leaving nothing behind, if the binary cannot be resolved,
    /// requires a host feature that is not provided, or does not fit the
    /// strip's channel count.
    pub fn load_with(
        descriptor: &PluginDescriptor,
        resolver: Arc<dyn PluginResolver>,
        config: HostConfig,
    ) -> Result<Self> {
        let binary = resolver.resolve(descriptor)?;
        Self::instantiate(descriptor, binary, resolver, config)
    }

    fn instantiate(
        descriptor: &PluginDescriptor,
        binary: Arc<dyn PluginBinary>,
        resolver: Arc<dyn PluginResolver>,
        config: HostConfig,
    ) -> Result<Self> {
        let info = binary.info();
        let id = descriptor.id.to_string();
        let has_worker = info.has_extension(uri::WORKER_INTERFACE);
        let count = instance_count(&id, info, config.channels, has_worker)?;

        let urids = Arc::new(UridTable::new(has_worker));
        let mut work = match (has_worker, config.threaded_worker) {
            (false, _) => DeferredWork::none(),
            (true, true) => DeferredWork::threaded(config.worker_ring_size),
            (true, false) => DeferredWork::synchronous(config.worker_ring_size),
        };
        let scheduler = work.scheduler();
        let block = BlockOptions::new(config.block_size, config.min_block_size, config.sample_rate);
        let features = HostFeatures::negotiate(&urids, &block, scheduler.as_ref());

        let missing = features.missing(&info.required_features);
        if let Some(feature) = missing.first() {
            return Err(PluginError::MissingFeature {
                id,
                feature: feature.to_string(),
            });
        }

        let mut instances = Vec::with_capacity(count);
        for _ in 0..count {
            instances.push(binary.instantiate(config.sample_rate, &features)?);
        }

        if has_worker {
            match instances.first().and_then(|inst| inst.worker()) {
                Some(handler) => work.start(handler, config.spawn_worker_thread),
                None => tracing::warn!("{} declares a worker but provides no handler", id),
            }
        }

        let atoms = AtomUrids::new(&urids);
        let (router, ui) = event_channel(config.event_ring_size, Arc::clone(&urids));
        let ports = PortSet::new(&info.ports, count, config.block_size, config.atom_buffer_size);
        let outputs = ports.control_outputs().count();

        let mut module = Self {
            work,
            instances,
            scheduler,
            router,
            ui: Some(ui),
            ports,
            features,
            urids,
            atoms,
            safe_restore: info.supports(uri::STATE_THREAD_SAFE_RESTORE),
            presets: PresetList::new(info.presets.clone()),
            binary,
            resolver,
            descriptor: descriptor.clone(),
            config,
            current_preset: None,
            sent_outputs: vec![f32::NAN; outputs].into_boxed_slice(),
            active: false,
            bypass: false,
            latency: 0,
            pending_latency: None,
        };
        module.connect_ports();
        module.activate();

        tracing::info!(
            "Loaded {} plugin '{}' ({} instance{}, worker: {:?})",
            module.descriptor.abi(),
            module.descriptor.name,
            count,
            if count == 1 { "" } else { "s" },
            module.work
        );
        Ok(module)
    }

    // ==================== Lifecycle ====================

    /// Bind every port of every instance to the current buffers.
    pub fn connect_ports(&mut self) {
        for (i, inst) in self.instances.iter_mut().enumerate() {
            self.ports.connect(i, inst.as_mut());
        }
    }

    /// No-op when a failed reload left the module without instances.
    pub fn activate(&mut self) {
        if self.active {
            return;
        }
        if self.instances.is_empty() {
            tracing::warn!("'{}' has no instances to activate", self.descriptor.name);
            return;
        }
        for inst in &mut self.instances {
            inst.activate();
        }
        self.active = true;
        tracing::debug!("Activated '{}'", self.descriptor.name);
    }

    pub fn deactivate(&mut self) {
        if !self.active {
            return;
        }
        for inst in &mut self.instances {
            inst.deactivate();
        }
        self.active = false;
        tracing::debug!("Deactivated '{}'", self.descriptor.name);
    }

    /// Real-time entry point. `frames` is clamped to the current block size.
    ///
    /// While bypassed or inactive the inputs are copied to the outputs
    /// unchanged and the plugin does not run, but worker responses are
    /// still delivered.
    pub fn process(&mut self, inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: u32) {
        let frames = frames.min(self.ports.block_size() as u32);

        if let Some(latency) = self.pending_latency.take() {
            self.latency = latency;
        }
        self.work.emit_responses();

        if self.bypass || !self.active || self.instances.is_empty() {
            pass_through(inputs, outputs, frames as usize);
            return;
        }

        for (i, inst) in self.instances.iter_mut().enumerate() {
            if !self.ports.is_connected(i) {
                self.ports.connect(i, inst.as_mut());
            }
        }

        self.ports.reset_events(&self.atoms);
        self.router.apply_ui_events(frames, &mut self.ports);
        self.ports.write_inputs(inputs, frames as usize);

        let mut ctx = match &self.scheduler {
            Some(scheduler) => RunContext::new().scheduler(scheduler),
            None => RunContext::new(),
        };
        for inst in &mut self.instances {
            inst.run(frames, &mut ctx);
        }
        self.work.end_run();

        self.ports.read_outputs(outputs, frames as usize);

        for (port, buffer) in self.ports.event_outputs() {
            self.router.harvest_outputs(port, buffer);
        }
        for (sent, (port, value)) in self.sent_outputs.iter_mut().zip(self.ports.control_outputs()) {
            if sent.to_bits() != value.to_bits() && self.router.send_control_output(port, value) {
                *sent = value;
            }
        }

        if let Some(reported) = self.ports.reported_latency() {
            let reported = reported.max(0.0) as u32;
            if reported != self.latency {
                self.pending_latency = Some(reported);
            }
        }
    }

    /// How a block-size change would be applied to this plugin.
    pub fn block_size_strategy(&self) -> Reconfiguration {
        match self.descriptor.abi() {
            PluginAbi::Simple => Reconfiguration::InPlace,
            PluginAbi::Extensible => self.extensible_strategy(),
        }
    }

    /// How a sample-rate change would be applied to this plugin.
    pub fn sample_rate_strategy(&self) -> Reconfiguration {
        match self.descriptor.abi() {
            PluginAbi::Simple => Reconfiguration::Reload,
            PluginAbi::Extensible => self.extensible_strategy(),
        }
    }

    fn extensible_strategy(&self) -> Reconfiguration {
        if self.info().supports(uri::BUF_SIZE_FIXED_BLOCK_LENGTH) {
            Reconfiguration::InPlace
        } else {
            Reconfiguration::Reload
        }
    }

    pub fn resize_buffers(&mut self, block_size: u32) -> Result<()> {
        if block_size == self.config.block_size {
            return Ok(());
        }
        let previous = self.config;
        self.config.block_size = block_size;
        self.config.min_block_size = self.config.min_block_size.min(block_size);
        let strategy = self.block_size_strategy();
        self.apply(strategy, previous)
    }

    pub fn handle_sample_rate_change(&mut self, sample_rate: f64) -> Result<()> {
        if sample_rate == self.config.sample_rate {
            return Ok(());
        }
        let previous = self.config;
        self.config.sample_rate = sample_rate;
        let strategy = self.sample_rate_strategy();
        self.apply(strategy, previous)
    }

    fn apply(&mut self, strategy: Reconfiguration, previous: HostConfig) -> Result<()> {
        tracing::info!(
            "'{}': {:?} for {} frames at {} Hz",
            self.descriptor.name,
            strategy,
            self.config.block_size,
            self.config.sample_rate
        );
        match strategy {
            Reconfiguration::InPlace => {
                self.reconfigure();
                Ok(())
            }
            Reconfiguration::Reload => self.reload().inspect_err(|_| self.config = previous),
        }
    }

    fn reconfigure(&mut self) {
        let was_active = self.active;
        self.deactivate();

        let block = BlockOptions::new(
            self.config.block_size,
            self.config.min_block_size,
            self.config.sample_rate,
        );
        self.features.update(&block);
        self.ports.resize(self.config.block_size);
        for inst in &mut self.instances {
            if let Some(options) = inst.options() {
                if let Err(e) = options.set(&self.features) {
                    tracing::warn!("'{}' rejected new options: {}", self.descriptor.name, e);
                }
            }
        }
        self.connect_ports();

        if was_active {
            self.activate();
        }
    }

    /// Replace every native instance with a freshly loaded one, carrying
    /// over control values, bypass and the selected preset.
    fn reload(&mut self) -> Result<()> {
        let state = self.module_state();
        let was_active = self.active;

        // The old instances must be gone before the new ones exist.
        self.deactivate();
        self.work.finish();
        self.instances.clear();

        let mut fresh = Self::instantiate(
            &self.descriptor,
            Arc::clone(&self.binary),
            Arc::clone(&self.resolver),
            self.config,
        )?;
        fresh.restore_module_state(&state);
        if !was_active {
            fresh.deactivate();
        }
        *self = fresh;
        Ok(())
    }

    // ==================== Controls ====================

    pub fn bypass(&self) -> bool {
        self.bypass
    }

    pub fn set_bypass(&mut self, bypass: bool) {
        if self.bypass != bypass {
            tracing::debug!("'{}' bypass {}", self.descriptor.name, bypass);
        }
        self.bypass = bypass;
    }

    /// Write a control input through its range. Returns the stored value.
    pub fn set_control_value(&mut self, port: u32, value: f32) -> Result<f32> {
        let info = self.ports.port(port).ok_or(PluginError::InvalidPort(port))?;
        if !info.is_control_input() {
            return Err(PluginError::NotControlInput(port));
        }
        self.ports
            .set_control_input(port, value)
            .ok_or(PluginError::NotControlInput(port))
    }

    pub fn control_value(&self, port: u32) -> Option<f32> {
        self.ports.control_input(port)
    }

    /// Latency in frames, as of the start of the current block.
    pub fn latency(&self) -> u32 {
        self.latency
    }

    // ==================== Presets ====================

    pub fn presets(&self) -> &PresetList {
        &self.presets
    }

    pub fn current_preset(&self) -> Option<&str> {
        self.current_preset.as_deref()
    }

    /// Apply a preset through the same path as [`set_control_value`](Self::set_control_value).
    pub fn apply_preset(&mut self, index: usize) -> Result<usize> {
        let preset = self
            .presets
            .get(index)
            .cloned()
            .ok_or(PluginError::InvalidPreset(index))?;
        let binary = Arc::clone(&self.binary);
        let applied = preset.apply(binary.info(), |port, value| self.set_control_value(port, value));
        tracing::debug!("Applied preset '{}' ({} values)", preset.label, applied);
        self.current_preset = Some(preset.uri);
        Ok(applied)
    }

    // ==================== State ====================

    /// Per-channel instances share their values, so the first one speaks
    /// for all of them.
    pub fn save_state(&mut self) -> Result<Vec<StateProperty>> {
        let inst = self.instances.first_mut().ok_or(PluginError::NotLoaded)?;
        match inst.state() {
            Some(state) => state.save(&self.urids),
            None => Ok(Vec::new()),
        }
    }

    /// Restore plugin state into every instance on the calling thread,
    /// under the work lock. A plugin that does not declare thread-safe
    /// restore is deactivated around the call.
    pub fn restore_state(&mut self, properties: &[StateProperty]) -> Result<()> {
        if self.instances.is_empty() {
            return Err(PluginError::NotLoaded);
        }
        let pause = self.active && !self.safe_restore;
        if pause {
            self.deactivate();
        }

        let result = {
            let _guard = self.work.lock();
            let urids = &self.urids;
            let name = &self.descriptor.name;
            self.instances.iter_mut().try_for_each(|inst| match inst.state() {
                Some(state) => state.restore(urids, properties),
                None => Err(PluginError::State(format!("'{}' has no state interface", name))),
            })
        };

        if pause {
            self.activate();
        }
        result
    }

    // ==================== Analysis ====================

    /// Render the response to a unit impulse on a scratch instance that
    /// shares the current control values. The live instances are not
    /// touched.
    ///
    /// Returns one buffer per audio output, `frames` long (at most
    /// [`MAX_IMPULSE_FRAMES`]). Plugins that need a worker cannot be
    /// rendered offline and fail with [`PluginError::MissingFeature`].
    pub fn impulse_response(&self, frames: usize) -> Result<Vec<Vec<f32>>> {
        let frames = frames.min(MAX_IMPULSE_FRAMES);
        let info = self.info();
        let block = BlockOptions::new(
            self.config.block_size,
            self.config.min_block_size,
            self.config.sample_rate,
        );
        let features = HostFeatures::negotiate(&self.urids, &block, None);
        if let Some(feature) = features.missing(&info.required_features).first() {
            return Err(PluginError::MissingFeature {
                id: self.descriptor.id.to_string(),
                feature: feature.to_string(),
            });
        }

        let mut ports = PortSet::new(
            &info.ports,
            1,
            self.config.block_size,
            self.config.atom_buffer_size,
        );
        for port in info.ports.iter().filter(|p| p.is_control_input()) {
            if let Some(value) = self.ports.control_input(port.index) {
                ports.set_control_input(port.index, value);
            }
        }
        let mut inst = self.binary.instantiate(self.config.sample_rate, &features)?;
        ports.connect(0, inst.as_mut());
        inst.activate();

        let block_size = ports.block_size().max(1);
        let mut response = vec![Vec::with_capacity(frames); info.audio_outputs()];
        let mut input = vec![0.0f32; block_size];
        let mut chunk = vec![vec![0.0f32; block_size]; response.len()];
        input[0] = 1.0;

        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(block_size);
            let inputs = vec![&input[..]; info.audio_inputs()];
            ports.reset_events(&self.atoms);
            ports.write_inputs(&inputs, n);
            inst.run(n as u32, &mut RunContext::new());

            let mut outputs: Vec<&mut [f32]> = chunk.iter_mut().map(|c| &mut c[..]).collect();
            ports.read_outputs(&mut outputs, n);
            for (out, rendered) in response.iter_mut().zip(&chunk) {
                out.extend_from_slice(&rendered[..n]);
            }
            input[0] = 0.0;
            done += n;
        }
        inst.deactivate();

        tracing::debug!("Rendered {} frame impulse response of '{}'", frames, self.descriptor.name);
        Ok(response)
    }

    /// Snapshot for the session file.
    pub fn module_state(&self) -> ModuleState {
        let controls = self
            .info()
            .ports
            .iter()
            .filter(|p| p.is_control_input())
            .filter_map(|p| {
                self.ports.control_input(p.index).map(|value| ControlValue {
                    symbol: p.symbol.clone(),
                    value,
                })
            })
            .collect();
        ModuleState {
            plugin: self.descriptor.id.clone(),
            controls,
            preset: self.current_preset.clone(),
            bypass: self.bypass,
        }
    }

    /// Apply a saved snapshot. Values for unknown ports are skipped.
    pub fn restore_module_state(&mut self, state: &ModuleState) {
        for control in &state.controls {
            let Some(index) = self.info().port_by_symbol(&control.symbol).map(|p| p.index) else {
                tracing::debug!("Saved control '{}' no longer exists", control.symbol);
                continue;
            };
            if let Err(e) = self.set_control_value(index, control.value) {
                tracing::debug!("Skipping saved control '{}': {}", control.symbol, e);
            }
        }
        self.current_preset = state.preset.clone();
        self.set_bypass(state.bypass);
    }

    // ==================== Accessors ====================

    /// The UI end of the event router. Taken once per load; a reload
    /// makes a new one available and disconnects the old.
    pub fn take_ui_endpoint(&mut self) -> Option<UiEndpoint> {
        self.ui.take()
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    pub fn info(&self) -> &PluginInfo {
        self.binary.info()
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn urids(&self) -> &Arc<UridTable> {
        &self.urids
    }

    pub fn features(&self) -> &HostFeatures {
        &self.features
    }

    pub fn worker(&self) -> &DeferredWork {
        &self.work
    }

    pub fn ports(&self) -> &PortSet {
        &self.ports
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_safe_restore(&self) -> bool {
        self.safe_restore
    }
}

impl Drop for PluginModule {
    fn drop(&mut self) {
        self.deactivate();
        self.work.finish();
        tracing::info!("Unloaded '{}'", self.descriptor.name);
    }
}

impl std::fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginModule")
            .field("plugin", &self.descriptor.id)
            .field("instances", &self.instances.len())
            .field("active", &self.active)
            .field("bypass", &self.bypass)
            .field("worker", &self.work)
            .finish()
    }
}

/// One instance when the plugin's inputs match the strip, one per channel
/// for a mono plugin without events or worker, otherwise unloadable.
fn instance_count(id: &str, info: &PluginInfo, channels: usize, has_worker: bool) -> Result<usize> {
    let inputs = info.audio_inputs();
    let outputs = info.audio_outputs();
    if inputs == channels {
        return Ok(1);
    }
    if inputs == 1 && outputs == 1 && info.event_ports() == 0 && !has_worker {
        return Ok(channels.max(1));
    }
    Err(PluginError::ChannelMismatch {
        id: id.to_string(),
        plugin_inputs: inputs,
        channels,
    })
}

fn pass_through(inputs: &[&[f32]], outputs: &mut [&mut [f32]], frames: usize) {
    for (i, dst) in outputs.iter_mut().enumerate() {
        let n = frames.min(dst.len());
        match (inputs.len(), inputs.get(i % inputs.len().max(1))) {
            (0, _) | (_, None) => dst[..n].fill(0.0),
            (_, Some(src)) => {
                let m = n.min(src.len());
                dst[..m].copy_from_slice(&src[..m]);
                dst[m..n].fill(0.0);
            }
        }
    }
}
