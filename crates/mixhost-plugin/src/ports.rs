//! Host-side storage behind every plugin port.
//!
//! The mixer's own buffers are never handed to a plugin. Audio is copied
//! into and out of buffers owned here, so the addresses a plugin sees only
//! change when [`PortSet::resize`] reallocates them. Each reallocation
//! bumps a generation counter; an instance connected under an older
//! generation must be reconnected before it may run.

use crate::atom::{AtomBuffer, AtomUrids};
use crate::events::UiEventSink;
use crate::instance::PluginInstance;
use crate::metadata::{PortDirection, PortInfo, PortKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    AudioIn(usize),
    AudioOut(usize),
    ControlIn(usize),
    ControlOut(usize),
    EventIn(usize),
    EventOut(usize),
}

/// Buffers of one native instance.
struct InstancePorts {
    audio_in: Vec<Box<[f32]>>,
    audio_out: Vec<Box<[f32]>>,
    control_in: Box<[f32]>,
    control_out: Box<[f32]>,
    connected: Option<u64>,
}

pub struct PortSet {
    ports: Vec<PortInfo>,
    slots: Vec<Option<Slot>>,
    instances: Vec<InstancePorts>,
    event_in: Vec<AtomBuffer>,
    event_out: Vec<AtomBuffer>,
    latency_slot: Option<usize>,
    block_size: usize,
    generation: u64,
}

impl PortSet {
    /// Allocate storage for `instances` copies of `ports`. Event buffers
    /// exist once, since plugins with event ports never run per channel.
    pub fn new(ports: &[PortInfo], instances: usize, block_size: u32, atom_buffer_size: usize) -> Self {
        let max_index = ports.iter().map(|p| p.index as usize + 1).max().unwrap_or(0);
        let mut slots = vec![None; max_index];
        let mut counts = [0usize; 6];
        let mut latency_slot = None;

        for port in ports {
            let (n, make): (usize, fn(usize) -> Slot) = match (port.kind, port.direction) {
                (PortKind::Audio, PortDirection::Input) => (0, Slot::AudioIn),
                (PortKind::Audio, PortDirection::Output) => (1, Slot::AudioOut),
                (PortKind::Control, PortDirection::Input) => (2, Slot::ControlIn),
                (PortKind::Control, PortDirection::Output) => (3, Slot::ControlOut),
                (PortKind::Event, PortDirection::Input) => (4, Slot::EventIn),
                (PortKind::Event, PortDirection::Output) => (5, Slot::EventOut),
            };
            if port.reports_latency && n == 3 {
                latency_slot = Some(counts[3]);
            }
            slots[port.index as usize] = Some(make(counts[n]));
            counts[n] += 1;
        }

        let defaults: Box<[f32]> = ports
            .iter()
            .filter(|p| p.is_control_input())
            .map(|p| p.range.map_or(0.0, |r| r.default))
            .collect();

        let instances = (0..instances.max(1))
            .map(|_| InstancePorts {
                audio_in: (0..counts[0]).map(|_| silence(block_size)).collect(),
                audio_out: (0..counts[1]).map(|_| silence(block_size)).collect(),
                control_in: defaults.clone(),
                control_out: vec![0.0; counts[3]].into_boxed_slice(),
                connected: None,
            })
            .collect();

        Self {
            ports: ports.to_vec(),
            slots,
            instances,
            event_in: (0..counts[4]).map(|_| AtomBuffer::new(atom_buffer_size)).collect(),
            event_out: (0..counts[5]).map(|_| AtomBuffer::new(atom_buffer_size)).collect(),
            latency_slot,
            block_size: block_size as usize,
            generation: 0,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }

    /// Reallocate audio buffers for a new block length. Every instance
    /// must be reconnected afterwards.
    pub fn resize(&mut self, block_size: u32) {
        for inst in &mut self.instances {
            for buf in inst.audio_in.iter_mut().chain(inst.audio_out.iter_mut()) {
                *buf = silence(block_size);
            }
        }
        self.block_size = block_size as usize;
        self.generation += 1;
        tracing::debug!("Port buffers resized to {} frames (generation {})", block_size, self.generation);
    }

    /// Point every port of `instance` at the storage of copy `which`.
    pub fn connect(&mut self, which: usize, instance: &mut dyn PluginInstance) {
        let generation = self.generation;
        let Some(inst) = self.instances.get_mut(which) else {
            return;
        };
        for port in &self.ports {
            let Some(Some(slot)) = self.slots.get(port.index as usize) else {
                continue;
            };
            let ptr: *mut std::ffi::c_void = match *slot {
                Slot::AudioIn(i) => inst.audio_in[i].as_mut_ptr().cast(),
                Slot::AudioOut(i) => inst.audio_out[i].as_mut_ptr().cast(),
                Slot::ControlIn(i) => (&mut inst.control_in[i] as *mut f32).cast(),
                Slot::ControlOut(i) => (&mut inst.control_out[i] as *mut f32).cast(),
                Slot::EventIn(i) => self.event_in[i].as_mut_ptr(),
                Slot::EventOut(i) => self.event_out[i].as_mut_ptr(),
            };
            // SAFETY: the storage is owned by self and only moves on resize,
            // which bumps the generation and forces a reconnect.
            unsafe { instance.connect_port(port.index, ptr) };
        }
        inst.connected = Some(generation);
    }

    /// True if copy `which` was connected under the current generation.
    pub fn is_connected(&self, which: usize) -> bool {
        self.instances
            .get(which)
            .is_some_and(|inst| inst.connected == Some(self.generation))
    }

    /// Copy the mixer's input channels in. Per-channel instances take one
    /// channel each; a single instance takes them in port order.
    pub fn write_inputs(&mut self, inputs: &[&[f32]], frames: usize) {
        let frames = frames.min(self.block_size);
        let mut channel = 0;
        for inst in &mut self.instances {
            for buf in &mut inst.audio_in {
                match inputs.get(channel) {
                    Some(src) => {
                        let n = frames.min(src.len());
                        buf[..n].copy_from_slice(&src[..n]);
                        buf[n..frames].fill(0.0);
                    }
                    None => buf[..frames].fill(0.0),
                }
                channel += 1;
            }
        }
    }

    /// Copy the plugin's audio outputs to the mixer.
    pub fn read_outputs(&self, outputs: &mut [&mut [f32]], frames: usize) {
        let frames = frames.min(self.block_size);
        let sources = self.instances.iter().flat_map(|inst| inst.audio_out.iter());
        for (dst, src) in outputs.iter_mut().zip(sources) {
            let n = frames.min(dst.len());
            dst[..n].copy_from_slice(&src[..n]);
        }
    }

    /// Raw address of an audio input buffer, for checking what an
    /// instance was connected to.
    pub fn audio_input_ptr(&self, which: usize, input: usize) -> Option<*const f32> {
        self.instances
            .get(which)
            .and_then(|inst| inst.audio_in.get(input))
            .map(|buf| buf.as_ptr())
    }

    pub fn port(&self, index: u32) -> Option<&PortInfo> {
        self.ports.iter().find(|p| p.index == index)
    }

    /// Current value of a control input (first instance).
    pub fn control_input(&self, index: u32) -> Option<f32> {
        match self.slot(index)? {
            Slot::ControlIn(i) => self.instances.first().map(|inst| inst.control_in[i]),
            _ => None,
        }
    }

    /// Write a control input on every instance, clamped into its range.
    /// Returns the stored value, or `None` if `index` is not a control input.
    pub fn set_control_input(&mut self, index: u32, value: f32) -> Option<f32> {
        let Some(Slot::ControlIn(i)) = self.slot(index) else {
            return None;
        };
        let value = match self.port(index).and_then(|p| p.range) {
            Some(range) => range.clamp(value),
            None => value,
        };
        for inst in &mut self.instances {
            inst.control_in[i] = value;
        }
        Some(value)
    }

    /// Control output values of the first instance, with their port index.
    pub fn control_outputs(&self) -> impl Iterator<Item = (u32, f32)> + '_ {
        self.ports.iter().filter_map(move |p| match self.slot(p.index)? {
            Slot::ControlOut(i) => self.instances.first().map(|inst| (p.index, inst.control_out[i])),
            _ => None,
        })
    }

    /// Frames of latency the plugin reported in its last run.
    pub fn reported_latency(&self) -> Option<f32> {
        let slot = self.latency_slot?;
        self.instances.first().map(|inst| inst.control_out[slot])
    }

    pub fn has_event_ports(&self) -> bool {
        !self.event_in.is_empty() || !self.event_out.is_empty()
    }

    /// Reset event buffers before a run: inputs to an empty sequence,
    /// outputs to a chunk advertising their capacity.
    pub fn reset_events(&mut self, urids: &AtomUrids) {
        for buf in &mut self.event_in {
            buf.reset_input(urids);
        }
        for buf in &mut self.event_out {
            buf.reset_output(urids);
        }
    }

    /// `(port index, buffer)` of each event output.
    pub fn event_outputs(&self) -> impl Iterator<Item = (u32, &AtomBuffer)> + '_ {
        self.ports.iter().filter_map(move |p| match self.slot(p.index)? {
            Slot::EventOut(i) => Some((p.index, &self.event_out[i])),
            _ => None,
        })
    }

    fn slot(&self, index: u32) -> Option<Slot> {
        self.slots.get(index as usize).copied().flatten()
    }
}

impl UiEventSink for PortSet {
    fn set_control(&mut self, port: u32, value: f32) -> bool {
        self.set_control_input(port, value).is_some()
    }

    fn event_input(&mut self, port: u32) -> Option<&mut AtomBuffer> {
        match self.slot(port)? {
            Slot::EventIn(i) => self.event_in.get_mut(i),
            _ => None,
        }
    }
}

impl std::fmt::Debug for PortSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortSet")
            .field("ports", &self.ports.len())
            .field("instances", &self.instances.len())
            .field("block_size", &self.block_size)
            .field("generation", &self.generation)
            .finish()
    }
}

fn silence(frames: u32) -> Box<[f32]> {
    vec![0.0; frames as usize].into_boxed_slice()
}
