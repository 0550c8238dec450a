//! UI <-> plugin event routing.
//!
//! Two SPSC byte rings decouple the UI thread from the audio thread:
//!
//! - UI -> plugin records `[port][protocol][size][body]`. Protocol 0 is a
//!   float control value, the event-transfer URID carries a whole atom for
//!   an event input port.
//! - plugin -> UI records `[port][type][size][body]`, produced by
//!   [`EventRouter::send_to_ui`] and drained by the UI.
//!
//! [`EventRouter`] is the audio-thread end, [`UiEndpoint`] the UI end.

use crate::atom::{forge_path_set, pad8, AtomBuffer, AtomUrids, ATOM_HEADER};
use crate::error::EventError;
use crate::ring::{byte_ring, peek_header, pop_record, push_record};
use crate::urid::{Urid, UridTable};
use ringbuf::{HeapCons, HeapProd};
use smallvec::SmallVec;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// UI protocol for a plain float control value.
pub const PROTOCOL_FLOAT: u32 = 0;

const UI_HEADER: usize = 12;

/// Where [`EventRouter::apply_ui_events`] delivers UI events.
pub trait UiEventSink {
    /// Write a control input. False if `port` is not one.
    fn set_control(&mut self, port: u32, value: f32) -> bool;

    /// Input buffer of an event port.
    fn event_input(&mut self, port: u32) -> Option<&mut AtomBuffer>;
}

/// One plugin-originated event, as seen by the UI.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginEvent {
    pub port: u32,
    /// Atom type, or [`PROTOCOL_FLOAT`] for control output values
    pub type_: Urid,
    pub body: Vec<u8>,
}

impl PluginEvent {
    pub fn as_f32(&self) -> Option<f32> {
        (self.type_ == PROTOCOL_FLOAT && self.body.len() == 4)
            .then(|| f32::from_le_bytes([self.body[0], self.body[1], self.body[2], self.body[3]]))
    }
}

/// Build both ends of an event channel.
pub fn event_channel(ring_size: usize, urids: Arc<UridTable>) -> (EventRouter, UiEndpoint) {
    let atoms = AtomUrids::new(&urids);
    let ring_size = ring_size.max(UI_HEADER + 4);
    let limit = ring_size - UI_HEADER;
    let (ui_tx, ui_rx) = byte_ring(ring_size);
    let (plugin_tx, plugin_rx) = byte_ring(ring_size);
    let connected = Arc::new(AtomicBool::new(true));

    let router = EventRouter {
        ui_events: ui_rx,
        plugin_events: plugin_tx,
        scratch: vec![0; limit].into_boxed_slice(),
        atoms,
        limit,
        connected: Arc::clone(&connected),
    };
    let endpoint = UiEndpoint {
        ui_events: ui_tx,
        plugin_events: plugin_rx,
        atoms,
        urids,
        limit,
        connected,
    };
    (router, endpoint)
}

/// Audio-thread end of the event channel.
pub struct EventRouter {
    ui_events: HeapCons<u8>,
    plugin_events: HeapProd<u8>,
    scratch: Box<[u8]>,
    atoms: AtomUrids,
    limit: usize,
    connected: Arc<AtomicBool>,
}

impl EventRouter {
    pub fn atoms(&self) -> &AtomUrids {
        &self.atoms
    }

    /// Queue a pre-serialized event for the UI. False (event dropped) if
    /// it is too large or the ring is full.
    pub fn send_to_ui(&mut self, port: u32, type_: Urid, body: &[u8]) -> bool {
        if body.len() > self.limit {
            return false;
        }
        let sent = push_record(&mut self.plugin_events, [port, type_, body.len() as u32], body);
        if !sent {
            tracing::trace!("Dropped {} byte event for UI on port {}", body.len(), port);
        }
        sent
    }

    /// Report a control output value to the UI.
    pub fn send_control_output(&mut self, port: u32, value: f32) -> bool {
        self.send_to_ui(port, PROTOCOL_FLOAT, &value.to_le_bytes())
    }

    /// Materialize queued UI events into control values and event-input
    /// buffers, all stamped at frame 0 of the coming block.
    ///
    /// An atom that does not fit in what is left of its port buffer stays
    /// queued, together with everything behind it, for the next block.
    /// Returns the number of events consumed.
    pub fn apply_ui_events(&mut self, block_size: u32, sink: &mut dyn UiEventSink) -> usize {
        if block_size == 0 {
            return 0;
        }
        let mut applied = 0;
        while let Some([port, protocol, size]) = peek_header::<3>(&self.ui_events) {
            let size = size as usize;

            if protocol == self.atoms.event_transfer {
                if let Some(buffer) = sink.event_input(port) {
                    let needed = pad8(size + ATOM_HEADER);
                    if needed <= buffer.capacity().saturating_sub(2 * ATOM_HEADER)
                        && needed > buffer.remaining()
                    {
                        break;
                    }
                }
            }

            if !pop_record::<3>(&mut self.ui_events, size, &mut self.scratch) {
                break;
            }
            applied += 1;
            let body = &self.scratch[..size.min(self.scratch.len())];

            if protocol == PROTOCOL_FLOAT {
                let value = match body {
                    [a, b, c, d, ..] => f32::from_le_bytes([*a, *b, *c, *d]),
                    _ => continue,
                };
                if !sink.set_control(port, value) {
                    tracing::trace!("UI control for unknown port {}", port);
                }
            } else if protocol == self.atoms.event_transfer {
                match sink.event_input(port) {
                    Some(buffer) => {
                        if !buffer.append_atom(0, body) {
                            tracing::warn!(
                                "Dropped {} byte UI event: larger than port {} buffer",
                                size,
                                port
                            );
                        }
                    }
                    None => tracing::trace!("UI event for unknown port {}", port),
                }
            } else {
                tracing::trace!("UI event with unknown protocol {}", protocol);
            }
        }
        applied
    }

    /// Forward every event the plugin wrote to an event output port.
    pub fn harvest_outputs(&mut self, port: u32, buffer: &AtomBuffer) -> usize {
        let event_transfer = self.atoms.event_transfer;
        let mut sent = 0;
        for event in buffer.events(&self.atoms) {
            if self.send_to_ui_raw(port, event_transfer, event.raw) {
                sent += 1;
            }
        }
        sent
    }

    fn send_to_ui_raw(&mut self, port: u32, type_: Urid, raw: &[u8]) -> bool {
        if raw.len() > self.limit {
            return false;
        }
        push_record(&mut self.plugin_events, [port, type_, raw.len() as u32], raw)
    }
}

impl Drop for EventRouter {
    fn drop(&mut self) {
        self.connected.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter").field("limit", &self.limit).finish()
    }
}

/// UI-thread end of the event channel.
pub struct UiEndpoint {
    ui_events: HeapProd<u8>,
    plugin_events: HeapCons<u8>,
    atoms: AtomUrids,
    urids: Arc<UridTable>,
    limit: usize,
    connected: Arc<AtomicBool>,
}

impl UiEndpoint {
    /// False once the plugin instance this endpoint fed has been unloaded
    /// or reloaded.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn atoms(&self) -> &AtomUrids {
        &self.atoms
    }

    pub fn urids(&self) -> &Arc<UridTable> {
        &self.urids
    }

    /// Queue a raw event for `port`: a float for [`PROTOCOL_FLOAT`], a
    /// serialized atom for the event-transfer protocol.
    pub fn ui_port_event(&mut self, port: u32, protocol: u32, body: &[u8]) -> Result<(), EventError> {
        if body.len() > self.limit {
            return Err(EventError::TooLarge {
                size: body.len(),
                limit: self.limit,
            });
        }
        if !push_record(&mut self.ui_events, [port, protocol, body.len() as u32], body) {
            tracing::debug!("UI event for port {} dropped: ring full", port);
            return Err(EventError::RingFull);
        }
        Ok(())
    }

    pub fn send_control(&mut self, port: u32, value: f32) -> Result<(), EventError> {
        self.ui_port_event(port, PROTOCOL_FLOAT, &value.to_le_bytes())
    }

    /// Send a serialized atom through the event-transfer protocol.
    pub fn send_atom(&mut self, port: u32, atom: &[u8]) -> Result<(), EventError> {
        let protocol = self.atoms.event_transfer;
        self.ui_port_event(port, protocol, atom)
    }

    /// Point the plugin at a file: one `patch:Set` of `property` to a path.
    pub fn send_file_to_plugin(
        &mut self,
        port: u32,
        property: &str,
        path: &Path,
    ) -> Result<(), EventError> {
        let property = self.urids.intern(property);
        let atom = forge_path_set(&self.atoms, property, &path.to_string_lossy());
        tracing::debug!("Sending {} to plugin port {}", path.display(), port);
        self.send_atom(port, &atom)
    }

    /// Everything the plugin sent since the last call, oldest first.
    pub fn drain_plugin_events(&mut self) -> SmallVec<[PluginEvent; 8]> {
        let mut events = SmallVec::new();
        while let Some([port, type_, size]) = peek_header::<3>(&self.plugin_events) {
            let mut body = vec![0; size as usize];
            if !pop_record::<3>(&mut self.plugin_events, size as usize, &mut body) {
                break;
            }
            events.push(PluginEvent { port, type_, body });
        }
        events
    }
}

impl std::fmt::Debug for UiEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiEndpoint")
            .field("connected", &self.is_connected())
            .finish()
    }
}
