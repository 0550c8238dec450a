//! Atoms: the self-describing `{size, type, body}` values carried by
//! extensible-ABI event ports.
//!
//! Layouts (all little-endian, bodies padded to 8 bytes):
//!
//! ```text
//! atom      [size u32][type u32][body ...]
//! sequence  [size][Sequence][unit u32][pad u32] events...
//! event     [frames i64][size][type][body ...]
//! object    [size][Object][id u32][otype u32] properties...
//! property  [key u32][context u32][size][type][body ...]
//! ```

use crate::uri;
use crate::urid::{Urid, UridTable};

pub const ATOM_HEADER: usize = 8;
const SEQUENCE_BODY_HEADER: usize = 8;
const EVENT_HEADER: usize = 8 + ATOM_HEADER;

#[inline]
pub fn pad8(size: usize) -> usize {
    (size + 7) & !7
}

/// URIDs the router needs on the audio thread, interned once at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AtomUrids {
    pub sequence: Urid,
    pub chunk: Urid,
    pub event_transfer: Urid,
    pub object: Urid,
    pub float: Urid,
    pub int: Urid,
    pub path: Urid,
    pub string: Urid,
    pub urid: Urid,
    pub patch_set: Urid,
    pub patch_put: Urid,
    pub patch_property: Urid,
    pub patch_value: Urid,
    pub patch_body: Urid,
}

impl AtomUrids {
    pub fn new(table: &UridTable) -> Self {
        Self {
            sequence: table.intern(uri::ATOM_SEQUENCE),
            chunk: table.intern(uri::ATOM_CHUNK),
            event_transfer: table.intern(uri::ATOM_EVENT_TRANSFER),
            object: table.intern(uri::ATOM_OBJECT),
            float: table.intern(uri::ATOM_FLOAT),
            int: table.intern(uri::ATOM_INT),
            path: table.intern(uri::ATOM_PATH),
            string: table.intern(uri::ATOM_STRING),
            urid: table.intern(uri::ATOM_URID),
            patch_set: table.intern(uri::PATCH_SET),
            patch_put: table.intern(uri::PATCH_PUT),
            patch_property: table.intern(uri::PATCH_PROPERTY),
            patch_value: table.intern(uri::PATCH_VALUE),
            patch_body: table.intern(uri::PATCH_BODY),
        }
    }
}

/// Borrowed view of one atom.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomRef<'a> {
    pub type_: Urid,
    pub body: &'a [u8],
}

impl<'a> AtomRef<'a> {
    /// Parse the atom at the start of `bytes`.
    pub fn parse(bytes: &'a [u8]) -> Option<Self> {
        let size = read_u32(bytes, 0)? as usize;
        let type_ = read_u32(bytes, 4)?;
        let body = bytes.get(ATOM_HEADER..ATOM_HEADER + size)?;
        Some(Self { type_, body })
    }

    /// Header plus body.
    pub fn total_size(&self) -> usize {
        ATOM_HEADER + self.body.len()
    }

    pub fn as_f32(&self, urids: &AtomUrids) -> Option<f32> {
        (self.type_ == urids.float && self.body.len() >= 4)
            .then(|| f32::from_le_bytes([self.body[0], self.body[1], self.body[2], self.body[3]]))
    }

    pub fn as_urid(&self, urids: &AtomUrids) -> Option<Urid> {
        if self.type_ == urids.urid {
            read_u32(self.body, 0)
        } else {
            None
        }
    }

    /// String and path bodies, without the trailing NUL.
    pub fn as_str(&self) -> Option<&'a str> {
        let end = self.body.iter().position(|&b| b == 0).unwrap_or(self.body.len());
        std::str::from_utf8(&self.body[..end]).ok()
    }

    /// `(otype, properties)` if this atom is an object.
    pub fn as_object(&self, urids: &AtomUrids) -> Option<(Urid, Properties<'a>)> {
        if self.type_ != urids.object {
            return None;
        }
        let otype = read_u32(self.body, 4)?;
        Some((
            otype,
            Properties {
                bytes: self.body.get(8..)?,
            },
        ))
    }
}

/// Iterator over `(key, value)` pairs of an object body.
#[derive(Debug, Clone)]
pub struct Properties<'a> {
    bytes: &'a [u8],
}

impl<'a> Iterator for Properties<'a> {
    type Item = (Urid, AtomRef<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let key = read_u32(self.bytes, 0)?;
        let value = AtomRef::parse(self.bytes.get(8..)?)?;
        let advance = pad8(8 + value.total_size()).min(self.bytes.len());
        self.bytes = &self.bytes[advance..];
        Some((key, value))
    }
}

impl<'a> Properties<'a> {
    pub fn get(self, key: Urid) -> Option<AtomRef<'a>> {
        self.into_iter().find(|(k, _)| *k == key).map(|(_, v)| v)
    }
}

/// One event of a sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtomEvent<'a> {
    pub frames: i64,
    pub atom: AtomRef<'a>,
    /// The serialized atom, header included
    pub raw: &'a [u8],
}

// ============================================================================
// Forge
// ============================================================================

/// Serialize a single atom, body padded out to 8 bytes.
pub fn forge_atom(type_: Urid, body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ATOM_HEADER + pad8(body.len()));
    write_atom(&mut out, type_, body);
    out
}

pub fn forge_float(urids: &AtomUrids, value: f32) -> Vec<u8> {
    forge_atom(urids.float, &value.to_le_bytes())
}

/// `patch:Set { patch:property <property>, patch:value <value> }`.
pub fn forge_patch_set(urids: &AtomUrids, property: Urid, value_type: Urid, value: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(&0u32.to_le_bytes());
    body.extend_from_slice(&urids.patch_set.to_le_bytes());
    write_property(&mut body, urids.patch_property, urids.urid, &property.to_le_bytes());
    write_property(&mut body, urids.patch_value, value_type, value);
    forge_atom(urids.object, &body)
}

/// `patch:Set` whose value is a NUL-terminated path.
pub fn forge_path_set(urids: &AtomUrids, property: Urid, path: &str) -> Vec<u8> {
    let mut value = Vec::with_capacity(path.len() + 1);
    value.extend_from_slice(path.as_bytes());
    value.push(0);
    forge_patch_set(urids, property, urids.path, &value)
}

fn write_atom(out: &mut Vec<u8>, type_: Urid, body: &[u8]) {
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&type_.to_le_bytes());
    out.extend_from_slice(body);
    out.resize(out.len() + pad8(body.len()) - body.len(), 0);
}

fn write_property(out: &mut Vec<u8>, key: Urid, type_: Urid, body: &[u8]) {
    out.extend_from_slice(&key.to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    write_atom(out, type_, body);
}

fn read_u32(bytes: &[u8], at: usize) -> Option<u32> {
    let b = bytes.get(at..at + 4)?;
    Some(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

fn read_i64(bytes: &[u8], at: usize) -> Option<i64> {
    let b = bytes.get(at..at + 8)?;
    let mut raw = [0u8; 8];
    raw.copy_from_slice(b);
    Some(i64::from_le_bytes(raw))
}

// ============================================================================
// Port buffers
// ============================================================================

/// Plugin-visible buffer of one event port, holding a sequence atom.
///
/// Storage is `u64`-backed so the atom header is 8-byte aligned, as the
/// ABI requires. Its capacity never changes after construction, so the
/// pointer given to the plugin stays valid.
pub struct AtomBuffer {
    storage: Box<[u64]>,
    capacity: usize,
}

impl AtomBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = pad8(capacity.max(ATOM_HEADER + SEQUENCE_BODY_HEADER));
        Self {
            storage: vec![0u64; capacity / 8].into_boxed_slice(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn bytes(&self) -> &[u8] {
        // SAFETY: u64 storage reinterpreted as bytes; length in bytes is capacity.
        unsafe { std::slice::from_raw_parts(self.storage.as_ptr() as *const u8, self.capacity) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, with exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.storage.as_mut_ptr() as *mut u8, self.capacity) }
    }

    fn set_header(&mut self, size: u32, type_: Urid) {
        let bytes = self.bytes_mut();
        bytes[0..4].copy_from_slice(&size.to_le_bytes());
        bytes[4..8].copy_from_slice(&type_.to_le_bytes());
    }

    /// Empty input sequence, ready for [`append_event`](Self::append_event).
    pub fn reset_input(&mut self, urids: &AtomUrids) {
        self.set_header(SEQUENCE_BODY_HEADER as u32, urids.sequence);
        self.bytes_mut()[8..16].fill(0);
    }

    /// Output port before a run: a chunk spanning the whole buffer tells
    /// the plugin how much room it has.
    pub fn reset_output(&mut self, urids: &AtomUrids) {
        self.set_header((self.capacity - ATOM_HEADER) as u32, urids.chunk);
    }

    /// Bytes still free for events in the input sequence.
    pub fn remaining(&self) -> usize {
        let used = ATOM_HEADER + read_u32(self.bytes(), 0).unwrap_or(0) as usize;
        self.capacity.saturating_sub(used)
    }

    /// Append one event. Returns false, writing nothing, when it does not fit.
    pub fn append_event(&mut self, frames: i64, type_: Urid, body: &[u8]) -> bool {
        let needed = pad8(EVENT_HEADER + body.len());
        if needed > self.remaining() {
            return false;
        }
        let seq_size = read_u32(self.bytes(), 0).unwrap_or(0) as usize;
        let at = ATOM_HEADER + seq_size;
        let bytes = self.bytes_mut();
        bytes[at..at + 8].copy_from_slice(&frames.to_le_bytes());
        bytes[at + 8..at + 12].copy_from_slice(&(body.len() as u32).to_le_bytes());
        bytes[at + 12..at + 16].copy_from_slice(&type_.to_le_bytes());
        bytes[at + EVENT_HEADER..at + EVENT_HEADER + body.len()].copy_from_slice(body);
        bytes[at + EVENT_HEADER + body.len()..at + needed].fill(0);
        let new_size = (seq_size + needed) as u32;
        bytes[0..4].copy_from_slice(&new_size.to_le_bytes());
        true
    }

    /// Append a complete serialized atom as one event.
    pub fn append_atom(&mut self, frames: i64, atom: &[u8]) -> bool {
        match AtomRef::parse(atom) {
            Some(atom) => self.append_event(frames, atom.type_, atom.body),
            None => false,
        }
    }

    /// The whole buffer as one atom (header and body).
    pub fn atom(&self) -> Option<AtomRef<'_>> {
        AtomRef::parse(self.bytes())
    }

    /// Events of the sequence the plugin (or the host) wrote. Empty if the
    /// buffer does not hold a sequence.
    pub fn events<'a>(&'a self, urids: &AtomUrids) -> Events<'a> {
        let body = match self.atom() {
            Some(atom) if atom.type_ == urids.sequence => {
                atom.body.get(SEQUENCE_BODY_HEADER..).unwrap_or(&[])
            }
            _ => &[],
        };
        Events { bytes: body }
    }

    pub fn as_mut_ptr(&mut self) -> *mut std::ffi::c_void {
        self.storage.as_mut_ptr() as *mut std::ffi::c_void
    }
}

impl std::fmt::Debug for AtomBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtomBuffer")
            .field("capacity", &self.capacity)
            .field("remaining", &self.remaining())
            .finish()
    }
}

pub struct Events<'a> {
    bytes: &'a [u8],
}

impl<'a> Iterator for Events<'a> {
    type Item = AtomEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let frames = read_i64(self.bytes, 0)?;
        let atom = AtomRef::parse(self.bytes.get(8..)?)?;
        let raw = &self.bytes[8..8 + atom.total_size()];
        let advance = pad8(8 + atom.total_size()).min(self.bytes.len());
        self.bytes = &self.bytes[advance..];
        Some(AtomEvent { frames, atom, raw })
    }
}
