//! URI interning table.
//!
//! Maps URI strings to small integers ("URIDs") so that real-time code can
//! compare types by integer equality. The table is append-only: once a URI
//! has an id, that id and the string storage behind it stay valid for the
//! lifetime of the table. The C-facing unmap callback hands out pointers
//! into each entry's own heap allocation, so growth of the index never
//! moves a string a plugin may still hold.
//!
//! Id 0 is reserved for "unmapped" and is never handed out.

use crate::uri;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::ffi::{c_char, CStr, CString};
use std::sync::Arc;

pub type Urid = u32;

/// Ids pre-registered at construction, in registration order.
pub mod well_known {
    use super::Urid;

    pub const NULL: Urid = 0;
    pub const ATOM_BOOL: Urid = 1;
    pub const ATOM_DOUBLE: Urid = 2;
    pub const ATOM_INT: Urid = 3;
    pub const ATOM_FLOAT: Urid = 4;
    pub const ATOM_LONG: Urid = 5;
    pub const BUF_SIZE_MAX_BLOCK_LENGTH: Urid = 6;
    pub const BUF_SIZE_MIN_BLOCK_LENGTH: Urid = 7;
    pub const PARAMETERS_SAMPLE_RATE: Urid = 8;

    // Only reserved when the deferred-work capability is enabled.
    pub const ATOM_SEQUENCE: Urid = 9;
    pub const ATOM_CHUNK: Urid = 10;
    pub const ATOM_EVENT_TRANSFER: Urid = 11;
    pub const PATCH_SET: Urid = 12;
    pub const PATCH_PUT: Urid = 13;
}

const BASE_URIS: [&str; 8] = [
    uri::ATOM_BOOL,
    uri::ATOM_DOUBLE,
    uri::ATOM_INT,
    uri::ATOM_FLOAT,
    uri::ATOM_LONG,
    uri::BUF_SIZE_MAX_BLOCK_LENGTH,
    uri::BUF_SIZE_MIN_BLOCK_LENGTH,
    uri::PARAMETERS_SAMPLE_RATE,
];

const WORKER_URIS: [&str; 5] = [
    uri::ATOM_SEQUENCE,
    uri::ATOM_CHUNK,
    uri::ATOM_EVENT_TRANSFER,
    uri::PATCH_SET,
    uri::PATCH_PUT,
];

struct Entry {
    uri: Arc<str>,
    c_uri: Box<CStr>,
}

#[derive(Default)]
struct Inner {
    by_uri: HashMap<Arc<str>, Urid>,
    entries: Vec<Entry>,
}

impl Inner {
    fn push(&mut self, uri: &str) -> Urid {
        let Ok(c_uri) = CString::new(uri) else {
            tracing::warn!("Refusing to map URI containing a NUL byte: {:?}", uri);
            return well_known::NULL;
        };
        let uri: Arc<str> = Arc::from(uri);
        self.entries.push(Entry {
            uri: Arc::clone(&uri),
            c_uri: c_uri.into_boxed_c_str(),
        });
        let id = self.entries.len() as Urid;
        self.by_uri.insert(uri, id);
        id
    }
}

/// Bidirectional URI <-> URID map owned by one plugin instance.
pub struct UridTable {
    inner: RwLock<Inner>,
    reserved: usize,
}

impl UridTable {
    /// Create a table seeded with the well-known URIs.
    ///
    /// The sequence/chunk/event-transfer/patch ids are only reserved when
    /// `worker_enabled` is set; otherwise they are interned on demand.
    pub fn new(worker_enabled: bool) -> Self {
        let mut inner = Inner::default();
        for uri in BASE_URIS {
            inner.push(uri);
        }
        if worker_enabled {
            for uri in WORKER_URIS {
                inner.push(uri);
            }
        }
        let reserved = inner.entries.len();
        Self {
            inner: RwLock::new(inner),
            reserved,
        }
    }

    /// Return the id for `uri`, assigning the next free id on first sight.
    ///
    /// Not for the audio thread: a new URI takes the write lock.
    pub fn intern(&self, uri: &str) -> Urid {
        if uri.is_empty() {
            return well_known::NULL;
        }
        if let Some(&id) = self.inner.read().by_uri.get(uri) {
            return id;
        }
        let mut inner = self.inner.write();
        // Another thread may have won the race between the two locks.
        if let Some(&id) = inner.by_uri.get(uri) {
            return id;
        }
        let id = inner.push(uri);
        tracing::trace!("Mapped {} -> {}", uri, id);
        id
    }

    /// Inverse of [`intern`](Self::intern). `None` for 0 and unknown ids.
    pub fn lookup(&self, id: Urid) -> Option<Arc<str>> {
        if id == well_known::NULL {
            return None;
        }
        let inner = self.inner.read();
        inner
            .entries
            .get(id as usize - 1)
            .map(|entry| Arc::clone(&entry.uri))
    }

    /// Id of an already-mapped URI without growing the table.
    pub fn get(&self, uri: &str) -> Option<Urid> {
        self.inner.read().by_uri.get(uri).copied()
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.get(uri).is_some()
    }

    /// Number of mapped URIs (id 0 excluded).
    pub fn len(&self) -> usize {
        self.inner.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of ids pre-registered at construction.
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    /// URIs mapped after construction, in id order.
    pub fn dynamic_uris(&self) -> Vec<Arc<str>> {
        let inner = self.inner.read();
        inner.entries[self.reserved..]
            .iter()
            .map(|entry| Arc::clone(&entry.uri))
            .collect()
    }

    /// NUL-terminated string for `id`, or null.
    ///
    /// The pointer stays valid for the lifetime of the table: entries are
    /// never removed and each string owns its own allocation.
    pub(crate) fn unmap_ptr(&self, id: Urid) -> *const c_char {
        if id == well_known::NULL {
            return std::ptr::null();
        }
        let inner = self.inner.read();
        inner
            .entries
            .get(id as usize - 1)
            .map_or(std::ptr::null(), |entry| entry.c_uri.as_ptr())
    }
}

impl std::fmt::Debug for UridTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UridTable")
            .field("len", &self.len())
            .field("reserved", &self.reserved)
            .finish()
    }
}
