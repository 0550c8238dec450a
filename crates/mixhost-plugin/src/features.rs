//! Host feature and option negotiation for extensible-ABI instances.
//!
//! [`HostFeatures`] owns every structure handed to a plugin at
//! instantiate time: the options array, the URID map/unmap records, the
//! legacy uri-map adapter, the worker schedule record and the
//! null-terminated feature pointer array. All of them live in boxed
//! storage so their addresses stay fixed for as long as the value lives,
//! which must be at least as long as every instance created with it.

use crate::ffi::{
    Lv2Feature, Lv2OptionsOption, Lv2UriMapFeature, Lv2UridMap, Lv2UridUnmap, Lv2WorkerSchedule,
    LV2_OPTIONS_INSTANCE,
};
use crate::uri;
use crate::urid::{well_known, Urid, UridTable};
use crate::worker::WorkScheduler;
use std::ffi::{c_char, c_void, CStr, CString};
use std::sync::Arc;

/// Block-size and rate bounds advertised to a plugin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockOptions {
    pub max_block: u32,
    pub min_block: u32,
    pub sample_rate: f64,
}

impl BlockOptions {
    pub fn new(max_block: u32, min_block: u32, sample_rate: f64) -> Self {
        Self {
            max_block,
            min_block: min_block.min(max_block),
            sample_rate,
        }
    }
}

/// Storage the options array points into. The plugin may re-read it at
/// any time, so values are updated in place.
#[repr(C)]
struct OptionValues {
    max_block: i32,
    min_block: i32,
    sample_rate: f32,
}

const OPTION_COUNT: usize = 4;

/// Features the host is able to provide, worker scheduling aside.
const PROVIDED: [&str; 6] = [
    uri::BUF_SIZE_BOUNDED_BLOCK_LENGTH,
    uri::BUF_SIZE_FIXED_BLOCK_LENGTH,
    uri::OPTIONS_OPTIONS,
    uri::URI_MAP,
    uri::URID_MAP,
    uri::URID_UNMAP,
];

pub struct HostFeatures {
    urids: Arc<UridTable>,
    block: BlockOptions,
    values: Box<OptionValues>,
    options: Box<[Lv2OptionsOption; OPTION_COUNT]>,
    // Pointed to by `features`; never read from Rust.
    _map: Box<Lv2UridMap>,
    _unmap: Box<Lv2UridUnmap>,
    _uri_map: Box<Lv2UriMapFeature>,
    _schedule: Option<Box<Lv2WorkerSchedule>>,
    scheduler: Option<WorkScheduler>,
    _uris: Vec<CString>,
    features: Box<[Lv2Feature]>,
    feature_ptrs: Box<[*const Lv2Feature]>,
}

// SAFETY: the raw pointers in HostFeatures point into its own boxed
// allocations or into the UridTable it keeps alive. The callbacks reached
// through them only take `&UridTable` (internally locked) or go through
// the scheduler's SPSC contract.
unsafe impl Send for HostFeatures {}
unsafe impl Sync for HostFeatures {}

impl HostFeatures {
    /// Build the negotiation structures for one instance.
    ///
    /// `scheduler` is supplied only when the plugin has a worker; the
    /// schedule feature is advertised iff it is present.
    pub fn negotiate(
        urids: &Arc<UridTable>,
        block: &BlockOptions,
        scheduler: Option<&WorkScheduler>,
    ) -> Self {
        let urids = Arc::clone(urids);
        let table_handle = Arc::as_ptr(&urids) as *mut c_void;

        let values = Box::new(OptionValues {
            max_block: 0,
            min_block: 0,
            sample_rate: 0.0,
        });
        let options = Box::new(option_array(&values, &urids));

        let mut map = Box::new(Lv2UridMap {
            handle: table_handle,
            map: urid_map,
        });
        let mut unmap = Box::new(Lv2UridUnmap {
            handle: table_handle,
            unmap: urid_unmap,
        });
        let mut uri_map = Box::new(Lv2UriMapFeature {
            callback_data: table_handle,
            uri_to_id,
        });
        let mut schedule = scheduler.map(|s| {
            Box::new(Lv2WorkerSchedule {
                handle: s.raw_handle(),
                schedule_work: crate::worker::schedule_work_callback,
            })
        });

        let mut uris: Vec<CString> = PROVIDED.iter().map(|u| c_string(u)).collect();
        let mut data: Vec<*mut c_void> = vec![
            std::ptr::null_mut(),
            std::ptr::null_mut(),
            options.as_ptr() as *mut c_void,
            &mut *uri_map as *mut Lv2UriMapFeature as *mut c_void,
            &mut *map as *mut Lv2UridMap as *mut c_void,
            &mut *unmap as *mut Lv2UridUnmap as *mut c_void,
        ];
        if let Some(schedule) = schedule.as_mut() {
            uris.push(c_string(uri::WORKER_SCHEDULE));
            data.push(&mut **schedule as *mut Lv2WorkerSchedule as *mut c_void);
        }

        let features: Box<[Lv2Feature]> = uris
            .iter()
            .zip(data)
            .map(|(uri, data)| Lv2Feature {
                uri: uri.as_ptr(),
                data,
            })
            .collect();
        let feature_ptrs: Box<[*const Lv2Feature]> = features
            .iter()
            .map(|f| f as *const Lv2Feature)
            .chain(std::iter::once(std::ptr::null()))
            .collect();

        let mut negotiated = Self {
            urids,
            block: *block,
            values,
            options,
            _map: map,
            _unmap: unmap,
            _uri_map: uri_map,
            _schedule: schedule,
            scheduler: scheduler.cloned(),
            _uris: uris,
            features,
            feature_ptrs,
        };
        negotiated.update(block);
        tracing::debug!(
            "Negotiated {} host features (max block {}, rate {})",
            negotiated.features.len(),
            block.max_block,
            block.sample_rate
        );
        negotiated
    }

    /// Null-terminated feature array for the instantiate call.
    pub fn feature_ptrs(&self) -> *const *const Lv2Feature {
        self.feature_ptrs.as_ptr()
    }

    /// URIs of the advertised features, in array order.
    pub fn feature_uris(&self) -> impl Iterator<Item = &str> {
        self.features.iter().filter_map(|f| {
            // SAFETY: every uri points into `_uris`, owned by self.
            unsafe { CStr::from_ptr(f.uri) }.to_str().ok()
        })
    }

    pub fn provides(&self, feature: &str) -> bool {
        self.feature_uris().any(|f| f == feature)
    }

    /// Required features this host cannot satisfy.
    pub fn missing<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .map(String::as_str)
            .filter(|f| !self.provides(f) && !IMPLICIT.contains(f))
            .collect()
    }

    /// Options array: max block, min block, sample rate, terminator.
    pub fn options(&self) -> &[Lv2OptionsOption; OPTION_COUNT] {
        &self.options
    }

    #[cfg_attr(not(feature = "lv2"), allow(dead_code))]
    pub(crate) fn options_ptr(&self) -> *const Lv2OptionsOption {
        self.options.as_ptr()
    }

    pub fn block(&self) -> BlockOptions {
        self.block
    }

    /// Rewrite the option values in place. The array itself never moves.
    pub fn update(&mut self, block: &BlockOptions) {
        self.block = *block;
        self.values.max_block = block.max_block.min(i32::MAX as u32) as i32;
        self.values.min_block = block.min_block.min(i32::MAX as u32) as i32;
        self.values.sample_rate = block.sample_rate as f32;
    }

    pub fn urids(&self) -> &Arc<UridTable> {
        &self.urids
    }

    pub fn scheduler(&self) -> Option<&WorkScheduler> {
        self.scheduler.as_ref()
    }

    pub fn max_block(&self) -> i32 {
        self.values.max_block
    }

    pub fn min_block(&self) -> i32 {
        self.values.min_block
    }

    pub fn sample_rate(&self) -> f32 {
        self.values.sample_rate
    }
}

impl std::fmt::Debug for HostFeatures {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostFeatures")
            .field("block", &self.block)
            .field("features", &self.feature_uris().collect::<Vec<_>>())
            .finish()
    }
}

/// Features a plugin may list as required that need no host data.
const IMPLICIT: [&str; 4] = [
    uri::LV2_IS_LIVE,
    uri::LV2_HARD_RT_CAPABLE,
    uri::LV2_IN_PLACE_BROKEN,
    uri::STATE_THREAD_SAFE_RESTORE,
];

fn c_string(s: &str) -> CString {
    CString::new(s).unwrap_or_default()
}

fn option_array(values: &OptionValues, urids: &UridTable) -> [Lv2OptionsOption; OPTION_COUNT] {
    let int = urids.intern(uri::ATOM_INT);
    let float = urids.intern(uri::ATOM_FLOAT);
    let entry = |key: Urid, size: usize, type_: Urid, value: *const c_void| Lv2OptionsOption {
        context: LV2_OPTIONS_INSTANCE,
        subject: 0,
        key,
        size: size as u32,
        type_,
        value,
    };
    [
        entry(
            well_known::BUF_SIZE_MAX_BLOCK_LENGTH,
            std::mem::size_of::<i32>(),
            int,
            &values.max_block as *const i32 as *const c_void,
        ),
        entry(
            well_known::BUF_SIZE_MIN_BLOCK_LENGTH,
            std::mem::size_of::<i32>(),
            int,
            &values.min_block as *const i32 as *const c_void,
        ),
        entry(
            well_known::PARAMETERS_SAMPLE_RATE,
            std::mem::size_of::<f32>(),
            float,
            &values.sample_rate as *const f32 as *const c_void,
        ),
        entry(well_known::NULL, 0, well_known::NULL, std::ptr::null()),
    ]
}

// ============================================================================
// C callbacks
// ============================================================================

unsafe extern "C" fn urid_map(handle: *mut c_void, uri: *const c_char) -> Urid {
    if handle.is_null() || uri.is_null() {
        return well_known::NULL;
    }
    // SAFETY: handle is the UridTable kept alive by the owning HostFeatures,
    // uri is a NUL-terminated string owned by the caller for this call.
    let table = unsafe { &*(handle as *const UridTable) };
    match unsafe { CStr::from_ptr(uri) }.to_str() {
        Ok(uri) => table.intern(uri),
        Err(_) => well_known::NULL,
    }
}

unsafe extern "C" fn urid_unmap(handle: *mut c_void, urid: Urid) -> *const c_char {
    if handle.is_null() {
        return std::ptr::null();
    }
    // SAFETY: see urid_map.
    let table = unsafe { &*(handle as *const UridTable) };
    table.unmap_ptr(urid)
}

unsafe extern "C" fn uri_to_id(data: *mut c_void, _map: *const c_char, uri: *const c_char) -> u32 {
    unsafe { urid_map(data, uri) }
}
