//! C layouts of the two plugin ABIs.
//!
//! Only the parts the host touches are declared. Field order and widths
//! follow the ABI headers exactly; everything here is `#[repr(C)]`.

#![allow(dead_code)]

use std::ffi::{c_char, c_int, c_ulong, c_void};

// ============================================================================
// Simple ABI (LADSPA)
// ============================================================================

pub type LadspaHandle = *mut c_void;

pub const LADSPA_PORT_INPUT: c_int = 0x1;
pub const LADSPA_PORT_OUTPUT: c_int = 0x2;
pub const LADSPA_PORT_CONTROL: c_int = 0x4;
pub const LADSPA_PORT_AUDIO: c_int = 0x8;

pub const LADSPA_HINT_BOUNDED_BELOW: c_int = 0x1;
pub const LADSPA_HINT_BOUNDED_ABOVE: c_int = 0x2;
pub const LADSPA_HINT_TOGGLED: c_int = 0x4;
pub const LADSPA_HINT_SAMPLE_RATE: c_int = 0x8;
pub const LADSPA_HINT_LOGARITHMIC: c_int = 0x10;
pub const LADSPA_HINT_INTEGER: c_int = 0x20;
pub const LADSPA_HINT_DEFAULT_MASK: c_int = 0x3C0;
pub const LADSPA_HINT_DEFAULT_NONE: c_int = 0x0;
pub const LADSPA_HINT_DEFAULT_MINIMUM: c_int = 0x40;
pub const LADSPA_HINT_DEFAULT_LOW: c_int = 0x80;
pub const LADSPA_HINT_DEFAULT_MIDDLE: c_int = 0xC0;
pub const LADSPA_HINT_DEFAULT_HIGH: c_int = 0x100;
pub const LADSPA_HINT_DEFAULT_MAXIMUM: c_int = 0x140;
pub const LADSPA_HINT_DEFAULT_0: c_int = 0x200;
pub const LADSPA_HINT_DEFAULT_1: c_int = 0x240;
pub const LADSPA_HINT_DEFAULT_100: c_int = 0x280;
pub const LADSPA_HINT_DEFAULT_440: c_int = 0x2C0;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LadspaPortRangeHint {
    pub hint_descriptor: c_int,
    pub lower_bound: f32,
    pub upper_bound: f32,
}

#[repr(C)]
pub struct LadspaDescriptor {
    pub unique_id: c_ulong,
    pub label: *const c_char,
    pub properties: c_int,
    pub name: *const c_char,
    pub maker: *const c_char,
    pub copyright: *const c_char,
    pub port_count: c_ulong,
    pub port_descriptors: *const c_int,
    pub port_names: *const *const c_char,
    pub port_range_hints: *const LadspaPortRangeHint,
    pub implementation_data: *mut c_void,
    pub instantiate:
        Option<unsafe extern "C" fn(descriptor: *const LadspaDescriptor, rate: c_ulong) -> LadspaHandle>,
    pub connect_port:
        Option<unsafe extern "C" fn(instance: LadspaHandle, port: c_ulong, data: *mut f32)>,
    pub activate: Option<unsafe extern "C" fn(instance: LadspaHandle)>,
    pub run: Option<unsafe extern "C" fn(instance: LadspaHandle, sample_count: c_ulong)>,
    pub run_adding: Option<unsafe extern "C" fn(instance: LadspaHandle, sample_count: c_ulong)>,
    pub set_run_adding_gain: Option<unsafe extern "C" fn(instance: LadspaHandle, gain: f32)>,
    pub deactivate: Option<unsafe extern "C" fn(instance: LadspaHandle)>,
    pub cleanup: Option<unsafe extern "C" fn(instance: LadspaHandle)>,
}

pub type LadspaDescriptorFn = unsafe extern "C" fn(index: c_ulong) -> *const LadspaDescriptor;

pub const LADSPA_DESCRIPTOR_SYMBOL: &[u8] = b"ladspa_descriptor\0";

// ============================================================================
// Extensible ABI (LV2)
// ============================================================================

pub type Lv2Handle = *mut c_void;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Lv2Feature {
    pub uri: *const c_char,
    pub data: *mut c_void,
}

#[repr(C)]
pub struct Lv2Descriptor {
    pub uri: *const c_char,
    pub instantiate: Option<
        unsafe extern "C" fn(
            descriptor: *const Lv2Descriptor,
            sample_rate: f64,
            bundle_path: *const c_char,
            features: *const *const Lv2Feature,
        ) -> Lv2Handle,
    >,
    pub connect_port: Option<unsafe extern "C" fn(instance: Lv2Handle, port: u32, data: *mut c_void)>,
    pub activate: Option<unsafe extern "C" fn(instance: Lv2Handle)>,
    pub run: Option<unsafe extern "C" fn(instance: Lv2Handle, sample_count: u32)>,
    pub deactivate: Option<unsafe extern "C" fn(instance: Lv2Handle)>,
    pub cleanup: Option<unsafe extern "C" fn(instance: Lv2Handle)>,
    pub extension_data: Option<unsafe extern "C" fn(uri: *const c_char) -> *const c_void>,
}

pub type Lv2DescriptorFn = unsafe extern "C" fn(index: u32) -> *const Lv2Descriptor;

pub const LV2_DESCRIPTOR_SYMBOL: &[u8] = b"lv2_descriptor\0";

#[repr(C)]
pub struct Lv2UridMap {
    pub handle: *mut c_void,
    pub map: unsafe extern "C" fn(handle: *mut c_void, uri: *const c_char) -> u32,
}

#[repr(C)]
pub struct Lv2UridUnmap {
    pub handle: *mut c_void,
    pub unmap: unsafe extern "C" fn(handle: *mut c_void, urid: u32) -> *const c_char,
}

#[repr(C)]
pub struct Lv2UriMapFeature {
    pub callback_data: *mut c_void,
    pub uri_to_id:
        unsafe extern "C" fn(data: *mut c_void, map: *const c_char, uri: *const c_char) -> u32,
}

pub const LV2_OPTIONS_INSTANCE: u32 = 0;

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct Lv2OptionsOption {
    pub context: u32,
    pub subject: u32,
    pub key: u32,
    pub size: u32,
    pub type_: u32,
    pub value: *const c_void,
}

#[repr(C)]
pub struct Lv2OptionsInterface {
    pub get: Option<unsafe extern "C" fn(instance: Lv2Handle, options: *mut Lv2OptionsOption) -> u32>,
    pub set:
        Option<unsafe extern "C" fn(instance: Lv2Handle, options: *const Lv2OptionsOption) -> u32>,
}

pub const LV2_WORKER_SUCCESS: u32 = 0;
pub const LV2_WORKER_ERR_UNKNOWN: u32 = 1;
pub const LV2_WORKER_ERR_NO_SPACE: u32 = 2;

#[repr(C)]
pub struct Lv2WorkerSchedule {
    pub handle: *mut c_void,
    pub schedule_work:
        unsafe extern "C" fn(handle: *mut c_void, size: u32, data: *const c_void) -> u32,
}

pub type Lv2WorkerRespondFn =
    unsafe extern "C" fn(handle: *mut c_void, size: u32, data: *const c_void) -> u32;

#[repr(C)]
pub struct Lv2WorkerInterface {
    pub work: Option<
        unsafe extern "C" fn(
            instance: Lv2Handle,
            respond: Lv2WorkerRespondFn,
            respond_handle: *mut c_void,
            size: u32,
            data: *const c_void,
        ) -> u32,
    >,
    pub work_response:
        Option<unsafe extern "C" fn(instance: Lv2Handle, size: u32, body: *const c_void) -> u32>,
    pub end_run: Option<unsafe extern "C" fn(instance: Lv2Handle) -> u32>,
}

pub const LV2_STATE_SUCCESS: u32 = 0;
pub const LV2_STATE_ERR_UNKNOWN: u32 = 1;
pub const LV2_STATE_ERR_NO_PROPERTY: u32 = 5;
pub const LV2_STATE_IS_POD: u32 = 1;
pub const LV2_STATE_IS_PORTABLE: u32 = 2;

pub type Lv2StateStoreFn = unsafe extern "C" fn(
    handle: *mut c_void,
    key: u32,
    value: *const c_void,
    size: usize,
    type_: u32,
    flags: u32,
) -> u32;

pub type Lv2StateRetrieveFn = unsafe extern "C" fn(
    handle: *mut c_void,
    key: u32,
    size: *mut usize,
    type_: *mut u32,
    flags: *mut u32,
) -> *const c_void;

#[repr(C)]
pub struct Lv2StateInterface {
    pub save: Option<
        unsafe extern "C" fn(
            instance: Lv2Handle,
            store: Lv2StateStoreFn,
            handle: *mut c_void,
            flags: u32,
            features: *const *const Lv2Feature,
        ) -> u32,
    >,
    pub restore: Option<
        unsafe extern "C" fn(
            instance: Lv2Handle,
            retrieve: Lv2StateRetrieveFn,
            handle: *mut c_void,
            flags: u32,
            features: *const *const Lv2Feature,
        ) -> u32,
    >,
}
