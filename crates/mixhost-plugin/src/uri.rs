//! Stable URI strings of the extensible plugin ABI.

pub const ATOM_BOOL: &str = "http://lv2plug.in/ns/ext/atom#Bool";
pub const ATOM_DOUBLE: &str = "http://lv2plug.in/ns/ext/atom#Double";
pub const ATOM_INT: &str = "http://lv2plug.in/ns/ext/atom#Int";
pub const ATOM_FLOAT: &str = "http://lv2plug.in/ns/ext/atom#Float";
pub const ATOM_LONG: &str = "http://lv2plug.in/ns/ext/atom#Long";
pub const ATOM_SEQUENCE: &str = "http://lv2plug.in/ns/ext/atom#Sequence";
pub const ATOM_CHUNK: &str = "http://lv2plug.in/ns/ext/atom#Chunk";
pub const ATOM_EVENT_TRANSFER: &str = "http://lv2plug.in/ns/ext/atom#eventTransfer";
pub const ATOM_OBJECT: &str = "http://lv2plug.in/ns/ext/atom#Object";
pub const ATOM_PATH: &str = "http://lv2plug.in/ns/ext/atom#Path";
pub const ATOM_STRING: &str = "http://lv2plug.in/ns/ext/atom#String";
pub const ATOM_URID: &str = "http://lv2plug.in/ns/ext/atom#URID";
pub const ATOM_PORT: &str = "http://lv2plug.in/ns/ext/atom#AtomPort";

pub const BUF_SIZE_BOUNDED_BLOCK_LENGTH: &str =
    "http://lv2plug.in/ns/ext/buf-size#boundedBlockLength";
pub const BUF_SIZE_FIXED_BLOCK_LENGTH: &str = "http://lv2plug.in/ns/ext/buf-size#fixedBlockLength";
pub const BUF_SIZE_MAX_BLOCK_LENGTH: &str = "http://lv2plug.in/ns/ext/buf-size#maxBlockLength";
pub const BUF_SIZE_MIN_BLOCK_LENGTH: &str = "http://lv2plug.in/ns/ext/buf-size#minBlockLength";

pub const PARAMETERS_SAMPLE_RATE: &str = "http://lv2plug.in/ns/ext/parameters#sampleRate";

pub const OPTIONS_OPTIONS: &str = "http://lv2plug.in/ns/ext/options#options";
pub const OPTIONS_INTERFACE: &str = "http://lv2plug.in/ns/ext/options#interface";

/// Deprecated predecessor of URID mapping, served by the same table.
pub const URI_MAP: &str = "http://lv2plug.in/ns/ext/uri-map";
pub const URID_MAP: &str = "http://lv2plug.in/ns/ext/urid#map";
pub const URID_UNMAP: &str = "http://lv2plug.in/ns/ext/urid#unmap";

pub const WORKER_SCHEDULE: &str = "http://lv2plug.in/ns/ext/worker#schedule";
pub const WORKER_INTERFACE: &str = "http://lv2plug.in/ns/ext/worker#interface";

pub const STATE_INTERFACE: &str = "http://lv2plug.in/ns/ext/state#interface";
pub const STATE_THREAD_SAFE_RESTORE: &str = "http://lv2plug.in/ns/ext/state#threadSafeRestore";

pub const PATCH_SET: &str = "http://lv2plug.in/ns/ext/patch#Set";
pub const PATCH_PUT: &str = "http://lv2plug.in/ns/ext/patch#Put";
pub const PATCH_PROPERTY: &str = "http://lv2plug.in/ns/ext/patch#property";
pub const PATCH_VALUE: &str = "http://lv2plug.in/ns/ext/patch#value";
pub const PATCH_BODY: &str = "http://lv2plug.in/ns/ext/patch#body";

pub const PRESETS_PRESET: &str = "http://lv2plug.in/ns/ext/presets#Preset";

pub const LV2_IS_LIVE: &str = "http://lv2plug.in/ns/lv2core#isLive";
pub const LV2_REPORTS_LATENCY: &str = "http://lv2plug.in/ns/lv2core#reportsLatency";
pub const LV2_HARD_RT_CAPABLE: &str = "http://lv2plug.in/ns/lv2core#hardRTCapable";
pub const LV2_IN_PLACE_BROKEN: &str = "http://lv2plug.in/ns/lv2core#inPlaceBroken";
