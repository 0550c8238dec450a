//! Deferred work: non-real-time jobs requested from a plugin's run call.
//!
//! ```text
//! audio thread                          worker context
//! ------------                          --------------
//! run() -> schedule_work(bytes)
//!   push [len][bytes] -> requests ----> wake -> step()
//!                                         work_lock { handler.work() }
//!                         responses <---- respond(bytes)
//! next block:
//!   emit_responses() -> handler.work_response()
//!   run()
//!   end_run()
//! ```
//!
//! Both rings are fixed-capacity SPSC byte rings. The audio thread only
//! ever pushes and signals, and only `try_lock`s the work lock: when the
//! worker holds it, responses and `end_run` wait for a later block.
//! A full ring rejects the record and leaves earlier records untouched.

use crate::error::WorkerError;
use crate::ffi::{LV2_WORKER_ERR_NO_SPACE, LV2_WORKER_ERR_UNKNOWN, LV2_WORKER_SUCCESS};
use crate::ring::{byte_ring, peek_header, pop_record, push_record};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::{Mutex, MutexGuard};
use ringbuf::traits::Consumer;
use ringbuf::{HeapCons, HeapProd};
use std::cell::UnsafeCell;
use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle};

/// Header word marking the exit request pushed on shutdown.
const EXIT: u32 = u32::MAX;

const HEADER: usize = 4;

/// Plugin side of deferred work.
///
/// Calls into `work` are serialized by the work lock. `work_response`
/// and `end_run` are only ever called from the audio thread.
pub trait WorkHandler: Send + Sync {
    /// Do the job described by `data`, replying through `respond`.
    fn work(&self, respond: &mut Responder<'_>, data: &[u8]) -> Result<(), WorkerError>;

    /// Receive one reply produced by `work`.
    fn work_response(&self, data: &[u8]) -> Result<(), WorkerError>;

    /// Called once per block after the plugin ran.
    fn end_run(&self) {}
}

/// Lifecycle of a [`DeferredWork`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    Idle = 0,
    /// Handler bound, worker thread launched but not yet waiting
    Armed = 1,
    Running = 2,
    Draining = 3,
    Stopped = 4,
}

impl WorkerState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => WorkerState::Armed,
            2 => WorkerState::Running,
            3 => WorkerState::Draining,
            4 => WorkerState::Stopped,
            _ => WorkerState::Idle,
        }
    }
}

/// Reply channel handed to [`WorkHandler::work`].
pub struct Responder<'a> {
    prod: &'a mut HeapProd<u8>,
    queued: &'a AtomicUsize,
    limit: usize,
}

impl Responder<'_> {
    /// Queue one reply for the next block. Fails without blocking when the
    /// response ring is full.
    pub fn respond(&mut self, data: &[u8]) -> Result<(), WorkerError> {
        if data.len() > self.limit {
            return Err(WorkerError::PayloadTooLarge {
                size: data.len(),
                limit: self.limit,
            });
        }
        // Counted before publishing so the consumer never sees it go below zero.
        self.queued.fetch_add(1, Ordering::AcqRel);
        if !push_record(self.prod, [data.len() as u32], data) {
            self.queued.fetch_sub(1, Ordering::AcqRel);
            tracing::warn!("Worker response of {} bytes dropped: ring full", data.len());
            return Err(WorkerError::RingFull);
        }
        Ok(())
    }

    #[cfg_attr(not(feature = "lv2"), allow(dead_code))]
    pub(crate) fn as_handle(&mut self) -> *mut c_void {
        self as *mut Responder<'_> as *mut c_void
    }
}

/// `LV2_Worker_Respond_Function` over a [`Responder`].
#[cfg_attr(not(feature = "lv2"), allow(dead_code))]
pub(crate) unsafe extern "C" fn respond_callback(
    handle: *mut c_void,
    size: u32,
    data: *const c_void,
) -> u32 {
    if handle.is_null() {
        return LV2_WORKER_ERR_UNKNOWN;
    }
    // SAFETY: handle comes from Responder::as_handle for the duration of
    // the work() call that received it.
    let responder = unsafe { &mut *(handle as *mut Responder<'_>) };
    let data = unsafe { payload(size, data) };
    status(responder.respond(data))
}

/// `LV2_Worker_Schedule_Function` over a [`WorkScheduler`].
pub(crate) unsafe extern "C" fn schedule_work_callback(
    handle: *mut c_void,
    size: u32,
    data: *const c_void,
) -> u32 {
    if handle.is_null() {
        return LV2_WORKER_ERR_UNKNOWN;
    }
    // SAFETY: handle is the WorkerShared kept alive by the HostFeatures
    // that advertised it.
    let shared = unsafe { &*(handle as *const WorkerShared) };
    let data = unsafe { payload(size, data) };
    status(shared.schedule(data))
}

unsafe fn payload<'a>(size: u32, data: *const c_void) -> &'a [u8] {
    if data.is_null() || size == 0 {
        return &[];
    }
    unsafe { std::slice::from_raw_parts(data as *const u8, size as usize) }
}

fn status(result: Result<(), WorkerError>) -> u32 {
    match result {
        Ok(()) => LV2_WORKER_SUCCESS,
        Err(WorkerError::RingFull | WorkerError::PayloadTooLarge { .. }) => LV2_WORKER_ERR_NO_SPACE,
        Err(_) => LV2_WORKER_ERR_UNKNOWN,
    }
}

/// State shared between the audio thread and the worker context.
///
/// Ring ends are in UnsafeCells: each end has exactly one user.
/// - `requests_tx`: audio thread (schedule)
/// - `requests_rx`, `request_buf`: worker context (step)
/// - `responses_tx`: worker context, or the scheduling thread when synchronous
/// - `responses_rx`, `response_buf`: audio thread (emit_responses)
pub struct WorkerShared {
    requests_tx: UnsafeCell<HeapProd<u8>>,
    requests_rx: UnsafeCell<HeapCons<u8>>,
    responses_tx: UnsafeCell<HeapProd<u8>>,
    responses_rx: UnsafeCell<HeapCons<u8>>,
    request_buf: UnsafeCell<Vec<u8>>,
    response_buf: UnsafeCell<Vec<u8>>,
    requests_queued: AtomicUsize,
    responses_queued: AtomicUsize,
    wake_tx: Sender<()>,
    wake_rx: Receiver<()>,
    work_lock: Mutex<()>,
    handler: OnceLock<Arc<dyn WorkHandler>>,
    state: AtomicU8,
    exiting: AtomicBool,
    synchronous: bool,
    limit: usize,
}

// SAFETY: every UnsafeCell above has a single user thread, listed on the
// struct. Everything else is atomics, channels or locks.
unsafe impl Send for WorkerShared {}
unsafe impl Sync for WorkerShared {}

impl WorkerShared {
    fn new(ring_size: usize, synchronous: bool) -> Self {
        let ring_size = ring_size.max(HEADER + 1);
        let limit = ring_size - HEADER;
        let (requests_tx, requests_rx) = byte_ring(ring_size);
        let (responses_tx, responses_rx) = byte_ring(ring_size);
        // One wake per queued record at most.
        let (wake_tx, wake_rx) = crossbeam_channel::bounded(ring_size / HEADER);
        Self {
            requests_tx: UnsafeCell::new(requests_tx),
            requests_rx: UnsafeCell::new(requests_rx),
            responses_tx: UnsafeCell::new(responses_tx),
            responses_rx: UnsafeCell::new(responses_rx),
            request_buf: UnsafeCell::new(vec![0; limit]),
            response_buf: UnsafeCell::new(vec![0; limit]),
            requests_queued: AtomicUsize::new(0),
            responses_queued: AtomicUsize::new(0),
            wake_tx,
            wake_rx,
            work_lock: Mutex::new(()),
            handler: OnceLock::new(),
            state: AtomicU8::new(WorkerState::Idle as u8),
            exiting: AtomicBool::new(false),
            synchronous,
            limit,
        }
    }

    fn state(&self) -> WorkerState {
        WorkerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: WorkerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Audio thread.
    fn schedule(&self, data: &[u8]) -> Result<(), WorkerError> {
        if self.exiting.load(Ordering::Acquire) {
            return Err(WorkerError::Exiting);
        }
        if data.len() > self.limit {
            return Err(WorkerError::PayloadTooLarge {
                size: data.len(),
                limit: self.limit,
            });
        }

        if self.synchronous {
            let handler = self.handler.get().ok_or(WorkerError::NoWorker)?;
            let _guard = self.work_lock.try_lock().ok_or(WorkerError::Busy)?;
            // SAFETY: in synchronous mode the scheduling thread is the only
            // response producer.
            let prod = unsafe { &mut *self.responses_tx.get() };
            let mut responder = Responder {
                prod,
                queued: &self.responses_queued,
                limit: self.limit,
            };
            return handler.work(&mut responder, data);
        }

        // SAFETY: the audio thread is the only request producer.
        let prod = unsafe { &mut *self.requests_tx.get() };
        self.requests_queued.fetch_add(1, Ordering::AcqRel);
        if !push_record(prod, [data.len() as u32], data) {
            self.requests_queued.fetch_sub(1, Ordering::AcqRel);
            tracing::trace!("Work request of {} bytes dropped: ring full", data.len());
            return Err(WorkerError::RingFull);
        }
        let _ = self.wake_tx.try_send(());
        Ok(())
    }

    /// Worker context. Handles every complete request, returns how many.
    fn run_pending(&self) -> usize {
        let Some(handler) = self.handler.get() else {
            return 0;
        };
        // SAFETY: the worker context is the only request consumer and, when
        // threaded, the only response producer.
        let requests = unsafe { &mut *self.requests_rx.get() };
        let responses = unsafe { &mut *self.responses_tx.get() };
        let buf = unsafe { &mut *self.request_buf.get() };

        let mut handled = 0;
        while let Some([size]) = peek_header::<1>(requests) {
            if size == EXIT {
                requests.skip(HEADER);
                self.requests_queued.fetch_sub(1, Ordering::AcqRel);
                self.exiting.store(true, Ordering::Release);
                break;
            }
            let size = size as usize;
            if !pop_record::<1>(requests, size, buf) {
                break;
            }
            self.requests_queued.fetch_sub(1, Ordering::AcqRel);

            let _guard = self.work_lock.lock();
            let mut responder = Responder {
                prod: &mut *responses,
                queued: &self.responses_queued,
                limit: self.limit,
            };
            if let Err(e) = handler.work(&mut responder, &buf[..size.min(buf.len())]) {
                tracing::warn!("Plugin work handler failed: {}", e);
            }
            handled += 1;
        }
        handled
    }

    /// Audio thread.
    fn emit_responses(&self) -> usize {
        let Some(handler) = self.handler.get() else {
            return 0;
        };
        let Some(_guard) = self.work_lock.try_lock() else {
            tracing::trace!("Work lock busy, responses wait for the next block");
            return 0;
        };
        // SAFETY: the audio thread is the only response consumer.
        let responses = unsafe { &mut *self.responses_rx.get() };
        let buf = unsafe { &mut *self.response_buf.get() };

        let mut delivered = 0;
        while let Some([size]) = peek_header::<1>(responses) {
            let size = size as usize;
            if !pop_record::<1>(responses, size, buf) {
                break;
            }
            self.responses_queued.fetch_sub(1, Ordering::AcqRel);
            if let Err(e) = handler.work_response(&buf[..size.min(buf.len())]) {
                tracing::trace!("Plugin rejected work response: {}", e);
            }
            delivered += 1;
        }
        delivered
    }

    /// Audio thread. Skipped for this block if the lock is busy.
    fn end_run(&self) {
        let Some(handler) = self.handler.get() else {
            return;
        };
        match self.work_lock.try_lock() {
            Some(_guard) => handler.end_run(),
            None => tracing::trace!("Work lock busy, end_run skipped"),
        }
    }
}

fn worker_loop(shared: Arc<WorkerShared>) {
    shared.set_state(WorkerState::Running);
    tracing::debug!("Plugin worker thread started");
    while shared.wake_rx.recv().is_ok() {
        shared.run_pending();
        if shared.exiting.load(Ordering::Acquire) {
            break;
        }
    }
    tracing::debug!("Plugin worker thread exiting");
}

/// Audio-thread handle for queueing work. Cloned into the host feature
/// array and into each block's run context.
#[derive(Clone)]
pub struct WorkScheduler {
    shared: Arc<WorkerShared>,
}

impl WorkScheduler {
    /// Queue `data` for the worker (or run it inline in synchronous mode).
    ///
    /// Must only be called from the thread that runs the plugin.
    pub fn schedule_work(&self, data: &[u8]) -> Result<(), WorkerError> {
        self.shared.schedule(data)
    }

    pub(crate) fn raw_handle(&self) -> *mut c_void {
        Arc::as_ptr(&self.shared) as *mut c_void
    }
}

impl std::fmt::Debug for WorkScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkScheduler")
            .field("synchronous", &self.shared.synchronous)
            .finish()
    }
}

/// Deferred-work capability of one plugin instance, selected at load time.
pub enum DeferredWork {
    /// The plugin has no worker.
    None,
    /// Work runs inline inside `schedule_work`.
    Synchronous(Arc<WorkerShared>),
    /// Work runs on a dedicated thread, or on whoever calls [`step`](Self::step).
    Threaded {
        shared: Arc<WorkerShared>,
        thread: Option<JoinHandle<()>>,
    },
}

impl DeferredWork {
    pub fn none() -> Self {
        DeferredWork::None
    }

    pub fn synchronous(ring_size: usize) -> Self {
        DeferredWork::Synchronous(Arc::new(WorkerShared::new(ring_size, true)))
    }

    pub fn threaded(ring_size: usize) -> Self {
        DeferredWork::Threaded {
            shared: Arc::new(WorkerShared::new(ring_size, false)),
            thread: None,
        }
    }

    fn shared(&self) -> Option<&Arc<WorkerShared>> {
        match self {
            DeferredWork::None => None,
            DeferredWork::Synchronous(shared) => Some(shared),
            DeferredWork::Threaded { shared, .. } => Some(shared),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, DeferredWork::None)
    }

    pub fn is_threaded(&self) -> bool {
        matches!(self, DeferredWork::Threaded { .. })
    }

    pub fn scheduler(&self) -> Option<WorkScheduler> {
        self.shared().map(|shared| WorkScheduler {
            shared: Arc::clone(shared),
        })
    }

    /// Bind the plugin's handler and start the worker context.
    ///
    /// With `spawn_thread` off a threaded worker is driven by [`step`](Self::step).
    pub fn start(&mut self, handler: Arc<dyn WorkHandler>, spawn_thread: bool) {
        let Some(shared) = self.shared() else {
            return;
        };
        if shared.state() != WorkerState::Idle {
            return;
        }
        if shared.handler.set(handler).is_err() {
            return;
        }
        shared.set_state(WorkerState::Armed);

        match self {
            DeferredWork::None => {}
            DeferredWork::Synchronous(shared) => shared.set_state(WorkerState::Running),
            DeferredWork::Threaded { shared, thread } => {
                if spawn_thread {
                    let worker = Arc::clone(shared);
                    let handle = thread::Builder::new()
                        .name("plugin-worker".to_string())
                        .spawn(move || worker_loop(worker))
                        .expect("Failed to spawn plugin worker thread");
                    *thread = Some(handle);
                } else {
                    shared.set_state(WorkerState::Running);
                }
            }
        }
    }

    /// Queue work from the audio thread.
    pub fn schedule_work(&self, data: &[u8]) -> Result<(), WorkerError> {
        match self.shared() {
            Some(shared) => shared.schedule(data),
            None => Err(WorkerError::NoWorker),
        }
    }

    /// Run every queued request on the calling thread. Returns how many
    /// were handled. Only meaningful for a threaded worker without its own
    /// thread.
    pub fn step(&self) -> usize {
        match self {
            DeferredWork::Threaded { shared, thread: None } => shared.run_pending(),
            _ => 0,
        }
    }

    /// Deliver queued responses to the plugin. Audio thread, start of block.
    pub fn emit_responses(&self) -> usize {
        self.shared().map_or(0, |shared| shared.emit_responses())
    }

    /// Audio thread, after the plugin ran.
    pub fn end_run(&self) {
        if let Some(shared) = self.shared() {
            shared.end_run();
        }
    }

    /// Requests queued but not yet handled.
    pub fn pending_requests(&self) -> usize {
        self.shared()
            .map_or(0, |shared| shared.requests_queued.load(Ordering::Acquire))
    }

    /// Responses produced but not yet delivered.
    pub fn pending_responses(&self) -> usize {
        self.shared()
            .map_or(0, |shared| shared.responses_queued.load(Ordering::Acquire))
    }

    pub fn state(&self) -> WorkerState {
        self.shared().map_or(WorkerState::Idle, |shared| shared.state())
    }

    /// Largest request or response payload in bytes.
    pub fn max_payload(&self) -> usize {
        self.shared().map_or(0, |shared| shared.limit)
    }

    /// Take the work lock on a non-real-time context.
    pub fn lock(&self) -> Option<MutexGuard<'_, ()>> {
        self.shared().map(|shared| shared.work_lock.lock())
    }

    /// Stop the worker context. Blocks on the join; never call from the
    /// audio thread. Requires that the plugin is no longer running, since
    /// the exit request goes through the audio thread's end of the ring.
    pub fn finish(&mut self) {
        let Some(shared) = self.shared() else {
            return;
        };
        if matches!(shared.state(), WorkerState::Idle | WorkerState::Stopped) {
            shared.set_state(WorkerState::Stopped);
            return;
        }
        shared.set_state(WorkerState::Draining);

        if let DeferredWork::Threaded { shared, thread } = self {
            // SAFETY: the plugin no longer runs, so nothing else produces requests.
            let prod = unsafe { &mut *shared.requests_tx.get() };
            if push_record(prod, [EXIT], &[]) {
                shared.requests_queued.fetch_add(1, Ordering::Release);
            }
            shared.exiting.store(true, Ordering::Release);
            let _ = shared.wake_tx.try_send(());
            if let Some(handle) = thread.take() {
                if handle.join().is_err() {
                    tracing::error!("Plugin worker thread panicked");
                }
            }
        }

        let Some(shared) = self.shared() else {
            return;
        };
        shared.exiting.store(true, Ordering::Release);
        // Wait out any work() still holding the lock.
        drop(shared.work_lock.lock());
        shared.set_state(WorkerState::Stopped);
        tracing::debug!("Plugin worker stopped");
    }
}

impl Drop for DeferredWork {
    fn drop(&mut self) {
        self.finish();
    }
}

impl std::fmt::Debug for DeferredWork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            DeferredWork::None => "None",
            DeferredWork::Synchronous(_) => "Synchronous",
            DeferredWork::Threaded { .. } => "Threaded",
        };
        f.debug_struct("DeferredWork")
            .field("variant", &variant)
            .field("state", &self.state())
            .finish()
    }
}
