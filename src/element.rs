//! The worker: lifecycle state machine, per-port pipes, and the
//! notify/timeout loop that drives a plugin's `do_work`.
//!
//! Grounded on `node_task.rs::NodeTask::run` for the continuous
//! thread-per-node shape, and on the original `element.cc::Element::run`
//! for the exact timeout/notify predicate (see SPEC_FULL.md §4.2) — a
//! timeout tick never calls `do_work`, only a genuine notify does.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use serde_json::Value;

use crate::datapipe::{DataPipe, PushError};
use crate::error::ErrorCode;
use crate::frame::ObjectMetadata;

/// Default wait granularity when `milliseconds_timeout` is 0 or the
/// element is paused — just often enough to notice a `stop()`.
const DEFAULT_TMO: Duration = Duration::from_millis(200);

/// Default bound for a lazily created input pipe (`push_input` before any
/// `connect` has run, e.g. external command injection via `send_data`).
pub const DEFAULT_PIPE_CAPACITY: usize = 16;

pub type Item = Arc<ObjectMetadata>;
pub type Pipe = DataPipe<Item>;
pub type SinkHandler = Box<dyn Fn(Item) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadStatus {
    Stop,
    Run,
    Pause,
}

/// Handle `do_work` uses to reach its own ports. Borrowing the element
/// rather than owning it avoids a self-borrow cycle between the worker
/// loop (which holds the `ElementImpl` lock) and the trait object it
/// drives.
pub struct ElementContext<'a> {
    element: &'a Element,
}

impl<'a> ElementContext<'a> {
    pub fn pop_input(&self, port: u32) -> Option<Item> {
        self.element.pop_input(port)
    }

    pub fn peek_input(&self, port: u32) -> Option<Item> {
        self.element.peek_input(port)
    }

    pub fn push_output(&self, port: u32, item: Item, timeout: Duration) -> Result<(), ErrorCode> {
        self.element.push_output(port, item, timeout)
    }

    pub fn input_ports(&self) -> Vec<u32> {
        self.element.input_pipes.lock().unwrap().keys().copied().collect()
    }

    pub fn element_id(&self) -> u32 {
        self.element.id
    }
}

/// Contract a graph node implements. The core only ever touches instances
/// through this trait, dynamically dispatched (`Box<dyn ElementImpl>`)
/// behind a name-keyed registry (see `engine::Engine`).
pub trait ElementImpl: Send {
    /// Parse `configure` (the opaque per-worker JSON sub-object) and set up
    /// any internal state. Called once, only while `Stop`.
    fn init_internal(&mut self, configure: &Value) -> Result<(), ErrorCode>;

    /// Release resources acquired in `init_internal`. Called once, only
    /// while `Stop`.
    fn uninit_internal(&mut self) {}

    /// Pop from input ports, transform, push to output ports. Called only
    /// on a genuine input notify; must not block indefinitely.
    fn do_work(&mut self, ctx: &mut ElementContext) -> Result<(), ErrorCode>;
}

/// A graph node: owns its ports, its worker threads, and the `ElementImpl`
/// they drive.
pub struct Element {
    pub id: u32,
    pub name: String,
    pub side: String,
    pub device_id: i32,
    pub thread_number: usize,
    pub milliseconds_timeout: u64,
    pub repeated_timeout: bool,
    pub is_sink: bool,

    input_pipes: Mutex<HashMap<u32, Arc<Pipe>>>,
    /// One output port can fan out to several downstream pipes (one per
    /// `connect` call against that port).
    output_pipes: Mutex<HashMap<u32, Vec<Weak<Pipe>>>>,
    sink_handlers: Mutex<HashMap<u32, SinkHandler>>,

    notify_count: Mutex<u64>,
    notify_cond: Condvar,

    status: Mutex<ThreadStatus>,
    threads: Mutex<Vec<JoinHandle<()>>>,

    imp: Mutex<Box<dyn ElementImpl>>,
}

/// Construction parameters pulled straight out of a `WorkerConfig` (kept
/// separate from `config::WorkerConfig` so `element` doesn't depend on the
/// config-parsing module).
#[derive(Debug, Clone)]
pub struct ElementSpec {
    pub side: String,
    pub device_id: i32,
    pub thread_number: usize,
    pub milliseconds_timeout: u64,
    pub repeated_timeout: bool,
    pub is_sink: bool,
}

impl Default for ElementSpec {
    fn default() -> Self {
        Self {
            side: "cpu".to_string(),
            device_id: 0,
            thread_number: 1,
            milliseconds_timeout: 0,
            repeated_timeout: false,
            is_sink: false,
        }
    }
}

impl Element {
    pub fn new(id: u32, name: impl Into<String>, imp: Box<dyn ElementImpl>) -> Arc<Self> {
        Self::with_spec(id, name, imp, ElementSpec::default())
    }

    pub fn with_spec(
        id: u32,
        name: impl Into<String>,
        imp: Box<dyn ElementImpl>,
        spec: ElementSpec,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            name: name.into(),
            side: spec.side,
            device_id: spec.device_id,
            thread_number: spec.thread_number.max(1),
            milliseconds_timeout: spec.milliseconds_timeout,
            repeated_timeout: spec.repeated_timeout,
            is_sink: spec.is_sink,
            input_pipes: Mutex::new(HashMap::new()),
            output_pipes: Mutex::new(HashMap::new()),
            sink_handlers: Mutex::new(HashMap::new()),
            notify_count: Mutex::new(0),
            notify_cond: Condvar::new(),
            status: Mutex::new(ThreadStatus::Stop),
            threads: Mutex::new(Vec::new()),
            imp: Mutex::new(imp),
        })
    }

    pub fn status(&self) -> ThreadStatus {
        *self.status.lock().unwrap()
    }

    /// Parse `configure` and hand it to the subclass. Only valid while
    /// `Stop`.
    pub fn init(&self, configure: &Value) -> Result<(), ErrorCode> {
        if self.status() != ThreadStatus::Stop {
            return Err(ErrorCode::ThreadStatusError);
        }
        self.imp.lock().unwrap().init_internal(configure)
    }

    pub fn uninit(&self) -> Result<(), ErrorCode> {
        if self.status() != ThreadStatus::Stop {
            return Err(ErrorCode::ThreadStatusError);
        }
        self.imp.lock().unwrap().uninit_internal();
        Ok(())
    }

    /// Spawn `thread_number` worker threads and transition `Stop -> Run`.
    pub fn start(self: &Arc<Self>) -> Result<(), ErrorCode> {
        let mut status = self.status.lock().unwrap();
        if *status != ThreadStatus::Stop {
            return Err(ErrorCode::ThreadStatusError);
        }
        *status = ThreadStatus::Run;
        drop(status);

        tracing::info!(element_id = self.id, name = %self.name, "starting");

        let mut threads = self.threads.lock().unwrap();
        for n in 0..self.thread_number.max(1) {
            let element = Arc::clone(self);
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}-{}", element.name, element.id, n))
                .spawn(move || worker_loop(element))
                .expect("failed to spawn element worker thread");
            threads.push(handle);
        }
        Ok(())
    }

    pub fn pause(&self) -> Result<(), ErrorCode> {
        let mut status = self.status.lock().unwrap();
        if *status != ThreadStatus::Run {
            return Err(ErrorCode::ThreadStatusError);
        }
        *status = ThreadStatus::Pause;
        Ok(())
    }

    pub fn resume(&self) -> Result<(), ErrorCode> {
        let mut status = self.status.lock().unwrap();
        if *status != ThreadStatus::Pause {
            return Err(ErrorCode::ThreadStatusError);
        }
        *status = ThreadStatus::Run;
        self.notify_cond.notify_all();
        Ok(())
    }

    /// Flip status to `Stop`, wake every waiting worker thread, and close
    /// every input pipe so a producer blocked in `push` against this
    /// element (e.g. an upstream element mid-shutdown, or an external
    /// `send_data` caller) is woken immediately instead of waiting out its
    /// full timeout. Does not join. Used by the engine to signal a whole
    /// graph in topological order before joining threads in reverse order,
    /// so downstream elements get a chance to drain before an upstream
    /// producer's thread is confirmed gone.
    pub fn signal_stop(&self) -> Result<(), ErrorCode> {
        let mut status = self.status.lock().unwrap();
        if *status == ThreadStatus::Stop {
            return Err(ErrorCode::ThreadStatusError);
        }
        *status = ThreadStatus::Stop;
        drop(status);
        self.notify_cond.notify_all();
        for pipe in self.input_pipes.lock().unwrap().values() {
            pipe.close();
        }
        Ok(())
    }

    /// Join every worker thread spawned by `start`. No forced cancellation
    /// of an in-flight `do_work`.
    pub fn join(&self) {
        let handles: Vec<_> = self.threads.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        tracing::info!(element_id = self.id, name = %self.name, "stopped");
    }

    /// Cooperative stop: `signal_stop` followed immediately by `join`.
    pub fn stop(&self) -> Result<(), ErrorCode> {
        self.signal_stop()?;
        self.join();
        Ok(())
    }

    /// Number of worker threads currently joined/alive; used by tests.
    pub fn thread_count(&self) -> usize {
        self.threads.lock().unwrap().len()
    }

    /// Register a data callback: bypasses DataPipe delivery for this
    /// output port entirely.
    pub fn set_sink_handler(&self, port: u32, handler: SinkHandler) {
        self.sink_handlers.lock().unwrap().insert(port, handler);
    }

    /// Push externally-sourced data directly onto an input port, lazily
    /// creating the pipe (with `on_input_notify` bound as its push-handler)
    /// on first use.
    pub fn push_input(
        self: &Arc<Self>,
        port: u32,
        item: Item,
        timeout: Duration,
    ) -> Result<(), ErrorCode> {
        let pipe = self.input_pipe_or_create(port, DEFAULT_PIPE_CAPACITY);
        pipe.push(item, timeout).map_err(push_error_to_code)
    }

    /// Get-or-create the owned input pipe for `port` at a given capacity,
    /// used by `connector::connect` when wiring a fresh connection.
    pub(crate) fn input_pipe_for_connection(self: &Arc<Self>, port: u32, capacity: usize) -> Arc<Pipe> {
        self.input_pipe_or_create(port, capacity)
    }

    /// Add a weak reference to a downstream pipe as one of this element's
    /// outputs for `port`, used by `connector::connect`. A port can fan out
    /// to more than one downstream pipe.
    pub(crate) fn set_output_pipe(&self, port: u32, pipe: Weak<Pipe>) {
        self.output_pipes.lock().unwrap().entry(port).or_default().push(pipe);
    }

    /// Pre-create (or fetch) the input pipe at `port` with a specific
    /// capacity, before any push arrives. Useful when an externally-driven
    /// port needs a tighter bound than `DEFAULT_PIPE_CAPACITY`.
    pub fn configure_input(self: &Arc<Self>, port: u32, capacity: usize) -> Arc<Pipe> {
        self.input_pipe_or_create(port, capacity)
    }

    pub fn peek_input(&self, port: u32) -> Option<Item> {
        self.input_pipes.lock().unwrap().get(&port).and_then(|p| p.peek())
    }

    pub fn pop_input(&self, port: u32) -> Option<Item> {
        let item = self.input_pipes.lock().unwrap().get(&port).and_then(|p| p.pop());
        if item.is_some() {
            let mut count = self.notify_count.lock().unwrap();
            *count = count.saturating_sub(1);
        }
        item
    }

    /// Deliver to a downstream port: a registered sink handler wins over
    /// pipe delivery. A port wired to more than one downstream pipe
    /// (fan-out) pushes the item to every live one.
    pub fn push_output(&self, port: u32, item: Item, timeout: Duration) -> Result<(), ErrorCode> {
        if let Some(handler) = self.sink_handlers.lock().unwrap().get(&port) {
            handler(item);
            return Ok(());
        }
        let pipes: Vec<Arc<Pipe>> = {
            let map = self.output_pipes.lock().unwrap();
            map.get(&port)
                .map(|list| list.iter().filter_map(Weak::upgrade).collect())
                .unwrap_or_default()
        };
        if pipes.is_empty() {
            return Err(ErrorCode::NoSuchWorkerPort);
        }
        let mut first_err = None;
        for pipe in pipes {
            if let Err(err) = pipe.push(item.clone(), timeout) {
                first_err.get_or_insert(push_error_to_code(err));
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    pub fn input_pipe_len(&self, port: u32) -> Option<usize> {
        self.input_pipes.lock().unwrap().get(&port).map(|p| p.len())
    }

    /// Snapshot of the first still-alive downstream pipe wired to `port`.
    /// With fan-out, multiple pipes share a port; this is a diagnostic
    /// sample, not a per-connection breakdown.
    pub fn output_pipe_stats(&self, port: u32) -> Option<(usize, usize)> {
        self.output_pipes
            .lock()
            .unwrap()
            .get(&port)?
            .iter()
            .find_map(|w| w.upgrade())
            .map(|p| (p.len(), p.capacity()))
    }

    /// Get-or-lazily-create this element's owned input pipe for `port`,
    /// wiring `on_input_notify` as its push-handler.
    fn input_pipe_or_create(self: &Arc<Self>, port: u32, capacity: usize) -> Arc<Pipe> {
        let mut pipes = self.input_pipes.lock().unwrap();
        pipes
            .entry(port)
            .or_insert_with(|| {
                let pipe = Arc::new(DataPipe::new(capacity));
                let weak_self = Arc::downgrade(self);
                pipe.set_push_handler(Box::new(move || {
                    if let Some(element) = weak_self.upgrade() {
                        element.on_input_notify();
                    }
                }));
                pipe
            })
            .clone()
    }

    fn on_input_notify(&self) {
        let mut count = self.notify_count.lock().unwrap();
        *count += 1;
        self.notify_cond.notify_one();
    }

    /// Wait up to `timeout` for `notify_count > 0`. Returns whether the
    /// predicate held (a genuine notify) rather than a plain timeout.
    fn wait_for_notify(&self, timeout: Duration) -> bool {
        let guard = self.notify_count.lock().unwrap();
        let (guard, result) = self
            .notify_cond
            .wait_timeout_while(guard, timeout, |count| *count == 0)
            .unwrap();
        !result.timed_out() || *guard > 0
    }
}

fn push_error_to_code(err: PushError) -> ErrorCode {
    match err {
        PushError::Timeout => ErrorCode::Timeout,
        PushError::Closed => ErrorCode::StreamEnd,
    }
}

/// The exact per-thread worker loop from SPEC_FULL.md §4.2: `do_work`
/// fires only on a genuine notify, never on a timeout tick.
fn worker_loop(element: Arc<Element>) {
    let mut last_timed_out = true;

    loop {
        let status = element.status();
        if status == ThreadStatus::Stop {
            break;
        }

        let tmo = if status == ThreadStatus::Pause {
            DEFAULT_TMO
        } else if element.milliseconds_timeout == 0 {
            DEFAULT_TMO
        } else {
            Duration::from_millis(element.milliseconds_timeout)
        };

        let notified = element.wait_for_notify(tmo);

        if element.status() == ThreadStatus::Pause {
            continue;
        }

        if !notified {
            // Timeout tick: never calls do_work, regardless of
            // repeated_timeout. The flag only changes whether a lone
            // timeout is logged as notable or ignored outright.
            if element.milliseconds_timeout == 0 {
                continue;
            }
            if !element.repeated_timeout && !last_timed_out {
                tracing::trace!(element_id = element.id, "first timeout tick, skipping");
            }
            last_timed_out = true;
            continue;
        }
        last_timed_out = false;

        let mut ctx = ElementContext { element: &element };
        let mut imp = element.imp.lock().unwrap();
        if let Err(err) = imp.do_work(&mut ctx) {
            tracing::warn!(element_id = element.id, error = %err, "do_work returned an error");
        }
    }
}
