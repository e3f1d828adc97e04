//! Endpoints: thread-owned parameters with deferred cross-thread writes
//!
//! Every mutable DSP parameter is an [`Endpoint`]. Exactly one thread owns
//! it; writes from the owner apply immediately, writes from anywhere else are
//! queued on the owner's queue in the [`Session`] and applied when the owner
//! next flushes (once per chunk for the DSP thread).
//!
//! # Thread affinity
//!
//! Callers name the thread they are running on with a [`ThreadId`] token
//! instead of the endpoint inspecting ambient thread identity. The token is
//! the contract: code running in the audio callback passes `ThreadId::Dsp`,
//! the UI passes `ThreadId::Main`, the control server passes
//! `ThreadId::Server`.
//!
//! # Callbacks
//!
//! Three optional callback slots run on fixed threads:
//! - DSP callback on `Dsp` (or immediately while playback is stopped)
//! - project callback on `Main`
//! - GUI callback on `Main`, and only when the value was applied
//!   synchronously; queued writes have their GUI callback scheduled by the
//!   flush that applies them.
//!
//! Values live in an `AtomicU64` so a read from any thread sees either the
//! old or the new value, never a torn one.

pub mod error;
pub mod history;
pub mod route;
#[cfg(feature = "control-server")]
pub mod server;
pub mod session;
pub mod value;

pub use error::{EndpointError, EndpointResult};
pub use history::EndpointHistory;
pub use route::{sanitize_component, RouteTable, API_HASH_TABLE_SIZE};
#[cfg(feature = "control-server")]
pub use server::{ControlServer, ServerEvent};
pub use session::{Session, UndoSink, MAX_QUEUED_OPS};
pub use value::{ValType, Value};

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

use crate::automation::Automation;

/// Number of logical threads
pub const NUM_THREADS: usize = 3;

/// Logical execution context, passed explicitly to every endpoint operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ThreadId {
    /// UI and project state; the only thread that may push undo entries
    Main = 0,
    /// Audio callback
    Dsp = 1,
    /// UDP control plane
    Server = 2,
}

impl ThreadId {
    pub const ALL: [ThreadId; NUM_THREADS] = [ThreadId::Main, ThreadId::Dsp, ThreadId::Server];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    fn from_u8(v: u8) -> Self {
        match v {
            1 => ThreadId::Dsp,
            2 => ThreadId::Server,
            _ => ThreadId::Main,
        }
    }
}

/// Which side effects a write should trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteFlags {
    pub gui: bool,
    pub proj: bool,
    pub dsp: bool,
    pub undoable: bool,
}

impl WriteFlags {
    /// Value only
    pub const NONE: WriteFlags = WriteFlags {
        gui: false,
        proj: false,
        dsp: false,
        undoable: false,
    };

    /// All callbacks, no undo entry
    pub const ALL_CALLBACKS: WriteFlags = WriteFlags {
        gui: true,
        proj: true,
        dsp: true,
        undoable: false,
    };

    /// A user edit: all callbacks plus an undo entry
    pub const USER: WriteFlags = WriteFlags {
        gui: true,
        proj: true,
        dsp: true,
        undoable: true,
    };

    pub fn with_undo(mut self, undoable: bool) -> Self {
        self.undoable = undoable;
        self
    }
}

/// What a write did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Same value as the previous write; nothing happened
    Unchanged,
    /// Stored immediately
    Applied,
    /// Queued for the owner thread
    Queued,
}

/// Callback slot on an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackSlot {
    Gui,
    Proj,
    Dsp,
}

/// Callback invoked with the endpoint that changed
pub type EndpointCallback = Arc<dyn Fn(&Endpoint) + Send + Sync>;

struct Inner {
    local_id: String,
    display_name: String,
    val_type: ValType,
    default: Value,
    range: Option<(Value, Value)>,
    gui_callback: Option<EndpointCallback>,
    proj_callback: Option<EndpointCallback>,
    dsp_callback: Option<EndpointCallback>,
    block_undo: bool,
    automatable: bool,

    value: AtomicU64,
    owner: AtomicU8,
    generation: AtomicU64,

    last_write: AtomicU64,
    write_has_occurred: AtomicBool,

    changing: AtomicBool,
    cached: AtomicU64,
    incr: AtomicU64,
    auto_incr: AtomicBool,

    automation: OnceLock<Arc<Automation>>,
}

/// Shared handle to a thread-owned parameter
///
/// Cloning is cheap and every clone refers to the same parameter.
#[derive(Clone)]
pub struct Endpoint(Arc<Inner>);

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("local_id", &self.0.local_id)
            .field("value", &self.read(self.owner()))
            .field("owner", &self.owner())
            .finish()
    }
}

/// Builder for [`Endpoint`]
pub struct EndpointBuilder {
    local_id: String,
    display_name: String,
    default: Value,
    owner: ThreadId,
    range: Option<(Value, Value)>,
    gui_callback: Option<EndpointCallback>,
    proj_callback: Option<EndpointCallback>,
    dsp_callback: Option<EndpointCallback>,
    block_undo: bool,
    automatable: bool,
}

impl EndpointBuilder {
    /// Restrict writes to `[min, max]` (converted to the endpoint's type)
    pub fn with_range(mut self, min: impl Into<Value>, max: impl Into<Value>) -> Self {
        let ty = self.default.val_type();
        self.range = Some((min.into().cast(ty), max.into().cast(ty)));
        self
    }

    pub fn with_gui_callback(mut self, cb: impl Fn(&Endpoint) + Send + Sync + 'static) -> Self {
        self.gui_callback = Some(Arc::new(cb));
        self
    }

    pub fn with_proj_callback(mut self, cb: impl Fn(&Endpoint) + Send + Sync + 'static) -> Self {
        self.proj_callback = Some(Arc::new(cb));
        self
    }

    pub fn with_dsp_callback(mut self, cb: impl Fn(&Endpoint) + Send + Sync + 'static) -> Self {
        self.dsp_callback = Some(Arc::new(cb));
        self
    }

    /// Whether writes may push undo entries (default true)
    pub fn undoable(mut self, undoable: bool) -> Self {
        self.block_undo = !undoable;
        self
    }

    /// Whether automation may be bound (default true)
    pub fn automatable(mut self, automatable: bool) -> Self {
        self.automatable = automatable;
        self
    }

    pub fn build(self) -> Endpoint {
        let bits = self.default.to_bits();
        Endpoint(Arc::new(Inner {
            local_id: self.local_id,
            display_name: self.display_name,
            val_type: self.default.val_type(),
            default: self.default,
            range: self.range,
            gui_callback: self.gui_callback,
            proj_callback: self.proj_callback,
            dsp_callback: self.dsp_callback,
            block_undo: self.block_undo,
            automatable: self.automatable,
            value: AtomicU64::new(bits),
            owner: AtomicU8::new(self.owner as u8),
            generation: AtomicU64::new(0),
            last_write: AtomicU64::new(bits),
            write_has_occurred: AtomicBool::new(false),
            changing: AtomicBool::new(false),
            cached: AtomicU64::new(bits),
            incr: AtomicU64::new(0),
            auto_incr: AtomicBool::new(false),
            automation: OnceLock::new(),
        }))
    }
}

impl Endpoint {
    /// Start building an endpoint; `default` fixes its type
    pub fn builder(
        local_id: impl Into<String>,
        display_name: impl Into<String>,
        default: impl Into<Value>,
        owner: ThreadId,
    ) -> EndpointBuilder {
        EndpointBuilder {
            local_id: local_id.into(),
            display_name: display_name.into(),
            default: default.into(),
            owner,
            range: None,
            gui_callback: None,
            proj_callback: None,
            dsp_callback: None,
            block_undo: false,
            automatable: true,
        }
    }

    pub fn local_id(&self) -> &str {
        &self.0.local_id
    }

    pub fn display_name(&self) -> &str {
        &self.0.display_name
    }

    pub fn val_type(&self) -> ValType {
        self.0.val_type
    }

    pub fn default_value(&self) -> Value {
        self.0.default
    }

    pub fn range(&self) -> Option<(Value, Value)> {
        self.0.range
    }

    pub fn is_automatable(&self) -> bool {
        self.0.automatable
    }

    /// Whether two handles refer to the same parameter
    pub fn ptr_eq(&self, other: &Endpoint) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn owner(&self) -> ThreadId {
        ThreadId::from_u8(self.0.owner.load(Ordering::Acquire))
    }

    /// Hand ownership to another thread
    pub fn set_owner(&self, owner: ThreadId) {
        self.0.owner.store(owner as u8, Ordering::Release);
    }

    /// Current value as seen from `thread`
    ///
    /// The owner is the only writer of the slot so a relaxed load suffices;
    /// other threads synchronize with the owner's release store.
    #[inline]
    pub fn read(&self, thread: ThreadId) -> Value {
        let order = if thread == self.owner() {
            Ordering::Relaxed
        } else {
            Ordering::Acquire
        };
        Value::from_bits(self.0.val_type, self.0.value.load(order))
    }

    /// Bumped every time a new value is stored
    #[inline]
    pub fn generation(&self) -> u64 {
        self.0.generation.load(Ordering::Acquire)
    }

    /// Bind an automation curve; only the first binding takes effect
    pub fn bind_automation(&self, automation: Arc<Automation>) -> bool {
        if !self.0.automatable {
            log::warn!("Endpoint {} is not automatable", self.0.local_id);
            return false;
        }
        self.0.automation.set(automation).is_ok()
    }

    pub fn automation(&self) -> Option<&Arc<Automation>> {
        self.0.automation.get()
    }

    pub(crate) fn callback(&self, slot: CallbackSlot) -> Option<&EndpointCallback> {
        match slot {
            CallbackSlot::Gui => self.0.gui_callback.as_ref(),
            CallbackSlot::Proj => self.0.proj_callback.as_ref(),
            CallbackSlot::Dsp => self.0.dsp_callback.as_ref(),
        }
    }

    fn run_callback(&self, slot: CallbackSlot) {
        if let Some(cb) = self.callback(slot) {
            cb(self);
        }
    }

    /// Store a value; only the owner thread or a queue flush calls this
    pub(crate) fn apply(&self, session: &Session, value: Value) {
        self.0.value.store(value.to_bits(), Ordering::Release);
        self.0.generation.fetch_add(1, Ordering::AcqRel);
        if let Some(automation) = self.0.automation.get() {
            if automation.is_write() && !automation.try_record(session.playhead(), value) {
                log::debug!("Automation busy; {} not recorded", self.0.local_id);
            }
        }
    }

    fn clamp_to_range(&self, value: Value) -> Value {
        let Some((min, max)) = self.0.range else {
            return value;
        };
        if value.less_than(min) {
            log::warn!("{} <= {} <= {} (got {})", min, self.0.local_id, max, value);
            min
        } else if max.less_than(value) {
            log::warn!("{} <= {} <= {} (got {})", min, self.0.local_id, max, value);
            max
        } else {
            value
        }
    }

    /// Write a new value from `thread`
    ///
    /// The value is clamped to the endpoint's range. Repeating the previous
    /// write is a no-op. On the owner thread (or for a DSP-owned endpoint
    /// while playback is stopped) the value is stored immediately; otherwise
    /// it replaces any pending write for this endpoint on the owner's queue.
    /// Callbacks fan out per [`WriteFlags`], and an undoable write from the
    /// main thread pushes one entry to the session's undo sink.
    pub fn write(
        &self,
        session: &Session,
        thread: ThreadId,
        value: Value,
        flags: WriteFlags,
    ) -> EndpointResult<WriteOutcome> {
        let inner = &*self.0;
        if value.val_type() != inner.val_type {
            return Err(EndpointError::TypeMismatch {
                expected: inner.val_type,
                actual: value.val_type(),
            });
        }
        let value = self.clamp_to_range(value);

        let has_written = inner.write_has_occurred.load(Ordering::Acquire);
        let last = Value::from_bits(inner.val_type, inner.last_write.load(Ordering::Acquire));
        if has_written && last == value {
            return Ok(WriteOutcome::Unchanged);
        }
        let old = if has_written { last } else { self.read(thread) };

        let owner = self.owner();
        let playing = session.is_playing();
        let outcome = if thread == owner || (!playing && owner == ThreadId::Dsp) {
            self.apply(session, value);
            WriteOutcome::Applied
        } else {
            session.queue_val_change(self, value, flags.gui)?;
            WriteOutcome::Queued
        };
        let mut async_change = outcome == WriteOutcome::Queued;

        if flags.dsp && inner.dsp_callback.is_some() {
            if thread == ThreadId::Dsp || !playing {
                self.run_callback(CallbackSlot::Dsp);
            } else {
                session.queue_callback(thread, self, CallbackSlot::Dsp, ThreadId::Dsp);
                async_change = true;
            }
        }
        if flags.proj && inner.proj_callback.is_some() {
            if thread == ThreadId::Main {
                self.run_callback(CallbackSlot::Proj);
            } else {
                session.queue_callback(thread, self, CallbackSlot::Proj, ThreadId::Main);
            }
        }
        if flags.gui && inner.gui_callback.is_some() && !async_change {
            if thread == ThreadId::Main {
                self.run_callback(CallbackSlot::Gui);
            } else {
                session.queue_callback(thread, self, CallbackSlot::Gui, ThreadId::Main);
            }
        }

        if flags.undoable && !inner.block_undo {
            if thread != ThreadId::Main {
                log::error!("Cannot push undo for {} off the main thread", inner.local_id);
                return Err(EndpointError::UndoOffMainThread);
            }
            session.push_undo(self, old, value);
        }

        inner.last_write.store(value.to_bits(), Ordering::Release);
        inner.write_has_occurred.store(true, Ordering::Release);
        Ok(outcome)
    }

    /// Write the default value with all callbacks
    pub fn reset_to_default(&self, session: &Session, thread: ThreadId) -> EndpointResult<WriteOutcome> {
        self.write(session, thread, self.0.default, WriteFlags::ALL_CALLBACKS)
    }

    pub fn is_changing(&self) -> bool {
        self.0.changing.load(Ordering::Acquire)
    }

    /// Begin a drag-like gesture
    ///
    /// Writes `value` without an undo entry and remembers the starting value
    /// so [`Endpoint::stop_continuous_change`] can push a single entry for the
    /// whole gesture. With `auto_incr`, [`Session::do_ongoing_changes`] adds
    /// the increment on every call.
    pub fn start_continuous_change(
        &self,
        session: &Session,
        thread: ThreadId,
        auto_incr: Option<Value>,
        value: Value,
    ) -> EndpointResult<()> {
        let inner = &*self.0;
        if inner.changing.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        inner.cached.store(self.read(thread).to_bits(), Ordering::Release);
        self.write(session, thread, value, WriteFlags::ALL_CALLBACKS)?;
        if let Some(incr) = auto_incr {
            inner.incr.store(incr.cast(inner.val_type).to_bits(), Ordering::Release);
        }
        inner.auto_incr.store(auto_incr.is_some(), Ordering::Release);
        session.add_ongoing_change(self, thread)
    }

    /// Apply one auto-increment step of an ongoing gesture
    pub fn continuous_incr(&self, session: &Session, thread: ThreadId) -> EndpointResult<WriteOutcome> {
        let inner = &*self.0;
        let incr = Value::from_bits(inner.val_type, inner.incr.load(Ordering::Acquire));
        let next = self.read(thread).add(incr);
        self.write(session, thread, next, WriteFlags::ALL_CALLBACKS)
    }

    pub(crate) fn has_auto_incr(&self) -> bool {
        self.0.auto_incr.load(Ordering::Acquire)
    }

    /// End a gesture, pushing one undo entry if the value moved
    pub fn stop_continuous_change(&self, session: &Session, thread: ThreadId) -> EndpointResult<()> {
        let inner = &*self.0;
        if !inner.changing.swap(false, Ordering::AcqRel) {
            return Ok(());
        }
        let start = Value::from_bits(inner.val_type, inner.cached.load(Ordering::Acquire));
        let current = self.read(thread);
        if current != start && !inner.block_undo {
            if thread != ThreadId::Main {
                return Err(EndpointError::UndoOffMainThread);
            }
            session.push_undo(self, start, current);
        }
        Ok(())
    }
}

/// Change detector for one endpoint
///
/// DSP objects keep a watch per parameter and re-derive coefficients only
/// when [`EndpointWatch::poll`] reports a new value.
#[derive(Debug, Clone)]
pub struct EndpointWatch {
    endpoint: Endpoint,
    seen: u64,
}

impl EndpointWatch {
    /// Watch `endpoint`, treating its current value as already seen
    pub fn new(endpoint: Endpoint) -> Self {
        let seen = endpoint.generation();
        Self { endpoint, seen }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// New value since the last poll, if any
    #[inline]
    pub fn poll(&mut self, thread: ThreadId) -> Option<Value> {
        let generation = self.endpoint.generation();
        if generation == self.seen {
            return None;
        }
        self.seen = generation;
        Some(self.endpoint.read(thread))
    }

    /// Current value regardless of change
    pub fn value(&self, thread: ThreadId) -> Value {
        self.endpoint.read(thread)
    }
}
