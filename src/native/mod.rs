//! Native engine seam - the calls the bridge makes into the engine core
//!
//! Design: the engine is an external collaborator behind `NativeEngine`.
//! The bridge only ever holds opaque `NativeHandle`s and hands
//! `NativeVariant`s across with explicit ownership:
//! - `&NativeVariant` arguments are borrowed; the engine copies if it keeps them
//! - returned `NativeVariant`s are owned by the caller and must reach
//!   `variant_destroy` exactly once (normally through a `Variant` disposer)

mod heap;


pub use heap::{EngineStats, HeapEngine, MethodFn};

use once_cell::sync::Lazy;
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

use crate::logging::debug;
use crate::variant::{NativeVariant, StringName};

/// Opaque pointer-sized token naming a native object. Zero is null.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct NativeHandle(usize);

impl NativeHandle {
    pub const NULL: NativeHandle = NativeHandle(0);

    #[inline]
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_raw(self) -> usize {
        self.0
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Resolved native method binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodBind(pub(crate) usize);

impl MethodBind {
    pub const fn from_raw(raw: usize) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> usize {
        self.0
    }
}

/// Calls into the native engine core.
///
/// Implementations must be thread-safe: disposal can arrive from any
/// thread, including the one dropping the last reference to a wrapper.
pub trait NativeEngine: Send + Sync {
    /// Allocate a fresh instance of a native class. `None` if the class has no constructor.
    fn instantiate(&self, native_class: &str) -> Option<NativeHandle>;

    /// Tie a freshly allocated handle to its managed wrapper.
    /// Reference-counted handles gain one reference held by the wrapper.
    fn tie_managed(&self, handle: NativeHandle, native_class: &str, ref_counted: bool);

    /// Tie a handle that predates its wrapper: register the managed class in
    /// the native type table and wire virtual overrides, then take the
    /// wrapper's reference as `tie_managed` would.
    fn tie_managed_with_pre_setup(&self, handle: NativeHandle, class: &str, ref_counted: bool);

    /// The exclusive owner is gone: free the handle outright.
    fn object_disposed(&self, handle: NativeHandle);

    /// The managed holder of a reference-counted handle is gone.
    /// `is_finalizer` marks a non-deterministic release.
    fn refcounted_disposed(&self, handle: NativeHandle, is_finalizer: bool);

    /// Debuggable string form of an object
    fn object_to_string(&self, handle: NativeHandle) -> String;

    /// Route emissions of `signal` on `handle` back to the managed side
    fn connect_event_signal(&self, handle: NativeHandle, signal: &StringName);

    /// Drop every route set up by `connect_event_signal` for `handle`.
    /// Called once per wrapper release, before the ownership call.
    fn disconnect_event_signals(&self, handle: NativeHandle);

    fn method_bind(&self, class: &str, method: &str) -> Option<MethodBind>;

    /// Invoke a bound method. Arguments are borrowed, the result is owned.
    fn call(&self, handle: NativeHandle, method: MethodBind, args: &[&NativeVariant]) -> NativeVariant;

    /// Read a property. The result is owned by the caller.
    fn get_property(&self, handle: NativeHandle, name: &str) -> Option<NativeVariant>;

    /// Write a property from a borrowed value
    fn set_property(&self, handle: NativeHandle, name: &str, value: &NativeVariant) -> bool;

    /// Deep copy producing an independently owned value
    fn variant_new_copy(&self, value: &NativeVariant) -> NativeVariant;

    /// Release an owned value
    fn variant_destroy(&self, value: NativeVariant);
}

/// Engine used by constructors that do not name one explicitly
static CURRENT: Lazy<RwLock<Arc<dyn NativeEngine>>> =
    Lazy::new(|| RwLock::new(Arc::new(HeapEngine::new())));

/// Replace the process-wide engine, returning the previous one
pub fn install(engine: Arc<dyn NativeEngine>) -> Arc<dyn NativeEngine> {
    debug!(event = "engine_installed", "Native engine installed");
    std::mem::replace(&mut *CURRENT.write(), engine)
}

/// The process-wide engine (an in-process `HeapEngine` until one is installed)
pub fn current() -> Arc<dyn NativeEngine> {
    CURRENT.read().clone()
}
