//! Engine objects - managed wrappers tied to one native handle
//!
//! Design: the handle and the disposed flag are one atomic word. Disposal
//! swaps it to zero, and only the caller that observed a non-zero value
//! talks to the engine, so explicit `dispose()` racing the finalizer
//! (`Drop`) releases the handle exactly once.
//!
//! Ownership follows the nearest native base class and how the handle
//! was obtained:
//! - reference counted: the wrapper holds one engine reference
//! - exclusive: the wrapper created the object and frees it outright
//! - borrowed: the engine produced the object; the wrapper only detaches
//!
//! Every release first drops the wrapper's own table entries and the
//! engine-side signal connections, then makes the ownership call.

pub mod bindings;
mod class;
mod signals;

#[cfg(test)]
mod tests;

pub use class::{class_db, ClassBuilder, ClassDb, ClassInfo, SignalDecl};
pub use signals::{Delegate, DelegateId, EventSignalBinding};

use smallvec::SmallVec;
use std::any::Any;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::error::{BridgeError, Result};
use crate::logging::{log_finalizer_fault, log_handle_released, log_handle_tied};
use crate::native::{self as engine_api, NativeEngine, NativeHandle};
use crate::tracker::{self, Disposable, TrackingToken};
use crate::variant::{NativeVariant, StringName, Variant};

/// How the wrapper owns its native handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Ownership {
    ReferenceCounted,
    Exclusive,
    /// Engine-owned object wrapped after the fact. Never freed by the wrapper.
    Borrowed,
}

impl Ownership {
    fn for_class(native_base: &ClassInfo) -> Self {
        if native_base.is_ref_counted() {
            Self::ReferenceCounted
        } else {
            Self::Exclusive
        }
    }

    fn for_existing(native_base: &ClassInfo) -> Self {
        match Self::for_class(native_base) {
            Self::Exclusive => Self::Borrowed,
            other => other,
        }
    }

    #[inline]
    pub fn is_ref_counted(self) -> bool {
        self == Self::ReferenceCounted
    }
}

pub struct EngineObject {
    handle: AtomicUsize,
    ownership: Ownership,
    class: Arc<ClassInfo>,
    native_base: Arc<ClassInfo>,
    engine: Arc<dyn NativeEngine>,
    signals: EventSignalBinding,
    token: TrackingToken,
}

impl EngineObject {
    /// Create an instance of `class` on the current engine
    pub fn instantiate(class: &str) -> Result<Arc<Self>> {
        Self::new(engine_api::current(), class)
    }

    /// Ask the engine for a fresh native object and tie it to a new wrapper
    pub fn new(engine: Arc<dyn NativeEngine>, class: &str) -> Result<Arc<Self>> {
        let db = class_db();
        let class = db.get(class).ok_or_else(|| BridgeError::UnknownClass {
            class: class.to_string(),
        })?;
        let native_base = db.native_base(class.name())?;
        let ancestry = db.ancestry(class.name())?;

        let handle = engine
            .instantiate(native_base.name())
            .ok_or_else(|| BridgeError::NativeBindingNotFound {
                binding: format!("{}.<constructor>", class.name()),
            })?;

        let ownership = Ownership::for_class(&native_base);
        engine.tie_managed(handle, native_base.name(), ownership.is_ref_counted());
        log_handle_tied(class.name(), handle.as_raw(), ownership, false);

        Ok(Self::attach(engine, class, native_base, &ancestry, handle, ownership))
    }

    /// Wrap a handle the engine produced on its own.
    ///
    /// Runs the engine's one-time setup for the managed class before the
    /// wrapper takes its reference. A handle that already has a live
    /// wrapper yields that wrapper. Non-reference-counted objects stay
    /// owned by the engine: the wrapper is `Borrowed` and never frees them.
    pub fn from_handle(engine: Arc<dyn NativeEngine>, class: &str, handle: NativeHandle) -> Result<Arc<Self>> {
        if handle.is_null() {
            return Err(BridgeError::NullHandle {
                class: class.to_string(),
            });
        }
        if let Some(existing) = bindings::lookup(handle) {
            return Ok(existing);
        }

        let db = class_db();
        let class = db.get(class).ok_or_else(|| BridgeError::UnknownClass {
            class: class.to_string(),
        })?;
        let native_base = db.native_base(class.name())?;
        let ancestry = db.ancestry(class.name())?;

        let ownership = Ownership::for_existing(&native_base);
        engine.tie_managed_with_pre_setup(handle, class.name(), ownership.is_ref_counted());
        log_handle_tied(class.name(), handle.as_raw(), ownership, true);

        Ok(Self::attach(engine, class, native_base, &ancestry, handle, ownership))
    }

    fn attach(
        engine: Arc<dyn NativeEngine>,
        class: Arc<ClassInfo>,
        native_base: Arc<ClassInfo>,
        ancestry: &[Arc<ClassInfo>],
        handle: NativeHandle,
        ownership: Ownership,
    ) -> Arc<Self> {
        let instance = Arc::new_cyclic(|weak: &Weak<EngineObject>| {
            let owner: Weak<dyn Disposable> = weak.clone();
            Self {
                handle: AtomicUsize::new(handle.as_raw()),
                ownership,
                class,
                native_base,
                engine,
                signals: EventSignalBinding::build(ancestry),
                token: tracker::register_disposable(owner),
            }
        });

        bindings::register(handle, Arc::downgrade(&instance));
        for signal in instance.signals.signal_names() {
            instance.engine.connect_event_signal(handle, &signal);
        }
        instance
    }

    /// Handle of `instance`, or null for `None`. Disposed instances are an error.
    pub fn get_ptr(instance: Option<&EngineObject>) -> Result<NativeHandle> {
        match instance {
            Some(instance) => instance.handle(),
            None => Ok(NativeHandle::NULL),
        }
    }

    pub fn handle(&self) -> Result<NativeHandle> {
        match self.handle.load(Ordering::Acquire) {
            0 => Err(BridgeError::disposed(self.class.name())),
            raw => Ok(NativeHandle::from_raw(raw)),
        }
    }

    #[inline]
    pub fn is_disposed(&self) -> bool {
        self.handle.load(Ordering::Acquire) == 0
    }

    #[inline]
    pub fn ownership(&self) -> Ownership {
        self.ownership
    }

    pub fn class(&self) -> &Arc<ClassInfo> {
        &self.class
    }

    #[inline]
    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    /// Name of the nearest native ancestor
    #[inline]
    pub fn native_class(&self) -> &str {
        self.native_base.name()
    }

    pub fn engine(&self) -> Arc<dyn NativeEngine> {
        self.engine.clone()
    }

    /// Release the native handle now. Idempotent.
    pub fn dispose(&self) {
        self.release(false);
    }

    fn release(&self, is_finalizer: bool) {
        let raw = self.handle.swap(0, Ordering::AcqRel);
        if raw == 0 {
            return;
        }

        // Bookkeeping first: the engine calls below may panic on the finalizer path
        let handle = NativeHandle::from_raw(raw);
        bindings::unregister(handle, self as *const Self);
        tracker::unregister_disposable(&self.token);

        self.engine.disconnect_event_signals(handle);
        match self.ownership {
            Ownership::ReferenceCounted => self.engine.refcounted_disposed(handle, is_finalizer),
            Ownership::Exclusive => self.engine.object_disposed(handle),
            Ownership::Borrowed => {}
        }
        log_handle_released(self.class.name(), raw, self.ownership, is_finalizer);
    }

    /// Engine's debuggable string for this object
    pub fn to_native_string(&self) -> Result<String> {
        let handle = self.handle()?;
        Ok(self.engine.object_to_string(handle))
    }

    /// Call a native method. Arguments are borrowed; the result is owned by the caller.
    pub fn call(&self, method: &str, args: &[Variant]) -> Result<Variant> {
        let handle = self.handle()?;
        let bind = self
            .engine
            .method_bind(self.native_class(), method)
            .ok_or_else(|| BridgeError::NativeBindingNotFound {
                binding: format!("{}.{}", self.native_class(), method),
            })?;

        let raw = args
            .iter()
            .map(|arg| arg.with_native(|native| native.clone()))
            .collect::<Result<SmallVec<[NativeVariant; 4]>>>()?;
        let borrowed: SmallVec<[&NativeVariant; 4]> = raw.iter().collect();

        let result = self.engine.call(handle, bind, &borrowed);
        Ok(Variant::take_ownership_with(self.engine.clone(), result))
    }

    /// Read a property. Missing properties read as Nil.
    pub fn get(&self, property: &str) -> Result<Variant> {
        let handle = self.handle()?;
        Ok(match self.engine.get_property(handle, property) {
            Some(value) => Variant::take_ownership_with(self.engine.clone(), value),
            None => Variant::nil(),
        })
    }

    pub fn set(&self, property: &str, value: &Variant) -> Result<()> {
        let handle = self.handle()?;
        let raw = value.with_native(|native| native.clone())?;
        if self.engine.set_property(handle, property, &raw) {
            Ok(())
        } else {
            Err(BridgeError::NativeBindingNotFound {
                binding: format!("{}.{}", self.native_class(), property),
            })
        }
    }

    /// Bind a delegate to a declared signal. Its arity must match the declaration.
    pub fn connect(&self, signal: &str, delegate: Delegate) -> Result<DelegateId> {
        self.handle()?;
        self.signals.connect(self.class.name(), signal, delegate)
    }

    pub fn disconnect(&self, signal: &str, id: DelegateId) -> bool {
        self.signals.disconnect(signal, id)
    }

    pub fn delegate_count(&self, signal: &str) -> usize {
        self.signals.delegate_count(signal)
    }

    /// Deliver a signal emission to the bound delegates
    pub fn raise_event_signal(&self, signal: &str, args: &[Variant]) -> Result<()> {
        self.signals.dispatch(self.class.name(), signal, args)
    }

    /// Signals with a slot on this instance, most derived class first
    pub fn signal_names(&self) -> Vec<StringName> {
        self.signals.signal_names()
    }
}

impl Disposable for EngineObject {
    fn dispose(&self) {
        EngineObject::dispose(self);
    }

    fn describe(&self) -> String {
        format!(
            "{}({})",
            self.class.name(),
            NativeHandle::from_raw(self.handle.load(Ordering::Acquire))
        )
    }
}

impl Drop for EngineObject {
    fn drop(&mut self) {
        if self.is_disposed() {
            return;
        }
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.release(true))) {
            log_finalizer_fault(self.class.name(), &panic_message(panic.as_ref()));
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl fmt::Display for EngineObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_native_string() {
            Ok(text) => f.write_str(&text),
            Err(_) => write!(f, "<Freed {}>", self.class.name()),
        }
    }
}

impl fmt::Debug for EngineObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineObject")
            .field("class", &self.class.name())
            .field("handle", &NativeHandle::from_raw(self.handle.load(Ordering::Acquire)))
            .field("ownership", &self.ownership)
            .finish()
    }
}
