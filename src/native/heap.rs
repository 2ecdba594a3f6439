//! In-process engine core
//!
//! Keeps native objects in a concurrent table, honours reference counts
//! (including references held by object variants) and counts every
//! allocation, release and variant copy so the bridge's exactly-once
//! guarantees can be observed.

use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use super::{MethodBind, NativeEngine, NativeHandle};
use crate::error::Result;
use crate::logging::{debug, trace};
use crate::object::bindings;
use crate::variant::{NativeVariant, StringName};

/// Handles are unique across every engine in the process, like addresses
static NEXT_HANDLE: AtomicUsize = AtomicUsize::new(0x1000);

const HANDLE_STRIDE: usize = 0x10;

/// Native method body: engine, receiver and borrowed arguments; owned result
pub type MethodFn = dyn Fn(&HeapEngine, NativeHandle, &[&NativeVariant]) -> NativeVariant + Send + Sync;

struct NativeClass {
    base: Option<String>,
    ref_counted: bool,
}

struct HeapObject {
    class: String,
    script_class: Option<String>,
    ref_counted: bool,
    refcount: u32,
    properties: HashMap<String, NativeVariant>,
    signals: Vec<StringName>,
}

#[derive(Default)]
struct Counters {
    objects_created: AtomicUsize,
    objects_freed: AtomicUsize,
    exclusive_releases: AtomicUsize,
    refcounted_releases: AtomicUsize,
    finalizer_releases: AtomicUsize,
    variants_copied: AtomicUsize,
    variants_destroyed: AtomicUsize,
}

/// Engine counters for assertions and monitoring
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    pub objects_created: usize,
    pub objects_freed: usize,
    pub live_objects: usize,
    pub exclusive_releases: usize,
    pub refcounted_releases: usize,
    pub finalizer_releases: usize,
    pub variants_copied: usize,
    pub variants_destroyed: usize,
}

pub struct HeapEngine {
    classes: DashMap<String, NativeClass>,
    objects: DashMap<usize, HeapObject>,
    method_binds: DashMap<(String, String), MethodBind>,
    methods: DashMap<usize, Arc<MethodFn>>,
    next_method: AtomicUsize,
    counters: Counters,
}

impl HeapEngine {
    /// Engine with the foundational classes `Object`, `RefCounted`, `Node`, `Resource`
    pub fn new() -> Self {
        let engine = Self {
            classes: DashMap::new(),
            objects: DashMap::new(),
            method_binds: DashMap::new(),
            methods: DashMap::new(),
            next_method: AtomicUsize::new(1),
            counters: Counters::default(),
        };

        engine.register_class("Object", None, false);
        engine.register_class("RefCounted", Some("Object"), true);
        engine.register_class("Node", Some("Object"), false);
        engine.register_class("Resource", Some("RefCounted"), true);

        engine.register_method("Object", "get_class", |engine, handle, _| {
            NativeVariant::String(engine.class_of(handle).unwrap_or_default())
        });
        engine.register_method("Object", "get_instance_id", |_, handle, _| {
            NativeVariant::Int(handle.as_raw() as i64)
        });

        engine
    }

    pub fn register_class(&self, name: &str, base: Option<&str>, ref_counted: bool) {
        self.classes.insert(
            name.to_string(),
            NativeClass {
                base: base.map(str::to_string),
                ref_counted,
            },
        );
    }

    pub fn register_method<F>(&self, class: &str, method: &str, body: F) -> MethodBind
    where
        F: Fn(&HeapEngine, NativeHandle, &[&NativeVariant]) -> NativeVariant + Send + Sync + 'static,
    {
        let bind = MethodBind(self.next_method.fetch_add(1, Ordering::Relaxed));
        self.methods.insert(bind.0, Arc::new(body));
        self.method_binds
            .insert((class.to_string(), method.to_string()), bind);
        bind
    }

    /// Native-side allocation, e.g. a factory result. The native side holds
    /// one reference to reference-counted objects until `release_native_reference`.
    pub fn create_object(&self, class: &str) -> Option<NativeHandle> {
        let handle = self.instantiate(class)?;
        if let Some(mut obj) = self.objects.get_mut(&handle.as_raw()) {
            if obj.ref_counted {
                obj.refcount += 1;
            }
        }
        Some(handle)
    }

    /// Drop the native side's own reference to a reference-counted object
    pub fn release_native_reference(&self, handle: NativeHandle) {
        self.unreference(handle);
    }

    pub fn is_alive(&self, handle: NativeHandle) -> bool {
        self.objects.contains_key(&handle.as_raw())
    }

    pub fn refcount(&self, handle: NativeHandle) -> Option<u32> {
        self.objects.get(&handle.as_raw()).map(|obj| obj.refcount)
    }

    /// Native class of a live object
    pub fn class_of(&self, handle: NativeHandle) -> Option<String> {
        self.objects.get(&handle.as_raw()).map(|obj| obj.class.clone())
    }

    /// Script class registered by pre-setup tying, if any
    pub fn script_class(&self, handle: NativeHandle) -> Option<String> {
        self.objects
            .get(&handle.as_raw())
            .and_then(|obj| obj.script_class.clone())
    }

    pub fn connected_signals(&self, handle: NativeHandle) -> Vec<StringName> {
        self.objects
            .get(&handle.as_raw())
            .map(|obj| obj.signals.clone())
            .unwrap_or_default()
    }

    /// Emit a signal from the native side. The engine owns `args` and
    /// releases them once the managed side has been notified.
    pub fn emit_signal(&self, handle: NativeHandle, signal: &str, args: Vec<NativeVariant>) -> Result<()> {
        let connected = self
            .objects
            .get(&handle.as_raw())
            .map(|obj| obj.signals.iter().any(|s| s.as_str() == signal))
            .unwrap_or(false);

        let result = if connected {
            bindings::raise_event_signal(handle, signal, &args)
        } else {
            trace!(event = "emit_unconnected", handle = handle.as_raw(), signal);
            Ok(())
        };

        for arg in args {
            self.variant_destroy(arg);
        }
        result
    }

    pub fn stats(&self) -> EngineStats {
        let c = &self.counters;
        EngineStats {
            objects_created: c.objects_created.load(Ordering::Relaxed),
            objects_freed: c.objects_freed.load(Ordering::Relaxed),
            live_objects: self.objects.len(),
            exclusive_releases: c.exclusive_releases.load(Ordering::Relaxed),
            refcounted_releases: c.refcounted_releases.load(Ordering::Relaxed),
            finalizer_releases: c.finalizer_releases.load(Ordering::Relaxed),
            variants_copied: c.variants_copied.load(Ordering::Relaxed),
            variants_destroyed: c.variants_destroyed.load(Ordering::Relaxed),
        }
    }

    fn is_ref_counted_object(&self, handle: NativeHandle) -> bool {
        self.objects
            .get(&handle.as_raw())
            .map(|obj| obj.ref_counted)
            .unwrap_or(false)
    }

    fn reference(&self, handle: NativeHandle) {
        if let Some(mut obj) = self.objects.get_mut(&handle.as_raw()) {
            obj.refcount += 1;
        }
    }

    fn unreference(&self, handle: NativeHandle) {
        // Guard must be gone before `free` touches the table again
        let reached_zero = match self.objects.get_mut(&handle.as_raw()) {
            Some(mut obj) => {
                debug_assert!(obj.refcount > 0, "refcount underflow");
                obj.refcount = obj.refcount.saturating_sub(1);
                obj.refcount == 0
            }
            None => false,
        };

        if reached_zero {
            self.free(handle);
        }
    }

    fn free(&self, handle: NativeHandle) {
        if let Some((_, obj)) = self.objects.remove(&handle.as_raw()) {
            self.counters.objects_freed.fetch_add(1, Ordering::Relaxed);
            debug!(event = "native_free", handle = handle.as_raw(), class = %obj.class);
            for (_, value) in obj.properties {
                self.release_refs(&value);
            }
        }
    }

    /// Walk a value, taking one reference on every reference-counted object in it
    fn retain_refs(&self, value: &NativeVariant) {
        value.visit_objects(&mut |handle| {
            if self.is_ref_counted_object(handle) {
                self.reference(handle);
            }
        });
    }

    fn release_refs(&self, value: &NativeVariant) {
        value.visit_objects(&mut |handle| {
            if self.is_ref_counted_object(handle) {
                self.unreference(handle);
            }
        });
    }

    fn resolve_method(&self, class: &str, method: &str) -> Option<MethodBind> {
        let mut current = Some(class.to_string());
        while let Some(name) = current {
            if let Some(bind) = self.method_binds.get(&(name.clone(), method.to_string())) {
                return Some(*bind);
            }
            current = self.classes.get(&name).and_then(|c| c.base.clone());
        }
        None
    }
}

impl Default for HeapEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeEngine for HeapEngine {
    fn instantiate(&self, native_class: &str) -> Option<NativeHandle> {
        let ref_counted = self.classes.get(native_class)?.ref_counted;
        let handle = NativeHandle::from_raw(NEXT_HANDLE.fetch_add(HANDLE_STRIDE, Ordering::Relaxed));

        self.objects.insert(
            handle.as_raw(),
            HeapObject {
                class: native_class.to_string(),
                script_class: None,
                ref_counted,
                refcount: 0,
                properties: HashMap::new(),
                signals: Vec::new(),
            },
        );
        self.counters.objects_created.fetch_add(1, Ordering::Relaxed);
        trace!(event = "native_alloc", handle = handle.as_raw(), class = native_class);
        Some(handle)
    }

    fn tie_managed(&self, handle: NativeHandle, native_class: &str, ref_counted: bool) {
        if let Some(mut obj) = self.objects.get_mut(&handle.as_raw()) {
            debug_assert_eq!(obj.class, native_class);
            debug_assert_eq!(obj.ref_counted, ref_counted);
            if ref_counted {
                obj.refcount += 1;
            }
        }
    }

    fn tie_managed_with_pre_setup(&self, handle: NativeHandle, class: &str, ref_counted: bool) {
        if let Some(mut obj) = self.objects.get_mut(&handle.as_raw()) {
            obj.script_class = Some(class.to_string());
            if ref_counted {
                obj.refcount += 1;
            }
        }
    }

    fn object_disposed(&self, handle: NativeHandle) {
        self.counters.exclusive_releases.fetch_add(1, Ordering::Relaxed);
        self.free(handle);
    }

    fn refcounted_disposed(&self, handle: NativeHandle, is_finalizer: bool) {
        self.counters.refcounted_releases.fetch_add(1, Ordering::Relaxed);
        if is_finalizer {
            self.counters.finalizer_releases.fetch_add(1, Ordering::Relaxed);
        }
        self.unreference(handle);
    }

    fn object_to_string(&self, handle: NativeHandle) -> String {
        match self.objects.get(&handle.as_raw()) {
            Some(obj) => {
                let class = obj.script_class.as_deref().unwrap_or(&obj.class);
                format!("<{}#{}>", class, handle.as_raw())
            }
            None => "<Freed Object>".to_string(),
        }
    }

    fn connect_event_signal(&self, handle: NativeHandle, signal: &StringName) {
        if let Some(mut obj) = self.objects.get_mut(&handle.as_raw()) {
            if !obj.signals.contains(signal) {
                obj.signals.push(signal.clone());
            }
        }
    }

    fn disconnect_event_signals(&self, handle: NativeHandle) {
        if let Some(mut obj) = self.objects.get_mut(&handle.as_raw()) {
            if !obj.signals.is_empty() {
                trace!(event = "signals_disconnected", handle = handle.as_raw(), count = obj.signals.len());
                obj.signals.clear();
            }
        }
    }

    fn method_bind(&self, class: &str, method: &str) -> Option<MethodBind> {
        self.resolve_method(class, method)
    }

    fn call(&self, handle: NativeHandle, method: MethodBind, args: &[&NativeVariant]) -> NativeVariant {
        let body = self.methods.get(&method.0).map(|m| Arc::clone(m.value()));
        match body {
            Some(body) => body(self, handle, args),
            None => NativeVariant::Nil,
        }
    }

    fn get_property(&self, handle: NativeHandle, name: &str) -> Option<NativeVariant> {
        let stored = self
            .objects
            .get(&handle.as_raw())
            .and_then(|obj| obj.properties.get(name).cloned())?;
        Some(self.variant_new_copy(&stored))
    }

    fn set_property(&self, handle: NativeHandle, name: &str, value: &NativeVariant) -> bool {
        let copy = self.variant_new_copy(value);
        let previous = match self.objects.get_mut(&handle.as_raw()) {
            Some(mut obj) => obj.properties.insert(name.to_string(), copy),
            None => {
                self.variant_destroy(copy);
                return false;
            }
        };

        if let Some(old) = previous {
            self.variant_destroy(old);
        }
        true
    }

    fn variant_new_copy(&self, value: &NativeVariant) -> NativeVariant {
        self.counters.variants_copied.fetch_add(1, Ordering::Relaxed);
        self.retain_refs(value);
        value.clone()
    }

    fn variant_destroy(&self, value: NativeVariant) {
        self.counters.variants_destroyed.fetch_add(1, Ordering::Relaxed);
        self.release_refs(&value);
    }
}
