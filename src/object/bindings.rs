//! Instance bindings - native handle to managed wrapper
//!
//! The native side only knows handles. Emissions it routes back to the
//! managed side are resolved here. Entries are weak; a wrapper removes its
//! own entry when it releases its handle.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use smallvec::SmallVec;
use std::sync::{Arc, Weak};

use super::EngineObject;
use crate::error::Result;
use crate::logging::trace;
use crate::native::NativeHandle;
use crate::variant::{NativeVariant, Variant};

static BINDINGS: Lazy<DashMap<usize, Weak<EngineObject>>> = Lazy::new(DashMap::new);

pub(crate) fn register(handle: NativeHandle, instance: Weak<EngineObject>) {
    BINDINGS.insert(handle.as_raw(), instance);
}

/// Remove `handle`'s entry if it still points at `instance`
pub(crate) fn unregister(handle: NativeHandle, instance: *const EngineObject) {
    BINDINGS.remove_if(&handle.as_raw(), |_, bound| std::ptr::eq(bound.as_ptr(), instance));
}

/// Live wrapper for `handle`, if one exists
pub fn lookup(handle: NativeHandle) -> Option<Arc<EngineObject>> {
    BINDINGS
        .get(&handle.as_raw())
        .and_then(|entry| entry.value().upgrade())
}

/// Number of handles with a bound wrapper
pub fn live_instances() -> usize {
    BINDINGS.len()
}

/// Entry point for native emissions.
///
/// `args` stay owned by the caller; each is copy-borrowed into a variant
/// before dispatch. A handle without a wrapper has nobody to notify.
pub fn raise_event_signal(handle: NativeHandle, signal: &str, args: &[NativeVariant]) -> Result<()> {
    let instance = match lookup(handle) {
        Some(instance) => instance,
        None => {
            trace!(event = "signal_unbound", handle = handle.as_raw(), signal);
            return Ok(());
        }
    };

    let engine = instance.engine();
    let variants: SmallVec<[Variant; 4]> = args
        .iter()
        .map(|arg| Variant::copy_borrowed_with(engine.clone(), arg))
        .collect();

    instance.raise_event_signal(signal, &variants)
}
