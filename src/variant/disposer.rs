//! Variant disposer - sole owner of one native variant resource
//!
//! Design: the payload sits behind a mutex as `Option`, and release is a
//! `take()`, so the native destroy call runs at most once no matter how
//! many clones race on `dispose` or `Drop`. The disposer registers a weak
//! reference to itself with the tracker while it holds a payload.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use super::kind::VariantType;
use super::native::NativeVariant;
use crate::error::{BridgeError, Result};
use crate::logging::log_variant_released;
use crate::native::NativeEngine;
use crate::tracker::{self, Disposable, TrackingToken};

pub(crate) struct Disposer {
    native: Mutex<Option<NativeVariant>>,
    engine: Arc<dyn NativeEngine>,
    kind: VariantType,
    token: TrackingToken,
}

impl Disposer {
    /// Adopt an owned native value and register with the tracker
    pub(crate) fn new(engine: Arc<dyn NativeEngine>, native: NativeVariant) -> Arc<Self> {
        let kind = native.variant_type();
        Arc::new_cyclic(|weak: &Weak<Disposer>| {
            let owner: Weak<dyn Disposable> = weak.clone();
            Self {
                native: Mutex::new(Some(native)),
                engine,
                kind,
                token: tracker::register_disposable(owner),
            }
        })
    }

    #[inline]
    pub(crate) fn engine(&self) -> &Arc<dyn NativeEngine> {
        &self.engine
    }

    pub(crate) fn is_released(&self) -> bool {
        self.native.lock().is_none()
    }

    /// Run `f` against the payload. The lock is held for the call, so `f`
    /// must not re-enter this disposer.
    pub(crate) fn with<R>(&self, f: impl FnOnce(&NativeVariant) -> R) -> Result<R> {
        match self.native.lock().as_ref() {
            Some(native) => Ok(f(native)),
            None => Err(BridgeError::disposed("Variant")),
        }
    }

    /// Destroy the payload. Returns `false` if it was already released.
    pub(crate) fn release(&self) -> bool {
        let taken = self.native.lock().take();
        match taken {
            Some(native) => {
                self.engine.variant_destroy(native);
                tracker::unregister_disposable(&self.token);
                log_variant_released(self.kind.name(), self.token.id());
                true
            }
            None => false,
        }
    }
}

impl Disposable for Disposer {
    fn dispose(&self) {
        self.release();
    }

    fn describe(&self) -> String {
        format!("Variant({})", self.kind)
    }
}

impl Drop for Disposer {
    fn drop(&mut self) {
        self.release();
    }
}
