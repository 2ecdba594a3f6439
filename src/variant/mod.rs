//! Tagged variant - the universal value crossing the boundary
//!
//! Design: construction mode is always explicit.
//! - `copy_borrowed` deep-copies a value the caller keeps owning
//! - `take_ownership` adopts a value the caller hands over
//!
//! Trivial kinds are stored inline. Resource kinds are held by exactly one
//! `Disposer`, shared between clones through an `Arc`, so the native
//! release happens once: on `dispose()` or when the last clone drops.

mod convert;
mod disposer;
mod kind;
mod marshal;
mod math;
mod native;


pub use convert::FromVariant;
pub use kind::VariantType;
pub use marshal::ManagedValue;
pub use math::{
    Aabb, Color, Plane, Quaternion, Rect2, Rect2i, Rid, Transform2D, Vector2, Vector2i, Vector3,
    Vector3i,
};
pub use native::{Callable, NativeVariant, NodePath, ObjectRef, SignalInfo, StringName};

use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::native::{self as engine_api, NativeEngine};
use disposer::Disposer;

#[derive(Clone)]
enum Repr {
    Inline(NativeVariant),
    Owned(Arc<Disposer>),
}

pub struct Variant {
    kind: VariantType,
    repr: Repr,
    obj: OnceCell<ManagedValue>,
}

impl Variant {
    pub fn nil() -> Self {
        Self::inline(NativeVariant::Nil)
    }

    fn inline(native: NativeVariant) -> Self {
        Self {
            kind: native.variant_type(),
            repr: Repr::Inline(native),
            obj: OnceCell::new(),
        }
    }

    /// Adopt a value the caller exclusively owns; released through the current engine
    pub fn take_ownership(native: NativeVariant) -> Self {
        Self::take_ownership_with(engine_api::current(), native)
    }

    pub fn take_ownership_with(engine: Arc<dyn NativeEngine>, native: NativeVariant) -> Self {
        let kind = native.variant_type();
        if kind.is_trivial() {
            return Self::inline(native);
        }

        Self {
            kind,
            repr: Repr::Owned(Disposer::new(engine, native)),
            obj: OnceCell::new(),
        }
    }

    /// Independent copy of a value the caller keeps owning
    pub fn copy_borrowed(native: &NativeVariant) -> Self {
        Self::copy_borrowed_with(engine_api::current(), native)
    }

    pub fn copy_borrowed_with(engine: Arc<dyn NativeEngine>, native: &NativeVariant) -> Self {
        if native.variant_type().is_trivial() {
            return Self::inline(native.clone());
        }

        let copy = engine.variant_new_copy(native);
        Self::take_ownership_with(engine, copy)
    }

    #[inline]
    pub fn kind(&self) -> VariantType {
        self.kind
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        self.kind == VariantType::Nil
    }

    /// True once the shared resource has been released (never for trivial kinds)
    pub fn is_disposed(&self) -> bool {
        match &self.repr {
            Repr::Inline(_) => false,
            Repr::Owned(disposer) => disposer.is_released(),
        }
    }

    /// Release the owned resource now. Clones observe `UseAfterDispose`
    /// afterwards; this variant becomes Nil.
    pub fn dispose(&mut self) {
        if let Repr::Owned(disposer) = &self.repr {
            disposer.release();
        }
        self.kind = VariantType::Nil;
        self.repr = Repr::Inline(NativeVariant::Nil);
        self.obj = OnceCell::new();
    }

    /// Borrow the native payload
    pub fn with_native<R>(&self, f: impl FnOnce(&NativeVariant) -> R) -> Result<R> {
        match &self.repr {
            Repr::Inline(native) => Ok(f(native)),
            Repr::Owned(disposer) => disposer.with(f),
        }
    }

    /// Owned native copy, for handing to an engine that takes ownership
    pub fn to_native(&self) -> Result<NativeVariant> {
        let engine = self.engine();
        self.with_native(|native| {
            if native.variant_type().is_trivial() {
                native.clone()
            } else {
                engine.variant_new_copy(native)
            }
        })
    }

    /// Independent variant with its own disposer
    pub fn duplicate(&self) -> Result<Variant> {
        let engine = self.engine();
        self.with_native(|native| Variant::copy_borrowed_with(engine, native))
    }

    /// Managed projection, computed on first access and cached
    pub fn obj(&self) -> Result<&ManagedValue> {
        if self.is_disposed() {
            return Err(BridgeError::disposed("Variant"));
        }
        self.obj.get_or_try_init(|| ManagedValue::from_variant(self))
    }

    /// Engine that releases this variant (the current engine for trivial kinds)
    pub(crate) fn engine(&self) -> Arc<dyn NativeEngine> {
        match &self.repr {
            Repr::Inline(_) => engine_api::current(),
            Repr::Owned(disposer) => disposer.engine().clone(),
        }
    }

    /// Shares the disposer, when there is one
    pub(crate) fn shares_resource_with(&self, other: &Variant) -> bool {
        match (&self.repr, &other.repr) {
            (Repr::Owned(a), Repr::Owned(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Clone for Variant {
    fn clone(&self) -> Self {
        Self {
            kind: self.kind,
            repr: self.repr.clone(),
            obj: self.obj.clone(),
        }
    }
}

impl Default for Variant {
    fn default() -> Self {
        Self::nil()
    }
}

impl fmt::Debug for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.with_native(|native| format!("{:?}", native)) {
            Ok(repr) => write!(f, "Variant({})", repr),
            Err(_) => write!(f, "Variant(<disposed {}>)", self.kind),
        }
    }
}

impl PartialEq for Variant {
    /// Value equality of the native payloads; disposed variants are never equal
    fn eq(&self, other: &Self) -> bool {
        if self.shares_resource_with(other) {
            return !self.is_disposed();
        }
        let lhs = match self.with_native(|native| native.clone()) {
            Ok(native) => native,
            Err(_) => return false,
        };
        other.with_native(|rhs| lhs == *rhs).unwrap_or(false)
    }
}
