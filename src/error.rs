//! Bridge errors
//!
//! Every fault surfaces synchronously to the immediate caller. The one
//! non-error outcome, "no subscriber bound to this signal", is an `Ok(())`
//! and never appears here.

use thiserror::Error;

use crate::variant::VariantType;

/// Errors raised at the managed/native boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Handle access on an instance that was already disposed.
    #[error("cannot access a disposed object of type '{type_name}'")]
    UseAfterDispose { type_name: String },

    /// The native side has no method or constructor binding for the pair.
    #[error("native binding not found: {binding}")]
    NativeBindingNotFound { binding: String },

    /// Delivered argument count differs from the bound delegate's arity.
    #[error("signal '{signal}' expects {expected} arguments, but received {received}")]
    SignalArgumentCountMismatch {
        signal: String,
        expected: usize,
        received: usize,
    },

    /// Variant extraction requested an incompatible shape.
    #[error("cannot convert variant of type {from} to {to}")]
    TypeConversionFailure { from: VariantType, to: &'static str },

    /// A declared signal has no slot on the instance. Internal consistency fault.
    #[error("signal '{signal}' declared on '{class}' has no invocable slot")]
    MissingInvocationSurface { class: String, signal: String },

    #[error("class '{class}' is not registered")]
    UnknownClass { class: String },

    #[error("class '{class}' declares no signal '{signal}'")]
    UnknownSignal { class: String, signal: String },

    #[error("cannot attach '{class}' to a null native handle")]
    NullHandle { class: String },

    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    pub(crate) fn conversion(from: VariantType, to: &'static str) -> Self {
        Self::TypeConversionFailure { from, to }
    }

    pub(crate) fn disposed(type_name: impl Into<String>) -> Self {
        Self::UseAfterDispose {
            type_name: type_name.into(),
        }
    }

    /// Faults that indicate a broken invariant inside the bridge rather than misuse.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::MissingInvocationSurface { .. })
    }
}

pub type Result<T, E = BridgeError> = std::result::Result<T, E>;
