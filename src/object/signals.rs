//! Signal/event bridge - per-instance delegate slots
//!
//! Design: slots are built once per instance from the class ancestry at
//! construction and never recomputed. Dispatch re-resolves the declaring
//! class against the current class table, so a class table that changed
//! after construction is detected instead of silently dropping emissions.
//!
//! Delegates are cloned out of the slot lock before they run; a delegate
//! may freely connect, disconnect or drop objects.

use parking_lot::RwLock;
use smallvec::SmallVec;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::class::{class_db, ClassInfo, SignalDecl};
use crate::error::{BridgeError, Result};
use crate::logging::log_signal_dispatch;
use crate::variant::{FromVariant, StringName, Variant};

type Invoker = dyn Fn(&[Variant]) -> Result<()> + Send + Sync;

/// Receipt for a connected delegate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DelegateId(u64);

/// Managed callback bound to a signal, with a fixed arity
#[derive(Clone)]
pub struct Delegate {
    arity: usize,
    invoke: Arc<Invoker>,
}

impl Delegate {
    pub fn new0<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::dynamic(0, move |_| {
            f();
            Ok(())
        })
    }

    pub fn new1<A, F>(f: F) -> Self
    where
        A: FromVariant,
        F: Fn(A) + Send + Sync + 'static,
    {
        Self::dynamic(1, move |args| {
            if let [a] = args {
                f(A::from_variant(a)?);
            }
            Ok(())
        })
    }

    pub fn new2<A, B, F>(f: F) -> Self
    where
        A: FromVariant,
        B: FromVariant,
        F: Fn(A, B) + Send + Sync + 'static,
    {
        Self::dynamic(2, move |args| {
            if let [a, b] = args {
                f(A::from_variant(a)?, B::from_variant(b)?);
            }
            Ok(())
        })
    }

    pub fn new3<A, B, C, F>(f: F) -> Self
    where
        A: FromVariant,
        B: FromVariant,
        C: FromVariant,
        F: Fn(A, B, C) + Send + Sync + 'static,
    {
        Self::dynamic(3, move |args| {
            if let [a, b, c] = args {
                f(A::from_variant(a)?, B::from_variant(b)?, C::from_variant(c)?);
            }
            Ok(())
        })
    }

    /// Untyped delegate receiving the raw argument variants
    pub fn dynamic<F>(arity: usize, f: F) -> Self
    where
        F: Fn(&[Variant]) -> Result<()> + Send + Sync + 'static,
    {
        Self {
            arity,
            invoke: Arc::new(f),
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity
    }

    fn call(&self, args: &[Variant]) -> Result<()> {
        (self.invoke)(args)
    }
}

impl fmt::Debug for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delegate").field("arity", &self.arity).finish()
    }
}

struct SignalSlot {
    class: StringName,
    decl: SignalDecl,
    delegates: SmallVec<[(DelegateId, Delegate); 2]>,
}

pub struct EventSignalBinding {
    slots: RwLock<Vec<SignalSlot>>,
    next_id: AtomicU64,
}

impl EventSignalBinding {
    /// One slot per signal declared at each level of `ancestry` (most derived first)
    pub(crate) fn build(ancestry: &[Arc<ClassInfo>]) -> Self {
        let slots = ancestry
            .iter()
            .flat_map(|class| {
                class.signals().iter().map(move |decl| SignalSlot {
                    class: StringName::new(class.name()),
                    decl: decl.clone(),
                    delegates: SmallVec::new(),
                })
            })
            .collect();

        Self {
            slots: RwLock::new(slots),
            next_id: AtomicU64::new(1),
        }
    }

    /// Every signal with a slot, in slot order
    pub(crate) fn signal_names(&self) -> Vec<StringName> {
        self.slots.read().iter().map(|slot| slot.decl.name.clone()).collect()
    }

    pub(crate) fn connect(&self, class: &str, signal: &str, delegate: Delegate) -> Result<DelegateId> {
        let mut slots = self.slots.write();
        let slot = slots
            .iter_mut()
            .find(|slot| slot.decl.name.as_str() == signal)
            .ok_or_else(|| BridgeError::UnknownSignal {
                class: class.to_string(),
                signal: signal.to_string(),
            })?;

        if delegate.arity != slot.decl.arity() {
            return Err(BridgeError::SignalArgumentCountMismatch {
                signal: signal.to_string(),
                expected: slot.decl.arity(),
                received: delegate.arity,
            });
        }

        let id = DelegateId(self.next_id.fetch_add(1, Ordering::Relaxed));
        slot.delegates.push((id, delegate));
        Ok(id)
    }

    pub(crate) fn disconnect(&self, signal: &str, id: DelegateId) -> bool {
        let mut slots = self.slots.write();
        for slot in slots.iter_mut().filter(|slot| slot.decl.name.as_str() == signal) {
            if let Some(pos) = slot.delegates.iter().position(|(existing, _)| *existing == id) {
                slot.delegates.remove(pos);
                return true;
            }
        }
        false
    }

    pub(crate) fn delegate_count(&self, signal: &str) -> usize {
        self.slots
            .read()
            .iter()
            .filter(|slot| slot.decl.name.as_str() == signal)
            .map(|slot| slot.delegates.len())
            .sum()
    }

    /// Deliver `signal` to its delegates.
    ///
    /// Undeclared signals and signals without delegates are silent no-ops.
    pub(crate) fn dispatch(&self, class: &str, signal: &str, args: &[Variant]) -> Result<()> {
        let ancestry = class_db().ancestry(class)?;
        let declaring = match ancestry.iter().find(|info| info.signal(signal).is_some()) {
            Some(info) => info,
            None => return Ok(()),
        };

        let delegates: SmallVec<[Delegate; 2]> = {
            let slots = self.slots.read();
            let slot = slots
                .iter()
                .find(|slot| slot.class.as_str() == declaring.name() && slot.decl.name.as_str() == signal)
                .ok_or_else(|| BridgeError::MissingInvocationSurface {
                    class: declaring.name().to_string(),
                    signal: signal.to_string(),
                })?;

            if slot.delegates.is_empty() {
                return Ok(());
            }
            if args.len() != slot.decl.arity() {
                return Err(BridgeError::SignalArgumentCountMismatch {
                    signal: signal.to_string(),
                    expected: slot.decl.arity(),
                    received: args.len(),
                });
            }
            slot.delegates.iter().map(|(_, delegate)| delegate.clone()).collect()
        };

        log_signal_dispatch(class, signal, args.len(), delegates.len());
        for delegate in &delegates {
            delegate.call(args)?;
        }
        Ok(())
    }
}
