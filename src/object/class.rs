//! Class table - registered classes, their bases and declared signals
//!
//! Design: one process-wide table keyed by class name. Native classes
//! (the ones the engine can instantiate) are seeded at first use; script
//! classes are registered on top of them through `ClassBuilder`.
//! Re-registering a name replaces its entry (hot reload). Live instances
//! keep the `ClassInfo` they were built from.

use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::error::{BridgeError, Result};
use crate::logging::debug;
use crate::variant::{StringName, VariantType};

static CLASS_DB: Lazy<ClassDb> = Lazy::new(ClassDb::with_natives);

/// Signal declaration: name plus ordered parameter kinds
#[derive(Debug, Clone, PartialEq)]
pub struct SignalDecl {
    pub name: StringName,
    pub params: Vec<VariantType>,
}

impl SignalDecl {
    pub fn new(name: &str, params: &[VariantType]) -> Self {
        Self {
            name: StringName::new(name),
            params: params.to_vec(),
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

#[derive(Debug)]
pub struct ClassInfo {
    name: StringName,
    base: Option<StringName>,
    is_native: bool,
    ref_counted: bool,
    signals: Vec<SignalDecl>,
}

impl ClassInfo {
    #[inline]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn base(&self) -> Option<&str> {
        self.base.as_ref().map(StringName::as_str)
    }

    #[inline]
    pub fn is_native(&self) -> bool {
        self.is_native
    }

    /// Whether instances are reference counted (inherited from the native base)
    #[inline]
    pub fn is_ref_counted(&self) -> bool {
        self.ref_counted
    }

    /// Signals declared at this level, in declaration order
    pub fn signals(&self) -> &[SignalDecl] {
        &self.signals
    }

    pub fn signal(&self, name: &str) -> Option<&SignalDecl> {
        self.signals.iter().find(|decl| decl.name.as_str() == name)
    }
}

pub struct ClassDb {
    classes: DashMap<String, Arc<ClassInfo>>,
}

impl ClassDb {
    fn with_natives() -> Self {
        let db = Self {
            classes: DashMap::new(),
        };
        db.insert_native("Object", None, false);
        db.insert_native("RefCounted", Some("Object"), true);
        db.insert_native("Node", Some("Object"), false);
        db.insert_native("Resource", Some("RefCounted"), true);
        db
    }

    fn insert_native(&self, name: &str, base: Option<&str>, ref_counted: bool) -> Arc<ClassInfo> {
        let info = Arc::new(ClassInfo {
            name: StringName::new(name),
            base: base.map(StringName::new),
            is_native: true,
            ref_counted,
            signals: Vec::new(),
        });
        self.classes.insert(name.to_string(), info.clone());
        info
    }

    /// Declare a class the engine can instantiate. Its base, if any, must be native.
    pub fn register_native(&self, name: &str, base: Option<&str>, ref_counted: bool) -> Result<Arc<ClassInfo>> {
        if let Some(base) = base {
            let base_info = self.get(base).ok_or_else(|| unknown(base))?;
            if !base_info.is_native {
                return Err(unknown(base));
            }
        }
        Ok(self.insert_native(name, base, ref_counted))
    }

    fn register(&self, builder: ClassBuilder) -> Result<Arc<ClassInfo>> {
        // The base chain must already exist and must not lead back to this class
        let mut cursor = Some(builder.base.clone());
        let mut ref_counted = false;
        while let Some(name) = cursor {
            if name == builder.name {
                return Err(BridgeError::UnknownClass {
                    class: format!("{} (inherits from itself)", builder.name),
                });
            }
            let info = self.get(&name).ok_or_else(|| unknown(&name))?;
            if info.is_native {
                ref_counted = info.ref_counted;
                break;
            }
            cursor = info.base().map(str::to_string);
        }

        let info = Arc::new(ClassInfo {
            name: StringName::new(&builder.name),
            base: Some(StringName::new(&builder.base)),
            is_native: false,
            ref_counted,
            signals: builder.signals,
        });

        let replaced = self.classes.insert(builder.name.clone(), info.clone()).is_some();
        debug!(
            event = "class_registered",
            class = %info.name,
            base = %builder.base,
            signals = info.signals.len(),
            replaced,
            "Class registered"
        );
        Ok(info)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ClassInfo>> {
        self.classes.get(name).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Nearest native class at or above `name`
    pub fn native_base(&self, name: &str) -> Result<Arc<ClassInfo>> {
        let mut info = self.get(name).ok_or_else(|| unknown(name))?;
        while !info.is_native {
            let base = info.base().ok_or_else(|| unknown(name))?;
            info = self.get(base).ok_or_else(|| unknown(base))?;
        }
        Ok(info)
    }

    /// Script classes from `name` upwards, stopping before the first native class
    pub fn ancestry(&self, name: &str) -> Result<Vec<Arc<ClassInfo>>> {
        let mut chain = Vec::new();
        let mut cursor = Some(name.to_string());
        while let Some(current) = cursor {
            let info = self.get(&current).ok_or_else(|| unknown(&current))?;
            if info.is_native {
                break;
            }
            cursor = info.base().map(str::to_string);
            chain.push(info);
        }
        Ok(chain)
    }
}

fn unknown(class: &str) -> BridgeError {
    BridgeError::UnknownClass {
        class: class.to_string(),
    }
}

/// Global class table
pub fn class_db() -> &'static ClassDb {
    &CLASS_DB
}

/// Builder for script classes
///
/// ```ignore
/// ClassBuilder::new("Slider")
///     .base("Node")
///     .signal("ValueChanged", &[VariantType::Int])
///     .register()?;
/// ```
#[derive(Debug, Clone)]
pub struct ClassBuilder {
    name: String,
    base: String,
    signals: Vec<SignalDecl>,
}

impl ClassBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base: "Object".to_string(),
            signals: Vec::new(),
        }
    }

    pub fn base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    pub fn signal(mut self, name: &str, params: &[VariantType]) -> Self {
        self.signals.push(SignalDecl::new(name, params));
        self
    }

    /// Register (or replace) the class in the global table
    pub fn register(self) -> Result<Arc<ClassInfo>> {
        CLASS_DB.register(self)
    }
}
