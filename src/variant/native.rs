//! Native variant payloads
//!
//! `NativeVariant` is the engine's own representation of a value. A Rust
//! `clone()` is a raw bitwise copy: it takes no references. Ownership
//! transfer and reference-taking copies go through
//! `NativeEngine::variant_new_copy` / `variant_destroy` only.

use std::borrow::Borrow;
use std::fmt;
use std::sync::Arc;

use super::kind::VariantType;
use super::math::{
    Aabb, Color, Plane, Quaternion, Rect2, Rect2i, Rid, Transform2D, Vector2, Vector2i, Vector3,
    Vector3i,
};
use crate::native::NativeHandle;

/// Interned identifier. Clones share one allocation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StringName(Arc<str>);

impl StringName {
    pub fn new(name: &str) -> Self {
        Self(Arc::from(name))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "&{:?}", self.as_str())
    }
}

impl fmt::Display for StringName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for StringName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for StringName {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for StringName {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

/// Path to a node in the scene tree, e.g. `"Root/Player:position"`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NodePath(String);

impl NodePath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodePath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

/// Object payload: the handle plus the native class it was created as
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub handle: NativeHandle,
    pub class: StringName,
}

/// Bound method reference. The target is a weak id, it takes no reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Callable {
    pub target: Option<NativeHandle>,
    pub method: StringName,
}

/// A named signal on a particular object
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SignalInfo {
    pub owner: NativeHandle,
    pub name: StringName,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NativeVariant {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Vector2(Vector2),
    Vector2i(Vector2i),
    Rect2(Rect2),
    Rect2i(Rect2i),
    Vector3(Vector3),
    Vector3i(Vector3i),
    Plane(Plane),
    Quaternion(Quaternion),
    Color(Color),
    Rid(Rid),
    Transform2D(Box<Transform2D>),
    Aabb(Box<Aabb>),
    String(String),
    StringName(StringName),
    NodePath(NodePath),
    Object(Option<ObjectRef>),
    Callable(Callable),
    Signal(SignalInfo),
    Dictionary(Vec<(NativeVariant, NativeVariant)>),
    Array(Vec<NativeVariant>),
    PackedByteArray(Vec<u8>),
    PackedInt32Array(Vec<i32>),
    PackedInt64Array(Vec<i64>),
    PackedFloat32Array(Vec<f32>),
    PackedFloat64Array(Vec<f64>),
    PackedStringArray(Vec<String>),
    PackedVector2Array(Vec<Vector2>),
    PackedVector3Array(Vec<Vector3>),
    PackedColorArray(Vec<Color>),
}

impl Default for NativeVariant {
    fn default() -> Self {
        Self::Nil
    }
}

impl NativeVariant {
    pub fn variant_type(&self) -> VariantType {
        match self {
            Self::Nil => VariantType::Nil,
            Self::Bool(_) => VariantType::Bool,
            Self::Int(_) => VariantType::Int,
            Self::Float(_) => VariantType::Float,
            Self::Vector2(_) => VariantType::Vector2,
            Self::Vector2i(_) => VariantType::Vector2i,
            Self::Rect2(_) => VariantType::Rect2,
            Self::Rect2i(_) => VariantType::Rect2i,
            Self::Vector3(_) => VariantType::Vector3,
            Self::Vector3i(_) => VariantType::Vector3i,
            Self::Plane(_) => VariantType::Plane,
            Self::Quaternion(_) => VariantType::Quaternion,
            Self::Color(_) => VariantType::Color,
            Self::Rid(_) => VariantType::Rid,
            Self::Transform2D(_) => VariantType::Transform2D,
            Self::Aabb(_) => VariantType::Aabb,
            Self::String(_) => VariantType::String,
            Self::StringName(_) => VariantType::StringName,
            Self::NodePath(_) => VariantType::NodePath,
            Self::Object(_) => VariantType::Object,
            Self::Callable(_) => VariantType::Callable,
            Self::Signal(_) => VariantType::Signal,
            Self::Dictionary(_) => VariantType::Dictionary,
            Self::Array(_) => VariantType::Array,
            Self::PackedByteArray(_) => VariantType::PackedByteArray,
            Self::PackedInt32Array(_) => VariantType::PackedInt32Array,
            Self::PackedInt64Array(_) => VariantType::PackedInt64Array,
            Self::PackedFloat32Array(_) => VariantType::PackedFloat32Array,
            Self::PackedFloat64Array(_) => VariantType::PackedFloat64Array,
            Self::PackedStringArray(_) => VariantType::PackedStringArray,
            Self::PackedVector2Array(_) => VariantType::PackedVector2Array,
            Self::PackedVector3Array(_) => VariantType::PackedVector3Array,
            Self::PackedColorArray(_) => VariantType::PackedColorArray,
        }
    }

    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    /// Visit every object handle reachable from this value, containers included
    pub fn visit_objects(&self, f: &mut impl FnMut(NativeHandle)) {
        match self {
            Self::Object(Some(obj)) => f(obj.handle),
            Self::Array(items) => {
                for item in items {
                    item.visit_objects(f);
                }
            }
            Self::Dictionary(entries) => {
                for (key, value) in entries {
                    key.visit_objects(f);
                    value.visit_objects(f);
                }
            }
            _ => {}
        }
    }

    /// Object payload with the given handle and native class
    pub fn object(handle: NativeHandle, class: &str) -> Self {
        if handle.is_null() {
            Self::Object(None)
        } else {
            Self::Object(Some(ObjectRef {
                handle,
                class: StringName::new(class),
            }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visit_objects_recurses_containers() {
        let a = NativeHandle::from_raw(0x10);
        let b = NativeHandle::from_raw(0x20);
        let value = NativeVariant::Array(vec![
            NativeVariant::object(a, "Object"),
            NativeVariant::Int(3),
            NativeVariant::Dictionary(vec![(
                NativeVariant::String("k".to_string()),
                NativeVariant::object(b, "RefCounted"),
            )]),
            NativeVariant::object(NativeHandle::NULL, "Object"),
        ]);

        let mut seen = Vec::new();
        value.visit_objects(&mut |h| seen.push(h));
        assert_eq!(seen, vec![a, b]);
    }

    #[test]
    fn test_string_name_shares_storage() {
        let name = StringName::new("ready");
        let copy = name.clone();
        assert_eq!(copy, name);
        assert_eq!(copy.to_string(), "ready");
        assert_eq!(format!("{:?}", name), "&\"ready\"");
    }
}
