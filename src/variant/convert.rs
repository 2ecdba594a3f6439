//! Typed extraction and construction
//!
//! Design: numeric extraction is permissive and never fails on range.
//! Float -> integer truncates toward zero, then narrowing wraps
//! (two's complement). Bool reads as 0/1. Only a kind mismatch is an error.

use num_traits::AsPrimitive;
use std::sync::Arc;

use super::math::{
    Aabb, Color, Plane, Quaternion, Rect2, Rect2i, Rid, Transform2D, Vector2, Vector2i, Vector3,
    Vector3i,
};
use super::native::{Callable, NativeVariant, NodePath, ObjectRef, SignalInfo, StringName};
use super::Variant;
use crate::error::{BridgeError, Result};
use crate::native::{self as engine_api, NativeEngine};
use crate::object::{bindings, EngineObject};

// ============================================================================
// Payload readers shared by scalar and element-wise extraction
// ============================================================================

#[inline]
fn int_of(native: &NativeVariant) -> Option<i64> {
    match native {
        NativeVariant::Int(i) => Some(*i),
        NativeVariant::Float(f) => Some((*f).as_()),
        NativeVariant::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

#[inline]
fn float_of(native: &NativeVariant) -> Option<f64> {
    match native {
        NativeVariant::Float(f) => Some(*f),
        NativeVariant::Int(i) => Some((*i).as_()),
        NativeVariant::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn string_of(native: &NativeVariant) -> Option<String> {
    match native {
        NativeVariant::String(s) => Some(s.clone()),
        NativeVariant::StringName(s) => Some(s.to_string()),
        NativeVariant::NodePath(p) => Some(p.to_string()),
        _ => None,
    }
}

fn vector2_of(native: &NativeVariant) -> Option<Vector2> {
    match native {
        NativeVariant::Vector2(v) => Some(*v),
        NativeVariant::Vector2i(v) => Some(v.to_vector2()),
        _ => None,
    }
}

fn vector3_of(native: &NativeVariant) -> Option<Vector3> {
    match native {
        NativeVariant::Vector3(v) => Some(*v),
        NativeVariant::Vector3i(v) => Some(v.to_vector3()),
        _ => None,
    }
}

fn color_of(native: &NativeVariant) -> Option<Color> {
    match native {
        NativeVariant::Color(c) => Some(*c),
        _ => None,
    }
}

/// Element-wise read of a generic array
fn elements<T>(items: &[NativeVariant], read: impl Fn(&NativeVariant) -> Option<T>) -> Option<Vec<T>> {
    items.iter().map(read).collect()
}

impl Variant {
    /// Read the payload, failing with `TypeConversionFailure` when `read` rejects it
    fn extract<T>(&self, to: &'static str, read: impl FnOnce(&NativeVariant) -> Option<T>) -> Result<T> {
        self.with_native(read)?
            .ok_or_else(|| BridgeError::conversion(self.kind(), to))
    }

    fn as_integer<T>(&self, to: &'static str) -> Result<T>
    where
        T: Copy + 'static,
        i64: AsPrimitive<T>,
    {
        self.extract(to, |native| int_of(native).map(|v| v.as_()))
    }

    pub fn as_bool(&self) -> Result<bool> {
        self.extract("bool", |native| match native {
            NativeVariant::Bool(b) => Some(*b),
            NativeVariant::Int(i) => Some(*i != 0),
            NativeVariant::Float(f) => Some(*f != 0.0),
            _ => None,
        })
    }

    pub fn as_int8(&self) -> Result<i8> {
        self.as_integer("i8")
    }

    pub fn as_int16(&self) -> Result<i16> {
        self.as_integer("i16")
    }

    pub fn as_int32(&self) -> Result<i32> {
        self.as_integer("i32")
    }

    pub fn as_int64(&self) -> Result<i64> {
        self.as_integer("i64")
    }

    pub fn as_uint8(&self) -> Result<u8> {
        self.as_integer("u8")
    }

    pub fn as_uint16(&self) -> Result<u16> {
        self.as_integer("u16")
    }

    pub fn as_uint32(&self) -> Result<u32> {
        self.as_integer("u32")
    }

    pub fn as_uint64(&self) -> Result<u64> {
        self.as_integer("u64")
    }

    pub fn as_float32(&self) -> Result<f32> {
        self.extract("f32", |native| float_of(native).map(|f| f as f32))
    }

    pub fn as_float64(&self) -> Result<f64> {
        self.extract("f64", float_of)
    }

    /// String, StringName and NodePath all read as text
    pub fn as_string(&self) -> Result<String> {
        self.extract("String", string_of)
    }

    pub fn as_string_name(&self) -> Result<StringName> {
        self.extract("StringName", |native| match native {
            NativeVariant::StringName(s) => Some(s.clone()),
            NativeVariant::String(s) => Some(StringName::from(s.as_str())),
            _ => None,
        })
    }

    pub fn as_node_path(&self) -> Result<NodePath> {
        self.extract("NodePath", |native| match native {
            NativeVariant::NodePath(p) => Some(p.clone()),
            NativeVariant::String(s) => Some(NodePath::new(s.as_str())),
            _ => None,
        })
    }

    pub fn as_vector2(&self) -> Result<Vector2> {
        self.extract("Vector2", vector2_of)
    }

    pub fn as_vector2i(&self) -> Result<Vector2i> {
        self.extract("Vector2i", |native| match native {
            NativeVariant::Vector2i(v) => Some(*v),
            NativeVariant::Vector2(v) => Some(v.to_vector2i()),
            _ => None,
        })
    }

    pub fn as_rect2(&self) -> Result<Rect2> {
        self.extract("Rect2", |native| match native {
            NativeVariant::Rect2(r) => Some(*r),
            NativeVariant::Rect2i(r) => Some(r.to_rect2()),
            _ => None,
        })
    }

    pub fn as_rect2i(&self) -> Result<Rect2i> {
        self.extract("Rect2i", |native| match native {
            NativeVariant::Rect2i(r) => Some(*r),
            NativeVariant::Rect2(r) => Some(r.to_rect2i()),
            _ => None,
        })
    }

    pub fn as_vector3(&self) -> Result<Vector3> {
        self.extract("Vector3", vector3_of)
    }

    pub fn as_vector3i(&self) -> Result<Vector3i> {
        self.extract("Vector3i", |native| match native {
            NativeVariant::Vector3i(v) => Some(*v),
            NativeVariant::Vector3(v) => Some(v.to_vector3i()),
            _ => None,
        })
    }

    pub fn as_plane(&self) -> Result<Plane> {
        self.extract("Plane", |native| match native {
            NativeVariant::Plane(p) => Some(*p),
            _ => None,
        })
    }

    pub fn as_quaternion(&self) -> Result<Quaternion> {
        self.extract("Quaternion", |native| match native {
            NativeVariant::Quaternion(q) => Some(*q),
            _ => None,
        })
    }

    pub fn as_color(&self) -> Result<Color> {
        self.extract("Color", color_of)
    }

    pub fn as_rid(&self) -> Result<Rid> {
        self.extract("RID", |native| match native {
            NativeVariant::Rid(rid) => Some(*rid),
            _ => None,
        })
    }

    pub fn as_transform2d(&self) -> Result<Transform2D> {
        self.extract("Transform2D", |native| match native {
            NativeVariant::Transform2D(t) => Some(**t),
            _ => None,
        })
    }

    pub fn as_aabb(&self) -> Result<Aabb> {
        self.extract("AABB", |native| match native {
            NativeVariant::Aabb(b) => Some(**b),
            _ => None,
        })
    }

    pub fn as_callable(&self) -> Result<Callable> {
        self.extract("Callable", |native| match native {
            NativeVariant::Callable(c) => Some(c.clone()),
            _ => None,
        })
    }

    pub fn as_signal(&self) -> Result<SignalInfo> {
        self.extract("Signal", |native| match native {
            NativeVariant::Signal(s) => Some(s.clone()),
            _ => None,
        })
    }

    pub fn as_packed_byte_array(&self) -> Result<Vec<u8>> {
        self.extract("PackedByteArray", |native| match native {
            NativeVariant::PackedByteArray(a) => Some(a.clone()),
            NativeVariant::Array(items) => elements(items, |i| int_of(i).map(|v| v as u8)),
            _ => None,
        })
    }

    pub fn as_packed_int32_array(&self) -> Result<Vec<i32>> {
        self.extract("PackedInt32Array", |native| match native {
            NativeVariant::PackedInt32Array(a) => Some(a.clone()),
            NativeVariant::PackedInt64Array(a) => Some(a.iter().map(|v| *v as i32).collect()),
            NativeVariant::Array(items) => elements(items, |i| int_of(i).map(|v| v as i32)),
            _ => None,
        })
    }

    pub fn as_packed_int64_array(&self) -> Result<Vec<i64>> {
        self.extract("PackedInt64Array", |native| match native {
            NativeVariant::PackedInt64Array(a) => Some(a.clone()),
            NativeVariant::PackedInt32Array(a) => Some(a.iter().map(|v| i64::from(*v)).collect()),
            NativeVariant::Array(items) => elements(items, int_of),
            _ => None,
        })
    }

    pub fn as_packed_float32_array(&self) -> Result<Vec<f32>> {
        self.extract("PackedFloat32Array", |native| match native {
            NativeVariant::PackedFloat32Array(a) => Some(a.clone()),
            NativeVariant::PackedFloat64Array(a) => Some(a.iter().map(|v| *v as f32).collect()),
            NativeVariant::Array(items) => elements(items, |i| float_of(i).map(|f| f as f32)),
            _ => None,
        })
    }

    pub fn as_packed_float64_array(&self) -> Result<Vec<f64>> {
        self.extract("PackedFloat64Array", |native| match native {
            NativeVariant::PackedFloat64Array(a) => Some(a.clone()),
            NativeVariant::PackedFloat32Array(a) => Some(a.iter().map(|v| f64::from(*v)).collect()),
            NativeVariant::Array(items) => elements(items, float_of),
            _ => None,
        })
    }

    pub fn as_packed_string_array(&self) -> Result<Vec<String>> {
        self.extract("PackedStringArray", |native| match native {
            NativeVariant::PackedStringArray(a) => Some(a.clone()),
            NativeVariant::Array(items) => elements(items, string_of),
            _ => None,
        })
    }

    pub fn as_packed_vector2_array(&self) -> Result<Vec<Vector2>> {
        self.extract("PackedVector2Array", |native| match native {
            NativeVariant::PackedVector2Array(a) => Some(a.clone()),
            NativeVariant::Array(items) => elements(items, vector2_of),
            _ => None,
        })
    }

    pub fn as_packed_vector3_array(&self) -> Result<Vec<Vector3>> {
        self.extract("PackedVector3Array", |native| match native {
            NativeVariant::PackedVector3Array(a) => Some(a.clone()),
            NativeVariant::Array(items) => elements(items, vector3_of),
            _ => None,
        })
    }

    pub fn as_packed_color_array(&self) -> Result<Vec<Color>> {
        self.extract("PackedColorArray", |native| match native {
            NativeVariant::PackedColorArray(a) => Some(a.clone()),
            NativeVariant::Array(items) => elements(items, color_of),
            _ => None,
        })
    }

    /// Elements as independent variants, each copy-borrowed from this array
    pub fn as_array(&self) -> Result<Vec<Variant>> {
        let engine = self.engine();
        self.extract("Array", |native| match native {
            NativeVariant::Array(items) => Some(
                items
                    .iter()
                    .map(|item| Variant::copy_borrowed_with(engine.clone(), item))
                    .collect(),
            ),
            _ => None,
        })
    }

    /// Entries in insertion order, keys and values copy-borrowed
    pub fn as_dictionary(&self) -> Result<Vec<(Variant, Variant)>> {
        let engine = self.engine();
        self.extract("Dictionary", |native| match native {
            NativeVariant::Dictionary(entries) => Some(
                entries
                    .iter()
                    .map(|(key, value)| {
                        (
                            Variant::copy_borrowed_with(engine.clone(), key),
                            Variant::copy_borrowed_with(engine.clone(), value),
                        )
                    })
                    .collect(),
            ),
            _ => None,
        })
    }

    /// Raw object payload. Nil reads as a null object.
    pub fn as_object_ref(&self) -> Result<Option<ObjectRef>> {
        self.extract("Object", |native| match native {
            NativeVariant::Object(obj) => Some(obj.clone()),
            NativeVariant::Nil => Some(None),
            _ => None,
        })
    }

    /// Managed wrapper for the object payload: the live one if the handle
    /// already has a wrapper, otherwise a new wrapper attached to the handle.
    pub fn as_object(&self) -> Result<Option<Arc<EngineObject>>> {
        let obj = match self.as_object_ref()? {
            Some(obj) => obj,
            None => return Ok(None),
        };

        if let Some(existing) = bindings::lookup(obj.handle) {
            return Ok(Some(existing));
        }
        EngineObject::from_handle(self.engine(), obj.class.as_str(), obj.handle).map(Some)
    }

    // ------------------------------------------------------------------------
    // Container and object construction (through the engine copy path)
    // ------------------------------------------------------------------------

    /// Array variant holding copies of `items`
    pub fn from_array(items: &[Variant]) -> Result<Variant> {
        Self::from_array_with(engine_api::current(), items)
    }

    pub fn from_array_with(engine: Arc<dyn NativeEngine>, items: &[Variant]) -> Result<Variant> {
        let raw = items
            .iter()
            .map(|item| item.with_native(|native| native.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Variant::copy_borrowed_with(engine, &NativeVariant::Array(raw)))
    }

    /// Dictionary variant holding copies of `entries`
    pub fn from_dictionary(entries: &[(Variant, Variant)]) -> Result<Variant> {
        Self::from_dictionary_with(engine_api::current(), entries)
    }

    pub fn from_dictionary_with(
        engine: Arc<dyn NativeEngine>,
        entries: &[(Variant, Variant)],
    ) -> Result<Variant> {
        let raw = entries
            .iter()
            .map(|(key, value)| {
                let key = key.with_native(|native| native.clone())?;
                let value = value.with_native(|native| native.clone())?;
                Ok((key, value))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Variant::copy_borrowed_with(engine, &NativeVariant::Dictionary(raw)))
    }

    /// Object variant referencing `obj`'s handle. `None` is a null object.
    pub fn from_object(obj: Option<&EngineObject>) -> Result<Variant> {
        let handle = EngineObject::get_ptr(obj)?;
        let native = match obj {
            Some(obj) => NativeVariant::object(handle, obj.native_class()),
            None => NativeVariant::Object(None),
        };
        let engine = obj.map(EngineObject::engine).unwrap_or_else(engine_api::current);
        Ok(Variant::copy_borrowed_with(engine, &native))
    }
}

// ============================================================================
// Construction from Rust values (take_ownership over a fresh native value)
// ============================================================================

macro_rules! variant_from {
    ($($ty:ty => |$v:ident| $native:expr;)*) => {
        $(
            impl From<$ty> for Variant {
                fn from($v: $ty) -> Self {
                    Variant::take_ownership($native)
                }
            }
        )*
    };
}

variant_from! {
    bool => |v| NativeVariant::Bool(v);
    i8 => |v| NativeVariant::Int(i64::from(v));
    i16 => |v| NativeVariant::Int(i64::from(v));
    i32 => |v| NativeVariant::Int(i64::from(v));
    i64 => |v| NativeVariant::Int(v);
    u8 => |v| NativeVariant::Int(i64::from(v));
    u16 => |v| NativeVariant::Int(i64::from(v));
    u32 => |v| NativeVariant::Int(i64::from(v));
    u64 => |v| NativeVariant::Int(v.as_());
    f32 => |v| NativeVariant::Float(f64::from(v));
    f64 => |v| NativeVariant::Float(v);
    &str => |v| NativeVariant::String(v.to_string());
    String => |v| NativeVariant::String(v);
    StringName => |v| NativeVariant::StringName(v);
    NodePath => |v| NativeVariant::NodePath(v);
    Vector2 => |v| NativeVariant::Vector2(v);
    Vector2i => |v| NativeVariant::Vector2i(v);
    Rect2 => |v| NativeVariant::Rect2(v);
    Rect2i => |v| NativeVariant::Rect2i(v);
    Vector3 => |v| NativeVariant::Vector3(v);
    Vector3i => |v| NativeVariant::Vector3i(v);
    Plane => |v| NativeVariant::Plane(v);
    Quaternion => |v| NativeVariant::Quaternion(v);
    Color => |v| NativeVariant::Color(v);
    Rid => |v| NativeVariant::Rid(v);
    Transform2D => |v| NativeVariant::Transform2D(Box::new(v));
    Aabb => |v| NativeVariant::Aabb(Box::new(v));
    Callable => |v| NativeVariant::Callable(v);
    SignalInfo => |v| NativeVariant::Signal(v);
    Vec<u8> => |v| NativeVariant::PackedByteArray(v);
    Vec<i32> => |v| NativeVariant::PackedInt32Array(v);
    Vec<i64> => |v| NativeVariant::PackedInt64Array(v);
    Vec<f32> => |v| NativeVariant::PackedFloat32Array(v);
    Vec<f64> => |v| NativeVariant::PackedFloat64Array(v);
    Vec<String> => |v| NativeVariant::PackedStringArray(v);
    Vec<Vector2> => |v| NativeVariant::PackedVector2Array(v);
    Vec<Vector3> => |v| NativeVariant::PackedVector3Array(v);
    Vec<Color> => |v| NativeVariant::PackedColorArray(v);
}

// ============================================================================
// Typed unwrapping for delegates
// ============================================================================

/// Types a delegate parameter can be unwrapped into
pub trait FromVariant: Sized {
    fn from_variant(variant: &Variant) -> Result<Self>;
}

macro_rules! from_variant_via {
    ($($ty:ty => $method:ident),* $(,)?) => {
        $(
            impl FromVariant for $ty {
                #[inline]
                fn from_variant(variant: &Variant) -> Result<Self> {
                    variant.$method()
                }
            }
        )*
    };
}

from_variant_via! {
    bool => as_bool,
    i8 => as_int8,
    i16 => as_int16,
    i32 => as_int32,
    i64 => as_int64,
    u8 => as_uint8,
    u16 => as_uint16,
    u32 => as_uint32,
    u64 => as_uint64,
    f32 => as_float32,
    f64 => as_float64,
    String => as_string,
    StringName => as_string_name,
    NodePath => as_node_path,
    Vector2 => as_vector2,
    Vector2i => as_vector2i,
    Rect2 => as_rect2,
    Rect2i => as_rect2i,
    Vector3 => as_vector3,
    Vector3i => as_vector3i,
    Plane => as_plane,
    Quaternion => as_quaternion,
    Color => as_color,
    Rid => as_rid,
    Transform2D => as_transform2d,
    Aabb => as_aabb,
    Callable => as_callable,
    SignalInfo => as_signal,
    Vec<u8> => as_packed_byte_array,
    Vec<i32> => as_packed_int32_array,
    Vec<i64> => as_packed_int64_array,
    Vec<f32> => as_packed_float32_array,
    Vec<f64> => as_packed_float64_array,
    Vec<String> => as_packed_string_array,
    Vec<Vector2> => as_packed_vector2_array,
    Vec<Vector3> => as_packed_vector3_array,
    Vec<Color> => as_packed_color_array,
    Vec<Variant> => as_array,
    Option<Arc<EngineObject>> => as_object,
}

impl FromVariant for Variant {
    fn from_variant(variant: &Variant) -> Result<Self> {
        Ok(variant.clone())
    }
}
