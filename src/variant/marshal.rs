//! Managed projection of a variant
//!
//! Design: one pass per kind over the typed extractors, so the projection
//! and `as_*` never disagree. Containers project to copy-borrowed element
//! variants; objects resolve to their managed wrapper.

use std::sync::Arc;

use super::kind::VariantType;
use super::math::{
    Aabb, Color, Plane, Quaternion, Rect2, Rect2i, Rid, Transform2D, Vector2, Vector2i, Vector3,
    Vector3i,
};
use super::native::{Callable, NodePath, SignalInfo, StringName};
use super::Variant;
use crate::error::Result;
use crate::object::EngineObject;

#[derive(Debug, Clone)]
pub enum ManagedValue {
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
    Transform2D(Transform2D),
    Aabb(Aabb),
    String(String),
    StringName(StringName),
    NodePath(NodePath),
    Object(Option<Arc<EngineObject>>),
    Callable(Callable),
    Signal(SignalInfo),
    Dictionary(Vec<(Variant, Variant)>),
    Array(Vec<Variant>),
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

impl ManagedValue {
    pub(crate) fn from_variant(variant: &Variant) -> Result<Self> {
        let value = match variant.kind() {
            VariantType::Nil => Self::Nil,
            VariantType::Bool => Self::Bool(variant.as_bool()?),
            VariantType::Int => Self::Int(variant.as_int64()?),
            VariantType::Float => Self::Float(variant.as_float64()?),
            VariantType::Vector2 => Self::Vector2(variant.as_vector2()?),
            VariantType::Vector2i => Self::Vector2i(variant.as_vector2i()?),
            VariantType::Rect2 => Self::Rect2(variant.as_rect2()?),
            VariantType::Rect2i => Self::Rect2i(variant.as_rect2i()?),
            VariantType::Vector3 => Self::Vector3(variant.as_vector3()?),
            VariantType::Vector3i => Self::Vector3i(variant.as_vector3i()?),
            VariantType::Plane => Self::Plane(variant.as_plane()?),
            VariantType::Quaternion => Self::Quaternion(variant.as_quaternion()?),
            VariantType::Color => Self::Color(variant.as_color()?),
            VariantType::Rid => Self::Rid(variant.as_rid()?),
            VariantType::Transform2D => Self::Transform2D(variant.as_transform2d()?),
            VariantType::Aabb => Self::Aabb(variant.as_aabb()?),
            VariantType::String => Self::String(variant.as_string()?),
            VariantType::StringName => Self::StringName(variant.as_string_name()?),
            VariantType::NodePath => Self::NodePath(variant.as_node_path()?),
            VariantType::Object => Self::Object(variant.as_object()?),
            VariantType::Callable => Self::Callable(variant.as_callable()?),
            VariantType::Signal => Self::Signal(variant.as_signal()?),
            VariantType::Dictionary => Self::Dictionary(variant.as_dictionary()?),
            VariantType::Array => Self::Array(variant.as_array()?),
            VariantType::PackedByteArray => Self::PackedByteArray(variant.as_packed_byte_array()?),
            VariantType::PackedInt32Array => Self::PackedInt32Array(variant.as_packed_int32_array()?),
            VariantType::PackedInt64Array => Self::PackedInt64Array(variant.as_packed_int64_array()?),
            VariantType::PackedFloat32Array => {
                Self::PackedFloat32Array(variant.as_packed_float32_array()?)
            }
            VariantType::PackedFloat64Array => {
                Self::PackedFloat64Array(variant.as_packed_float64_array()?)
            }
            VariantType::PackedStringArray => {
                Self::PackedStringArray(variant.as_packed_string_array()?)
            }
            VariantType::PackedVector2Array => {
                Self::PackedVector2Array(variant.as_packed_vector2_array()?)
            }
            VariantType::PackedVector3Array => {
                Self::PackedVector3Array(variant.as_packed_vector3_array()?)
            }
            VariantType::PackedColorArray => Self::PackedColorArray(variant.as_packed_color_array()?),
        };
        Ok(value)
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Self::Nil | Self::Object(None))
    }
}
