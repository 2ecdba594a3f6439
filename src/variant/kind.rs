//! Variant kind tags

use std::fmt;

/// Discriminant of a variant.
///
/// Trivial kinds are plain data stored inline; every other kind owns a
/// native resource and carries a disposer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum VariantType {
    Nil,
    Bool,
    Int,
    Float,
    Vector2,
    Vector2i,
    Rect2,
    Rect2i,
    Vector3,
    Vector3i,
    Plane,
    Quaternion,
    Color,
    Rid,
    Transform2D,
    Aabb,
    String,
    StringName,
    NodePath,
    Object,
    Callable,
    Signal,
    Dictionary,
    Array,
    PackedByteArray,
    PackedInt32Array,
    PackedInt64Array,
    PackedFloat32Array,
    PackedFloat64Array,
    PackedStringArray,
    PackedVector2Array,
    PackedVector3Array,
    PackedColorArray,
}

impl VariantType {
    /// Kinds stored inline without a disposer
    #[inline]
    pub const fn is_trivial(self) -> bool {
        matches!(
            self,
            Self::Nil
                | Self::Bool
                | Self::Int
                | Self::Float
                | Self::Vector2
                | Self::Vector2i
                | Self::Rect2
                | Self::Rect2i
                | Self::Vector3
                | Self::Vector3i
                | Self::Plane
                | Self::Quaternion
                | Self::Color
                | Self::Rid
        )
    }

    #[inline]
    pub const fn is_packed_array(self) -> bool {
        matches!(
            self,
            Self::PackedByteArray
                | Self::PackedInt32Array
                | Self::PackedInt64Array
                | Self::PackedFloat32Array
                | Self::PackedFloat64Array
                | Self::PackedStringArray
                | Self::PackedVector2Array
                | Self::PackedVector3Array
                | Self::PackedColorArray
        )
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Nil => "Nil",
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Vector2 => "Vector2",
            Self::Vector2i => "Vector2i",
            Self::Rect2 => "Rect2",
            Self::Rect2i => "Rect2i",
            Self::Vector3 => "Vector3",
            Self::Vector3i => "Vector3i",
            Self::Plane => "Plane",
            Self::Quaternion => "Quaternion",
            Self::Color => "Color",
            Self::Rid => "RID",
            Self::Transform2D => "Transform2D",
            Self::Aabb => "AABB",
            Self::String => "String",
            Self::StringName => "StringName",
            Self::NodePath => "NodePath",
            Self::Object => "Object",
            Self::Callable => "Callable",
            Self::Signal => "Signal",
            Self::Dictionary => "Dictionary",
            Self::Array => "Array",
            Self::PackedByteArray => "PackedByteArray",
            Self::PackedInt32Array => "PackedInt32Array",
            Self::PackedInt64Array => "PackedInt64Array",
            Self::PackedFloat32Array => "PackedFloat32Array",
            Self::PackedFloat64Array => "PackedFloat64Array",
            Self::PackedStringArray => "PackedStringArray",
            Self::PackedVector2Array => "PackedVector2Array",
            Self::PackedVector3Array => "PackedVector3Array",
            Self::PackedColorArray => "PackedColorArray",
        }
    }
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
