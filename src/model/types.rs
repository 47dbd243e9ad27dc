//! Core value types for the schema model.

use rkyv::{Archive, Deserialize, Serialize};

/// Semantic value kinds an attribute can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum AttributeKind {
    /// Boolean value.
    Bool,
    /// 16-bit signed integer.
    Int16,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// Arbitrary-precision decimal, carried as a string.
    Decimal,
    /// 32-bit floating point.
    Float,
    /// 64-bit floating point.
    Double,
    /// UTF-8 string.
    String,
    /// Timestamp (microseconds since Unix epoch).
    Date,
    /// Binary data.
    Binary,
    /// Opaque-coded payload; only a custom mapping can reinterpret it.
    Transformable,
}

impl AttributeKind {
    /// Stable tag used when hashing an attribute's shape.
    pub fn tag(&self) -> u8 {
        match self {
            AttributeKind::Bool => 0,
            AttributeKind::Int16 => 1,
            AttributeKind::Int32 => 2,
            AttributeKind::Int64 => 3,
            AttributeKind::Decimal => 4,
            AttributeKind::Float => 5,
            AttributeKind::Double => 6,
            AttributeKind::String => 7,
            AttributeKind::Date => 8,
            AttributeKind::Binary => 9,
            AttributeKind::Transformable => 10,
        }
    }

    /// Check if this kind is an integer width.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            AttributeKind::Int16 | AttributeKind::Int32 | AttributeKind::Int64
        )
    }

    /// Check if this kind is a floating-point width.
    pub fn is_floating(&self) -> bool {
        matches!(self, AttributeKind::Float | AttributeKind::Double)
    }

    /// Whether a value of this kind can be carried into `target` without a
    /// custom mapping.
    ///
    /// Integer widths interconvert, floating widths interconvert, and
    /// integers widen into floating kinds. Everything else must match
    /// exactly; in particular `String` and `Binary` never interconvert.
    pub fn converts_to(&self, target: &AttributeKind) -> bool {
        if self == target {
            return true;
        }
        if self.is_integer() && (target.is_integer() || target.is_floating()) {
            return true;
        }
        if self.is_floating() && target.is_floating() {
            return true;
        }
        false
    }
}

impl std::fmt::Display for AttributeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttributeKind::Bool => "bool",
            AttributeKind::Int16 => "int16",
            AttributeKind::Int32 => "int32",
            AttributeKind::Int64 => "int64",
            AttributeKind::Decimal => "decimal",
            AttributeKind::Float => "float",
            AttributeKind::Double => "double",
            AttributeKind::String => "string",
            AttributeKind::Date => "date",
            AttributeKind::Binary => "binary",
            AttributeKind::Transformable => "transformable",
        };
        write!(f, "{name}")
    }
}

/// A typed attribute value, as stored in a record or declared as a default.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub enum AttributeValue {
    /// Absent value for an optional attribute.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 16-bit signed integer.
    Int16(i16),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// Decimal carried as its canonical string form.
    Decimal(String),
    /// 32-bit floating point.
    Float(f32),
    /// 64-bit floating point.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Timestamp (microseconds since Unix epoch).
    Date(i64),
    /// Binary data.
    Binary(Vec<u8>),
    /// Opaque-coded payload.
    Transformable(Vec<u8>),
}

impl AttributeValue {
    /// The kind this value belongs to, or `None` for `Null`.
    pub fn kind(&self) -> Option<AttributeKind> {
        match self {
            AttributeValue::Null => None,
            AttributeValue::Bool(_) => Some(AttributeKind::Bool),
            AttributeValue::Int16(_) => Some(AttributeKind::Int16),
            AttributeValue::Int32(_) => Some(AttributeKind::Int32),
            AttributeValue::Int64(_) => Some(AttributeKind::Int64),
            AttributeValue::Decimal(_) => Some(AttributeKind::Decimal),
            AttributeValue::Float(_) => Some(AttributeKind::Float),
            AttributeValue::Double(_) => Some(AttributeKind::Double),
            AttributeValue::String(_) => Some(AttributeKind::String),
            AttributeValue::Date(_) => Some(AttributeKind::Date),
            AttributeValue::Binary(_) => Some(AttributeKind::Binary),
            AttributeValue::Transformable(_) => Some(AttributeKind::Transformable),
        }
    }

    /// Convert this value into the given kind, if the kinds interconvert.
    ///
    /// Follows [`AttributeKind::converts_to`]: integer widths truncate or
    /// widen, integers widen into floating kinds, floating widths convert
    /// between each other. `Null` passes through unchanged.
    pub fn convert_to(&self, target: AttributeKind) -> Option<AttributeValue> {
        if self.kind() == Some(target) || matches!(self, AttributeValue::Null) {
            return Some(self.clone());
        }

        let as_i64 = match self {
            AttributeValue::Int16(v) => Some(*v as i64),
            AttributeValue::Int32(v) => Some(*v as i64),
            AttributeValue::Int64(v) => Some(*v),
            _ => None,
        };
        if let Some(v) = as_i64 {
            return match target {
                AttributeKind::Int16 => Some(AttributeValue::Int16(v as i16)),
                AttributeKind::Int32 => Some(AttributeValue::Int32(v as i32)),
                AttributeKind::Int64 => Some(AttributeValue::Int64(v)),
                AttributeKind::Float => Some(AttributeValue::Float(v as f32)),
                AttributeKind::Double => Some(AttributeValue::Double(v as f64)),
                _ => None,
            };
        }

        match (self, target) {
            (AttributeValue::Float(v), AttributeKind::Double) => {
                Some(AttributeValue::Double(*v as f64))
            }
            (AttributeValue::Double(v), AttributeKind::Float) => {
                Some(AttributeValue::Float(*v as f32))
            }
            _ => None,
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }
}

/// Behavior applied to related objects when the owner is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Archive, Serialize, Deserialize)]
pub enum DeleteRule {
    /// Sever the relationship, leaving related objects in place.
    Nullify,
    /// Delete related objects as well.
    Cascade,
    /// Refuse the deletion while related objects exist.
    Deny,
}

impl DeleteRule {
    /// Stable tag used when hashing a relationship's shape.
    pub fn tag(&self) -> u8 {
        match self {
            DeleteRule::Nullify => 0,
            DeleteRule::Cascade => 1,
            DeleteRule::Deny => 2,
        }
    }
}
