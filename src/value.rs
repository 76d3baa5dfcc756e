//! Native value graph produced by decode and consumed by encode.
//!
//! Composite values are `Arc`-shared: a multi-ref value fanned out to several
//! owners is one allocation, and the encoder uses that identity to emit
//! `href`/`id` pairs.

use std::fmt;
use std::sync::Arc;

use crate::qname::QName;

/// A decoded (or to-be-encoded) SOAP value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    String(String),
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    /// Lexical decimal (arbitrary precision is kept as text).
    Decimal(String),
    Bytes(Vec<u8>),
    QName(QName),
    Struct(Arc<StructValue>),
    Array(Arc<ArrayValue>),
}

/// An ordered compound of named accessors.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StructValue {
    /// Wire type the struct was decoded from (or should be encoded as).
    pub type_name: Option<QName>,
    pub fields: Vec<(QName, Value)>,
}

impl StructValue {
    pub fn new(type_name: Option<QName>) -> Self {
        Self { type_name, fields: Vec::new() }
    }

    /// Builder: hängt ein Feld an.
    pub fn with_field(mut self, name: QName, value: Value) -> Self {
        self.fields.push((name, value));
        self
    }

    /// First field whose local name is `local_name` (namespace ignored).
    pub fn field(&self, local_name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| &*name.local_name == local_name)
            .map(|(_, value)| value)
    }
}

/// A (possibly multi-dimensional) array in row-major order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ArrayValue {
    /// Declared component wire type.
    pub item_type: Option<QName>,
    /// Per-axis lengths; `[n]` for a plain array.
    pub dimensions: Vec<usize>,
    pub items: Vec<Value>,
}

impl ArrayValue {
    /// One-dimensional array over `items`.
    pub fn from_items(item_type: Option<QName>, items: Vec<Value>) -> Self {
        let dimensions = vec![items.len()];
        Self { item_type, dimensions, items }
    }

    pub fn rank(&self) -> usize {
        self.dimensions.len()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn structure(value: StructValue) -> Self {
        Value::Struct(Arc::new(value))
    }

    pub fn array(value: ArrayValue) -> Self {
        Value::Array(Arc::new(value))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Native shape of this value, the encode-side registry key.
    ///
    /// `Nil` has no shape.
    pub fn shape(&self) -> Option<ValueShape> {
        Some(match self {
            Value::Nil => return None,
            Value::String(_) => ValueShape::String,
            Value::Boolean(_) => ValueShape::Boolean,
            Value::Byte(_) => ValueShape::Byte,
            Value::Short(_) => ValueShape::Short,
            Value::Int(_) => ValueShape::Int,
            Value::Long(_) => ValueShape::Long,
            Value::Float(_) => ValueShape::Float,
            Value::Double(_) => ValueShape::Double,
            Value::Decimal(_) => ValueShape::Decimal,
            Value::Bytes(_) => ValueShape::Bytes,
            Value::QName(_) => ValueShape::QName,
            Value::Struct(s) => ValueShape::Struct(s.type_name.clone()),
            Value::Array(_) => ValueShape::Array,
        })
    }

    /// Identity of a shared composite (for multi-ref output).
    pub(crate) fn composite_ptr(&self) -> Option<usize> {
        match self {
            Value::Struct(s) => Some(Arc::as_ptr(s) as usize),
            Value::Array(a) => Some(Arc::as_ptr(a) as usize),
            _ => None,
        }
    }
}

/// The native representation a wire type maps to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueShape {
    String,
    Boolean,
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    Decimal,
    Bytes,
    QName,
    /// Named compound; `None` is the generic struct.
    Struct(Option<QName>),
    Array,
}

impl ValueShape {
    /// Next shape in the supertype chain, walked when an encode-side lookup
    /// misses: integers widen up to decimal, float widens to double, a named
    /// struct falls back to the generic struct.
    pub fn supertype(&self) -> Option<ValueShape> {
        match self {
            ValueShape::Byte => Some(ValueShape::Short),
            ValueShape::Short => Some(ValueShape::Int),
            ValueShape::Int => Some(ValueShape::Long),
            ValueShape::Long => Some(ValueShape::Decimal),
            ValueShape::Float => Some(ValueShape::Double),
            ValueShape::Struct(Some(_)) => Some(ValueShape::Struct(None)),
            _ => None,
        }
    }
}

impl fmt::Display for ValueShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueShape::Struct(Some(name)) => write!(f, "struct {name}"),
            ValueShape::Struct(None) => f.write_str("struct"),
            other => write!(f, "{other:?}"),
        }
    }
}
