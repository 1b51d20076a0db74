use std::fmt;

use smol_str::SmolStr;

use crate::object::ObjectRef;

use super::WireValue;

const FLOAT_EPSILON: f64 = 1e-30;
const DOUBLE_EPSILON: f64 = 1e-90;

/// Declared kind of a property or signal parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Bool,

    Char,
    UChar,
    Int,
    UInt,
    Long,
    ULong,
    Int64,
    UInt64,

    /// Enumeration, stored as its ordinal.
    Enum(SmolStr),
    /// Bit-flag set, stored as its mask.
    Flags(SmolStr),

    Float,
    Double,

    String,
    StringList,

    /// Reference to another live object.
    Object,
    /// Name of a type known to the host.
    TypeId,
    /// Value already in wire form.
    Wire,
}

impl ValueKind {
    /// Human readable kind name used in diagnostics.
    #[must_use]
    pub fn name(&self) -> SmolStr {
        match self {
            Self::Bool => "bool".into(),
            Self::Char => "char".into(),
            Self::UChar => "uchar".into(),
            Self::Int => "int".into(),
            Self::UInt => "uint".into(),
            Self::Long => "long".into(),
            Self::ULong => "ulong".into(),
            Self::Int64 => "int64".into(),
            Self::UInt64 => "uint64".into(),
            Self::Enum(name) => SmolStr::new(format!("enum {name}")),
            Self::Flags(name) => SmolStr::new(format!("flags {name}")),
            Self::Float => "float".into(),
            Self::Double => "double".into(),
            Self::String => "string".into(),
            Self::StringList => "strv".into(),
            Self::Object => "object".into(),
            Self::TypeId => "type".into(),
            Self::Wire => "variant".into(),
        }
    }

    /// Type signature of the wire value this kind encodes to.
    #[must_use]
    pub fn signature(&self) -> &'static str {
        match self {
            Self::Bool => "b",
            Self::Char | Self::Int | Self::Long | Self::Int64 | Self::Enum(_) => "x",
            Self::UChar | Self::UInt | Self::ULong | Self::UInt64 | Self::Flags(_) => "t",
            Self::Float | Self::Double => "d",
            Self::String | Self::Object | Self::TypeId => "s",
            Self::StringList => "as",
            Self::Wire => "v",
        }
    }

    #[must_use]
    pub fn is_numeric(&self) -> bool {
        !matches!(
            self,
            Self::String | Self::StringList | Self::Object | Self::TypeId | Self::Wire
        )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Name of a host type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeName(pub SmolStr);

impl TypeName {
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self(name.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Typed property value.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),

    Char(i8),
    UChar(u8),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Int64(i64),
    UInt64(u64),

    Enum(i32),
    Flags(u32),

    Float(f32),
    Double(f64),

    String(Option<SmolStr>),
    StringList(Vec<SmolStr>),

    Object(Option<ObjectRef>),
    TypeId(Option<TypeName>),
    Wire(Option<WireValue>),
}

impl PropertyValue {
    /// Zero value of a kind.
    #[must_use]
    pub fn default_for(kind: &ValueKind) -> Self {
        match kind {
            ValueKind::Bool => Self::Bool(false),
            ValueKind::Char => Self::Char(0),
            ValueKind::UChar => Self::UChar(0),
            ValueKind::Int => Self::Int(0),
            ValueKind::UInt => Self::UInt(0),
            ValueKind::Long => Self::Long(0),
            ValueKind::ULong => Self::ULong(0),
            ValueKind::Int64 => Self::Int64(0),
            ValueKind::UInt64 => Self::UInt64(0),
            ValueKind::Enum(_) => Self::Enum(0),
            ValueKind::Flags(_) => Self::Flags(0),
            ValueKind::Float => Self::Float(0.0),
            ValueKind::Double => Self::Double(0.0),
            ValueKind::String => Self::String(None),
            ValueKind::StringList => Self::StringList(Vec::new()),
            ValueKind::Object => Self::Object(None),
            ValueKind::TypeId => Self::TypeId(None),
            ValueKind::Wire => Self::Wire(None),
        }
    }

    /// Whether the value can be stored in a property of `kind`.
    #[must_use]
    pub fn fits(&self, kind: &ValueKind) -> bool {
        matches!(
            (self, kind),
            (Self::Bool(_), ValueKind::Bool)
                | (Self::Char(_), ValueKind::Char)
                | (Self::UChar(_), ValueKind::UChar)
                | (Self::Int(_), ValueKind::Int)
                | (Self::UInt(_), ValueKind::UInt)
                | (Self::Long(_), ValueKind::Long)
                | (Self::ULong(_), ValueKind::ULong)
                | (Self::Int64(_), ValueKind::Int64)
                | (Self::UInt64(_), ValueKind::UInt64)
                | (Self::Enum(_), ValueKind::Enum(_))
                | (Self::Flags(_), ValueKind::Flags(_))
                | (Self::Float(_), ValueKind::Float)
                | (Self::Double(_), ValueKind::Double)
                | (Self::String(_), ValueKind::String)
                | (Self::StringList(_), ValueKind::StringList)
                | (Self::Object(_), ValueKind::Object)
                | (Self::TypeId(_), ValueKind::TypeId)
                | (Self::Wire(_), ValueKind::Wire)
        )
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => value.as_deref(),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(f64::from(*value)),
            Self::Double(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Self::Object(value) => value.as_ref(),
            _ => None,
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for PropertyValue {
    fn from(value: u32) -> Self {
        Self::UInt(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(Some(SmolStr::new(value)))
    }
}

impl From<ObjectRef> for PropertyValue {
    fn from(value: ObjectRef) -> Self {
        Self::Object(Some(value))
    }
}

/// Access flags of a property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropertyFlags {
    pub readable: bool,
    pub writable: bool,
    pub construct_only: bool,
}

impl PropertyFlags {
    pub const READABLE: Self = Self {
        readable: true,
        writable: false,
        construct_only: false,
    };
    pub const WRITABLE: Self = Self {
        readable: false,
        writable: true,
        construct_only: false,
    };
    pub const READWRITE: Self = Self {
        readable: true,
        writable: true,
        construct_only: false,
    };

    #[must_use]
    pub fn construct_only(mut self) -> Self {
        self.construct_only = true;
        self
    }

    /// Writable after construction.
    #[must_use]
    pub fn is_settable(self) -> bool {
        self.writable && !self.construct_only
    }
}

/// Typed property descriptor. Immutable once its owning type is defined.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: SmolStr,
    pub kind: ValueKind,
    pub flags: PropertyFlags,
    pub default: PropertyValue,
}

impl PropertyDescriptor {
    pub fn new(name: impl Into<SmolStr>, kind: ValueKind, flags: PropertyFlags) -> Self {
        let default = PropertyValue::default_for(&kind);
        Self {
            name: name.into(),
            kind,
            flags,
            default,
        }
    }

    /// Replace the default value. Values of another kind are ignored.
    #[must_use]
    pub fn with_default(mut self, default: PropertyValue) -> Self {
        if default.fits(&self.kind) {
            self.default = default;
        }
        self
    }

    /// Descriptor-aware equality used to suppress redundant writes.
    ///
    /// Floating point kinds compare within the kind's epsilon; object
    /// references compare by identity.
    #[must_use]
    pub fn values_equal(&self, a: &PropertyValue, b: &PropertyValue) -> bool {
        match (a, b) {
            (PropertyValue::Float(a), PropertyValue::Float(b)) => {
                (f64::from(*a) - f64::from(*b)).abs() <= FLOAT_EPSILON
            }
            (PropertyValue::Double(a), PropertyValue::Double(b)) => {
                (a - b).abs() <= DOUBLE_EPSILON
            }
            _ => a == b,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_ignores_default_of_other_kind() {
        let desc = PropertyDescriptor::new("label", ValueKind::String, PropertyFlags::READWRITE)
            .with_default(PropertyValue::Bool(true));
        assert_eq!(desc.default, PropertyValue::String(None));
    }

    #[test]
    fn doubles_compare_within_epsilon() {
        let desc = PropertyDescriptor::new("x", ValueKind::Double, PropertyFlags::READWRITE);
        assert!(desc.values_equal(&PropertyValue::Double(1.0), &PropertyValue::Double(1.0)));
        assert!(!desc.values_equal(
            &PropertyValue::Double(1.0),
            &PropertyValue::Double(1.000_000_1)
        ));
        assert!(!desc.values_equal(
            &PropertyValue::Double(f64::NAN),
            &PropertyValue::Double(f64::NAN)
        ));
    }

    #[test]
    fn settable_excludes_construct_only() {
        assert!(PropertyFlags::READWRITE.is_settable());
        assert!(!PropertyFlags::READWRITE.construct_only().is_settable());
        assert!(!PropertyFlags::READABLE.is_settable());
    }
}
