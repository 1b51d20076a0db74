use serde::{Deserialize, Serialize};
use smol_str::SmolStr;
use tracing::warn;

use crate::error::ControlError;
use crate::object::ObjectRef;

use super::{PropertyDescriptor, PropertyValue, TypeName, ValueKind};

/// Self-describing value exchanged with controllers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum WireValue {
    Bool(bool),
    Int64(i64),
    #[serde(rename = "uint64")]
    UInt64(u64),
    Double(f64),
    String(String),
    StringList(Vec<String>),
    /// Value annotated with its own type tag.
    Boxed(Box<WireValue>),
}

impl WireValue {
    /// Type signature in D-Bus notation.
    #[must_use]
    pub fn signature(&self) -> &'static str {
        match self {
            Self::Bool(_) => "b",
            Self::Int64(_) => "x",
            Self::UInt64(_) => "t",
            Self::Double(_) => "d",
            Self::String(_) => "s",
            Self::StringList(_) => "as",
            Self::Boxed(_) => "v",
        }
    }

    #[must_use]
    pub fn boxed(self) -> Self {
        Self::Boxed(Box::new(self))
    }

    /// Strip every level of boxing.
    #[must_use]
    pub fn unboxed(&self) -> &Self {
        let mut value = self;
        while let Self::Boxed(inner) = value {
            value = inner;
        }
        value
    }

    fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int64(_) => "int64",
            Self::UInt64(_) => "uint64",
            Self::Double(_) => "double",
            Self::String(_) => "string",
            Self::StringList(_) => "string list",
            Self::Boxed(_) => "boxed",
        }
    }
}

impl From<bool> for WireValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<&str> for WireValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

/// Name based lookup used when decoding object and type references.
pub trait ObjectLookup {
    fn lookup_object(&self, name: &str) -> Option<ObjectRef>;
    fn lookup_type(&self, name: &str) -> Option<TypeName>;
}

/// Lookup that knows no objects and no types.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoLookup;

impl ObjectLookup for NoLookup {
    fn lookup_object(&self, _name: &str) -> Option<ObjectRef> {
        None
    }

    fn lookup_type(&self, _name: &str) -> Option<TypeName> {
        None
    }
}

/// Encode a typed value for the wire.
///
/// Never fails: a value that does not match the descriptor, or an absent
/// pre-encoded value, encodes as the empty string.
#[must_use]
pub fn to_wire(value: &PropertyValue, descriptor: &PropertyDescriptor) -> WireValue {
    if !value.fits(&descriptor.kind) {
        warn!(
            property = %descriptor.name,
            kind = %descriptor.kind,
            "value does not match property kind, encoding as empty string"
        );
        return WireValue::String(String::new());
    }
    match value {
        PropertyValue::Bool(v) => WireValue::Bool(*v),
        PropertyValue::Char(v) => WireValue::Int64(i64::from(*v)),
        PropertyValue::UChar(v) => WireValue::UInt64(u64::from(*v)),
        PropertyValue::Int(v) | PropertyValue::Enum(v) => WireValue::Int64(i64::from(*v)),
        PropertyValue::UInt(v) | PropertyValue::Flags(v) => WireValue::UInt64(u64::from(*v)),
        PropertyValue::Long(v) | PropertyValue::Int64(v) => WireValue::Int64(*v),
        PropertyValue::ULong(v) | PropertyValue::UInt64(v) => WireValue::UInt64(*v),
        PropertyValue::Float(v) => WireValue::Double(f64::from(*v)),
        PropertyValue::Double(v) => WireValue::Double(*v),
        PropertyValue::String(v) => WireValue::String(v.as_deref().unwrap_or_default().to_owned()),
        PropertyValue::StringList(v) => {
            WireValue::StringList(v.iter().map(ToString::to_string).collect())
        }
        PropertyValue::Object(v) => WireValue::String(
            v.as_ref()
                .and_then(|object| object.name())
                .map(|name| name.to_string())
                .unwrap_or_default(),
        ),
        PropertyValue::TypeId(v) => {
            WireValue::String(v.as_ref().map(ToString::to_string).unwrap_or_default())
        }
        PropertyValue::Wire(v) => v
            .clone()
            .unwrap_or_else(|| WireValue::String(String::new())),
    }
}

/// Decode a wire value into the kind declared by `descriptor`.
pub fn from_wire(
    wire: &WireValue,
    descriptor: &PropertyDescriptor,
    lookup: &dyn ObjectLookup,
) -> Result<PropertyValue, ControlError> {
    if descriptor.kind == ValueKind::Wire {
        return Ok(PropertyValue::Wire(Some(wire.clone())));
    }
    let wire = wire.unboxed();
    let value = match (&descriptor.kind, wire) {
        (ValueKind::TypeId, WireValue::String(name)) => {
            PropertyValue::TypeId(if name.is_empty() {
                None
            } else {
                lookup.lookup_type(name)
            })
        }
        (ValueKind::Object, WireValue::String(name)) => {
            PropertyValue::Object(if name.is_empty() {
                None
            } else {
                lookup.lookup_object(name)
            })
        }
        (ValueKind::String, WireValue::String(text)) => {
            PropertyValue::String(Some(SmolStr::new(text)))
        }
        (ValueKind::StringList, WireValue::StringList(items)) => {
            PropertyValue::StringList(items.iter().map(SmolStr::new).collect())
        }
        (kind, wire) if kind.is_numeric() => match Numeric::from_wire(wire) {
            Some(number) => number.coerce(kind),
            None => return Err(mismatch(descriptor, wire)),
        },
        (_, wire) => return Err(mismatch(descriptor, wire)),
    };
    Ok(value)
}

fn mismatch(descriptor: &PropertyDescriptor, wire: &WireValue) -> ControlError {
    ControlError::InvalidValue(SmolStr::new(format!(
        "cannot store {} in {} property '{}'",
        wire.type_name(),
        descriptor.kind,
        descriptor.name
    )))
}

#[derive(Debug, Clone, Copy)]
enum Numeric {
    Signed(i64),
    Unsigned(u64),
    Real(f64),
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_precision_loss
)]
impl Numeric {
    fn from_wire(wire: &WireValue) -> Option<Self> {
        match wire {
            WireValue::Bool(v) => Some(Self::Signed(i64::from(*v))),
            WireValue::Int64(v) => Some(Self::Signed(*v)),
            WireValue::UInt64(v) => Some(Self::Unsigned(*v)),
            WireValue::Double(v) => Some(Self::Real(*v)),
            _ => None,
        }
    }

    fn signed(self) -> i64 {
        match self {
            Self::Signed(v) => v,
            Self::Unsigned(v) => v as i64,
            Self::Real(v) => v as i64,
        }
    }

    fn unsigned(self) -> u64 {
        match self {
            Self::Signed(v) => v as u64,
            Self::Unsigned(v) => v,
            Self::Real(v) => v as u64,
        }
    }

    fn real(self) -> f64 {
        match self {
            Self::Signed(v) => v as f64,
            Self::Unsigned(v) => v as f64,
            Self::Real(v) => v,
        }
    }

    fn coerce(self, kind: &ValueKind) -> PropertyValue {
        match kind {
            ValueKind::Bool => PropertyValue::Bool(match self {
                Self::Real(v) => v != 0.0,
                other => other.signed() != 0,
            }),
            ValueKind::Char => PropertyValue::Char(self.signed() as i8),
            ValueKind::UChar => PropertyValue::UChar(self.unsigned() as u8),
            ValueKind::Int => PropertyValue::Int(self.signed() as i32),
            ValueKind::UInt => PropertyValue::UInt(self.unsigned() as u32),
            ValueKind::Long => PropertyValue::Long(self.signed()),
            ValueKind::ULong => PropertyValue::ULong(self.unsigned()),
            ValueKind::Int64 => PropertyValue::Int64(self.signed()),
            ValueKind::UInt64 => PropertyValue::UInt64(self.unsigned()),
            ValueKind::Enum(_) => PropertyValue::Enum(self.signed() as i32),
            ValueKind::Flags(_) => PropertyValue::Flags(self.unsigned() as u32),
            ValueKind::Float => PropertyValue::Float(self.real() as f32),
            _ => PropertyValue::Double(self.real()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyFlags;

    fn desc(kind: ValueKind) -> PropertyDescriptor {
        PropertyDescriptor::new("prop", kind, PropertyFlags::READWRITE)
    }

    #[test]
    fn wire_value_serializes_with_type_tag() {
        let json = serde_json::to_string(&WireValue::UInt64(7).boxed()).unwrap();
        assert_eq!(json, r#"{"type":"boxed","value":{"type":"uint64","value":7}}"#);
        let back: WireValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back.unboxed(), &WireValue::UInt64(7));
    }

    #[test]
    fn absent_values_encode_as_empty_string() {
        let empty = WireValue::String(String::new());
        assert_eq!(to_wire(&PropertyValue::String(None), &desc(ValueKind::String)), empty);
        assert_eq!(to_wire(&PropertyValue::Wire(None), &desc(ValueKind::Wire)), empty);
        assert_eq!(to_wire(&PropertyValue::Object(None), &desc(ValueKind::Object)), empty);
        assert_eq!(to_wire(&PropertyValue::Bool(true), &desc(ValueKind::Int)), empty);
    }

    #[test]
    fn numeric_coercion_follows_target_kind() {
        let value = from_wire(&WireValue::Double(3.9), &desc(ValueKind::Int), &NoLookup).unwrap();
        assert_eq!(value, PropertyValue::Int(3));
        let value = from_wire(&WireValue::Int64(2), &desc(ValueKind::Bool), &NoLookup).unwrap();
        assert_eq!(value, PropertyValue::Bool(true));
        let value = from_wire(&WireValue::Int64(300), &desc(ValueKind::UChar), &NoLookup).unwrap();
        assert_eq!(value, PropertyValue::UChar(44));
        let value =
            from_wire(&WireValue::Bool(true).boxed(), &desc(ValueKind::Double), &NoLookup).unwrap();
        assert_eq!(value, PropertyValue::Double(1.0));
    }

    #[test]
    fn string_for_numeric_target_is_invalid() {
        let err = from_wire(&WireValue::from("12"), &desc(ValueKind::Int), &NoLookup).unwrap_err();
        assert_eq!(err.kind(), "InvalidValue");
    }

    #[test]
    fn unknown_object_name_leaves_reference_unset() {
        let value = from_wire(&WireValue::from("ghost"), &desc(ValueKind::Object), &NoLookup)
            .unwrap();
        assert_eq!(value, PropertyValue::Object(None));
    }

    #[test]
    fn wire_kind_keeps_boxing() {
        let wire = WireValue::Int64(1).boxed();
        let value = from_wire(&wire, &desc(ValueKind::Wire), &NoLookup).unwrap();
        assert_eq!(to_wire(&value, &desc(ValueKind::Wire)), wire);
    }
}
