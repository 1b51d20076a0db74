use std::fmt;
use std::rc::Rc;

use smol_str::SmolStr;
use thiserror::Error;

use super::{PropertyDescriptor, PropertyValue, ValueKind};

/// Read access to an object living in a script context.
pub trait ForeignObjectImpl {
    /// Value of an own property, `Undefined` when missing.
    fn get_property(&self, name: &str) -> ForeignValue;
    /// Own enumerable property names in enumeration order.
    fn property_names(&self) -> Vec<SmolStr>;
}

/// Shared handle to a foreign object.
#[derive(Clone)]
pub struct ForeignObject(Rc<dyn ForeignObjectImpl>);

impl ForeignObject {
    pub fn new(object: impl ForeignObjectImpl + 'static) -> Self {
        Self(Rc::new(object))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> ForeignValue {
        self.0.get_property(name)
    }

    #[must_use]
    pub fn property_names(&self) -> Vec<SmolStr> {
        self.0.property_names()
    }
}

impl<T: ForeignObjectImpl + 'static> From<Rc<T>> for ForeignObject {
    fn from(value: Rc<T>) -> Self {
        Self(value)
    }
}

impl PartialEq for ForeignObject {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ForeignObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignObject")
            .field("properties", &self.property_names())
            .finish()
    }
}

/// Dynamically typed script value.
#[derive(Debug, Clone, PartialEq)]
pub enum ForeignValue {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(SmolStr),
    Object(ForeignObject),
}

impl ForeignValue {
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Undefined => "undefined",
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Object(_) => "object",
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&ForeignObject> {
        match self {
            Self::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Property kind inferred from a discovered value.
    #[must_use]
    pub fn inferred_kind(&self) -> Option<ValueKind> {
        match self {
            Self::Bool(_) => Some(ValueKind::Bool),
            Self::Number(_) => Some(ValueKind::Double),
            Self::String(_) => Some(ValueKind::String),
            _ => None,
        }
    }

    /// Script source literal for the value, `None` for objects.
    #[must_use]
    pub fn to_literal(&self) -> Option<String> {
        match self {
            Self::Undefined => Some("undefined".to_owned()),
            Self::Null => Some("null".to_owned()),
            Self::Bool(value) => Some(value.to_string()),
            Self::Number(value) => Some(number_literal(*value)),
            Self::String(value) => Some(serde_json::Value::from(value.as_str()).to_string()),
            Self::Object(_) => None,
        }
    }
}

fn number_literal(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() && value.is_sign_positive() {
        "Infinity".to_owned()
    } else if value.is_infinite() {
        "-Infinity".to_owned()
    } else {
        value.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ForeignValueError {
    #[error("unsupported script value of type {0}")]
    Unsupported(&'static str),
    #[error("script {found} cannot be stored in a {expected} property")]
    Mismatch { found: &'static str, expected: SmolStr },
    #[error("{0} values have no script representation")]
    NoScriptForm(SmolStr),
}

/// Convert a typed value into a script value.
#[allow(clippy::cast_precision_loss)]
pub fn to_foreign(value: &PropertyValue) -> Result<ForeignValue, ForeignValueError> {
    let foreign = match value {
        PropertyValue::Bool(v) => ForeignValue::Bool(*v),
        PropertyValue::Char(v) => ForeignValue::Number(f64::from(*v)),
        PropertyValue::UChar(v) => ForeignValue::Number(f64::from(*v)),
        PropertyValue::Int(v) | PropertyValue::Enum(v) => ForeignValue::Number(f64::from(*v)),
        PropertyValue::UInt(v) | PropertyValue::Flags(v) => ForeignValue::Number(f64::from(*v)),
        PropertyValue::Long(v) | PropertyValue::Int64(v) => ForeignValue::Number(*v as f64),
        PropertyValue::ULong(v) | PropertyValue::UInt64(v) => ForeignValue::Number(*v as f64),
        PropertyValue::Float(v) => ForeignValue::Number(f64::from(*v)),
        PropertyValue::Double(v) => ForeignValue::Number(*v),
        PropertyValue::String(Some(v)) => ForeignValue::String(v.clone()),
        PropertyValue::String(None) => ForeignValue::Null,
        PropertyValue::StringList(_) => return Err(ForeignValueError::NoScriptForm("strv".into())),
        PropertyValue::Object(_) => return Err(ForeignValueError::NoScriptForm("object".into())),
        PropertyValue::TypeId(_) => return Err(ForeignValueError::NoScriptForm("type".into())),
        PropertyValue::Wire(_) => return Err(ForeignValueError::NoScriptForm("variant".into())),
    };
    Ok(foreign)
}

/// Convert a script value into the kind declared by `descriptor`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn from_foreign(
    foreign: &ForeignValue,
    descriptor: &PropertyDescriptor,
) -> Result<PropertyValue, ForeignValueError> {
    let mismatch = || ForeignValueError::Mismatch {
        found: foreign.type_name(),
        expected: descriptor.kind.name(),
    };
    match foreign {
        ForeignValue::Bool(v) => match descriptor.kind {
            ValueKind::Bool => Ok(PropertyValue::Bool(*v)),
            _ => Err(mismatch()),
        },
        ForeignValue::String(v) => match descriptor.kind {
            ValueKind::String => Ok(PropertyValue::String(Some(v.clone()))),
            _ => Err(mismatch()),
        },
        ForeignValue::Number(n) => {
            let n = *n;
            let value = match descriptor.kind {
                ValueKind::Char => PropertyValue::Char(n as i8),
                ValueKind::UChar => PropertyValue::UChar(n as u8),
                ValueKind::Int => PropertyValue::Int(n as i32),
                ValueKind::UInt => PropertyValue::UInt(n as u32),
                ValueKind::Long => PropertyValue::Long(n as i64),
                ValueKind::ULong => PropertyValue::ULong(n as u64),
                ValueKind::Int64 => PropertyValue::Int64(n as i64),
                ValueKind::UInt64 => PropertyValue::UInt64(n as u64),
                ValueKind::Enum(_) => PropertyValue::Enum(n as i32),
                ValueKind::Flags(_) => PropertyValue::Flags(n as u32),
                ValueKind::Float => PropertyValue::Float(n as f32),
                ValueKind::Double => PropertyValue::Double(n),
                _ => return Err(mismatch()),
            };
            Ok(value)
        }
        other => Err(ForeignValueError::Unsupported(other.type_name())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::PropertyFlags;

    #[test]
    fn literals_are_valid_script_source() {
        assert_eq!(ForeignValue::Bool(false).to_literal().unwrap(), "false");
        assert_eq!(
            ForeignValue::String("say \"hi\"\n".into()).to_literal().unwrap(),
            r#""say \"hi\"\n""#
        );
        assert_eq!(ForeignValue::Number(1.2345).to_literal().unwrap(), "1.2345");
        assert_eq!(ForeignValue::Number(3.0).to_literal().unwrap(), "3");
        assert_eq!(ForeignValue::Number(f64::NAN).to_literal().unwrap(), "NaN");
        assert_eq!(
            ForeignValue::Number(f64::NEG_INFINITY).to_literal().unwrap(),
            "-Infinity"
        );
    }

    #[test]
    fn unsupported_foreign_values_are_rejected() {
        let desc = PropertyDescriptor::new("a", ValueKind::String, PropertyFlags::READWRITE);
        assert_eq!(
            from_foreign(&ForeignValue::Null, &desc),
            Err(ForeignValueError::Unsupported("null"))
        );
        assert!(matches!(
            from_foreign(&ForeignValue::Bool(true), &desc),
            Err(ForeignValueError::Mismatch { found: "boolean", .. })
        ));
    }

    #[test]
    fn numbers_follow_descriptor_kind() {
        let desc = PropertyDescriptor::new("n", ValueKind::Int, PropertyFlags::READWRITE);
        assert_eq!(
            from_foreign(&ForeignValue::Number(1234.0), &desc),
            Ok(PropertyValue::Int(1234))
        );
        assert_eq!(
            to_foreign(&PropertyValue::Int(1234)),
            Ok(ForeignValue::Number(1234.0))
        );
    }
}
