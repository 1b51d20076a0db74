//! Control errors.

#![allow(missing_docs)]

use smol_str::SmolStr;
use thiserror::Error;

use crate::script::ScriptError;

/// Errors reported synchronously to the caller of a control operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// Name does not resolve to a live object.
    #[error("object '{0}' not found")]
    NotFound(SmolStr),

    /// Object has no property with that name.
    #[error("object '{object}' has no property '{property}'")]
    NoProperty { object: SmolStr, property: SmolStr },

    /// Object has no signal with that name.
    #[error("object '{object}' has no signal '{signal}'")]
    NoSignal { object: SmolStr, signal: SmolStr },

    /// Property is not readable.
    #[error("property '{property}' of object '{object}' is not readable")]
    NotReadable { object: SmolStr, property: SmolStr },

    /// Property is not writable.
    #[error("property '{property}' of object '{object}' is not writable")]
    NotWritable { object: SmolStr, property: SmolStr },

    /// Intermediate path segment is not an object reference.
    #[error("property '{property}' of object '{object}' is not an object")]
    NotObjectType { object: SmolStr, property: SmolStr },

    /// Script context marker without a variable name.
    #[error("path '{0}' needs a script variable name after the context marker")]
    NeedsContextName(SmolStr),

    /// More than one level of script indirection.
    #[error("path '{0}' has segments after the script variable name")]
    TooDeepIndirection(SmolStr),

    /// Operation requires a visual element.
    #[error("object '{object}' of type {type_name} is not a widget")]
    NotAWidget { object: SmolStr, type_name: SmolStr },

    /// Emit on a signal without the action flag.
    #[error("signal '{signal}' of object '{object}' is not an action signal")]
    NotAnActionSignal { object: SmolStr, signal: SmolStr },

    /// Connecting to `notify` without naming the property.
    #[error("notify signal for object '{0}' requires a detail (property name)")]
    MissingDetailForNotify(SmolStr),

    /// Unknown message identifier.
    #[error("message id '{0}' not found")]
    UnknownMessageId(SmolStr),

    /// Value cannot be converted to the target kind.
    #[error("invalid value: {0}")]
    InvalidValue(SmolStr),

    /// Script execution failed.
    #[error("script error: {0}")]
    Script(SmolStr),

    /// Configuration error.
    #[error("invalid config '{0}'")]
    InvalidConfig(SmolStr),

    /// Control transport error.
    #[error("transport error '{0}'")]
    Transport(SmolStr),
}

impl ControlError {
    /// Stable machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NotFound",
            Self::NoProperty { .. } => "NoProperty",
            Self::NoSignal { .. } => "NoSignal",
            Self::NotReadable { .. } => "NotReadable",
            Self::NotWritable { .. } => "NotWritable",
            Self::NotObjectType { .. } => "NotObjectType",
            Self::NeedsContextName(_) => "NeedsContextName",
            Self::TooDeepIndirection(_) => "TooDeepIndirection",
            Self::NotAWidget { .. } => "NotAWidget",
            Self::NotAnActionSignal { .. } => "NotAnActionSignal",
            Self::MissingDetailForNotify(_) => "MissingDetailForNotify",
            Self::UnknownMessageId(_) => "UnknownMessageId",
            Self::InvalidValue(_) => "InvalidValue",
            Self::Script(_) => "Script",
            Self::InvalidConfig(_) => "InvalidConfig",
            Self::Transport(_) => "Transport",
        }
    }
}

impl From<ScriptError> for ControlError {
    fn from(value: ScriptError) -> Self {
        Self::Script(value.to_string().into())
    }
}
