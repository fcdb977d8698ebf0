//! Error types for the core runtime crate.

use thiserror::Error;

/// Errors raised by core runtime utilities.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoreError {
    /// A nested builder property was configured after an explicit instance was set.
    #[error("property `{property}` holds an explicit instance and cannot be configured")]
    PropertyConflict {
        /// Name of the offending property.
        property: String,
    },

    /// An attribute was present but held a value of a different type.
    #[error("attribute `{key}` holds a value of an unexpected type")]
    AttributeType {
        /// Name of the attribute key.
        key: String,
    },
}

impl CoreError {
    /// Create a property conflict error.
    pub fn property_conflict(property: impl Into<String>) -> Self {
        Self::PropertyConflict {
            property: property.into(),
        }
    }

    /// Create an attribute type error.
    pub fn attribute_type(key: impl Into<String>) -> Self {
        Self::AttributeType { key: key.into() }
    }
}

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
