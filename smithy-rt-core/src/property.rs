//! Nested builder properties.
//!
//! Composite configuration (a retry strategy owning a token bucket, say)
//! lets callers either hand over a finished instance or configure the
//! nested component's builder in place. [`DslProperty`] records which of
//! the two happened. Once an explicit instance is set, configuring the
//! builder is rejected instead of silently discarding the instance.

use std::fmt;

use crate::error::{CoreError, Result};

/// A builder that produces values of type `T`.
pub trait BuildInto<T> {
    /// Build the finished value.
    fn build_into(self) -> T;
}

/// State of a nested builder property.
pub enum DslProperty<T, B> {
    /// Nothing was provided; the default is used at build time.
    Unset,
    /// An explicit instance was provided.
    Instance(T),
    /// The nested builder was configured.
    Configured(B),
}

impl<T, B> Default for DslProperty<T, B> {
    fn default() -> Self {
        Self::Unset
    }
}

impl<T, B> DslProperty<T, B>
where
    B: BuildInto<T> + Default,
{
    /// Set an explicit instance, replacing any previous state.
    pub fn set_instance(&mut self, instance: T) {
        *self = Self::Instance(instance);
    }

    /// Configure the nested builder.
    ///
    /// Repeated calls apply to the same builder. Fails if an explicit
    /// instance has already been set.
    pub fn configure<F>(&mut self, name: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut B),
    {
        match self {
            Self::Instance(_) => Err(CoreError::property_conflict(name)),
            Self::Configured(builder) => {
                f(builder);
                Ok(())
            }
            Self::Unset => {
                let mut builder = B::default();
                f(&mut builder);
                *self = Self::Configured(builder);
                Ok(())
            }
        }
    }

    /// Mutable access to the nested builder, if one was configured.
    pub fn configured_mut(&mut self) -> Option<&mut B> {
        match self {
            Self::Configured(builder) => Some(builder),
            _ => None,
        }
    }

    /// Whether anything was provided.
    pub fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }

    /// Produce the final value, using `default` when unset.
    pub fn build<F>(self, default: F) -> T
    where
        F: FnOnce() -> T,
    {
        match self {
            Self::Unset => default(),
            Self::Instance(instance) => instance,
            Self::Configured(builder) => builder.build_into(),
        }
    }
}

impl<T, B> fmt::Debug for DslProperty<T, B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("Unset"),
            Self::Instance(_) => f.write_str("Instance(..)"),
            Self::Configured(_) => f.write_str("Configured(..)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct WidgetBuilder {
        size: u32,
    }

    impl BuildInto<u32> for WidgetBuilder {
        fn build_into(self) -> u32 {
            self.size * 10
        }
    }

    type WidgetProperty = DslProperty<u32, WidgetBuilder>;

    #[test]
    fn test_unset_uses_default() {
        let prop = WidgetProperty::default();
        assert!(!prop.is_set());
        assert_eq!(prop.build(|| 7), 7);
    }

    #[test]
    fn test_configure_accumulates() {
        let mut prop = WidgetProperty::default();
        prop.configure("widget", |b| b.size = 1).unwrap();
        prop.configure("widget", |b| b.size += 2).unwrap();
        assert_eq!(prop.build(|| 0), 30);
    }

    #[test]
    fn test_instance_wins_over_later_configure() {
        let mut prop = WidgetProperty::default();
        prop.set_instance(99);

        let err = prop.configure("widget", |b| b.size = 1).unwrap_err();
        assert_eq!(err, CoreError::property_conflict("widget"));
        assert_eq!(prop.build(|| 0), 99);
    }

    #[test]
    fn test_instance_replaces_configured_builder() {
        let mut prop = WidgetProperty::default();
        prop.configure("widget", |b| b.size = 4).unwrap();
        prop.set_instance(5);
        assert_eq!(prop.build(|| 0), 5);
    }
}
