use std::marker::PhantomData;

use crate::errors::ItemError;

use super::{FromValue, Item};

/// Typed accessor for one named slot on an [`Item`].
///
/// A `Field<T>` pairs a field name with the value type the caller expects
/// there. Reading through it can fail with [`ItemError::MissingField`] or
/// [`ItemError::TypeMismatch`], recoverable per-item conditions, never a
/// crash.
pub struct Field<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Field<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T: FromValue> Field<T> {
    /// Read this field off an item, converting to the expected type.
    pub fn get(&self, item: &Item) -> Result<T, ItemError> {
        let value = item
            .get_value(self.name)
            .ok_or_else(|| ItemError::missing_field(self.name))?;
        T::from_value(value).ok_or_else(|| ItemError::TypeMismatch {
            field: self.name.to_string(),
            expected: T::expected(),
            actual: value.type_name(),
        })
    }
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Field<T> {}

impl<T> std::fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field").field("name", &self.name).finish()
    }
}
