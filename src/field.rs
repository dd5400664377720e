use std::fmt::Debug;
use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{FormError, FormResult};
use crate::node::{ControlOptions, FormNode};
use crate::runtime::{RawControl, RawOptions};

/// Leaf control holding a single value of type `T` (`None` when unset).
///
/// `set_value` and `patch_value` coincide here: a scalar has no partial
/// shape.
pub struct FormField<T> {
    raw: RawControl,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FormField<T>
where
    T: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(initial: Option<T>) -> FormResult<Self> {
        Self::with_options(initial, ControlOptions::default())
    }

    pub fn with_options(
        initial: Option<T>,
        options: ControlOptions<Option<T>>,
    ) -> FormResult<Self> {
        let encoded = match &initial {
            Some(value) => serde_json::to_value(value)
                .map_err(|error| FormError::Encode(error.to_string()))?,
            None => Value::Null,
        };
        let raw = RawControl::leaf(encoded, options.into_raw())?;
        Ok(Self {
            raw,
            _marker: PhantomData,
        })
    }

    /// Wraps an existing leaf runtime control without touching it.
    pub fn from_raw(raw: RawControl) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    /// Host two-way-binding hook: fires with the decoded value on every
    /// committed write.
    pub fn register_on_change(
        &self,
        callback: impl Fn(&Option<T>) + Send + Sync + 'static,
    ) -> FormResult<()> {
        self.raw.register_on_change(move |value| {
            let decoded = serde_json::from_value::<Option<T>>(value.clone()).unwrap_or(None);
            callback(&decoded);
        })
    }

    /// Host two-way-binding hook: fires when the control is enabled or
    /// disabled.
    pub fn register_on_disabled_change(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> FormResult<()> {
        self.raw.register_on_disabled_change(callback)
    }
}

impl<T> FormNode for FormField<T>
where
    T: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    type Value = Option<T>;
    type Patch = Option<T>;

    fn raw(&self) -> &RawControl {
        &self.raw
    }
}
