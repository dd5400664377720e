use std::fmt::{self, Debug, Display, Formatter};
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{FormError, FormResult, ValidationErrors};
use crate::runtime::{
    ControlStatus, RawControl, RawOptions, Subscription, UpdateOn, UpdateOptions,
};
use crate::validate::{
    AsyncValidator, Validator, into_raw_async_validator, into_raw_validator,
};

/// One step of a control path: a field/dictionary key or an array index.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PathSeg {
    Key(String),
    Index(usize),
}

impl Display for PathSeg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            PathSeg::Key(key) => f.write_str(key),
            PathSeg::Index(index) => write!(f, "{index}"),
        }
    }
}

impl From<String> for PathSeg {
    fn from(key: String) -> Self {
        PathSeg::Key(key)
    }
}

impl From<&str> for PathSeg {
    fn from(key: &str) -> Self {
        PathSeg::Key(key.to_string())
    }
}

impl From<usize> for PathSeg {
    fn from(index: usize) -> Self {
        PathSeg::Index(index)
    }
}

/// A path through nested containers, either parsed from a dot-delimited
/// string (`"items.0.count"`, numeric segments become indices) or built from
/// explicit segments.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ControlPath(Vec<PathSeg>);

impl ControlPath {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn segments(&self) -> std::slice::Iter<'_, PathSeg> {
        self.0.iter()
    }
}

impl Display for ControlPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.0.iter().enumerate() {
            if position > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

impl From<&str> for ControlPath {
    fn from(path: &str) -> Self {
        if path.is_empty() {
            return Self(Vec::new());
        }
        Self(
            path.split('.')
                .map(|segment| match segment.parse::<usize>() {
                    Ok(index) => PathSeg::Index(index),
                    Err(_) => PathSeg::Key(segment.to_string()),
                })
                .collect(),
        )
    }
}

impl From<String> for ControlPath {
    fn from(path: String) -> Self {
        Self::from(path.as_str())
    }
}

impl From<Vec<PathSeg>> for ControlPath {
    fn from(segments: Vec<PathSeg>) -> Self {
        Self(segments)
    }
}

impl FromIterator<PathSeg> for ControlPath {
    fn from_iter<I: IntoIterator<Item = PathSeg>>(segments: I) -> Self {
        Self(segments.into_iter().collect())
    }
}

/// Constructor bundle accepted by every typed control: validators, async
/// validators and the update trigger, all typed against the control's
/// derived value shape.
pub struct ControlOptions<V> {
    pub validators: Vec<Arc<dyn Validator<V>>>,
    pub async_validators: Vec<Arc<dyn AsyncValidator<V>>>,
    pub update_on: UpdateOn,
}

impl<V> Default for ControlOptions<V> {
    fn default() -> Self {
        Self {
            validators: Vec::new(),
            async_validators: Vec::new(),
            update_on: UpdateOn::default(),
        }
    }
}

impl<V> ControlOptions<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator(mut self, validator: impl Validator<V> + 'static) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }

    pub fn with_async_validator(mut self, validator: impl AsyncValidator<V> + 'static) -> Self {
        self.async_validators.push(Arc::new(validator));
        self
    }

    pub fn with_update_on(mut self, update_on: UpdateOn) -> Self {
        self.update_on = update_on;
        self
    }

    pub(crate) fn into_raw(self) -> RawOptions
    where
        V: DeserializeOwned + Send + Sync + 'static,
    {
        RawOptions {
            validators: self
                .validators
                .into_iter()
                .map(into_raw_validator)
                .collect(),
            async_validators: self
                .async_validators
                .into_iter()
                .map(into_raw_async_validator)
                .collect(),
            update_on: self.update_on,
        }
    }
}

/// Capability set shared by the four control kinds.
///
/// `Value` is the derived plain-value shape of the node: `Option<T>` for a
/// leaf, `Vec` / `BTreeMap` projections for arrays and dictionaries, and the
/// generated value struct for a group — recursively, to arbitrary nesting
/// depth. `Patch` is the matching partial shape accepted by `patch_value`.
/// Everything else forwards 1:1 to the underlying runtime control, which
/// `raw()` exposes unmodified.
pub trait FormNode: Sized {
    type Value: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Patch: Serialize + Send + Sync + 'static;

    fn raw(&self) -> &RawControl;

    fn value(&self) -> FormResult<Self::Value> {
        serde_json::from_value(self.raw().raw_value()?)
            .map_err(|error| FormError::Decode(error.to_string()))
    }

    fn set_value(&self, value: Self::Value) -> FormResult<()> {
        self.set_value_with(value, UpdateOptions::default())
    }

    fn set_value_with(&self, value: Self::Value, options: UpdateOptions) -> FormResult<()> {
        let encoded =
            serde_json::to_value(&value).map_err(|error| FormError::Encode(error.to_string()))?;
        self.raw().set_value(encoded, options)
    }

    fn patch_value(&self, patch: Self::Patch) -> FormResult<()> {
        self.patch_value_with(patch, UpdateOptions::default())
    }

    fn patch_value_with(&self, patch: Self::Patch, options: UpdateOptions) -> FormResult<()> {
        let encoded =
            serde_json::to_value(&patch).map_err(|error| FormError::Encode(error.to_string()))?;
        self.raw().patch_value(encoded, options)
    }

    fn reset(&self) -> FormResult<()> {
        self.raw().reset(None, UpdateOptions::default())
    }

    fn reset_with(&self, state: Self::Patch) -> FormResult<()> {
        self.reset_with_options(Some(state), UpdateOptions::default())
    }

    fn reset_with_options(
        &self,
        state: Option<Self::Patch>,
        options: UpdateOptions,
    ) -> FormResult<()> {
        let encoded = match state {
            Some(state) => Some(
                serde_json::to_value(&state)
                    .map_err(|error| FormError::Encode(error.to_string()))?,
            ),
            None => None,
        };
        self.raw().reset(encoded, options)
    }

    fn status(&self) -> FormResult<ControlStatus> {
        self.raw().status()
    }

    fn is_valid(&self) -> FormResult<bool> {
        Ok(self.status()? == ControlStatus::Valid)
    }

    fn is_invalid(&self) -> FormResult<bool> {
        Ok(self.status()? == ControlStatus::Invalid)
    }

    fn is_pending(&self) -> FormResult<bool> {
        Ok(self.status()? == ControlStatus::Pending)
    }

    fn is_disabled(&self) -> FormResult<bool> {
        Ok(self.status()? == ControlStatus::Disabled)
    }

    fn is_enabled(&self) -> FormResult<bool> {
        Ok(!self.is_disabled()?)
    }

    fn errors(&self) -> FormResult<Option<ValidationErrors>> {
        self.raw().errors()
    }

    fn set_errors(
        &self,
        errors: Option<ValidationErrors>,
        options: UpdateOptions,
    ) -> FormResult<()> {
        self.raw().set_errors(errors, options)
    }

    fn get_error(&self, code: &str) -> FormResult<Option<serde_json::Value>> {
        self.raw().get_error(code)
    }

    fn has_error(&self, code: &str) -> FormResult<bool> {
        self.raw().has_error(code)
    }

    fn dirty(&self) -> FormResult<bool> {
        self.raw().dirty()
    }

    fn pristine(&self) -> FormResult<bool> {
        Ok(!self.dirty()?)
    }

    fn touched(&self) -> FormResult<bool> {
        self.raw().touched()
    }

    fn untouched(&self) -> FormResult<bool> {
        Ok(!self.touched()?)
    }

    fn mark_touched(&self, options: UpdateOptions) -> FormResult<()> {
        self.raw().mark_touched(options)
    }

    fn mark_untouched(&self, options: UpdateOptions) -> FormResult<()> {
        self.raw().mark_untouched(options)
    }

    fn mark_dirty(&self, options: UpdateOptions) -> FormResult<()> {
        self.raw().mark_dirty(options)
    }

    fn mark_pristine(&self, options: UpdateOptions) -> FormResult<()> {
        self.raw().mark_pristine(options)
    }

    fn mark_pending(&self, options: UpdateOptions) -> FormResult<()> {
        self.raw().mark_pending(options)
    }

    fn enable(&self, options: UpdateOptions) -> FormResult<()> {
        self.raw().enable(options)
    }

    fn disable(&self, options: UpdateOptions) -> FormResult<()> {
        self.raw().disable(options)
    }

    fn set_validators(&self, validators: Vec<Arc<dyn Validator<Self::Value>>>) -> FormResult<()> {
        self.raw().set_validators(
            validators
                .into_iter()
                .map(into_raw_validator)
                .collect(),
        )
    }

    fn set_async_validators(
        &self,
        validators: Vec<Arc<dyn AsyncValidator<Self::Value>>>,
    ) -> FormResult<()> {
        self.raw().set_async_validators(
            validators
                .into_iter()
                .map(into_raw_async_validator)
                .collect(),
        )
    }

    fn clear_validators(&self) -> FormResult<()> {
        self.raw().clear_validators()
    }

    fn clear_async_validators(&self) -> FormResult<()> {
        self.raw().clear_async_validators()
    }

    fn update_value_and_validity(&self, options: UpdateOptions) -> FormResult<()> {
        self.raw().update_value_and_validity(options)
    }

    /// Runs the registered async validators and applies the merged result;
    /// see `RawControl::validate_async` for the superseding rules.
    fn validate_async(&self) -> impl Future<Output = FormResult<ControlStatus>> + '_ {
        self.raw().validate_async(UpdateOptions::default())
    }

    /// Resolves a dot-delimited or segment path to the raw handle of a
    /// descendant, `None` at the first unresolved segment.
    fn find(&self, path: impl Into<ControlPath>) -> FormResult<Option<RawControl>> {
        self.raw().find(path)
    }

    fn parent(&self) -> FormResult<Option<RawControl>> {
        self.raw().parent()
    }

    fn root(&self) -> FormResult<RawControl> {
        self.raw().root()
    }

    /// Typed value-change subscription; fires with the freshly decoded value
    /// on every committed change.
    fn subscribe_value(
        &self,
        callback: impl Fn(&Self::Value) + Send + Sync + 'static,
    ) -> FormResult<Subscription> {
        let raw = self.raw().clone();
        self.raw().subscribe_value(move |_| {
            let Ok(encoded) = raw.raw_value() else {
                return;
            };
            let Ok(value) = serde_json::from_value::<Self::Value>(encoded) else {
                return;
            };
            callback(&value);
        })
    }

    fn subscribe_status(
        &self,
        callback: impl Fn(ControlStatus) + Send + Sync + 'static,
    ) -> FormResult<Subscription> {
        self.raw().subscribe_status(callback)
    }

    fn unsubscribe(&self, subscription: Subscription) -> FormResult<()> {
        self.raw().unsubscribe(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_paths_parse_keys_and_indices() {
        let path = ControlPath::from("items.2.count");
        let segments = path.segments().cloned().collect::<Vec<_>>();
        assert_eq!(
            segments,
            vec![
                PathSeg::Key("items".to_string()),
                PathSeg::Index(2),
                PathSeg::Key("count".to_string()),
            ]
        );
    }

    #[test]
    fn empty_string_is_an_empty_path() {
        assert!(ControlPath::from("").is_empty());
    }

    #[test]
    fn path_display_round_trips() {
        let path = ControlPath::from("addresses.0.street");
        assert_eq!(path.to_string(), "addresses.0.street");
    }
}
