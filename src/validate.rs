use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use futures::stream::{BoxStream, StreamExt};
use futures_timer::Delay;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::error::{
    FormError, FormResult, ValidationErrors, merge_validation_errors, validation_error,
};
use crate::runtime::{
    ControlStatus, RawAsyncValidatorFn, RawControl, RawValidatorFn,
};

/// Read-only typed view handed to validators: the decoded value plus the
/// node flags, without exposing any mutation surface.
pub struct ControlView<'a, V> {
    raw: &'a RawControl,
    _marker: PhantomData<fn() -> V>,
}

impl<'a, V: DeserializeOwned> ControlView<'a, V> {
    pub(crate) fn new(raw: &'a RawControl) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn value(&self) -> FormResult<V> {
        serde_json::from_value(self.raw.raw_value()?)
            .map_err(|error| FormError::Decode(error.to_string()))
    }

    pub fn dirty(&self) -> FormResult<bool> {
        self.raw.dirty()
    }

    pub fn touched(&self) -> FormResult<bool> {
        self.raw.touched()
    }

    pub fn status(&self) -> FormResult<ControlStatus> {
        self.raw.status()
    }

    pub fn errors(&self) -> FormResult<Option<ValidationErrors>> {
        self.raw.errors()
    }

    pub fn raw(&self) -> &RawControl {
        self.raw
    }
}

/// Synchronous typed validator: no error, or a mapping of error code to
/// detail.
pub trait Validator<V>: Send + Sync {
    fn validate(&self, control: &ControlView<'_, V>) -> Option<ValidationErrors>;
}

impl<V, F> Validator<V> for F
where
    F: for<'a> Fn(&ControlView<'a, V>) -> Option<ValidationErrors> + Send + Sync,
{
    fn validate(&self, control: &ControlView<'_, V>) -> Option<ValidationErrors> {
        (self)(control)
    }
}


/// The shape of an asynchronous validation result, chosen by the validator
/// author at the boundary: a one-shot future or a stream whose first item is
/// taken (an ended stream reports no errors).
pub enum AsyncOutcome {
    Future(BoxFuture<'static, Option<ValidationErrors>>),
    Stream(BoxStream<'static, Option<ValidationErrors>>),
}

impl AsyncOutcome {
    pub fn future(
        future: impl Future<Output = Option<ValidationErrors>> + Send + 'static,
    ) -> Self {
        Self::Future(future.boxed())
    }

    pub fn stream(
        stream: impl futures::Stream<Item = Option<ValidationErrors>> + Send + 'static,
    ) -> Self {
        Self::Stream(stream.boxed())
    }

    fn resolve(self) -> BoxFuture<'static, Option<ValidationErrors>> {
        match self {
            AsyncOutcome::Future(future) => future,
            AsyncOutcome::Stream(stream) => {
                async move { stream.into_future().await.0.flatten() }.boxed()
            }
        }
    }
}

/// Asynchronous typed validator.
pub trait AsyncValidator<V>: Send + Sync {
    fn validate(&self, control: &ControlView<'_, V>) -> AsyncOutcome;
}

impl<V, F> AsyncValidator<V> for F
where
    F: for<'a> Fn(&ControlView<'a, V>) -> AsyncOutcome + Send + Sync,
{
    fn validate(&self, control: &ControlView<'_, V>) -> AsyncOutcome {
        (self)(control)
    }
}


struct Composed<V> {
    validators: Vec<Arc<dyn Validator<V>>>,
}

impl<V: 'static> Validator<V> for Composed<V> {
    fn validate(&self, control: &ControlView<'_, V>) -> Option<ValidationErrors> {
        merge_validation_errors(
            self.validators
                .iter()
                .map(|validator| validator.validate(control)),
        )
    }
}

/// Merges an ordered list of validators into one: the union of every error
/// mapping, later entries winning on code collision, `None` when all pass.
pub fn compose<V: 'static>(validators: Vec<Arc<dyn Validator<V>>>) -> impl Validator<V> {
    Composed { validators }
}

struct ComposedAsync<V> {
    validators: Vec<Arc<dyn AsyncValidator<V>>>,
}

impl<V: 'static> AsyncValidator<V> for ComposedAsync<V> {
    fn validate(&self, control: &ControlView<'_, V>) -> AsyncOutcome {
        // Issue every validator up front, then join: a barrier over
        // independent runs, not a sequential chain.
        let pending = self
            .validators
            .iter()
            .map(|validator| validator.validate(control).resolve())
            .collect::<Vec<_>>();
        AsyncOutcome::Future(
            async move { merge_validation_errors(join_all(pending).await) }.boxed(),
        )
    }
}

/// Merges async validators into one that settles once every input has.
pub fn compose_async<V: 'static>(
    validators: Vec<Arc<dyn AsyncValidator<V>>>,
) -> impl AsyncValidator<V> {
    ComposedAsync { validators }
}

struct Debounced<A> {
    delay: Duration,
    validator: A,
}

impl<V, A: AsyncValidator<V>> AsyncValidator<V> for Debounced<A> {
    fn validate(&self, control: &ControlView<'_, V>) -> AsyncOutcome {
        let delay = self.delay;
        let inner = self.validator.validate(control).resolve();
        AsyncOutcome::Future(
            async move {
                Delay::new(delay).await;
                inner.await
            }
            .boxed(),
        )
    }
}

/// Delays an async validator; superseded runs are discarded by the ticket
/// check when their result finally lands.
pub fn debounced<V, A>(delay: Duration, validator: A) -> impl AsyncValidator<V>
where
    V: 'static,
    A: AsyncValidator<V>,
{
    Debounced { delay, validator }
}

/// Adapts a typed validator into the closure shape the runtime stores.
pub fn into_raw_validator<V>(validator: Arc<dyn Validator<V>>) -> RawValidatorFn
where
    V: DeserializeOwned + Send + Sync + 'static,
{
    Arc::new(move |raw: &RawControl| validator.validate(&ControlView::new(raw)))
}

/// Adapts a typed async validator into the closure shape the runtime stores.
pub fn into_raw_async_validator<V>(validator: Arc<dyn AsyncValidator<V>>) -> RawAsyncValidatorFn
where
    V: DeserializeOwned + Send + Sync + 'static,
{
    Arc::new(move |raw: &RawControl| validator.validate(&ControlView::new(raw)).resolve())
}

fn decode_failure(error: FormError) -> ValidationErrors {
    validation_error("decode", error.to_string())
}

struct Required<T>(PhantomData<fn() -> T>);

impl<T> Validator<Option<T>> for Required<T>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    fn validate(&self, control: &ControlView<'_, Option<T>>) -> Option<ValidationErrors> {
        match control.value() {
            Ok(Some(_)) => None,
            Ok(None) => Some(validation_error("required", true)),
            Err(error) => Some(decode_failure(error)),
        }
    }
}

/// Fails with `required` when the leaf is unset.
pub fn required<T>() -> impl Validator<Option<T>>
where
    T: DeserializeOwned + Send + Sync + 'static,
{
    Required(PhantomData)
}

struct MinLength(usize);

impl Validator<Option<String>> for MinLength {
    fn validate(&self, control: &ControlView<'_, Option<String>>) -> Option<ValidationErrors> {
        match control.value() {
            Ok(Some(value)) if value.chars().count() < self.0 => Some(validation_error(
                "min_length",
                json!({"required_length": self.0, "actual_length": value.chars().count()}),
            )),
            Ok(_) => None,
            Err(error) => Some(decode_failure(error)),
        }
    }
}

/// Fails with `min_length` when a present string is shorter than `length`;
/// an unset leaf passes.
pub fn min_length(length: usize) -> impl Validator<Option<String>> {
    MinLength(length)
}

struct MaxLength(usize);

impl Validator<Option<String>> for MaxLength {
    fn validate(&self, control: &ControlView<'_, Option<String>>) -> Option<ValidationErrors> {
        match control.value() {
            Ok(Some(value)) if value.chars().count() > self.0 => Some(validation_error(
                "max_length",
                json!({"required_length": self.0, "actual_length": value.chars().count()}),
            )),
            Ok(_) => None,
            Err(error) => Some(decode_failure(error)),
        }
    }
}

/// Fails with `max_length` when a present string is longer than `length`.
pub fn max_length(length: usize) -> impl Validator<Option<String>> {
    MaxLength(length)
}

struct Min(f64);

impl Validator<Option<f64>> for Min {
    fn validate(&self, control: &ControlView<'_, Option<f64>>) -> Option<ValidationErrors> {
        match control.value() {
            Ok(Some(value)) if value < self.0 => Some(validation_error(
                "min",
                json!({"min": self.0, "actual": value}),
            )),
            Ok(_) => None,
            Err(error) => Some(decode_failure(error)),
        }
    }
}

/// Fails with `min` when a present number is below `floor`.
pub fn min(floor: f64) -> impl Validator<Option<f64>> {
    Min(floor)
}

struct Max(f64);

impl Validator<Option<f64>> for Max {
    fn validate(&self, control: &ControlView<'_, Option<f64>>) -> Option<ValidationErrors> {
        match control.value() {
            Ok(Some(value)) if value > self.0 => Some(validation_error(
                "max",
                json!({"max": self.0, "actual": value}),
            )),
            Ok(_) => None,
            Err(error) => Some(decode_failure(error)),
        }
    }
}

/// Fails with `max` when a present number is above `ceiling`.
pub fn max(ceiling: f64) -> impl Validator<Option<f64>> {
    Max(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::RawOptions;
    use futures::executor::block_on;
    use serde_json::Value;

    fn view_over(value: Value) -> RawControl {
        RawControl::leaf(value, RawOptions::default()).expect("leaf construction")
    }

    #[test]
    fn compose_merges_error_mappings_with_later_entries_winning() {
        let first: Arc<dyn Validator<Option<String>>> =
            Arc::new(|_: &ControlView<'_, Option<String>>| {
                Some(validation_error("shared", "first"))
            });
        let second: Arc<dyn Validator<Option<String>>> =
            Arc::new(|_: &ControlView<'_, Option<String>>| {
                let mut errors = validation_error("shared", "second");
                errors.extend(validation_error("extra", true));
                Some(errors)
            });
        let composed = compose(vec![first, second]);
        let raw = view_over(Value::Null);
        let errors = composed
            .validate(&ControlView::new(&raw))
            .expect("both validators fail");
        assert_eq!(errors.get("shared"), Some(&Value::String("second".into())));
        assert!(errors.contains_key("extra"));
    }

    #[test]
    fn compose_passes_when_every_validator_passes() {
        let pass: Arc<dyn Validator<Option<String>>> =
            Arc::new(|_: &ControlView<'_, Option<String>>| None);
        let composed = compose(vec![pass.clone(), pass]);
        let raw = view_over(Value::String("ok".into()));
        assert!(composed.validate(&ControlView::new(&raw)).is_none());
    }

    #[test]
    fn compose_async_settles_after_every_validator() {
        let slow: Arc<dyn AsyncValidator<Option<String>>> =
            Arc::new(|_: &ControlView<'_, Option<String>>| {
                AsyncOutcome::future(async { Some(validation_error("slow", true)) })
            });
        let fast: Arc<dyn AsyncValidator<Option<String>>> =
            Arc::new(|_: &ControlView<'_, Option<String>>| {
                AsyncOutcome::stream(futures::stream::iter([Some(validation_error(
                    "fast", true,
                ))]))
            });
        let clean: Arc<dyn AsyncValidator<Option<String>>> =
            Arc::new(|_: &ControlView<'_, Option<String>>| AsyncOutcome::future(async { None }));
        let composed = compose_async(vec![slow, fast, clean]);
        let raw = view_over(Value::Null);
        let errors = block_on(composed.validate(&ControlView::new(&raw)).resolve())
            .expect("two of three fail");
        assert!(errors.contains_key("slow"));
        assert!(errors.contains_key("fast"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn debounced_validator_still_resolves() {
        let inner = |_: &ControlView<'_, Option<String>>| {
            AsyncOutcome::future(async { Some(validation_error("late", true)) })
        };
        let validator = debounced(Duration::from_millis(5), inner);
        let raw = view_over(Value::Null);
        let errors = block_on(validator.validate(&ControlView::new(&raw)).resolve())
            .expect("late failure");
        assert!(errors.contains_key("late"));
    }

    #[test]
    fn ended_stream_reports_no_errors() {
        let empty: Arc<dyn AsyncValidator<Option<String>>> =
            Arc::new(|_: &ControlView<'_, Option<String>>| {
                AsyncOutcome::stream(futures::stream::empty())
            });
        let raw = view_over(Value::Null);
        let outcome = empty.validate(&ControlView::new(&raw));
        assert!(block_on(outcome.resolve()).is_none());
    }

    #[test]
    fn builtin_validators_check_presence_and_bounds() {
        let raw = view_over(Value::Null);
        let view = ControlView::<Option<String>>::new(&raw);
        assert!(required::<String>().validate(&view).is_some());
        assert!(min_length(3).validate(&view).is_none());

        let raw = view_over(Value::String("ab".into()));
        let view = ControlView::<Option<String>>::new(&raw);
        assert!(required::<String>().validate(&view).is_none());
        let errors = min_length(3).validate(&view).expect("too short");
        assert_eq!(
            errors.get("min_length"),
            Some(&json!({"required_length": 3, "actual_length": 2}))
        );

        let raw = view_over(json!(12.5));
        let view = ControlView::<Option<f64>>::new(&raw);
        assert!(min(10.0).validate(&view).is_none());
        assert!(max(10.0).validate(&view).is_some());
    }
}
