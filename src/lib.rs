pub mod array;
pub mod dict;
pub mod error;
pub mod field;
pub mod group;
pub mod node;
pub mod runtime;
pub mod validate;


#[doc(hidden)]
pub use serde;

pub use array::FormArray;
pub use dict::FormDict;
pub use error::{FormError, FormResult, ValidationErrors, merge_validation_errors, validation_error};
pub use field::FormField;
pub use formtree_derive::GroupModel;
pub use group::{ControlLens, FieldKey, FormGroup, GroupModel};
pub use node::{ControlOptions, ControlPath, FormNode, PathSeg};
pub use runtime::{
    ControlStatus, RawAsyncValidatorFn, RawControl, RawOptions, RawValidatorFn, Subscription,
    UpdateOn, UpdateOptions,
};
pub use validate::{
    AsyncOutcome, AsyncValidator, ControlView, Validator, compose, compose_async, debounced,
    into_raw_async_validator, into_raw_validator, max, max_length, min, min_length, required,
};
