use std::fmt::{Debug, Display, Formatter};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::FormResult;
use crate::node::{ControlOptions, FormNode};
use crate::runtime::{RawControl, UpdateOptions};

/// Name of a fixed-group child, generated by the `GroupModel` derive.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct FieldKey(&'static str);

impl FieldKey {
    pub const fn new(value: &'static str) -> Self {
        Self(value)
    }

    pub const fn as_str(self) -> &'static str {
        self.0
    }
}

impl Display for FieldKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.0)
    }
}

/// Typed access to one named child of a group record: lookup and in-place
/// replacement, never addition or removal — the key set is fixed by the
/// record type.
pub trait ControlLens<C>: Copy + Send + Sync + 'static {
    type Child: FormNode;

    fn key(self) -> FieldKey;
    fn get(self, record: &C) -> &Self::Child;
    fn replace(self, record: &mut C, child: Self::Child) -> Self::Child;
}

/// A record of named child nodes, together with its derived value shape.
///
/// Implemented by `#[derive(GroupModel)]` on a plain struct whose fields are
/// node types; the derive also generates the `Value` struct (each field
/// mapped through the child's own value derivation), the `Patch` struct
/// (every field optional) and the `Fields` lens set.
pub trait GroupModel: Sized + Send + Sync + 'static {
    type Value: Clone + Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Patch: Default + Serialize + Send + Sync + 'static;
    type Fields;

    fn fields() -> Self::Fields;

    /// Child handles in declaration order.
    fn children(&self) -> Vec<(&'static str, RawControl)>;
}

/// Fixed-shape group: a compile-time mapping from field name to child node.
///
/// A heterogeneous record is expressed as one `GroupModel` struct; the value
/// read back is the generated value struct, recursively derived. The derive
/// rejects shapes that cannot carry a fixed key set:
///
/// ```compile_fail
/// use formtree::{FormField, GroupModel};
///
/// #[derive(GroupModel)]
/// struct Open<T> {
///     value: FormField<T>,
/// }
/// ```
pub struct FormGroup<C: GroupModel> {
    raw: RawControl,
    controls: C,
}

impl<C: GroupModel> FormGroup<C> {
    pub fn new(controls: C) -> FormResult<Self> {
        Self::with_options(controls, ControlOptions::default())
    }

    pub fn with_options(controls: C, options: ControlOptions<C::Value>) -> FormResult<Self> {
        let children = controls
            .children()
            .into_iter()
            .map(|(name, handle)| (name.to_string(), handle))
            .collect();
        let raw = RawControl::keyed(children, options.into_raw())?;
        Ok(Self { raw, controls })
    }

    /// The child record, for direct field access.
    pub fn controls(&self) -> &C {
        &self.controls
    }

    pub fn control<L: ControlLens<C>>(&self, lens: L) -> &L::Child {
        lens.get(&self.controls)
    }

    /// Replaces the child behind `lens`, detaching the displaced node and
    /// swapping the runtime child 1:1. Returns the displaced node.
    pub fn set_control<L: ControlLens<C>>(&mut self, lens: L, node: L::Child) -> FormResult<L::Child> {
        self.set_control_with(lens, node, UpdateOptions::default())
    }

    pub fn set_control_with<L: ControlLens<C>>(
        &mut self,
        lens: L,
        node: L::Child,
        options: UpdateOptions,
    ) -> FormResult<L::Child> {
        self.raw
            .set_child(lens.key().as_str(), node.raw().clone(), options)?;
        Ok(lens.replace(&mut self.controls, node))
    }
}

impl<C: GroupModel> FormNode for FormGroup<C> {
    type Value = C::Value;
    type Patch = C::Patch;

    fn raw(&self) -> &RawControl {
        &self.raw
    }
}
