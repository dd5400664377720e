use std::collections::BTreeMap;
use std::collections::btree_map::Entry;

use crate::error::FormResult;
use crate::node::{ControlOptions, FormNode};
use crate::runtime::{RawControl, UpdateOptions};

/// Open-ended dictionary: a runtime-mutable mapping from string keys to
/// children that all share one node type `C`.
///
/// The single type parameter is deliberate: a dictionary of "either A or B"
/// children would defeat per-key typing, and a heterogeneous entry set does
/// not unify to one `C`:
///
/// ```compile_fail
/// use formtree::{FormDict, FormField};
///
/// let dict = FormDict::new(vec![
///     ("name", FormField::new(Some("paul".to_string())).unwrap()),
///     ("age", FormField::new(Some(30_u32)).unwrap()),
/// ]);
/// ```
pub struct FormDict<C: FormNode> {
    raw: RawControl,
    controls: BTreeMap<String, C>,
}

impl<C: FormNode> FormDict<C> {
    pub fn new<K: Into<String>>(entries: impl IntoIterator<Item = (K, C)>) -> FormResult<Self> {
        Self::with_options(entries, ControlOptions::default())
    }

    pub fn with_options<K: Into<String>>(
        entries: impl IntoIterator<Item = (K, C)>,
        options: ControlOptions<BTreeMap<String, C::Value>>,
    ) -> FormResult<Self> {
        let controls: BTreeMap<String, C> = entries
            .into_iter()
            .map(|(key, node)| (key.into(), node))
            .collect();
        let children = controls
            .iter()
            .map(|(key, node)| (key.clone(), node.raw().clone()))
            .collect();
        let raw = RawControl::keyed(children, options.into_raw())?;
        Ok(Self { raw, controls })
    }

    pub fn controls(&self) -> &BTreeMap<String, C> {
        &self.controls
    }

    pub fn control(&self, name: &str) -> Option<&C> {
        self.controls.get(name)
    }

    /// True iff the key is present with an enabled child.
    pub fn contains(&self, name: &str) -> FormResult<bool> {
        self.raw.contains(name)
    }

    /// Attaches `node` under `name`; a live occupant wins and the call is a
    /// silent no-op returning `false`.
    pub fn add_control(&mut self, name: impl Into<String>, node: C) -> FormResult<bool> {
        let name = name.into();
        if self.controls.contains_key(&name) {
            return Ok(false);
        }
        self.raw
            .add_child(&name, node.raw().clone(), UpdateOptions::default())?;
        self.controls.insert(name, node);
        Ok(true)
    }

    /// Like `add_control`, but hands back the live child under `name` —
    /// the incumbent if the key was occupied, the freshly inserted node
    /// otherwise.
    pub fn register_control(&mut self, name: impl Into<String>, node: C) -> FormResult<&C> {
        match self.controls.entry(name.into()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                self.raw
                    .add_child(entry.key(), node.raw().clone(), UpdateOptions::default())?;
                Ok(entry.insert(node))
            }
        }
    }

    /// Detaches and removes the entry; absent keys are a no-op.
    pub fn remove_control(&mut self, name: &str) -> FormResult<Option<C>> {
        if !self.controls.contains_key(name) {
            return Ok(None);
        }
        self.raw.remove_child(name, UpdateOptions::default())?;
        Ok(self.controls.remove(name))
    }

    /// Unconditional replace-or-insert, detaching any prior occupant first.
    /// Returns the displaced node.
    pub fn set_control(&mut self, name: impl Into<String>, node: C) -> FormResult<Option<C>> {
        let name = name.into();
        self.raw
            .set_child(&name, node.raw().clone(), UpdateOptions::default())?;
        Ok(self.controls.insert(name, node))
    }
}

impl<C: FormNode> FormNode for FormDict<C> {
    type Value = BTreeMap<String, C::Value>;
    type Patch = BTreeMap<String, C::Value>;

    fn raw(&self) -> &RawControl {
        &self.raw
    }
}
