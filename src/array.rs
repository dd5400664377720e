use crate::error::FormResult;
use crate::node::{ControlOptions, FormNode};
use crate::runtime::{RawControl, UpdateOptions};

/// Homogeneous ordered sequence of child nodes.
///
/// Index `i` of the typed sequence always corresponds to index `i` of the
/// runtime children; every structural operation keeps both collections and
/// the displaced children's parent links in lockstep.
pub struct FormArray<C: FormNode> {
    raw: RawControl,
    controls: Vec<C>,
}

impl<C: FormNode> FormArray<C> {
    pub fn new(controls: Vec<C>) -> FormResult<Self> {
        Self::with_options(controls, ControlOptions::default())
    }

    pub fn with_options(
        controls: Vec<C>,
        options: ControlOptions<Vec<C::Value>>,
    ) -> FormResult<Self> {
        let children = controls.iter().map(|node| node.raw().clone()).collect();
        let raw = RawControl::indexed(children, options.into_raw())?;
        Ok(Self { raw, controls })
    }

    pub fn controls(&self) -> &[C] {
        &self.controls
    }

    /// Child at `index`; out-of-range reads are `None`, never a failure.
    pub fn at(&self, index: usize) -> Option<&C> {
        self.controls.get(index)
    }

    pub fn len(&self) -> usize {
        self.controls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controls.is_empty()
    }

    pub fn push(&mut self, node: C) -> FormResult<()> {
        self.raw
            .push_child(node.raw().clone(), UpdateOptions::default())?;
        self.controls.push(node);
        Ok(())
    }

    /// Inserts at `index`, clamped to the current length.
    pub fn insert(&mut self, index: usize, node: C) -> FormResult<()> {
        let index = index.min(self.controls.len());
        self.raw
            .insert_child(index, node.raw().clone(), UpdateOptions::default())?;
        self.controls.insert(index, node);
        Ok(())
    }

    /// Detaches and removes the child at `index`; out-of-range is a no-op
    /// returning `None`.
    pub fn remove_at(&mut self, index: usize) -> FormResult<Option<C>> {
        if index >= self.controls.len() {
            return Ok(None);
        }
        self.raw.remove_child_at(index, UpdateOptions::default())?;
        Ok(Some(self.controls.remove(index)))
    }

    /// Replaces the child at `index`, detaching the displaced one; an
    /// out-of-range index appends instead and returns `None`.
    pub fn set_control(&mut self, index: usize, node: C) -> FormResult<Option<C>> {
        if index >= self.controls.len() {
            self.push(node)?;
            return Ok(None);
        }
        self.raw
            .set_child_at(index, node.raw().clone(), UpdateOptions::default())?;
        let displaced = std::mem::replace(&mut self.controls[index], node);
        Ok(Some(displaced))
    }
}

impl<C: FormNode> FormNode for FormArray<C> {
    type Value = Vec<C::Value>;
    type Patch = Vec<C::Value>;

    fn raw(&self) -> &RawControl {
        &self.raw
    }
}
