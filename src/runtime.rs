use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use futures::future::{BoxFuture, join_all};
use serde_json::{Map, Value};

use crate::error::{FormError, FormResult, ValidationErrors, merge_validation_errors};
use crate::node::{ControlPath, PathSeg};

static SUBSCRIPTION_ALLOCATOR: AtomicU64 = AtomicU64::new(1);

/// Handle returned by `subscribe_value` / `subscribe_status`; pass it back to
/// `unsubscribe` to stop receiving notifications.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Subscription(pub u64);

impl Subscription {
    fn next() -> Self {
        Self(SUBSCRIPTION_ALLOCATOR.fetch_add(1, Ordering::SeqCst))
    }
}

/// The four mutually exclusive control states.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ControlStatus {
    Valid,
    Invalid,
    Pending,
    Disabled,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum UpdateOn {
    #[default]
    Change,
    Blur,
    Submit,
}

/// Propagation options shared by every mutating operation.
///
/// `only_self` confines the effect to this control instead of walking the
/// parent chain; `emit_event` gates subscriber notification.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct UpdateOptions {
    pub only_self: bool,
    pub emit_event: bool,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            only_self: false,
            emit_event: true,
        }
    }
}

impl UpdateOptions {
    pub const fn silent() -> Self {
        Self {
            only_self: false,
            emit_event: false,
        }
    }

    pub const fn local() -> Self {
        Self {
            only_self: true,
            emit_event: true,
        }
    }
}

pub type RawValidatorFn = Arc<dyn Fn(&RawControl) -> Option<ValidationErrors> + Send + Sync>;
pub type RawAsyncValidatorFn =
    Arc<dyn Fn(&RawControl) -> BoxFuture<'static, Option<ValidationErrors>> + Send + Sync>;

type ValueCallback = Arc<dyn Fn(&Value) + Send + Sync>;
type StatusCallback = Arc<dyn Fn(ControlStatus) + Send + Sync>;
type DisabledCallback = Arc<dyn Fn(bool) + Send + Sync>;

/// Construction bundle for a raw control.
#[derive(Default)]
pub struct RawOptions {
    pub validators: Vec<RawValidatorFn>,
    pub async_validators: Vec<RawAsyncValidatorFn>,
    pub update_on: UpdateOn,
}

enum Kind {
    Leaf,
    Keyed(Vec<(String, RawControl)>),
    Indexed(Vec<RawControl>),
}

struct Inner {
    kind: Kind,
    value: Value,
    status: ControlStatus,
    errors: Option<ValidationErrors>,
    dirty: bool,
    touched: bool,
    disabled: bool,
    pending_marker: bool,
    parent: Option<Weak<RwLock<Inner>>>,
    validators: Vec<RawValidatorFn>,
    async_validators: Vec<RawAsyncValidatorFn>,
    update_on: UpdateOn,
    ticket: u64,
    value_subs: Vec<(Subscription, ValueCallback)>,
    status_subs: Vec<(Subscription, StatusCallback)>,
    on_change: Vec<ValueCallback>,
    on_disabled: Vec<DisabledCallback>,
}

/// Untyped reactive control: one node of the runtime tree.
///
/// Cheaply cloneable; clones share the same underlying state. The typed
/// wrappers forward to this handle 1:1 and expose it unmodified through
/// `raw()` for direct interoperation.
#[derive(Clone)]
pub struct RawControl {
    inner: Arc<RwLock<Inner>>,
}

pub(crate) fn read_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockReadGuard<'a, T>> {
    lock.read().map_err(|_| FormError::StatePoisoned(context))
}

pub(crate) fn write_lock<'a, T>(
    lock: &'a RwLock<T>,
    context: &'static str,
) -> FormResult<RwLockWriteGuard<'a, T>> {
    lock.write().map_err(|_| FormError::StatePoisoned(context))
}

impl RawControl {
    fn read(&self, context: &'static str) -> FormResult<RwLockReadGuard<'_, Inner>> {
        read_lock(&self.inner, context)
    }

    fn write(&self, context: &'static str) -> FormResult<RwLockWriteGuard<'_, Inner>> {
        write_lock(&self.inner, context)
    }

    fn with_kind(kind: Kind, value: Value, options: RawOptions) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                kind,
                value,
                status: ControlStatus::Valid,
                errors: None,
                dirty: false,
                touched: false,
                disabled: false,
                pending_marker: false,
                parent: None,
                validators: options.validators,
                async_validators: options.async_validators,
                update_on: options.update_on,
                ticket: 0,
                value_subs: Vec::new(),
                status_subs: Vec::new(),
                on_change: Vec::new(),
                on_disabled: Vec::new(),
            })),
        }
    }

    /// Creates a leaf control holding a single value (`Value::Null` when
    /// unset). Runs one validity pass without notifying anyone.
    pub fn leaf(initial: Value, options: RawOptions) -> FormResult<Self> {
        let control = Self::with_kind(Kind::Leaf, initial, options);
        control.update_value_and_validity(UpdateOptions::silent())?;
        Ok(control)
    }

    /// Creates a keyed container (group or dictionary). Children keep their
    /// given insertion order for enumeration stability.
    pub fn keyed(children: Vec<(String, RawControl)>, options: RawOptions) -> FormResult<Self> {
        let control = Self::with_kind(Kind::Keyed(children.clone()), Value::Null, options);
        for (_, child) in &children {
            child.set_parent(&control)?;
        }
        control.update_value_and_validity(UpdateOptions::silent())?;
        Ok(control)
    }

    /// Creates an indexed container (array).
    pub fn indexed(children: Vec<RawControl>, options: RawOptions) -> FormResult<Self> {
        let control = Self::with_kind(Kind::Indexed(children.clone()), Value::Null, options);
        for child in &children {
            child.set_parent(&control)?;
        }
        control.update_value_and_validity(UpdateOptions::silent())?;
        Ok(control)
    }

    /// True when both handles point at the same control.
    pub fn ptr_eq(&self, other: &RawControl) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn set_parent(&self, parent: &RawControl) -> FormResult<()> {
        self.write("attaching control to parent")?.parent = Some(Arc::downgrade(&parent.inner));
        Ok(())
    }

    pub fn clear_parent(&self) -> FormResult<()> {
        self.write("detaching control from parent")?.parent = None;
        Ok(())
    }

    pub fn parent(&self) -> FormResult<Option<RawControl>> {
        Ok(self
            .read("reading parent link")?
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| RawControl { inner }))
    }

    /// Walks parent links to the top of the tree.
    pub fn root(&self) -> FormResult<RawControl> {
        let mut current = self.clone();
        while let Some(parent) = current.parent()? {
            current = parent;
        }
        Ok(current)
    }

    /// Current aggregate value. For containers this omits disabled children
    /// unless the container itself is disabled; see `raw_value` for the
    /// complete shape.
    pub fn value(&self) -> FormResult<Value> {
        Ok(self.read("reading control value")?.value.clone())
    }

    /// Value including every disabled descendant.
    pub fn raw_value(&self) -> FormResult<Value> {
        enum Shape {
            Leaf(Value),
            Keyed(Vec<(String, RawControl)>),
            Indexed(Vec<RawControl>),
        }
        let shape = {
            let guard = self.read("reading raw control value")?;
            match &guard.kind {
                Kind::Leaf => Shape::Leaf(guard.value.clone()),
                Kind::Keyed(children) => Shape::Keyed(children.clone()),
                Kind::Indexed(children) => Shape::Indexed(children.clone()),
            }
        };
        match shape {
            Shape::Leaf(value) => Ok(value),
            Shape::Keyed(children) => {
                let mut map = Map::new();
                for (key, child) in children {
                    map.insert(key, child.raw_value()?);
                }
                Ok(Value::Object(map))
            }
            Shape::Indexed(children) => {
                let mut values = Vec::with_capacity(children.len());
                for child in children {
                    values.push(child.raw_value()?);
                }
                Ok(Value::Array(values))
            }
        }
    }

    pub fn status(&self) -> FormResult<ControlStatus> {
        Ok(self.read("reading control status")?.status)
    }

    pub fn errors(&self) -> FormResult<Option<ValidationErrors>> {
        Ok(self.read("reading control errors")?.errors.clone())
    }

    pub fn get_error(&self, code: &str) -> FormResult<Option<Value>> {
        Ok(self
            .read("reading control error by code")?
            .errors
            .as_ref()
            .and_then(|errors| errors.get(code).cloned()))
    }

    pub fn has_error(&self, code: &str) -> FormResult<bool> {
        Ok(self.get_error(code)?.is_some())
    }

    pub fn dirty(&self) -> FormResult<bool> {
        Ok(self.read("reading dirty flag")?.dirty)
    }

    pub fn touched(&self) -> FormResult<bool> {
        Ok(self.read("reading touched flag")?.touched)
    }

    pub fn is_disabled(&self) -> FormResult<bool> {
        Ok(self.read("reading disabled flag")?.disabled)
    }

    pub fn is_enabled(&self) -> FormResult<bool> {
        Ok(!self.is_disabled()?)
    }

    pub fn update_on(&self) -> FormResult<UpdateOn> {
        Ok(self.read("reading update-on marker")?.update_on)
    }

    /// Overwrites the error mapping directly (no validator run) and refreshes
    /// status up the chain.
    pub fn set_errors(
        &self,
        errors: Option<ValidationErrors>,
        options: UpdateOptions,
    ) -> FormResult<()> {
        self.write("overwriting control errors")?.errors = errors;
        self.refresh_status(options)
    }

    pub fn set_validators(&self, validators: Vec<RawValidatorFn>) -> FormResult<()> {
        self.write("replacing validators")?.validators = validators;
        Ok(())
    }

    pub fn clear_validators(&self) -> FormResult<()> {
        self.write("clearing validators")?.validators.clear();
        Ok(())
    }

    pub fn set_async_validators(&self, validators: Vec<RawAsyncValidatorFn>) -> FormResult<()> {
        self.write("replacing async validators")?.async_validators = validators;
        Ok(())
    }

    pub fn clear_async_validators(&self) -> FormResult<()> {
        self.write("clearing async validators")?
            .async_validators
            .clear();
        Ok(())
    }

    pub fn subscribe_value(
        &self,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> FormResult<Subscription> {
        let subscription = Subscription::next();
        self.write("registering value subscriber")?
            .value_subs
            .push((subscription, Arc::new(callback)));
        Ok(subscription)
    }

    pub fn subscribe_status(
        &self,
        callback: impl Fn(ControlStatus) + Send + Sync + 'static,
    ) -> FormResult<Subscription> {
        let subscription = Subscription::next();
        self.write("registering status subscriber")?
            .status_subs
            .push((subscription, Arc::new(callback)));
        Ok(subscription)
    }

    pub fn unsubscribe(&self, subscription: Subscription) -> FormResult<()> {
        let mut guard = self.write("removing subscriber")?;
        guard.value_subs.retain(|(id, _)| *id != subscription);
        guard.status_subs.retain(|(id, _)| *id != subscription);
        Ok(())
    }

    /// Host two-way-binding hook: fires on every committed leaf write.
    pub fn register_on_change(
        &self,
        callback: impl Fn(&Value) + Send + Sync + 'static,
    ) -> FormResult<()> {
        self.write("registering change hook")?
            .on_change
            .push(Arc::new(callback));
        Ok(())
    }

    /// Host two-way-binding hook: fires when the control is enabled or
    /// disabled.
    pub fn register_on_disabled_change(
        &self,
        callback: impl Fn(bool) + Send + Sync + 'static,
    ) -> FormResult<()> {
        self.write("registering disabled hook")?
            .on_disabled
            .push(Arc::new(callback));
        Ok(())
    }

    fn child_handles(&self, context: &'static str) -> FormResult<Vec<RawControl>> {
        let guard = self.read(context)?;
        Ok(match &guard.kind {
            Kind::Leaf => Vec::new(),
            Kind::Keyed(children) => children.iter().map(|(_, child)| child.clone()).collect(),
            Kind::Indexed(children) => children.clone(),
        })
    }

    fn aggregate_value(&self) -> FormResult<Value> {
        enum Shape {
            Leaf(Value),
            Keyed(Vec<(String, RawControl)>),
            Indexed(Vec<RawControl>),
        }
        let (shape, disabled) = {
            let guard = self.read("aggregating control value")?;
            let shape = match &guard.kind {
                Kind::Leaf => Shape::Leaf(guard.value.clone()),
                Kind::Keyed(children) => Shape::Keyed(children.clone()),
                Kind::Indexed(children) => Shape::Indexed(children.clone()),
            };
            (shape, guard.disabled)
        };
        match shape {
            Shape::Leaf(value) => Ok(value),
            Shape::Keyed(children) => {
                let mut map = Map::new();
                for (key, child) in children {
                    if disabled || child.is_enabled()? {
                        map.insert(key, child.value()?);
                    }
                }
                Ok(Value::Object(map))
            }
            Shape::Indexed(children) => {
                let mut values = Vec::new();
                for child in children {
                    if disabled || child.is_enabled()? {
                        values.push(child.value()?);
                    }
                }
                Ok(Value::Array(values))
            }
        }
    }

    fn compute_status(&self) -> FormResult<ControlStatus> {
        let children = {
            let guard = self.read("computing control status")?;
            if guard.disabled {
                return Ok(ControlStatus::Disabled);
            }
            if guard.errors.is_some() {
                return Ok(ControlStatus::Invalid);
            }
            if guard.pending_marker {
                return Ok(ControlStatus::Pending);
            }
            match &guard.kind {
                Kind::Leaf => Vec::new(),
                Kind::Keyed(children) => children.iter().map(|(_, child)| child.clone()).collect(),
                Kind::Indexed(children) => children.clone(),
            }
        };
        let mut pending = false;
        for child in children {
            match child.status()? {
                ControlStatus::Invalid => return Ok(ControlStatus::Invalid),
                ControlStatus::Pending => pending = true,
                ControlStatus::Valid | ControlStatus::Disabled => {}
            }
        }
        Ok(if pending {
            ControlStatus::Pending
        } else {
            ControlStatus::Valid
        })
    }

    /// Recomputes the aggregate value, runs sync validators, refreshes
    /// status, notifies subscribers and walks the parent chain — the single
    /// commit point every mutation funnels through.
    pub fn update_value_and_validity(&self, options: UpdateOptions) -> FormResult<()> {
        let aggregate = self.aggregate_value()?;
        let validators = {
            let mut guard = self.write("recomputing control value")?;
            guard.value = aggregate;
            guard.ticket = guard.ticket.wrapping_add(1);
            guard.pending_marker = false;
            guard.validators.clone()
        };
        let errors = if self.is_disabled()? {
            None
        } else {
            merge_validation_errors(validators.iter().map(|validate| validate(self)))
        };
        self.write("storing validation result")?.errors = errors;
        let status = self.compute_status()?;
        let (value, value_subs, status_subs) = {
            let mut guard = self.write("publishing validity update")?;
            guard.status = status;
            (
                guard.value.clone(),
                guard.value_subs.clone(),
                guard.status_subs.clone(),
            )
        };
        if options.emit_event {
            for (_, callback) in &value_subs {
                callback(&value);
            }
            for (_, callback) in &status_subs {
                callback(status);
            }
        }
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.update_value_and_validity(options)?;
        }
        Ok(())
    }

    /// Recomputes and publishes status only, without re-running validators.
    pub(crate) fn refresh_status(&self, options: UpdateOptions) -> FormResult<()> {
        let status = self.compute_status()?;
        let status_subs = {
            let mut guard = self.write("publishing status refresh")?;
            guard.status = status;
            guard.status_subs.clone()
        };
        if options.emit_event {
            for (_, callback) in &status_subs {
                callback(status);
            }
        }
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.refresh_status(options)?;
        }
        Ok(())
    }

    pub fn set_value(&self, value: Value, options: UpdateOptions) -> FormResult<()> {
        enum Shape {
            Leaf,
            Keyed(Vec<(String, RawControl)>),
            Indexed(Vec<RawControl>),
        }
        let shape = {
            let guard = self.read("inspecting control for write")?;
            match &guard.kind {
                Kind::Leaf => Shape::Leaf,
                Kind::Keyed(children) => Shape::Keyed(children.clone()),
                Kind::Indexed(children) => Shape::Indexed(children.clone()),
            }
        };
        match shape {
            Shape::Leaf => {
                let callbacks = {
                    let mut guard = self.write("writing leaf value")?;
                    guard.value = value.clone();
                    guard.on_change.clone()
                };
                for callback in &callbacks {
                    callback(&value);
                }
            }
            Shape::Keyed(children) => {
                let Value::Object(mut entries) = value else {
                    return Err(FormError::KindMismatch("set_value with a non-object value"));
                };
                for (key, _) in &children {
                    if !entries.contains_key(key) {
                        return Err(FormError::MissingKey(key.clone()));
                    }
                }
                if let Some((key, _)) = entries
                    .iter()
                    .find(|(key, _)| !children.iter().any(|(name, _)| name == *key))
                {
                    return Err(FormError::UnknownKey(key.clone()));
                }
                for (key, child) in &children {
                    let entry = entries.remove(key).unwrap_or(Value::Null);
                    child.set_value(
                        entry,
                        UpdateOptions {
                            only_self: true,
                            emit_event: options.emit_event,
                        },
                    )?;
                }
            }
            Shape::Indexed(children) => {
                let Value::Array(entries) = value else {
                    return Err(FormError::KindMismatch("set_value with a non-array value"));
                };
                if entries.len() != children.len() {
                    return Err(FormError::LengthMismatch {
                        expected: children.len(),
                        actual: entries.len(),
                    });
                }
                for (child, entry) in children.iter().zip(entries) {
                    child.set_value(
                        entry,
                        UpdateOptions {
                            only_self: true,
                            emit_event: options.emit_event,
                        },
                    )?;
                }
            }
        }
        self.update_value_and_validity(options)
    }

    /// Partial write: containers update only the entries present, silently
    /// ignoring unknown keys and out-of-range indices. Identical to
    /// `set_value` for a leaf.
    pub fn patch_value(&self, value: Value, options: UpdateOptions) -> FormResult<()> {
        enum Shape {
            Leaf,
            Keyed(Vec<(String, RawControl)>),
            Indexed(Vec<RawControl>),
        }
        let shape = {
            let guard = self.read("inspecting control for patch")?;
            match &guard.kind {
                Kind::Leaf => Shape::Leaf,
                Kind::Keyed(children) => Shape::Keyed(children.clone()),
                Kind::Indexed(children) => Shape::Indexed(children.clone()),
            }
        };
        match shape {
            Shape::Leaf => return self.set_value(value, options),
            Shape::Keyed(children) => {
                let Value::Object(entries) = value else {
                    return Err(FormError::KindMismatch("patch_value with a non-object value"));
                };
                for (key, entry) in entries {
                    if let Some((_, child)) = children.iter().find(|(name, _)| *name == key) {
                        child.patch_value(
                            entry,
                            UpdateOptions {
                                only_self: true,
                                emit_event: options.emit_event,
                            },
                        )?;
                    }
                }
            }
            Shape::Indexed(children) => {
                let Value::Array(entries) = value else {
                    return Err(FormError::KindMismatch("patch_value with a non-array value"));
                };
                for (child, entry) in children.iter().zip(entries) {
                    child.patch_value(
                        entry,
                        UpdateOptions {
                            only_self: true,
                            emit_event: options.emit_event,
                        },
                    )?;
                }
            }
        }
        self.update_value_and_validity(options)
    }

    /// Restores the control to the given state (`None` means null for a leaf
    /// and "reset every child with no state" for containers) and clears the
    /// dirty/touched flags throughout.
    pub fn reset(&self, state: Option<Value>, options: UpdateOptions) -> FormResult<()> {
        enum Shape {
            Leaf,
            Keyed(Vec<(String, RawControl)>),
            Indexed(Vec<RawControl>),
        }
        let shape = {
            let guard = self.read("inspecting control for reset")?;
            match &guard.kind {
                Kind::Leaf => Shape::Leaf,
                Kind::Keyed(children) => Shape::Keyed(children.clone()),
                Kind::Indexed(children) => Shape::Indexed(children.clone()),
            }
        };
        match shape {
            Shape::Leaf => {
                let next = state.unwrap_or(Value::Null);
                let callbacks = {
                    let mut guard = self.write("resetting leaf value")?;
                    guard.value = next.clone();
                    guard.dirty = false;
                    guard.touched = false;
                    guard.on_change.clone()
                };
                for callback in &callbacks {
                    callback(&next);
                }
            }
            Shape::Keyed(children) => {
                let states = match state {
                    None => Map::new(),
                    Some(Value::Object(map)) => map,
                    Some(_) => return Err(FormError::KindMismatch("reset with a non-object state")),
                };
                for (key, child) in &children {
                    child.reset(
                        states.get(key).cloned(),
                        UpdateOptions {
                            only_self: true,
                            emit_event: options.emit_event,
                        },
                    )?;
                }
                let mut guard = self.write("clearing container flags on reset")?;
                guard.dirty = false;
                guard.touched = false;
            }
            Shape::Indexed(children) => {
                let states = match state {
                    None => Vec::new(),
                    Some(Value::Array(values)) => values,
                    Some(_) => return Err(FormError::KindMismatch("reset with a non-array state")),
                };
                for (index, child) in children.iter().enumerate() {
                    child.reset(
                        states.get(index).cloned(),
                        UpdateOptions {
                            only_self: true,
                            emit_event: options.emit_event,
                        },
                    )?;
                }
                let mut guard = self.write("clearing container flags on reset")?;
                guard.dirty = false;
                guard.touched = false;
            }
        }
        self.update_value_and_validity(options)?;
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.refresh_pristine(options)?;
            parent.refresh_touched(options)?;
        }
        Ok(())
    }

    pub fn mark_touched(&self, options: UpdateOptions) -> FormResult<()> {
        self.write("marking control touched")?.touched = true;
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.mark_touched(options)?;
        }
        Ok(())
    }

    /// Clears touched on this control and every descendant, then lets the
    /// ancestors recompute theirs from what remains.
    pub fn mark_untouched(&self, options: UpdateOptions) -> FormResult<()> {
        self.write("marking control untouched")?.touched = false;
        for child in self.child_handles("collecting children for untouched")? {
            child.mark_untouched(UpdateOptions {
                only_self: true,
                emit_event: options.emit_event,
            })?;
        }
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.refresh_touched(options)?;
        }
        Ok(())
    }

    pub fn mark_dirty(&self, options: UpdateOptions) -> FormResult<()> {
        self.write("marking control dirty")?.dirty = true;
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.mark_dirty(options)?;
        }
        Ok(())
    }

    pub fn mark_pristine(&self, options: UpdateOptions) -> FormResult<()> {
        self.write("marking control pristine")?.dirty = false;
        for child in self.child_handles("collecting children for pristine")? {
            child.mark_pristine(UpdateOptions {
                only_self: true,
                emit_event: options.emit_event,
            })?;
        }
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.refresh_pristine(options)?;
        }
        Ok(())
    }

    pub fn mark_pending(&self, options: UpdateOptions) -> FormResult<()> {
        self.write("marking control pending")?.pending_marker = true;
        self.refresh_status(options)
    }

    fn any_child_flag(
        &self,
        context: &'static str,
        flag: impl Fn(&RawControl) -> FormResult<bool>,
    ) -> FormResult<bool> {
        for child in self.child_handles(context)? {
            if flag(&child)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub(crate) fn refresh_pristine(&self, options: UpdateOptions) -> FormResult<()> {
        let dirty = self.any_child_flag("recomputing pristine state", RawControl::dirty)?;
        self.write("storing recomputed pristine state")?.dirty = dirty;
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.refresh_pristine(options)?;
        }
        Ok(())
    }

    pub(crate) fn refresh_touched(&self, options: UpdateOptions) -> FormResult<()> {
        let touched = self.any_child_flag("recomputing touched state", RawControl::touched)?;
        self.write("storing recomputed touched state")?.touched = touched;
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.refresh_touched(options)?;
        }
        Ok(())
    }

    pub fn disable(&self, options: UpdateOptions) -> FormResult<()> {
        let (value, callbacks, value_subs, status_subs) = {
            let mut guard = self.write("disabling control")?;
            guard.disabled = true;
            guard.errors = None;
            guard.status = ControlStatus::Disabled;
            (
                guard.value.clone(),
                guard.on_disabled.clone(),
                guard.value_subs.clone(),
                guard.status_subs.clone(),
            )
        };
        for callback in &callbacks {
            callback(true);
        }
        if options.emit_event {
            for (_, callback) in &value_subs {
                callback(&value);
            }
            for (_, callback) in &status_subs {
                callback(ControlStatus::Disabled);
            }
        }
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.update_value_and_validity(options)?;
        }
        Ok(())
    }

    pub fn enable(&self, options: UpdateOptions) -> FormResult<()> {
        let callbacks = {
            let mut guard = self.write("enabling control")?;
            guard.disabled = false;
            guard.on_disabled.clone()
        };
        for callback in &callbacks {
            callback(false);
        }
        self.update_value_and_validity(UpdateOptions {
            only_self: true,
            emit_event: options.emit_event,
        })?;
        if !options.only_self
            && let Some(parent) = self.parent()?
        {
            parent.update_value_and_validity(options)?;
        }
        Ok(())
    }

    /// Runs the async validators to completion and applies the merged result,
    /// unless a newer validation pass started in the meantime — a superseded
    /// run's result is discarded, never interrupted.
    ///
    /// Sync-invalid controls skip the async pass entirely.
    pub async fn validate_async(&self, options: UpdateOptions) -> FormResult<ControlStatus> {
        let (ticket, validators) = {
            let mut guard = self.write("starting async validation")?;
            if guard.async_validators.is_empty() || guard.errors.is_some() || guard.disabled {
                return Ok(guard.status);
            }
            guard.ticket = guard.ticket.wrapping_add(1);
            guard.pending_marker = true;
            (guard.ticket, guard.async_validators.clone())
        };
        self.refresh_status(UpdateOptions {
            only_self: true,
            emit_event: options.emit_event,
        })?;
        let pending = validators
            .iter()
            .map(|validate| validate(self))
            .collect::<Vec<_>>();
        let results = join_all(pending).await;
        let merged = merge_validation_errors(results);
        {
            let mut guard = self.write("finishing async validation")?;
            if guard.ticket != ticket {
                return Ok(guard.status);
            }
            guard.pending_marker = false;
            guard.errors = merged;
        }
        self.refresh_status(options)?;
        self.status()
    }

    /// Resolves a path through nested containers, yielding `None` at the
    /// first unresolved segment or for an empty path.
    pub fn find(&self, path: impl Into<ControlPath>) -> FormResult<Option<RawControl>> {
        let path = path.into();
        if path.is_empty() {
            return Ok(None);
        }
        let mut current = self.clone();
        for segment in path.segments() {
            let next = {
                let guard = current.read("resolving path segment")?;
                match (&guard.kind, segment) {
                    (Kind::Keyed(children), PathSeg::Key(key)) => children
                        .iter()
                        .find(|(name, _)| name == key)
                        .map(|(_, child)| child.clone()),
                    (Kind::Keyed(children), PathSeg::Index(index)) => {
                        let key = index.to_string();
                        children
                            .iter()
                            .find(|(name, _)| *name == key)
                            .map(|(_, child)| child.clone())
                    }
                    (Kind::Indexed(children), PathSeg::Index(index)) => {
                        children.get(*index).cloned()
                    }
                    (Kind::Indexed(children), PathSeg::Key(key)) => key
                        .parse::<usize>()
                        .ok()
                        .and_then(|index| children.get(index).cloned()),
                    (Kind::Leaf, _) => None,
                }
            };
            match next {
                Some(control) => current = control,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    // Keyed-container structural operations.

    pub fn child(&self, key: &str) -> FormResult<Option<RawControl>> {
        let guard = self.read("reading keyed child")?;
        match &guard.kind {
            Kind::Keyed(children) => Ok(children
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, child)| child.clone())),
            _ => Err(FormError::KindMismatch("child lookup by key")),
        }
    }

    pub fn child_keys(&self) -> FormResult<Vec<String>> {
        let guard = self.read("listing child keys")?;
        match &guard.kind {
            Kind::Keyed(children) => Ok(children.iter().map(|(name, _)| name.clone()).collect()),
            _ => Err(FormError::KindMismatch("child key listing")),
        }
    }

    /// True iff the key is present and its child enabled.
    pub fn contains(&self, key: &str) -> FormResult<bool> {
        match self.child(key)? {
            Some(child) => child.is_enabled(),
            None => Ok(false),
        }
    }

    /// Registers a child under `key`; a live occupant wins and the call is a
    /// no-op returning `false`.
    pub fn add_child(
        &self,
        key: &str,
        child: RawControl,
        options: UpdateOptions,
    ) -> FormResult<bool> {
        {
            let mut guard = self.write("adding keyed child")?;
            let Kind::Keyed(children) = &mut guard.kind else {
                return Err(FormError::KindMismatch("add_child"));
            };
            if children.iter().any(|(name, _)| name == key) {
                return Ok(false);
            }
            children.push((key.to_string(), child.clone()));
        }
        child.set_parent(self)?;
        self.update_value_and_validity(options)?;
        Ok(true)
    }

    /// Detaches and removes the child under `key`; absent keys are a no-op.
    pub fn remove_child(
        &self,
        key: &str,
        options: UpdateOptions,
    ) -> FormResult<Option<RawControl>> {
        let removed = {
            let mut guard = self.write("removing keyed child")?;
            let Kind::Keyed(children) = &mut guard.kind else {
                return Err(FormError::KindMismatch("remove_child"));
            };
            match children.iter().position(|(name, _)| name == key) {
                Some(index) => Some(children.remove(index).1),
                None => None,
            }
        };
        let Some(removed) = removed else {
            return Ok(None);
        };
        removed.clear_parent()?;
        self.update_value_and_validity(options)?;
        Ok(Some(removed))
    }

    /// Replace-or-insert under `key`, detaching any prior occupant first.
    pub fn set_child(
        &self,
        key: &str,
        child: RawControl,
        options: UpdateOptions,
    ) -> FormResult<Option<RawControl>> {
        let displaced = {
            let mut guard = self.write("replacing keyed child")?;
            let Kind::Keyed(children) = &mut guard.kind else {
                return Err(FormError::KindMismatch("set_child"));
            };
            match children.iter_mut().find(|(name, _)| name == key) {
                Some(slot) => Some(std::mem::replace(&mut slot.1, child.clone())),
                None => {
                    children.push((key.to_string(), child.clone()));
                    None
                }
            }
        };
        if let Some(old) = &displaced {
            old.clear_parent()?;
        }
        child.set_parent(self)?;
        self.update_value_and_validity(options)?;
        Ok(displaced)
    }

    // Indexed-container structural operations.

    pub fn len(&self) -> FormResult<usize> {
        let guard = self.read("reading child count")?;
        match &guard.kind {
            Kind::Indexed(children) => Ok(children.len()),
            _ => Err(FormError::KindMismatch("len")),
        }
    }

    pub fn is_empty(&self) -> FormResult<bool> {
        Ok(self.len()? == 0)
    }

    pub fn child_at(&self, index: usize) -> FormResult<Option<RawControl>> {
        let guard = self.read("reading indexed child")?;
        match &guard.kind {
            Kind::Indexed(children) => Ok(children.get(index).cloned()),
            _ => Err(FormError::KindMismatch("child lookup by index")),
        }
    }

    pub fn push_child(&self, child: RawControl, options: UpdateOptions) -> FormResult<()> {
        {
            let mut guard = self.write("appending indexed child")?;
            let Kind::Indexed(children) = &mut guard.kind else {
                return Err(FormError::KindMismatch("push_child"));
            };
            children.push(child.clone());
        }
        child.set_parent(self)?;
        self.update_value_and_validity(options)
    }

    /// Inserts at `index`, clamped to the current length.
    pub fn insert_child(
        &self,
        index: usize,
        child: RawControl,
        options: UpdateOptions,
    ) -> FormResult<()> {
        {
            let mut guard = self.write("inserting indexed child")?;
            let Kind::Indexed(children) = &mut guard.kind else {
                return Err(FormError::KindMismatch("insert_child"));
            };
            let index = index.min(children.len());
            children.insert(index, child.clone());
        }
        child.set_parent(self)?;
        self.update_value_and_validity(options)
    }

    /// Detaches and removes the child at `index`; out-of-range is a no-op.
    pub fn remove_child_at(
        &self,
        index: usize,
        options: UpdateOptions,
    ) -> FormResult<Option<RawControl>> {
        let removed = {
            let mut guard = self.write("removing indexed child")?;
            let Kind::Indexed(children) = &mut guard.kind else {
                return Err(FormError::KindMismatch("remove_child_at"));
            };
            if index < children.len() {
                Some(children.remove(index))
            } else {
                None
            }
        };
        let Some(removed) = removed else {
            return Ok(None);
        };
        removed.clear_parent()?;
        self.update_value_and_validity(options)?;
        Ok(Some(removed))
    }

    /// Replaces the child at `index`, detaching the displaced one; an
    /// out-of-range index appends instead.
    pub fn set_child_at(
        &self,
        index: usize,
        child: RawControl,
        options: UpdateOptions,
    ) -> FormResult<Option<RawControl>> {
        let displaced = {
            let mut guard = self.write("replacing indexed child")?;
            let Kind::Indexed(children) = &mut guard.kind else {
                return Err(FormError::KindMismatch("set_child_at"));
            };
            match children.get_mut(index) {
                Some(slot) => Some(std::mem::replace(slot, child.clone())),
                None => {
                    children.push(child.clone());
                    None
                }
            }
        };
        if let Some(old) = &displaced {
            old.clear_parent()?;
        }
        child.set_parent(self)?;
        self.update_value_and_validity(options)?;
        Ok(displaced)
    }
}
