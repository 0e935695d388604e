//! Parameters: typed, named, flagged value cells with notification hooks.
//!
//! Every parameter carries a capability set ([`ParamFlags`]) instead of
//! relying on downcasting: an *input* parameter is an ordinary parameter
//! whose `INPUT` capability comes with an [`InputSlot`] binding it to
//! another node's `OUTPUT` parameter by non-owning reference. Binding is
//! pull-style — a consumer reads through the stored reference at process
//! time, taking only the producer parameter's own lock transiently.
//!
//! Value cells use a reentrant lock so the process algorithm can hold every
//! owned parameter's lock across the transform while the transform itself
//! still reads them on the same thread.

use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};

use bitflags::bitflags;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use serde::{Deserialize, Serialize};

use crate::error::{AquilaError, Result};
use crate::gpu::GpuFrame;
use crate::graph::id::SubscriptionId;

bitflags! {
    /// Parameter capability flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ParamFlags: u8 {
        const INPUT = 1;
        const OUTPUT = 1 << 1;
        const CONTROL = 1 << 2;
        const STATE = 1 << 3;
    }
}

/// Runtime type identity of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Bool,
    Int,
    Float,
    Text,
    Frame,
    FloatList,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ValueKind::Bool => "Bool",
            ValueKind::Int => "Int",
            ValueKind::Float => "Float",
            ValueKind::Text => "Text",
            ValueKind::Frame => "Frame",
            ValueKind::FloatList => "FloatList",
        };
        f.write_str(s)
    }
}

/// A parameter's value: a tagged variant whose discriminant is the runtime
/// type identity used for binding compatibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    #[default]
    Empty,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Frame(GpuFrame),
    FloatList(Vec<f64>),
}

impl ParamValue {
    /// The kind of this value; `None` for `Empty`.
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            ParamValue::Empty => None,
            ParamValue::Bool(_) => Some(ValueKind::Bool),
            ParamValue::Int(_) => Some(ValueKind::Int),
            ParamValue::Float(_) => Some(ValueKind::Float),
            ParamValue::Text(_) => Some(ValueKind::Text),
            ParamValue::Frame(_) => Some(ValueKind::Frame),
            ParamValue::FloatList(_) => Some(ValueKind::FloatList),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_frame(&self) -> Option<&GpuFrame> {
        match self {
            ParamValue::Frame(v) => Some(v),
            _ => None,
        }
    }

    pub fn into_frame(self) -> Option<GpuFrame> {
        match self {
            ParamValue::Frame(v) => Some(v),
            _ => None,
        }
    }
}

/// Compatibility predicate an input declares over candidate source kinds.
#[derive(Debug, Clone)]
pub enum InputCompat {
    /// Exact runtime-kind equality (the default).
    Exact(ValueKind),
    /// Accept any kind in the set.
    AnyOf(Vec<ValueKind>),
}

impl InputCompat {
    pub fn accepts(&self, kind: ValueKind) -> bool {
        match self {
            InputCompat::Exact(k) => *k == kind,
            InputCompat::AnyOf(ks) => ks.contains(&kind),
        }
    }

    /// The kind reported as the input's declared type.
    pub fn primary_kind(&self) -> ValueKind {
        match self {
            InputCompat::Exact(k) => *k,
            InputCompat::AnyOf(ks) => ks.first().copied().unwrap_or(ValueKind::Frame),
        }
    }
}

type UpdateFn = dyn Fn(&Parameter) + Send + Sync;

struct BoundSource {
    param: Weak<Parameter>,
    /// Unsubscribes the delete notifier from the source when this binding
    /// is replaced or detached before the source dies.
    _delete_guard: ParamSubscription,
}

/// The binding slot carried by `INPUT`-flagged parameters.
pub struct InputSlot {
    accepts: InputCompat,
    source: Mutex<Option<BoundSource>>,
}

impl InputSlot {
    fn new(accepts: InputCompat) -> Self {
        Self {
            accepts,
            source: Mutex::new(None),
        }
    }
}

/// A typed, named, flagged value cell owned by exactly one node.
pub struct Parameter {
    name: String,
    kind: ValueKind,
    flags: ParamFlags,
    tooltip: Mutex<String>,
    /// Full tree name of the owning node; re-stamped on node renames.
    tree_root: Mutex<String>,
    value: ReentrantMutex<RefCell<ParamValue>>,
    input: Option<InputSlot>,
    update_subs: Mutex<Vec<(SubscriptionId, Arc<UpdateFn>)>>,
    delete_subs: Mutex<Vec<(SubscriptionId, Box<dyn FnOnce() + Send>)>>,
}

impl Parameter {
    fn new(
        name: impl Into<String>,
        kind: ValueKind,
        flags: ParamFlags,
        initial: ParamValue,
        input: Option<InputSlot>,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            flags,
            tooltip: Mutex::new(String::new()),
            tree_root: Mutex::new(String::new()),
            value: ReentrantMutex::new(RefCell::new(initial)),
            input,
            update_subs: Mutex::new(Vec::new()),
            delete_subs: Mutex::new(Vec::new()),
        })
    }

    /// An `OUTPUT` parameter publishing values of `kind`.
    pub fn output(name: impl Into<String>, kind: ValueKind) -> Arc<Self> {
        Self::new(name, kind, ParamFlags::OUTPUT, ParamValue::Empty, None)
    }

    /// A `CONTROL` parameter; kind is inferred from the initial value.
    pub fn control(name: impl Into<String>, initial: ParamValue) -> Arc<Self> {
        debug_assert!(initial.kind().is_some(), "control parameters need a typed initial value");
        let kind = initial.kind().unwrap_or(ValueKind::Float);
        Self::new(name, kind, ParamFlags::CONTROL, initial, None)
    }

    /// A `STATE` parameter; kind is inferred from the initial value.
    pub fn state(name: impl Into<String>, initial: ParamValue) -> Arc<Self> {
        debug_assert!(initial.kind().is_some(), "state parameters need a typed initial value");
        let kind = initial.kind().unwrap_or(ValueKind::Float);
        Self::new(name, kind, ParamFlags::STATE, initial, None)
    }

    /// An `INPUT` parameter accepting sources per `accepts`.
    pub fn input(name: impl Into<String>, accepts: InputCompat) -> Arc<Self> {
        let kind = accepts.primary_kind();
        Self::new(
            name,
            kind,
            ParamFlags::INPUT,
            ParamValue::Empty,
            Some(InputSlot::new(accepts)),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn flags(&self) -> ParamFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: ParamFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn tooltip(&self) -> String {
        self.tooltip.lock().clone()
    }

    pub fn set_tooltip(&self, tooltip: impl Into<String>) {
        *self.tooltip.lock() = tooltip.into();
    }

    /// Full tree name of the owning node.
    pub fn tree_root(&self) -> String {
        self.tree_root.lock().clone()
    }

    pub(crate) fn set_tree_root(&self, root: &str) {
        *self.tree_root.lock() = root.to_string();
    }

    /// Fully qualified name: `<owning node full tree name>:<name>`.
    pub fn tree_name(&self) -> String {
        let root = self.tree_root.lock();
        if root.is_empty() {
            self.name.clone()
        } else {
            format!("{}:{}", root, self.name)
        }
    }

    /// Read the current value. For a bound input this pulls through the
    /// stored reference, locking the producer parameter transiently; an
    /// unbound input reads its own (usually `Empty`) cell.
    pub fn read(&self) -> ParamValue {
        if let Some(slot) = &self.input {
            let source = slot.source.lock().as_ref().and_then(|b| b.param.upgrade());
            if let Some(src) = source {
                return src.read();
            }
        }
        self.own_value()
    }

    /// Read this parameter's own cell, ignoring any input binding.
    pub fn own_value(&self) -> ParamValue {
        let cell = self.value.lock();
        let v = cell.borrow().clone();
        v
    }

    /// Write the value, enforcing the declared kind, and fire update
    /// notifications (outside the value lock).
    pub fn write(&self, value: ParamValue) -> Result<()> {
        if let Some(k) = value.kind() {
            if k != self.kind {
                return Err(AquilaError::KindMismatch {
                    param: self.tree_name(),
                    expected: self.kind.to_string(),
                    found: k.to_string(),
                });
            }
        }
        {
            let cell = self.value.lock();
            *cell.borrow_mut() = value;
        }
        self.notify_update();
        Ok(())
    }

    fn notify_update(&self) {
        let subs: Vec<Arc<UpdateFn>> = self
            .update_subs
            .lock()
            .iter()
            .map(|(_, f)| f.clone())
            .collect();
        for f in subs {
            f(self);
        }
    }

    /// Hold this parameter's value lock. Used by the process algorithm to
    /// lock all owned parameters, in declared order, across the transform.
    pub(crate) fn hold_lock(&self) -> ReentrantMutexGuard<'_, RefCell<ParamValue>> {
        self.value.lock()
    }

    /// Subscribe to value updates. Dropping the returned guard
    /// unsubscribes.
    pub fn on_update(
        self: &Arc<Self>,
        f: impl Fn(&Parameter) + Send + Sync + 'static,
    ) -> ParamSubscription {
        let id = SubscriptionId::next();
        self.update_subs.lock().push((id, Arc::new(f)));
        ParamSubscription {
            target: Arc::downgrade(self),
            id,
            list: SubList::Update,
        }
    }

    /// Subscribe to destruction. The callback fires exactly once, when the
    /// parameter is dropped. Dropping the guard first unsubscribes.
    pub fn on_delete(self: &Arc<Self>, f: impl FnOnce() + Send + 'static) -> ParamSubscription {
        let id = SubscriptionId::next();
        self.delete_subs.lock().push((id, Box::new(f)));
        ParamSubscription {
            target: Arc::downgrade(self),
            id,
            list: SubList::Delete,
        }
    }

    /// Whether this input accepts `source` as a binding candidate.
    pub fn accepts_input(&self, source: &Parameter) -> bool {
        match &self.input {
            Some(slot) => {
                source.has_flag(ParamFlags::OUTPUT) && slot.accepts.accepts(source.kind())
            }
            None => false,
        }
    }

    /// Bind this input to `source` (or detach with `None`).
    ///
    /// The binding stores a non-owning reference and registers a delete
    /// notifier on the source, so a destroyed source nulls the reference
    /// instead of dangling. At most one source is active at a time.
    pub fn set_input(self: &Arc<Self>, source: Option<&Arc<Parameter>>) -> Result<()> {
        let slot = self
            .input
            .as_ref()
            .ok_or_else(|| AquilaError::NotAnInput(self.tree_name()))?;

        match source {
            None => {
                *slot.source.lock() = None;
                self.notify_update();
                Ok(())
            }
            Some(src) => {
                if !self.accepts_input(src) {
                    return Err(AquilaError::IncompatibleBinding {
                        input: self.tree_name(),
                        source_name: src.tree_name(),
                        kind: src.kind().to_string(),
                    });
                }
                let weak_input = Arc::downgrade(self);
                let guard = src.on_delete(move || {
                    if let Some(input) = weak_input.upgrade() {
                        if let Some(slot) = &input.input {
                            *slot.source.lock() = None;
                        }
                        tracing::debug!(
                            input = %input.tree_name(),
                            "bound source destroyed; input detached"
                        );
                    }
                });
                *slot.source.lock() = Some(BoundSource {
                    param: Arc::downgrade(src),
                    _delete_guard: guard,
                });
                self.notify_update();
                Ok(())
            }
        }
    }

    /// The currently bound source, if this is a bound input.
    pub fn input_source(&self) -> Option<Arc<Parameter>> {
        self.input
            .as_ref()
            .and_then(|slot| slot.source.lock().as_ref().and_then(|b| b.param.upgrade()))
    }
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("flags", &self.flags)
            .field("tree_root", &*self.tree_root.lock())
            .finish()
    }
}

impl Drop for Parameter {
    fn drop(&mut self) {
        let subs: Vec<_> = self.delete_subs.lock().drain(..).collect();
        for (_, f) in subs {
            f();
        }
    }
}

enum SubList {
    Update,
    Delete,
}

/// RAII guard for a notifier subscription; dropping it unsubscribes.
pub struct ParamSubscription {
    target: Weak<Parameter>,
    id: SubscriptionId,
    list: SubList,
}

impl Drop for ParamSubscription {
    fn drop(&mut self) {
        if let Some(param) = self.target.upgrade() {
            match self.list {
                SubList::Update => param.update_subs.lock().retain(|(id, _)| *id != self.id),
                SubList::Delete => param.delete_subs.lock().retain(|(id, _)| *id != self.id),
            }
        }
    }
}

/// A node's ordered, owned parameter list.
///
/// Declaration order is load-bearing: the process algorithm acquires the
/// parameter locks in exactly this order on every node, which is what keeps
/// lock acquisition deadlock-free graph-wide.
#[derive(Default, Clone)]
pub struct ParamSet {
    params: Vec<Arc<Parameter>>,
}

impl ParamSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a parameter, or return the existing one under the same
    /// name. Idempotent so transform `init` can run again on reset without
    /// clobbering values or bindings.
    pub fn declare(&mut self, param: Arc<Parameter>) -> Arc<Parameter> {
        if let Some(existing) = self.params.iter().find(|p| p.name() == param.name()) {
            return existing.clone();
        }
        self.params.push(param.clone());
        param
    }

    /// Throwing accessor: the parameter must exist.
    pub fn get(&self, name: &str) -> Result<Arc<Parameter>> {
        self.params
            .iter()
            .find(|p| p.name() == name)
            .cloned()
            .ok_or_else(|| AquilaError::ParamNotFound(name.to_string()))
    }

    /// Optional accessor: absence is legitimate and logged at debug only.
    pub fn get_opt(&self, name: &str) -> Option<Arc<Parameter>> {
        let found = self.params.iter().find(|p| p.name() == name).cloned();
        if found.is_none() {
            tracing::debug!(param = name, "parameter not found");
        }
        found
    }

    pub fn get_at(&self, index: usize) -> Result<Arc<Parameter>> {
        self.params
            .get(index)
            .cloned()
            .ok_or(AquilaError::ParamIndexOutOfBounds {
                index,
                len: self.params.len(),
            })
    }

    pub fn get_at_opt(&self, index: usize) -> Option<Arc<Parameter>> {
        let found = self.params.get(index).cloned();
        if found.is_none() {
            tracing::debug!(index, len = self.params.len(), "parameter index out of bounds");
        }
        found
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Parameter>> {
        self.params.iter()
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.params.iter().map(|p| p.name().to_string()).collect()
    }

    /// Convenience typed reads (pull through bindings where present).
    pub fn read_float(&self, name: &str) -> Option<f64> {
        self.get_opt(name).and_then(|p| p.read().as_float())
    }

    pub fn read_int(&self, name: &str) -> Option<i64> {
        self.get_opt(name).and_then(|p| p.read().as_int())
    }

    pub fn read_bool(&self, name: &str) -> Option<bool> {
        self.get_opt(name).and_then(|p| p.read().as_bool())
    }

    pub fn read_text(&self, name: &str) -> Option<String> {
        self.get_opt(name)
            .and_then(|p| p.read().as_text().map(|s| s.to_string()))
    }

    pub fn read_frame(&self, name: &str) -> Option<GpuFrame> {
        self.get_opt(name).and_then(|p| p.read().into_frame())
    }

    /// Swap support: adopt `old`'s parameter objects wholesale (their
    /// bindings, values, and subscriptions survive the swap), keeping any
    /// parameters only the replacement declares.
    pub(crate) fn merge_preserving(&mut self, old: &ParamSet) {
        let mut merged: Vec<Arc<Parameter>> = old.params.clone();
        for p in &self.params {
            if !merged.iter().any(|m| m.name() == p.name()) {
                merged.push(p.clone());
            }
        }
        self.params = merged;
    }
}

impl fmt::Debug for ParamSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.params.iter()).finish()
    }
}
