#![forbid(unsafe_code)]

//! Dynamic component instances.
//!
//! Instances are bags of named [`Value`] fields plus the channel machinery
//! the test bed wires up: one fresh [`OutputEmitter`] per declared output
//! (allocated at instantiation, never shared between instances), trackable
//! method stand-ins (mocks), and named event handlers (hosts).
//!
//! Emission is synchronous and unbuffered: `emit` invokes every current
//! subscriber in subscription order before returning. The subscriber list is
//! copied out before invocation, so a callback may subscribe or emit without
//! deadlocking.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

use ahash::AHashMap;

use crate::component::ComponentType;
use crate::reflection::property_metadata;

/// Dynamic payload type for channel values, field values, and call arguments.
pub use serde_json::Value;

/// A trackable replacement for a component method.
///
/// Produced by the configured mock-provider; the concrete type behind the
/// object decides what invocation does and what gets recorded.
pub trait StandIn: Send + Sync {
    /// Invoke the stand-in with call arguments, producing its result.
    fn invoke(&self, args: Vec<Value>) -> Value;
    /// Access the concrete type for downcasting in assertions.
    fn as_any(&self) -> &dyn Any;
}

/// A callback observing one output channel.
pub type Subscriber = Arc<dyn Fn(&Value) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An event-emitter for one output channel of one instance.
///
/// Cloning shares the underlying channel; distinct instances get distinct
/// emitters.
#[derive(Clone, Default)]
pub struct OutputEmitter {
    subscribers: Arc<Mutex<Vec<Subscriber>>>,
}

impl OutputEmitter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&Value) + Send + Sync + 'static) {
        lock(&self.subscribers).push(Arc::new(callback));
    }

    /// Synchronously invoke every current subscriber, in subscription order.
    pub fn emit(&self, payload: Value) {
        let subscribers: Vec<Subscriber> = lock(&self.subscribers).clone();
        for subscriber in subscribers {
            subscriber(&payload);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Identity comparison: do two handles share one channel?
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.subscribers, &b.subscribers)
    }
}

struct InstanceInner {
    type_key: crate::component::TypeKey,
    type_name: String,
    fields: Mutex<AHashMap<String, Value>>,
    outputs: Vec<(String, OutputEmitter)>,
    stand_ins: Mutex<Vec<(String, Arc<dyn StandIn>)>>,
    handlers: Mutex<AHashMap<String, Subscriber>>,
}

/// Shared handle to one component instance.
#[derive(Clone)]
pub struct InstanceHandle {
    inner: Arc<InstanceInner>,
}

impl InstanceHandle {
    /// Create an instance of `ty` with a fresh emitter per declared output.
    #[must_use]
    pub fn new(ty: &ComponentType) -> Self {
        let outputs = property_metadata(ty)
            .outputs()
            .into_iter()
            .map(|channel| (channel.property, OutputEmitter::new()))
            .collect();
        Self {
            inner: Arc::new(InstanceInner {
                type_key: ty.key(),
                type_name: ty.name().to_string(),
                fields: Mutex::new(AHashMap::new()),
                outputs,
                stand_ins: Mutex::new(Vec::new()),
                handlers: Mutex::new(AHashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn type_key(&self) -> crate::component::TypeKey {
        self.inner.type_key
    }

    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.inner.type_name
    }

    // --- Fields ------------------------------------------------------------

    pub fn set(&self, field: impl Into<String>, value: Value) {
        lock(&self.inner.fields).insert(field.into(), value);
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> {
        lock(&self.inner.fields).get(field).cloned()
    }

    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        lock(&self.inner.fields).contains_key(field)
    }

    // --- Output channels ---------------------------------------------------

    /// The emitter for an output channel, by property name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<OutputEmitter> {
        self.inner
            .outputs
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, emitter)| emitter.clone())
    }

    /// Declared output channel names, in declaration order.
    #[must_use]
    pub fn output_names(&self) -> Vec<&str> {
        self.inner.outputs.iter().map(|(n, _)| n.as_str()).collect()
    }

    /// Subscribe to an output channel. Returns false when the channel does
    /// not exist.
    pub fn subscribe(&self, name: &str, callback: impl Fn(&Value) + Send + Sync + 'static) -> bool {
        match self.output(name) {
            Some(emitter) => {
                emitter.subscribe(callback);
                true
            }
            None => false,
        }
    }

    /// Emit on an output channel. Returns false when the channel does not
    /// exist.
    pub fn emit(&self, name: &str, payload: Value) -> bool {
        match self.output(name) {
            Some(emitter) => {
                emitter.emit(payload);
                true
            }
            None => false,
        }
    }

    // --- Method stand-ins --------------------------------------------------

    pub fn set_stand_in(&self, method: impl Into<String>, stand_in: Arc<dyn StandIn>) {
        let method = method.into();
        let mut stand_ins = lock(&self.inner.stand_ins);
        if let Some(entry) = stand_ins.iter_mut().find(|(n, _)| *n == method) {
            entry.1 = stand_in;
        } else {
            stand_ins.push((method, stand_in));
        }
    }

    #[must_use]
    pub fn stand_in(&self, method: &str) -> Option<Arc<dyn StandIn>> {
        lock(&self.inner.stand_ins)
            .iter()
            .find(|(n, _)| n == method)
            .map(|(_, s)| Arc::clone(s))
    }

    /// Names of all attached stand-ins, in attachment order.
    #[must_use]
    pub fn stand_in_names(&self) -> Vec<String> {
        lock(&self.inner.stand_ins)
            .iter()
            .map(|(n, _)| n.clone())
            .collect()
    }

    /// Invoke a method stand-in. `None` when no stand-in is attached under
    /// that name.
    pub fn call(&self, method: &str, args: Vec<Value>) -> Option<Value> {
        self.stand_in(method).map(|stand_in| stand_in.invoke(args))
    }

    // --- Host handlers -----------------------------------------------------

    pub fn set_handler(&self, name: impl Into<String>, handler: Subscriber) {
        lock(&self.inner.handlers).insert(name.into(), handler);
    }

    #[must_use]
    pub fn handler(&self, name: &str) -> Option<Subscriber> {
        lock(&self.inner.handlers).get(name).cloned()
    }

    /// Invoke a named handler with a payload. Returns false when absent.
    pub fn invoke_handler(&self, name: &str, payload: &Value) -> bool {
        match self.handler(name) {
            Some(handler) => {
                handler(payload);
                true
            }
            None => false,
        }
    }

    /// Identity comparison: do two handles refer to one instance?
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl std::fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("type_name", &self.inner.type_name)
            .finish_non_exhaustive()
    }
}
