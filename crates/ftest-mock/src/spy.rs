#![forbid(unsafe_code)]

//! Recording stand-ins for component methods.
//!
//! A [`Spy`] records every invocation and answers with a fixed value
//! (`Null` until configured) or a fake. Cloning shares the recording, so a
//! spy retrieved from a mock instance asserts against the same call log the
//! instance writes to.

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard};

use ftest_core::instance::{StandIn, Value};

use crate::provider::MockProviderFn;

enum Behavior {
    Fixed(Value),
    Fake(Arc<dyn Fn(&[Value]) -> Value + Send + Sync>),
}

struct SpyInner {
    calls: Mutex<Vec<Vec<Value>>>,
    behavior: Mutex<Behavior>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A trackable method stand-in.
#[derive(Clone)]
pub struct Spy {
    inner: Arc<SpyInner>,
}

impl Spy {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SpyInner {
                calls: Mutex::new(Vec::new()),
                behavior: Mutex::new(Behavior::Fixed(Value::Null)),
            }),
        }
    }

    /// Answer every subsequent invocation with `value`.
    pub fn returns(&self, value: Value) -> &Self {
        *lock(&self.inner.behavior) = Behavior::Fixed(value);
        self
    }

    /// Answer every subsequent invocation by calling `fake`.
    pub fn call_fake(&self, fake: impl Fn(&[Value]) -> Value + Send + Sync + 'static) -> &Self {
        *lock(&self.inner.behavior) = Behavior::Fake(Arc::new(fake));
        self
    }

    /// Record a call and produce the configured answer.
    pub fn invoke(&self, args: Vec<Value>) -> Value {
        let result = match &*lock(&self.inner.behavior) {
            Behavior::Fixed(value) => value.clone(),
            Behavior::Fake(fake) => fake(&args),
        };
        lock(&self.inner.calls).push(args);
        result
    }

    /// All recorded calls, oldest first.
    #[must_use]
    pub fn calls(&self) -> Vec<Vec<Value>> {
        lock(&self.inner.calls).clone()
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        lock(&self.inner.calls).len()
    }

    #[must_use]
    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }

    #[must_use]
    pub fn was_called_with(&self, args: &[Value]) -> bool {
        lock(&self.inner.calls).iter().any(|call| call == args)
    }

    /// Identity comparison: do two handles share one recording?
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    /// Recover a `Spy` from a stand-in object attached to an instance.
    #[must_use]
    pub fn from_stand_in(stand_in: &Arc<dyn StandIn>) -> Option<Spy> {
        stand_in.as_any().downcast_ref::<Spy>().cloned()
    }

    /// A mock-provider producing one fresh spy per call. This is the
    /// provider users install explicitly with
    /// [`set_mock_provider`](crate::provider::set_mock_provider).
    #[must_use]
    pub fn factory() -> MockProviderFn {
        Arc::new(|| Arc::new(Spy::new()) as Arc<dyn StandIn>)
    }
}

impl Default for Spy {
    fn default() -> Self {
        Self::new()
    }
}

impl StandIn for Spy {
    fn invoke(&self, args: Vec<Value>) -> Value {
        Spy::invoke(self, args)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl std::fmt::Debug for Spy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spy")
            .field("call_count", &self.call_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::Spy;
    use serde_json::json;

    #[test]
    fn records_calls_in_order() {
        let spy = Spy::new();
        spy.invoke(vec![json!(1)]);
        spy.invoke(vec![json!(2), json!("two")]);
        assert_eq!(spy.calls(), [vec![json!(1)], vec![json!(2), json!("two")]]);
        assert_eq!(spy.call_count(), 2);
        assert!(spy.was_called());
        assert!(spy.was_called_with(&[json!(2), json!("two")]));
        assert!(!spy.was_called_with(&[json!(3)]));
    }

    #[test]
    fn answers_null_until_configured() {
        let spy = Spy::new();
        assert_eq!(spy.invoke(vec![]), json!(null));
        spy.returns(json!(42));
        assert_eq!(spy.invoke(vec![]), json!(42));
    }

    #[test]
    fn fakes_see_the_arguments() {
        let spy = Spy::new();
        spy.call_fake(|args| json!(args.len()));
        assert_eq!(spy.invoke(vec![json!(0), json!(0)]), json!(2));
    }

    #[test]
    fn clones_share_the_recording() {
        let spy = Spy::new();
        let alias = spy.clone();
        spy.invoke(vec![]);
        assert_eq!(alias.call_count(), 1);
        assert!(Spy::ptr_eq(&spy, &alias));
    }

    #[test]
    fn factory_produces_distinct_spies() {
        let factory = Spy::factory();
        let a = factory();
        let b = factory();
        let a = Spy::from_stand_in(&a).unwrap();
        let b = Spy::from_stand_in(&b).unwrap();
        assert!(!Spy::ptr_eq(&a, &b));
    }
}
