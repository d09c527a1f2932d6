#![forbid(unsafe_code)]

//! The process-wide mock-provider slot.
//!
//! Exactly one provider is active at a time. There is no auto-detection:
//! a provider must be installed explicitly before any mock is instantiated,
//! and absence is a configuration error surfaced at instantiation.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use ftest_core::instance::StandIn;

/// A factory producing one fresh trackable stand-in per call.
pub type MockProviderFn = Arc<dyn Fn() -> Arc<dyn StandIn> + Send + Sync>;

fn slot() -> MutexGuard<'static, Option<MockProviderFn>> {
    static SLOT: OnceLock<Mutex<Option<MockProviderFn>>> = OnceLock::new();
    SLOT.get_or_init(|| Mutex::new(None))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Install the active mock-provider, replacing any previous one.
pub fn set_mock_provider(provider: MockProviderFn) {
    *slot() = Some(provider);
}

/// Remove the active mock-provider.
pub fn clear_mock_provider() {
    *slot() = None;
}

/// The active mock-provider, when one is installed.
#[must_use]
pub fn mock_provider() -> Option<MockProviderFn> {
    slot().clone()
}
