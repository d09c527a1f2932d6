#![forbid(unsafe_code)]

//! Capability-preserving component mocks.
//!
//! [`mock_component`] synthesizes a drop-in replacement for a component
//! type: same resolved selector, same input/output channels (aliases
//! preserved), a pass-through view so transcluded children render
//! unchanged, and all behavior replaced by inert, individually-trackable
//! stand-ins.
//!
//! Emitters and stand-ins are allocated per *instance*, never per type:
//! two concurrently rendered mocks (say, inside a repeated list) must not
//! share call-tracking state. Stand-ins come from the process-wide
//! mock-provider, which must be installed explicitly — see [`provider`].

pub mod provider;
pub mod spy;

use std::fmt;
use std::sync::Arc;

use ftest_core::component::ComponentType;
use ftest_core::instance::InstanceHandle;
use ftest_core::reflection::{ReflectionError, property_metadata, selector_of};

pub use provider::{MockProviderFn, clear_mock_provider, mock_provider, set_mock_provider};
pub use spy::Spy;

/// A callback run once against each freshly instantiated mock, before
/// first use.
pub type MockSetup = Arc<dyn Fn(&InstanceHandle) + Send + Sync>;

/// Errors from mock synthesis and instantiation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    /// The type to mock carries no resolvable component capability surface.
    Reflection(ReflectionError),
    /// No mock-provider has been installed.
    NoMockProviderConfigured,
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reflection(err) => write!(f, "cannot mock: {err}"),
            Self::NoMockProviderConfigured => write!(
                f,
                "no mock provider is configured; install one with set_mock_provider() \
                 before instantiating mocks"
            ),
        }
    }
}

impl std::error::Error for MockError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Reflection(err) => Some(err),
            Self::NoMockProviderConfigured => None,
        }
    }
}

impl From<ReflectionError> for MockError {
    fn from(err: ReflectionError) -> Self {
        Self::Reflection(err)
    }
}

/// Synthesize a mock replacement type for `ty`.
///
/// The synthesized type declares the same selector and channel surface as
/// the original. On each instantiation it allocates one fresh emitter per
/// output channel, one fresh stand-in per method name reachable through the
/// original's prototype chain, and then runs `setup` once against the
/// assembled instance.
pub fn mock_component(
    ty: &ComponentType,
    setup: Option<MockSetup>,
) -> Result<ComponentType, MockError> {
    #[cfg(feature = "tracing")]
    let _span = tracing::debug_span!("mock_component", target = ty.name()).entered();

    let selector = selector_of(ty)?;
    let metadata = property_metadata(ty);
    let methods = ty.methods_in_chain();

    let mut builder = ComponentType::define(format!("{}Mock", ty.name()))
        .selector(selector)
        .pass_through_template();
    for channel in metadata.inputs() {
        builder = if channel.external == channel.property {
            builder.input(channel.property)
        } else {
            builder.input_as(channel.property, channel.external)
        };
    }
    for channel in metadata.outputs() {
        builder = if channel.external == channel.property {
            builder.output(channel.property)
        } else {
            builder.output_as(channel.property, channel.external)
        };
    }

    let builder = builder.factory(move |instance| {
        let Some(provider) = mock_provider() else {
            return Err(Box::new(MockError::NoMockProviderConfigured));
        };
        for method in &methods {
            instance.set_stand_in(method.clone(), provider());
        }
        if let Some(setup) = &setup {
            setup(instance);
        }
        Ok(())
    });

    Ok(builder.build())
}
