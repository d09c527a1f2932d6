#![forbid(unsafe_code)]

//! frankentest public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for test authors.
//! It re-exports common types from the internal crates and offers a
//! lightweight prelude for day-to-day usage.

// --- Core re-exports -------------------------------------------------------

pub use ftest_core::component::{ComponentType, ComponentTypeBuilder, TypeKey};
pub use ftest_core::instance::{InstanceHandle, OutputEmitter, StandIn, Value};
pub use ftest_core::markup::{MarkupElement, TemplateError, scan_template};
pub use ftest_core::reflection::{
    Annotation, AnnotationKind, ChannelBinding, ComponentAnnotation, PropertyMarker,
    PropertyMetadata, ReflectionError, TemplateSpec, get_annotation, property_metadata,
    register_annotations, register_property_metadata, selector_of,
};
pub use ftest_core::selector::{SelectorAst, SelectorError, create_element, parse};
pub use ftest_core::testbed::{
    Fixture, Module, Provider, RenderedNode, TemplateSchema, TestBed, TestBedError,
};

// --- Mock re-exports -------------------------------------------------------

pub use ftest_mock::{
    MockError, MockProviderFn, MockSetup, Spy, clear_mock_provider, mock_component,
    mock_provider, set_mock_provider,
};

// --- Harness re-exports ----------------------------------------------------

pub use ftest_harness::{
    ComponentQuery, HarnessError, OutputWatch, SessionContext, TestBuilder, component,
    components, create_host, detect_changes, element, elements, fixture, on_output, set_input,
    subject, subject_element, teardown, test_component,
};

/// Convenience alias: the error type the harness surface returns.
pub type Error = HarnessError;

/// Everything a typical test file imports.
pub mod prelude {
    pub use crate::{
        ComponentType, InstanceHandle, Provider, Spy, Value, component, components,
        create_element, detect_changes, element, elements, fixture, mock_component, on_output,
        selector_of, set_input, set_mock_provider, subject, subject_element, teardown,
        test_component,
    };
}

#[cfg(test)]
mod tests {
    use super::prelude::*;

    #[test]
    fn prelude_surface_is_usable_without_internal_paths() {
        set_mock_provider(Spy::factory());
        let ty = ComponentType::define("Facade").selector("facade-box").build();
        assert_eq!(selector_of(&ty).unwrap(), "facade-box");
        let el = create_element("facade-box#f").unwrap();
        assert_eq!(el.id(), Some("f"));
        teardown();
    }
}
