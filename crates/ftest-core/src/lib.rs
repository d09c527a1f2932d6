#![forbid(unsafe_code)]

//! Core component model for frankentest.
//!
//! This crate owns everything the harness layers build on: the markup model
//! and template scanner, the CSS-like selector parser/synthesizer, capability
//! reflection over component descriptors, dynamic component instances with
//! per-instance output emitters, and the synchronous [`TestBed`] that turns a
//! set of declarations into a rendered [`Fixture`].
//!
//! The test bed is deliberately minimal: it instantiates templates, applies
//! property bindings, wires event bindings, and answers selector queries.
//! There is no layout, no paint, and no scheduler — change detection is a
//! synchronous re-copy of recorded bindings.

pub mod component;
pub mod instance;
pub mod markup;
pub mod reflection;
pub mod selector;
pub mod testbed;

pub use component::{ComponentType, ComponentTypeBuilder, FactoryFailure, TypeKey};
pub use instance::{InstanceHandle, OutputEmitter, StandIn, Value};
pub use markup::{MarkupElement, TemplateError, scan_template};
pub use reflection::{
    Annotation, AnnotationKind, ChannelBinding, ComponentAnnotation, PropertyMarker,
    PropertyMetadata, ReflectionError, ServiceAnnotation, TemplateSpec, get_annotation,
    property_metadata, register_annotations, register_property_metadata, selector_of,
};
pub use selector::{SelectorAst, SelectorError, create_element, parse};
pub use testbed::{
    Fixture, Module, Provider, RenderedNode, TemplateSchema, TestBed, TestBedError,
};
