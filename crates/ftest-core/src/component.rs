#![forbid(unsafe_code)]

//! Data-driven component descriptors.
//!
//! A [`ComponentType`] is the opaque handle the harness understands: a name,
//! its attached annotations and property metadata, an ordered list of own
//! method names, an optional parent type forming a prototype chain, and an
//! optional per-instance factory hook. Handles are cheap to clone and compare
//! by identity; the harness never mutates a caller-supplied type — synthesis
//! always produces new ones.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::instance::InstanceHandle;
use crate::reflection::{
    Annotation, ComponentAnnotation, PropertyMarker, PropertyMetadata, TemplateSpec,
};

/// Process-unique identity of a [`ComponentType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeKey(u64);

impl TypeKey {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Per-instance construction hook. Runs once against the freshly created
/// instance, after channel emitters are allocated and before first use.
pub type InstanceFactory =
    Arc<dyn Fn(&InstanceHandle) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync>;

struct TypeInner {
    key: TypeKey,
    name: String,
    annotations: Vec<Annotation>,
    properties: PropertyMetadata,
    methods: Vec<String>,
    parent: Option<ComponentType>,
    factory: Option<InstanceFactory>,
}

/// Handle to a component type understood by the test bed.
#[derive(Clone)]
pub struct ComponentType {
    inner: Arc<TypeInner>,
}

impl ComponentType {
    /// Start defining a new type.
    pub fn define(name: impl Into<String>) -> ComponentTypeBuilder {
        ComponentTypeBuilder {
            name: name.into(),
            component: None,
            extra_annotations: Vec::new(),
            properties: PropertyMetadata::new(),
            methods: Vec::new(),
            parent: None,
            factory: None,
        }
    }

    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.inner.key
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Annotations attached directly to this handle.
    #[must_use]
    pub fn annotations(&self) -> &[Annotation] {
        &self.inner.annotations
    }

    /// Property metadata attached directly to this handle.
    #[must_use]
    pub fn properties(&self) -> &PropertyMetadata {
        &self.inner.properties
    }

    #[must_use]
    pub fn parent(&self) -> Option<&ComponentType> {
        self.inner.parent.as_ref()
    }

    #[must_use]
    pub(crate) fn factory(&self) -> Option<&InstanceFactory> {
        self.inner.factory.as_ref()
    }

    /// Every method name reachable through the prototype chain: own methods
    /// first, then each ancestor's, deduplicated in first-seen order.
    #[must_use]
    pub fn methods_in_chain(&self) -> Vec<String> {
        let mut seen = Vec::new();
        let mut current = Some(self);
        while let Some(ty) = current {
            for method in &ty.inner.methods {
                if !seen.contains(method) {
                    seen.push(method.clone());
                }
            }
            current = ty.parent();
        }
        seen
    }

    /// Create one instance of this type: allocate a fresh emitter per
    /// declared output, then run the factory hook when one is attached.
    pub fn instantiate(&self) -> Result<InstanceHandle, FactoryFailure> {
        let instance = InstanceHandle::new(self);
        if let Some(factory) = self.factory() {
            factory(&instance).map_err(|source| FactoryFailure {
                type_name: self.name().to_string(),
                source,
            })?;
        }
        Ok(instance)
    }
}

impl PartialEq for ComponentType {
    fn eq(&self, other: &Self) -> bool {
        self.inner.key == other.inner.key
    }
}

impl Eq for ComponentType {}

impl fmt::Debug for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentType")
            .field("key", &self.inner.key)
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

/// A factory hook rejected instantiation.
#[derive(Debug)]
pub struct FactoryFailure {
    pub type_name: String,
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl fmt::Display for FactoryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instantiating {} failed: {}", self.type_name, self.source)
    }
}

impl std::error::Error for FactoryFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.source.as_ref())
    }
}

/// Builder for [`ComponentType`].
///
/// The component annotation is attached once a selector or template is
/// declared; a type built with neither stays un-annotated, which is how
/// non-component types are represented.
pub struct ComponentTypeBuilder {
    name: String,
    component: Option<ComponentAnnotation>,
    extra_annotations: Vec<Annotation>,
    properties: PropertyMetadata,
    methods: Vec<String>,
    parent: Option<ComponentType>,
    factory: Option<InstanceFactory>,
}

impl ComponentTypeBuilder {
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.component_annotation().selector = Some(selector.into());
        self
    }

    pub fn template(mut self, markup: impl Into<String>) -> Self {
        self.component_annotation().template = TemplateSpec::Markup(markup.into());
        self
    }

    /// Declare a pass-through view: transcluded children render unchanged.
    pub fn pass_through_template(mut self) -> Self {
        self.component_annotation().template = TemplateSpec::PassThrough;
        self
    }

    pub fn template_spec(mut self, template: TemplateSpec) -> Self {
        self.component_annotation().template = template;
        self
    }

    /// Attach an additional annotation verbatim.
    pub fn annotate(mut self, annotation: Annotation) -> Self {
        self.extra_annotations.push(annotation);
        self
    }

    pub fn input(mut self, property: impl Into<String>) -> Self {
        self.properties
            .push(property, PropertyMarker::Input { alias: None });
        self
    }

    /// Declare an input bound under an alternate external name.
    pub fn input_as(mut self, property: impl Into<String>, alias: impl Into<String>) -> Self {
        self.properties.push(
            property,
            PropertyMarker::Input {
                alias: Some(alias.into()),
            },
        );
        self
    }

    pub fn output(mut self, property: impl Into<String>) -> Self {
        self.properties
            .push(property, PropertyMarker::Output { alias: None });
        self
    }

    pub fn output_as(mut self, property: impl Into<String>, alias: impl Into<String>) -> Self {
        self.properties.push(
            property,
            PropertyMarker::Output {
                alias: Some(alias.into()),
            },
        );
        self
    }

    pub fn method(mut self, name: impl Into<String>) -> Self {
        self.methods.push(name.into());
        self
    }

    /// Set the parent type this one inherits methods from.
    pub fn extends(mut self, parent: &ComponentType) -> Self {
        self.parent = Some(parent.clone());
        self
    }

    pub fn factory(
        mut self,
        factory: impl Fn(&InstanceHandle) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    #[must_use]
    pub fn build(self) -> ComponentType {
        let mut annotations = Vec::new();
        if let Some(component) = self.component {
            annotations.push(Annotation::Component(component));
        }
        annotations.extend(self.extra_annotations);
        ComponentType {
            inner: Arc::new(TypeInner {
                key: TypeKey::next(),
                name: self.name,
                annotations,
                properties: self.properties,
                methods: self.methods,
                parent: self.parent,
                factory: self.factory,
            }),
        }
    }

    fn component_annotation(&mut self) -> &mut ComponentAnnotation {
        self.component.get_or_insert_with(ComponentAnnotation::default)
    }
}

#[cfg(test)]
mod tests {
    use super::ComponentType;
    use crate::reflection::{Annotation, AnnotationKind};
    use serde_json::json;

    #[test]
    fn handles_compare_by_identity() {
        let a = ComponentType::define("Same").selector("same-box").build();
        let b = ComponentType::define("Same").selector("same-box").build();
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn selector_or_template_attaches_the_component_annotation() {
        let with = ComponentType::define("With").selector("with-box").build();
        let without = ComponentType::define("Without").method("run").build();
        assert!(matches!(
            with.annotations().first(),
            Some(Annotation::Component(_))
        ));
        assert!(without.annotations().is_empty());
        assert_eq!(
            crate::reflection::get_annotation(&without, AnnotationKind::Component),
            None
        );
    }

    #[test]
    fn methods_in_chain_walks_ancestors_and_dedups() {
        let base = ComponentType::define("Base")
            .method("shared")
            .method("base-only")
            .build();
        let middle = ComponentType::define("Middle")
            .method("middle-only")
            .method("shared")
            .extends(&base)
            .build();
        let leaf = ComponentType::define("Leaf")
            .method("leaf-only")
            .extends(&middle)
            .build();
        assert_eq!(
            leaf.methods_in_chain(),
            ["leaf-only", "middle-only", "shared", "base-only"]
        );
    }

    #[test]
    fn factory_runs_once_per_instantiation() {
        let ty = ComponentType::define("Seeded")
            .selector("seeded-box")
            .factory(|instance| {
                instance.set("seed", json!(41));
                Ok(())
            })
            .build();
        let a = ty.instantiate().unwrap();
        let b = ty.instantiate().unwrap();
        a.set("seed", json!(99));
        assert_eq!(b.get("seed"), Some(json!(41)));
    }

    #[test]
    fn factory_errors_carry_the_type_name() {
        let ty = ComponentType::define("Broken")
            .selector("broken-box")
            .factory(|_| Err("refused".into()))
            .build();
        let err = ty.instantiate().unwrap_err();
        assert_eq!(err.type_name, "Broken");
        assert!(err.to_string().contains("Broken"));
    }
}
