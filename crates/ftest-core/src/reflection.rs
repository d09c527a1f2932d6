#![forbid(unsafe_code)]

//! Capability reflection over component descriptors.
//!
//! A component advertises its capability surface — an addressable selector
//! plus named input and output channels — through annotations and property
//! markers. Two storage conventions are tolerated: annotations attached
//! directly to the [`ComponentType`] handle, and an out-of-band process-wide
//! registry keyed by [`TypeKey`]. Readers check the direct convention first
//! and fall back to the registry; absence of an annotation is never an error
//! at the [`get_annotation`] level — callers decide whether it is fatal.

use std::fmt;
use std::sync::{Mutex, MutexGuard, OnceLock};

use ahash::AHashMap;

use crate::component::{ComponentType, TypeKey};

/// How a component's view is declared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TemplateSpec {
    /// Markup text, scanned and instantiated by the test bed.
    Markup(String),
    /// Render transcluded children unchanged (the mock template).
    PassThrough,
    /// No view at all.
    #[default]
    Empty,
}

/// The component capability annotation: selector plus template.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComponentAnnotation {
    pub selector: Option<String>,
    pub template: TemplateSpec,
}

/// A non-component capability annotation, present so that annotation lookup
/// is genuinely kind-filtered rather than a presence check.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServiceAnnotation {
    pub token: String,
}

/// An annotation attachable to a type.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Annotation {
    Component(ComponentAnnotation),
    Service(ServiceAnnotation),
}

/// Discriminant for [`Annotation`] lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationKind {
    Component,
    Service,
}

impl Annotation {
    #[must_use]
    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Component(_) => AnnotationKind::Component,
            Self::Service(_) => AnnotationKind::Service,
        }
    }
}

/// A capability marker on a single property.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PropertyMarker {
    /// An externally-pushed value channel, optionally bound under an
    /// alternate external name.
    Input { alias: Option<String> },
    /// An externally-observable emission channel, likewise aliasable.
    Output { alias: Option<String> },
}

/// A resolved channel: the property name on the instance and the external
/// name bindings use (the alias when one was declared).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelBinding {
    pub property: String,
    pub external: String,
}

/// Ordered mapping from property name to its capability markers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PropertyMetadata {
    entries: Vec<(String, Vec<PropertyMarker>)>,
}

impl PropertyMetadata {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a marker to a property, creating the entry on first use.
    /// Entry order is declaration order.
    pub fn push(&mut self, property: impl Into<String>, marker: PropertyMarker) {
        let property = property.into();
        if let Some((_, markers)) = self.entries.iter_mut().find(|(n, _)| *n == property) {
            markers.push(marker);
        } else {
            self.entries.push((property, vec![marker]));
        }
    }

    #[must_use]
    pub fn markers(&self, property: &str) -> &[PropertyMarker] {
        self.entries
            .iter()
            .find(|(n, _)| n == property)
            .map(|(_, m)| m.as_slice())
            .unwrap_or(&[])
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    /// Declared input channels, in declaration order.
    #[must_use]
    pub fn inputs(&self) -> Vec<ChannelBinding> {
        self.channels(|marker| match marker {
            PropertyMarker::Input { alias } => Some(alias.clone()),
            PropertyMarker::Output { .. } => None,
        })
    }

    /// Declared output channels, in declaration order.
    #[must_use]
    pub fn outputs(&self) -> Vec<ChannelBinding> {
        self.channels(|marker| match marker {
            PropertyMarker::Output { alias } => Some(alias.clone()),
            PropertyMarker::Input { .. } => None,
        })
    }

    fn channels(
        &self,
        select: impl Fn(&PropertyMarker) -> Option<Option<String>>,
    ) -> Vec<ChannelBinding> {
        let mut out = Vec::new();
        for (property, markers) in &self.entries {
            if let Some(alias) = markers.iter().find_map(&select) {
                out.push(ChannelBinding {
                    property: property.clone(),
                    external: alias.unwrap_or_else(|| property.clone()),
                });
            }
        }
        out
    }
}

/// Errors from resolving a component's capability surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionError {
    /// The type carries no component annotation under either convention.
    NotAComponent(String),
    /// The component annotation exists but declares no selector.
    NoSelector(String),
}

impl fmt::Display for ReflectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotAComponent(name) => {
                write!(f, "{name} carries no component annotation")
            }
            Self::NoSelector(name) => {
                write!(f, "the component annotation on {name} declares no selector")
            }
        }
    }
}

impl std::error::Error for ReflectionError {}

// --- Out-of-band registry ---------------------------------------------------

#[derive(Default)]
struct ReflectionStore {
    annotations: AHashMap<TypeKey, Vec<Annotation>>,
    properties: AHashMap<TypeKey, PropertyMetadata>,
}

fn store() -> MutexGuard<'static, ReflectionStore> {
    static STORE: OnceLock<Mutex<ReflectionStore>> = OnceLock::new();
    STORE
        .get_or_init(|| Mutex::new(ReflectionStore::default()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Attach annotations to a type through the out-of-band registry.
pub fn register_annotations(ty: &ComponentType, annotations: Vec<Annotation>) {
    store().annotations.insert(ty.key(), annotations);
}

/// Attach property metadata to a type through the out-of-band registry.
pub fn register_property_metadata(ty: &ComponentType, metadata: PropertyMetadata) {
    store().properties.insert(ty.key(), metadata);
}

// --- Readers ----------------------------------------------------------------

/// The first attached annotation matching `kind`, or `None`.
///
/// Annotations carried directly on the handle win over registry entries;
/// absence never errors.
#[must_use]
pub fn get_annotation(ty: &ComponentType, kind: AnnotationKind) -> Option<Annotation> {
    let direct = ty.annotations();
    if !direct.is_empty() {
        return direct.iter().find(|a| a.kind() == kind).cloned();
    }
    store()
        .annotations
        .get(&ty.key())
        .and_then(|list| list.iter().find(|a| a.kind() == kind).cloned())
}

/// The resolved selector of a component type.
pub fn selector_of(ty: &ComponentType) -> Result<String, ReflectionError> {
    let annotation = get_annotation(ty, AnnotationKind::Component)
        .ok_or_else(|| ReflectionError::NotAComponent(ty.name().to_string()))?;
    match annotation {
        Annotation::Component(ComponentAnnotation {
            selector: Some(selector),
            ..
        }) if !selector.is_empty() => Ok(selector),
        _ => Err(ReflectionError::NoSelector(ty.name().to_string())),
    }
}

/// Property metadata under whichever storage convention is present.
///
/// The direct convention wins; with neither present the result is empty.
#[must_use]
pub fn property_metadata(ty: &ComponentType) -> PropertyMetadata {
    let direct = ty.properties();
    if !direct.is_empty() {
        return direct.clone();
    }
    store().properties.get(&ty.key()).cloned().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::{
        Annotation, AnnotationKind, ComponentAnnotation, PropertyMarker, PropertyMetadata,
        ReflectionError, ServiceAnnotation, TemplateSpec, get_annotation, property_metadata,
        register_annotations, register_property_metadata, selector_of,
    };
    use crate::component::ComponentType;

    #[test]
    fn selector_of_reads_the_direct_convention() {
        let ty = ComponentType::define("Tagged").selector("#abc123").build();
        assert_eq!(selector_of(&ty).unwrap(), "#abc123");
    }

    #[test]
    fn selector_of_falls_back_to_the_registry() {
        let ty = ComponentType::define("Registered").build();
        register_annotations(
            &ty,
            vec![Annotation::Component(ComponentAnnotation {
                selector: Some("reg-widget".into()),
                template: TemplateSpec::Empty,
            })],
        );
        assert_eq!(selector_of(&ty).unwrap(), "reg-widget");
    }

    #[test]
    fn unannotated_type_is_not_a_component() {
        let ty = ComponentType::define("Plain").build();
        assert_eq!(
            selector_of(&ty),
            Err(ReflectionError::NotAComponent("Plain".into()))
        );
    }

    #[test]
    fn component_annotation_without_selector_errors() {
        let ty = ComponentType::define("Viewless").template("<div></div>").build();
        assert_eq!(
            selector_of(&ty),
            Err(ReflectionError::NoSelector("Viewless".into()))
        );
    }

    #[test]
    fn get_annotation_filters_by_kind_and_never_errors() {
        let ty = ComponentType::define("Svc")
            .selector("svc-box")
            .annotate(Annotation::Service(ServiceAnnotation {
                token: "svc".into(),
            }))
            .build();
        assert!(matches!(
            get_annotation(&ty, AnnotationKind::Service),
            Some(Annotation::Service(_))
        ));
        let bare = ComponentType::define("Bare").build();
        assert_eq!(get_annotation(&bare, AnnotationKind::Component), None);
    }

    #[test]
    fn direct_property_metadata_wins_over_registry() {
        let ty = ComponentType::define("Both").selector("both-box").input("direct").build();
        let mut registered = PropertyMetadata::new();
        registered.push("registered", PropertyMarker::Input { alias: None });
        register_property_metadata(&ty, registered);

        let meta = property_metadata(&ty);
        let inputs = meta.inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].property, "direct");
    }

    #[test]
    fn registry_property_metadata_is_used_when_direct_is_absent() {
        let ty = ComponentType::define("StoreOnly").selector("store-only").build();
        let mut registered = PropertyMetadata::new();
        registered.push("fromStore", PropertyMarker::Output { alias: None });
        register_property_metadata(&ty, registered);

        let outputs = property_metadata(&ty).outputs();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].property, "fromStore");
    }

    #[test]
    fn channels_resolve_aliases_and_keep_declaration_order() {
        let mut meta = PropertyMetadata::new();
        meta.push("first", PropertyMarker::Input { alias: None });
        meta.push(
            "second",
            PropertyMarker::Input {
                alias: Some("renamed".into()),
            },
        );
        meta.push("ping", PropertyMarker::Output { alias: None });

        let inputs = meta.inputs();
        assert_eq!(inputs[0].external, "first");
        assert_eq!(inputs[1].property, "second");
        assert_eq!(inputs[1].external, "renamed");
        assert_eq!(meta.outputs()[0].external, "ping");
    }
}
