#![forbid(unsafe_code)]

//! The synchronous host-framework collaborator.
//!
//! A [`TestBed`] holds a set of declarations, providers, imports, and
//! schemas, and instantiates one declared component into a [`Fixture`]:
//! a rendered node tree with live instances, recorded property bindings,
//! and wired event bindings.
//!
//! Rendering is a single recursive pass over template markup. Elements
//! matching a declared selector become component nodes (their own template
//! is instantiated beneath them; pass-through templates project the
//! element's children against the outer scope). Everything else is a plain
//! node. Change detection re-copies every recorded property binding from
//! its source field to its target input — nothing more.

use std::fmt;
use std::sync::Arc;

use crate::component::{ComponentType, FactoryFailure, TypeKey};
use crate::instance::{InstanceHandle, Value};
use crate::markup::{MarkupElement, TemplateError, scan_template};
use crate::reflection::{
    Annotation, AnnotationKind, ReflectionError, TemplateSpec, get_annotation, property_metadata,
    selector_of,
};
use crate::selector::{SelectorAst, SelectorError};

/// A token/value pair made available to the test for the session's duration.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Provider {
    pub token: String,
    pub value: Value,
}

impl Provider {
    pub fn new(token: impl Into<String>, value: Value) -> Self {
        Self {
            token: token.into(),
            value,
        }
    }
}

/// A reusable bundle of declarations and providers.
#[derive(Debug, Clone, Default)]
pub struct Module {
    pub declarations: Vec<ComponentType>,
    pub providers: Vec<Provider>,
}

impl Module {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(mut self, ty: &ComponentType) -> Self {
        self.declarations.push(ty.clone());
        self
    }

    pub fn provide(mut self, provider: Provider) -> Self {
        self.providers.push(provider);
        self
    }
}

/// Template strictness relaxations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TemplateSchema {
    /// Tolerate custom elements with no matching declaration.
    NoErrors,
}

/// Errors from configuring or instantiating a test bed.
#[derive(Debug)]
pub enum TestBedError {
    Reflection(ReflectionError),
    Selector(SelectorError),
    Template(TemplateError),
    Factory(FactoryFailure),
}

impl fmt::Display for TestBedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reflection(err) => write!(f, "{err}"),
            Self::Selector(err) => write!(f, "declared selector is invalid: {err}"),
            Self::Template(err) => write!(f, "{err}"),
            Self::Factory(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for TestBedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Reflection(err) => Some(err),
            Self::Selector(err) => Some(err),
            Self::Template(err) => Some(err),
            Self::Factory(err) => Some(err),
        }
    }
}

impl From<ReflectionError> for TestBedError {
    fn from(err: ReflectionError) -> Self {
        Self::Reflection(err)
    }
}

impl From<SelectorError> for TestBedError {
    fn from(err: SelectorError) -> Self {
        Self::Selector(err)
    }
}

impl From<TemplateError> for TestBedError {
    fn from(err: TemplateError) -> Self {
        Self::Template(err)
    }
}

/// One node of the rendered tree.
#[derive(Clone)]
pub struct RenderedNode {
    inner: Arc<NodeInner>,
}

struct NodeInner {
    element: MarkupElement,
    component: Option<ComponentType>,
    instance: Option<InstanceHandle>,
    children: Vec<RenderedNode>,
}

impl RenderedNode {
    #[must_use]
    pub fn element(&self) -> &MarkupElement {
        &self.inner.element
    }

    #[must_use]
    pub fn tag(&self) -> &str {
        self.inner.element.tag()
    }

    /// The component type rendered here, when this is a component node.
    #[must_use]
    pub fn component_type(&self) -> Option<&ComponentType> {
        self.inner.component.as_ref()
    }

    /// The underlying logic instance, when this is a component node.
    #[must_use]
    pub fn instance(&self) -> Option<InstanceHandle> {
        self.inner.instance.clone()
    }

    #[must_use]
    pub fn children(&self) -> &[RenderedNode] {
        &self.inner.children
    }

    /// Descendants matching `selector`, in document order (the node itself
    /// is excluded, like a DOM `querySelectorAll` rooted here).
    #[must_use]
    pub fn query_all(&self, selector: &SelectorAst) -> Vec<RenderedNode> {
        let mut out = Vec::new();
        for child in self.children() {
            child.collect_matching(selector, &mut out);
        }
        out
    }

    #[must_use]
    pub fn query(&self, selector: &SelectorAst) -> Option<RenderedNode> {
        self.query_all(selector).into_iter().next()
    }

    fn collect_matching(&self, selector: &SelectorAst, out: &mut Vec<RenderedNode>) {
        if selector.matches(self.element()) {
            out.push(self.clone());
        }
        for child in self.children() {
            child.collect_matching(selector, out);
        }
    }

    fn collect_by_type(&self, key: TypeKey, out: &mut Vec<RenderedNode>) {
        if self.component_type().is_some_and(|ty| ty.key() == key) {
            out.push(self.clone());
        }
        for child in self.children() {
            child.collect_by_type(key, out);
        }
    }
}

impl fmt::Debug for RenderedNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderedNode")
            .field("tag", &self.tag())
            .field("component", &self.inner.component.as_ref().map(|c| c.name()))
            .field("children", &self.inner.children.len())
            .finish()
    }
}

/// A recorded property binding: copy `source_field` of the source instance
/// into `target_property` of the target on every change-detection pass.
#[derive(Debug)]
struct BindingRecord {
    source: InstanceHandle,
    source_field: String,
    target: InstanceHandle,
    target_property: String,
}

/// A rendered component plus everything needed to drive it.
#[derive(Clone, Debug)]
pub struct Fixture {
    root_instance: InstanceHandle,
    roots: Vec<RenderedNode>,
    bindings: Arc<Vec<BindingRecord>>,
    providers: Arc<Vec<Provider>>,
}

impl Fixture {
    /// The instance of the component this fixture was instantiated from.
    #[must_use]
    pub fn root_instance(&self) -> InstanceHandle {
        self.root_instance.clone()
    }

    /// Root nodes of the rendered template.
    #[must_use]
    pub fn roots(&self) -> &[RenderedNode] {
        &self.roots
    }

    /// Synchronously re-copy every recorded property binding.
    pub fn detect_changes(&self) {
        for binding in self.bindings.iter() {
            let value = binding.source.get(&binding.source_field).unwrap_or(Value::Null);
            binding.target.set(binding.target_property.clone(), value);
        }
    }

    /// Every rendered node matching `selector` — root elements included —
    /// in document order.
    #[must_use]
    pub fn query_all(&self, selector: &SelectorAst) -> Vec<RenderedNode> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.collect_matching(selector, &mut out);
        }
        out
    }

    #[must_use]
    pub fn query(&self, selector: &SelectorAst) -> Option<RenderedNode> {
        self.query_all(selector).into_iter().next()
    }

    /// Every rendered node of a given component type, in document order.
    #[must_use]
    pub fn query_all_by_type(&self, key: TypeKey) -> Vec<RenderedNode> {
        let mut out = Vec::new();
        for root in &self.roots {
            root.collect_by_type(key, &mut out);
        }
        out
    }

    #[must_use]
    pub fn query_by_type(&self, key: TypeKey) -> Option<RenderedNode> {
        self.query_all_by_type(key).into_iter().next()
    }

    /// Look up a configured provider value by token.
    #[must_use]
    pub fn provider(&self, token: &str) -> Option<Value> {
        self.providers
            .iter()
            .find(|p| p.token == token)
            .map(|p| p.value.clone())
    }
}

/// Declarations, providers, imports, and schemas for one instantiation.
#[derive(Default)]
pub struct TestBed {
    declarations: Vec<ComponentType>,
    providers: Vec<Provider>,
    schemas: Vec<TemplateSchema>,
}

impl TestBed {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, ty: &ComponentType) {
        self.declarations.push(ty.clone());
    }

    pub fn declare_all(&mut self, types: &[ComponentType]) {
        self.declarations.extend(types.iter().cloned());
    }

    pub fn provide(&mut self, provider: Provider) {
        self.providers.push(provider);
    }

    pub fn provide_all(&mut self, providers: &[Provider]) {
        self.providers.extend(providers.iter().cloned());
    }

    /// Flatten a module's declarations and providers into this bed.
    pub fn import(&mut self, module: &Module) {
        self.declarations.extend(module.declarations.iter().cloned());
        self.providers.extend(module.providers.iter().cloned());
    }

    pub fn schema(&mut self, schema: TemplateSchema) {
        self.schemas.push(schema);
    }

    /// Instantiate a declared component and render its template.
    pub fn instantiate(&self, ty: &ComponentType) -> Result<Fixture, TestBedError> {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("testbed_instantiate", component = ty.name()).entered();

        let root_instance = create_instance(ty)?;
        let template = component_template(ty)
            .ok_or_else(|| ReflectionError::NotAComponent(ty.name().to_string()))?;
        let matchers = self.selector_matchers()?;

        let mut bindings = Vec::new();
        let roots = match template {
            TemplateSpec::Markup(text) => {
                let elements = scan_template(&text)?;
                elements
                    .into_iter()
                    .map(|el| self.build_node(el, &root_instance, &matchers, &mut bindings))
                    .collect::<Result<Vec<_>, _>>()?
            }
            TemplateSpec::PassThrough | TemplateSpec::Empty => Vec::new(),
        };

        let fixture = Fixture {
            root_instance,
            roots,
            bindings: Arc::new(bindings),
            providers: Arc::new(self.providers.clone()),
        };
        fixture.detect_changes();
        Ok(fixture)
    }

    /// Parsed selector per declaration; declarations with no resolvable
    /// selector (the host itself) never match template elements.
    fn selector_matchers(&self) -> Result<Vec<(ComponentType, SelectorAst)>, TestBedError> {
        let mut matchers = Vec::new();
        for ty in &self.declarations {
            match selector_of(ty) {
                Ok(selector) => matchers.push((ty.clone(), crate::selector::parse(&selector)?)),
                Err(_) => continue,
            }
        }
        Ok(matchers)
    }

    fn build_node(
        &self,
        element: MarkupElement,
        scope: &InstanceHandle,
        matchers: &[(ComponentType, SelectorAst)],
        bindings: &mut Vec<BindingRecord>,
    ) -> Result<RenderedNode, TestBedError> {
        let matched = matchers
            .iter()
            .find(|(_, ast)| ast.matches(&element))
            .map(|(ty, _)| ty.clone());

        let Some(component) = matched else {
            #[cfg(feature = "tracing")]
            if element.tag().contains('-') && !self.allows_unknown_elements() {
                tracing::warn!(tag = element.tag(), "no declaration matches custom element");
            }
            let children = element
                .children()
                .iter()
                .cloned()
                .map(|child| self.build_node(child, scope, matchers, bindings))
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(RenderedNode {
                inner: Arc::new(NodeInner {
                    element,
                    component: None,
                    instance: None,
                    children,
                }),
            });
        };

        let instance = create_instance(&component)?;
        let metadata = property_metadata(&component);
        let inputs = metadata.inputs();
        let outputs = metadata.outputs();

        for (name, value) in element.attributes() {
            if let Some(external) = sigil_name(name, '[', ']') {
                match inputs.iter().find(|c| c.external == external) {
                    Some(channel) => bindings.push(BindingRecord {
                        source: scope.clone(),
                        source_field: value.clone(),
                        target: instance.clone(),
                        target_property: channel.property.clone(),
                    }),
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            component = component.name(),
                            input = external,
                            "ignoring binding to undeclared input"
                        );
                    }
                }
            } else if let Some(external) = sigil_name(name, '(', ')') {
                match outputs.iter().find(|c| c.external == external) {
                    Some(channel) => {
                        let handler = handler_name(value).to_string();
                        let handler_scope = scope.clone();
                        instance.subscribe(&channel.property, move |payload| {
                            handler_scope.invoke_handler(&handler, payload);
                        });
                    }
                    None => {
                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            component = component.name(),
                            output = external,
                            "ignoring binding to undeclared output"
                        );
                    }
                }
            }
        }

        let children = match component_template(&component).unwrap_or_default() {
            TemplateSpec::Markup(text) => scan_template(&text)?
                .into_iter()
                .map(|child| self.build_node(child, &instance, matchers, bindings))
                .collect::<Result<Vec<_>, _>>()?,
            TemplateSpec::PassThrough => element
                .children()
                .iter()
                .cloned()
                .map(|child| self.build_node(child, scope, matchers, bindings))
                .collect::<Result<Vec<_>, _>>()?,
            TemplateSpec::Empty => Vec::new(),
        };

        Ok(RenderedNode {
            inner: Arc::new(NodeInner {
                element,
                component: Some(component),
                instance: Some(instance),
                children,
            }),
        })
    }

    /// Whether a `NoErrors` schema relaxed custom-element strictness.
    #[must_use]
    pub fn allows_unknown_elements(&self) -> bool {
        self.schemas.contains(&TemplateSchema::NoErrors)
    }
}

fn create_instance(ty: &ComponentType) -> Result<InstanceHandle, TestBedError> {
    ty.instantiate().map_err(TestBedError::Factory)
}

fn component_template(ty: &ComponentType) -> Option<TemplateSpec> {
    match get_annotation(ty, AnnotationKind::Component) {
        Some(Annotation::Component(annotation)) => Some(annotation.template),
        _ => None,
    }
}

/// `[name]` / `(name)` attribute recognition.
fn sigil_name(attribute: &str, open: char, close: char) -> Option<&str> {
    attribute.strip_prefix(open)?.strip_suffix(close)
}

/// The identifier before `(` in an event-binding expression like
/// `save($event)`.
fn handler_name(expression: &str) -> &str {
    expression.split('(').next().unwrap_or(expression).trim()
}

#[cfg(test)]
mod tests {
    use super::{Module, Provider, TestBed, TestBedError};
    use crate::component::ComponentType;
    use crate::selector::parse;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn child_type() -> ComponentType {
        ComponentType::define("ChildPanel")
            .selector("child-panel")
            .template("<div class='inner'></div>")
            .input("title")
            .output("save")
            .build()
    }

    fn host_for(template: &str) -> ComponentType {
        ComponentType::define("Host").template(template).build()
    }

    #[test]
    fn instantiates_declared_children_from_the_template() {
        let child = child_type();
        let host = host_for("<child-panel></child-panel>");
        let mut bed = TestBed::new();
        bed.declare(&host);
        bed.declare(&child);

        let fixture = bed.instantiate(&host).unwrap();
        let node = fixture.query(&parse("child-panel").unwrap()).unwrap();
        assert_eq!(node.component_type().unwrap().name(), "ChildPanel");
        assert!(node.instance().is_some());
        // The child's own template rendered beneath it.
        assert_eq!(node.children()[0].tag(), "div");
    }

    #[test]
    fn property_bindings_copy_on_detect_changes() {
        let child = child_type();
        let host = host_for("<child-panel [title]=\"headline\"></child-panel>");
        let mut bed = TestBed::new();
        bed.declare(&host);
        bed.declare(&child);

        let fixture = bed.instantiate(&host).unwrap();
        let child_instance = fixture
            .query(&parse("child-panel").unwrap())
            .unwrap()
            .instance()
            .unwrap();
        assert_eq!(child_instance.get("title"), Some(json!(null)));

        fixture.root_instance().set("headline", json!("Breaking"));
        fixture.detect_changes();
        assert_eq!(child_instance.get("title"), Some(json!("Breaking")));
    }

    #[test]
    fn event_bindings_invoke_scope_handlers() {
        let child = child_type();
        let host = host_for("<child-panel (save)=\"save($event)\"></child-panel>");
        let mut bed = TestBed::new();
        bed.declare(&host);
        bed.declare(&child);

        let fixture = bed.instantiate(&host).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        fixture
            .root_instance()
            .set_handler("save", Arc::new(move |payload| sink.lock().unwrap().push(payload.clone())));

        let child_instance = fixture
            .query(&parse("child-panel").unwrap())
            .unwrap()
            .instance()
            .unwrap();
        child_instance.emit("save", json!({"ok": true}));
        assert_eq!(seen.lock().unwrap().as_slice(), [json!({"ok": true})]);
    }

    #[test]
    fn alias_declared_inputs_bind_by_external_name() {
        let child = ComponentType::define("Aliased")
            .selector("aliased-box")
            .input_as("inner", "outer")
            .build();
        let host = host_for("<aliased-box [outer]=\"source\"></aliased-box>");
        let mut bed = TestBed::new();
        bed.declare(&host);
        bed.declare(&child);

        let fixture = bed.instantiate(&host).unwrap();
        fixture.root_instance().set("source", json!(5));
        fixture.detect_changes();
        let instance = fixture
            .query(&parse("aliased-box").unwrap())
            .unwrap()
            .instance()
            .unwrap();
        assert_eq!(instance.get("inner"), Some(json!(5)));
        assert!(!instance.has_field("outer"));
    }

    #[test]
    fn pass_through_templates_project_children_against_outer_scope() {
        let wrapper = ComponentType::define("Wrapper")
            .selector("wrapper-box")
            .pass_through_template()
            .build();
        let inner = ComponentType::define("Inner")
            .selector("inner-box")
            .input("value")
            .build();
        let host = host_for(
            "<wrapper-box><inner-box [value]=\"outer-field\"></inner-box></wrapper-box>",
        );
        let mut bed = TestBed::new();
        bed.declare(&host);
        bed.declare(&wrapper);
        bed.declare(&inner);

        let fixture = bed.instantiate(&host).unwrap();
        fixture.root_instance().set("outer-field", json!("projected"));
        fixture.detect_changes();

        let inner_node = fixture.query(&parse("inner-box").unwrap()).unwrap();
        assert_eq!(
            inner_node.instance().unwrap().get("value"),
            Some(json!("projected"))
        );
    }

    #[test]
    fn query_all_returns_document_order() {
        let item = ComponentType::define("Item").selector("row-item").build();
        let host = host_for(
            "<div><row-item id=\"a\"></row-item></div><row-item id=\"b\"></row-item>",
        );
        let mut bed = TestBed::new();
        bed.declare(&host);
        bed.declare(&item);

        let fixture = bed.instantiate(&host).unwrap();
        let nodes = fixture.query_all(&parse("row-item").unwrap());
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].element().id(), Some("a"));
        assert_eq!(nodes[1].element().id(), Some("b"));
        assert_eq!(fixture.query_all_by_type(item.key()).len(), 2);
    }

    #[test]
    fn imports_flatten_declarations_and_providers() {
        let child = child_type();
        let module = Module::new()
            .declare(&child)
            .provide(Provider::new("api-base", json!("https://example.test")));
        let host = host_for("<child-panel></child-panel>");
        let mut bed = TestBed::new();
        bed.declare(&host);
        bed.import(&module);

        let fixture = bed.instantiate(&host).unwrap();
        assert!(fixture.query(&parse("child-panel").unwrap()).is_some());
        assert_eq!(fixture.provider("api-base"), Some(json!("https://example.test")));
        assert_eq!(fixture.provider("missing"), None);
    }

    #[test]
    fn instantiating_a_non_component_fails() {
        let plain = ComponentType::define("Plain").build();
        let bed = TestBed::new();
        assert!(matches!(
            bed.instantiate(&plain),
            Err(TestBedError::Reflection(_))
        ));
    }

    #[test]
    fn factory_failures_surface_with_their_source() {
        let broken = ComponentType::define("Broken")
            .selector("broken-box")
            .template("<div></div>")
            .factory(|_| Err("no provider".into()))
            .build();
        let mut bed = TestBed::new();
        bed.declare(&broken);
        let err = bed.instantiate(&broken).unwrap_err();
        assert!(err.to_string().contains("Broken"));
        assert!(matches!(err, TestBedError::Factory(_)));
    }
}
