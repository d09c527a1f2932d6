#![forbid(unsafe_code)]

//! The single-session test lifecycle.
//!
//! A [`SessionContext`] is the explicit state of one test: the rendered
//! fixture, the subject instance and its root element, the set of
//! pre-initialized input names, and the in-progress flag. All accessors
//! fail fast with [`HarnessError::NoActiveTest`] outside an active test.
//!
//! The free functions at the bottom are a thin process-wide facade over one
//! `SessionContext` behind a mutex, for call sites that don't want to
//! thread a handle around. Exactly one test may be active at a time; test
//! bodies are serialized by the surrounding runner, not by the harness.
//! Every method is also available on `SessionContext` directly, so the
//! facade can be bypassed entirely.

use std::sync::{Arc, Mutex, MutexGuard};

use ftest_core::component::ComponentType;
use ftest_core::instance::{InstanceHandle, Value};
use ftest_core::reflection::{AnnotationKind, get_annotation};
use ftest_core::selector::parse;
use ftest_core::testbed::{Fixture, Module, Provider, RenderedNode, TemplateSchema, TestBed};
use ftest_mock::{MockSetup, mock_component};

use crate::error::HarnessError;
use crate::host::{OutputWatch, create_host};

/// How to look a rendered component up: by selector text or by type.
pub enum ComponentQuery<'a> {
    Selector(&'a str),
    Type(&'a ComponentType),
}

impl<'a> From<&'a str> for ComponentQuery<'a> {
    fn from(selector: &'a str) -> Self {
        Self::Selector(selector)
    }
}

impl<'a> From<&'a ComponentType> for ComponentQuery<'a> {
    fn from(ty: &'a ComponentType) -> Self {
        Self::Type(ty)
    }
}

/// The state of one test session.
pub struct SessionContext {
    fixture: Option<Fixture>,
    subject: Option<InstanceHandle>,
    subject_element: Option<RenderedNode>,
    initialized_inputs: Vec<String>,
    in_progress: bool,
}

impl SessionContext {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            fixture: None,
            subject: None,
            subject_element: None,
            initialized_inputs: Vec::new(),
            in_progress: false,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.in_progress
    }

    /// The subject instance of the active test.
    pub fn subject(&self) -> Result<InstanceHandle, HarnessError> {
        self.subject.clone().ok_or(HarnessError::NoActiveTest)
    }

    /// The rendered element the subject attached to.
    pub fn subject_element(&self) -> Result<RenderedNode, HarnessError> {
        self.subject_element.clone().ok_or(HarnessError::NoActiveTest)
    }

    /// The fixture owning the rendered tree.
    pub fn fixture(&self) -> Result<Fixture, HarnessError> {
        self.fixture.clone().ok_or(HarnessError::NoActiveTest)
    }

    /// First element under the subject matching `selector`, if any.
    pub fn element(&self, selector: &str) -> Result<Option<RenderedNode>, HarnessError> {
        let root = self.subject_element()?;
        Ok(root.query(&parse(selector)?))
    }

    /// All elements under the subject matching `selector`.
    pub fn elements(&self, selector: &str) -> Result<Vec<RenderedNode>, HarnessError> {
        let root = self.subject_element()?;
        Ok(root.query_all(&parse(selector)?))
    }

    /// First rendered component matching the query, anywhere in the fixture.
    pub fn component(&self, query: ComponentQuery<'_>) -> Result<Option<InstanceHandle>, HarnessError> {
        Ok(self.component_instances(query)?.into_iter().next())
    }

    /// All rendered components matching the query, in document order.
    pub fn components(&self, query: ComponentQuery<'_>) -> Result<Vec<InstanceHandle>, HarnessError> {
        self.component_instances(query)
    }

    fn component_instances(&self, query: ComponentQuery<'_>) -> Result<Vec<InstanceHandle>, HarnessError> {
        let fixture = self.fixture()?;
        let nodes = match query {
            ComponentQuery::Selector(selector) => fixture.query_all(&parse(selector)?),
            ComponentQuery::Type(ty) => fixture.query_all_by_type(ty.key()),
        };
        Ok(nodes.into_iter().filter_map(|node| node.instance()).collect())
    }

    /// Push a new value into a pre-initialized input binding. The host
    /// framework requires the binding to exist before it can be live-updated,
    /// so only names configured with `set_input` before `begin()` are legal.
    pub fn set_input(&self, name: &str, value: Value) -> Result<(), HarnessError> {
        let fixture = self.fixture()?;
        if !self.initialized_inputs.iter().any(|n| n == name) {
            return Err(HarnessError::UninitializedInput(name.to_string()));
        }
        fixture.root_instance().set(name.to_string(), value);
        Ok(())
    }

    /// Subscribe to an output channel of the subject.
    pub fn on_output(
        &self,
        name: &str,
        action: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Result<(), HarnessError> {
        let subject = self.subject()?;
        if subject.subscribe(name, action) {
            Ok(())
        } else {
            Err(HarnessError::UnknownOutput(name.to_string()))
        }
    }

    /// Re-run change detection over the rendered tree.
    pub fn detect_changes(&self) -> Result<(), HarnessError> {
        self.fixture()?.detect_changes();
        Ok(())
    }

    /// End the active test and drop all cached references. Safe to call at
    /// any time, any number of times.
    pub fn teardown(&mut self) {
        tracing::debug!(was_active = self.in_progress, "session teardown");
        self.fixture = None;
        self.subject = None;
        self.subject_element = None;
        self.initialized_inputs.clear();
        self.in_progress = false;
    }
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Accumulated configuration for one test, consumed by `begin()`.
///
/// Configuration methods chain by value; `begin` consumes the builder, so
/// reconfiguring a begun test is unrepresentable.
pub struct TestBuilder {
    subject: ComponentType,
    mocks: Vec<ComponentType>,
    real: Vec<ComponentType>,
    providers: Vec<Provider>,
    imports: Vec<Module>,
    schemas: Vec<TemplateSchema>,
    inputs: Vec<(String, Value)>,
    watches: Vec<OutputWatch>,
    mock_setups: Vec<(ComponentType, MockSetup)>,
}

impl core::fmt::Debug for TestBuilder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TestBuilder")
            .field("subject", &self.subject)
            .field("mocks", &self.mocks)
            .field("real", &self.real)
            .field("providers", &self.providers)
            .field("imports", &self.imports)
            .field("schemas", &self.schemas)
            .field("inputs", &self.inputs)
            .field("watches", &self.watches.len())
            .field("mock_setups", &self.mock_setups.len())
            .finish()
    }
}

impl TestBuilder {
    /// Start configuring a test around `subject`. Prefer the
    /// [`test_component`] facade, which also guards against a test already
    /// being active.
    #[must_use]
    pub fn for_subject(subject: &ComponentType) -> Self {
        Self {
            subject: subject.clone(),
            mocks: Vec::new(),
            real: Vec::new(),
            providers: Vec::new(),
            imports: Vec::new(),
            schemas: Vec::new(),
            inputs: Vec::new(),
            watches: Vec::new(),
            mock_setups: Vec::new(),
        }
    }

    /// Give an input an initial value. The same names become live-updatable
    /// through `set_input` after `begin()`. Repeating a name replaces its
    /// value while keeping its position.
    #[must_use]
    pub fn set_input(mut self, name: impl Into<String>, value: Value) -> Self {
        let name = name.into();
        if let Some(entry) = self.inputs.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.inputs.push((name, value));
        }
        self
    }

    /// Watch an output channel of the subject. Multiple watches on one name
    /// all fire, in registration order.
    #[must_use]
    pub fn on_output(
        mut self,
        name: impl Into<String>,
        action: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Self {
        self.watches.push(OutputWatch::new(name, action));
        self
    }

    /// Replace the listed child component types with mocks.
    pub fn mock(mut self, types: &[ComponentType]) -> Result<Self, HarnessError> {
        for ty in types {
            if get_annotation(ty, AnnotationKind::Component).is_none() {
                return Err(HarnessError::NotAComponent(ty.name().to_string()));
            }
        }
        self.mocks = types.to_vec();
        Ok(self)
    }

    /// Declare real child component types to render as-is.
    #[must_use]
    pub fn use_components(mut self, types: &[ComponentType]) -> Self {
        self.real = types.to_vec();
        self
    }

    #[must_use]
    pub fn providers(mut self, providers: &[Provider]) -> Self {
        self.providers = providers.to_vec();
        self
    }

    #[must_use]
    pub fn import(mut self, modules: &[Module]) -> Self {
        self.imports = modules.to_vec();
        self
    }

    #[must_use]
    pub fn schemas(mut self, schemas: &[TemplateSchema]) -> Self {
        self.schemas = schemas.to_vec();
        self
    }

    /// Run `setup` against each fresh instance of the mock replacing `ty`.
    #[must_use]
    pub fn setup_mock(
        mut self,
        ty: &ComponentType,
        setup: impl Fn(&InstanceHandle) + Send + Sync + 'static,
    ) -> Self {
        self.mock_setups.push((ty.clone(), Arc::new(setup)));
        self
    }

    /// Build and render everything into the process-wide session, returning
    /// the subject instance.
    pub fn begin(self) -> Result<InstanceHandle, HarnessError> {
        let mut session = session();
        self.begin_in(&mut session)
    }

    /// Build and render everything into an explicit session context.
    pub fn begin_in(self, ctx: &mut SessionContext) -> Result<InstanceHandle, HarnessError> {
        if ctx.is_active() {
            return Err(HarnessError::TestAlreadyInProgress);
        }
        let _span = tracing::debug_span!("begin", subject = self.subject.name()).entered();

        let mut mock_types = Vec::with_capacity(self.mocks.len());
        for ty in &self.mocks {
            mock_types.push(mock_component(ty, self.combined_setup_for(ty))?);
        }
        let host = create_host(&self.subject, &self.inputs, &self.watches)?;

        let mut bed = TestBed::new();
        bed.declare(&host);
        bed.declare(&self.subject);
        bed.declare_all(&mock_types);
        bed.declare_all(&self.real);
        bed.provide_all(&self.providers);
        for module in &self.imports {
            bed.import(module);
        }
        for schema in &self.schemas {
            bed.schema(*schema);
        }

        let fixture = bed.instantiate(&host)?;
        let subject_node = fixture
            .query_by_type(self.subject.key())
            .ok_or_else(|| HarnessError::SubjectNotRendered(self.subject.name().to_string()))?;
        let subject_instance = subject_node
            .instance()
            .ok_or_else(|| HarnessError::SubjectNotRendered(self.subject.name().to_string()))?;

        ctx.fixture = Some(fixture);
        ctx.subject = Some(subject_instance.clone());
        ctx.subject_element = Some(subject_node);
        ctx.initialized_inputs = self.inputs.iter().map(|(name, _)| name.clone()).collect();
        ctx.in_progress = true;
        Ok(subject_instance)
    }

    /// All setups registered for `ty`, folded into one callback that applies
    /// them in registration order.
    fn combined_setup_for(&self, ty: &ComponentType) -> Option<MockSetup> {
        let setups: Vec<MockSetup> = self
            .mock_setups
            .iter()
            .filter(|(t, _)| t == ty)
            .map(|(_, setup)| Arc::clone(setup))
            .collect();
        if setups.is_empty() {
            return None;
        }
        Some(Arc::new(move |instance: &InstanceHandle| {
            for setup in &setups {
                setup(instance);
            }
        }))
    }
}

// --- Process-wide facade ----------------------------------------------------

static SESSION: Mutex<SessionContext> = Mutex::new(SessionContext::new());

fn session() -> MutexGuard<'static, SessionContext> {
    SESSION.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Start configuring a test around `subject`.
pub fn test_component(subject: &ComponentType) -> Result<TestBuilder, HarnessError> {
    if session().is_active() {
        return Err(HarnessError::TestAlreadyInProgress);
    }
    Ok(TestBuilder::for_subject(subject))
}

/// See [`SessionContext::subject`].
pub fn subject() -> Result<InstanceHandle, HarnessError> {
    session().subject()
}

/// See [`SessionContext::subject_element`].
pub fn subject_element() -> Result<RenderedNode, HarnessError> {
    session().subject_element()
}

/// See [`SessionContext::fixture`].
pub fn fixture() -> Result<Fixture, HarnessError> {
    session().fixture()
}

/// See [`SessionContext::element`].
pub fn element(selector: &str) -> Result<Option<RenderedNode>, HarnessError> {
    session().element(selector)
}

/// See [`SessionContext::elements`].
pub fn elements(selector: &str) -> Result<Vec<RenderedNode>, HarnessError> {
    session().elements(selector)
}

/// See [`SessionContext::component`].
pub fn component<'a>(
    query: impl Into<ComponentQuery<'a>>,
) -> Result<Option<InstanceHandle>, HarnessError> {
    session().component(query.into())
}

/// See [`SessionContext::components`].
pub fn components<'a>(
    query: impl Into<ComponentQuery<'a>>,
) -> Result<Vec<InstanceHandle>, HarnessError> {
    session().components(query.into())
}

/// See [`SessionContext::set_input`].
pub fn set_input(name: &str, value: Value) -> Result<(), HarnessError> {
    session().set_input(name, value)
}

/// See [`SessionContext::on_output`].
pub fn on_output(
    name: &str,
    action: impl Fn(&Value) + Send + Sync + 'static,
) -> Result<(), HarnessError> {
    session().on_output(name, action)
}

/// See [`SessionContext::detect_changes`].
pub fn detect_changes() -> Result<(), HarnessError> {
    session().detect_changes()
}

/// See [`SessionContext::teardown`].
pub fn teardown() {
    session().teardown();
}
