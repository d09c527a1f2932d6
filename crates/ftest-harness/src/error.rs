#![forbid(unsafe_code)]

//! The umbrella error type for the harness surface.
//!
//! Every violation is detected synchronously at the call that breaks the
//! contract and returned immediately with a message naming the violated
//! precondition. The harness performs no I/O, so there are no transient
//! failures and nothing is retried.

use std::fmt;

use ftest_core::reflection::ReflectionError;
use ftest_core::selector::SelectorError;
use ftest_core::testbed::TestBedError;
use ftest_mock::MockError;

/// Errors surfaced by the session, builder, and accessor API.
#[derive(Debug)]
pub enum HarnessError {
    /// An accessor was used with no active test.
    NoActiveTest,
    /// A test was configured while another is active.
    TestAlreadyInProgress,
    /// `set_input` after `begin()` on a name with no configured initializer.
    UninitializedInput(String),
    /// A type with no component annotation was listed for mocking.
    NotAComponent(String),
    /// `on_output` named a channel the subject does not declare.
    UnknownOutput(String),
    /// The rendered host contains no instance of the subject.
    SubjectNotRendered(String),
    Selector(SelectorError),
    Reflection(ReflectionError),
    Mock(MockError),
    TestBed(TestBedError),
}

impl fmt::Display for HarnessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoActiveTest => {
                write!(f, "no test is active; start one with begin() before using this accessor")
            }
            Self::TestAlreadyInProgress => {
                write!(f, "a test is already in progress; tear it down before configuring another")
            }
            Self::UninitializedInput(name) => write!(
                f,
                "input '{name}' cannot be set after begin(): provide an initial value \
                 with set_input() at configuration time"
            ),
            Self::NotAComponent(name) => {
                write!(f, "cannot mock {name}: only components can be mocked")
            }
            Self::UnknownOutput(name) => {
                write!(f, "the subject declares no output channel named '{name}'")
            }
            Self::SubjectNotRendered(name) => {
                write!(f, "the subject {name} did not render under its own selector")
            }
            Self::Selector(err) => write!(f, "{err}"),
            Self::Reflection(err) => write!(f, "{err}"),
            Self::Mock(err) => write!(f, "{err}"),
            Self::TestBed(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for HarnessError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Selector(err) => Some(err),
            Self::Reflection(err) => Some(err),
            Self::Mock(err) => Some(err),
            Self::TestBed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SelectorError> for HarnessError {
    fn from(err: SelectorError) -> Self {
        Self::Selector(err)
    }
}

impl From<ReflectionError> for HarnessError {
    fn from(err: ReflectionError) -> Self {
        Self::Reflection(err)
    }
}

impl From<MockError> for HarnessError {
    fn from(err: MockError) -> Self {
        Self::Mock(err)
    }
}

impl From<TestBedError> for HarnessError {
    fn from(err: TestBedError) -> Self {
        Self::TestBed(err)
    }
}
