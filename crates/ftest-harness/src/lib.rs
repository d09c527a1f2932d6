#![forbid(unsafe_code)]

//! Test-author surface for frankentest.
//!
//! The usual flow: configure a [`TestBuilder`] via [`test_component`], call
//! `begin()`, drive and query the subject through the free accessors, and
//! finish with [`teardown`]:
//!
//! ```
//! use ftest_core::component::ComponentType;
//! use ftest_harness::{teardown, test_component};
//! use ftest_mock::{Spy, set_mock_provider};
//! use serde_json::json;
//!
//! set_mock_provider(Spy::factory());
//!
//! let child = ComponentType::define("Child")
//!     .selector("child-tag")
//!     .output("save")
//!     .build();
//! let subject = ComponentType::define("Parent")
//!     .selector("parent-tag")
//!     .template("<child-tag></child-tag>")
//!     .input("title")
//!     .build();
//!
//! let instance = test_component(&subject)
//!     .unwrap()
//!     .mock(&[child.clone()])
//!     .unwrap()
//!     .set_input("title", json!("Schwoosh!"))
//!     .begin()
//!     .unwrap();
//! assert_eq!(instance.get("title"), Some(json!("Schwoosh!")));
//! teardown();
//! ```

pub mod error;
pub mod host;
pub mod session;

pub use error::HarnessError;
pub use host::{OutputWatch, WatchCallback, create_host};
pub use session::{
    ComponentQuery, SessionContext, TestBuilder, component, components, detect_changes, element,
    elements, fixture, on_output, set_input, subject, subject_element, teardown, test_component,
};
