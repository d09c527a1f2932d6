#![forbid(unsafe_code)]

//! Synthetic host-type construction.
//!
//! A host wraps the subject under test: its template is the subject's own
//! selector synthesized to markup, with one property-binding attribute per
//! initialized input (`[name]="name"`) and one event-binding attribute per
//! watched output (`(name)="name($event)"`). The host's factory seeds each
//! initializer value onto the matching host field and installs one grouped
//! handler per output name, so every watcher registered for that name fires
//! in registration order on each emission.

use std::sync::Arc;

use ftest_core::component::ComponentType;
use ftest_core::instance::Value;
use ftest_core::reflection::selector_of;
use ftest_core::selector::parse;

use crate::error::HarnessError;

/// A callback observing one named output of the subject.
pub type WatchCallback = Arc<dyn Fn(&Value) + Send + Sync>;

/// One output subscription declared at configuration time.
#[derive(Clone)]
pub struct OutputWatch {
    pub name: String,
    pub action: WatchCallback,
}

impl OutputWatch {
    pub fn new(name: impl Into<String>, action: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            action: Arc::new(action),
        }
    }
}

/// Synthesize the host type for `subject`.
pub fn create_host(
    subject: &ComponentType,
    input_initializers: &[(String, Value)],
    output_watches: &[OutputWatch],
) -> Result<ComponentType, HarnessError> {
    let selector = selector_of(subject)?;
    let mut element = parse(&selector)?.synthesize();

    for name in distinct(input_initializers.iter().map(|(name, _)| name)) {
        element.set_attribute(format!("[{name}]"), name.clone());
    }
    for name in distinct(output_watches.iter().map(|watch| &watch.name)) {
        element.set_attribute(format!("({name})"), format!("{name}($event)"));
    }
    let template = element.outer_html();

    let initializers: Vec<(String, Value)> = input_initializers.to_vec();
    let groups = group_watches(output_watches);

    Ok(ComponentType::define(format!("{}Host", subject.name()))
        .template(template)
        .factory(move |instance| {
            for (name, value) in &initializers {
                instance.set(name.clone(), value.clone());
            }
            for (name, callbacks) in &groups {
                let callbacks = callbacks.clone();
                instance.set_handler(
                    name.clone(),
                    Arc::new(move |payload: &Value| {
                        for callback in &callbacks {
                            callback(payload);
                        }
                    }),
                );
            }
            Ok(())
        })
        .build())
}

fn distinct<'a>(names: impl Iterator<Item = &'a String>) -> Vec<&'a String> {
    let mut out: Vec<&String> = Vec::new();
    for name in names {
        if !out.contains(&name) {
            out.push(name);
        }
    }
    out
}

/// Group watches by output name, keeping first-seen group order and
/// registration order within each group.
fn group_watches(watches: &[OutputWatch]) -> Vec<(String, Vec<WatchCallback>)> {
    let mut groups: Vec<(String, Vec<WatchCallback>)> = Vec::new();
    for watch in watches {
        if let Some((_, callbacks)) = groups.iter_mut().find(|(name, _)| *name == watch.name) {
            callbacks.push(Arc::clone(&watch.action));
        } else {
            groups.push((watch.name.clone(), vec![Arc::clone(&watch.action)]));
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::{OutputWatch, create_host};
    use ftest_core::component::ComponentType;
    use ftest_core::reflection::{Annotation, AnnotationKind, TemplateSpec, get_annotation};
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    fn subject_type() -> ComponentType {
        ComponentType::define("Gauge")
            .selector("gauge-dial")
            .input("x")
            .input("y")
            .output("peaked")
            .build()
    }

    fn host_template(host: &ComponentType) -> String {
        match get_annotation(host, AnnotationKind::Component) {
            Some(Annotation::Component(annotation)) => match annotation.template {
                TemplateSpec::Markup(text) => text,
                _ => panic!("host template is not markup"),
            },
            _ => panic!("host carries no component annotation"),
        }
    }

    #[test]
    fn template_holds_one_binding_per_distinct_channel() {
        let inputs = vec![("x".to_string(), json!(1)), ("y".to_string(), json!("two"))];
        let host = create_host(&subject_type(), &inputs, &[]).unwrap();
        let template = host_template(&host);
        assert_eq!(
            template,
            "<gauge-dial [x]=\"x\" [y]=\"y\"></gauge-dial>"
        );
        assert_eq!(template.matches("[x]").count(), 1);
        assert!(!template.contains('('));
    }

    #[test]
    fn duplicate_watch_names_produce_one_event_binding() {
        let watches = vec![
            OutputWatch::new("peaked", |_| {}),
            OutputWatch::new("peaked", |_| {}),
        ];
        let host = create_host(&subject_type(), &[], &watches).unwrap();
        let template = host_template(&host);
        assert_eq!(template.matches("(peaked)").count(), 1);
        assert!(template.contains("(peaked)=\"peaked($event)\""));
    }

    #[test]
    fn factory_seeds_initializers_onto_host_fields() {
        let inputs = vec![("title".to_string(), json!("Schwoosh!"))];
        let subject = ComponentType::define("Card")
            .selector("card-face")
            .input("title")
            .build();
        let host = create_host(&subject, &inputs, &[]).unwrap();
        let instance = host.instantiate().unwrap();
        assert_eq!(instance.get("title"), Some(json!("Schwoosh!")));
    }

    #[test]
    fn grouped_watchers_fire_in_registration_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&seen);
        let second = Arc::clone(&seen);
        let watches = vec![
            OutputWatch::new("peaked", move |payload| {
                first.lock().unwrap().push(("first", payload.clone()));
            }),
            OutputWatch::new("peaked", move |payload| {
                second.lock().unwrap().push(("second", payload.clone()));
            }),
        ];
        let host = create_host(&subject_type(), &[], &watches).unwrap();
        let instance = host.instantiate().unwrap();
        assert!(instance.invoke_handler("peaked", &json!(99)));
        let seen = seen.lock().unwrap();
        assert_eq!(seen.as_slice(), [("first", json!(99)), ("second", json!(99))]);
    }

    #[test]
    fn a_subject_without_a_selector_cannot_be_hosted() {
        let viewless = ComponentType::define("Viewless").template("<div></div>").build();
        assert!(create_host(&viewless, &[], &[]).is_err());
    }
}
