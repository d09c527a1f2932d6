#![forbid(unsafe_code)]

//! Property tests for the selector parser/synthesizer.
//!
//! Invariants: parsing a composed selector recovers every token; a
//! synthesized element always matches the selector it was synthesized from;
//! synthesized markup survives a scan round-trip.

use ftest_core::markup::scan_template;
use ftest_core::selector::parse;
use proptest::prelude::*;

fn ident() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,8}"
}

fn tag() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,8}"
}

fn attr_value() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9 _.-]{0,12}"
}

fn compose(
    tag: &str,
    id: &Option<String>,
    classes: &[String],
    attributes: &[(String, String)],
) -> String {
    let mut selector = tag.to_string();
    if let Some(id) = id {
        selector.push('#');
        selector.push_str(id);
    }
    for class in classes {
        selector.push('.');
        selector.push_str(class);
    }
    for (name, value) in attributes {
        if value.is_empty() {
            selector.push_str(&format!("[{name}]"));
        } else {
            selector.push_str(&format!("[{name}='{value}']"));
        }
    }
    selector
}

proptest! {
    #[test]
    fn parse_recovers_every_token(
        tag in tag(),
        id in proptest::option::of(ident()),
        classes in proptest::collection::vec(ident(), 0..4),
        attributes in proptest::collection::vec((ident(), attr_value()), 0..3),
    ) {
        // Attribute names must be distinct for the recovered list to be
        // comparable (later duplicates overwrite on synthesis).
        let mut names: Vec<&String> = attributes.iter().map(|(n, _)| n).collect();
        names.sort();
        names.dedup();
        prop_assume!(names.len() == attributes.len());

        let selector = compose(&tag, &id, &classes, &attributes);
        let ast = parse(&selector).unwrap();

        prop_assert_eq!(ast.tag(), tag.as_str());
        prop_assert_eq!(ast.id(), id.as_deref());
        prop_assert_eq!(ast.classes(), classes.as_slice());
        let parsed_attrs: Vec<(String, String)> = ast.attributes().to_vec();
        prop_assert_eq!(parsed_attrs, attributes);
    }

    #[test]
    fn synthesized_element_matches_its_selector(
        tag in tag(),
        id in proptest::option::of(ident()),
        classes in proptest::collection::vec(ident(), 0..4),
        attributes in proptest::collection::vec((ident(), attr_value()), 0..3),
    ) {
        // Distinct attribute names that don't collide with the id/class
        // attributes synthesis itself writes; a duplicate would overwrite
        // and the earlier constraint could no longer hold.
        let mut names: Vec<&String> = attributes.iter().map(|(n, _)| n).collect();
        names.sort();
        names.dedup();
        prop_assume!(names.len() == attributes.len());
        prop_assume!(!attributes.iter().any(|(n, _)| n == "id" || n == "class"));

        let selector = compose(&tag, &id, &classes, &attributes);
        let ast = parse(&selector).unwrap();
        prop_assert!(ast.matches(&ast.synthesize()));
    }

    #[test]
    fn synthesized_markup_survives_a_scan_round_trip(
        tag in tag(),
        id in proptest::option::of(ident()),
        classes in proptest::collection::vec(ident(), 0..4),
    ) {
        let selector = compose(&tag, &id, &classes, &[]);
        let element = parse(&selector).unwrap().synthesize();
        let scanned = scan_template(&element.outer_html()).unwrap();
        prop_assert_eq!(scanned.len(), 1);
        prop_assert_eq!(&scanned[0], &element);
    }
}
