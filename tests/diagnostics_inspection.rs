use std::error::Error as _;

use serde_json::json;

use typed_yaml::diagnostics::META_LINE_NUM;
use typed_yaml::{
    decode, parse, unmarshal, Cause, DecodeOptions, Error, ErrorCause, FieldDescriptor,
    NodeKind, PathSegment, Tag, TypeDescriptor,
};

fn server() -> TypeDescriptor {
    TypeDescriptor::structure(
        "config.Server",
        vec![
            FieldDescriptor::new("host", TypeDescriptor::string()),
            FieldDescriptor::new("port", TypeDescriptor::uint()).with_alias("listen"),
        ],
    )
}

fn config() -> TypeDescriptor {
    TypeDescriptor::structure(
        "config.Root",
        vec![FieldDescriptor::new(
            "servers",
            TypeDescriptor::sequence(server()),
        )],
    )
}

const DOC: &str = "servers:
  - host: a
    port: 80
  - host: b
    port: [1, 2]
    listen: 81
";

#[test]
fn errors_expose_node_target_and_path() {
    let tree = parse(DOC).unwrap();
    let ty = config();
    let err = decode(&tree, &ty, &DecodeOptions::new()).unwrap_err();
    assert_eq!(err.len(), 2);

    let wrong = err.errors()[0].as_text_error().unwrap();
    assert_eq!(wrong.cause(), ErrorCause::WrongType);
    assert_eq!(wrong.node().tag(), Tag::Seq);
    assert_eq!(wrong.node().kind(), NodeKind::Sequence);
    assert_eq!(wrong.target().name(), "uint");
    assert_eq!(wrong.target().expected_kind(), NodeKind::Scalar);
    assert_eq!(
        wrong.node().path().segments(),
        &[
            PathSegment::Key("servers".to_string()),
            PathSegment::Index(1),
            PathSegment::Key("port".to_string()),
        ]
    );
    assert_eq!(err.errors()[0].to_string(), "line 5: cannot unmarshal !!seq into uint");

    let alias = err.errors()[1].as_text_error().unwrap();
    assert_eq!(alias.cause(), ErrorCause::KeyAlreadyDefined);
    assert_eq!(alias.name(), Some("listen"));
    assert_eq!(alias.meta().get(META_LINE_NUM).map(String::as_str), Some("5"));
    assert_eq!(
        err.errors()[1].to_string(),
        "line 6: field listen already set in type config.Server"
    );

    for e in err.iter() {
        assert_eq!(e.original(), e.to_string());
    }
}

#[test]
fn cause_unwraps_into_text_error() {
    let tree = parse("tags: x\n").unwrap();
    let ty = TypeDescriptor::structure(
        "s",
        vec![FieldDescriptor::new("tags", TypeDescriptor::sequence(TypeDescriptor::string()))],
    );
    let err = decode(&tree, &ty, &DecodeOptions::new()).unwrap_err();
    let first = err.into_errors().remove(0);
    assert_eq!(first.original(), first.to_string());
    assert_eq!(first.original(), "line 1: cannot unmarshal !!str `x` into []string");
    assert!(first.source().is_none());
    match first.into_cause() {
        Cause::Text(text) => {
            assert_eq!(text.line(), 1);
            assert_eq!(text.to_string(), "line 1: cannot unmarshal !!str `x` into []string");
        }
        Cause::StructShape(_) => panic!("expected a text error"),
    }
}

#[test]
fn owned_error_carries_serializable_diagnostics() {
    let err = unmarshal(DOC, &config(), &DecodeOptions::new()).unwrap_err();
    let Error::Decode { diagnostics, .. } = err else {
        panic!("expected decode error");
    };
    let first = serde_json::to_value(&diagnostics[0]).unwrap();
    assert_eq!(
        first,
        json!({
            "line": 5,
            "column": 11,
            "cause": "wrong_type",
            "node_tag": "seq",
            "target": "uint",
            "path": "servers[1].port",
            "message": "line 5: cannot unmarshal !!seq into uint",
        })
    );
    assert_eq!(diagnostics[1].name.as_deref(), Some("listen"));
}

#[test]
fn null_values_decode_for_any_target() {
    let ty = config();
    let input = "servers:\n  - host: ~\n    port:\n";
    let value = unmarshal(input, &ty, &DecodeOptions::new()).unwrap();
    assert_eq!(value, json!({"servers": [{"host": null, "port": null}]}));
}

#[test]
fn cause_labels_are_stable() {
    assert_eq!(ErrorCause::UnknownField.to_string(), "unknown field");
    assert_eq!(ErrorCause::KeyAlreadyDefined.to_string(), "key already defined");
    assert_eq!(ErrorCause::WrongType.to_string(), "incorrect yaml node");
}
