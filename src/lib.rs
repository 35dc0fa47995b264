//! Typed decoding of YAML documents with structured, line-addressed
//! diagnostics.
//!
//! [`parser::parse`] turns text into a [`NodeTree`]; [`Decoder`] assigns that
//! tree to a [`TypeDescriptor`] and reports failures as [`YamlError`]s that can
//! be printed as one-line messages or inspected as data.

pub mod decode;
pub mod diagnostics;
pub mod error;
pub mod node;
pub mod parser;
pub mod types;

use serde_json::Value as JsonValue;

pub use decode::{decode, DecodeOptions, Decoder, ErrorPolicy};
pub use diagnostics::{
    new_already_defined_error, new_struct_shape_error, new_unknown_field_error,
    new_wrong_type_error, Cause, DecodeErrors, Diagnostic, ErrorCause, StructShapeError,
    TextError, YamlError,
};
pub use error::{Error, ParseError, ShapeDefect};
pub use node::{NodeKind, NodePath, NodeRef, NodeTree, PathSegment, Tag};
pub use parser::parse;
pub use types::{FieldDescriptor, Shape, TypeDescriptor};

/// Parses and decodes `input` in one step.
///
/// The returned error owns its data; use [`parse`] and [`Decoder::decode`]
/// directly to keep the borrowed [`YamlError`]s.
pub fn unmarshal(
    input: &str,
    target: &TypeDescriptor,
    options: &DecodeOptions,
) -> Result<JsonValue, Error> {
    let tree = parse(input)?;
    let value = decode(&tree, target, options)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{unmarshal, DecodeOptions, Error, FieldDescriptor, TypeDescriptor};

    #[test]
    fn unmarshal_decodes_document() {
        let ty = TypeDescriptor::structure(
            "s",
            vec![FieldDescriptor::new("name", TypeDescriptor::string())],
        );
        let value = unmarshal("name: x\n", &ty, &DecodeOptions::new()).unwrap();
        assert_eq!(value, json!({"name": "x"}));
    }

    #[test]
    fn unmarshal_reports_parse_errors() {
        let err = unmarshal("a: 'open\n", &TypeDescriptor::any(), &DecodeOptions::new())
            .unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().contains("unterminated quoted string"));
    }

    #[test]
    fn unmarshal_keeps_decode_diagnostics() {
        let ty = TypeDescriptor::structure(
            "s",
            vec![FieldDescriptor::new("tags", TypeDescriptor::sequence(TypeDescriptor::string()))],
        );
        let err = unmarshal("tags:\n  a: b\n", &ty, &DecodeOptions::new()).unwrap_err();
        let Error::Decode { report, diagnostics } = err else {
            panic!("expected decode error");
        };
        assert_eq!(
            report,
            "yaml: unmarshal errors:\n  line 2: cannot unmarshal !!map into []string"
        );
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].path, "tags");
    }
}
