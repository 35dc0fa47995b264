//! Structured decode diagnostics.
//!
//! Every decode failure is reported as a [`YamlError`] envelope holding either
//! a [`TextError`] (the document is wrong) or a [`StructShapeError`] (the
//! target type is wrong). Messages are rendered only when the error is
//! displayed, so building an error is plain data assembly.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::node::{NodeRef, Tag};
use crate::types::TypeDescriptor;

/// Meta key holding the line of an earlier conflicting definition.
pub const META_LINE_NUM: &str = "line_num";

const SNIPPET_LIMIT: usize = 10;
const SNIPPET_HEAD: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// Why a document node could not be assigned to its target.
pub enum ErrorCause {
    /// The document has a key the target struct does not declare.
    UnknownField,
    /// A mapping key, or a struct field, is bound twice.
    KeyAlreadyDefined,
    /// The node kind does not fit the target, e.g. a mapping where a
    /// sequence was expected.
    WrongType,
}

impl ErrorCause {
    pub fn label(self) -> &'static str {
        match self {
            ErrorCause::UnknownField => "unknown field",
            ErrorCause::KeyAlreadyDefined => "key already defined",
            ErrorCause::WrongType => "incorrect yaml node",
        }
    }
}

impl fmt::Display for ErrorCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A problem in the document text, tied to the node where it was found.
#[derive(Debug, Clone)]
pub struct TextError<'a> {
    node: NodeRef<'a>,
    name: Option<String>,
    cause: ErrorCause,
    target: &'a TypeDescriptor,
    meta: BTreeMap<String, String>,
}

impl<'a> TextError<'a> {
    pub fn node(&self) -> NodeRef<'a> {
        self.node
    }

    /// Field name known at the failure site, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn cause(&self) -> ErrorCause {
        self.cause
    }

    /// Type the node was being decoded into.
    pub fn target(&self) -> &'a TypeDescriptor {
        self.target
    }

    pub fn meta(&self) -> &BTreeMap<String, String> {
        &self.meta
    }

    pub fn line(&self) -> usize {
        self.node.line()
    }

    /// Owned, serializable summary that outlives the node tree.
    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic {
            line: self.node.line(),
            column: self.node.column(),
            cause: self.cause,
            node_tag: self.node.tag(),
            target: self.target.name().to_string(),
            name: self.name.clone(),
            path: self.node.path().to_string(),
            message: self.to_string(),
        }
    }
}

impl fmt::Display for TextError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&render(
            self.cause,
            self.node,
            self.name.as_deref(),
            self.target,
            &self.meta,
        ))
    }
}

impl std::error::Error for TextError<'_> {}

/// Renders the one-line message for a text error.
pub fn render(
    cause: ErrorCause,
    node: NodeRef<'_>,
    name: Option<&str>,
    target: &TypeDescriptor,
    meta: &BTreeMap<String, String>,
) -> String {
    let line = node.line();
    let target = target.name();
    match cause {
        ErrorCause::UnknownField => {
            format!("line {line}: field {} not found in type {target}", name.unwrap_or_default())
        }
        ErrorCause::KeyAlreadyDefined => match name {
            Some(name) => format!("line {line}: field {name} already set in type {target}"),
            None => {
                let prior = meta.get(META_LINE_NUM).map(String::as_str).unwrap_or_default();
                format!(
                    "line {line}: mapping key {} already defined at line {prior}",
                    quote(node.value())
                )
            }
        },
        ErrorCause::WrongType => format!(
            "line {line}: cannot unmarshal {}{} into {target}",
            node.tag().short(),
            value_snippet(node.tag(), node.value())
        ),
    }
}

/// Double-quotes `value`, escaping quotes, backslashes and control
/// characters. Other characters, combining marks included, stay literal.
fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            c if c < ' ' || c == '\x7f' => out.push_str(&format!("\\x{:02x}", c as u32)),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Backtick-quoted excerpt of a scalar value; empty for containers.
pub fn value_snippet(tag: Tag, value: &str) -> String {
    if tag.is_container() {
        return String::new();
    }
    if value.chars().count() > SNIPPET_LIMIT {
        let head: String = value.chars().take(SNIPPET_HEAD).collect();
        format!(" `{head}...`")
    } else {
        format!(" `{value}`")
    }
}

/// Defect in the target type itself rather than in the document.
#[derive(Debug, Error)]
#[error("{underlying}")]
pub struct StructShapeError {
    #[source]
    underlying: Box<dyn std::error::Error + Send + Sync + 'static>,
}

impl StructShapeError {
    pub fn underlying(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
        &*self.underlying
    }
}

#[derive(Debug, Error)]
/// Structured cause carried by a [`YamlError`].
pub enum Cause<'a> {
    #[error(transparent)]
    Text(TextError<'a>),
    #[error(transparent)]
    StructShape(StructShapeError),
}

/// Error envelope returned for every decode failure.
///
/// Displays as the rendered message of its cause. `original` keeps the short
/// message the failure site produced.
#[derive(Debug, Error)]
#[error("{cause}")]
pub struct YamlError<'a> {
    cause: Cause<'a>,
    original: String,
}

impl<'a> YamlError<'a> {
    pub fn cause(&self) -> &Cause<'a> {
        &self.cause
    }

    pub fn into_cause(self) -> Cause<'a> {
        self.cause
    }

    pub fn original(&self) -> &str {
        &self.original
    }

    pub fn as_text_error(&self) -> Option<&TextError<'a>> {
        match &self.cause {
            Cause::Text(err) => Some(err),
            Cause::StructShape(_) => None,
        }
    }

    pub fn as_struct_shape_error(&self) -> Option<&StructShapeError> {
        match &self.cause {
            Cause::Text(_) => None,
            Cause::StructShape(err) => Some(err),
        }
    }

    pub fn is_struct_shape(&self) -> bool {
        matches!(self.cause, Cause::StructShape(_))
    }

    pub fn to_diagnostic(&self) -> Option<Diagnostic> {
        self.as_text_error().map(TextError::to_diagnostic)
    }

    fn text(
        original: impl fmt::Display,
        node: NodeRef<'a>,
        target: &'a TypeDescriptor,
        cause: ErrorCause,
        name: &str,
        meta: BTreeMap<String, String>,
    ) -> Self {
        Self {
            cause: Cause::Text(TextError {
                node,
                name: (!name.is_empty()).then(|| name.to_string()),
                cause,
                target,
                meta,
            }),
            original: original.to_string(),
        }
    }
}

/// Document key `name` has no matching field in `target`.
pub fn new_unknown_field_error<'a>(
    original: impl fmt::Display,
    node: NodeRef<'a>,
    target: &'a TypeDescriptor,
    name: &str,
) -> YamlError<'a> {
    YamlError::text(original, node, target, ErrorCause::UnknownField, name, BTreeMap::new())
}

/// A key is bound twice. An empty `name` means the same key appears twice in
/// one mapping, first at `prior_line`; otherwise two keys resolved to field
/// `name`.
pub fn new_already_defined_error<'a>(
    original: impl fmt::Display,
    node: NodeRef<'a>,
    target: &'a TypeDescriptor,
    name: &str,
    prior_line: usize,
) -> YamlError<'a> {
    let meta = BTreeMap::from([(META_LINE_NUM.to_string(), prior_line.to_string())]);
    YamlError::text(original, node, target, ErrorCause::KeyAlreadyDefined, name, meta)
}

/// `node` cannot be assigned to `target` because of its kind or tag.
pub fn new_wrong_type_error<'a>(
    original: impl fmt::Display,
    node: NodeRef<'a>,
    target: &'a TypeDescriptor,
) -> YamlError<'a> {
    YamlError::text(original, node, target, ErrorCause::WrongType, "", BTreeMap::new())
}

/// The target type's declared shape is invalid.
pub fn new_struct_shape_error<'a, E>(original: E) -> YamlError<'a>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let message = original.to_string();
    YamlError {
        cause: Cause::StructShape(StructShapeError {
            underlying: Box::new(original),
        }),
        original: message,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Owned snapshot of a [`TextError`].
pub struct Diagnostic {
    pub line: usize,
    pub column: usize,
    pub cause: ErrorCause,
    pub node_tag: Tag,
    /// Display name of the target type.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Key/index path to the node; empty at the document root.
    pub path: String,
    pub message: String,
}

/// All errors from one decode pass, in the order they were found.
#[derive(Debug)]
pub struct DecodeErrors<'a> {
    errors: Vec<YamlError<'a>>,
}

impl<'a> DecodeErrors<'a> {
    pub(crate) fn new(errors: Vec<YamlError<'a>>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[YamlError<'a>] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<YamlError<'a>> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, YamlError<'a>> {
        self.errors.iter()
    }

    /// Text errors only; struct-shape errors carry no node.
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.errors.iter().filter_map(YamlError::to_diagnostic).collect()
    }
}

impl fmt::Display for DecodeErrors<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("yaml: unmarshal errors:")?;
        for err in &self.errors {
            write!(f, "\n  {err}")?;
        }
        Ok(())
    }
}

impl std::error::Error for DecodeErrors<'_> {}

impl<'e, 'a> IntoIterator for &'e DecodeErrors<'a> {
    type Item = &'e YamlError<'a>;
    type IntoIter = std::slice::Iter<'e, YamlError<'a>>;

    fn into_iter(self) -> Self::IntoIter {
        self.errors.iter()
    }
}
