//! Assignment engine: walks a node tree against a [`TypeDescriptor`] and
//! builds a JSON value, reporting every failure as a [`YamlError`].

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Number as JsonNumber, Value as JsonValue};
use tracing::{debug, trace};

use crate::diagnostics::{
    new_already_defined_error, new_struct_shape_error, new_unknown_field_error,
    new_wrong_type_error, render, DecodeErrors, ErrorCause, YamlError, META_LINE_NUM,
};
use crate::error::ShapeDefect;
use crate::node::{NodeRef, NodeTree, Tag};
use crate::types::{Shape, StructLayout, TypeDescriptor};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How many errors a decode pass reports.
pub enum ErrorPolicy {
    /// Keep going after an error and report all of them.
    #[default]
    CollectAll,
    /// Stop at the first error.
    FirstError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
/// Decoder configuration.
pub struct DecodeOptions {
    /// Report document keys that match no struct field. Off by default, in
    /// which case such keys are ignored.
    pub known_fields: bool,
    pub error_policy: ErrorPolicy,
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn known_fields(mut self, enabled: bool) -> Self {
        self.known_fields = enabled;
        self
    }

    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

/// Reusable decoder.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    options: DecodeOptions,
}

impl Decoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    pub fn set_known_fields(&mut self, enabled: bool) {
        self.options.known_fields = enabled;
    }

    /// Decodes `tree` into a value shaped like `target`.
    ///
    /// Errors borrow both the tree and the descriptor so callers can inspect
    /// the offending node.
    pub fn decode<'a>(
        &self,
        tree: &'a NodeTree,
        target: &'a TypeDescriptor,
    ) -> Result<JsonValue, DecodeErrors<'a>> {
        let Some(root) = tree.root() else {
            return Ok(JsonValue::Null);
        };
        trace!(target_type = target.name(), nodes = tree.len(), "decoding document");

        let mut state = DecodeState::new(&self.options);
        let value = state.unmarshal(root, target);
        if state.errors.is_empty() {
            Ok(value.unwrap_or(JsonValue::Null))
        } else {
            Err(DecodeErrors::new(state.errors))
        }
    }
}

/// Decodes `tree` with `options`. See [`Decoder::decode`].
pub fn decode<'a>(
    tree: &'a NodeTree,
    target: &'a TypeDescriptor,
    options: &DecodeOptions,
) -> Result<JsonValue, DecodeErrors<'a>> {
    Decoder::new(options.clone()).decode(tree, target)
}

/// Decoding stopped early; the reason is already in `DecodeState::errors`.
struct Abort;

type Step<T> = Result<T, Abort>;

struct DecodeState<'o, 'a> {
    options: &'o DecodeOptions,
    errors: Vec<YamlError<'a>>,
    /// Struct layouts keyed by descriptor address; descriptors are borrowed
    /// for the whole pass, so addresses stay unique.
    layouts: HashMap<*const TypeDescriptor, Rc<StructLayout<'a>>>,
}

impl<'o, 'a> DecodeState<'o, 'a> {
    fn new(options: &'o DecodeOptions) -> Self {
        Self {
            options,
            errors: Vec::new(),
            layouts: HashMap::new(),
        }
    }

    fn layout(&mut self, target: &'a TypeDescriptor) -> Result<Rc<StructLayout<'a>>, ShapeDefect> {
        let addr: *const TypeDescriptor = target;
        if let Some(layout) = self.layouts.get(&addr) {
            return Ok(Rc::clone(layout));
        }
        let layout = Rc::new(target.layout()?);
        self.layouts.insert(addr, Rc::clone(&layout));
        Ok(layout)
    }

    fn record(&mut self, err: YamlError<'a>) -> Step<()> {
        debug!(error = %err, "decode error");
        let fatal = err.is_struct_shape() || self.options.error_policy == ErrorPolicy::FirstError;
        self.errors.push(err);
        if fatal {
            Err(Abort)
        } else {
            Ok(())
        }
    }

    fn wrong_type(&mut self, node: NodeRef<'a>, target: &'a TypeDescriptor) -> Step<JsonValue> {
        let original = site_message(ErrorCause::WrongType, node, "", target, None);
        self.record(new_wrong_type_error(original, node, target))?;
        Ok(JsonValue::Null)
    }

    fn unmarshal(&mut self, node: NodeRef<'a>, target: &'a TypeDescriptor) -> Step<JsonValue> {
        if node.tag() == Tag::Null {
            return Ok(JsonValue::Null);
        }

        match target.shape() {
            Shape::Any => self.any(node, target),
            Shape::Bool => match node.tag() {
                Tag::Bool => Ok(JsonValue::Bool(parse_bool(node.value()))),
                _ => self.wrong_type(node, target),
            },
            Shape::Int => match (node.tag(), node.value().parse::<i64>()) {
                (Tag::Int, Ok(v)) => Ok(JsonValue::from(v)),
                _ => self.wrong_type(node, target),
            },
            Shape::Uint => match (node.tag(), node.value().parse::<u64>()) {
                (Tag::Int, Ok(v)) => Ok(JsonValue::from(v)),
                _ => self.wrong_type(node, target),
            },
            Shape::Float => {
                let number = match node.tag() {
                    Tag::Int | Tag::Float => node
                        .value()
                        .parse::<f64>()
                        .ok()
                        .and_then(JsonNumber::from_f64),
                    _ => None,
                };
                match number {
                    Some(n) => Ok(JsonValue::Number(n)),
                    None => self.wrong_type(node, target),
                }
            }
            Shape::String => {
                if node.tag().is_container() {
                    self.wrong_type(node, target)
                } else {
                    Ok(JsonValue::String(node.value().to_string()))
                }
            }
            Shape::Sequence { element } => match node.tag() {
                Tag::Seq => self.sequence(node, element),
                _ => self.wrong_type(node, target),
            },
            Shape::Map { key, value } => match node.tag() {
                Tag::Map => self.mapping(node, target, key, value),
                _ => self.wrong_type(node, target),
            },
            Shape::Struct { .. } => self.structure(node, target),
        }
    }

    fn any(&mut self, node: NodeRef<'a>, target: &'a TypeDescriptor) -> Step<JsonValue> {
        let raw = node.value();
        Ok(match node.tag() {
            Tag::Null => JsonValue::Null,
            Tag::Bool => JsonValue::Bool(parse_bool(raw)),
            Tag::Int => raw
                .parse::<i64>()
                .map(JsonValue::from)
                .or_else(|_| raw.parse::<u64>().map(JsonValue::from))
                .unwrap_or_else(|_| JsonValue::String(raw.to_string())),
            Tag::Float => raw
                .parse::<f64>()
                .ok()
                .and_then(JsonNumber::from_f64)
                .map_or_else(|| JsonValue::String(raw.to_string()), JsonValue::Number),
            Tag::Str => JsonValue::String(raw.to_string()),
            Tag::Seq => return self.sequence(node, target),
            Tag::Map => return self.mapping(node, target, target, target),
        })
    }

    fn sequence(&mut self, node: NodeRef<'a>, element: &'a TypeDescriptor) -> Step<JsonValue> {
        let mut items = Vec::new();
        for child in node.children() {
            items.push(self.unmarshal(child, element)?);
        }
        Ok(JsonValue::Array(items))
    }

    fn mapping(
        &mut self,
        node: NodeRef<'a>,
        target: &'a TypeDescriptor,
        key_ty: &'a TypeDescriptor,
        value_ty: &'a TypeDescriptor,
    ) -> Step<JsonValue> {
        if self.repeated_keys(node, target)? {
            return Ok(JsonValue::Null);
        }

        let mut out = JsonMap::new();
        for (key, value) in node.entries() {
            let before = self.errors.len();
            let decoded_key = self.unmarshal(key, key_ty)?;
            if self.errors.len() > before {
                continue;
            }

            let decoded = self.unmarshal(value, value_ty)?;
            let key = match decoded_key {
                JsonValue::String(s) => s,
                _ => key.value().to_string(),
            };
            out.insert(key, decoded);
        }
        Ok(JsonValue::Object(out))
    }

    fn structure(&mut self, node: NodeRef<'a>, target: &'a TypeDescriptor) -> Step<JsonValue> {
        let layout = match self.layout(target) {
            Ok(layout) => layout,
            Err(defect) => {
                self.record(new_struct_shape_error(defect))?;
                return Ok(JsonValue::Null);
            }
        };
        if node.tag() != Tag::Map {
            return self.wrong_type(node, target);
        }

        if self.repeated_keys(node, target)? {
            return Ok(JsonValue::Null);
        }

        // Field id -> line of the key that set it.
        let mut bound: HashMap<usize, usize> = HashMap::new();
        let mut out = JsonMap::new();
        for (key, value) in node.entries() {
            let Some(slot) = layout.lookup(key.value()) else {
                if self.options.known_fields {
                    let original =
                        site_message(ErrorCause::UnknownField, key, key.value(), target, None);
                    self.record(new_unknown_field_error(original, key, target, key.value()))?;
                }
                continue;
            };

            if let Some(&prior) = bound.get(&slot.id) {
                let original = site_message(
                    ErrorCause::KeyAlreadyDefined,
                    key,
                    key.value(),
                    target,
                    Some(prior),
                );
                self.record(new_already_defined_error(
                    original,
                    key,
                    target,
                    key.value(),
                    prior,
                ))?;
                continue;
            }
            bound.insert(slot.id, key.line());

            let decoded = self.unmarshal(value, slot.ty)?;
            out.insert(slot.key.to_string(), decoded);
        }
        Ok(JsonValue::Object(out))
    }

    /// Records one error per (earlier, later) pair of equal keys in a
    /// mapping, in document order. Returns `true` when any key repeats; the
    /// mapping is then left undecoded.
    fn repeated_keys(&mut self, node: NodeRef<'a>, target: &'a TypeDescriptor) -> Step<bool> {
        let mut groups: HashMap<&'a str, Vec<NodeRef<'a>>> = HashMap::new();
        for (key, _) in node.entries() {
            groups.entry(key.value()).or_default().push(key);
        }
        if groups.values().all(|keys| keys.len() < 2) {
            return Ok(false);
        }

        // Occurrences of each key already visited.
        let mut visited: HashMap<&'a str, usize> = HashMap::new();
        for (key, _) in node.entries() {
            let position = visited.entry(key.value()).or_insert(0);
            let index = *position;
            *position += 1;

            let Some(later) = groups.get(key.value()).and_then(|keys| keys.get(index + 1..)) else {
                continue;
            };
            for &repeat in later {
                let original = site_message(
                    ErrorCause::KeyAlreadyDefined,
                    repeat,
                    "",
                    target,
                    Some(key.line()),
                );
                self.record(new_already_defined_error(
                    original,
                    repeat,
                    target,
                    "",
                    key.line(),
                ))?;
            }
        }
        Ok(true)
    }
}

/// Message recorded as the failure site's own text. Reads the same as the
/// rendered message so either can be shown to a user.
fn site_message(
    cause: ErrorCause,
    node: NodeRef<'_>,
    name: &str,
    target: &TypeDescriptor,
    prior_line: Option<usize>,
) -> String {
    let meta: BTreeMap<String, String> = prior_line
        .map(|line| (META_LINE_NUM.to_string(), line.to_string()))
        .into_iter()
        .collect();
    render(cause, node, (!name.is_empty()).then_some(name), target, &meta)
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw, "true" | "True" | "TRUE")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{decode, DecodeOptions, DecodeState, Decoder, ErrorPolicy};
    use crate::parser::parse;
    use crate::types::{FieldDescriptor, TypeDescriptor};

    #[test]
    fn decodes_struct_with_nested_sequence() {
        let tree = parse("name: web\nports:\n  - 80\n  - 443\n").unwrap();
        let ty = TypeDescriptor::structure(
            "service",
            vec![
                FieldDescriptor::new("name", TypeDescriptor::string()),
                FieldDescriptor::new("ports", TypeDescriptor::sequence(TypeDescriptor::uint())),
            ],
        );
        let value = decode(&tree, &ty, &DecodeOptions::new()).unwrap();
        assert_eq!(value, json!({"name": "web", "ports": [80, 443]}));
    }

    #[test]
    fn any_target_keeps_scalar_types() {
        let tree = parse("a: 1\nb: 2.5\nc: true\nd: ~\ne: [x, 2]\n").unwrap();
        let value = decode(&tree, &TypeDescriptor::any(), &DecodeOptions::new()).unwrap();
        assert_eq!(
            value,
            json!({"a": 1, "b": 2.5, "c": true, "d": null, "e": ["x", 2]})
        );
    }

    #[test]
    fn int_into_float_and_scalar_into_string_are_accepted() {
        let tree = parse("ratio: 3\nlabel: 42\n").unwrap();
        let ty = TypeDescriptor::structure(
            "s",
            vec![
                FieldDescriptor::new("ratio", TypeDescriptor::float()),
                FieldDescriptor::new("label", TypeDescriptor::string()),
            ],
        );
        let value = decode(&tree, &ty, &DecodeOptions::new()).unwrap();
        assert_eq!(value, json!({"ratio": 3.0, "label": "42"}));
    }

    #[test]
    fn negative_into_uint_is_wrong_type() {
        let tree = parse("n: -1\n").unwrap();
        let ty = TypeDescriptor::map(TypeDescriptor::string(), TypeDescriptor::uint());
        let err = decode(&tree, &ty, &DecodeOptions::new()).unwrap_err();
        assert_eq!(
            err.errors()[0].to_string(),
            "line 1: cannot unmarshal !!int `-1` into uint"
        );
    }

    #[test]
    fn bad_map_key_skips_entry() {
        let tree = parse("1: one\nx: two\n3: three\n").unwrap();
        let ty = TypeDescriptor::map(TypeDescriptor::int(), TypeDescriptor::string());
        let err = decode(&tree, &ty, &DecodeOptions::new()).unwrap_err();
        assert_eq!(err.len(), 1);
        assert_eq!(
            err.errors()[0].to_string(),
            "line 2: cannot unmarshal !!str `x` into int"
        );
    }

    #[test]
    fn first_error_policy_stops_early() {
        let tree = parse("a: x\nb: y\n").unwrap();
        let ty = TypeDescriptor::map(TypeDescriptor::string(), TypeDescriptor::int());
        let options = DecodeOptions::new().error_policy(ErrorPolicy::FirstError);
        let err = decode(&tree, &ty, &options).unwrap_err();
        assert_eq!(err.len(), 1);

        let err = decode(&tree, &ty, &DecodeOptions::new()).unwrap_err();
        assert_eq!(err.len(), 2);
    }

    #[test]
    fn decoder_applies_its_options() {
        let tree = parse("name: a\nextra: 1\n").unwrap();
        let ty = TypeDescriptor::structure(
            "s",
            vec![FieldDescriptor::new("name", TypeDescriptor::string())],
        );
        let mut decoder = Decoder::new(DecodeOptions::new());
        assert!(!decoder.options().known_fields);
        assert_eq!(decoder.decode(&tree, &ty).unwrap(), json!({"name": "a"}));

        decoder.set_known_fields(true);
        assert!(decoder.options().known_fields);
        let err = decoder.decode(&tree, &ty).unwrap_err();
        assert_eq!(err.errors()[0].to_string(), "line 2: field extra not found in type s");
    }

    #[test]
    fn struct_layout_is_built_once_per_descriptor() {
        let tree = parse("- name: a\n- name: b\n- name: c\n").unwrap();
        let ty = TypeDescriptor::sequence(TypeDescriptor::structure(
            "s",
            vec![FieldDescriptor::new("name", TypeDescriptor::string())],
        ));
        let options = DecodeOptions::new();
        let mut state = DecodeState::new(&options);
        let root = tree.root().unwrap();
        let value = state.unmarshal(root, &ty).ok().unwrap();

        assert_eq!(value, json!([{"name": "a"}, {"name": "b"}, {"name": "c"}]));
        assert!(state.errors.is_empty());
        assert_eq!(state.layouts.len(), 1);
    }

    #[test]
    fn options_deserialize_from_json() {
        let options: DecodeOptions =
            serde_json::from_str(r#"{"known_fields": true, "error_policy": "first_error"}"#)
                .unwrap();
        assert_eq!(
            options,
            DecodeOptions::new()
                .known_fields(true)
                .error_policy(ErrorPolicy::FirstError)
        );
        let defaults: DecodeOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(defaults, DecodeOptions::default());
    }
}
