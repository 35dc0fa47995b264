//! Explicit target-type descriptors.
//!
//! A [`TypeDescriptor`] stands in for runtime reflection: it names the target
//! type the way messages print it (`[]string`, `map[string]int`, ...) and
//! records the shape the decoder checks nodes against.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ShapeDefect;
use crate::node::NodeKind;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Named target type.
pub struct TypeDescriptor {
    name: String,
    shape: Shape,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
/// What a target type accepts.
pub enum Shape {
    /// Accepts any node; the equivalent of an untyped `interface {}` target.
    Any,
    Bool,
    Int,
    Uint,
    Float,
    String,
    Sequence {
        element: Box<TypeDescriptor>,
    },
    Map {
        key: Box<TypeDescriptor>,
        value: Box<TypeDescriptor>,
    },
    Struct {
        fields: Vec<FieldDescriptor>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Single struct field.
pub struct FieldDescriptor {
    /// Document key bound to this field.
    pub key: String,
    #[serde(rename = "type")]
    pub ty: TypeDescriptor,
    /// Extra document keys that bind the same field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    /// Flattens the fields of a struct-typed field into the parent.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub inline: bool,
}

impl FieldDescriptor {
    pub fn new(key: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            key: key.into(),
            ty,
            aliases: Vec::new(),
            inline: false,
        }
    }

    /// Inline field; `key` only names the field in shape errors.
    pub fn inline(key: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            inline: true,
            ..Self::new(key, ty)
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>, shape: Shape) -> Self {
        Self {
            name: name.into(),
            shape,
        }
    }

    pub fn any() -> Self {
        Self::new("interface {}", Shape::Any)
    }

    pub fn bool() -> Self {
        Self::new("bool", Shape::Bool)
    }

    pub fn int() -> Self {
        Self::new("int", Shape::Int)
    }

    pub fn uint() -> Self {
        Self::new("uint", Shape::Uint)
    }

    pub fn float() -> Self {
        Self::new("float64", Shape::Float)
    }

    pub fn string() -> Self {
        Self::new("string", Shape::String)
    }

    pub fn sequence(element: TypeDescriptor) -> Self {
        Self::new(
            format!("[]{}", element.name),
            Shape::Sequence {
                element: Box::new(element),
            },
        )
    }

    pub fn map(key: TypeDescriptor, value: TypeDescriptor) -> Self {
        Self::new(
            format!("map[{}]{}", key.name, value.name),
            Shape::Map {
                key: Box::new(key),
                value: Box::new(value),
            },
        )
    }

    pub fn structure(name: impl Into<String>, fields: Vec<FieldDescriptor>) -> Self {
        Self::new(name, Shape::Struct { fields })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Node kind a document must use to fill this type.
    pub fn expected_kind(&self) -> NodeKind {
        match self.shape {
            Shape::Sequence { .. } => NodeKind::Sequence,
            Shape::Map { .. } | Shape::Struct { .. } => NodeKind::Mapping,
            _ => NodeKind::Scalar,
        }
    }

    /// Short hint of the value form a document author should write.
    pub fn primitive_hint(&self) -> &'static str {
        match self.shape {
            Shape::Struct { .. } | Shape::Map { .. } => "key:value",
            Shape::Sequence { .. } => "[]value",
            Shape::Int => "int",
            Shape::Uint => "uint",
            Shape::Float => "float",
            Shape::String => "string",
            Shape::Bool => "bool",
            Shape::Any => "any",
        }
    }

    /// Resolves the document keys of a struct type, flattening inline
    /// fields. Non-struct types have an empty layout.
    pub fn layout(&self) -> Result<StructLayout<'_>, ShapeDefect> {
        let mut layout = StructLayout::default();
        if let Shape::Struct { fields } = &self.shape {
            layout.collect(&self.name, fields)?;
        }
        Ok(layout)
    }
}

/// Field slot resolved from a document key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSlot<'a> {
    /// Unique per field within one layout.
    pub id: usize,
    /// Canonical key the decoded value is stored under.
    pub key: &'a str,
    pub ty: &'a TypeDescriptor,
}

/// Key lookup table for one struct type.
#[derive(Debug, Clone, Default)]
pub struct StructLayout<'a> {
    slots: HashMap<&'a str, FieldSlot<'a>>,
    fields: usize,
}

impl<'a> StructLayout<'a> {
    fn collect(
        &mut self,
        type_name: &str,
        fields: &'a [FieldDescriptor],
    ) -> Result<(), ShapeDefect> {
        for field in fields {
            if field.inline {
                let Shape::Struct { fields: nested } = &field.ty.shape else {
                    return Err(ShapeDefect::InlineNotStruct {
                        field: field.key.clone(),
                        type_name: type_name.to_string(),
                    });
                };
                self.collect(type_name, nested)?;
                continue;
            }

            let slot = FieldSlot {
                id: self.fields,
                key: &field.key,
                ty: &field.ty,
            };
            self.fields += 1;
            for key in std::iter::once(&field.key).chain(&field.aliases) {
                if self.slots.insert(key, slot).is_some() {
                    return Err(ShapeDefect::DuplicatedKey {
                        key: key.clone(),
                        type_name: type_name.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    pub fn lookup(&self, key: &str) -> Option<FieldSlot<'a>> {
        self.slots.get(key).copied()
    }

    /// Number of distinct fields, not counting aliases.
    pub fn field_count(&self) -> usize {
        self.fields
    }
}
