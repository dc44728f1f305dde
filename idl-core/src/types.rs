#![forbid(unsafe_code)]

use std::fmt;
use std::sync::Arc;

use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::value::{bit_length, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    Known(u32),
    Unknown,
}

impl Width {
    pub fn known(self) -> Option<u32> {
        match self {
            Width::Known(w) => Some(w),
            Width::Unknown => None,
        }
    }
}

impl From<Option<u32>> for Width {
    fn from(width: Option<u32>) -> Self {
        width.map_or(Width::Unknown, Width::Known)
    }
}

impl fmt::Display for Width {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Width::Known(w) => write!(f, "{w}"),
            Width::Unknown => f.write_str("?"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Qualifiers {
    pub is_const: bool,
    pub global: bool,
    pub template_var: bool,
}

/// An enum class and its declared members.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnumDef {
    pub name: String,
    pub members: Vec<(String, u128)>,
}

impl EnumDef {
    pub fn new(name: impl Into<String>, members: Vec<(String, u128)>) -> Self {
        Self {
            name: name.into(),
            members,
        }
    }

    pub fn width(&self) -> u32 {
        self.members
            .iter()
            .map(|(_, v)| bit_length(*v))
            .max()
            .unwrap_or(1)
    }

    pub fn value_of(&self, member: &str) -> Option<u128> {
        self.members
            .iter()
            .find(|(name, _)| name == member)
            .map(|(_, v)| *v)
    }

    /// Reverse lookup used when a folded value is rendered as `Class::Member`.
    pub fn member_for(&self, value: u128) -> Option<&str> {
        self.members
            .iter()
            .find(|(_, v)| *v == value)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Bits(Width),
    Boolean,
    String,
    Void,
    Array { elem: Box<Type>, len: Width },
    /// The enum class itself, as stored in the symbol table under its name.
    Enum(Arc<EnumDef>),
    /// A value of an enum class.
    EnumRef { class: String, width: Width },
    Struct(String),
    FunctionTemplate(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Type {
    kind: TypeKind,
    qualifiers: Qualifiers,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct SchemaError(pub String);

impl Type {
    pub fn new(kind: TypeKind) -> Self {
        Self {
            kind,
            qualifiers: Qualifiers::default(),
        }
    }

    pub fn bits(width: u32) -> Self {
        Self::new(TypeKind::Bits(Width::Known(width)))
    }

    pub fn bits_unknown() -> Self {
        Self::new(TypeKind::Bits(Width::Unknown))
    }

    pub fn bits_width(width: Width) -> Self {
        Self::new(TypeKind::Bits(width))
    }

    pub fn boolean() -> Self {
        Self::new(TypeKind::Boolean)
    }

    pub fn string() -> Self {
        Self::new(TypeKind::String)
    }

    pub fn void() -> Self {
        Self::new(TypeKind::Void)
    }

    pub fn array(elem: Type, len: Width) -> Self {
        Self::new(TypeKind::Array {
            elem: Box::new(elem),
            len,
        })
    }

    pub fn enum_class(def: EnumDef) -> Self {
        Self::new(TypeKind::Enum(Arc::new(def)))
    }

    pub fn enum_ref(def: &EnumDef) -> Self {
        Self::new(TypeKind::EnumRef {
            class: def.name.clone(),
            width: Width::Known(def.width()),
        })
    }

    pub fn struct_ref(name: impl Into<String>) -> Self {
        Self::new(TypeKind::Struct(name.into()))
    }

    pub fn function_template(name: impl Into<String>) -> Self {
        Self::new(TypeKind::FunctionTemplate(name.into()))
    }

    pub fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub fn qualifiers(&self) -> Qualifiers {
        self.qualifiers
    }

    pub fn is_const(&self) -> bool {
        self.qualifiers.is_const
    }

    pub fn is_global(&self) -> bool {
        self.qualifiers.global
    }

    pub fn is_template_var(&self) -> bool {
        self.qualifiers.template_var
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.kind, TypeKind::Boolean)
    }

    pub fn is_bits(&self) -> bool {
        matches!(self.kind, TypeKind::Bits(_))
    }

    /// Static bit width of bits and enum values.
    pub fn width(&self) -> Option<u32> {
        match &self.kind {
            TypeKind::Bits(w) | TypeKind::EnumRef { width: w, .. } => w.known(),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match &self.kind {
            TypeKind::Array { elem, .. } => Some(elem),
            _ => None,
        }
    }

    pub fn array_len(&self) -> Option<Width> {
        match &self.kind {
            TypeKind::Array { len, .. } => Some(*len),
            _ => None,
        }
    }

    pub fn make_const(&self) -> Type {
        let mut ty = self.clone();
        ty.qualifiers.is_const = true;
        ty
    }

    pub fn make_global(&self) -> Type {
        let mut ty = self.clone();
        ty.qualifiers.global = true;
        ty
    }

    pub fn make_template_var(&self) -> Type {
        let mut ty = self.clone();
        ty.qualifiers.template_var = true;
        ty
    }

    pub fn without_qualifiers(&self) -> Type {
        Type::new(self.kind.clone())
    }

    /// The type of a variable declared with this type name: an enum class
    /// becomes a reference to one of its members.
    pub fn instance_type(&self) -> Type {
        match &self.kind {
            TypeKind::Enum(def) => Type::enum_ref(def),
            _ => self.clone(),
        }
    }

    /// Structural equality. Qualifiers are ignored and an unknown width only
    /// matches another unknown width.
    pub fn equal_to(&self, other: &Type) -> bool {
        self.structurally_equal(other, false)
    }

    /// Like [`Type::equal_to`], but an unknown width matches any width.
    pub fn equal_to_ignoring_unknown_width(&self, other: &Type) -> bool {
        self.structurally_equal(other, true)
    }

    fn structurally_equal(&self, other: &Type, wildcard: bool) -> bool {
        let widths = |a: Width, b: Width| match (a, b) {
            (Width::Known(x), Width::Known(y)) => x == y,
            (Width::Unknown, Width::Unknown) => true,
            _ => wildcard,
        };
        match (&self.kind, &other.kind) {
            (TypeKind::Bits(a), TypeKind::Bits(b)) => widths(*a, *b),
            (TypeKind::Boolean, TypeKind::Boolean)
            | (TypeKind::String, TypeKind::String)
            | (TypeKind::Void, TypeKind::Void) => true,
            (
                TypeKind::Array { elem: ea, len: la },
                TypeKind::Array { elem: eb, len: lb },
            ) => widths(*la, *lb) && ea.structurally_equal(eb, wildcard),
            (TypeKind::Enum(a), TypeKind::Enum(b)) => a.name == b.name,
            (TypeKind::EnumRef { class: a, .. }, TypeKind::EnumRef { class: b, .. }) => a == b,
            (TypeKind::Struct(a), TypeKind::Struct(b))
            | (TypeKind::FunctionTemplate(a), TypeKind::FunctionTemplate(b)) => a == b,
            _ => false,
        }
    }

    /// Maps a parameter's JSON-Schema declaration to an IDL type.
    ///
    /// Array lengths come from a tuple-style `items` list or `maxItems`;
    /// otherwise the length stays unknown until [`Type::patched_for_value`]
    /// sees the actual value.
    pub fn from_json_schema(schema: &JsonValue) -> Result<Type, SchemaError> {
        if let Some(alts) = schema
            .get("oneOf")
            .or_else(|| schema.get("anyOf"))
            .and_then(JsonValue::as_array)
        {
            let mut merged: Option<Type> = None;
            for alt in alts {
                let ty = Type::from_json_schema(alt)?;
                merged = Some(match merged {
                    None => ty,
                    Some(prev) => merge_alternatives(prev, ty)?,
                });
            }
            return merged.ok_or_else(|| SchemaError("empty list of alternatives".to_string()));
        }

        if let Some(constant) = schema.get("const") {
            return Type::for_json_value(constant);
        }

        match schema.get("type").and_then(JsonValue::as_str) {
            Some("integer") => Ok(Type::bits_width(integer_width(schema))),
            Some("boolean") => Ok(Type::boolean()),
            Some("string") => Ok(Type::string()),
            Some("array") => match schema.get("items") {
                Some(JsonValue::Array(tuple)) => {
                    let first = tuple
                        .first()
                        .ok_or_else(|| SchemaError("empty tuple items".to_string()))?;
                    Ok(Type::array(
                        Type::from_json_schema(first)?,
                        Width::Known(tuple.len() as u32),
                    ))
                }
                Some(items) => {
                    let len = schema
                        .get("maxItems")
                        .and_then(JsonValue::as_u64)
                        .and_then(|n| u32::try_from(n).ok());
                    Ok(Type::array(Type::from_json_schema(items)?, len.into()))
                }
                None => Err(SchemaError("array schema without `items`".to_string())),
            },
            Some(other) => Err(SchemaError(format!("unsupported schema type `{other}`"))),
            None => match schema.get("$ref").and_then(JsonValue::as_str) {
                Some(r) => ref_width(r)
                    .map(Type::bits)
                    .ok_or_else(|| SchemaError(format!("unsupported reference `{r}`"))),
                None => Err(SchemaError("schema has no `type`".to_string())),
            },
        }
    }

    fn for_json_value(value: &JsonValue) -> Result<Type, SchemaError> {
        if let JsonValue::Array(items) = value {
            let first = items
                .first()
                .ok_or_else(|| SchemaError("empty constant array".to_string()))?;
            return Ok(Type::array(
                Type::for_json_value(first)?,
                Width::Known(items.len() as u32),
            ));
        }
        match Value::from_json(value) {
            Some(Value::Bits(v)) => Ok(Type::bits(bit_length(v))),
            Some(Value::Bool(_)) => Ok(Type::boolean()),
            Some(Value::String(_)) => Ok(Type::string()),
            _ => Err(SchemaError(format!("unsupported constant `{value}`"))),
        }
    }

    /// Replaces an unknown array length with the element count of `value`.
    /// Must run before the type is attached to a parameter with a fixed value.
    pub fn patched_for_value(&self, value: &Value) -> Type {
        match (&self.kind, value) {
            (TypeKind::Array { elem, len }, Value::Array(items)) => {
                let elem = match items.first() {
                    Some(first) => elem.patched_for_value(first),
                    None => (**elem).clone(),
                };
                let len = match len {
                    Width::Unknown => Width::Known(items.len() as u32),
                    known => *known,
                };
                Type {
                    kind: TypeKind::Array {
                        elem: Box::new(elem),
                        len,
                    },
                    qualifiers: self.qualifiers,
                }
            }
            _ => self.clone(),
        }
    }
}

fn integer_width(schema: &JsonValue) -> Width {
    if let Some(w) = schema
        .get("$ref")
        .and_then(JsonValue::as_str)
        .and_then(ref_width)
    {
        return Width::Known(w);
    }
    let maximum = schema.get("maximum").and_then(JsonValue::as_u64).or_else(|| {
        schema
            .get("enum")
            .and_then(JsonValue::as_array)
            .and_then(|values| values.iter().filter_map(JsonValue::as_u64).max())
    });
    maximum
        .map(|max| Width::Known(bit_length(max as u128)))
        .unwrap_or(Width::Unknown)
}

fn ref_width(reference: &str) -> Option<u32> {
    ["uint64", "uint32", "uint16", "uint8"]
        .iter()
        .find(|suffix| reference.ends_with(*suffix))
        .and_then(|suffix| suffix.trim_start_matches("uint").parse().ok())
}

fn merge_alternatives(a: Type, b: Type) -> Result<Type, SchemaError> {
    match (&a.kind, &b.kind) {
        (TypeKind::Bits(wa), TypeKind::Bits(wb)) => Ok(Type::bits_width(match (wa, wb) {
            (Width::Known(x), Width::Known(y)) => Width::Known((*x).max(*y)),
            _ => Width::Unknown,
        })),
        _ if a.equal_to(&b) => Ok(a),
        _ => Err(SchemaError(format!(
            "alternatives disagree on type: {a} vs {b}"
        ))),
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.qualifiers.is_const {
            f.write_str("const ")?;
        }
        match &self.kind {
            TypeKind::Bits(w) => write!(f, "Bits<{w}>"),
            TypeKind::Boolean => f.write_str("Boolean"),
            TypeKind::String => f.write_str("String"),
            TypeKind::Void => f.write_str("void"),
            TypeKind::Array { elem, len } => write!(f, "{}[{len}]", elem.without_qualifiers()),
            TypeKind::Enum(def) => write!(f, "enum {}", def.name),
            TypeKind::EnumRef { class, .. } => f.write_str(class),
            TypeKind::Struct(name) => write!(f, "struct {name}"),
            TypeKind::FunctionTemplate(name) => write!(f, "function {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn integer_schema_width_comes_from_maximum() {
        let ty = Type::from_json_schema(&json!({"type": "integer", "minimum": 0, "maximum": 127}))
            .expect("schema");
        assert_eq!(ty.width(), Some(7));

        let ty = Type::from_json_schema(&json!({"type": "integer", "enum": [32, 64]})).expect("schema");
        assert_eq!(ty.width(), Some(7));

        let ty = Type::from_json_schema(&json!({"$ref": "schema_defs.json#/$defs/uint64"}))
            .expect("schema");
        assert_eq!(ty.width(), Some(64));

        let ty = Type::from_json_schema(&json!({"type": "integer"})).expect("schema");
        assert_eq!(ty.width(), None);
    }

    #[test]
    fn array_schema_length_is_patched_from_value() {
        let ty = Type::from_json_schema(&json!({
            "type": "array",
            "items": {"type": "integer", "maximum": 3}
        }))
        .expect("schema");
        assert_eq!(ty.array_len(), Some(Width::Unknown));

        let patched = ty.patched_for_value(&Value::Array(vec![Value::Bits(0), Value::Bits(1)]));
        assert_eq!(patched.array_len(), Some(Width::Known(2)));

        let fixed = Type::from_json_schema(&json!({
            "type": "array",
            "items": {"type": "boolean"},
            "maxItems": 4
        }))
        .expect("schema");
        assert_eq!(fixed.array_len(), Some(Width::Known(4)));
    }

    #[test]
    fn unknown_width_is_not_interchangeable_by_default() {
        let known = Type::array(Type::bits(8), Width::Known(4));
        let unknown = Type::array(Type::bits(8), Width::Unknown);
        assert!(!known.equal_to(&unknown));
        assert!(known.equal_to_ignoring_unknown_width(&unknown));
        assert!(known.equal_to(&known.make_const()));
    }

    #[test]
    fn make_const_leaves_receiver_untouched() {
        let ty = Type::bits(32);
        let c = ty.make_const();
        assert!(c.is_const());
        assert!(!ty.is_const());
    }

    #[test]
    fn rejects_unsupported_schema() {
        let err = Type::from_json_schema(&json!({"type": "object"})).expect_err("object");
        assert!(err.0.contains("object"), "unexpected error: {err}");
    }
}
