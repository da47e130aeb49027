//! Typed IR for documented type expressions. No serde_json::Value here.
//!
//! A `TypeExpression` is what a documentation sentence such as
//! `array[ItemID] or dictionary[string → uint32]` means once parsed; a `Doc`
//! is the whole documented universe of named types and prototypes.
pub mod doc;

use serde::{Deserialize, Serialize};

pub use doc::{Doc, DocError, Prototype, Type};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeExpression {
    Builtin { name: String },
    LiteralBool { value: bool },
    LiteralString { value: String },
    LiteralInteger { value: i64 },
    Ref {
        #[serde(rename = "ref")]
        name: String,
    },
    Union { members: Vec<TypeExpression> },
    Array {
        content: Box<TypeExpression>,
        /// Empty arrays are serialized as `{}` instead of `[]`.
        #[serde(default = "default_true")]
        empty_as_object: bool,
    },
    Dictionary {
        keys: Box<TypeExpression>,
        values: Box<TypeExpression>,
    },
    Struct(StructType),
    Tuple { members: Vec<TypeExpression> },
    /// Placeholder for prose we could not parse; accepts anything.
    Unconstrained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Property {
    pub names: Vec<String>,
    #[serde(rename = "type")]
    pub ty: TypeExpression,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructType {
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub overridden_properties: Vec<Property>,
    #[serde(default)]
    pub custom_properties: Option<Box<TypeExpression>>,
}

fn default_true() -> bool { true }

// ————————————————————————————————————————————————————————————————————————————
// CONSTRUCTORS
// ————————————————————————————————————————————————————————————————————————————

/// Builtin the grammar produces for `defines.inventory`: any integer.
pub const INVENTORY_INDEX: &str = "defines.inventory";

impl TypeExpression {
    pub fn builtin(name: impl Into<String>) -> Self {
        Self::Builtin { name: name.into() }
    }
    pub fn literal_string(value: impl Into<String>) -> Self {
        Self::LiteralString { value: value.into() }
    }
    pub fn reference(name: impl Into<String>) -> Self {
        Self::Ref { name: name.into() }
    }
    /// Array with the documented empty-array quirk attached.
    pub fn array(content: TypeExpression) -> Self {
        Self::Array { content: Box::new(content), empty_as_object: true }
    }
    pub fn dictionary(keys: TypeExpression, values: TypeExpression) -> Self {
        Self::Dictionary { keys: Box::new(keys), values: Box::new(values) }
    }

    /// Union of `members`, splicing members that are unions themselves so the
    /// result is never nested.
    pub fn union<I>(members: I) -> Self
    where
        I: IntoIterator<Item = TypeExpression>,
    {
        let mut flat = Vec::new();
        for member in members {
            match member {
                Self::Union { members } => flat.extend(members),
                other => flat.push(other),
            }
        }
        Self::Union { members: flat }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Builtin { .. } => "builtin",
            Self::LiteralBool { .. } => "literal_bool",
            Self::LiteralString { .. } => "literal_string",
            Self::LiteralInteger { .. } => "literal_integer",
            Self::Ref { .. } => "ref",
            Self::Union { .. } => "union",
            Self::Array { .. } => "array",
            Self::Dictionary { .. } => "dictionary",
            Self::Struct(_) => "struct",
            Self::Tuple { .. } => "tuple",
            Self::Unconstrained => "unconstrained",
        }
    }

    pub fn as_struct(&self) -> Option<&StructType> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_struct_mut(&mut self) -> Option<&mut StructType> {
        match self {
            Self::Struct(s) => Some(s),
            _ => None,
        }
    }
    pub fn as_union_mut(&mut self) -> Option<&mut Vec<TypeExpression>> {
        match self {
            Self::Union { members } => Some(members),
            _ => None,
        }
    }
}

impl Property {
    pub fn new(name: impl Into<String>, ty: TypeExpression, required: bool) -> Self {
        Self { names: vec![name.into()], ty, required }
    }
}

impl StructType {
    pub fn new(base: Option<String>, properties: Vec<Property>) -> Self {
        Self { base, properties, ..Self::default() }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// PROPERTY ACCESS
// ————————————————————————————————————————————————————————————————————————————

/// Property lookups shared by struct types and prototypes, used by patch passes
/// that fix known documentation mistakes in place.
pub trait HasProperties {
    fn owner_name(&self) -> &str;
    fn properties(&self) -> &[Property];
    fn properties_mut(&mut self) -> &mut Vec<Property>;

    fn get_property(&self, name: &str) -> Result<&Property, DocError> {
        self.properties()
            .iter()
            .find(|p| p.names.iter().any(|n| n == name))
            .ok_or_else(|| DocError::PropertyNotFound {
                owner: self.owner_name().to_string(),
                property: name.to_string(),
            })
    }

    fn get_property_mut(&mut self, name: &str) -> Result<&mut Property, DocError> {
        let owner = self.owner_name().to_string();
        self.properties_mut()
            .iter_mut()
            .find(|p| p.names.iter().any(|n| n == name))
            .ok_or_else(|| DocError::PropertyNotFound { owner, property: name.to_string() })
    }

    fn get_property_type(&self, name: &str) -> Result<&TypeExpression, DocError> {
        self.get_property(name).map(|p| &p.ty)
    }

    fn set_property_type(&mut self, name: &str, ty: TypeExpression) -> Result<(), DocError> {
        self.get_property_mut(name)?.ty = ty;
        Ok(())
    }
}

impl HasProperties for StructType {
    fn owner_name(&self) -> &str { "struct" }
    fn properties(&self) -> &[Property] { &self.properties }
    fn properties_mut(&mut self) -> &mut Vec<Property> { &mut self.properties }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn union_constructor_splices_nested_unions() {
        let inner = TypeExpression::union([
            TypeExpression::literal_string("b"),
            TypeExpression::literal_string("c"),
        ]);
        let u = TypeExpression::union([TypeExpression::literal_string("a"), inner]);
        let TypeExpression::Union { members } = u else { panic!("expected union") };
        assert_eq!(members.len(), 3);
        assert!(members.iter().all(|m| !matches!(m, TypeExpression::Union { .. })));
    }

    #[test]
    fn serde_shape_is_kind_tagged() {
        let t = TypeExpression::array(TypeExpression::reference("ItemID"));
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v, json!({
            "kind": "array",
            "content": {"kind": "ref", "ref": "ItemID"},
            "empty_as_object": true
        }));

        let back: TypeExpression = serde_json::from_value(json!({
            "kind": "array",
            "content": {"kind": "builtin", "name": "string"}
        })).unwrap();
        assert_eq!(back, TypeExpression::array(TypeExpression::builtin("string")));
    }

    #[test]
    fn struct_variant_reads_with_defaults() {
        let t: TypeExpression = serde_json::from_value(json!({
            "kind": "struct",
            "base": "Base",
            "properties": [{"names": ["x"], "type": {"kind": "builtin", "name": "bool"}}]
        })).unwrap();
        let s = t.as_struct().unwrap();
        assert_eq!(s.base.as_deref(), Some("Base"));
        assert!(!s.properties[0].required);
        assert!(s.overridden_properties.is_empty());
        assert!(s.custom_properties.is_none());
    }

    #[test]
    fn property_lookup_matches_any_alias() {
        let mut s = StructType::new(None, vec![Property {
            names: vec!["filename".into(), "filenames".into()],
            ty: TypeExpression::builtin("string"),
            required: false,
        }]);
        assert!(s.get_property("filenames").is_ok());
        s.set_property_type("filename", TypeExpression::Unconstrained).unwrap();
        assert_eq!(s.get_property_type("filenames").unwrap(), &TypeExpression::Unconstrained);
        assert!(matches!(s.get_property("nope"), Err(DocError::PropertyNotFound { .. })));
    }
}
