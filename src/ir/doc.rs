use serde::{Deserialize, Serialize};

use super::{HasProperties, Property, StructType, TypeExpression};

#[derive(Debug, thiserror::Error)]
pub enum DocError {
    #[error("type {0:?} not found")]
    TypeNotFound(String),
    #[error("prototype {0:?} not found")]
    PrototypeNotFound(String),
    #[error("property {property:?} not found in {owner}")]
    PropertyNotFound { owner: String, property: String },
    #[error("{name} is a {found}, expected a {expected}")]
    UnexpectedKind { name: String, expected: &'static str, found: &'static str },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Type {
    pub name: String,
    pub definition: TypeExpression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prototype {
    pub name: String,
    /// Data.raw bucket name; `None` means abstract.
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default)]
    pub overridden_properties: Vec<Property>,
    #[serde(default)]
    pub custom_properties: Option<TypeExpression>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Doc {
    #[serde(default)]
    pub types: Vec<Type>,
    #[serde(default)]
    pub prototypes: Vec<Prototype>,
}

impl Type {
    pub fn new(name: impl Into<String>, definition: TypeExpression) -> Self {
        Self { name: name.into(), definition }
    }
}

impl Prototype {
    pub fn is_abstract(&self) -> bool {
        self.key.is_none()
    }

    /// Struct view of this prototype. Instantiable prototypes get a required
    /// `type` property pinned to their key.
    pub fn make_definition(&self) -> TypeExpression {
        let mut properties = self.properties.clone();
        if let Some(key) = &self.key {
            properties.push(Property::new("type", TypeExpression::literal_string(key.clone()), true));
        }
        TypeExpression::Struct(StructType {
            base: self.base.clone(),
            properties,
            overridden_properties: self.overridden_properties.clone(),
            custom_properties: self.custom_properties.clone().map(Box::new),
        })
    }
}

impl HasProperties for Prototype {
    fn owner_name(&self) -> &str { &self.name }
    fn properties(&self) -> &[Property] { &self.properties }
    fn properties_mut(&mut self) -> &mut Vec<Property> { &mut self.properties }
}

impl Doc {
    pub fn get_type_def(&self, name: &str) -> Result<&TypeExpression, DocError> {
        self.types
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.definition)
            .ok_or_else(|| DocError::TypeNotFound(name.to_string()))
    }

    pub fn get_type_def_mut(&mut self, name: &str) -> Result<&mut TypeExpression, DocError> {
        self.types
            .iter_mut()
            .find(|t| t.name == name)
            .map(|t| &mut t.definition)
            .ok_or_else(|| DocError::TypeNotFound(name.to_string()))
    }

    /// Mutable struct definition of a named type, for patching.
    pub fn get_struct_mut(&mut self, name: &str) -> Result<&mut StructType, DocError> {
        let def = self.get_type_def_mut(name)?;
        let found = def.kind();
        def.as_struct_mut().ok_or_else(|| DocError::UnexpectedKind {
            name: name.to_string(),
            expected: "struct",
            found,
        })
    }

    /// Mutable union members of a named type, for patching.
    pub fn get_union_mut(&mut self, name: &str) -> Result<&mut Vec<TypeExpression>, DocError> {
        let def = self.get_type_def_mut(name)?;
        let found = def.kind();
        def.as_union_mut().ok_or_else(|| DocError::UnexpectedKind {
            name: name.to_string(),
            expected: "union",
            found,
        })
    }

    pub fn get_prototype(&self, name: &str) -> Result<&Prototype, DocError> {
        self.prototypes
            .iter()
            .find(|p| p.name == name)
            .ok_or_else(|| DocError::PrototypeNotFound(name.to_string()))
    }

    pub fn get_prototype_mut(&mut self, name: &str) -> Result<&mut Prototype, DocError> {
        self.prototypes
            .iter_mut()
            .find(|p| p.name == name)
            .ok_or_else(|| DocError::PrototypeNotFound(name.to_string()))
    }

    /// Concatenate another doc into this one (inputs may be split across files).
    pub fn merge(&mut self, other: Doc) {
        self.types.extend(other.types);
        self.prototypes.extend(other.prototypes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item_prototype() -> Prototype {
        Prototype {
            name: "ItemPrototype".into(),
            key: Some("item".into()),
            base: Some("PrototypeBase".into()),
            properties: vec![Property::new("stack_size", TypeExpression::reference("ItemCountType"), true)],
            overridden_properties: vec![],
            custom_properties: None,
        }
    }

    #[test]
    fn make_definition_injects_type_discriminator() {
        let def = item_prototype().make_definition();
        let s = def.as_struct().unwrap();
        assert_eq!(s.base.as_deref(), Some("PrototypeBase"));
        let ty = s.properties.last().unwrap();
        assert_eq!(ty.names, vec!["type".to_string()]);
        assert!(ty.required);
        assert_eq!(ty.ty, TypeExpression::literal_string("item"));
    }

    #[test]
    fn abstract_prototype_has_no_discriminator() {
        let mut p = item_prototype();
        p.key = None;
        assert!(p.is_abstract());
        let def = p.make_definition();
        assert_eq!(def.as_struct().unwrap().properties.len(), 1);
    }

    #[test]
    fn patch_helpers_mutate_in_place() {
        let mut doc = Doc {
            types: vec![
                Type::new("ItemStackIndex", TypeExpression::union([TypeExpression::reference("uint16")])),
                Type::new("uint16", TypeExpression::builtin("uint16")),
            ],
            prototypes: vec![item_prototype()],
        };

        doc.get_union_mut("ItemStackIndex").unwrap().push(TypeExpression::literal_string("dynamic"));
        assert!(matches!(
            doc.get_type_def("ItemStackIndex").unwrap(),
            TypeExpression::Union { members } if members.len() == 2
        ));

        doc.get_prototype_mut("ItemPrototype")
            .unwrap()
            .set_property_type("stack_size", TypeExpression::builtin("double"))
            .unwrap();
        assert_eq!(
            doc.get_prototype("ItemPrototype").unwrap().get_property_type("stack_size").unwrap(),
            &TypeExpression::builtin("double")
        );

        assert!(matches!(doc.get_struct_mut("uint16"), Err(DocError::UnexpectedKind { found: "builtin", .. })));
        assert!(matches!(doc.get_type_def("Nope"), Err(DocError::TypeNotFound(_))));
    }
}
