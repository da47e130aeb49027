//! Lower a documented `Doc` to a JSON Schema describing Data.raw.
//!
//! Pipeline:
//! 1. index every type and prototype by name,
//! 2. grow the forbidden set to a fixed point ([`forbidden`]),
//! 3. choose root prototypes and prune to what they reach ([`reach`]),
//! 4. emit the surviving definitions ([`emit`]).
//!
//! Every compilation goes through one walker ([`Walker::walk`]) so the JSON
//! emitter and the reference collector agree on what gets excluded.
pub mod emit;
pub mod forbidden;
pub mod hierarchy;
pub mod reach;
pub mod refs;

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::ir::{Doc, Prototype, StructType, Type, TypeExpression};

pub use emit::JsonEmitter;
pub use forbidden::ForbiddenSet;
pub use hierarchy::{ResolvedProperty, ResolvedStruct};
pub use reach::SelectionError;
pub use refs::RefCollector;

pub const SCHEMA_DIALECT: &str = "https://json-schema.org/draft/2019-09/schema";

// ————————————————————————————————————————————————————————————————————————————
// ERRORS
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    /// Control signal: the subtree has no useful schema under the current exclusions.
    #[error("compiles to nothing under the current exclusions")]
    Excluded,
    #[error("reference to unknown type or prototype {0:?}")]
    UnknownReference(String),
    #[error("unknown builtin type {0:?}")]
    UnknownBuiltin(String),
    #[error("custom properties declared by both {first} and {second} in one hierarchy")]
    DuplicateCustomProperties { first: String, second: String },
    #[error("in property {property:?}: {source}")]
    InProperty { property: String, source: Box<CompileError> },
}

pub type Compiled<T> = Result<T, CompileError>;

/// Turn the exclusion signal into `None`, keeping real failures as errors.
pub fn excluded_as_none<T>(result: Compiled<T>) -> Compiled<Option<T>> {
    match result {
        Ok(x) => Ok(Some(x)),
        Err(CompileError::Excluded) => Ok(None),
        Err(error) => Err(error),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("{name:?} is defined more than once")]
    DuplicateName { name: String },
    #[error("failed to compile {name:?}: {source}")]
    Definition { name: String, source: CompileError },
    #[error(transparent)]
    Selection(#[from] SelectionError),
}

// ————————————————————————————————————————————————————————————————————————————
// OPTIONS
// ————————————————————————————————————————————————————————————————————————————

/// `(deep, name) -> $ref`. `deep` is true for references made from inside a
/// definition and false for the top-level bucket properties.
pub type MakeReference = Arc<dyn Fn(bool, &str) -> String + Send + Sync>;

#[derive(Clone)]
pub struct CompileOptions {
    pub forbid_type_names: BTreeSet<String>,
    pub limit_to_prototype_names: Option<Vec<String>>,
    pub include_descendants: bool,
    pub make_reference: Option<MakeReference>,
    /// Root URL of the documentation, used for each definition's `description`.
    pub doc_root: String,
    pub title: String,
    /// Close structs without custom properties with `additionalProperties: false`.
    pub strict_properties: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            forbid_type_names: BTreeSet::new(),
            limit_to_prototype_names: None,
            include_descendants: false,
            make_reference: None,
            doc_root: "https://lua-api.factorio.com/stable/".to_string(),
            title: "Factorio Data.raw".to_string(),
            strict_properties: false,
        }
    }
}

impl std::fmt::Debug for CompileOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompileOptions")
            .field("forbid_type_names", &self.forbid_type_names)
            .field("limit_to_prototype_names", &self.limit_to_prototype_names)
            .field("include_descendants", &self.include_descendants)
            .field("make_reference", &self.make_reference.as_ref().map(|_| "<fn>"))
            .field("doc_root", &self.doc_root)
            .field("title", &self.title)
            .field("strict_properties", &self.strict_properties)
            .finish()
    }
}

impl CompileOptions {
    pub fn forbid<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbid_type_names.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn limit_to<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.limit_to_prototype_names = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_descendants(mut self, include: bool) -> Self {
        self.include_descendants = include;
        self
    }

    pub fn with_make_reference(mut self, f: impl Fn(bool, &str) -> String + Send + Sync + 'static) -> Self {
        self.make_reference = Some(Arc::new(f));
        self
    }

    fn reference(&self, deep: bool, name: &str) -> String {
        match &self.make_reference {
            Some(f) => f(deep, name),
            None => format!("#/definitions/{name}"),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INDEX
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Copy)]
pub enum Entity<'d> {
    Type(&'d Type),
    Prototype(&'d Prototype),
}

/// Name → entity lookup over one `Doc`. Names are unique across types and
/// prototypes.
#[derive(Debug)]
pub struct DocIndex<'d> {
    doc: &'d Doc,
    by_name: IndexMap<&'d str, Entity<'d>>,
}

impl<'d> DocIndex<'d> {
    pub fn new(doc: &'d Doc) -> Result<Self, SchemaError> {
        let mut by_name = IndexMap::with_capacity(doc.types.len() + doc.prototypes.len());
        let entities = doc.types.iter().map(|t| (t.name.as_str(), Entity::Type(t)))
            .chain(doc.prototypes.iter().map(|p| (p.name.as_str(), Entity::Prototype(p))));
        for (name, entity) in entities {
            if by_name.insert(name, entity).is_some() {
                return Err(SchemaError::DuplicateName { name: name.to_string() });
            }
        }
        Ok(Self { doc, by_name })
    }

    pub fn doc(&self) -> &'d Doc {
        self.doc
    }

    pub fn get(&self, name: &str) -> Option<Entity<'d>> {
        self.by_name.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// The type expression a name stands for; prototypes are viewed as structs.
    pub fn definition(&self, name: &str) -> Option<Cow<'d, TypeExpression>> {
        self.get(name).map(|entity| entity.definition())
    }
}

impl<'d> Entity<'d> {
    pub fn definition(self) -> Cow<'d, TypeExpression> {
        match self {
            Entity::Type(t) => Cow::Borrowed(&t.definition),
            Entity::Prototype(p) => Cow::Owned(p.make_definition()),
        }
    }
}

// ————————————————————————————————————————————————————————————————————————————
// WALKER
// ————————————————————————————————————————————————————————————————————————————

/// One handler per `TypeExpression` variant. Exclusion decisions are made by
/// [`Walker`], so visitors only build outputs.
pub trait Visitor {
    type Output: Clone;

    fn builtin(&mut self, name: &str) -> Compiled<Self::Output>;
    fn literal_bool(&mut self, value: bool) -> Self::Output;
    fn literal_string(&mut self, value: &str) -> Self::Output;
    fn literal_integer(&mut self, value: i64) -> Self::Output;
    fn reference(&mut self, name: &str) -> Self::Output;
    fn union(&mut self, members: Vec<Self::Output>) -> Self::Output;
    fn array(&mut self, content: Self::Output, empty_as_object: bool) -> Self::Output;
    fn dictionary(&mut self, keys: Self::Output, values: Self::Output) -> Self::Output;
    fn tuple(&mut self, members: Vec<Self::Output>) -> Self::Output;
    fn structure(&mut self, resolved: ResolvedStruct<Self::Output>) -> Self::Output;
    fn unconstrained(&mut self) -> Self::Output;
}

#[derive(Debug, Clone, Copy)]
pub struct Walker<'a, 'd> {
    pub index: &'a DocIndex<'d>,
    pub forbidden: &'a ForbiddenSet,
}

impl<'a, 'd> Walker<'a, 'd> {
    pub fn new(index: &'a DocIndex<'d>, forbidden: &'a ForbiddenSet) -> Self {
        Self { index, forbidden }
    }

    pub fn walk<V: Visitor>(&self, v: &mut V, expr: &TypeExpression) -> Compiled<V::Output> {
        match expr {
            TypeExpression::Builtin { name } => v.builtin(name),
            TypeExpression::LiteralBool { value } => Ok(v.literal_bool(*value)),
            TypeExpression::LiteralString { value } => Ok(v.literal_string(value)),
            TypeExpression::LiteralInteger { value } => Ok(v.literal_integer(*value)),
            TypeExpression::Ref { name } => {
                if self.forbidden.contains(name) {
                    return Err(CompileError::Excluded);
                }
                if !self.index.contains(name) {
                    return Err(CompileError::UnknownReference(name.clone()));
                }
                Ok(v.reference(name))
            }
            TypeExpression::Union { members } => {
                let mut out = Vec::with_capacity(members.len());
                for member in members {
                    if let Some(x) = excluded_as_none(self.walk(v, member))? {
                        out.push(x);
                    }
                }
                if out.is_empty() {
                    return Err(CompileError::Excluded);
                }
                Ok(v.union(out))
            }
            TypeExpression::Array { content, empty_as_object } => {
                let content = self.walk(v, content)?;
                Ok(v.array(content, *empty_as_object))
            }
            TypeExpression::Dictionary { keys, values } => {
                let keys = self.walk(v, keys)?;
                let values = self.walk(v, values)?;
                Ok(v.dictionary(keys, values))
            }
            TypeExpression::Tuple { members } => {
                let members = members.iter().map(|m| self.walk(v, m)).collect::<Compiled<Vec<_>>>()?;
                Ok(v.tuple(members))
            }
            TypeExpression::Struct(s) => {
                let resolved = self.resolve_struct(v, s)?;
                if resolved.properties.is_empty() && resolved.custom_properties.is_none() {
                    return Err(CompileError::Excluded);
                }
                Ok(v.structure(resolved))
            }
            TypeExpression::Unconstrained => Ok(v.unconstrained()),
        }
    }

    fn resolve_struct<V: Visitor>(&self, v: &mut V, s: &StructType) -> Compiled<ResolvedStruct<V::Output>> {
        hierarchy::resolve(self, v, s)
    }
}

// ————————————————————————————————————————————————————————————————————————————
// FRONT API
// ————————————————————————————————————————————————————————————————————————————

/// Result of compiling a `Doc`: the bucket properties and the pruned definitions.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledSchema {
    pub title: String,
    pub properties: Map<String, Value>,
    pub definitions: IndexMap<String, Value>,
}

impl CompiledSchema {
    /// The top-level document, without definitions.
    pub fn root(&self) -> Value {
        json!({
            "$schema": SCHEMA_DIALECT,
            "title": self.title,
            "type": "object",
            "properties": self.properties,
        })
    }

    /// Single-file form: the root with every definition inlined under `definitions`.
    pub fn to_json(&self) -> Value {
        let mut root = self.root();
        let definitions: Map<String, Value> =
            self.definitions.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
        root["definitions"] = Value::Object(definitions);
        root
    }

    /// Split form as `(relative path, document)` pairs: `schema.json` plus one
    /// `definitions/<name>.json` per definition. Only meaningful when compiled
    /// with [`split_reference`] as the reference-naming strategy.
    pub fn split_files(&self) -> Vec<(String, Value)> {
        let mut files = Vec::with_capacity(self.definitions.len() + 1);
        files.push(("schema.json".to_string(), self.root()));
        for (name, definition) in &self.definitions {
            let mut document = Map::new();
            document.insert("$schema".to_string(), Value::from(SCHEMA_DIALECT));
            if let Value::Object(fields) = definition {
                document.extend(fields.clone());
            }
            files.push((format!("definitions/{name}.json"), Value::Object(document)));
        }
        files
    }
}

/// Reference naming for [`CompiledSchema::split_files`]: the root points into
/// `definitions/`, definitions point at their siblings.
pub fn split_reference(deep: bool, name: &str) -> String {
    if deep { format!("{name}.json") } else { format!("definitions/{name}.json") }
}

/// Compile `doc` to a JSON Schema value.
pub fn make_json_schema(doc: &Doc, options: &CompileOptions) -> Result<Value, SchemaError> {
    compile(doc, options).map(|schema| schema.to_json())
}

pub fn compile(doc: &Doc, options: &CompileOptions) -> Result<CompiledSchema, SchemaError> {
    let index = DocIndex::new(doc)?;
    let forbidden = ForbiddenSet::compute(&index, &options.forbid_type_names)?;
    let walker = Walker::new(&index, &forbidden);

    let roots = reach::select_roots(&index, options.limit_to_prototype_names.as_deref(), options.include_descendants)?;
    let references = reach::references_by_definition(&walker)?;
    // abstract roots only widen the selection; they are emitted when something references them
    let seeds = doc.prototypes.iter()
        .filter(|p| !p.is_abstract() && roots.contains(&p.name))
        .map(|p| p.name.as_str());
    let reachable = reach::reachable_from(seeds, &references);

    let mut emitter = JsonEmitter::new(options);

    let mut properties = Map::new();
    for prototype in &doc.prototypes {
        let Some(key) = &prototype.key else { continue };
        if !roots.contains(&prototype.name) || forbidden.contains(&prototype.name) {
            continue;
        }
        properties.insert(key.clone(), json!({
            "type": "object",
            "additionalProperties": {"$ref": options.reference(false, &prototype.name)},
        }));
    }

    let mut definitions = IndexMap::new();
    let entities = doc.types.iter().map(|t| (t.name.as_str(), "types", Cow::Borrowed(&t.definition)))
        .chain(doc.prototypes.iter().map(|p| (p.name.as_str(), "prototypes", Cow::Owned(p.make_definition()))));
    for (name, section, definition) in entities {
        if !reachable.contains(name) || forbidden.contains(name) {
            continue;
        }
        let compiled = walker.walk(&mut emitter, &definition)
            .map_err(|source| SchemaError::Definition { name: name.to_string(), source })?;
        let mut described = Map::new();
        described.insert(
            "description".to_string(),
            Value::from(format!("{}{section}/{name}.html", options.doc_root)),
        );
        if let Value::Object(fields) = compiled {
            described.extend(fields);
        }
        definitions.insert(name.to_string(), Value::Object(described));
    }

    Ok(CompiledSchema { title: options.title.clone(), properties, definitions })
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ir::Property;
    use pretty_assertions::assert_eq;

    pub(crate) fn builtins() -> Vec<Type> {
        ["string", "bool", "double", "uint8", "uint16", "uint32"]
            .into_iter()
            .map(|n| Type::new(n, TypeExpression::builtin(n)))
            .collect()
    }

    pub(crate) fn prototype(name: &str, key: Option<&str>, base: Option<&str>, properties: Vec<Property>) -> Prototype {
        Prototype {
            name: name.into(),
            key: key.map(Into::into),
            base: base.map(Into::into),
            properties,
            overridden_properties: vec![],
            custom_properties: None,
        }
    }

    fn sample_doc() -> Doc {
        let mut types = builtins();
        types.push(Type::new("X", TypeExpression::Struct(StructType::new(None, vec![
            Property::new("x", TypeExpression::reference("uint8"), true),
        ]))));
        types.push(Type::new("Y", TypeExpression::Struct(StructType::new(None, vec![
            Property::new("y", TypeExpression::reference("string"), false),
        ]))));
        Doc {
            types,
            prototypes: vec![
                prototype("APrototype", Some("a"), None, vec![Property::new("x", TypeExpression::reference("X"), false)]),
                prototype("BPrototype", Some("b"), None, vec![Property::new("y", TypeExpression::reference("Y"), false)]),
            ],
        }
    }

    #[test]
    fn round_trip_single_struct() {
        let doc = Doc::default();
        let index = DocIndex::new(&doc).unwrap();
        let forbidden = ForbiddenSet::default();
        let options = CompileOptions::default();
        let mut emitter = JsonEmitter::new(&options);
        let expr = TypeExpression::Struct(StructType::new(None, vec![
            Property::new("x", TypeExpression::builtin("uint8"), true),
        ]));
        let out = Walker::new(&index, &forbidden).walk(&mut emitter, &expr).unwrap();
        assert_eq!(
            serde_json::to_string(&out).unwrap(),
            r#"{"type":"object","properties":{"x":{"type":"integer","minimum":0,"maximum":255}},"required":["x"]}"#
        );
    }

    #[test]
    fn reachability_prunes_unselected_prototypes() {
        let doc = sample_doc();
        let schema = compile(&doc, &CompileOptions::default().limit_to(["A"])).unwrap();
        let names: Vec<&str> = schema.definitions.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["uint8", "X", "APrototype"]);
        assert!(schema.properties.contains_key("a"));
        assert!(!schema.properties.contains_key("b"));
    }

    #[test]
    fn abstract_roots_are_not_emitted() {
        let doc = Doc {
            types: builtins(),
            prototypes: vec![
                prototype("EntityPrototype", None, None, vec![Property::new("health", TypeExpression::reference("uint8"), false)]),
                prototype("TreePrototype", Some("tree"), Some("EntityPrototype"), vec![]),
                prototype("TurretPrototype", Some("turret"), None, vec![
                    Property::new("base", TypeExpression::reference("EntityPrototype"), false),
                ]),
            ],
        };

        let options = CompileOptions::default().limit_to(["Entity"]).with_descendants(true);
        let schema = compile(&doc, &options).unwrap();
        let names: Vec<&str> = schema.definitions.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["uint8", "TreePrototype"]);
        let keys: Vec<&str> = schema.properties.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["tree"]);

        // still emitted once a selected prototype refers to it
        let schema = compile(&doc, &CompileOptions::default().limit_to(["turret"])).unwrap();
        let names: Vec<&str> = schema.definitions.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["uint8", "EntityPrototype", "TurretPrototype"]);
    }

    #[test]
    fn whole_document_shape() {
        let doc = sample_doc();
        let value = make_json_schema(&doc, &CompileOptions::default()).unwrap();
        assert_eq!(value["$schema"], SCHEMA_DIALECT);
        assert_eq!(value["title"], "Factorio Data.raw");
        assert_eq!(value["type"], "object");
        assert_eq!(value["properties"]["b"], json!({
            "type": "object",
            "additionalProperties": {"$ref": "#/definitions/BPrototype"}
        }));
        assert_eq!(
            value["definitions"]["Y"]["description"],
            "https://lua-api.factorio.com/stable/types/Y.html"
        );
        assert_eq!(
            value["definitions"]["BPrototype"]["description"],
            "https://lua-api.factorio.com/stable/prototypes/BPrototype.html"
        );
        assert_eq!(value["definitions"]["BPrototype"]["required"], json!(["type"]));
        assert!(value["definitions"].get("uint16").is_none());
    }

    #[test]
    fn compiling_twice_is_byte_identical() {
        let doc = sample_doc();
        let options = CompileOptions::default().forbid(["Y"]);
        let a = serde_json::to_string(&make_json_schema(&doc, &options).unwrap()).unwrap();
        let b = serde_json::to_string(&make_json_schema(&doc, &options).unwrap()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn custom_reference_naming() {
        let doc = sample_doc();
        let options = CompileOptions::default()
            .limit_to(["APrototype"])
            .with_make_reference(split_reference);
        let value = make_json_schema(&doc, &options).unwrap();
        assert_eq!(value["properties"]["a"]["additionalProperties"]["$ref"], "definitions/APrototype.json");
        assert_eq!(value["definitions"]["APrototype"]["properties"]["x"]["$ref"], "X.json");
    }

    #[test]
    fn split_files_one_per_definition() {
        let doc = sample_doc();
        let options = CompileOptions::default().limit_to(["A"]).with_make_reference(split_reference);
        let files = compile(&doc, &options).unwrap().split_files();
        let paths: Vec<&str> = files.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec![
            "schema.json",
            "definitions/uint8.json",
            "definitions/X.json",
            "definitions/APrototype.json",
        ]);
        assert!(files[0].1.get("definitions").is_none());
        assert_eq!(files[2].1["$schema"], SCHEMA_DIALECT);
        assert_eq!(files[2].1["properties"]["x"]["$ref"], "uint8.json");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut doc = sample_doc();
        doc.types.push(Type::new("X", TypeExpression::builtin("string")));
        assert!(matches!(compile(&doc, &CompileOptions::default()), Err(SchemaError::DuplicateName { name }) if name == "X"));
    }

    #[test]
    fn unknown_reference_names_the_definition() {
        let mut doc = sample_doc();
        doc.types.push(Type::new("Broken", TypeExpression::Struct(StructType::new(None, vec![
            Property::new("z", TypeExpression::reference("Nowhere"), false),
        ]))));
        let err = compile(&doc, &CompileOptions::default()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("Broken"), "{message}");
        assert!(message.contains("\"z\""), "{message}");
        assert!(message.contains("Nowhere"), "{message}");
    }
}
