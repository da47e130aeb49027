//! Build a `Doc` from documentation pages that were already split into their
//! textual parts (headings, property headings, inline types, union members).
//!
//! Fetching and scraping the pages happens elsewhere; what arrives here is a
//! [`RawDoc`] where every type expression is still prose.
use std::fmt;

use once_cell::sync::Lazy;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::grammar::{KnownNames, LocalTypes, ParseError, Scope, Syntax, parse_syntax, parse_type_expression};
use crate::ir::{Doc, Property, Prototype, StructType, Type, TypeExpression};

// ————————————————————————————————————————————————————————————————————————————
// RAW INPUT
// ————————————————————————————————————————————————————————————————————————————

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDoc {
    #[serde(default)]
    pub types: Vec<RawType>,
    #[serde(default)]
    pub prototypes: Vec<RawPrototype>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawType {
    pub name: String,
    /// Page heading, e.g. `Color :: struct or {float, float, float}` or
    /// `double builtin`.
    pub header: String,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub properties: Vec<RawProperty>,
    #[serde(default)]
    pub overridden_properties: Vec<RawProperty>,
    /// Type expression of the values of undeclared properties.
    #[serde(default)]
    pub custom_properties: Option<String>,
    #[serde(default)]
    pub union_members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawProperty {
    pub name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    /// Property heading, e.g. `icon_size :: SpriteSizeType optional new`.
    pub header: String,
    #[serde(default)]
    pub local_types: Vec<RawLocalType>,
    #[serde(default)]
    pub union_members: Vec<String>,
}

/// A type declared inline beside a property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLocalType {
    /// e.g. `Mode :: "on" or "off"`, `Offset :: struct`.
    pub header: String,
    #[serde(default)]
    pub properties: Vec<RawProperty>,
    #[serde(default)]
    pub union_members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrototype {
    pub name: String,
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub properties: Vec<RawProperty>,
    #[serde(default)]
    pub overridden_properties: Vec<RawProperty>,
    #[serde(default)]
    pub custom_properties: Option<String>,
}

// ————————————————————————————————————————————————————————————————————————————
// OUTPUT & ERRORS
// ————————————————————————————————————————————————————————————————————————————

/// Where in the documentation something happened: an entity, and optionally a
/// dotted path to one of its (possibly inline) properties.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub entity: String,
    pub property: Option<String>,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.property {
            Some(property) => write!(f, "{}.{}", self.entity, property),
            None => f.write_str(&self.entity),
        }
    }
}

/// A recoverable failure: the offending part was replaced by an unconstrained
/// placeholder.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    #[serde(flatten)]
    pub at: Location,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.at, self.message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("{at}: unrecognized heading {header:?}")]
    Header { at: Location, header: String },
    /// The grammar and the extractor disagree about the universe of types.
    #[error("{at}: unknown type {name:?}")]
    UnknownType { at: Location, name: String },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub doc: Doc,
    pub diagnostics: Vec<Diagnostic>,
}

// ————————————————————————————————————————————————————————————————————————————
// PUBLIC API
// ————————————————————————————————————————————————————————————————————————————

/// Types whose pages describe Lua-side values with no JSON shape.
const OPAQUE_TYPES: &[&str] = &["Data", "DataExtendMethod", "AnyPrototype"];

pub fn extract(raw: &RawDoc) -> Result<Extraction, ExtractError> {
    let known: KnownNames = raw.types.iter().map(|t| t.name.as_str())
        .chain(raw.prototypes.iter().map(|p| p.name.as_str()))
        .collect();
    debug!(names = known.len(), "extracting");
    let extractor = Extractor { known: &known };

    let types: Vec<(Type, Vec<Diagnostic>)> = raw.types
        .par_iter()
        .map(|t| extractor.extract_type(t))
        .collect::<Result<Vec<_>, ExtractError>>()?;
    let prototypes: Vec<(Prototype, Vec<Diagnostic>)> = raw.prototypes
        .par_iter()
        .map(|p| extractor.extract_prototype(p))
        .collect::<Result<Vec<_>, ExtractError>>()?;

    let mut out = Extraction::default();
    for (t, diagnostics) in types {
        out.doc.types.push(t);
        out.diagnostics.extend(diagnostics);
    }
    for (p, diagnostics) in prototypes {
        out.doc.prototypes.push(p);
        out.diagnostics.extend(diagnostics);
    }
    Ok(out)
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

static TYPE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>\S+)\s*::\s*(?P<expression>.*?)\s*(?:Example code)?$").expect("valid regex")
});
static BUILTIN_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>\S+)\s+builtin\s*(?:Example code)?$").expect("valid regex")
});
static PROPERTY_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>\S+)\s*::\s*(?P<expression>.*?)\s*(?P<optional>optional)?\s*(?:new|changed)?\s*$")
        .expect("valid regex")
});
static LOCAL_TYPE_HEADER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>.*?)\s*::\s*(?P<expression>.*?)\s*$").expect("valid regex")
});

/// Failure while extracting one part. `Soft` ones degrade to a placeholder.
enum Failure {
    Soft(String),
    Hard(ExtractError),
}

impl From<ExtractError> for Failure {
    fn from(error: ExtractError) -> Self {
        Failure::Hard(error)
    }
}

/// Per-entity state; diagnostics stay local to the worker handling the entity.
struct Cx<'e> {
    entity: &'e str,
    diagnostics: Vec<Diagnostic>,
}

impl Cx<'_> {
    fn at(&self, property: Option<&str>) -> Location {
        Location { entity: self.entity.to_string(), property: property.map(str::to_string) }
    }

    fn placeholder(&mut self, property: Option<&str>, message: String) -> TypeExpression {
        let at = self.at(property);
        warn!(%at, %message, "substituting an unconstrained placeholder");
        self.diagnostics.push(Diagnostic { at, message });
        TypeExpression::Unconstrained
    }
}

struct Extractor<'k> {
    known: &'k KnownNames,
}

impl Extractor<'_> {
    fn extract_type(&self, raw: &RawType) -> Result<(Type, Vec<Diagnostic>), ExtractError> {
        let mut cx = Cx { entity: &raw.name, diagnostics: Vec::new() };
        if OPAQUE_TYPES.contains(&raw.name.as_str()) {
            return Ok((Type::new(raw.name.clone(), TypeExpression::Unconstrained), cx.diagnostics));
        }

        let header = raw.header.trim();
        let definition = if let Some(m) = BUILTIN_HEADER.captures(header).filter(|m| m["name"] == raw.name) {
            TypeExpression::builtin(&m["name"])
        } else if let Some(m) = TYPE_HEADER.captures(header).filter(|m| m["name"] == raw.name) {
            let expression = m["expression"].replace(" - abstract", "");
            self.type_definition(&mut cx, raw, &expression)?
        } else {
            return Err(ExtractError::Header { at: cx.at(None), header: raw.header.clone() });
        };
        Ok((Type::new(raw.name.clone(), definition), cx.diagnostics))
    }

    fn type_definition(&self, cx: &mut Cx<'_>, raw: &RawType, expression: &str) -> Result<TypeExpression, ExtractError> {
        let syntax = match parse_syntax(expression) {
            Ok(syntax) => syntax,
            Err(error) => return Ok(cx.placeholder(None, error.to_string())),
        };
        // local scopes only exist for names the expression leaves unresolved globally
        let names_local = |name: &str| syntax.mentions(name) && !self.known.contains(name);

        let mut local = LocalTypes::new();
        if names_local("struct") {
            let properties = self.properties(cx, None, &raw.properties)?;
            let overridden_properties = self.properties(cx, None, &raw.overridden_properties)?;
            let custom_properties = match &raw.custom_properties {
                Some(custom) => Some(Box::new(self.top_level(cx, custom)?)),
                None => None,
            };
            local.insert("struct".to_string(), TypeExpression::Struct(StructType {
                base: raw.base.clone(),
                properties,
                overridden_properties,
                custom_properties,
            }));
        }
        if names_local("union") {
            match self.union_of(cx, None, &raw.union_members) {
                Ok(union) => {
                    local.insert("union".to_string(), union);
                }
                Err(Failure::Soft(message)) => return Ok(cx.placeholder(None, message)),
                Err(Failure::Hard(error)) => return Err(error),
            }
        }
        match self.resolve(cx, None, &syntax, &local) {
            Ok(t) => Ok(t),
            Err(Failure::Soft(message)) => Ok(cx.placeholder(None, message)),
            Err(Failure::Hard(error)) => Err(error),
        }
    }

    fn extract_prototype(&self, raw: &RawPrototype) -> Result<(Prototype, Vec<Diagnostic>), ExtractError> {
        let mut cx = Cx { entity: &raw.name, diagnostics: Vec::new() };
        let properties = self.properties(&mut cx, None, &raw.properties)?;
        let overridden_properties = self.properties(&mut cx, None, &raw.overridden_properties)?;
        let custom_properties = match &raw.custom_properties {
            Some(custom) => Some(self.top_level(&mut cx, custom)?),
            None => None,
        };
        let prototype = Prototype {
            name: raw.name.clone(),
            key: raw.key.clone(),
            base: raw.base.clone(),
            properties,
            overridden_properties,
            custom_properties,
        };
        Ok((prototype, cx.diagnostics))
    }

    /// An expression that only sees global names.
    fn top_level(&self, cx: &mut Cx<'_>, expression: &str) -> Result<TypeExpression, ExtractError> {
        match self.parse(cx, None, expression, &LocalTypes::new()) {
            Ok(t) => Ok(t),
            Err(Failure::Soft(message)) => Ok(cx.placeholder(None, message)),
            Err(Failure::Hard(error)) => Err(error),
        }
    }

    fn properties(&self, cx: &mut Cx<'_>, prefix: Option<&str>, raw: &[RawProperty]) -> Result<Vec<Property>, ExtractError> {
        raw.iter().map(|p| self.property(cx, prefix, p)).collect()
    }

    fn property(&self, cx: &mut Cx<'_>, prefix: Option<&str>, raw: &RawProperty) -> Result<Property, ExtractError> {
        let path = match prefix {
            Some(prefix) => format!("{prefix}.{}", raw.name),
            None => raw.name.clone(),
        };
        let names: Vec<String> = std::iter::once(raw.name.clone()).chain(raw.aliases.iter().cloned()).collect();
        match self.property_type(cx, &path, raw) {
            Ok((ty, required)) => Ok(Property { names, ty, required }),
            Err(Failure::Soft(message)) => {
                let ty = cx.placeholder(Some(&path), message);
                Ok(Property { names, ty, required: !raw.header.contains("optional") })
            }
            Err(Failure::Hard(error)) => Err(error),
        }
    }

    fn property_type(&self, cx: &mut Cx<'_>, path: &str, raw: &RawProperty) -> Result<(TypeExpression, bool), Failure> {
        let mut local = LocalTypes::new();
        for local_type in &raw.local_types {
            let Some(m) = LOCAL_TYPE_HEADER.captures(local_type.header.trim()) else {
                return Err(Failure::Soft(format!("unrecognized inline type heading {:?}", local_type.header)));
            };
            let name = m["name"].to_string();
            let definition = match &m["expression"] {
                "struct" => {
                    let properties = self.properties(cx, Some(&format!("{path}.{name}")), &local_type.properties)?;
                    TypeExpression::Struct(StructType::new(None, properties))
                }
                "union" => self.union_of(cx, Some(path), &local_type.union_members)?,
                expression => self.parse(cx, Some(path), expression, &local)?,
            };
            local.insert(name, definition);
        }

        let header = raw.header.trim();
        let m = PROPERTY_HEADER
            .captures(header)
            .filter(|m| m["name"] == raw.name)
            .ok_or_else(|| Failure::Soft(format!("unrecognized property heading {:?}", raw.header)))?;
        let required = m.name("optional").is_none();
        let ty = match &m["expression"] {
            "union" => self.union_of(cx, Some(path), &raw.union_members)?,
            expression => self.parse(cx, Some(path), expression, &local)?,
        };
        Ok((ty, required))
    }

    /// Documented union members are literals or global type names, each one a
    /// type expression of its own.
    fn union_of(&self, cx: &Cx<'_>, property: Option<&str>, members: &[String]) -> Result<TypeExpression, Failure> {
        if members.is_empty() {
            return Err(Failure::Soft("union without documented members".to_string()));
        }
        let local = LocalTypes::new();
        let members = members
            .iter()
            .map(|m| self.parse(cx, property, m, &local))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(TypeExpression::union(members))
    }

    fn parse(&self, cx: &Cx<'_>, property: Option<&str>, expression: &str, local: &LocalTypes) -> Result<TypeExpression, Failure> {
        parse_type_expression(expression, Scope::new(self.known, local)).map_err(|error| failure(cx, property, error))
    }

    fn resolve(&self, cx: &Cx<'_>, property: Option<&str>, syntax: &Syntax, local: &LocalTypes) -> Result<TypeExpression, Failure> {
        Scope::new(self.known, local).resolve(syntax).map_err(|error| failure(cx, property, error))
    }
}

fn failure(cx: &Cx<'_>, property: Option<&str>, error: ParseError) -> Failure {
    match error {
        ParseError::UnknownType { name } => Failure::Hard(ExtractError::UnknownType { at: cx.at(property), name }),
        syntax => Failure::Soft(syntax.to_string()),
    }
}

// ————————————————————————————————————————————————————————————————————————————
// TESTS
// ————————————————————————————————————————————————————————————————————————————
