//! Root selection and reachability pruning.
use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::{CompileError, RefCollector, SchemaError, Walker, excluded_as_none};
use super::refs::RefSet;
use super::DocIndex;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SelectionError {
    #[error("prototype {0:?} not found (tried the name, its \"Prototype\" form and Data.raw keys)")]
    UnknownPrototype(String),
}

/// Prototypes the schema is built around.
///
/// Without a limit, every instantiable prototype. With one, each entry is
/// looked up as a prototype name, then as `<entry>Prototype`, then as a key.
pub fn select_roots(
    index: &DocIndex<'_>,
    limit_to_prototype_names: Option<&[String]>,
    include_descendants: bool,
) -> Result<BTreeSet<String>, SelectionError> {
    let doc = index.doc();
    let Some(limit) = limit_to_prototype_names else {
        return Ok(doc.prototypes.iter().filter(|p| p.key.is_some()).map(|p| p.name.clone()).collect());
    };

    let mut roots = BTreeSet::new();
    for requested in limit {
        roots.insert(canonical_prototype_name(index, requested)?);
    }

    if include_descendants {
        let mut children_by_parent: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for prototype in &doc.prototypes {
            if let Some(base) = &prototype.base {
                children_by_parent.entry(base.as_str()).or_default().push(prototype.name.as_str());
            }
        }
        let mut to_explore: Vec<String> = roots.iter().cloned().collect();
        while let Some(name) = to_explore.pop() {
            for &child in children_by_parent.get(name.as_str()).into_iter().flatten() {
                if roots.insert(child.to_string()) {
                    to_explore.push(child.to_string());
                }
            }
        }
    }

    debug!(roots = roots.len(), "selected root prototypes");
    Ok(roots)
}

fn canonical_prototype_name(index: &DocIndex<'_>, requested: &str) -> Result<String, SelectionError> {
    let doc = index.doc();
    let suffixed = format!("{requested}Prototype");
    doc.prototypes
        .iter()
        .find(|p| p.name == requested)
        .or_else(|| doc.prototypes.iter().find(|p| p.name == suffixed))
        .or_else(|| doc.prototypes.iter().find(|p| p.key.as_deref() == Some(requested)))
        .map(|p| p.name.clone())
        .ok_or_else(|| SelectionError::UnknownPrototype(requested.to_string()))
}

/// Names referenced by each compilable definition's compiled form.
pub fn references_by_definition(walker: &Walker<'_, '_>) -> Result<BTreeMap<String, RefSet>, SchemaError> {
    let doc = walker.index.doc();
    let entities = doc.types.iter().map(|t| t.name.as_str())
        .chain(doc.prototypes.iter().map(|p| p.name.as_str()));

    let mut out = BTreeMap::new();
    for name in entities {
        if walker.forbidden.contains(name) {
            continue;
        }
        let Some(definition) = walker.index.definition(name) else { continue };
        let refs = excluded_as_none(walker.walk(&mut RefCollector, &definition))
            .map_err(|source: CompileError| SchemaError::Definition { name: name.to_string(), source })?;
        out.insert(name.to_string(), refs.unwrap_or_default());
    }
    Ok(out)
}

/// `roots` plus everything they reference, transitively.
pub fn reachable_from<'n>(
    roots: impl IntoIterator<Item = &'n str>,
    references: &BTreeMap<String, RefSet>,
) -> BTreeSet<String> {
    let mut reached = BTreeSet::new();
    let mut to_explore: Vec<String> = roots.into_iter().map(str::to_string).collect();
    while let Some(name) = to_explore.pop() {
        if !reached.insert(name.clone()) {
            continue;
        }
        if let Some(refs) = references.get(&name) {
            to_explore.extend(refs.iter().filter(|r| !reached.contains(*r)).cloned());
        }
    }
    reached
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::tests::{builtins, prototype};
    use crate::compile::ForbiddenSet;
    use crate::ir::{Doc, Property, TypeExpression};

    fn hierarchy_doc() -> Doc {
        Doc {
            types: builtins(),
            prototypes: vec![
                prototype("APrototype", Some("a"), None, vec![]),
                prototype("BPrototype", Some("b"), Some("APrototype"), vec![]),
                prototype("CPrototype", Some("c"), Some("BPrototype"), vec![]),
                prototype("OtherPrototype", Some("other-thing"), None, vec![]),
                prototype("AbstractPrototype", None, None, vec![]),
            ],
        }
    }

    fn roots(doc: &Doc, limit: Option<&[&str]>, descendants: bool) -> Result<Vec<String>, SelectionError> {
        let index = DocIndex::new(doc).unwrap();
        let limit: Option<Vec<String>> = limit.map(|l| l.iter().map(|s| s.to_string()).collect());
        select_roots(&index, limit.as_deref(), descendants).map(|set| set.into_iter().collect())
    }

    #[test]
    fn descendants_follow_base_pointers() {
        let doc = hierarchy_doc();
        assert_eq!(roots(&doc, Some(&["A"]), true).unwrap(), vec!["APrototype", "BPrototype", "CPrototype"]);
        assert_eq!(roots(&doc, Some(&["A"]), false).unwrap(), vec!["APrototype"]);
    }

    #[test]
    fn default_roots_are_instantiable_prototypes() {
        let doc = hierarchy_doc();
        assert_eq!(
            roots(&doc, None, false).unwrap(),
            vec!["APrototype", "BPrototype", "CPrototype", "OtherPrototype"]
        );
    }

    #[test]
    fn names_resolve_exactly_suffixed_or_by_key() {
        let doc = hierarchy_doc();
        assert_eq!(roots(&doc, Some(&["BPrototype"]), false).unwrap(), vec!["BPrototype"]);
        assert_eq!(roots(&doc, Some(&["other-thing"]), false).unwrap(), vec!["OtherPrototype"]);
        assert_eq!(
            roots(&doc, Some(&["Missing"]), false).unwrap_err(),
            SelectionError::UnknownPrototype("Missing".into())
        );
    }

    #[test]
    fn reachability_skips_unrelated_definitions() {
        let mut doc = hierarchy_doc();
        doc.prototypes[0].properties.push(Property::new("x", TypeExpression::reference("uint8"), false));
        doc.prototypes[3].properties.push(Property::new("y", TypeExpression::reference("string"), false));

        let index = DocIndex::new(&doc).unwrap();
        let forbidden = ForbiddenSet::default();
        let references = references_by_definition(&Walker::new(&index, &forbidden)).unwrap();
        let reached = reachable_from(["APrototype"], &references);
        let reached: Vec<&str> = reached.iter().map(String::as_str).collect();
        assert_eq!(reached, vec!["APrototype", "uint8"]);
    }

    #[test]
    fn reachability_handles_reference_cycles() {
        let references = BTreeMap::from([
            ("A".to_string(), RefSet::from(["B".to_string()])),
            ("B".to_string(), RefSet::from(["A".to_string(), "C".to_string()])),
        ]);
        let reached = reachable_from(["A"], &references);
        assert_eq!(reached.len(), 3);
    }
}
