//! Flatten a struct's inheritance chain into one property table.
use std::borrow::Cow;

use indexmap::{IndexMap, IndexSet};
use tracing::warn;

use super::{CompileError, Compiled, Visitor, Walker, excluded_as_none};
use crate::ir::{Property, StructType, TypeExpression};

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProperty<O> {
    pub schema: O,
    pub required: bool,
}

/// A struct with its whole base chain merged, base first.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStruct<O> {
    pub properties: IndexMap<String, ResolvedProperty<O>>,
    pub custom_properties: Option<O>,
}

impl<O> Default for ResolvedStruct<O> {
    fn default() -> Self {
        Self { properties: IndexMap::new(), custom_properties: None }
    }
}

impl<O> ResolvedStruct<O> {
    /// Names of required properties, in property order.
    pub fn required(&self) -> Vec<&str> {
        self.properties
            .iter()
            .filter(|(_, p)| p.required)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

pub(super) fn resolve<V: Visitor>(
    walker: &Walker<'_, '_>,
    v: &mut V,
    leaf: &StructType,
) -> Compiled<ResolvedStruct<V::Output>> {
    let chain = base_chain(walker, leaf)?;

    let mut out = ResolvedStruct::default();
    let mut custom_owner: Option<String> = None;

    // root first, so derived levels shadow inherited entries
    for (owner, level) in chain.iter().rev() {
        for property in level.properties.iter().chain(&level.overridden_properties) {
            merge_property(walker, v, &mut out, property)?;
        }
        if let Some(custom) = &level.custom_properties {
            if let Some(first) = &custom_owner {
                return Err(CompileError::DuplicateCustomProperties {
                    first: first.clone(),
                    second: owner.clone(),
                });
            }
            out.custom_properties = Some(walker.walk(v, custom)?);
            custom_owner = Some(owner.clone());
        }
    }

    Ok(out)
}

fn merge_property<V: Visitor>(
    walker: &Walker<'_, '_>,
    v: &mut V,
    out: &mut ResolvedStruct<V::Output>,
    property: &Property,
) -> Compiled<()> {
    let schema = excluded_as_none(walker.walk(v, &property.ty)).map_err(|source| CompileError::InProperty {
        property: property.names.join("|"),
        source: Box::new(source),
    })?;
    let Some(schema) = schema else {
        return Ok(());
    };
    // only single-name properties touch the required flag; aliases keep what they inherit
    // TODO: a required property with several aliases should demand at least one of them
    for name in &property.names {
        let required = match property.names.len() {
            1 => property.required,
            _ => out.properties.get(name).is_some_and(|p| p.required),
        };
        out.properties.insert(name.clone(), ResolvedProperty { schema: schema.clone(), required });
    }
    Ok(())
}

/// Leaf first. Each entry is labelled with the name it was reached by.
fn base_chain<'d>(
    walker: &Walker<'_, 'd>,
    leaf: &StructType,
) -> Compiled<Vec<(String, Cow<'d, StructType>)>> {
    let mut chain: Vec<(String, Cow<'d, StructType>)> = Vec::new();
    let mut seen = IndexSet::new();
    let mut next = leaf.base.clone();

    while let Some(base_name) = next.take() {
        if !seen.insert(base_name.clone()) {
            warn!(base = %base_name, "cyclic inheritance, stopping at the repeated base");
            break;
        }
        if walker.forbidden.is_explicit(&base_name) {
            return Err(CompileError::Excluded);
        }
        let definition = walker
            .index
            .definition(&base_name)
            .ok_or_else(|| CompileError::UnknownReference(base_name.clone()))?;

        let Some(level) = struct_of_base(&base_name, definition) else {
            break;
        };
        next = level.base.clone();
        chain.push((base_name, level));
    }

    let mut levels = vec![("<leaf>".to_string(), Cow::Owned(leaf.clone()))];
    levels.extend(chain);
    Ok(levels)
}

/// The struct a base name contributes: the struct itself, or the single struct
/// member of a union. Anything else stops the climb.
fn struct_of_base<'d>(name: &str, definition: Cow<'d, TypeExpression>) -> Option<Cow<'d, StructType>> {
    match definition {
        Cow::Borrowed(TypeExpression::Struct(s)) => Some(Cow::Borrowed(s)),
        Cow::Owned(TypeExpression::Struct(s)) => Some(Cow::Owned(s)),
        Cow::Borrowed(TypeExpression::Union { members }) => single_struct_member(name, members).map(Cow::Borrowed),
        Cow::Owned(TypeExpression::Union { members }) => {
            single_struct_member(name, &members).map(|s| Cow::Owned(s.clone()))
        }
        other => {
            warn!(base = %name, kind = other.kind(), "used as a base but is neither a struct nor a union");
            None
        }
    }
}

fn single_struct_member<'e>(name: &str, members: &'e [TypeExpression]) -> Option<&'e StructType> {
    let mut structs = members.iter().filter_map(TypeExpression::as_struct);
    match (structs.next(), structs.next()) {
        (Some(s), None) => Some(s),
        (None, _) => {
            warn!(base = %name, "union used as a base has no struct member");
            None
        }
        (Some(_), Some(_)) => {
            warn!(base = %name, "union used as a base has several struct members");
            None
        }
    }
}
